//! Declarative field extraction: named selector/attribute pairs resolved
//! against the page, one value per field.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::{error::Result, extract::Evaluator};

/// One field to pull off the page. Without `attribute` the element's
/// visible text is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

fn field_js(spec: &FieldSpec) -> Result<String> {
    let selector = serde_json::to_string(&spec.selector).map_err(|e| {
        crate::error::BrowserError::InvalidRequest(format!("bad selector in field {}: {e}", spec.name))
    })?;
    let js = match &spec.attribute {
        Some(attr) => {
            let attr = serde_json::to_string(attr).map_err(|e| {
                crate::error::BrowserError::InvalidRequest(format!(
                    "bad attribute in field {}: {e}",
                    spec.name
                ))
            })?;
            format!(
                "(() => {{ const el = document.querySelector({selector}); \
                 return el ? el.getAttribute({attr}) : null; }})()"
            )
        },
        None => format!(
            "(() => {{ const el = document.querySelector({selector}); \
             return el ? el.innerText : null; }})()"
        ),
    };
    Ok(js)
}

/// Resolve every field against the page. A field whose selector matches
/// nothing, or whose evaluation fails, yields `null` rather than failing
/// the whole set.
pub async fn extract_fields(eval: &dyn Evaluator, specs: &[FieldSpec]) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for spec in specs {
        let js = field_js(spec)?;
        let value = match eval.eval(&js).await {
            Ok(v) => v,
            Err(e) => {
                debug!(field = %spec.name, error = %e, "field extraction failed");
                Value::Null
            },
        };
        out.insert(spec.name.clone(), value);
    }
    Ok(out)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {async_trait::async_trait, serde_json::Value};

    use super::*;
    use crate::error::BrowserError;

    struct ScriptedEvaluator {
        responses: Vec<Result<Value>>,
        calls: std::sync::Mutex<usize>,
    }

    #[async_trait]
    impl Evaluator for ScriptedEvaluator {
        async fn eval(&self, _js: &str) -> Result<Value> {
            let mut calls = self.calls.lock().unwrap();
            let idx = *calls;
            *calls += 1;
            match &self.responses[idx] {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(BrowserError::EvalFailed(e.to_string())),
            }
        }
    }

    fn spec(name: &str, selector: &str, attribute: Option<&str>) -> FieldSpec {
        FieldSpec {
            name: name.into(),
            selector: selector.into(),
            attribute: attribute.map(Into::into),
        }
    }

    #[test]
    fn text_fields_read_inner_text() {
        let js = field_js(&spec("title", "h1.main", None)).unwrap();
        assert!(js.contains(r#"document.querySelector("h1.main")"#));
        assert!(js.contains("innerText"));
    }

    #[test]
    fn attribute_fields_read_the_attribute() {
        let js = field_js(&spec("link", "a.primary", Some("href"))).unwrap();
        assert!(js.contains(r#"getAttribute("href")"#));
        assert!(!js.contains("innerText"));
    }

    #[test]
    fn selector_quoting_survives_embedded_quotes() {
        let js = field_js(&spec("x", r#"a[title="it's"]"#, None)).unwrap();
        assert!(js.contains(r#"a[title=\"it's\"]"#));
    }

    #[tokio::test]
    async fn failing_field_becomes_null_not_an_error() {
        let eval = ScriptedEvaluator {
            responses: vec![
                Ok(Value::String("Hello".into())),
                Err(BrowserError::EvalFailed("detached".into())),
            ],
            calls: std::sync::Mutex::new(0),
        };
        let specs = vec![spec("title", "h1", None), spec("missing", ".gone", None)];

        let out = extract_fields(&eval, &specs).await.unwrap();
        assert_eq!(out["title"], Value::String("Hello".into()));
        assert_eq!(out["missing"], Value::Null);
    }
}
