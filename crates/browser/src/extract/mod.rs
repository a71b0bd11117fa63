//! Extraction strategies.
//!
//! Every strategy follows the same shape: harvest raw data from the page
//! with one JavaScript pass, then parse and shape it in Rust where it can
//! be tested without a browser. The [`Evaluator`] trait is the seam that
//! makes the Rust side testable.

pub mod fields;
pub mod maps;
pub mod search;

use {async_trait::async_trait, chromiumoxide::Page, serde_json::Value};

use crate::error::{BrowserError, Result};

/// JavaScript evaluation seam. The live implementation is [`Page`];
/// tests substitute canned values.
#[async_trait]
pub trait Evaluator: Sync {
    async fn eval(&self, js: &str) -> Result<Value>;
}

#[async_trait]
impl Evaluator for Page {
    async fn eval(&self, js: &str) -> Result<Value> {
        let value = self
            .evaluate(js)
            .await
            .map_err(|e| BrowserError::EvalFailed(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::EvalFailed(e.to_string()))?;
        Ok(value)
    }
}

/// Evaluate a caller-supplied expression against the page.
///
/// If the expression evaluates to a function it is invoked with the
/// caller's argument; otherwise its value is returned as-is. Callers must
/// hold the `allow_eval` capability before this is ever reached.
pub async fn evaluate_expression(
    eval: &dyn Evaluator,
    expression: &str,
    args: Option<&Value>,
) -> Result<Value> {
    let arg_json = match args {
        Some(v) => serde_json::to_string(v)
            .map_err(|e| BrowserError::InvalidRequest(format!("unserializable eval args: {e}")))?,
        None => "undefined".to_owned(),
    };
    let js = format!(
        "(() => {{ const __expr = ({expression}); \
         return (typeof __expr === 'function') ? __expr({arg_json}) : __expr; }})()"
    );
    eval.eval(&js).await
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct EchoEvaluator;

    #[async_trait]
    impl Evaluator for EchoEvaluator {
        async fn eval(&self, js: &str) -> Result<Value> {
            Ok(Value::String(js.to_owned()))
        }
    }

    #[tokio::test]
    async fn expression_is_wrapped_and_invoked_when_callable() {
        let out = evaluate_expression(&EchoEvaluator, "() => document.title", None)
            .await
            .unwrap();
        let js = out.as_str().unwrap();
        assert!(js.contains("(() => document.title)"));
        assert!(js.contains("typeof __expr === 'function'"));
        assert!(js.contains("__expr(undefined)"));
    }

    #[tokio::test]
    async fn args_are_serialized_into_the_call() {
        let args = serde_json::json!({"limit": 3});
        let out = evaluate_expression(&EchoEvaluator, "(a) => a.limit", Some(&args))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().contains(r#"__expr({"limit":3})"#));
    }
}
