/// Replace `${ENV_VAR}` placeholders in config string values.
///
/// Unresolvable variables are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Implementation behind [`substitute_env`]; the injected lookup keeps it
/// testable without mutating the process environment.
fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        // Leave unresolved placeholder as-is.
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                // Malformed or empty name, emit literally.
                out.push_str("${");
                rest = after;
            },
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_var() {
        let lookup = |name: &str| (name == "LANTERN_PROFILE").then(|| "/data/profile".to_string());
        assert_eq!(
            substitute_with("profile_dir = \"${LANTERN_PROFILE}\"", lookup),
            "profile_dir = \"/data/profile\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_with("${LANTERN_MISSING_XYZ}", |_| None),
            "${LANTERN_MISSING_XYZ}"
        );
    }

    #[test]
    fn handles_multiple_and_plain_text() {
        let lookup = |name: &str| match name {
            "A" => Some("1".into()),
            "B" => Some("2".into()),
            _ => None,
        };
        assert_eq!(substitute_with("${A}-middle-${B}", lookup), "1-middle-2");
        assert_eq!(substitute_with("plain text", lookup), "plain text");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_with("tail ${OPEN", |_| None), "tail ${OPEN");
    }
}
