//! Prompt template rendering.
//!
//! Templates carry `{{key}}` placeholders. Rendering is a single
//! left-to-right pass: substituted text is never re-scanned, so a
//! replacement value containing `{{...}}` cannot trigger recursive
//! substitution.

use std::collections::HashMap;

/// Replaces every `{{key}}` occurrence for each key in `vars`.
/// Unmatched placeholders are left verbatim. Pure, infallible.
pub fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated opener: emit it and keep scanning.
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_single_key() {
        let vars = HashMap::from([("name", "Ada")]);
        assert_eq!(render("Hello {{name}}!", &vars), "Hello Ada!");
    }

    #[test]
    fn test_render_substitutes_multiple_keys_order_independent() {
        let vars = HashMap::from([("a", "1"), ("b", "2")]);
        assert_eq!(render("{{b}}-{{a}}-{{b}}", &vars), "2-1-2");
    }

    #[test]
    fn test_render_leaves_unmatched_placeholders_verbatim() {
        let vars = HashMap::from([("known", "x")]);
        assert_eq!(
            render("{{known}} and {{unknown}}", &vars),
            "x and {{unknown}}"
        );
    }

    #[test]
    fn test_render_does_not_rescan_substituted_text() {
        // A value that itself looks like a placeholder must come out
        // literally, not be expanded a second time.
        let vars = HashMap::from([("a", "{{b}}"), ("b", "boom")]);
        assert_eq!(render("{{a}}", &vars), "{{b}}");
    }

    #[test]
    fn test_render_handles_unterminated_opener() {
        let vars = HashMap::from([("a", "1")]);
        assert_eq!(render("{{a}} then {{oops", &vars), "1 then {{oops");
    }

    #[test]
    fn test_render_empty_template() {
        assert_eq!(render("", &HashMap::new()), "");
    }
}
