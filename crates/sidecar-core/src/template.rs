//! `{{name}}` placeholder substitution for prompt templates.
//!
//! Substitution is a single left-to-right pass over the body: a bound value
//! that itself contains `{{...}}` is emitted literally, never expanded again.
//! There is no escape syntax for a literal `{{`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex_lite::{Captures, Regex};

use crate::error::SidecarError;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder pattern is a valid regex")
    })
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders(body: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    placeholder_regex()
        .captures_iter(body)
        .filter_map(|c| {
            let name = c[1].to_string();
            seen.insert(name.clone()).then_some(name)
        })
        .collect()
}

/// Placeholder names with no binding.
pub fn missing(body: &str, bindings: &BTreeMap<String, String>) -> BTreeSet<String> {
    placeholder_regex()
        .captures_iter(body)
        .map(|c| c[1].to_string())
        .filter(|name| !bindings.contains_key(name))
        .collect()
}

/// Substitute every placeholder. Bindings not referenced by the body are ignored.
pub fn render(body: &str, bindings: &BTreeMap<String, String>) -> Result<String, SidecarError> {
    let names = missing(body, bindings);
    if !names.is_empty() {
        return Err(SidecarError::MissingVariable { names });
    }
    let rendered = placeholder_regex().replace_all(body, |c: &Captures<'_>| {
        bindings.get(&c[1]).cloned().unwrap_or_default()
    });
    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_placeholders_in_first_appearance_order() {
        assert_eq!(
            placeholders("{{b}} then {{a}} then {{b}} and {{ spaced }}"),
            vec!["b", "a"]
        );
        assert!(placeholders("no variables").is_empty());
    }

    #[test]
    fn test_render_substitutes_every_occurrence() {
        let out = render("Hi {{name}}, bye {{name}}", &vars(&[("name", "Ada")])).unwrap();
        assert_eq!(out, "Hi Ada, bye Ada");
    }

    #[test]
    fn test_render_reports_all_missing_names() {
        let err = render("{{a}} {{b}} {{c}}", &vars(&[("b", "x")])).unwrap_err();
        match err {
            SidecarError::MissingVariable { names } => {
                assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["a", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_ignores_unused_bindings() {
        let out = render("plain", &vars(&[("extra", "1")])).unwrap();
        assert_eq!(out, "plain");
    }

    #[test]
    fn test_bound_values_are_not_reexpanded() {
        let bindings = vec![("a", "{{b}}"), ("b", "boom")];
        let out = render("{{a}}", &vars(&bindings)).unwrap();
        assert_eq!(out, "{{b}}");
    }

    #[test]
    fn test_render_is_idempotent_without_placeholders_in_values() {
        let bindings = vars(&[("x", "1")]);
        assert_eq!(
            render("v={{x}} {{x}}", &bindings).unwrap(),
            render("v={{x}} {{x}}", &bindings).unwrap()
        );
        let once = render("v={{x}}", &bindings).unwrap();
        let twice = render(&once, &bindings).unwrap();
        assert_eq!(once, twice);
    }
}
