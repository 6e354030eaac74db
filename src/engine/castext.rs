//! Minimal castext: `{@name@}` placeholders and `[[kind:name]]` tags.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{@\s*([A-Za-z_][A-Za-z0-9_]*)\s*@\}").expect("castext placeholder pattern")
});

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[(input|validation|feedback):([A-Za-z_][A-Za-z0-9_]*)\]\]")
        .expect("castext tag pattern")
});

/// Text after substitution, with the keys of any runtime errors it raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub errors: Vec<String>,
}

pub fn unknown_variable(name: &str) -> String {
    format!("castext: unknown variable '{name}'")
}

/// Replaces every `{@name@}` with the value bound to `name`.
///
/// Unbound names render as `?` and each raises one error key.
pub fn substitute(template: &str, variables: &[(String, String)]) -> Rendered {
    let mut errors = Vec::new();
    let text = PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            match variables.iter().rev().find(|(n, _)| n == name) {
                Some((_, value)) => value.clone(),
                None => {
                    let key = unknown_variable(name);
                    if !errors.contains(&key) {
                        errors.push(key);
                    }
                    "?".to_string()
                }
            }
        })
        .into_owned();
    Rendered { text, errors }
}

/// Whether `text` contains the `[[kind:name]]` tag.
pub fn has_tag(text: &str, kind: &str, name: &str) -> bool {
    text.contains(&format!("[[{kind}:{name}]]"))
}

/// Rewrites every `[[kind:name]]` tag through `replace(kind, name)`.
pub fn replace_tags<F>(text: &str, mut replace: F) -> String
where
    F: FnMut(&str, &str) -> String,
{
    TAG.replace_all(text, |caps: &Captures| replace(&caps[1], &caps[2]))
        .into_owned()
}

/// Comparison form of an answer: all whitespace removed.
pub fn normalise_answer(answer: &str) -> String {
    answer.chars().filter(|c| !c.is_whitespace()).collect()
}
