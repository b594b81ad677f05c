//! Environment-reference expansion, run as a pre-parse pass over the whole
//! configuration document.
//!
//! Extends the single-value `${VAR}` substitution used elsewhere for DSNs
//! (short-circuiting on the first missing variable) with a default-value
//! form, `${VAR:-default}`, and with accumulated rather than short-circuited
//! errors so a document with several unresolved references reports all of
//! them at once.

use std::env;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-((?:[^}\\]|\\.)*))?\}").unwrap()
});

#[derive(Debug, Error)]
#[error("unresolved environment variable(s): {}", .0.join(", "))]
pub struct ExpansionError(pub Vec<String>);

/// Expands every `${NAME}` / `${NAME:-default}` token in `input`.
///
/// `${NAME}` with no binding is an unresolved-variable error; all such errors
/// across the whole document are collected and reported together.
pub fn expand(input: &str) -> Result<String, ExpansionError> {
    let mut unresolved = Vec::new();

    let output = TOKEN
        .replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            match env::var(name) {
                Ok(value) => value,
                Err(_) => match caps.get(2) {
                    Some(default) => unescape(default.as_str()),
                    None => {
                        unresolved.push(name.to_string());
                        String::new()
                    }
                },
            }
        })
        .into_owned();

    if unresolved.is_empty() {
        Ok(output)
    } else {
        Err(ExpansionError(unresolved))
    }
}

fn unescape(body: &str) -> String {
    body.replace("\\}", "}").replace("\\\\", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(expand("no tokens here").unwrap(), "no tokens here");
    }

    #[test]
    fn default_used_when_var_unbound() {
        env::remove_var("HEARTHKIT_TEST_UNSET");
        let out = expand("token: \"${HEARTHKIT_TEST_UNSET:-bar}\"").unwrap();
        assert_eq!(out, "token: \"bar\"");
    }

    #[test]
    fn bound_var_wins_over_default() {
        env::set_var("HEARTHKIT_TEST_BOUND", "value");
        let out = expand("x: ${HEARTHKIT_TEST_BOUND:-fallback}").unwrap();
        assert_eq!(out, "x: value");
        env::remove_var("HEARTHKIT_TEST_BOUND");
    }

    #[test]
    fn missing_var_without_default_is_unresolved() {
        env::remove_var("HEARTHKIT_TEST_MISSING");
        let err = expand("secret: ${HEARTHKIT_TEST_MISSING}").unwrap_err();
        assert_eq!(err.0, vec!["HEARTHKIT_TEST_MISSING"]);
    }

    #[test]
    fn multiple_unresolved_vars_are_accumulated() {
        env::remove_var("HEARTHKIT_TEST_A");
        env::remove_var("HEARTHKIT_TEST_B");
        let err = expand("a: ${HEARTHKIT_TEST_A}\nb: ${HEARTHKIT_TEST_B}").unwrap_err();
        assert_eq!(err.0, vec!["HEARTHKIT_TEST_A", "HEARTHKIT_TEST_B"]);
    }
}
