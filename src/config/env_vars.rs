use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::constants::RUN_ID_ENV_VAR;

lazy_static! {
    /// Matches `${VAR}` (group 1) and `$VAR` (group 2)
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Expand Unix-style environment variables (`$VAR` and `${VAR}`) in a value.
///
/// An unset `${VAR}` expands to the empty string; an unset `$VAR` is left
/// untouched so literal dollar signs in passwords survive.
pub fn expand_env_vars(value: &str) -> String {
    if !value.contains('$') {
        return value.to_string();
    }

    ENV_VAR_PATTERN
        .replace_all(value, |caps: &Captures| {
            if let Some(name) = caps.get(1) {
                std::env::var(name.as_str()).unwrap_or_default()
            } else {
                let name = &caps[2];
                std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
            }
        })
        .into_owned()
}

/// Pick the run identifier: an explicit value wins, then the CI environment.
///
/// `None` lets the uploader fall back to its default run id.
pub fn resolve_run_id(explicit: Option<&str>) -> Option<String> {
    resolve_run_id_with(explicit, |name| std::env::var(name).ok())
}

/// [`resolve_run_id`] with the environment lookup supplied by the caller
pub fn resolve_run_id_with<L>(explicit: Option<&str>, lookup: L) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    explicit
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| lookup(RUN_ID_ENV_VAR).filter(|id| !id.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_expand_brace_style() {
        env::set_var("UPLOADER_TEST_BRACE", "s3cret");
        assert_eq!(expand_env_vars("${UPLOADER_TEST_BRACE}"), "s3cret");
        assert_eq!(
            expand_env_vars("pre-${UPLOADER_TEST_BRACE}-post"),
            "pre-s3cret-post"
        );
        env::remove_var("UPLOADER_TEST_BRACE");
    }

    #[test]
    fn test_expand_dollar_style() {
        env::set_var("UPLOADER_TEST_HOST", "files.example.com");
        assert_eq!(
            expand_env_vars("$UPLOADER_TEST_HOST:22"),
            "files.example.com:22"
        );
        env::remove_var("UPLOADER_TEST_HOST");
    }

    #[test]
    fn test_expand_unset_variables() {
        assert_eq!(expand_env_vars("${UPLOADER_TEST_UNSET_A}"), "");
        assert_eq!(expand_env_vars("$UPLOADER_TEST_UNSET_B"), "$UPLOADER_TEST_UNSET_B");
        assert_eq!(expand_env_vars("pa$$word"), "pa$$word");
        assert_eq!(expand_env_vars("plain"), "plain");
    }

    fn environment(value: Option<&'static str>) -> impl Fn(&str) -> Option<String> {
        move |name| {
            assert_eq!(name, RUN_ID_ENV_VAR);
            value.map(str::to_string)
        }
    }

    #[test]
    fn test_resolve_run_id_explicit_wins() {
        assert_eq!(resolve_run_id(Some("42")), Some("42".to_string()));
        assert_eq!(
            resolve_run_id_with(Some("42"), environment(Some("9001"))),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_resolve_run_id_from_environment() {
        assert_eq!(
            resolve_run_id_with(None, environment(Some("9001"))),
            Some("9001".to_string())
        );
        assert_eq!(
            resolve_run_id_with(Some(""), environment(Some("9001"))),
            Some("9001".to_string())
        );
        assert_eq!(resolve_run_id_with(None, environment(Some(""))), None);
        assert_eq!(resolve_run_id_with(None, environment(None)), None);
    }
}
