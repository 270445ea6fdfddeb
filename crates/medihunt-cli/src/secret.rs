//! Secret references in `config.toml`.
//!
//! `pass::path/in/store` reads the first line of `pass show path/in/store`,
//! `env::VAR_NAME` reads `$VAR_NAME`. Anything else is a literal value.

use std::process::Command;

use thiserror::Error;

/// Errors produced while resolving a secret reference.
#[derive(Debug, Error)]
pub enum SecretError {
    /// `pass` could not be started.
    #[error("failed to run `pass show {path}`: {source}")]
    PassSpawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// `pass` exited with an error or printed nothing.
    #[error("`pass show {path}` failed: {detail}")]
    PassFailed { path: String, detail: String },

    /// The referenced variable is unset or not unicode.
    #[error("environment variable `{0}` is not set")]
    MissingEnv(String),
}

/// A parsed config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef<'a> {
    /// Entry of the `pass` password store.
    Pass(&'a str),
    /// Environment variable.
    Env(&'a str),
    /// Literal value.
    Plain(&'a str),
}

impl<'a> SecretRef<'a> {
    /// Parses a config value.
    pub fn parse(value: &'a str) -> Self {
        if let Some(path) = value.strip_prefix("pass::") {
            Self::Pass(path.trim())
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var.trim())
        } else {
            Self::Plain(value)
        }
    }

    /// Resolves the reference to its value.
    pub fn resolve(&self) -> Result<String, SecretError> {
        match self {
            Self::Pass(path) => pass_show(path),
            Self::Env(var) => std::env::var(var).map_err(|_| SecretError::MissingEnv(var.to_string())),
            Self::Plain(value) => Ok(value.to_string()),
        }
    }
}

/// Resolves a value that may be a secret reference.
pub fn resolve(value: &str) -> Result<String, SecretError> {
    SecretRef::parse(value).resolve()
}

fn pass_show(path: &str) -> Result<String, SecretError> {
    let output = Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|source| SecretError::PassSpawn {
            path: path.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SecretError::PassFailed {
            path: path.to_string(),
            detail: format!("{}: {}", output.status, stderr.trim()),
        });
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| SecretError::PassFailed {
            path: path.to_string(),
            detail: "no output".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixes() {
        assert_eq!(SecretRef::parse("pass::portal/jan"), SecretRef::Pass("portal/jan"));
        assert_eq!(SecretRef::parse("env::MEDICOVER_PASS"), SecretRef::Env("MEDICOVER_PASS"));
        assert_eq!(SecretRef::parse("hunter2"), SecretRef::Plain("hunter2"));
        assert_eq!(SecretRef::parse(""), SecretRef::Plain(""));
    }

    #[test]
    fn env_reference_resolves() {
        unsafe {
            std::env::set_var("_MEDIHUNT_TEST_SECRET", "s3cret");
        }
        assert_eq!(resolve("env::_MEDIHUNT_TEST_SECRET").unwrap(), "s3cret");
        unsafe {
            std::env::remove_var("_MEDIHUNT_TEST_SECRET");
        }
    }

    #[test]
    fn missing_env_reference_errors() {
        let err = resolve("env::_MEDIHUNT_NONEXISTENT_VAR_12345").unwrap_err();
        assert!(err.to_string().contains("not set"));
    }

    #[test]
    fn unknown_pass_entry_errors() {
        assert!(resolve("pass::medihunt/nonexistent/entry/12345").is_err());
    }
}
