//! Secret wrapper for credentials sourced at runtime

use std::fmt;
use std::path::Path;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Sensitive value - redacted in Debug/Display/logs, zeroized on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Resolve a secret from the environment, falling back to a file.
///
/// Resolution order:
/// 1. `env_var` (non-empty after trimming)
/// 2. contents of `file`, trimmed
///
/// Returns `Ok(None)` when neither source yields a value. A configured file
/// that cannot be read is an error rather than a silent `None`.
pub fn resolve_secret(env_var: &str, file: Option<&Path>) -> Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var) {
        let value = value.trim().to_owned();
        if !value.is_empty() {
            return Ok(Some(Secret::new(value)));
        }
    }

    let Some(path) = file else {
        return Ok(None);
    };

    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "failed to read secret file {} (for {env_var}): {e}",
            path.display()
        ))
    })?;
    let value = contents.trim().to_owned();
    if value.is_empty() {
        tracing::warn!(path = %path.display(), env_var, "secret file is empty");
        return Ok(None);
    }
    Ok(Some(Secret::new(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    #[test]
    fn secret_redacts_debug_and_display() {
        let secret = Secret::new(String::from("client-secret-value"));
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn secret_exposes_value() {
        let secret = Secret::new(String::from("client-secret-value"));
        assert_eq!(secret.expose(), "client-secret-value");
        assert!(!secret.is_empty());
        assert!(Secret::new(String::from("   ")).is_empty());
    }

    #[test]
    fn resolve_prefers_env_over_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "from-file\n").unwrap();

        unsafe { set_env("COMMON_TEST_SECRET_A", "from-env") };
        let secret = resolve_secret("COMMON_TEST_SECRET_A", Some(&path))
            .unwrap()
            .unwrap();
        assert_eq!(secret.expose(), "from-env");
        unsafe { remove_env("COMMON_TEST_SECRET_A") };
    }

    #[test]
    fn resolve_reads_trimmed_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "  from-file\n").unwrap();

        unsafe { remove_env("COMMON_TEST_SECRET_B") };
        let secret = resolve_secret("COMMON_TEST_SECRET_B", Some(&path))
            .unwrap()
            .unwrap();
        assert_eq!(secret.expose(), "from-file");
    }

    #[test]
    fn resolve_without_sources_is_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("COMMON_TEST_SECRET_C") };
        assert!(resolve_secret("COMMON_TEST_SECRET_C", None).unwrap().is_none());
    }

    #[test]
    fn resolve_missing_file_is_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("COMMON_TEST_SECRET_D") };
        let result = resolve_secret(
            "COMMON_TEST_SECRET_D",
            Some(Path::new("/nonexistent/secret/file")),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn resolve_whitespace_file_is_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, " \n ").unwrap();

        unsafe { remove_env("COMMON_TEST_SECRET_E") };
        assert!(
            resolve_secret("COMMON_TEST_SECRET_E", Some(&path))
                .unwrap()
                .is_none()
        );
    }
}
