//! Security utilities
//!
//! Provides:
//! - SecureString with zeroize, used for exported plaintext values
//! - Audit records for pipeline runs (never carry secret values)
//! - Sanitization of backend error text

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string that is zeroed on drop and redacted in `Debug`/`Display`
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    pub fn new(value: String) -> Self {
        Self { inner: value }
    }

    /// Get the string value (use with caution)
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString([REDACTED {} bytes])", self.len())
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Audit record for one decrypt or encrypt run
#[derive(Debug, Clone)]
pub struct AuditLog {
    pub operation: &'static str,
    pub document: PathBuf,
    pub format: String,
    pub backend: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: std::time::SystemTime,
}

impl AuditLog {
    pub fn new(operation: &'static str, document: &Path, format: impl ToString) -> Self {
        Self {
            operation,
            document: document.to_path_buf(),
            format: format.to_string(),
            backend: None,
            success: true,
            error: None,
            timestamp: std::time::SystemTime::now(),
        }
    }

    pub fn with_backend(mut self, backend: impl ToString) -> Self {
        self.backend = Some(backend.to_string());
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.success = false;
        self.error = Some(sanitize_error(error));
        self
    }

    /// Emit the record through tracing
    pub fn log(&self) {
        if self.success {
            tracing::info!(
                operation = self.operation,
                document = %self.document.display(),
                format = %self.format,
                backend = ?self.backend,
                timestamp = ?self.timestamp,
                "Document operation successful"
            );
        } else {
            tracing::warn!(
                operation = self.operation,
                document = %self.document.display(),
                format = %self.format,
                backend = ?self.backend,
                error = ?self.error,
                timestamp = ?self.timestamp,
                "Document operation failed"
            );
        }
    }
}

static REDACTIONS: LazyLock<Vec<(regex::Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(token|password|passwd|secret|api[_-]?key)=\S+", "$1=[REDACTED]"),
        (r"AGE-SECRET-KEY-1[0-9A-Z]+", "[REDACTED_AGE_KEY]"),
        // Base64-looking runs (48+ chars)
        (r"[A-Za-z0-9+/]{48,}={0,2}", "[REDACTED_BASE64]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| {
        regex::Regex::new(pattern)
            .ok()
            .map(|re| (re, replacement))
    })
    .collect()
});

/// Strip anything that looks like key material from error text
pub fn sanitize_error(error: &str) -> String {
    let mut sanitized = error.to_string();
    for (re, replacement) in REDACTIONS.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).into_owned();
    }
    sanitized
}
