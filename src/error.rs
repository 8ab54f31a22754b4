use std::fmt;

/// Error categories for the proxy core, grouped the way `spec.md` §7
/// groups them: config/startup, matcher/admission, plugin runtime,
/// TLS/MITM, and I/O.
#[derive(Debug)]
pub enum ProxyError {
    Configuration(String),
    Matcher(String),
    Plugin { plugin: String, source: String },
    Tls(String),
    Io(std::io::Error),
    Internal(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            ProxyError::Matcher(msg) => write!(f, "matcher error: {msg}"),
            ProxyError::Plugin { plugin, source } => {
                write!(f, "plugin '{plugin}' failed: {source}")
            }
            ProxyError::Tls(msg) => write!(f, "tls error: {msg}"),
            ProxyError::Io(err) => write!(f, "io error: {err}"),
            ProxyError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(err)
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Configuration(err.to_string())
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;

/// Adds a short context prefix to an error, mirroring the teacher's
/// `ErrorContext::with_context` helper.
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> ProxyResult<T>;
}

impl<T, E: fmt::Display> ErrorContext<T> for Result<T, E> {
    fn with_context(self, context: &str) -> ProxyResult<T> {
        self.map_err(|e| ProxyError::Internal(format!("{context}: {e}")))
    }
}

/// Where plugin-runtime faults and other non-fatal errors are forwarded.
/// The default implementation logs at error level via the `log` crate,
/// matching `spec.md`'s default sink behavior.
pub trait ErrorSink: Send + Sync {
    fn report(&self, err: &ProxyError);
}

#[derive(Default)]
pub struct LoggingErrorSink;

impl ErrorSink for LoggingErrorSink {
    fn report(&self, err: &ProxyError) {
        log::error!("{err}");
    }
}
