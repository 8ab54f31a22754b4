use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl ProxyRequest {
    pub fn new(method: Method, url: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            url: url.into(),
            headers,
            body: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl ProxyResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// Kind of entry appended to the recording buffer / printed to the boxed
/// console log, per `spec.md` §6's `RequestLog` wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogKind {
    RequestIntercepted,
    ResponseFromOrigin,
    ResponseMocked,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub kind: LogKind,
    pub message_lines: Vec<String>,
    pub method: Option<String>,
    pub url: Option<String>,
}

impl RequestLog {
    pub fn new(kind: LogKind, message_lines: Vec<String>) -> Self {
        Self {
            kind,
            message_lines,
            method: None,
            url: None,
        }
    }
}

/// Carried by the core as opaque per-session/global data under a
/// well-known key; the core never applies throttling itself, only stores
/// and hands this back to plugins (`spec.md` §3). `should_throttle`
/// is supplied by the plugin that populated this entry; the core calls
/// it, but never inspects `throttling_key`/`reset_time` itself.
#[derive(Debug, Clone)]
pub struct ThrottlerInfo {
    pub throttling_key: String,
    pub reset_time: std::time::Instant,
    pub should_throttle: fn(&ThrottlerInfo) -> bool,
}

pub const THROTTLER_INFO_KEY: &str = "throttler_info";
pub const GLOBAL_REPORTS_KEY: &str = "reports";
