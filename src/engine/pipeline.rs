use http::HeaderValue;

use crate::events::EventBus;
use crate::model::{LogKind, ProxyRequest, ProxyResponse, RequestLog};
use crate::plugin::PluginContext;
use crate::session::SessionData;

/// Result of running one request through the admission pipeline: either
/// a plugin produced a mocked response, or the engine still needs to
/// forward the (possibly plugin-modified) request to origin.
pub enum Outcome {
    Mocked(ProxyResponse),
    PassThrough(ProxyRequest),
}

/// Runs `before-request` for one admitted request. This is the pure,
/// socket-free half of the admission pipeline (`spec.md` §4.4); the
/// engine's connection-handling code (see `engine::connection`) is the
/// thin I/O shell around it. `mock-request` is not part of this flow —
/// it is raised out-of-band by the `w` hotkey (see `hotkeys.rs`).
pub async fn run_before_request(
    ctx: &PluginContext,
    events: &EventBus,
    session: &SessionData,
    mut request: ProxyRequest,
) -> Outcome {
    if let Some(response) = events.before_request(ctx, session, &mut request).await {
        return Outcome::Mocked(response);
    }
    Outcome::PassThrough(request)
}

/// Runs `before-response` then `after-response`, and appends the
/// `Via` header the way `spec.md` §6 specifies.
pub async fn run_after_origin_response(
    ctx: &PluginContext,
    events: &EventBus,
    session: &SessionData,
    request: &ProxyRequest,
    mut response: ProxyResponse,
    via_header: &str,
) -> ProxyResponse {
    events.before_response(ctx, session, request, &mut response).await;
    if let Ok(value) = HeaderValue::from_str(via_header) {
        response.headers.insert(http::header::VIA, value);
    }
    events.after_response(ctx, session, request, &response).await;
    response
}

pub fn log_for_mocked(request: &ProxyRequest, response: &ProxyResponse) -> RequestLog {
    let mut log = RequestLog::new(
        LogKind::ResponseMocked,
        vec![format!("mocked {} for {}", response.status, request.url)],
    );
    log.method = Some(request.method.to_string());
    log.url = Some(request.url.clone());
    log
}

pub fn log_for_pass_through(request: &ProxyRequest, response: &ProxyResponse) -> RequestLog {
    let mut log = RequestLog::new(
        LogKind::ResponseFromOrigin,
        vec![format!("{} -> {}", request.url, response.status)],
    );
    log.method = Some(request.method.to_string());
    log.url = Some(request.url.clone());
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoggingErrorSink;
    use crate::matcher::UrlMatcher;
    use crate::model::ProxyRequest;
    use crate::plugin::registry::PluginRegistry;
    use crate::plugin::sample_plugins::{BlockPlugin, EchoPlugin};
    use crate::state::ProxyState;
    use http::{HeaderMap, Method, StatusCode};
    use std::sync::Arc;

    fn ctx() -> PluginContext {
        PluginContext {
            urls: Arc::new(UrlMatcher::compile(&[]).unwrap()),
            state: Arc::new(ProxyState::new()),
        }
    }

    #[tokio::test]
    async fn echo_plugin_passes_through() {
        let registry =
            PluginRegistry::load(&[crate::plugin::PluginDescriptor {
                name: EchoPlugin::NAME.to_string(),
                enabled: true,
                config_section: serde_json::Value::Null,
                urls_to_watch: vec![],
            }])
            .unwrap();
        let events = EventBus::new(registry, Arc::new(LoggingErrorSink));
        let c = ctx();
        let session = SessionData::default();
        let request = ProxyRequest::new(Method::GET, "https://example.com/", HeaderMap::new());
        match run_before_request(&c, &events, &session, request).await {
            Outcome::PassThrough(req) => assert_eq!(req.url, "https://example.com/"),
            Outcome::Mocked(_) => panic!("echo plugin should not mock"),
        }
        assert_eq!(
            session.get("echo.seen_url"),
            Some(serde_json::Value::String("https://example.com/".into()))
        );
    }

    #[tokio::test]
    async fn block_plugin_mocks_response() {
        let registry =
            PluginRegistry::load(&[crate::plugin::PluginDescriptor {
                name: BlockPlugin::NAME.to_string(),
                enabled: true,
                config_section: serde_json::Value::Null,
                urls_to_watch: vec![],
            }])
            .unwrap();
        let events = EventBus::new(registry, Arc::new(LoggingErrorSink));
        let c = ctx();
        let session = SessionData::default();
        let request = ProxyRequest::new(Method::GET, "https://example.com/", HeaderMap::new());
        match run_before_request(&c, &events, &session, request).await {
            Outcome::Mocked(resp) => assert_eq!(resp.status, StatusCode::FORBIDDEN),
            Outcome::PassThrough(_) => panic!("block plugin should mock"),
        }
        assert!(session.response_state.has_been_set());
    }

    #[tokio::test]
    async fn via_header_is_appended_on_response() {
        let registry =
            PluginRegistry::load(&[crate::plugin::PluginDescriptor {
                name: EchoPlugin::NAME.to_string(),
                enabled: true,
                config_section: serde_json::Value::Null,
                urls_to_watch: vec![],
            }])
            .unwrap();
        let events = EventBus::new(registry, Arc::new(LoggingErrorSink));
        let c = ctx();
        let session = SessionData::default();
        let request = ProxyRequest::new(Method::GET, "https://example.com/", HeaderMap::new());
        let response = ProxyResponse::new(StatusCode::OK);
        let response = run_after_origin_response(&c, &events, &session, &request, response, "devproxy/0.1.0").await;
        assert_eq!(response.headers.get(http::header::VIA).unwrap(), "devproxy/0.1.0");
    }
}
