use std::cell::Cell;
use std::sync::Arc;

use crate::error::{ErrorSink, ProxyError};
use crate::model::{ProxyRequest, ProxyResponse, RequestLog};
use crate::plugin::registry::PluginRegistry;
use crate::plugin::PluginContext;
use crate::session::SessionData;

thread_local! {
    static IN_AFTER_REQUEST_LOG: Cell<bool> = Cell::new(false);
}

/// Sequentially dispatches the eight lifecycle events across the plugins
/// in `PluginRegistry`, in registration order, awaiting each plugin
/// before starting the next (`spec.md` §4.4's ordering invariant).
///
/// `init` and `options-loaded` run once at startup and are not wrapped
/// in fault isolation; a plugin that panics/errors there is treated as a
/// fatal startup failure, matching `spec.md`. The four per-request
/// events are fault-isolated: a plugin error is forwarded to the
/// `ErrorSink` and dispatch continues with the next plugin rather than
/// aborting the whole pipeline.
pub struct EventBus {
    registry: PluginRegistry,
    error_sink: Arc<dyn ErrorSink>,
}

impl EventBus {
    pub fn new(registry: PluginRegistry, error_sink: Arc<dyn ErrorSink>) -> Self {
        Self { registry, error_sink }
    }

    pub fn init(&self, ctx: &PluginContext) {
        for plugin in self.registry.plugins() {
            plugin.init(ctx);
        }
    }

    pub fn options_loaded(&self, ctx: &PluginContext, options: &serde_json::Value) {
        for plugin in self.registry.plugins() {
            plugin.options_loaded(ctx, options);
        }
    }

    /// Runs every plugin's `before_request` in registration order. The
    /// first plugin to return `Some(response)` wins the request; later
    /// plugins still run (mirroring dev-proxy's own convention of letting
    /// each plugin check `session.response_state` itself) but a response
    /// already produced is never overwritten by a later plugin's.
    pub async fn before_request(
        &self,
        ctx: &PluginContext,
        session: &SessionData,
        request: &mut ProxyRequest,
    ) -> Option<ProxyResponse> {
        let mut produced = None;
        for plugin in self.registry.plugins() {
            match plugin.before_request(ctx, session, request).await {
                Ok(Some(response)) if produced.is_none() => {
                    session.response_state.mark_set();
                    produced = Some(response);
                }
                Ok(_) => {}
                Err(err) => self.report(plugin.name(), err),
            }
        }
        produced
    }

    /// Raised only by the `w` hotkey (`spec.md` §4.5/§9): tells every
    /// plugin that the operator wants the next matching request mocked.
    /// Carries no request/response of its own; plugins act on it by
    /// recording intent in `GlobalData` for their own `before_request` to
    /// consult.
    pub async fn mock_request(&self, ctx: &PluginContext) {
        for plugin in self.registry.plugins() {
            if let Err(err) = plugin.mock_request(ctx).await {
                self.report(plugin.name(), err);
            }
        }
    }

    pub async fn before_response(
        &self,
        ctx: &PluginContext,
        session: &SessionData,
        request: &ProxyRequest,
        response: &mut ProxyResponse,
    ) {
        for plugin in self.registry.plugins() {
            if let Err(err) = plugin.before_response(ctx, session, request, response).await {
                self.report(plugin.name(), err);
            }
        }
    }

    pub async fn after_response(
        &self,
        ctx: &PluginContext,
        session: &SessionData,
        request: &ProxyRequest,
        response: &ProxyResponse,
    ) {
        for plugin in self.registry.plugins() {
            if let Err(err) = plugin.after_response(ctx, session, request, response).await {
                self.report(plugin.name(), err);
            }
        }
    }

    /// Guarded against recursion (Open Question 2, `DESIGN.md`): if a
    /// plugin's `after_request_log` handler itself causes a log to be
    /// emitted, that nested emission is downgraded to a plain
    /// `log::warn!` instead of being redispatched through this method.
    pub async fn after_request_log(
        &self,
        ctx: &PluginContext,
        session: &SessionData,
        entry: &RequestLog,
    ) {
        if IN_AFTER_REQUEST_LOG.with(|f| f.get()) {
            log::warn!(
                "dropped re-entrant after-request-log emission: {:?}",
                entry.message_lines
            );
            return;
        }
        IN_AFTER_REQUEST_LOG.with(|f| f.set(true));
        for plugin in self.registry.plugins() {
            if let Err(err) = plugin.after_request_log(ctx, session, entry).await {
                self.report(plugin.name(), err);
            }
        }
        IN_AFTER_REQUEST_LOG.with(|f| f.set(false));
    }

    pub async fn recording_stopped(&self, ctx: &PluginContext, entries: &[RequestLog]) {
        for plugin in self.registry.plugins() {
            if let Err(err) = plugin.recording_stopped(ctx, entries).await {
                self.report(plugin.name(), err);
            }
        }
    }

    fn report(&self, plugin: &str, err: crate::error::ProxyError) {
        self.error_sink.report(&ProxyError::Plugin {
            plugin: plugin.to_string(),
            source: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoggingErrorSink;
    use crate::matcher::UrlMatcher;
    use crate::model::{LogKind, ProxyRequest};
    use crate::plugin::registry::PluginRegistry;
    use crate::plugin::PluginDescriptor;
    use crate::state::ProxyState;
    use async_trait::async_trait;
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor(name: &str) -> PluginDescriptor {
        PluginDescriptor {
            name: name.to_string(),
            enabled: true,
            config_section: serde_json::Value::Null,
            urls_to_watch: Vec::new(),
        }
    }

    fn ctx() -> PluginContext {
        PluginContext {
            urls: Arc::new(UrlMatcher::compile(&[]).unwrap()),
            state: Arc::new(ProxyState::new()),
        }
    }

    struct OrderRecorder {
        label: &'static str,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl crate::plugin::Plugin for OrderRecorder {
        fn name(&self) -> &str {
            self.label
        }

        async fn before_request(
            &self,
            _ctx: &PluginContext,
            _session: &SessionData,
            _request: &mut ProxyRequest,
        ) -> crate::error::ProxyResult<Option<ProxyResponse>> {
            self.order.lock().unwrap().push(self.label);
            Ok(None)
        }
    }

    #[tokio::test]
    async fn dispatches_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let plugins: Vec<Arc<dyn crate::plugin::Plugin>> = vec![
            Arc::new(OrderRecorder { label: "first", order: order.clone() }),
            Arc::new(OrderRecorder { label: "second", order: order.clone() }),
        ];
        let bus = EventBus::new(
            test_registry(plugins),
            Arc::new(LoggingErrorSink),
        );
        let c = ctx();
        let session = SessionData::default();
        let mut req = ProxyRequest::new(Method::GET, "https://example.com/", http::HeaderMap::new());
        bus.before_request(&c, &session, &mut req).await;
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    fn test_registry(plugins: Vec<Arc<dyn crate::plugin::Plugin>>) -> PluginRegistry {
        PluginRegistry::from_plugins(plugins)
    }

    struct FaultyPlugin;

    #[async_trait]
    impl crate::plugin::Plugin for FaultyPlugin {
        fn name(&self) -> &str {
            "faulty"
        }

        async fn before_request(
            &self,
            _ctx: &PluginContext,
            _session: &SessionData,
            _request: &mut ProxyRequest,
        ) -> crate::error::ProxyResult<Option<ProxyResponse>> {
            Err(crate::error::ProxyError::Internal("boom".into()))
        }
    }

    #[tokio::test]
    async fn fault_in_one_plugin_does_not_abort_later_plugins() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let plugins: Vec<Arc<dyn crate::plugin::Plugin>> = vec![
            Arc::new(FaultyPlugin),
            Arc::new(OrderRecorder { label: "after-fault", order: order.clone() }),
        ];
        let bus = EventBus::new(test_registry(plugins), Arc::new(LoggingErrorSink));
        let c = ctx();
        let session = SessionData::default();
        let mut req = ProxyRequest::new(Method::GET, "https://example.com/", http::HeaderMap::new());
        bus.before_request(&c, &session, &mut req).await;
        assert_eq!(*order.lock().unwrap(), vec!["after-fault"]);
    }

    struct RespondingPlugin;

    #[async_trait]
    impl crate::plugin::Plugin for RespondingPlugin {
        fn name(&self) -> &str {
            "responder"
        }

        async fn before_request(
            &self,
            _ctx: &PluginContext,
            _session: &SessionData,
            _request: &mut ProxyRequest,
        ) -> crate::error::ProxyResult<Option<ProxyResponse>> {
            Ok(Some(ProxyResponse::new(http::StatusCode::IM_A_TEAPOT)))
        }
    }

    #[tokio::test]
    async fn before_request_can_set_a_response() {
        let bus = EventBus::new(test_registry(vec![Arc::new(RespondingPlugin)]), Arc::new(LoggingErrorSink));
        let c = ctx();
        let session = SessionData::default();
        let mut req = ProxyRequest::new(Method::GET, "https://example.com/", http::HeaderMap::new());
        let response = bus.before_request(&c, &session, &mut req).await;
        assert_eq!(response.unwrap().status, http::StatusCode::IM_A_TEAPOT);
        assert!(session.response_state.has_been_set());
    }

    #[tokio::test]
    async fn before_response_never_auto_marks_modified() {
        let bus = EventBus::new(test_registry(vec![Arc::new(OrderRecorder {
            label: "noop",
            order: Arc::new(std::sync::Mutex::new(Vec::new())),
        })]), Arc::new(LoggingErrorSink));
        let c = ctx();
        let session = SessionData::default();
        let req = ProxyRequest::new(Method::GET, "https://example.com/", http::HeaderMap::new());
        let mut response = ProxyResponse::new(http::StatusCode::OK);
        bus.before_response(&c, &session, &req, &mut response).await;
        assert!(!session.response_state.has_been_modified());
    }

    #[tokio::test]
    async fn recursive_after_request_log_is_downgraded() {
        let counter = Arc::new(AtomicUsize::new(0));
        struct Recursor(Arc<AtomicUsize>);
        #[async_trait]
        impl crate::plugin::Plugin for Recursor {
            fn name(&self) -> &str {
                "recursor"
            }
            async fn after_request_log(
                &self,
                _ctx: &PluginContext,
                _session: &SessionData,
                _log: &RequestLog,
            ) -> crate::error::ProxyResult<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let plugins: Vec<Arc<dyn crate::plugin::Plugin>> = vec![Arc::new(Recursor(counter.clone()))];
        let bus = EventBus::new(test_registry(plugins), Arc::new(LoggingErrorSink));
        let c = ctx();
        let session = SessionData::default();
        let entry = RequestLog::new(LogKind::RequestIntercepted, vec!["x".into()]);
        bus.after_request_log(&c, &session, &entry).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
