use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value as JsonValue;

use crate::error::ProxyResult;
use crate::model::ProxyResponse;
use crate::session::SessionData;

use super::{Plugin, PluginContext};

/// Minimal illustrative plugin that logs each intercepted request into
/// session-local scratch data, grounded on the teacher's own minimal
/// built-in plugin (`plugin/echo.rs`). Used by the integration tests to
/// exercise the before-request/after-response path end to end.
pub struct EchoPlugin;

impl EchoPlugin {
    pub const NAME: &'static str = "echo";

    pub fn create(_cfg: JsonValue) -> ProxyResult<Arc<dyn Plugin>> {
        Ok(Arc::new(EchoPlugin))
    }
}

#[async_trait]
impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn before_request(
        &self,
        _ctx: &PluginContext,
        session: &SessionData,
        request: &mut crate::model::ProxyRequest,
    ) -> ProxyResult<Option<ProxyResponse>> {
        session.set("echo.seen_url", JsonValue::String(request.url.clone()));
        Ok(None)
    }
}

/// Minimal illustrative plugin that short-circuits with a canned 403
/// response for any request it sees, used to exercise the mock/pass-
/// through branch of the dispatcher in tests.
pub struct BlockPlugin;

impl BlockPlugin {
    pub const NAME: &'static str = "block";

    pub fn create(_cfg: JsonValue) -> ProxyResult<Arc<dyn Plugin>> {
        Ok(Arc::new(BlockPlugin))
    }
}

#[async_trait]
impl Plugin for BlockPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn before_request(
        &self,
        _ctx: &PluginContext,
        _session: &SessionData,
        _request: &mut crate::model::ProxyRequest,
    ) -> ProxyResult<Option<ProxyResponse>> {
        Ok(Some(ProxyResponse::new(StatusCode::FORBIDDEN)))
    }
}
