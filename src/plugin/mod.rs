pub mod registry;
pub mod sample_plugins;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::ProxyResult;
use crate::matcher::UrlMatcher;
use crate::model::{ProxyRequest, ProxyResponse};
use crate::session::SessionData;
use crate::state::ProxyState;

/// A CLI flag a plugin contributes to the devproxy binary (`spec.md`
/// §6's "Plugin ABI"). Options are merged first-wins by name: if two
/// plugins declare the same flag name, the one registered earlier keeps
/// it and the later one is dropped with a warning.
#[derive(Debug, Clone)]
pub struct CliOption {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CliCommand {
    pub name: String,
    pub description: String,
}

/// Shared, read-only context handed to every plugin at registration and
/// dispatch time: the compiled URL matcher and the process-wide state
/// bag. Plugins reach session-local data through the `SessionData`
/// argument passed to each hook instead.
pub struct PluginContext {
    pub urls: Arc<UrlMatcher>,
    pub state: Arc<ProxyState>,
}

/// The plugin capability trait. Every hook has a no-op default so a
/// plugin only implements the lifecycle events it cares about, mirroring
/// the teacher's `ProxyPlugin` trait (`proxy/plugin.rs`). `init` and
/// `options_loaded` are synchronous per `spec.md` §4.4; the four
/// request/response events are async and awaited in registration order.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn get_options(&self) -> Vec<CliOption> {
        Vec::new()
    }

    fn get_commands(&self) -> Vec<CliCommand> {
        Vec::new()
    }

    fn init(&self, _ctx: &PluginContext) {}

    fn options_loaded(&self, _ctx: &PluginContext, _options: &JsonValue) {}

    /// Inspect or rewrite the request, and optionally produce the
    /// response outright (the only event that can, per `spec.md` §4.4).
    /// The first plugin in registration order to return `Some(..)` wins;
    /// plugins are expected to check `session.response_state` themselves
    /// before acting, the way dev-proxy's own plugins do.
    async fn before_request(
        &self,
        _ctx: &PluginContext,
        _session: &SessionData,
        _request: &mut ProxyRequest,
    ) -> ProxyResult<Option<ProxyResponse>> {
        Ok(None)
    }

    /// Raised only by the interactive `w` hotkey (`spec.md` §4.5/§9), not
    /// as part of the per-request pipeline: a manual signal that the
    /// operator wants the next matching request mocked. Plugins that
    /// want to act on this typically set a flag in `GlobalData` that
    /// their `before_request` implementation consults.
    async fn mock_request(&self, _ctx: &PluginContext) -> ProxyResult<()> {
        Ok(())
    }

    async fn before_response(
        &self,
        _ctx: &PluginContext,
        _session: &SessionData,
        _request: &ProxyRequest,
        _response: &mut ProxyResponse,
    ) -> ProxyResult<()> {
        Ok(())
    }

    async fn after_response(
        &self,
        _ctx: &PluginContext,
        _session: &SessionData,
        _request: &ProxyRequest,
        _response: &ProxyResponse,
    ) -> ProxyResult<()> {
        Ok(())
    }

    async fn after_request_log(
        &self,
        _ctx: &PluginContext,
        _session: &SessionData,
        _log: &crate::model::RequestLog,
    ) -> ProxyResult<()> {
        Ok(())
    }

    async fn recording_stopped(
        &self,
        _ctx: &PluginContext,
        _entries: &[crate::model::RequestLog],
    ) -> ProxyResult<()> {
        Ok(())
    }
}

/// A plugin entry as loaded from config: its declaration-order position
/// is implicit in the `Vec` it lives in (`plugin::registry::PluginRegistry`).
pub struct PluginDescriptor {
    pub name: String,
    pub enabled: bool,
    pub config_section: JsonValue,
    pub urls_to_watch: Vec<String>,
}
