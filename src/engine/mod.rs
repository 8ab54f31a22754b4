mod connection;
mod pipeline;

pub use pipeline::Outcome;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::{LoggingErrorSink, ProxyResult};
use crate::events::EventBus;
use crate::matcher::UrlMatcher;
use crate::mitm::{CertCache, CertificateAuthority};
use crate::platform::PlatformAdapter;
use crate::plugin::registry::PluginRegistry;
use crate::plugin::PluginContext;
use crate::state::ProxyState;

/// Owns every process-wide collaborator and runs the accept loop.
/// Grounded on `main.rs`'s bootstrap sequence (config load, build
/// services, run) and `service/http.rs`'s per-request filter sequencing,
/// reimplemented over a hand-rolled `tokio::net::TcpListener` loop since
/// the teacher's `pingora_proxy::ProxyHttp` trait assumes a fixed,
/// load-balanced upstream rather than an arbitrary client-specified
/// origin (see `DESIGN.md`).
pub struct InterceptionEngine {
    pub config: Config,
    pub state: Arc<ProxyState>,
    pub urls: Arc<UrlMatcher>,
    pub events: Arc<EventBus>,
    pub ca: Arc<CertificateAuthority>,
    pub cert_cache: Arc<CertCache>,
    pub http_client: reqwest::Client,
    pub platform: Arc<dyn PlatformAdapter>,
}

impl InterceptionEngine {
    pub fn new(config: Config, platform: Arc<dyn PlatformAdapter>) -> ProxyResult<Self> {
        let urls = Arc::new(UrlMatcher::compile(&config.urls_to_watch)?);
        let descriptors = config.plugin_descriptors();
        let registry = PluginRegistry::load(&descriptors)?;
        let events = Arc::new(EventBus::new(registry, Arc::new(LoggingErrorSink)));
        let state = Arc::new(ProxyState::new());
        if config.record {
            state.recording.start();
        }
        let ca_dir = crate::mitm::ca::default_ca_dir()?;
        let ca = Arc::new(CertificateAuthority::load_or_generate(&ca_dir)?);
        let cert_cache = Arc::new(CertCache::new());
        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(false)
            .build()
            .map_err(|e| crate::error::ProxyError::Internal(e.to_string()))?;

        let engine = Self {
            config,
            state,
            urls,
            events,
            ca,
            cert_cache,
            http_client,
            platform,
        };
        engine.events.init(&engine.plugin_context());
        Ok(engine)
    }

    pub fn from_cli(cli: &Cli, platform: Arc<dyn PlatformAdapter>) -> ProxyResult<Self> {
        let base = match &cli.config_file {
            Some(path) => Config::load_from_path(path)?,
            None => Config::default(),
        };
        let config = base.merge_with_cli(cli);
        Self::new(config, platform)
    }

    pub fn plugin_context(&self) -> PluginContext {
        PluginContext {
            urls: self.urls.clone(),
            state: self.state.clone(),
        }
    }

    pub async fn run(&self, cancellation: CancellationToken) -> ProxyResult<()> {
        let addr = format!("{}:{}", self.config.ip_address, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        log::info!("devproxy listening on {addr}");

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    log::info!("shutdown requested, draining connections");
                    if self.state.recording.is_recording() {
                        let entries = self.state.recording.stop();
                        self.events.recording_stopped(&self.plugin_context(), &entries).await;
                    }
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let engine = self.clone_handles();
                    let token = cancellation.clone();
                    tokio::spawn(async move {
                        if let Err(err) = connection::handle(engine, stream, token).await {
                            log::warn!("connection from {peer} ended with error: {err}");
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Cheap clone of the `Arc`-backed collaborators a spawned connection
    /// task needs, without cloning the engine's owned `Config`.
    fn clone_handles(&self) -> Arc<EngineHandles> {
        Arc::new(EngineHandles {
            state: self.state.clone(),
            urls: self.urls.clone(),
            events: self.events.clone(),
            ca: self.ca.clone(),
            cert_cache: self.cert_cache.clone(),
            http_client: self.http_client.clone(),
            via_header: format!("devproxy/{}", env!("CARGO_PKG_VERSION")),
        })
    }
}

/// The subset of `InterceptionEngine` a connection-handling task needs,
/// split out so accepting a connection doesn't require cloning
/// configuration that never changes per-connection.
pub(crate) struct EngineHandles {
    pub state: Arc<ProxyState>,
    pub urls: Arc<UrlMatcher>,
    pub events: Arc<EventBus>,
    pub ca: Arc<CertificateAuthority>,
    pub cert_cache: Arc<CertCache>,
    pub http_client: reqwest::Client,
    pub via_header: String,
}

impl EngineHandles {
    pub fn plugin_context(&self) -> PluginContext {
        PluginContext {
            urls: self.urls.clone(),
            state: self.state.clone(),
        }
    }
}
