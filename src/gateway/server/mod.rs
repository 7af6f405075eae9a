//! Top-level gateway service: binds the listener, builds the shared
//! IRIS connection pool, translation cache, and cancellation registry
//! once, then spawns one task per accepted connection.

mod connection;
mod listener;
mod registry;

pub use listener::Listener;
pub use registry::CancelRegistry;

use std::sync::Arc;

use tracing::{error, info, info_span};

use crate::gateway::common::Result;
use crate::gateway::config::Settings;
use crate::gateway::iris::{self, AuthStrategy, Connector};
use crate::gateway::sql::TranslationCache;

const TRANSLATION_CACHE_CAPACITY: usize = 4096;

pub struct GatewayService {
    listener: Listener,
    settings: &'static Settings,
    pool: Arc<iris::ConnectionPool>,
    cache: Arc<TranslationCache>,
    auth: Arc<dyn AuthStrategy>,
    registry: Arc<CancelRegistry>,
}

impl GatewayService {
    pub fn new(settings: &'static Settings, connector: Arc<dyn Connector>) -> Result<Self> {
        let listener = Listener::new(format!("{}:{}", settings.listen.host, settings.listen.port), settings.listen.reuseport)?;
        let pool = iris::ConnectionPool::new(connector, settings.iris.clone(), settings.pool.clone());
        let cache = Arc::new(TranslationCache::new(TRANSLATION_CACHE_CAPACITY));
        let auth: Arc<dyn AuthStrategy> = Arc::from(iris::from_config(&settings.iris));
        let registry = Arc::new(CancelRegistry::new());
        Ok(Self { listener, settings, pool, cache, auth, registry })
    }

    /// Accepts connections until the listener's socket errors out, spawning
    /// one task per connection. Each task's own errors (protocol violations,
    /// I/O failures, client disconnects) are logged and otherwise swallowed
    /// so one bad connection never brings down the listener.
    pub async fn run(&self) {
        let _span = info_span!("gateway listener", addr = %self.settings.listen.host, port = self.settings.listen.port).entered();
        info!("accepting connections");
        while let Some(sock) = self.listener.accept().await {
            let settings = self.settings;
            let pool = self.pool.clone();
            let cache = self.cache.clone();
            let auth = self.auth.clone();
            let registry = self.registry.clone();
            tokio::spawn(async move {
                if let Err(e) = connection::handle(sock, settings, pool, cache, auth, registry).await {
                    error!(error = %e, "connection ended with error");
                }
            });
        }
        info!("listener stopped accepting connections");
    }
}
