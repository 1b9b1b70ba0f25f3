use std::collections::HashMap;
use std::sync::Arc;

use swapx_core::{ChainId, SwapxError};
use tracing::{info, warn};

use crate::plugin::ChainPlugin;

/// Process-wide registry of initialized chain plugins.
///
/// Built once at startup from configuration and passed by `Arc` into the
/// engine, recovery manager, and RPC server. Explicit lifecycle: register,
/// health-check, shutdown.
#[derive(Default)]
pub struct ChainRegistry {
    plugins: HashMap<ChainId, Arc<dyn ChainPlugin>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self { plugins: HashMap::new() }
    }

    pub fn register(&mut self, plugin: Arc<dyn ChainPlugin>) {
        info!(chain = %plugin.chain_id(), family = ?plugin.family(), "registered chain plugin");
        self.plugins.insert(plugin.chain_id().clone(), plugin);
    }

    pub fn get(&self, chain: &ChainId) -> Result<Arc<dyn ChainPlugin>, SwapxError> {
        self.plugins
            .get(chain)
            .cloned()
            .ok_or_else(|| SwapxError::UnknownChain(chain.to_string()))
    }

    pub fn contains(&self, chain: &ChainId) -> bool {
        self.plugins.contains_key(chain)
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn ChainPlugin>> {
        self.plugins.values()
    }

    /// Probe every chain's tip height. Unreachable chains are reported, not
    /// fatal: the engine keeps serving the chains that answer.
    pub async fn health_check(&self) -> Vec<(ChainId, Result<u64, SwapxError>)> {
        let mut out = Vec::with_capacity(self.plugins.len());
        for plugin in self.plugins.values() {
            let result = plugin.tip_height().await;
            if let Err(e) = &result {
                warn!(chain = %plugin.chain_id(), error = %e, "chain health check failed");
            }
            out.push((plugin.chain_id().clone(), result));
        }
        out
    }

    pub async fn shutdown(&self) {
        for plugin in self.plugins.values() {
            plugin.shutdown().await;
        }
        info!("chain registry shut down");
    }
}
