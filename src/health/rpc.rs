//! JSON-RPC probe for blockchain endpoints.
//!
//! # Responsibilities
//! - Query `eth_blockNumber` (and optionally `eth_chainId`) on an endpoint
//! - Report the block height as check statistics
//! - Classify alloy errors into transport vs application failures

use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::{RpcError, TransportError};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::health::probe::Probe;

/// Statistics from one JSON-RPC probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCheckStats {
    pub block_number: u64,
}

type SharedProvider = Arc<dyn Provider + Send + Sync>;

/// Probe that checks an RPC node is serving the expected chain.
pub struct RpcProbe {
    expected_chain_id: Option<u64>,
    /// One provider per endpoint, reused across probes.
    providers: DashMap<String, SharedProvider>,
}

impl RpcProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            expected_chain_id: config.expected_chain_id,
            providers: DashMap::new(),
        }
    }

    fn provider(&self, endpoint: &str) -> Result<SharedProvider, ProbeError> {
        if let Some(provider) = self.providers.get(endpoint) {
            return Ok(provider.value().clone());
        }

        let url: url::Url = endpoint.parse().map_err(|e| {
            ProbeError::Transport(format!("Invalid RPC URL '{}': {}", endpoint, e))
        })?;
        let provider = Arc::new(ProviderBuilder::new().connect_http(url)) as SharedProvider;
        self.providers.insert(endpoint.to_string(), provider.clone());
        Ok(provider)
    }
}

impl std::fmt::Debug for RpcProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcProbe")
            .field("expected_chain_id", &self.expected_chain_id)
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl Probe<RpcCheckStats> for RpcProbe {
    fn check(&self, endpoint: &str) -> BoxFuture<'static, Result<RpcCheckStats, ProbeError>> {
        let provider = self.provider(endpoint);
        let expected_chain_id = self.expected_chain_id;

        Box::pin(async move {
            let provider = provider?;

            if let Some(expected) = expected_chain_id {
                let actual = provider.get_chain_id().await.map_err(classify)?;
                if actual != expected {
                    return Err(ProbeError::Application(format!(
                        "Chain ID mismatch: expected {}, got {}",
                        expected, actual
                    )));
                }
            }

            let block_number = provider.get_block_number().await.map_err(classify)?;
            Ok(RpcCheckStats { block_number })
        })
    }
}

/// Map an alloy transport error onto the probe error taxonomy.
///
/// The node answered (error payload or undecodable body): application error.
/// Anything else: transport error.
pub fn classify(err: TransportError) -> ProbeError {
    match err {
        RpcError::ErrorResp(payload) => ProbeError::Application(format!(
            "{} (code {})",
            payload.message, payload.code
        )),
        RpcError::DeserError { err, .. } => {
            ProbeError::Application(format!("invalid response: {}", err))
        }
        other => ProbeError::Transport(other.to_string()),
    }
}
