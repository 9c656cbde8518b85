use std::num::NonZeroU32;
use std::time::Duration;

use serde::Deserialize;

use crate::rpc::{RateLimitConfig, RetryConfig, RpcClientConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url_env_var: String,
    pub request_timeout_secs: Option<u64>,
    /// Client-side request ceiling; unlimited when absent
    pub requests_per_second: Option<u32>,
    pub max_retries: Option<u32>,
}

impl ChainConfig {
    /// Builds the RPC client settings once the endpoint URL is known.
    pub fn rpc_client_config(&self, rpc_url: &str) -> anyhow::Result<RpcClientConfig> {
        let url = rpc_url
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid RPC URL in {}: {}", self.rpc_url_env_var, e))?;

        let mut config = RpcClientConfig::new(url)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs.unwrap_or(30)));

        if let Some(max_retries) = self.max_retries {
            config = config.with_retry(RetryConfig::new(max_retries));
        }
        if let Some(rps) = self.requests_per_second.and_then(NonZeroU32::new) {
            config = config.with_rate_limit(RateLimitConfig::per_second(rps));
        }

        Ok(config)
    }
}
