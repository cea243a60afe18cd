use std::net::SocketAddr;

use dash_dispatch::{normalize_base_path, DEFAULT_BASE_PATH};
use serde::{Deserialize, Serialize};

/// Default origin of the Cloudflare v4 API
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    /// Path prefix the action routes are mounted under
    pub base_path: String,
    pub cloudflare_api_base: String,
    /// Sleep in the demo handlers the way a real backend would take time
    pub simulate_latency: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 4321)),
            base_path: DEFAULT_BASE_PATH.to_string(),
            cloudflare_api_base: CLOUDFLARE_API_BASE.to_string(),
            simulate_latency: true,
        }
    }
}

impl GatewayConfig {
    /// Base path in its canonical `""` or `/segment` form
    pub fn normalized_base_path(&self) -> String {
        normalize_base_path(&self.base_path)
    }
}
