//! SDK configuration.

use openpass_state::{Network, NetworkConfig};
use std::env;

use crate::core::constants::{DEFAULT_ORIGIN, DEFAULT_RP_ID};
use crate::error::{Result, SdkError};

/// SDK configuration.
#[derive(Clone, Debug)]
pub struct SdkConfig {
    /// Deployment the SDK talks to.
    pub network: NetworkConfig,
    /// WebAuthn relying-party id.
    pub rp_id: String,
    /// Origin written into client data by the local authenticator.
    pub origin: String,
}

impl SdkConfig {
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            network,
            rp_id: DEFAULT_RP_ID.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
        }
    }

    /// Load configuration from environment variables, reading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = env::var("OPENPASS_ENV").unwrap_or_else(|_| "development".to_string());
        let mut network = Network::for_environment(&environment).config();

        if let Ok(url) = env::var("OPENPASS_RPC_URL") {
            network = network.with_rpc_url(non_empty("OPENPASS_RPC_URL", url)?);
        }
        if let Ok(url) = env::var("OPENPASS_BUNDLER_URL") {
            network = network.with_bundler_url(non_empty("OPENPASS_BUNDLER_URL", url)?);
        }

        let rp_id = env::var("OPENPASS_RP_ID").unwrap_or_else(|_| DEFAULT_RP_ID.to_string());
        let origin = env::var("OPENPASS_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());

        Ok(Self {
            network,
            rp_id,
            origin,
        })
    }
}

fn non_empty(name: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(SdkError::Config(format!("{name} is set but empty")));
    }
    Ok(value)
}
