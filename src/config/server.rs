//! HTTP endpoint configuration.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Settings for the status HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the server binds to, e.g. `0.0.0.0:8080`.
    #[validate(custom(function = "validate_bind_address"))]
    pub bind_address: String,
}

fn validate_bind_address(address: &str) -> Result<(), ValidationError> {
    address.parse::<SocketAddr>().map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("invalid_bind_address");
        err.message = Some(format!("Invalid bind address: {}", address).into());
        err
    })
}

impl ServerConfig {
    /// Parsed bind address. Validation guarantees this succeeds for loaded configs.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_address.parse()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}
