//! Target address resolution
//!
//! The orchestrated environment is reachable either through an active named
//! host (queried via the machine tool) or, when there is none, on loopback.

use crate::compose::ComposeBackend;
use crate::errors::{Result, SetupError};
use std::fmt;
use tracing::{debug, info, instrument};

/// Loopback literal used when no named host is active
pub const LOOPBACK: &str = "127.0.0.1";

/// Resolved network address of the orchestrated environment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetAddress(String);

impl TargetAddress {
    /// Wrap an address, trimming surrounding whitespace
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_string())
    }

    pub fn loopback() -> Self {
        Self(LOOPBACK.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `http://<address>[:<port>]<path>`
    pub fn http_url(&self, port: Option<u16>, path: &str) -> String {
        match port {
            Some(port) => format!("http://{}:{}{}", self.0, port, path),
            None => format!("http://{}{}", self.0, path),
        }
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TargetAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolve the target address
///
/// A configured override wins. Otherwise a failing "active host" query means
/// no named host exists and loopback is used; a named host whose address
/// cannot be queried is a setup error.
#[instrument(skip(backend))]
pub async fn resolve_target_address<B: ComposeBackend>(
    backend: &B,
    override_address: Option<&str>,
) -> Result<TargetAddress> {
    if let Some(address) = override_address {
        debug!("Using configured target address {}", address);
        return Ok(TargetAddress::new(address));
    }

    let host = match backend.active_host().await {
        Ok(output) if output.success() && !output.trimmed().is_empty() => output.trimmed(),
        Ok(output) => {
            debug!("No active named host ({}), using loopback", output.status);
            return Ok(TargetAddress::loopback());
        }
        Err(e) => {
            debug!("Host query unavailable ({}), using loopback", e);
            return Ok(TargetAddress::loopback());
        }
    };

    let output = backend
        .host_address(&host)
        .await
        .map_err(|e| SetupError::AddressResolution {
            host: host.clone(),
            message: e.to_string(),
        })?;
    if !output.success() {
        return Err(SetupError::AddressResolution {
            host,
            message: output.describe(),
        }
        .into());
    }

    let address = output.trimmed();
    if address.is_empty() {
        return Err(SetupError::AddressResolution {
            host,
            message: "empty address".to_string(),
        }
        .into());
    }

    info!("Resolved active host '{}' to {}", host, address);
    Ok(TargetAddress::new(address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StevedoreError;
    use crate::mock::{MockBackend, MockBackendConfig, MockCommand};

    #[test]
    fn test_http_url() {
        let address = TargetAddress::new("10.0.0.5\n");
        assert_eq!(address.as_str(), "10.0.0.5");
        assert_eq!(
            address.http_url(Some(8080), "/health_check"),
            "http://10.0.0.5:8080/health_check"
        );
        assert_eq!(
            address.http_url(None, "/health_check"),
            "http://10.0.0.5/health_check"
        );
    }

    #[tokio::test]
    async fn test_no_active_host_falls_back_to_loopback() {
        let backend = MockBackend::new();
        backend.update_config(|c| c.active_host = None);

        let address = resolve_target_address(&backend, None).await.unwrap();
        assert_eq!(address.as_str(), LOOPBACK);
        assert_eq!(backend.calls(MockCommand::HostAddress), 0);
    }

    #[tokio::test]
    async fn test_active_host_is_resolved() {
        let backend = MockBackend::with_config(MockBackendConfig {
            active_host: Some("dev".to_string()),
            host_address: Some("192.168.99.100".to_string()),
            ..Default::default()
        });

        let address = resolve_target_address(&backend, None).await.unwrap();
        assert_eq!(address.as_str(), "192.168.99.100");
        assert_eq!(backend.calls(MockCommand::HostAddress), 1);
    }

    #[tokio::test]
    async fn test_active_host_without_address_is_fatal() {
        let backend = MockBackend::with_config(MockBackendConfig {
            active_host: Some("dev".to_string()),
            host_address: None,
            ..Default::default()
        });

        let result = resolve_target_address(&backend, None).await;
        assert!(matches!(
            result,
            Err(StevedoreError::Setup(SetupError::AddressResolution { ref host, .. })) if host == "dev"
        ));
    }

    #[tokio::test]
    async fn test_override_skips_queries() {
        let backend = MockBackend::new();
        let address = resolve_target_address(&backend, Some("10.1.2.3"))
            .await
            .unwrap();
        assert_eq!(address.as_str(), "10.1.2.3");
        assert_eq!(backend.calls(MockCommand::ActiveHost), 0);
    }
}
