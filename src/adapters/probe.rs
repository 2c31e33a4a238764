//! Liveness probe for ikaaro instances.
//!
//! An instance is alive when `<uri>/;_ctrl` answers with a success status.

use async_trait::async_trait;

use crate::error::{FleetError, Result};

/// Checks whether an instance answers on its control endpoint
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, uri: &str) -> Result<()>;
}

/// Build the control endpoint of an instance
pub fn control_url(uri: &str) -> String {
    format!("{}/;_ctrl", uri.trim_end_matches('/'))
}

/// Prober issuing HTTP GET requests
pub struct HttpProber {
    client: reqwest::Client,
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProber {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, uri: &str) -> Result<()> {
        let unreachable = |e: reqwest::Error| FleetError::ProbeUnreachable {
            uri: uri.to_string(),
            reason: e.to_string(),
        };

        self.client
            .get(control_url(uri))
            .send()
            .await
            .map_err(unreachable)?
            .error_for_status()
            .map_err(unreachable)?;

        Ok(())
    }
}
