use std::time::Duration;

use crate::error::{Advisory, DeployError, DeployResult};

/// HTTP liveness check against a local port.
pub trait Probe {
    fn check(&self, port: u16) -> DeployResult<u16>;
}

/// [`Probe`] issuing a short `GET http://127.0.0.1:<port>/`.
///
/// Any HTTP response counts as alive, including 4xx/5xx: the
/// question is whether something answers on the port.
pub struct HttpProbe {
    client: reqwest::blocking::Client,
    host: String,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> DeployResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DeployError::Other(format!("http client: {e}")))?;
        Ok(Self {
            client,
            host: "127.0.0.1".to_string(),
        })
    }

    #[must_use]
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }
}

impl Probe for HttpProbe {
    fn check(&self, port: u16) -> DeployResult<u16> {
        let url = format!("http://{}:{port}/", self.host);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DeployError::Other(format!("{url}: {e}")))?;
        Ok(response.status().as_u16())
    }
}

/// Probe every port, logging the outcome of each. Returns one
/// advisory per port; none of them can fail the deploy.
pub fn probe_all(probe: &dyn Probe, ports: &[u16]) -> Vec<(u16, Advisory)> {
    ports
        .iter()
        .map(|&port| {
            let advisory = match probe.check(port) {
                Ok(status) => {
                    tracing::info!(port, status, "liveness probe answered");
                    Advisory::Done
                }
                Err(e) => {
                    tracing::warn!(
                        port,
                        error = %e,
                        "liveness probe failed, containers may still be booting"
                    );
                    Advisory::Failed(e.to_string())
                }
            };
            (port, advisory)
        })
        .collect()
}
