//! Mutually-authenticated TLS HTTP POST for SOAP transactions, grounded
//! on `ironposh-client-tokio`'s `ReqwestHttpClient` (native-tls backend,
//! one shared connection-pooled `reqwest::Client`) and the
//! cert/key/trust-bundle field names in `xcpd-core::config::Args`.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Identity};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to read {path}: {source}")]
    ReadCredential { path: String, source: std::io::Error },

    #[error("failed to build TLS identity from client cert/key")]
    BuildIdentity(#[source] reqwest::Error),

    #[error("failed to parse trust bundle certificate")]
    ParseTrustBundle(#[source] reqwest::Error),

    #[error("failed to build HTTP client")]
    BuildClient(#[source] reqwest::Error),
}

/// A SOAP transaction sender over a single mutually-authenticated TLS
/// connection pool. One instance is built at startup and shared across
/// all outbound ITI-55/38/39 calls; `reqwest::Client` already pools
/// connections internally, so transactions never build their own.
pub struct SoapClient {
    client: Client,
}

impl SoapClient {
    /// Loads the client identity (cert + private key, both PEM) and the
    /// trust bundle used to validate responder certificates, then builds
    /// the pooled client. Never logs the contents of `client_key_path`.
    pub fn new(client_cert_path: &Path, client_key_path: &Path, trust_bundle_path: &Path) -> Result<Self, TransportError> {
        let mut identity_pem = read_pem(client_cert_path)?;
        identity_pem.extend_from_slice(&read_pem(client_key_path)?);
        let identity = Identity::from_pem(&identity_pem).map_err(TransportError::BuildIdentity)?;

        let trust_bundle_bytes = read_pem(trust_bundle_path)?;
        let trust_anchor = reqwest::Certificate::from_pem(&trust_bundle_bytes).map_err(TransportError::ParseTrustBundle)?;

        info!(
            client_cert = %client_cert_path.display(),
            trust_bundle = %trust_bundle_path.display(),
            "initializing mutually-authenticated SOAP transport"
        );

        let client = Client::builder()
            .use_native_tls()
            .identity(identity)
            .add_root_certificate(trust_anchor)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(TransportError::BuildClient)?;

        Ok(Self { client })
    }

    /// Posts a SOAP envelope and returns the response body, or `None` if
    /// the transaction timed out or the connection failed — the same
    /// convention the message-factory parsers (`iti55::parse_response`
    /// et al.) already treat as "no response".
    #[instrument(level = "debug", skip(self, body), fields(body_len = body.len()))]
    pub async fn post(&self, url: &str, body: String, timeout: Duration) -> Option<String> {
        let send = self
            .client
            .post(url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(body)
            .timeout(timeout)
            .send();

        let response = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                warn!(%error, "SOAP transaction failed to send");
                return None;
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "SOAP transaction timed out");
                return None;
            }
        };

        let status = response.status();
        match response.text().await {
            Ok(text) => {
                debug!(%status, response_len = text.len(), "SOAP transaction completed");
                Some(text)
            }
            Err(error) => {
                warn!(%error, "failed to read SOAP response body");
                None
            }
        }
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|source| TransportError::ReadCredential {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_client_cert_surfaces_as_read_credential() {
        let missing = Path::new("/nonexistent/xcpd-transport-test.pem");
        let err = SoapClient::new(missing, missing, missing).unwrap_err();
        assert!(matches!(err, TransportError::ReadCredential { .. }));
    }
}
