//! Configuration-service read client.
//!
//! [`HttpConfigurationClient`] speaks the key-value REST surface over
//! HTTP/1.1 (hyper) with rustls for `https` endpoints:
//!
//! ```text
//! GET {endpoint}/kv/{key}?api-version=1.0
//! Authorization: Bearer <token>
//! Accept: application/vnd.microsoft.appconfig.kv+json
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::credential::TokenCredential;
use crate::endpoint::Endpoint;
use crate::error::{ConstructionError, ReadError, ReadResult};

pub const API_VERSION: &str = "1.0";

const KV_MEDIA_TYPE: &str = "application/vnd.microsoft.appconfig.kv+json";

/// Unreserved URI characters stay as-is; everything else in a key is escaped.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A key-value entry as returned by the configuration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSetting {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub locked: Option<bool>,
}

pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = ReadResult<ConfigurationSetting>> + Send + 'a>>;

/// Reads individual settings from a configuration service.
///
/// Dropping the returned future aborts the in-flight read.
pub trait ConfigurationClient: Send + Sync {
    fn get_setting<'a>(&'a self, key: &'a str) -> ReadFuture<'a>;
}

/// Builds clients for an endpoint. Injected into the cache so it can be tested
/// without a network.
pub trait ClientFactory: Send + Sync {
    fn create(
        &self,
        endpoint: &Endpoint,
        credential: Arc<dyn TokenCredential>,
    ) -> ReadResult<Arc<dyn ConfigurationClient>>;
}

// ── HTTP client ──────────────────────────────────────────────────────

/// A [`ConfigurationClient`] bound to one endpoint and credential.
pub struct HttpConfigurationClient {
    endpoint: Endpoint,
    credential: Arc<dyn TokenCredential>,
    tls: TlsConnector,
}

impl HttpConfigurationClient {
    pub fn new(
        endpoint: Endpoint,
        credential: Arc<dyn TokenCredential>,
        tls_config: Arc<rustls::ClientConfig>,
    ) -> Self {
        Self {
            endpoint,
            credential,
            tls: TlsConnector::from(tls_config),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn request_path(&self, key: &str) -> String {
        format!(
            "{}/kv/{}?api-version={API_VERSION}",
            self.endpoint.base_path(),
            utf8_percent_encode(key, KEY_ENCODE_SET)
        )
    }

    async fn read(&self, key: &str) -> ReadResult<ConfigurationSetting> {
        let token = self
            .credential
            .get_token()
            .await
            .map_err(|e| ReadError::Credential(e.0))?;

        let path = self.request_path(key);
        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(&path)
            .header(http::header::HOST, self.endpoint.authority())
            .header(http::header::ACCEPT, KV_MEDIA_TYPE)
            .header(http::header::AUTHORIZATION, format!("Bearer {}", token.token))
            .header(
                http::header::USER_AGENT,
                concat!("appconfig-health/", env!("CARGO_PKG_VERSION")),
            )
            .body(Empty::<Bytes>::new())
            .map_err(|e| ReadError::Http(e.to_string()))?;

        let address = (self.endpoint.connect_host(), self.endpoint.port());
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| ReadError::Connect(format!("{}: {e}", self.endpoint)))?;
        let _ = stream.set_nodelay(true);

        let resp = if self.endpoint.is_https() {
            let server_name = rustls::pki_types::ServerName::try_from(self.endpoint.connect_host())
                .map_err(|e| ReadError::Tls(format!("invalid server name: {e}")))?
                .to_owned();
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| ReadError::Tls(e.to_string()))?;
            send_request(tls_stream, req).await?
        } else {
            send_request(stream, req).await?
        };

        let status = resp.status();
        debug!(endpoint = %self.endpoint, %key, %status, "configuration read completed");

        match status.as_u16() {
            200..=299 => {
                let body = resp
                    .into_body()
                    .collect()
                    .await
                    .map_err(|e| ReadError::Http(e.to_string()))?
                    .to_bytes();
                serde_json::from_slice(&body).map_err(|e| ReadError::Decode(e.to_string()))
            }
            404 => Err(ReadError::NotFound {
                key: key.to_string(),
            }),
            401 | 403 => Err(ReadError::Unauthorized {
                status: status.as_u16(),
            }),
            other => Err(ReadError::Status {
                key: key.to_string(),
                status: other,
            }),
        }
    }
}

impl ConfigurationClient for HttpConfigurationClient {
    fn get_setting<'a>(&'a self, key: &'a str) -> ReadFuture<'a> {
        Box::pin(self.read(key))
    }
}

/// Perform one HTTP/1.1 exchange over an established stream.
async fn send_request<S>(
    io: S,
    req: http::Request<Empty<Bytes>>,
) -> ReadResult<http::Response<Incoming>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| ReadError::Http(format!("handshake: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "configuration connection closed with error");
        }
    });

    sender
        .send_request(req)
        .await
        .map_err(|e| ReadError::Http(e.to_string()))
}

// ── Factory ──────────────────────────────────────────────────────────

/// Default [`ClientFactory`] producing [`HttpConfigurationClient`]s that
/// share one TLS configuration.
#[derive(Clone)]
pub struct HttpClientFactory {
    tls_config: Arc<rustls::ClientConfig>,
}

impl HttpClientFactory {
    /// Factory trusting the Mozilla root certificate store.
    pub fn new() -> Result<Self, ConstructionError> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| ConstructionError::Tls(format!("protocol versions: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self::with_tls_config(Arc::new(config)))
    }

    /// Factory using a caller-supplied TLS configuration (custom roots, client auth).
    pub fn with_tls_config(tls_config: Arc<rustls::ClientConfig>) -> Self {
        Self { tls_config }
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(
        &self,
        endpoint: &Endpoint,
        credential: Arc<dyn TokenCredential>,
    ) -> ReadResult<Arc<dyn ConfigurationClient>> {
        debug!(%endpoint, "creating configuration client");
        Ok(Arc::new(HttpConfigurationClient::new(
            endpoint.clone(),
            credential,
            Arc::clone(&self.tls_config),
        )))
    }
}
