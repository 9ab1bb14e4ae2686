//! Authorize service client handle
//!
//! One lazily-connected gRPC channel is prepared per state generation and
//! shared by every request that reads that generation. The channel is never
//! re-dialled per request.
//!
//! With DNS round robin enabled, a background task resolves the host and
//! feeds every address to the channel's balancer, re-resolving periodically.
//! Building the channel never waits on DNS.

pub mod proto;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::uri::PathAndQuery;
use tokio::sync::mpsc;
use tonic::codec::ProstCodec;
use tonic::metadata::MetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Status};
use tower::discover::Change;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::ProxyStateError;
use proto::{CheckRequest, CheckResponse, CHECK_PATH};

/// Metadata key carrying the logical service name
pub const SERVICE_NAME_METADATA: &str = "x-pomerium-service";

/// How often round-robin targets are re-resolved
pub const DNS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

const BALANCE_CHANNEL_CAPACITY: usize = 64;

/// Connection parameters for the authorize channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcOptions {
    /// Target address
    pub addr: Url,
    /// TLS server name to verify instead of the URL host
    pub override_certificate_name: Option<String>,
    /// Base64-encoded PEM CA bundle
    pub ca: Option<String>,
    /// Path to a PEM CA bundle
    pub ca_file: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Balance across every address the host resolves to
    pub client_dns_round_robin: bool,
    /// Plaintext transport
    pub with_insecure: bool,
    /// Logical service name for multi-tenant routing
    pub service_name: String,
}

/// Ready-to-use client for `envoy.service.auth.v2.Authorization`.
#[derive(Debug, Clone)]
pub struct AuthorizeClient {
    inner: tonic::client::Grpc<Channel>,
    service_name: MetadataValue<tonic::metadata::Ascii>,
    target: String,
    round_robin: bool,
}

impl AuthorizeClient {
    /// Prepares the channel. No request is sent and no connection is opened
    /// until the first call. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ProxyStateError::Connection` on an unusable address, bad CA
    /// material or TLS setup failure. DNS failures are not build errors.
    #[instrument(skip(options), fields(addr = %options.addr))]
    pub fn connect(name: &str, options: &GrpcOptions) -> Result<Self, ProxyStateError> {
        let host = options
            .addr
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProxyStateError::connection(format!("{name} url has no host")))?;
        let port = options
            .addr
            .port_or_known_default()
            .ok_or_else(|| ProxyStateError::connection(format!("{name} url has no port")))?;

        let service_name = MetadataValue::try_from(options.service_name.as_str())
            .map_err(|e| ProxyStateError::connection(format!("invalid service name: {e}")))?;

        let tls = if options.with_insecure {
            None
        } else {
            Some(tls_config(options, host)?)
        };
        let scheme = if tls.is_some() { "https" } else { "http" };

        let target = authority(host, port);
        let lazy = endpoint(format!("{scheme}://{target}"), options.request_timeout, tls.as_ref())?;

        let channel = if options.client_dns_round_robin {
            let (channel, changes) = Channel::balance_channel::<SocketAddr>(BALANCE_CHANNEL_CAPACITY);
            tokio::spawn(discover(
                host.trim_start_matches('[').trim_end_matches(']').to_string(),
                port,
                scheme,
                options.request_timeout,
                tls.clone(),
                changes,
            ));
            channel
        } else {
            lazy.connect_lazy()
        };

        info!(
            service = %name,
            target = %target,
            round_robin = options.client_dns_round_robin,
            tls = tls.is_some(),
            timeout_ms = u64::try_from(options.request_timeout.as_millis()).unwrap_or(u64::MAX),
            "Authorize channel prepared"
        );

        Ok(Self {
            inner: tonic::client::Grpc::new(channel),
            service_name,
            target,
            round_robin: options.client_dns_round_robin,
        })
    }

    /// `host:port` the channel dials or resolves
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether requests are balanced across every resolved address
    #[must_use]
    pub fn is_round_robin(&self) -> bool {
        self.round_robin
    }

    /// Asks the decision service whether a request may proceed.
    ///
    /// # Errors
    ///
    /// Returns the transport or service `Status`.
    pub async fn check(&self, request: CheckRequest) -> Result<CheckResponse, Status> {
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("authorize service not ready: {e}")))?;

        let mut request = Request::new(request);
        request
            .metadata_mut()
            .insert(SERVICE_NAME_METADATA, self.service_name.clone());

        let codec = ProstCodec::<CheckRequest, CheckResponse>::default();
        let path = PathAndQuery::from_static(CHECK_PATH);
        grpc.unary(request, path, codec)
            .await
            .map(tonic::Response::into_inner)
    }
}

fn authority(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

/// Keeps the balancer's endpoint set in line with what `host` resolves to.
///
/// Exits once the channel, and with it the receiving end, is dropped.
async fn discover(
    host: String,
    port: u16,
    scheme: &'static str,
    timeout: Duration,
    tls: Option<ClientTlsConfig>,
    changes: mpsc::Sender<Change<SocketAddr, Endpoint>>,
) {
    let mut known: HashSet<SocketAddr> = HashSet::new();

    loop {
        match tokio::net::lookup_host((host.as_str(), port)).await {
            Ok(addrs) => {
                let resolved: HashSet<SocketAddr> = addrs.collect();

                for addr in known.difference(&resolved) {
                    if changes.send(Change::Remove(*addr)).await.is_err() {
                        return;
                    }
                }
                known.retain(|addr| resolved.contains(addr));

                for addr in resolved.difference(&known.clone()) {
                    match endpoint(format!("{scheme}://{addr}"), timeout, tls.as_ref()) {
                        Ok(endpoint) => {
                            if changes.send(Change::Insert(*addr, endpoint)).await.is_err() {
                                return;
                            }
                            known.insert(*addr);
                        }
                        Err(e) => warn!(%addr, error = %e, "Skipping authorize address"),
                    }
                }
                debug!(host = %host, addresses = known.len(), "Authorize addresses resolved");
            }
            Err(e) => warn!(host = %host, error = %e, "Authorize host did not resolve, will retry"),
        }

        tokio::select! {
            () = changes.closed() => return,
            () = tokio::time::sleep(DNS_REFRESH_INTERVAL) => {}
        }
    }
}

fn endpoint(
    uri: String,
    timeout: Duration,
    tls: Option<&ClientTlsConfig>,
) -> Result<Endpoint, ProxyStateError> {
    let mut endpoint = Endpoint::from_shared(uri)
        .map_err(|e| ProxyStateError::connection(format!("invalid address: {e}")))?
        .timeout(timeout);

    if let Some(tls) = tls {
        endpoint = endpoint
            .tls_config(tls.clone())
            .map_err(|e| ProxyStateError::connection(format!("TLS setup failed: {e}")))?;
    }
    Ok(endpoint)
}

fn tls_config(options: &GrpcOptions, host: &str) -> Result<ClientTlsConfig, ProxyStateError> {
    let domain = options
        .override_certificate_name
        .clone()
        .unwrap_or_else(|| host.to_string());
    let tls = ClientTlsConfig::new().domain_name(domain);

    match ca_pem(options)? {
        Some(pem) => Ok(tls.ca_certificate(Certificate::from_pem(pem))),
        None => Ok(tls.with_native_roots()),
    }
}

/// Loads the configured CA bundle, checking it holds at least one certificate.
fn ca_pem(options: &GrpcOptions) -> Result<Option<Vec<u8>>, ProxyStateError> {
    let pem = if let Some(ca) = &options.ca {
        STANDARD
            .decode(ca.trim())
            .map_err(|e| ProxyStateError::connection(format!("certificate authority is not valid base64: {e}")))?
    } else if let Some(path) = &options.ca_file {
        std::fs::read(path)
            .map_err(|e| ProxyStateError::connection(format!("failed to read {path}: {e}")))?
    } else {
        return Ok(None);
    };

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProxyStateError::connection(format!("failed to parse CA PEM: {e}")))?;
    if certs.is_empty() {
        return Err(ProxyStateError::connection("no certificates found in CA bundle"));
    }
    Ok(Some(pem))
}
