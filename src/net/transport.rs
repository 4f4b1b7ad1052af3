// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The fetch seam behind every [`NetworkTransfer`](super::NetworkTransfer).
//!
//! A [`Transport`] turns one [`TransferRequest`] into a future that resolves to
//! the full response body. The multiplexer runs those futures; the transport
//! only knows how to talk to the remote end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::StreamExt;

use super::TimeoutProfile;
use crate::utils::redact_query;

/// Maximum redirects followed for a single transfer.
const MAX_REDIRECTS: usize = 2;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("gamescrape/", env!("CARGO_PKG_VERSION"));

/// One outbound fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub timeouts: TimeoutProfile,
}

/// Why a transport failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection, timeout, HTTP status or body read failure
    Failed(String),
    /// TLS certificate verification of the remote peer failed
    PeerVerification(String),
}

/// Byte counters updated by the transport while the body arrives.
#[derive(Debug, Default)]
pub struct TransferProgress {
    received: AtomicU64,
    total: AtomicU64,
}

impl TransferProgress {
    /// Record the size announced by the server.
    pub fn record_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn add_received(&self, bytes: u64) {
        self.received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Total size, if the server reported one.
    pub fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::Relaxed) {
            0 => None,
            total => Some(total),
        }
    }
}

/// Something that can fetch a URL.
pub trait Transport: Send + Sync {
    fn fetch(
        &self,
        request: TransferRequest,
        progress: Arc<TransferProgress>,
    ) -> BoxFuture<'static, Result<Vec<u8>, TransportError>>;
}

// =============================================================================
// HTTP TRANSPORT
// =============================================================================

/// Production transport backed by reqwest.
///
/// reqwest sets the connect timeout per client, so one client is kept per
/// distinct connect timeout (in practice: one for provider requests, one for
/// generic ones).
pub struct HttpTransport {
    clients: Mutex<Vec<(Option<Duration>, reqwest::Client)>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
        }
    }

    fn client_for(&self, connect: Option<Duration>) -> Result<reqwest::Client, TransportError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, client)) = clients.iter().find(|(timeout, _)| *timeout == connect) {
            return Ok(client.clone());
        }

        let redirects = reqwest::redirect::Policy::custom(|attempt| {
            if attempt.previous().len() > MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if !matches!(attempt.url().scheme(), "http" | "https") {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirects);
        if let Some(connect) = connect {
            builder = builder.connect_timeout(connect);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Failed(format!("Failed to create HTTP client: {}", e)))?;

        clients.push((connect, client.clone()));
        Ok(client)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        request: TransferRequest,
        progress: Arc<TransferProgress>,
    ) -> BoxFuture<'static, Result<Vec<u8>, TransportError>> {
        let client = self.client_for(request.timeouts.connect);

        Box::pin(async move {
            let client = client?;
            let mut builder = client.get(&request.url);
            if let Some(limit) = request.timeouts.transfer {
                builder = builder.timeout(limit);
            }

            let response = builder.send().await.map_err(classify_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Failed(format!(
                    "HTTP {} returned for {}",
                    status,
                    redact_query(&request.url)
                )));
            }

            if let Some(total) = response.content_length() {
                progress.record_total(total);
            }

            let mut body = Vec::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(classify_error)?;
                progress.add_received(chunk.len() as u64);
                body.extend_from_slice(&chunk);
            }

            Ok(body)
        })
    }
}

/// Map a reqwest error to a transport error, separating certificate problems
/// from ordinary transport failures.
fn classify_error(err: reqwest::Error) -> TransportError {
    let chain = error_chain(&err);
    if chain.to_lowercase().contains("certificate") {
        return TransportError::PeerVerification(chain);
    }
    if err.is_timeout() {
        return TransportError::Failed(format!("Operation timed out ({})", chain));
    }
    TransportError::Failed(chain)
}

/// Render an error and all of its sources as one line.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Layer(&'static str, Option<Box<Layer>>);

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for Layer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            self.1.as_deref().map(|l| l as &(dyn std::error::Error + 'static))
        }
    }

    #[test]
    fn test_error_chain_joins_sources() {
        let err = Layer(
            "error sending request",
            Some(Box::new(Layer("invalid peer certificate", Some(Box::new(Layer("UnknownIssuer", None)))))),
        );
        assert_eq!(
            error_chain(&err),
            "error sending request: invalid peer certificate: UnknownIssuer"
        );
    }

    #[test]
    fn test_progress_counters() {
        let progress = TransferProgress::default();
        assert_eq!(progress.total(), None);
        progress.record_total(1024);
        progress.add_received(512);
        progress.add_received(256);
        assert_eq!(progress.total(), Some(1024));
        assert_eq!(progress.received(), 768);
    }

    #[test]
    fn test_http_client_reused_per_connect_timeout() {
        let transport = HttpTransport::new();
        transport.client_for(Some(Duration::from_secs(30))).expect("client");
        transport.client_for(Some(Duration::from_secs(30))).expect("client");
        transport.client_for(None).expect("client");
        let clients = transport.clients.lock().expect("lock");
        assert_eq!(clients.len(), 2);
    }
}
