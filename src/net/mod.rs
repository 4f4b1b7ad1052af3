// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Non-blocking, multiplexed network transfers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐ register  ┌─────────────────────┐
//! │ NetworkTransfer │──────────▶│ Multiplexer         │
//! │ (one resource)  │◀──────────│ current-thread tokio│
//! └─────────────────┘ oneshot   │ runtime + Transport │
//!                               └─────────────────────┘
//! ```
//!
//! Constructing a [`NetworkTransfer`] spawns its fetch onto the shared
//! [`Multiplexer`]. Polling any transfer runs one scheduling pass of the
//! multiplexer, which advances every registered transfer at once, and then
//! checks whether this particular transfer has completed.
//!
//! The multiplexer never runs on its own. Between polls nothing happens, so
//! a render loop can poll once per frame without ever blocking on the network.

pub mod scripted;
pub mod transport;

use std::cell::Cell;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::AbortHandle;

use crate::errors::ScrapeError;
use crate::handle::{AsyncHandle, AsyncStatus, HandleState};
use crate::utils::redact_query;

pub use scripted::ScriptedTransport;
pub use transport::{HttpTransport, TransferProgress, TransferRequest, Transport, TransportError};

/// Default connect timeout for provider requests (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default total transfer timeout for provider requests (seconds).
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 120;

/// Configured timeouts outside `0..=MAX_TIMEOUT_SECS` fall back to the default.
pub const MAX_TIMEOUT_SECS: i64 = 300;

/// Connect timeout for generic (non-provider) requests (seconds).
const GENERIC_CONNECT_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Which timeout profile a transfer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRole {
    /// Requests to a content provider: search calls and media downloads
    ContentProvider,
    /// Anything else: fixed connect timeout, no total limit
    Generic,
}

/// Connect and total transfer limits. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutProfile {
    pub connect: Option<Duration>,
    pub transfer: Option<Duration>,
}

impl TimeoutProfile {
    /// Resolve the profile for `role` from configured values in seconds.
    ///
    /// Provider values outside `0..=300` are implausible and replaced with
    /// the built-in defaults. Zero means no limit.
    pub fn for_role(role: TransferRole, connect_secs: i64, transfer_secs: i64) -> Self {
        match role {
            TransferRole::ContentProvider => Self {
                connect: seconds(clamp_timeout("connect", connect_secs, DEFAULT_CONNECT_TIMEOUT_SECS)),
                transfer: seconds(clamp_timeout("transfer", transfer_secs, DEFAULT_TRANSFER_TIMEOUT_SECS)),
            },
            TransferRole::Generic => Self {
                connect: seconds(GENERIC_CONNECT_TIMEOUT_SECS),
                transfer: None,
            },
        }
    }
}

impl Default for TimeoutProfile {
    fn default() -> Self {
        Self {
            connect: seconds(DEFAULT_CONNECT_TIMEOUT_SECS),
            transfer: seconds(DEFAULT_TRANSFER_TIMEOUT_SECS),
        }
    }
}

fn clamp_timeout(name: &str, configured: i64, default: u64) -> u64 {
    if (0..=MAX_TIMEOUT_SECS).contains(&configured) {
        configured as u64
    } else {
        tracing::warn!(
            "Configured {} timeout of {}s is out of range, using default of {}s",
            name,
            configured,
            default
        );
        default
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

// =============================================================================
// MULTIPLEXER
// =============================================================================

/// Shared driver for all transfers of one scrape session.
///
/// Handles hold it through `Rc`, which keeps the whole pipeline on the
/// thread that drives it.
pub struct Multiplexer {
    runtime: Runtime,
    transport: Arc<dyn Transport>,
    active: Cell<usize>,
}

impl Multiplexer {
    /// Create a multiplexer running fetches through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> io::Result<Rc<Self>> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Rc::new(Self {
            runtime,
            transport,
            active: Cell::new(0),
        }))
    }

    /// Create a multiplexer using the reqwest-backed [`HttpTransport`].
    pub fn with_http() -> io::Result<Rc<Self>> {
        Self::new(Arc::new(HttpTransport::new()))
    }

    /// Run one scheduling pass: every ready transfer task runs once and the
    /// IO and timer drivers are polled without blocking.
    pub fn drive(&self) {
        self.runtime.block_on(tokio::task::yield_now());
    }

    /// Number of transfers currently registered.
    pub fn active_transfers(&self) -> usize {
        self.active.get()
    }

    fn register(
        self: &Rc<Self>,
        request: TransferRequest,
        progress: Arc<TransferProgress>,
    ) -> (TransferRegistration, oneshot::Receiver<Result<Vec<u8>, TransportError>>) {
        let (tx, rx) = oneshot::channel();
        let fetch = self.transport.fetch(request, progress);
        let task = self.runtime.spawn(async move {
            let _ = tx.send(fetch.await);
        });

        self.active.set(self.active.get() + 1);
        let registration = TransferRegistration {
            abort: task.abort_handle(),
            mux: Rc::clone(self),
        };
        (registration, rx)
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("active", &self.active.get())
            .finish_non_exhaustive()
    }
}

/// Registration of one transfer with the multiplexer.
///
/// Dropping it aborts the fetch task and deregisters the transfer, on every
/// exit path including early cancellation of the owning handle.
#[derive(Debug)]
struct TransferRegistration {
    abort: AbortHandle,
    mux: Rc<Multiplexer>,
}

impl Drop for TransferRegistration {
    fn drop(&mut self) {
        self.abort.abort();
        self.mux.active.set(self.mux.active.get().saturating_sub(1));
    }
}

// =============================================================================
// NETWORK TRANSFER
// =============================================================================

/// One outbound fetch of a single resource.
#[derive(Debug)]
pub struct NetworkTransfer {
    url: String,
    mux: Rc<Multiplexer>,
    progress: Arc<TransferProgress>,
    completion: oneshot::Receiver<Result<Vec<u8>, TransportError>>,
    registration: Option<TransferRegistration>,
    content: Option<Vec<u8>>,
    state: HandleState,
}

impl NetworkTransfer {
    /// Start fetching `url` on `mux`.
    pub fn new(mux: &Rc<Multiplexer>, url: impl Into<String>, timeouts: TimeoutProfile) -> Self {
        let url = url.into();
        let progress = Arc::new(TransferProgress::default());
        let request = TransferRequest {
            url: url.clone(),
            timeouts,
        };
        tracing::debug!("Starting transfer: {}", redact_query(&url));
        let (registration, completion) = mux.register(request, Arc::clone(&progress));

        Self {
            url,
            mux: Rc::clone(mux),
            progress,
            completion,
            registration: Some(registration),
            content: None,
            state: HandleState::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bytes received so far.
    pub fn received_bytes(&self) -> u64 {
        self.progress.received()
    }

    /// Total size, once the server has announced it.
    pub fn total_bytes(&self) -> Option<u64> {
        self.progress.total()
    }

    /// The received payload, once the transfer is done.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Take ownership of the received payload.
    pub fn take_content(&mut self) -> Option<Vec<u8>> {
        self.content.take()
    }
}

impl AsyncHandle for NetworkTransfer {
    fn poll(&mut self) -> AsyncStatus {
        if self.state.is_terminal() {
            return self.state.status();
        }

        self.mux.drive();

        match self.completion.try_recv() {
            Ok(Ok(body)) => {
                tracing::debug!("Transfer finished: {} ({} bytes)", redact_query(&self.url), body.len());
                self.content = Some(body);
                self.state.set_done();
            }
            Ok(Err(TransportError::PeerVerification(msg))) => {
                tracing::error!("Peer verification failed for {}: {}", redact_query(&self.url), msg);
                self.state.set_error(ScrapeError::Trust(msg));
            }
            Ok(Err(TransportError::Failed(msg))) => {
                tracing::error!("Transfer failed for {}: {}", redact_query(&self.url), msg);
                self.state.set_error(ScrapeError::Network(msg));
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Closed) => {
                self.state
                    .set_error(ScrapeError::Network("Transfer was aborted before completing".to_string()));
            }
        }

        if self.state.is_terminal() {
            self.registration = None;
        }
        self.state.status()
    }

    fn state(&self) -> &HandleState {
        &self.state
    }
}
