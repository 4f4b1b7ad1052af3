// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory transport with canned responses.
//!
//! Used by the test suites and handy for offline demos: routes are matched by
//! URL prefix (longest prefix wins), every fetched URL is logged, and a route
//! can stay pending for a number of multiplexer passes before it completes.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;

use super::transport::{TransferProgress, TransferRequest, Transport, TransportError};

#[derive(Debug, Clone)]
struct Route {
    prefix: String,
    pending_passes: usize,
    response: Result<Vec<u8>, TransportError>,
}

/// Transport answering from a fixed routing table.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer URLs starting with `prefix` with `body`.
    pub fn respond(&self, prefix: impl Into<String>, body: impl Into<Vec<u8>>) -> &Self {
        self.route(prefix.into(), 0, Ok(body.into()))
    }

    /// Like [`respond`](Self::respond), but stay pending for `passes` multiplexer passes first.
    pub fn respond_after(&self, prefix: impl Into<String>, passes: usize, body: impl Into<Vec<u8>>) -> &Self {
        self.route(prefix.into(), passes, Ok(body.into()))
    }

    /// Fail URLs starting with `prefix`.
    pub fn fail(&self, prefix: impl Into<String>, error: TransportError) -> &Self {
        self.route(prefix.into(), 0, Err(error))
    }

    /// Every URL fetched so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of fetches whose URL starts with `prefix`.
    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }

    fn route(&self, prefix: String, pending_passes: usize, response: Result<Vec<u8>, TransportError>) -> &Self {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes.retain(|r| r.prefix != prefix);
        routes.push(Route {
            prefix,
            pending_passes,
            response,
        });
        self
    }

    fn lookup(&self, url: &str) -> Option<Route> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| url.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
            .cloned()
    }
}

impl Transport for ScriptedTransport {
    fn fetch(
        &self,
        request: TransferRequest,
        progress: Arc<TransferProgress>,
    ) -> BoxFuture<'static, Result<Vec<u8>, TransportError>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.url.clone());

        let route = self.lookup(&request.url);
        Box::pin(async move {
            let Some(route) = route else {
                return Err(TransportError::Failed(format!(
                    "HTTP 404 Not Found returned for {}",
                    request.url
                )));
            };

            for _ in 0..route.pending_passes {
                tokio::task::yield_now().await;
            }

            if let Ok(body) = &route.response {
                progress.record_total(body.len() as u64);
                progress.add_received(body.len() as u64);
            }
            route.response
        })
    }
}

/// Convenience for tests that need both the transport and a handle to its log.
pub fn scripted() -> (Arc<ScriptedTransport>, Arc<dyn Transport>) {
    let transport = Arc::new(ScriptedTransport::new());
    let shared: Arc<dyn Transport> = transport.clone();
    (transport, shared)
}
