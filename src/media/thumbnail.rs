// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Thumbnail prefetch for a search result.
//!
//! The fetched bytes are stored in the result's inline cache. A later
//! [`MediaResolveHandle`](super::MediaResolveHandle) for the same result
//! writes them straight to disk instead of downloading the asset again.

use std::rc::Rc;

use crate::config::ScraperConfig;
use crate::errors::ScrapeError;
use crate::handle::{AsyncHandle, AsyncStatus, HandleState};
use crate::net::{Multiplexer, NetworkTransfer, TransferRole};
use crate::search::SearchResult;

#[derive(Debug)]
pub struct ThumbnailFetch {
    result: SearchResult,
    transfer: Option<NetworkTransfer>,
    state: HandleState,
}

impl ThumbnailFetch {
    /// Start fetching the thumbnail of `result`.
    ///
    /// Results without a thumbnail URL, or whose thumbnail is already
    /// cached, finish immediately.
    pub fn new(result: SearchResult, config: &ScraperConfig, mux: &Rc<Multiplexer>) -> Self {
        let mut state = HandleState::new();
        let transfer = match result.thumbnail_url.as_deref() {
            Some(url) if result.cached_media_for(url).is_none() => Some(NetworkTransfer::new(
                mux,
                url,
                config.timeouts(TransferRole::ContentProvider),
            )),
            _ => {
                state.set_done();
                None
            }
        };

        Self {
            result,
            transfer,
            state,
        }
    }

    pub fn result(&self) -> &SearchResult {
        &self.result
    }

    pub fn into_result(self) -> SearchResult {
        self.result
    }
}

impl AsyncHandle for ThumbnailFetch {
    fn poll(&mut self) -> AsyncStatus {
        if self.state.is_terminal() {
            return self.state.status();
        }
        let Some(transfer) = self.transfer.as_mut() else {
            self.state.set_done();
            return self.state.status();
        };

        match transfer.poll() {
            AsyncStatus::InProgress => return AsyncStatus::InProgress,
            AsyncStatus::Done => {
                if let Some(bytes) = transfer.take_content() {
                    self.result.set_thumbnail_data(bytes);
                }
                self.state.set_done();
            }
            _ => {
                let error = transfer
                    .error()
                    .cloned()
                    .unwrap_or_else(|| ScrapeError::Network("Thumbnail transfer failed".to_string()));
                tracing::warn!(kind = error.kind(), "Couldn't fetch thumbnail: {}", error.message());
                self.state.set_error(error);
            }
        }

        self.transfer = None;
        self.state.status()
    }

    fn state(&self) -> &HandleState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::AssetCategory;
    use crate::net::scripted::scripted;
    use crate::net::TransportError;

    fn result_with_thumbnail(url: &str) -> SearchResult {
        let mut result = SearchResult::new("test", "1");
        result.set_media_url(AssetCategory::Cover, url, None);
        result.thumbnail_url = Some(url.to_string());
        result
    }

    #[test]
    fn test_fetch_fills_inline_cache() {
        let (script, transport) = scripted();
        script.respond("http://x/thumb.jpg", vec![1u8; 700]);
        let mux = Multiplexer::new(transport).unwrap();

        let mut fetch = ThumbnailFetch::new(result_with_thumbnail("http://x/thumb.jpg"), &ScraperConfig::default(), &mux);
        let mut status = fetch.poll();
        while !status.is_terminal() {
            status = fetch.poll();
        }
        assert_eq!(status, AsyncStatus::Done);
        let result = fetch.into_result();
        assert_eq!(result.cached_media_for("http://x/thumb.jpg").map(<[u8]>::len), Some(700));
    }

    #[test]
    fn test_no_thumbnail_is_done_immediately() {
        let (script, transport) = scripted();
        let mux = Multiplexer::new(transport).unwrap();

        let fetch = ThumbnailFetch::new(SearchResult::new("test", "1"), &ScraperConfig::default(), &mux);
        assert_eq!(fetch.status(), AsyncStatus::Done);
        assert!(script.requests().is_empty());
    }

    #[test]
    fn test_failure_reported() {
        let (script, transport) = scripted();
        script.fail("http://x/", TransportError::PeerVerification("invalid peer certificate".to_string()));
        let mux = Multiplexer::new(transport).unwrap();

        let mut fetch = ThumbnailFetch::new(result_with_thumbnail("http://x/thumb.jpg"), &ScraperConfig::default(), &mux);
        let mut status = fetch.poll();
        for _ in 0..100 {
            if status.is_terminal() {
                break;
            }
            status = fetch.poll();
        }
        assert_eq!(status, AsyncStatus::ErrorAuth);
        assert!(fetch.result().thumbnail_data().is_none());
    }
}
