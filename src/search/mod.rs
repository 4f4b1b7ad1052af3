// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider searches.
//!
//! A search is a FIFO of [`SearchRequest`]s drained one at a time by a
//! [`SearchRequestQueue`]. Each request fetches one provider URL and hands
//! the payload to its [`ResponseParser`], which appends results to the
//! queue's accumulator and may schedule follow-up requests.
//!
//! ```text
//! queue: [ByGameName] ──parse──▶ results += games, queue += [Images]
//!        [Images]     ──parse──▶ results[*].media += urls
//!        []           ──────────▶ Done
//! ```

pub mod registry;

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

use serde::Serialize;

use crate::config::ScraperConfig;
use crate::errors::ScrapeError;
use crate::handle::{AsyncHandle, AsyncStatus, HandleState};
use crate::media::{AssetCategory, GameEntry};
use crate::net::{Multiplexer, NetworkTransfer, TimeoutProfile};
use crate::providers;
use crate::utils::redact_query;

pub use registry::{Credentials, GenerateRequests, ProviderContext, ProviderRegistry};

// =============================================================================
// RESULTS
// =============================================================================

/// Remote location of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaUrl {
    pub url: String,
    /// Extension reported by the provider, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Descriptive metadata for a game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GameMetadata {
    pub name: String,
    pub description: String,
    pub release_date: String,
    pub developer: String,
    pub publisher: String,
    pub genre: String,
    pub players: String,
    /// Rating as reported by the provider
    pub rating: String,
}

/// One candidate match returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub provider: String,
    pub game_id: String,
    pub metadata: GameMetadata,
    pub media: BTreeMap<AssetCategory, MediaUrl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip)]
    thumbnail_data: Option<Vec<u8>>,
    #[serde(skip)]
    saved_new_media: bool,
}

impl SearchResult {
    pub fn new(provider: impl Into<String>, game_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            game_id: game_id.into(),
            ..Self::default()
        }
    }

    /// URL for `category`, if the provider returned a non-empty one.
    pub fn media_url(&self, category: AssetCategory) -> Option<&MediaUrl> {
        self.media.get(&category).filter(|media| !media.url.is_empty())
    }

    pub fn set_media_url(&mut self, category: AssetCategory, url: impl Into<String>, format: Option<String>) {
        let url = url.into();
        if url.is_empty() {
            return;
        }
        let format = format.filter(|f| !f.is_empty());
        self.media.insert(category, MediaUrl { url, format });
    }

    /// Inline bytes cached for exactly `url`.
    pub fn cached_media_for(&self, url: &str) -> Option<&[u8]> {
        match (&self.thumbnail_url, &self.thumbnail_data) {
            (Some(thumb), Some(data)) if thumb == url && !data.is_empty() => Some(data),
            _ => None,
        }
    }

    pub fn thumbnail_data(&self) -> Option<&[u8]> {
        self.thumbnail_data.as_deref()
    }

    /// Cache the bytes behind `thumbnail_url`.
    pub fn set_thumbnail_data(&mut self, data: Vec<u8>) {
        self.thumbnail_data = Some(data);
    }

    /// True once a resolve has written at least one new file for this result.
    pub fn saved_new_media(&self) -> bool {
        self.saved_new_media
    }

    pub fn mark_saved_new_media(&mut self) {
        self.saved_new_media = true;
    }

    pub(crate) fn reset_saved_new_media(&mut self) {
        self.saved_new_media = false;
    }
}

/// What a provider gets to work with when building its requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// System name, e.g. `snes`
    pub system: String,
    /// Game file name including extension
    pub rom_file_name: String,
    /// Name to search for
    pub name: String,
    /// Provider game ids already known for this game
    pub game_ids: Vec<String>,
}

impl SearchParams {
    /// Search by the game's file name.
    pub fn for_game(game: &(impl GameEntry + ?Sized)) -> Self {
        Self {
            system: game.system_name().to_string(),
            rom_file_name: file_name(game.path()),
            name: game.base_name(),
            game_ids: Vec::new(),
        }
    }

    /// Search for `name` instead of the file name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_game_ids(mut self, ids: Vec<String>) -> Self {
        self.game_ids = ids;
        self
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Output parameters lent to a request while it is being polled.
pub struct SearchSink<'a> {
    results: &'a mut Vec<SearchResult>,
    followups: &'a mut Vec<SearchRequest>,
}

impl<'a> SearchSink<'a> {
    pub fn new(results: &'a mut Vec<SearchResult>, followups: &'a mut Vec<SearchRequest>) -> Self {
        Self { results, followups }
    }

    pub fn push_result(&mut self, result: SearchResult) {
        self.results.push(result);
    }

    /// Results accumulated so far, for parsers that enrich earlier ones.
    pub fn results_mut(&mut self) -> &mut Vec<SearchResult> {
        self.results
    }

    /// Schedule `request` at the back of the queue.
    pub fn enqueue(&mut self, request: SearchRequest) {
        self.followups.push(request);
    }
}

/// Turns one provider response into search results.
pub trait ResponseParser {
    fn parse(&mut self, body: &[u8], sink: &mut SearchSink<'_>) -> Result<(), ScrapeError>;
}

impl<F> ResponseParser for F
where
    F: FnMut(&[u8], &mut SearchSink<'_>) -> Result<(), ScrapeError>,
{
    fn parse(&mut self, body: &[u8], sink: &mut SearchSink<'_>) -> Result<(), ScrapeError> {
        self(body, sink)
    }
}

/// One provider call.
///
/// The transfer is only issued the first time the request is polled, so a
/// request queued behind a failure never reaches the network.
pub struct SearchRequest {
    url: String,
    timeouts: TimeoutProfile,
    mux: Rc<Multiplexer>,
    parser: Box<dyn ResponseParser>,
    transfer: Option<NetworkTransfer>,
    state: HandleState,
}

impl SearchRequest {
    pub fn new(ctx: &ProviderContext, url: impl Into<String>, parser: impl ResponseParser + 'static) -> Self {
        Self {
            url: url.into(),
            timeouts: ctx.timeouts,
            mux: Rc::clone(&ctx.mux),
            parser: Box::new(parser),
            transfer: None,
            state: HandleState::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> AsyncStatus {
        self.state.status()
    }

    pub fn error(&self) -> Option<&ScrapeError> {
        self.state.error()
    }

    /// Advance the request, writing parsed output into `sink`.
    pub fn poll_into(&mut self, sink: &mut SearchSink<'_>) -> AsyncStatus {
        if self.state.is_terminal() {
            return self.state.status();
        }

        let mux = &self.mux;
        let (url, timeouts) = (&self.url, self.timeouts);
        let transfer = self
            .transfer
            .get_or_insert_with(|| NetworkTransfer::new(mux, url.clone(), timeouts));

        match transfer.poll() {
            AsyncStatus::InProgress => return AsyncStatus::InProgress,
            AsyncStatus::Done => {
                let body = transfer.take_content().unwrap_or_default();
                match self.parser.parse(&body, sink) {
                    Ok(()) => self.state.set_done(),
                    Err(e) => {
                        tracing::error!(kind = e.kind(), "Couldn't parse response from {}: {}", redact_query(&self.url), e.message());
                        self.state.set_error(e);
                    }
                }
            }
            _ => {
                let error = transfer
                    .error()
                    .cloned()
                    .unwrap_or_else(|| ScrapeError::Network("Request failed".to_string()));
                self.state.set_error(error);
            }
        }

        self.transfer = None;
        self.state.status()
    }
}

impl std::fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRequest")
            .field("url", &redact_query(&self.url))
            .field("started", &self.transfer.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// QUEUE
// =============================================================================

/// A search: requests drained strictly one at a time, in order.
///
/// The first failing request aborts the search. Requests behind it are
/// dropped without ever being started.
#[derive(Debug)]
pub struct SearchRequestQueue {
    requests: VecDeque<SearchRequest>,
    results: Vec<SearchResult>,
    state: HandleState,
}

impl SearchRequestQueue {
    pub fn new(requests: impl IntoIterator<Item = SearchRequest>) -> Self {
        Self {
            requests: requests.into_iter().collect(),
            results: Vec::new(),
            state: HandleState::new(),
        }
    }

    /// A queue that is already terminal with `error`.
    pub fn failed(error: ScrapeError) -> Self {
        Self {
            requests: VecDeque::new(),
            results: Vec::new(),
            state: HandleState::failed(error),
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<SearchResult> {
        self.results
    }

    /// Requests not yet finished, including the one in flight.
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }
}

impl AsyncHandle for SearchRequestQueue {
    fn poll(&mut self) -> AsyncStatus {
        if self.state.is_terminal() {
            return self.state.status();
        }

        if let Some(front) = self.requests.front_mut() {
            let mut followups = Vec::new();
            let status = front.poll_into(&mut SearchSink::new(&mut self.results, &mut followups));
            let error = front.error().cloned();
            self.requests.extend(followups);

            match status {
                AsyncStatus::InProgress => return AsyncStatus::InProgress,
                AsyncStatus::Done => {
                    self.requests.pop_front();
                }
                _ => {
                    let dropped = self.requests.len() - 1;
                    if dropped > 0 {
                        tracing::debug!("Search failed, dropping {} queued request(s)", dropped);
                    }
                    self.requests.clear();
                    self.state.set_error(
                        error.unwrap_or_else(|| ScrapeError::Network("Request failed".to_string())),
                    );
                    return self.state.status();
                }
            }
        }

        if self.requests.is_empty() {
            self.state.set_done();
        }
        self.state.status()
    }

    fn state(&self) -> &HandleState {
        &self.state
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

fn unavailable(name: &str) -> ScrapeError {
    tracing::error!("Configured scraper ({}) unavailable, scraping aborted", name);
    ScrapeError::Configuration(format!("Configured scraper ({}) unavailable, scraping aborted", name))
}

/// Start a search with the configured provider.
pub fn start_search(
    registry: &ProviderRegistry,
    params: &SearchParams,
    config: &ScraperConfig,
    mux: &Rc<Multiplexer>,
) -> SearchRequestQueue {
    let Some(generate) = registry.get(&config.provider) else {
        return SearchRequestQueue::failed(unavailable(&config.provider));
    };

    tracing::debug!(
        "Scraping system \"{}\", game file \"{}\" with {}",
        params.system,
        params.rom_file_name,
        config.provider
    );
    let ctx = ProviderContext::from_config(config, mux);
    match generate(params, &ctx) {
        Ok(requests) => SearchRequestQueue::new(requests),
        Err(e) => SearchRequestQueue::failed(e),
    }
}

/// Fetch media URLs for games whose ids are already known.
///
/// Only TheGamesDB serves metadata and media separately, so this always goes
/// through its images endpoint.
pub fn start_media_urls_fetch(
    registry: &ProviderRegistry,
    game_ids: &[String],
    config: &ScraperConfig,
    mux: &Rc<Multiplexer>,
) -> SearchRequestQueue {
    if !registry.contains(&config.provider) {
        return SearchRequestQueue::failed(unavailable(&config.provider));
    }

    let ctx = ProviderContext::from_config(config, mux);
    match providers::thegamesdb::media_url_requests(game_ids, &ctx) {
        Ok(requests) => SearchRequestQueue::new(requests),
        Err(e) => SearchRequestQueue::failed(e),
    }
}
