// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resolve the media of a selected search result.
//!
//! One [`MediaAssetDownload`] is scheduled per enabled category that has a
//! URL. All of them run concurrently on the shared multiplexer and are
//! polled together; the handle is done once every download has finished.
//!
//! The first failing download puts the handle into its error state. The
//! remaining downloads are not cancelled explicitly. They are no longer
//! polled and are released when the handle is dropped.

use std::path::PathBuf;
use std::rc::Rc;

use crate::config::ScraperConfig;
use crate::errors::ScrapeError;
use crate::handle::{AsyncHandle, AsyncStatus, HandleState};
use crate::net::{Multiplexer, TransferRole};
use crate::search::SearchResult;

use super::download::{MediaAssetDownload, SavePolicy};
use super::{media_extension, save_as_path, AssetCategory, GameEntry, MediaAssetSpec};

/// Downloads and stores every enabled asset of one search result.
#[derive(Debug)]
pub struct MediaResolveHandle {
    result: SearchResult,
    downloads: Vec<MediaAssetDownload>,
    categories: Vec<AssetCategory>,
    saved_files: Vec<PathBuf>,
    failed_category: Option<AssetCategory>,
    state: HandleState,
}

impl MediaResolveHandle {
    /// Schedule the downloads for `result`. Transfers start immediately.
    pub fn new(
        result: SearchResult,
        game: &(impl GameEntry + ?Sized),
        config: &ScraperConfig,
        mux: &Rc<Multiplexer>,
    ) -> Self {
        let mut result = result;
        result.reset_saved_new_media();

        let timeouts = config.timeouts(TransferRole::ContentProvider);
        let policy = SavePolicy {
            halt_on_invalid_media: config.halt_on_invalid_media,
            max_width: config.resize_max_width,
            max_height: config.resize_max_height,
        };

        let mut downloads = Vec::new();
        let mut categories = Vec::new();
        for category in AssetCategory::ALL {
            if !config.category_enabled(category) {
                continue;
            }
            let Some(media) = result.media_url(category).cloned() else {
                continue;
            };

            let existing = game.existing_media(category);
            if existing.is_some() && !config.overwrite_existing_media {
                tracing::debug!("Keeping existing {} for {}", category, game.base_name());
                continue;
            }

            let extension = media_extension(&media.url, media.format.as_deref());
            let spec = MediaAssetSpec {
                category,
                destination: save_as_path(&config.media_root, game, category, &extension),
                url: media.url,
                format: media.format,
                existing,
                resize: category.resize_eligible(),
            };

            let download = match result.cached_media_for(&spec.url) {
                Some(bytes) => {
                    tracing::debug!("Using cached {} for {}", category, spec.destination.display());
                    MediaAssetDownload::from_bytes(spec, bytes.to_vec(), policy)
                }
                None => MediaAssetDownload::new(spec, mux, timeouts, policy),
            };
            categories.push(category);
            downloads.push(download);
        }

        Self {
            result,
            downloads,
            categories,
            saved_files: Vec::new(),
            failed_category: None,
            state: HandleState::new(),
        }
    }

    /// Categories that were scheduled for download.
    pub fn categories(&self) -> &[AssetCategory] {
        &self.categories
    }

    /// Files written so far.
    pub fn saved_files(&self) -> &[PathBuf] {
        &self.saved_files
    }

    /// Category whose download failed, once the handle is in an error state.
    pub fn failed_category(&self) -> Option<AssetCategory> {
        self.failed_category
    }

    pub fn result(&self) -> &SearchResult {
        &self.result
    }

    /// Whether any new file was written. Callers use it to refresh cached
    /// thumbnails.
    pub fn saved_new_media(&self) -> bool {
        self.result.saved_new_media()
    }

    pub fn into_result(self) -> SearchResult {
        self.result
    }

    /// Downloads not yet finished.
    pub fn active_downloads(&self) -> usize {
        self.downloads.len()
    }

    /// Combined `(received, total)` bytes of the active transfers. Cached
    /// inline payloads are not counted.
    pub fn transfer_progress(&self) -> (u64, Option<u64>) {
        self.downloads
            .iter()
            .filter(|download| download.uses_transfer())
            .map(MediaAssetDownload::progress)
            .fold((0, Some(0)), |(received, total), (r, t)| {
                (received + r, total.zip(t).map(|(a, b)| a + b))
            })
    }
}

impl AsyncHandle for MediaResolveHandle {
    fn poll(&mut self) -> AsyncStatus {
        if self.state.is_terminal() {
            return self.state.status();
        }

        let mut index = 0;
        while index < self.downloads.len() {
            let download = &mut self.downloads[index];
            match download.poll() {
                AsyncStatus::InProgress => index += 1,
                AsyncStatus::Done => {
                    let finished = self.downloads.remove(index);
                    if finished.saved_new_media() {
                        self.result.mark_saved_new_media();
                        self.saved_files.push(finished.spec().destination.clone());
                    }
                }
                _ => {
                    let category = download.spec().category;
                    let error = download
                        .error()
                        .cloned()
                        .unwrap_or_else(|| ScrapeError::Io("Media download failed".to_string()));
                    tracing::error!(kind = error.kind(), "Failed to resolve {}: {}", category, error.message());
                    self.failed_category = Some(category);
                    self.state.set_error(error);
                    return self.state.status();
                }
            }
        }

        if self.downloads.is_empty() {
            self.state.set_done();
        }
        self.state.status()
    }

    fn state(&self) -> &HandleState {
        &self.state
    }
}
