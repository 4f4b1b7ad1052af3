// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download and persist a single media asset.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use crate::errors::ScrapeError;
use crate::handle::{AsyncHandle, AsyncStatus, HandleState};
use crate::net::{Multiplexer, NetworkTransfer, TimeoutProfile};

use super::rescale::rescale_image;
use super::MediaAssetSpec;

/// Payloads below this size are treated as provider error pages.
pub const MIN_PLAUSIBLE_MEDIA_BYTES: usize = 350;

/// What to do with a payload once it has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavePolicy {
    pub halt_on_invalid_media: bool,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for SavePolicy {
    fn default() -> Self {
        Self {
            halt_on_invalid_media: true,
            max_width: 600,
            max_height: 0,
        }
    }
}

#[derive(Debug)]
enum PayloadSource {
    /// Bytes already held by the search result
    Inline(Vec<u8>),
    Transfer(NetworkTransfer),
}

/// Fetches one asset and writes it to its destination.
///
/// Steps, in order: obtain the payload (inline cache or network), reject
/// implausibly small payloads, remove the file currently in the slot, create
/// the destination directory, write, downscale if the category allows it.
#[derive(Debug)]
pub struct MediaAssetDownload {
    spec: MediaAssetSpec,
    source: Option<PayloadSource>,
    policy: SavePolicy,
    saved_new_media: bool,
    state: HandleState,
}

impl MediaAssetDownload {
    /// Start downloading `spec.url` on `mux`.
    pub fn new(spec: MediaAssetSpec, mux: &Rc<Multiplexer>, timeouts: TimeoutProfile, policy: SavePolicy) -> Self {
        let transfer = NetworkTransfer::new(mux, spec.url.clone(), timeouts);
        Self::with_source(spec, PayloadSource::Transfer(transfer), policy)
    }

    /// Persist bytes that are already available. No transfer is issued.
    pub fn from_bytes(spec: MediaAssetSpec, bytes: Vec<u8>, policy: SavePolicy) -> Self {
        Self::with_source(spec, PayloadSource::Inline(bytes), policy)
    }

    fn with_source(spec: MediaAssetSpec, source: PayloadSource, policy: SavePolicy) -> Self {
        Self {
            spec,
            source: Some(source),
            policy,
            saved_new_media: false,
            state: HandleState::new(),
        }
    }

    pub fn spec(&self) -> &MediaAssetSpec {
        &self.spec
    }

    /// True once a new file has been written for this asset.
    pub fn saved_new_media(&self) -> bool {
        self.saved_new_media
    }

    /// Whether the payload comes from the network.
    pub fn uses_transfer(&self) -> bool {
        matches!(self.source, Some(PayloadSource::Transfer(_)))
    }

    /// `(received, total)` bytes of the underlying transfer.
    pub fn progress(&self) -> (u64, Option<u64>) {
        match &self.source {
            Some(PayloadSource::Transfer(transfer)) => (transfer.received_bytes(), transfer.total_bytes()),
            _ => (0, None),
        }
    }

    /// Advance the payload source. `Ok(None)` while still waiting.
    fn poll_payload(&mut self) -> Result<Option<Vec<u8>>, ScrapeError> {
        match self.source.as_mut() {
            Some(PayloadSource::Inline(bytes)) => Ok(Some(std::mem::take(bytes))),
            Some(PayloadSource::Transfer(transfer)) => match transfer.poll() {
                AsyncStatus::InProgress => Ok(None),
                AsyncStatus::Done => Ok(Some(transfer.take_content().unwrap_or_default())),
                _ => Err(transfer
                    .error()
                    .cloned()
                    .unwrap_or_else(|| ScrapeError::Network("Transfer failed".to_string()))),
            },
            None => Err(ScrapeError::Network("Payload already consumed".to_string())),
        }
    }

    fn save(&self, payload: &[u8]) -> Result<(), ScrapeError> {
        let destination = &self.spec.destination;
        let file_name = destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.policy.halt_on_invalid_media && payload.len() < MIN_PLAUSIBLE_MEDIA_BYTES {
            tracing::warn!(
                "Rejecting {} for {}: only {} bytes",
                self.spec.category,
                destination.display(),
                payload.len()
            );
            return Err(ScrapeError::Validation(format!(
                "The file \"{}\" returned by the scraper seems to be invalid as it's less than {} bytes in size",
                file_name, MIN_PLAUSIBLE_MEDIA_BYTES
            )));
        }

        // A format change (game.jpg -> game.png) would otherwise leave two files.
        if let Some(existing) = &self.spec.existing {
            remove_existing(existing);
        }

        if let Some(parent) = destination.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::error!("Couldn't create media directory {}: {}", parent.display(), e);
            }
            if !parent.is_dir() {
                return Err(ScrapeError::Io(
                    "Media directory does not exist and can't be created. Permission problems?".to_string(),
                ));
            }
        }

        let mut file = File::create(destination).map_err(|e| {
            tracing::error!("Couldn't open {} for writing: {}", destination.display(), e);
            ScrapeError::Io("Failed to open path for writing media file. Permission error?".to_string())
        })?;
        file.write_all(payload).and_then(|()| file.sync_all()).map_err(|e| {
            tracing::error!("Couldn't write {}: {}", destination.display(), e);
            ScrapeError::Io("Failed to save media file. Disk full?".to_string())
        })?;
        drop(file);

        if self.spec.resize && !rescale_image(destination, self.policy.max_width, self.policy.max_height) {
            return Err(ScrapeError::Io(
                "Error saving resized image. Out of memory? Disk full?".to_string(),
            ));
        }

        tracing::info!("Saved {} to {}", self.spec.category, destination.display());
        Ok(())
    }
}

fn remove_existing(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed existing media file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Couldn't remove existing media file {}: {}", path.display(), e),
    }
}

impl AsyncHandle for MediaAssetDownload {
    fn poll(&mut self) -> AsyncStatus {
        if self.state.is_terminal() {
            return self.state.status();
        }

        let outcome = match self.poll_payload() {
            Ok(None) => return AsyncStatus::InProgress,
            Ok(Some(payload)) => self.save(&payload),
            Err(e) => Err(e),
        };

        // Releases the transfer registration as well.
        self.source = None;

        match outcome {
            Ok(()) => {
                self.saved_new_media = true;
                self.state.set_done();
            }
            Err(e) => self.state.set_error(e),
        }
        self.state.status()
    }

    fn state(&self) -> &HandleState {
        &self.state
    }
}
