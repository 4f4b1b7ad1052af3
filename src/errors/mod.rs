// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy for the scraping pipeline.
//!
//! Every failure a handle can report is one of these variants, each carrying a
//! single human-readable message. No layer retries on its own; the caller
//! decides whether to show the message and whether to start a new handle.

use std::fmt;

use crate::handle::AsyncStatus;

// =============================================================================
// SCRAPE ERRORS
// =============================================================================

/// A failure reported by a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    /// Transport failure: connection, timeout, non-success HTTP status
    Network(String),
    /// The remote endpoint's identity could not be verified
    Trust(String),
    /// Payload failed the plausibility check
    Validation(String),
    /// Local directory or file operation failed
    Io(String),
    /// No matching provider, or a required setting is missing
    Configuration(String),
    /// Provider answered, but the response could not be understood
    Provider(String),
}

impl ScrapeError {
    /// The handle status this error puts its handle into.
    pub fn status(&self) -> AsyncStatus {
        match self {
            ScrapeError::Trust(_) => AsyncStatus::ErrorAuth,
            _ => AsyncStatus::Error,
        }
    }

    /// The bare message, without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            ScrapeError::Network(msg)
            | ScrapeError::Trust(msg)
            | ScrapeError::Validation(msg)
            | ScrapeError::Io(msg)
            | ScrapeError::Configuration(msg)
            | ScrapeError::Provider(msg) => msg,
        }
    }

    /// Short category name, recorded as the `kind` field of error logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Network(_) => "network",
            ScrapeError::Trust(_) => "trust",
            ScrapeError::Validation(_) => "validation",
            ScrapeError::Io(_) => "io",
            ScrapeError::Configuration(_) => "configuration",
            ScrapeError::Provider(_) => "provider",
        }
    }
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeError::Network(msg) => write!(f, "Network error: {}", msg),
            ScrapeError::Trust(msg) => write!(f, "Peer verification failed: {}", msg),
            ScrapeError::Validation(msg) => f.write_str(msg),
            ScrapeError::Io(msg) => f.write_str(msg),
            ScrapeError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ScrapeError::Provider(msg) => write!(f, "Invalid provider response: {}", msg),
        }
    }
}

impl std::error::Error for ScrapeError {}
