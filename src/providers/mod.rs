// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bundled content providers.
//!
//! - [`thegamesdb`] - TheGamesDB v1 API. Metadata first, then media URLs in
//!   a follow-up request.
//! - [`screenscraper`] - ScreenScraper `jeuInfos.php`. One request returns
//!   metadata and media together.

pub mod screenscraper;
pub mod thegamesdb;

use serde::de::DeserializeOwned;

use crate::errors::ScrapeError;

/// Build `base?key=value&...`, percent-encoding the values.
pub(crate) fn build_url(base: &str, params: &[(&str, &str)]) -> Result<String, ScrapeError> {
    reqwest::Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| ScrapeError::Configuration(format!("Invalid provider URL {}: {}", base, e)))
}

/// Decode a provider's JSON payload.
pub(crate) fn parse_json<T: DeserializeOwned>(provider: &str, body: &[u8]) -> Result<T, ScrapeError> {
    serde_json::from_slice(body)
        .map_err(|e| ScrapeError::Provider(format!("{} returned unreadable data ({})", provider, e)))
}

/// Strip dump tags like `(USA)` or `[!]` from a file name.
pub fn clean_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => cleaned.push(c),
            _ => {}
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
