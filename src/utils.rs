// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for gamescrape.

/// Mask a credential (API key, password) for logging.
///
/// Shows only the first `visible_prefix` characters and replaces the rest with "...".
/// Values no longer than the prefix are hidden entirely.
///
/// # Examples
///
/// ```
/// use gamescrape::utils::mask_sensitive;
///
/// let api_key = "1a2b3c4d5e6f7a8b9c0d";
/// assert_eq!(mask_sensitive(api_key, 4), "1a2b...");
/// ```
pub fn mask_sensitive(input: &str, visible_prefix: usize) -> String {
    if input.chars().count() <= visible_prefix {
        return "...".to_string();
    }

    let prefix: String = input.chars().take(visible_prefix).collect();
    format!("{}...", prefix)
}

/// Strip the query string from a URL before logging it.
///
/// Provider URLs carry credentials as query parameters.
pub fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Human-readable byte count: `512 B`, `4.0 KiB`, `1.5 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    let value = bytes as f64;
    if value >= MIB {
        format!("{:.1} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{} B", bytes)
    }
}
