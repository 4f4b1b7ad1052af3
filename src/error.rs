// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! User-facing error formatting for gamescrape.
//!
//! Turns a [`ScrapeError`] into a message with possible causes and suggested
//! fixes, the way the CLI prints failures.

use std::fmt;

use crate::errors::ScrapeError;

/// Issue tracker URL printed under every formatted error.
pub const ISSUES_URL: &str = "https://github.com/morganforge/gamescrape/issues";

/// Formats an error message with title, causes, fixes, and help link.
///
/// # Example
///
/// ```
/// use gamescrape::error::format_error;
///
/// let error = format_error(
///     "Network error: Operation timed out",
///     &["Provider is overloaded", "Connection timeout set too low"],
///     &["Retry the scrape", "Raise it: gamescrape config set connect_timeout_secs 60"],
/// );
/// assert!(error.contains("Possible causes:"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n\n", title);

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(&format!("Need help? {}", ISSUES_URL));
    output
}

/// Builder for constructing formatted error messages.
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    /// Create a new error builder with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    /// Add a possible cause.
    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a suggested fix.
    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    /// Build the formatted error message.
    pub fn build(self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clone().build())
    }
}

/// Build the user-facing report for a failed scrape.
///
/// `subject` names what was being scraped (a game, or a game and an asset).
pub fn scrape_report(subject: &str, err: &ScrapeError) -> ErrorBuilder {
    let builder = ErrorBuilder::new(format!("Scraping {} failed: {}", subject, err));
    match err {
        ScrapeError::Network(_) => builder
            .cause("No internet connection")
            .cause("Provider is down or rate limiting requests")
            .cause("Timeout too low for a slow connection")
            .fix("Check your connection and retry")
            .fix("Raise the limit: gamescrape config set transfer_timeout_secs 300"),
        ScrapeError::Trust(_) => builder
            .cause("System clock is wrong")
            .cause("A proxy is intercepting HTTPS traffic")
            .cause("Outdated CA certificates")
            .fix("Fix the system date and time")
            .fix("Update your CA certificate bundle"),
        ScrapeError::Validation(_) => builder
            .cause("Provider returned an error page instead of media")
            .cause("Daily request quota exhausted")
            .fix("Retry later")
            .fix("Accept small files: gamescrape config set halt_on_invalid_media false"),
        ScrapeError::Io(_) => builder
            .cause("Media directory is not writable")
            .cause("Disk full")
            .cause("media_root points at a file instead of a directory")
            .fix("Check permissions: gamescrape config path")
            .fix("Free some disk space"),
        ScrapeError::Configuration(_) => builder
            .cause("Unknown provider name in config")
            .cause("Provider credentials not set")
            .fix("List providers: gamescrape providers")
            .fix("Set one: gamescrape config set provider thegamesdb"),
        ScrapeError::Provider(_) => builder
            .cause("Provider changed its response format")
            .cause("Provider returned a maintenance page")
            .fix("Try the other provider: gamescrape --provider screenscraper ..."),
    }
}
