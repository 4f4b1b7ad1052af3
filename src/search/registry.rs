// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider name to request generator mapping.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::config::ScraperConfig;
use crate::errors::ScrapeError;
use crate::net::{Multiplexer, TimeoutProfile, TransferRole};
use crate::providers::{screenscraper, thegamesdb};
use crate::utils::mask_sensitive;

use super::{SearchParams, SearchRequest};

/// Builds the initial requests of a search.
pub type GenerateRequests = fn(&SearchParams, &ProviderContext) -> Result<Vec<SearchRequest>, ScrapeError>;

/// Provider account details copied out of the config.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub thegamesdb_api_key: Option<String>,
    pub screenscraper_username: Option<String>,
    pub screenscraper_password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = |value: &Option<String>| value.as_deref().map(|v| mask_sensitive(v, 4));
        f.debug_struct("Credentials")
            .field("thegamesdb_api_key", &masked(&self.thegamesdb_api_key))
            .field("screenscraper_username", &self.screenscraper_username)
            .field("screenscraper_password", &self.screenscraper_password.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Everything a provider needs to build requests, snapshotted from the config.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub mux: Rc<Multiplexer>,
    pub timeouts: TimeoutProfile,
    pub credentials: Credentials,
    /// Preferred media region
    pub region: String,
}

impl ProviderContext {
    pub fn from_config(config: &ScraperConfig, mux: &Rc<Multiplexer>) -> Self {
        Self {
            mux: Rc::clone(mux),
            timeouts: config.timeouts(TransferRole::ContentProvider),
            credentials: Credentials {
                thegamesdb_api_key: config.thegamesdb_api_key.clone(),
                screenscraper_username: config.screenscraper_username.clone(),
                screenscraper_password: config.screenscraper_password.clone(),
            },
            region: config.region.clone(),
        }
    }
}

/// Registered providers, keyed by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, GenerateRequests>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(thegamesdb::NAME, thegamesdb::generate_requests);
        registry.register(screenscraper::NAME, screenscraper::generate_requests);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, generate: GenerateRequests) {
        self.providers.insert(name.into(), generate);
    }

    pub fn get(&self, name: &str) -> Option<GenerateRequests> {
        self.providers.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Whether the provider selected in `config` is registered.
    pub fn is_valid_configured(&self, config: &ScraperConfig) -> bool {
        self.contains(&config.provider)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}
