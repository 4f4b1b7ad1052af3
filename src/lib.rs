// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! gamescrape - game metadata and media scraper
//!
//! Finds a game at a remote content provider, then downloads, validates and
//! stores its artwork next to your library.
//!
//! **Search** -> **Pick a result** -> **Resolve media**
//!
//! Everything is driven by polling: each operation is a handle that makes
//! progress only when its owner calls [`AsyncHandle::poll`], so a render loop
//! can drive a scrape without ever blocking on the network.
//!
//! # Core Modules
//!
//! - [`handle`] - Poll-driven handle trait and shared status
//! - [`net`] - Multiplexed network transfers and the transport seam
//! - [`search`] - Search requests, the FIFO request queue, and the provider registry
//! - [`providers`] - TheGamesDB and ScreenScraper
//! - [`media`] - Asset categories, downloads, resolve, rescaling, thumbnails
//! - [`config`] - Persisted settings
//! - [`errors`] - Error taxonomy
//! - [`error`] - User-facing error formatting
//!
//! # Example
//!
//! ```no_run
//! use gamescrape::{
//!     start_search, AsyncHandle, LocalGame, MediaResolveHandle, Multiplexer,
//!     ProviderRegistry, ScraperConfig, SearchParams,
//! };
//!
//! let config = ScraperConfig::default();
//! let mux = Multiplexer::with_http().unwrap();
//! let game = LocalGame::new("snes", "/roms/snes/game.sfc", "/roms/snes", &config.media_root);
//!
//! let mut search = start_search(&ProviderRegistry::with_defaults(), &SearchParams::for_game(&game), &config, &mux);
//! while !search.poll().is_terminal() {}
//!
//! if let Some(result) = search.into_results().into_iter().next() {
//!     let mut resolve = MediaResolveHandle::new(result, &game, &config, &mux);
//!     while !resolve.poll().is_terminal() {}
//! }
//! ```

pub mod config;
pub mod error;
pub mod errors;
pub mod handle;
pub mod media;
pub mod net;
pub mod providers;
pub mod search;
pub mod utils;

pub use config::{load_config, save_config, ScraperConfig};
pub use errors::ScrapeError;
pub use handle::{run_until_terminal, AsyncHandle, AsyncStatus, HandleState};
pub use media::{
    rescale_image, AssetCategory, GameEntry, LocalGame, MediaAssetDownload, MediaAssetSpec,
    MediaResolveHandle, ThumbnailFetch,
};
pub use net::{
    HttpTransport, Multiplexer, NetworkTransfer, ScriptedTransport, TimeoutProfile, TransferRole,
    Transport, TransportError,
};
pub use search::{
    start_media_urls_fetch, start_search, GameMetadata, MediaUrl, ProviderContext, ProviderRegistry,
    SearchParams, SearchRequest, SearchRequestQueue, SearchResult,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
