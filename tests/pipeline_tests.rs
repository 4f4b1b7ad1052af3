// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end scrape pipeline tests against the scripted transport.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use gamescrape::net::scripted::scripted;
use gamescrape::net::TransportError;
use gamescrape::{
    start_search, AssetCategory, AsyncHandle, AsyncStatus, LocalGame, MediaResolveHandle,
    Multiplexer, ProviderRegistry, ScrapeError, ScraperConfig, SearchParams, SearchResult,
    ThumbnailFetch,
};
use tempfile::TempDir;

// =============================================================================
// HELPERS
// =============================================================================

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Jpeg)
        .expect("encode jpeg");
    bytes.into_inner()
}

fn config(root: &Path) -> ScraperConfig {
    ScraperConfig {
        media_root: root.join("media"),
        thegamesdb_api_key: Some("key".to_string()),
        ..ScraperConfig::default()
    }
}

fn game(root: &Path) -> LocalGame {
    LocalGame::new(
        "snes",
        root.join("roms/snes/game.sfc"),
        root.join("roms/snes"),
        root.join("media"),
    )
}

fn cover_result(url: &str) -> SearchResult {
    let mut result = SearchResult::new("test", "1");
    result.metadata.name = "Game".to_string();
    result.set_media_url(AssetCategory::Cover, url, None);
    result
}

fn drain(handle: &mut impl AsyncHandle) -> AsyncStatus {
    for _ in 0..500 {
        let status = handle.poll();
        if status.is_terminal() {
            return status;
        }
    }
    handle.status()
}

fn cover_path(root: &Path) -> PathBuf {
    root.join("media/snes/covers/game.jpg")
}

// =============================================================================
// MEDIA RESOLVE
// =============================================================================

#[test]
fn test_cover_downloaded_resized_and_flagged() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    script.respond("http://x/y.jpg", jpeg(1200, 900));
    let mux = Multiplexer::new(transport).unwrap();

    let mut handle = MediaResolveHandle::new(cover_result("http://x/y.jpg"), &game(dir.path()), &config(dir.path()), &mux);
    assert_eq!(drain(&mut handle), AsyncStatus::Done);
    assert!(handle.saved_new_media());
    assert_eq!(handle.saved_files(), [cover_path(dir.path())]);

    let saved = image::open(cover_path(dir.path())).unwrap();
    assert_eq!((saved.width(), saved.height()), (600, 450));
    assert_eq!(mux.active_transfers(), 0);
}

#[test]
fn test_tiny_payload_rejected_without_writing() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    script.respond("http://x/y.jpg", vec![0u8; 40]);
    let mux = Multiplexer::new(transport).unwrap();

    let mut handle = MediaResolveHandle::new(cover_result("http://x/y.jpg"), &game(dir.path()), &config(dir.path()), &mux);
    assert_eq!(drain(&mut handle), AsyncStatus::Error);
    assert!(matches!(handle.error(), Some(ScrapeError::Validation(_))));
    assert!(handle.error_message().unwrap().contains("game.jpg"));
    assert_eq!(handle.failed_category(), Some(AssetCategory::Cover));
    assert!(!handle.saved_new_media());
    assert!(!cover_path(dir.path()).exists());
}

#[test]
fn test_plausibility_threshold_is_350_bytes() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    script.respond("http://x/ok.jpg", vec![1u8; 350]);
    script.respond("http://x/short.jpg", vec![1u8; 349]);
    let mux = Multiplexer::new(transport).unwrap();

    let mut config = config(dir.path());
    config.resize_max_width = 0;

    let mut accepted = MediaResolveHandle::new(cover_result("http://x/ok.jpg"), &game(dir.path()), &config, &mux);
    assert_eq!(drain(&mut accepted), AsyncStatus::Done);
    assert_eq!(fs::read(cover_path(dir.path())).unwrap().len(), 350);

    let mut rejected = MediaResolveHandle::new(cover_result("http://x/short.jpg"), &game(dir.path()), &config, &mux);
    assert_eq!(drain(&mut rejected), AsyncStatus::Error);
    assert!(matches!(rejected.error(), Some(ScrapeError::Validation(_))));
}

#[test]
fn test_small_payload_accepted_when_check_disabled() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    script.respond("http://x/clip.mp4", vec![1u8; 40]);
    let mux = Multiplexer::new(transport).unwrap();

    let mut config = config(dir.path());
    config.halt_on_invalid_media = false;
    config.scrape_videos = true;

    let mut result = SearchResult::new("test", "1");
    result.set_media_url(AssetCategory::Video, "http://x/clip.mp4", None);

    let mut handle = MediaResolveHandle::new(result, &game(dir.path()), &config, &mux);
    assert_eq!(drain(&mut handle), AsyncStatus::Done);
    assert_eq!(
        fs::read(dir.path().join("media/snes/videos/game.mp4")).unwrap(),
        vec![1u8; 40]
    );
}

#[test]
fn test_resolve_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    script.respond("http://x/y.jpg", jpeg(1200, 900));
    let mux = Multiplexer::new(transport).unwrap();
    let config = config(dir.path());

    let mut first = MediaResolveHandle::new(cover_result("http://x/y.jpg"), &game(dir.path()), &config, &mux);
    assert_eq!(drain(&mut first), AsyncStatus::Done);
    let before = fs::read(cover_path(dir.path())).unwrap();

    let mut second = MediaResolveHandle::new(first.into_result(), &game(dir.path()), &config, &mux);
    assert_eq!(drain(&mut second), AsyncStatus::Done);
    assert!(second.saved_new_media());
    assert_eq!(fs::read(cover_path(dir.path())).unwrap(), before);

    let covers: Vec<_> = fs::read_dir(dir.path().join("media/snes/covers")).unwrap().collect();
    assert_eq!(covers.len(), 1);
}

#[test]
fn test_existing_media_skipped_without_overwrite() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("media/snes/covers")).unwrap();
    fs::write(cover_path(dir.path()), b"mine").unwrap();

    let (script, transport) = scripted();
    script.respond("http://x/y.jpg", jpeg(64, 64));
    let mux = Multiplexer::new(transport).unwrap();

    let mut config = config(dir.path());
    config.overwrite_existing_media = false;

    let mut handle = MediaResolveHandle::new(cover_result("http://x/y.jpg"), &game(dir.path()), &config, &mux);
    assert_eq!(drain(&mut handle), AsyncStatus::Done);
    assert!(!handle.saved_new_media());
    assert!(script.requests().is_empty());
    assert_eq!(fs::read(cover_path(dir.path())).unwrap(), b"mine");
}

#[test]
fn test_one_download_per_enabled_category() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    script.respond("http://x/", vec![7u8; 1024]);
    let mux = Multiplexer::new(transport).unwrap();

    let mut config = config(dir.path());
    config.resize_max_width = 0;
    config.scrape_screenshots = false;

    let mut result = SearchResult::new("test", "1");
    result.set_media_url(AssetCategory::Cover, "http://x/cover.jpg", None);
    result.set_media_url(AssetCategory::Box3D, "http://x/box.png", None);
    result.set_media_url(AssetCategory::Marquee, "http://x/wheel.png", None);
    result.set_media_url(AssetCategory::Screenshot, "http://x/shot.png", None);
    result.set_media_url(AssetCategory::Video, "http://x/clip.mp4", None);

    let mut handle = MediaResolveHandle::new(result, &game(dir.path()), &config, &mux);
    assert_eq!(
        handle.categories(),
        [AssetCategory::Box3D, AssetCategory::Cover, AssetCategory::Marquee]
    );
    assert_eq!(mux.active_transfers(), 3);
    assert_eq!(drain(&mut handle), AsyncStatus::Done);
    assert_eq!(script.requests().len(), 3);
    assert_eq!(script.request_count("http://x/shot.png"), 0);
    assert_eq!(script.request_count("http://x/clip.mp4"), 0);
}

#[test]
fn test_untrusted_peer_reports_auth_error() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    script.fail(
        "http://x/",
        TransportError::PeerVerification("invalid peer certificate: UnknownIssuer".to_string()),
    );
    let mux = Multiplexer::new(transport).unwrap();

    let mut handle = MediaResolveHandle::new(cover_result("http://x/y.jpg"), &game(dir.path()), &config(dir.path()), &mux);
    assert_eq!(drain(&mut handle), AsyncStatus::ErrorAuth);
    assert!(matches!(handle.error(), Some(ScrapeError::Trust(_))));
}

// =============================================================================
// THUMBNAIL CACHE
// =============================================================================

#[test]
fn test_prefetched_thumbnail_is_not_downloaded_again() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    script.respond("http://x/y.jpg", jpeg(300, 200));
    let mux = Multiplexer::new(transport).unwrap();
    let config = config(dir.path());

    let mut result = cover_result("http://x/y.jpg");
    result.thumbnail_url = Some("http://x/y.jpg".to_string());

    let mut fetch = ThumbnailFetch::new(result, &config, &mux);
    assert_eq!(drain(&mut fetch), AsyncStatus::Done);
    assert_eq!(script.request_count("http://x/y.jpg"), 1);

    let mut handle = MediaResolveHandle::new(fetch.into_result(), &game(dir.path()), &config, &mux);
    assert_eq!(drain(&mut handle), AsyncStatus::Done);
    assert_eq!(script.request_count("http://x/y.jpg"), 1);

    let saved = image::open(cover_path(dir.path())).unwrap();
    assert_eq!((saved.width(), saved.height()), (300, 200));
}

// =============================================================================
// SEARCH TO MEDIA
// =============================================================================

const GAMES: &str = r#"{
    "code": 200,
    "status": "Success",
    "data": {
        "count": 1,
        "games": [{"id": 136, "game_title": "Super Metroid", "release_date": "1994-03-19", "platform": 6}]
    }
}"#;

const IMAGES: &str = r#"{
    "code": 200,
    "status": "Success",
    "data": {
        "count": 1,
        "base_url": {"original": "http://cdn/"},
        "images": {"136": [{"id": 1, "type": "boxart", "side": "front", "filename": "front/136.jpg"}]}
    }
}"#;

#[test]
fn test_search_then_resolve() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    script.respond("https://api.thegamesdb.net/v1/Games/ByGameName", GAMES);
    script.respond("https://api.thegamesdb.net/v1/Games/Images", IMAGES);
    script.respond("http://cdn/front/136.jpg", jpeg(800, 1000));
    let mux: Rc<Multiplexer> = Multiplexer::new(transport).unwrap();
    let config = config(dir.path());
    let game = game(dir.path());

    let mut search = start_search(&ProviderRegistry::with_defaults(), &SearchParams::for_game(&game), &config, &mux);
    assert_eq!(drain(&mut search), AsyncStatus::Done);
    let result = search.into_results().into_iter().next().unwrap();
    assert_eq!(result.metadata.name, "Super Metroid");

    let mut resolve = MediaResolveHandle::new(result, &game, &config, &mux);
    assert_eq!(drain(&mut resolve), AsyncStatus::Done);
    let saved = image::open(cover_path(dir.path())).unwrap();
    assert_eq!((saved.width(), saved.height()), (600, 750));

    // API keys never reach the media host.
    assert!(script
        .requests()
        .iter()
        .filter(|url| url.starts_with("http://cdn/"))
        .all(|url| !url.contains("apikey")));
}

#[test]
fn test_unknown_provider_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let (script, transport) = scripted();
    let mux = Multiplexer::new(transport).unwrap();

    let mut config = config(dir.path());
    config.provider = "mobygames".to_string();

    let mut search = start_search(&ProviderRegistry::with_defaults(), &SearchParams::for_game(&game(dir.path())), &config, &mux);
    assert_eq!(search.poll(), AsyncStatus::Error);
    assert!(matches!(search.error(), Some(ScrapeError::Configuration(_))));
    assert!(search.error_message().unwrap().contains("mobygames"));
    assert!(script.requests().is_empty());
}
