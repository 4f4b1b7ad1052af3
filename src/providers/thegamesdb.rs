// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! TheGamesDB v1 API.
//!
//! A name search (or id lookup) returns game records without media. The
//! parser enqueues one `Games/Images` request for all returned ids, whose
//! parser attaches cover, marquee and screenshot URLs to the results.

use std::collections::HashMap;

use serde::Deserialize;

use crate::errors::ScrapeError;
use crate::media::AssetCategory;
use crate::search::{ProviderContext, SearchParams, SearchRequest, SearchResult, SearchSink};

use super::{build_url, clean_name, parse_json};

pub const NAME: &str = "thegamesdb";

const API_BASE: &str = "https://api.thegamesdb.net/v1";
const GAME_FIELDS: &str = "players,publishers,genres,overview,rating";
const IMAGE_TYPES: &str = "boxart,clearlogo,screenshot";
const DISPLAY_NAME: &str = "TheGamesDB";

/// TheGamesDB platform id for a system name.
pub fn platform_id(system: &str) -> Option<u32> {
    let id = match system {
        "n64" => 3,
        "gb" => 4,
        "gba" => 5,
        "snes" => 6,
        "nes" => 7,
        "psx" => 10,
        "genesis" | "megadrive" => 18,
        "arcade" | "mame" => 23,
        "gbc" => 41,
        _ => return None,
    };
    Some(id)
}

fn api_key(ctx: &ProviderContext) -> Result<&str, ScrapeError> {
    ctx.credentials
        .thegamesdb_api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            ScrapeError::Configuration(
                "TheGamesDB API key not set (gamescrape config set thegamesdb_api_key <key>)".to_string(),
            )
        })
}

/// Initial request for a search: by id when ids are known, else by name.
pub fn generate_requests(params: &SearchParams, ctx: &ProviderContext) -> Result<Vec<SearchRequest>, ScrapeError> {
    let key = api_key(ctx)?;

    let url = if params.game_ids.is_empty() {
        let name = clean_name(&params.name);
        if name.is_empty() {
            return Err(ScrapeError::Configuration("No game name to search for".to_string()));
        }
        let platform = platform_id(&params.system).map(|id| id.to_string());
        let mut query = vec![("apikey", key), ("name", name.as_str()), ("fields", GAME_FIELDS)];
        if let Some(platform) = platform.as_deref() {
            query.push(("filter[platform]", platform));
        }
        build_url(&format!("{}/Games/ByGameName", API_BASE), &query)?
    } else {
        let ids = params.game_ids.join(",");
        build_url(
            &format!("{}/Games/ByGameID", API_BASE),
            &[("apikey", key), ("id", ids.as_str()), ("fields", GAME_FIELDS)],
        )?
    };

    Ok(vec![SearchRequest::new(ctx, url, GamesParser { ctx: ctx.clone() })])
}

/// Request media URLs for games whose ids are already known.
pub fn media_url_requests(game_ids: &[String], ctx: &ProviderContext) -> Result<Vec<SearchRequest>, ScrapeError> {
    if game_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![images_request(game_ids, ctx)?])
}

fn images_request(game_ids: &[String], ctx: &ProviderContext) -> Result<SearchRequest, ScrapeError> {
    let key = api_key(ctx)?;
    let ids = game_ids.join(",");
    let url = build_url(
        &format!("{}/Games/Images", API_BASE),
        &[("apikey", key), ("games_id", ids.as_str()), ("filter[type]", IMAGE_TYPES)],
    )?;
    Ok(SearchRequest::new(ctx, url, parse_images))
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    status: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, ScrapeError> {
        if self.code != 200 {
            return Err(ScrapeError::Provider(format!(
                "{} answered with code {}: {}",
                DISPLAY_NAME, self.code, self.status
            )));
        }
        self.data
            .ok_or_else(|| ScrapeError::Provider(format!("{} response has no data", DISPLAY_NAME)))
    }
}

#[derive(Debug, Deserialize)]
struct GamesData {
    #[serde(default)]
    games: Vec<Game>,
}

#[derive(Debug, Deserialize)]
struct Game {
    id: u64,
    #[serde(default)]
    game_title: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    players: Option<u32>,
    #[serde(default)]
    rating: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesData {
    base_url: BaseUrl,
    #[serde(default)]
    images: HashMap<String, Vec<Image>>,
}

#[derive(Debug, Deserialize)]
struct BaseUrl {
    original: String,
}

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    side: Option<String>,
    filename: String,
}

// =============================================================================
// PARSERS
// =============================================================================

struct GamesParser {
    ctx: ProviderContext,
}

impl crate::search::ResponseParser for GamesParser {
    fn parse(&mut self, body: &[u8], sink: &mut SearchSink<'_>) -> Result<(), ScrapeError> {
        let data = parse_json::<Envelope<GamesData>>(DISPLAY_NAME, body)?.into_data()?;

        let mut ids = Vec::with_capacity(data.games.len());
        for game in data.games {
            let id = game.id.to_string();
            let mut result = SearchResult::new(NAME, id.clone());
            result.metadata.name = game.game_title;
            result.metadata.description = game.overview.unwrap_or_default();
            result.metadata.release_date = game.release_date.unwrap_or_default();
            result.metadata.players = game.players.map(|p| p.to_string()).unwrap_or_default();
            result.metadata.rating = game.rating.unwrap_or_default();
            sink.push_result(result);
            ids.push(id);
        }

        tracing::debug!("{} returned {} game(s)", DISPLAY_NAME, ids.len());
        if !ids.is_empty() {
            sink.enqueue(images_request(&ids, &self.ctx)?);
        }
        Ok(())
    }
}

fn category_for(image: &Image) -> Option<AssetCategory> {
    match (image.kind.as_str(), image.side.as_deref()) {
        ("boxart", Some("front")) => Some(AssetCategory::Cover),
        ("clearlogo", _) => Some(AssetCategory::Marquee),
        ("screenshot", _) => Some(AssetCategory::Screenshot),
        _ => None,
    }
}

fn parse_images(body: &[u8], sink: &mut SearchSink<'_>) -> Result<(), ScrapeError> {
    let data = parse_json::<Envelope<ImagesData>>(DISPLAY_NAME, body)?.into_data()?;
    let base = data.base_url.original;

    // Sorted so results created here come out in a stable order.
    let mut games: Vec<_> = data.images.into_iter().collect();
    games.sort_by(|a, b| a.0.cmp(&b.0));

    for (game_id, images) in games {
        let results = sink.results_mut();
        let index = match results.iter().position(|r| r.provider == NAME && r.game_id == game_id) {
            Some(index) => index,
            None => {
                results.push(SearchResult::new(NAME, game_id.clone()));
                results.len() - 1
            }
        };
        let result = &mut results[index];

        for image in &images {
            let Some(category) = category_for(image) else {
                continue;
            };
            // First image of each kind wins.
            if result.media_url(category).is_some() {
                continue;
            }
            result.set_media_url(category, format!("{}{}", base, image.filename), None);
        }

        if result.thumbnail_url.is_none() {
            result.thumbnail_url = result.media_url(AssetCategory::Cover).map(|m| m.url.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScraperConfig;
    use crate::handle::{AsyncHandle, AsyncStatus};
    use crate::net::scripted::scripted;
    use crate::net::Multiplexer;
    use crate::search::{start_media_urls_fetch, start_search, ProviderRegistry};

    const GAMES: &str = r#"{
        "code": 200,
        "status": "Success",
        "data": {
            "count": 2,
            "games": [
                {"id": 136, "game_title": "Super Metroid", "release_date": "1994-03-19",
                 "platform": 6, "players": 1, "overview": "Samus returns.", "rating": "E - Everyone"},
                {"id": 9001, "game_title": "Super Metroid Redesign", "platform": 6}
            ]
        }
    }"#;

    const IMAGES: &str = r#"{
        "code": 200,
        "status": "Success",
        "data": {
            "count": 4,
            "base_url": {"original": "https://cdn.thegamesdb.net/images/original/"},
            "images": {
                "136": [
                    {"id": 1, "type": "boxart", "side": "back", "filename": "boxart/back/136-1.jpg"},
                    {"id": 2, "type": "boxart", "side": "front", "filename": "boxart/front/136-1.jpg"},
                    {"id": 3, "type": "clearlogo", "filename": "clearlogo/136.png"},
                    {"id": 4, "type": "screenshot", "filename": "screenshots/136-1.jpg"},
                    {"id": 5, "type": "screenshot", "filename": "screenshots/136-2.jpg"}
                ]
            }
        }
    }"#;

    fn config() -> ScraperConfig {
        ScraperConfig {
            thegamesdb_api_key: Some("testkey".to_string()),
            ..ScraperConfig::default()
        }
    }

    fn params() -> SearchParams {
        SearchParams {
            system: "snes".to_string(),
            rom_file_name: "Super Metroid (USA).sfc".to_string(),
            name: "Super Metroid (USA)".to_string(),
            game_ids: Vec::new(),
        }
    }

    fn drain(queue: &mut impl AsyncHandle) -> AsyncStatus {
        for _ in 0..200 {
            let status = queue.poll();
            if status.is_terminal() {
                return status;
            }
        }
        queue.status()
    }

    #[test]
    fn test_platform_ids() {
        assert_eq!(platform_id("snes"), Some(6));
        assert_eq!(platform_id("megadrive"), platform_id("genesis"));
        assert_eq!(platform_id("amiga"), None);
    }

    #[test]
    fn test_search_fetches_games_then_images() {
        let (script, transport) = scripted();
        script.respond(format!("{}/Games/ByGameName", API_BASE), GAMES);
        script.respond(format!("{}/Games/Images", API_BASE), IMAGES);
        let mux = Multiplexer::new(transport).unwrap();

        let mut queue = start_search(&ProviderRegistry::with_defaults(), &params(), &config(), &mux);
        assert_eq!(drain(&mut queue), AsyncStatus::Done);

        let requests = script.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("name=Super+Metroid&"));
        assert!(requests[0].contains("filter%5Bplatform%5D=6"));
        assert!(requests[1].contains("games_id=136%2C9001"));

        let results = queue.into_results();
        assert_eq!(results.len(), 2);
        let metroid = &results[0];
        assert_eq!(metroid.metadata.name, "Super Metroid");
        assert_eq!(metroid.metadata.players, "1");
        assert_eq!(
            metroid.media_url(AssetCategory::Cover).unwrap().url,
            "https://cdn.thegamesdb.net/images/original/boxart/front/136-1.jpg"
        );
        assert_eq!(
            metroid.media_url(AssetCategory::Screenshot).unwrap().url,
            "https://cdn.thegamesdb.net/images/original/screenshots/136-1.jpg"
        );
        assert!(metroid.media_url(AssetCategory::Marquee).is_some());
        assert_eq!(metroid.thumbnail_url.as_deref(), Some(metroid.media_url(AssetCategory::Cover).unwrap().url.as_str()));

        // No images for the second game.
        assert!(results[1].media.is_empty());
    }

    #[test]
    fn test_search_by_known_id() {
        let (script, transport) = scripted();
        script.respond(format!("{}/Games/ByGameID", API_BASE), GAMES);
        script.respond(format!("{}/Games/Images", API_BASE), IMAGES);
        let mux = Multiplexer::new(transport).unwrap();

        let params = params().with_game_ids(vec!["136".to_string()]);
        let mut queue = start_search(&ProviderRegistry::with_defaults(), &params, &config(), &mux);
        assert_eq!(drain(&mut queue), AsyncStatus::Done);
        assert!(script.requests()[0].contains("id=136"));
    }

    #[test]
    fn test_media_urls_fetch_creates_results() {
        let (script, transport) = scripted();
        script.respond(format!("{}/Games/Images", API_BASE), IMAGES);
        let mux = Multiplexer::new(transport).unwrap();

        let mut queue = start_media_urls_fetch(&ProviderRegistry::with_defaults(), &["136".to_string()], &config(), &mux);
        assert_eq!(drain(&mut queue), AsyncStatus::Done);
        let results = queue.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].game_id, "136");
        assert!(results[0].media_url(AssetCategory::Cover).is_some());
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let (script, transport) = scripted();
        let mux = Multiplexer::new(transport).unwrap();

        let queue = start_search(&ProviderRegistry::with_defaults(), &params(), &ScraperConfig::default(), &mux);
        assert_eq!(queue.status(), AsyncStatus::Error);
        assert!(matches!(queue.error(), Some(ScrapeError::Configuration(_))));
        assert!(script.requests().is_empty());
    }

    #[test]
    fn test_api_error_code_is_provider_error() {
        let (script, transport) = scripted();
        script.respond(
            format!("{}/Games/ByGameName", API_BASE),
            r#"{"code": 403, "status": "This API Key is banned"}"#,
        );
        let mux = Multiplexer::new(transport).unwrap();

        let mut queue = start_search(&ProviderRegistry::with_defaults(), &params(), &config(), &mux);
        assert_eq!(drain(&mut queue), AsyncStatus::Error);
        assert!(queue.error_message().unwrap().contains("This API Key is banned"));
    }
}
