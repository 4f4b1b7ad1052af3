// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! ScreenScraper `jeuInfos.php`: one request per game, metadata and media
//! together.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::ScrapeError;
use crate::media::AssetCategory;
use crate::search::{ProviderContext, SearchParams, SearchRequest, SearchResult, SearchSink};

use super::{build_url, parse_json};

pub const NAME: &str = "screenscraper";

const API_URL: &str = "https://api.screenscraper.fr/api2/jeuInfos.php";
const SOFTNAME: &str = concat!("gamescrape-", env!("CARGO_PKG_VERSION"));
const DISPLAY_NAME: &str = "ScreenScraper";

/// Regions tried after the preferred one, in order.
const FALLBACK_REGIONS: &[&str] = &["wor", "us", "eu", "ss", "jp"];

/// ScreenScraper system id for a system name.
pub fn system_id(system: &str) -> Option<u32> {
    let id = match system {
        "megadrive" | "genesis" => 1,
        "nes" => 3,
        "snes" => 4,
        "gb" => 9,
        "gbc" => 10,
        "gba" => 12,
        "n64" => 14,
        "psx" => 57,
        "arcade" | "mame" => 75,
        _ => return None,
    };
    Some(id)
}

/// Media type in the response for each category.
fn media_type(category: AssetCategory) -> &'static str {
    match category {
        AssetCategory::Box3D => "box-3D",
        AssetCategory::Cover => "box-2D",
        AssetCategory::Marquee => "wheel",
        AssetCategory::Screenshot => "ss",
        AssetCategory::Video => "video",
    }
}

pub fn generate_requests(params: &SearchParams, ctx: &ProviderContext) -> Result<Vec<SearchRequest>, ScrapeError> {
    if params.rom_file_name.is_empty() && params.game_ids.is_empty() {
        return Err(ScrapeError::Configuration("No game file to search for".to_string()));
    }

    let system = system_id(&params.system).map(|id| id.to_string());
    let credentials = &ctx.credentials;

    let mut query = vec![("output", "json"), ("softname", SOFTNAME)];
    if let Some(user) = credentials.screenscraper_username.as_deref() {
        query.push(("ssid", user));
    }
    if let Some(password) = credentials.screenscraper_password.as_deref() {
        query.push(("sspassword", password));
    }
    if let Some(system) = system.as_deref() {
        query.push(("systemeid", system));
    }
    match params.game_ids.first() {
        Some(id) => query.push(("gameid", id.as_str())),
        None => query.push(("romnom", params.rom_file_name.as_str())),
    }

    let url = build_url(API_URL, &query)?;
    let parser = GameInfoParser {
        region: ctx.region.clone(),
    };
    Ok(vec![SearchRequest::new(ctx, url, parser)])
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    response: Response,
}

#[derive(Debug, Deserialize)]
struct Response {
    jeu: Jeu,
}

#[derive(Debug, Deserialize)]
struct Jeu {
    id: Value,
    #[serde(default)]
    noms: Vec<Regional>,
    #[serde(default)]
    synopsis: Vec<Localized>,
    #[serde(default)]
    dates: Vec<Regional>,
    #[serde(default)]
    developpeur: Option<Text>,
    #[serde(default)]
    editeur: Option<Text>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    joueurs: Option<Text>,
    #[serde(default)]
    note: Option<Text>,
    #[serde(default)]
    medias: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Regional {
    #[serde(default)]
    region: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct Localized {
    #[serde(default)]
    langue: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct Text {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Genre {
    #[serde(default)]
    noms: Vec<Localized>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    region: Option<String>,
    url: String,
    #[serde(default)]
    format: Option<String>,
}

// =============================================================================
// PARSER
// =============================================================================

struct GameInfoParser {
    region: String,
}

impl GameInfoParser {
    /// Best entry for the preferred region, then the fallbacks.
    fn pick<'a, T>(&self, items: &'a [T], region_of: impl Fn(&T) -> Option<&str>) -> Option<&'a T> {
        std::iter::once(self.region.as_str())
            .chain(FALLBACK_REGIONS.iter().copied())
            .find_map(|wanted| items.iter().find(|&item| region_of(item) == Some(wanted)))
            .or_else(|| items.first())
    }

    fn english(items: &[Localized]) -> Option<&str> {
        items
            .iter()
            .find(|l| l.langue == "en")
            .or_else(|| items.first())
            .map(|l| l.text.as_str())
    }
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// ScreenScraper rates out of 20.
fn normalize_rating(note: &str) -> String {
    match note.trim().parse::<f64>() {
        Ok(score) => format!("{:.2}", (score / 20.0).clamp(0.0, 1.0)),
        Err(_) => String::new(),
    }
}

impl crate::search::ResponseParser for GameInfoParser {
    fn parse(&mut self, body: &[u8], sink: &mut SearchSink<'_>) -> Result<(), ScrapeError> {
        let jeu = parse_json::<Envelope>(DISPLAY_NAME, body)?.response.jeu;

        let mut result = SearchResult::new(NAME, id_string(&jeu.id));
        let metadata = &mut result.metadata;
        metadata.name = self
            .pick(&jeu.noms, |n| Some(n.region.as_str()))
            .map(|n| n.text.clone())
            .unwrap_or_default();
        metadata.description = Self::english(&jeu.synopsis).unwrap_or_default().to_string();
        metadata.release_date = self
            .pick(&jeu.dates, |d| Some(d.region.as_str()))
            .map(|d| d.text.clone())
            .unwrap_or_default();
        metadata.developer = jeu.developpeur.map(|t| t.text).unwrap_or_default();
        metadata.publisher = jeu.editeur.map(|t| t.text).unwrap_or_default();
        metadata.genre = jeu
            .genres
            .iter()
            .filter_map(|g| Self::english(&g.noms))
            .collect::<Vec<_>>()
            .join(", ");
        metadata.players = jeu.joueurs.map(|t| t.text).unwrap_or_default();
        metadata.rating = jeu.note.map(|t| normalize_rating(&t.text)).unwrap_or_default();

        for category in AssetCategory::ALL {
            let wanted = media_type(category);
            let candidates: Vec<&Media> = jeu.medias.iter().filter(|m| m.kind == wanted).collect();
            if let Some(media) = self.pick(&candidates, |m| m.region.as_deref()) {
                result.set_media_url(category, media.url.clone(), media.format.clone());
            }
        }
        result.thumbnail_url = result.media_url(AssetCategory::Cover).map(|m| m.url.clone());

        tracing::debug!("{} matched \"{}\" (id {})", DISPLAY_NAME, result.metadata.name, result.game_id);
        sink.push_result(result);
        Ok(())
    }
}
