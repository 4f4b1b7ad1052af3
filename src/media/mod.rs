// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Media assets: categories, on-disk layout, and the handles that download
//! and persist them.
//!
//! # Layout
//!
//! ```text
//! media_root/
//! └── snes/                      system name
//!     ├── covers/
//!     │   ├── game.jpg           rom at <start_path>/game.sfc
//!     │   └── hacks/game2.png    rom at <start_path>/hacks/game2.sfc
//!     ├── marquees/
//!     └── videos/
//! ```
//!
//! There is no manifest. Presence of a file is the only state.

pub mod download;
pub mod rescale;
pub mod resolve;
pub mod thumbnail;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use download::{MediaAssetDownload, SavePolicy, MIN_PLAUSIBLE_MEDIA_BYTES};
pub use rescale::rescale_image;
pub use resolve::MediaResolveHandle;
pub use thumbnail::ThumbnailFetch;

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg"];
const VIDEO_EXTENSIONS: &[&str] = &[".avi", ".mkv", ".mov", ".mp4", ".wmv"];

/// One kind of game artwork or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Box3D,
    Cover,
    Marquee,
    Screenshot,
    Video,
}

impl AssetCategory {
    /// Every category, in resolve order.
    pub const ALL: [AssetCategory; 5] = [
        AssetCategory::Box3D,
        AssetCategory::Cover,
        AssetCategory::Marquee,
        AssetCategory::Screenshot,
        AssetCategory::Video,
    ];

    /// Directory under `media_root/<system>/` holding this category.
    pub fn subdirectory(self) -> &'static str {
        match self {
            AssetCategory::Box3D => "3dboxes",
            AssetCategory::Cover => "covers",
            AssetCategory::Marquee => "marquees",
            AssetCategory::Screenshot => "screenshots",
            AssetCategory::Video => "videos",
        }
    }

    /// Static images are downscaled after saving; video is left alone.
    pub fn resize_eligible(self) -> bool {
        !matches!(self, AssetCategory::Video)
    }

    /// Extensions probed when looking for existing local media.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            AssetCategory::Video => VIDEO_EXTENSIONS,
            _ => IMAGE_EXTENSIONS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssetCategory::Box3D => "3D box",
            AssetCategory::Cover => "cover",
            AssetCategory::Marquee => "marquee",
            AssetCategory::Screenshot => "screenshot",
            AssetCategory::Video => "video",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything needed to fetch and persist one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAssetSpec {
    pub category: AssetCategory,
    pub url: String,
    /// Extension supplied by the provider, if any
    pub format: Option<String>,
    /// Where the asset will be written
    pub destination: PathBuf,
    /// File currently occupying this slot, removed before writing
    pub existing: Option<PathBuf>,
    pub resize: bool,
}

// =============================================================================
// GAME ENTRIES
// =============================================================================

/// The slice of a game-list entry the media pipeline needs.
pub trait GameEntry {
    /// Name of the owning system, e.g. `snes`.
    fn system_name(&self) -> &str;

    /// Path of the game file.
    fn path(&self) -> &Path;

    /// Root directory the system's games were found under.
    fn start_path(&self) -> &Path;

    /// Path of the local file already stored for `category`, if any.
    fn existing_media(&self, category: AssetCategory) -> Option<PathBuf>;

    /// File name without extension, used as the media file name.
    fn base_name(&self) -> String {
        self.path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory of the game relative to the system's start path.
    fn relative_subfolder(&self) -> PathBuf {
        self.path()
            .parent()
            .and_then(|parent| parent.strip_prefix(self.start_path()).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// A game file on disk whose media lives in a local media tree.
#[derive(Debug, Clone)]
pub struct LocalGame {
    system: String,
    path: PathBuf,
    start_path: PathBuf,
    media_root: PathBuf,
}

impl LocalGame {
    pub fn new(
        system: impl Into<String>,
        path: impl Into<PathBuf>,
        start_path: impl Into<PathBuf>,
        media_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            system: system.into(),
            path: path.into(),
            start_path: start_path.into(),
            media_root: media_root.into(),
        }
    }
}

impl GameEntry for LocalGame {
    fn system_name(&self) -> &str {
        &self.system
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn start_path(&self) -> &Path {
        &self.start_path
    }

    fn existing_media(&self, category: AssetCategory) -> Option<PathBuf> {
        let stem = save_as_path(&self.media_root, self, category, "");
        category
            .extensions()
            .iter()
            .map(|ext| {
                let mut candidate = stem.clone().into_os_string();
                candidate.push(ext);
                PathBuf::from(candidate)
            })
            .find(|candidate| candidate.is_file())
    }
}

// =============================================================================
// PATHS
// =============================================================================

/// Pick the file extension for a downloaded asset.
///
/// The provider's format hint wins (a missing leading dot is added).
/// Otherwise the suffix of the URL's last path segment is used, ignoring any
/// query string or fragment. No suffix means no extension.
pub fn media_extension(url: &str, format: Option<&str>) -> String {
    if let Some(format) = format.map(str::trim).filter(|f| !f.is_empty()) {
        return if format.starts_with('.') {
            format.to_string()
        } else {
            format!(".{}", format)
        };
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    let segment = match path.split_once('/') {
        Some((_, tail)) => tail.rsplit('/').next().unwrap_or_default(),
        // Host only, nothing that could carry a suffix
        None => "",
    };

    match segment.rfind('.') {
        Some(dot) if dot + 1 < segment.len() => segment[dot..].to_string(),
        _ => String::new(),
    }
}

/// `media_root/system/category/[relative_subfolder/]base_name{extension}`
pub fn save_as_path(
    media_root: &Path,
    game: &(impl GameEntry + ?Sized),
    category: AssetCategory,
    extension: &str,
) -> PathBuf {
    let mut path = media_root
        .join(game.system_name())
        .join(category.subdirectory());

    let subfolder = game.relative_subfolder();
    if !subfolder.as_os_str().is_empty() {
        path.push(subfolder);
    }

    path.push(format!("{}{}", game.base_name(), extension));
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn game(root: &Path, rom: &str) -> LocalGame {
        LocalGame::new("snes", root.join("roms").join(rom), root.join("roms"), root.join("media"))
    }

    #[test]
    fn test_extension_prefers_format_hint() {
        assert_eq!(media_extension("http://x/y.jpg", Some("png")), ".png");
        assert_eq!(media_extension("http://x/y.jpg", Some(".png")), ".png");
        assert_eq!(media_extension("http://x/y.jpg", Some("")), ".jpg");
    }

    #[test]
    fn test_extension_from_url_ignores_query_and_host() {
        assert_eq!(media_extension("http://x/y.jpg", None), ".jpg");
        assert_eq!(media_extension("https://cdn.example.com/a/b/box.png?size=large&v=1.2", None), ".png");
        assert_eq!(media_extension("https://cdn.example.com/media#frag.gif", None), "");
        assert_eq!(media_extension("https://cdn.example.com", None), "");
        assert_eq!(media_extension("https://cdn.example.com/file.", None), "");
    }

    #[test]
    fn test_save_path_at_start_path_root() {
        let dir = TempDir::new().unwrap();
        let game = game(dir.path(), "game.sfc");
        let path = save_as_path(&dir.path().join("media"), &game, AssetCategory::Cover, ".jpg");
        assert_eq!(path, dir.path().join("media/snes/covers/game.jpg"));
    }

    #[test]
    fn test_save_path_keeps_relative_subfolder() {
        let dir = TempDir::new().unwrap();
        let game = game(dir.path(), "hacks/usa/game2.sfc");
        let path = save_as_path(&dir.path().join("media"), &game, AssetCategory::Marquee, ".png");
        assert_eq!(path, dir.path().join("media/snes/marquees/hacks/usa/game2.png"));
    }

    #[test]
    fn test_existing_media_probes_extensions() {
        let dir = TempDir::new().unwrap();
        let game = game(dir.path(), "game.sfc");
        assert_eq!(game.existing_media(AssetCategory::Cover), None);

        let covers = dir.path().join("media/snes/covers");
        fs::create_dir_all(&covers).unwrap();
        fs::write(covers.join("game.png"), b"png").unwrap();
        assert_eq!(game.existing_media(AssetCategory::Cover), Some(covers.join("game.png")));

        // Image extensions are not probed for video.
        let videos = dir.path().join("media/snes/videos");
        fs::create_dir_all(&videos).unwrap();
        fs::write(videos.join("game.png"), b"png").unwrap();
        assert_eq!(game.existing_media(AssetCategory::Video), None);
        fs::write(videos.join("game.mp4"), b"mp4").unwrap();
        assert_eq!(game.existing_media(AssetCategory::Video), Some(videos.join("game.mp4")));
    }

    #[test]
    fn test_category_properties() {
        assert!(AssetCategory::Cover.resize_eligible());
        assert!(!AssetCategory::Video.resize_eligible());
        assert_eq!(AssetCategory::Box3D.subdirectory(), "3dboxes");
        assert_eq!(AssetCategory::ALL[0], AssetCategory::Box3D);
        assert_eq!(serde_json::to_string(&AssetCategory::Screenshot).unwrap(), "\"screenshot\"");
    }
}
