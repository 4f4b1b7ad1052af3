// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use gamescrape::config::{config_path, load_config, set_config_value};
use gamescrape::error::scrape_report;
use gamescrape::utils::format_bytes;
use gamescrape::{
    run_until_terminal, start_search, AsyncHandle, AsyncStatus, GameEntry, LocalGame, MediaResolveHandle,
    Multiplexer, ProviderRegistry, ScrapeError, ScraperConfig, SearchParams, SearchResult,
    ThumbnailFetch,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One driver frame.
const FRAME: Duration = Duration::from_millis(16);

// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const BRIGHT_CYAN: &str = "\x1b[96m";
}

use colors::*;

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Data error - provider returned invalid media
    pub const DATA_ERR: i32 = 65;
    /// Service unavailable - provider unreachable or unreadable
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// I/O error - media could not be written
    pub const IO_ERR: i32 = 74;
    /// Temporary failure - try again later
    pub const TEMP_FAIL: i32 = 75;
    /// Permission denied - remote identity could not be verified
    pub const NO_PERM: i32 = 77;
    /// Configuration error - invalid or missing config
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    /// Create a spinner with consistent styling
    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("\u{28FB}\u{28F9}\u{28FC}\u{28F8}\u{28FE}\u{28F6}\u{28F7}\u{28E7}\u{28CF}\u{28DF} ")
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    pub fn clear(spinner: &ProgressBar) {
        spinner.finish_and_clear();
    }
}

/// gamescrape - game metadata and media scraper.
#[derive(Parser)]
#[command(name = "gamescrape")]
#[command(version = VERSION)]
#[command(about = "Scrape metadata and artwork for your game library.")]
#[command(long_about = "gamescrape - game metadata and media scraper\n\n\
    List providers:      gamescrape providers\n\
    Search a game:       gamescrape search roms/snes/game.sfc --system snes\n\
    Scrape its media:    gamescrape scrape roms/snes/game.sfc --system snes\n\
    Configure:           gamescrape config show")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Provider to use instead of the configured one
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Media directory to use instead of the configured one
    #[arg(long, global = true)]
    media_root: Option<PathBuf>,

    /// Verbose mode: debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available providers
    Providers,

    /// Search a provider for a game
    ///
    /// Examples:
    ///   gamescrape search roms/snes/game.sfc --system snes
    ///   gamescrape search game.sfc --system snes --name "Super Metroid" --json
    Search {
        #[command(flatten)]
        target: GameArgs,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search, pick a result and download its media
    ///
    /// Examples:
    ///   gamescrape scrape roms/snes/game.sfc --system snes
    ///   gamescrape scrape roms/snes/hacks/game.sfc --system snes --start-path roms/snes --interactive
    Scrape {
        #[command(flatten)]
        target: GameArgs,
        /// Result to use (1-based), defaults to the first
        #[arg(long, default_value_t = 1)]
        pick: usize,
        /// Choose the result from a list
        #[arg(short, long, conflicts_with = "pick")]
        interactive: bool,
        /// Don't prefetch the thumbnail before resolving
        #[arg(long)]
        no_thumbnail: bool,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(clap::Args)]
struct GameArgs {
    /// Path to the game file
    rom: PathBuf,
    /// System name, e.g. snes
    #[arg(short, long)]
    system: String,
    /// Root directory of the system's games (defaults to the game's directory)
    #[arg(long)]
    start_path: Option<PathBuf>,
    /// Search for this name instead of the file name
    #[arg(long)]
    name: Option<String>,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Print the config file path
    Path,
    /// Change a setting
    ///
    /// Example:
    ///   gamescrape config set resize_max_width 800
    Set {
        key: String,
        value: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("gamescrape=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gamescrape=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(err: &ScrapeError) -> i32 {
    match err {
        ScrapeError::Network(_) => TEMP_FAIL,
        ScrapeError::Trust(_) => NO_PERM,
        ScrapeError::Validation(_) => DATA_ERR,
        ScrapeError::Io(_) => IO_ERR,
        ScrapeError::Configuration(_) => CONFIG,
        ScrapeError::Provider(_) => SERVICE_UNAVAILABLE,
    }
}

/// Print the report for a failed handle and exit.
fn fail(subject: &str, err: Option<&ScrapeError>) -> ! {
    match err {
        Some(err) => {
            eprintln!("{}", scrape_report(subject, err).build());
            std::process::exit(exit_code(err));
        }
        None => {
            eprintln!("{RED}[X]{RESET} Scraping {} failed", subject);
            std::process::exit(ERROR);
        }
    }
}

/// Poll `handle` once per frame behind a spinner.
fn drive<H: AsyncHandle>(handle: &mut H, message: &str, progress: impl Fn(&H) -> Option<String>) -> AsyncStatus {
    let spinner = spinner::create(message);
    let status = run_until_terminal(handle, FRAME, |h| {
        if let Some(detail) = progress(h) {
            spinner.set_message(format!("{} {DIM}{}{RESET}", message, detail));
        }
    });
    spinner::clear(&spinner);
    status
}

fn game_for(target: &GameArgs, config: &ScraperConfig) -> Result<LocalGame> {
    if !target.rom.exists() {
        anyhow::bail!("Game file not found: {}", target.rom.display());
    }
    let start_path = match &target.start_path {
        Some(path) => path.clone(),
        None => target.rom.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    if target.rom.parent().map_or(true, |parent| !parent.starts_with(&start_path)) {
        anyhow::bail!(
            "{} is not inside start path {}",
            target.rom.display(),
            start_path.display()
        );
    }
    Ok(LocalGame::new(&target.system, &target.rom, start_path, &config.media_root))
}

fn run_search(
    game: &LocalGame,
    target: &GameArgs,
    config: &ScraperConfig,
    mux: &Rc<Multiplexer>,
) -> Vec<SearchResult> {
    let mut params = SearchParams::for_game(game);
    if let Some(name) = &target.name {
        params = params.with_name(name);
    }

    let registry = ProviderRegistry::with_defaults();
    let mut search = start_search(&registry, &params, config, mux);
    let message = format!("Searching {} for {}...", config.provider, params.name);
    let status = drive(&mut search, &message, |queue| {
        (queue.pending_requests() > 1).then(|| format!("({} requests queued)", queue.pending_requests()))
    });

    if status.is_error() {
        fail(&format!("\"{}\"", params.name), search.error());
    }
    search.into_results()
}

fn describe(result: &SearchResult) -> String {
    let mut line = result.metadata.name.clone();
    if !result.metadata.release_date.is_empty() {
        line.push_str(&format!(" ({})", result.metadata.release_date));
    }
    let media: Vec<&str> = result.media.keys().map(|c| c.label()).collect();
    if !media.is_empty() {
        line.push_str(&format!(" {DIM}[{}]{RESET}", media.join(", ")));
    }
    line
}

fn print_results(results: &[SearchResult]) {
    println!();
    for (i, result) in results.iter().enumerate() {
        println!("  {CYAN}{:>2}.{RESET} {}  {DIM}id {}{RESET}", i + 1, describe(result), result.game_id);
    }
    println!();
}

fn handle_search(target: &GameArgs, json: bool, config: &ScraperConfig) -> Result<()> {
    let game = game_for(target, config)?;
    let mux = Multiplexer::with_http().context("Failed to start transfer multiplexer")?;
    let results = run_search(&game, target, config, &mux);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("{YELLOW}[!]{RESET} No results found");
    } else {
        print_results(&results);
    }
    Ok(())
}

fn choose(results: Vec<SearchResult>, pick: usize, interactive: bool) -> Result<SearchResult> {
    let index = if interactive {
        let labels: Vec<String> = results
            .iter()
            .map(|result| format!("{}  {DIM}id {}{RESET}", describe(result), result.game_id))
            .collect();
        inquire::Select::new("Select a match:", labels)
            .raw_prompt()
            .context("No result selected")?
            .index
    } else {
        pick.checked_sub(1)
            .with_context(|| format!("--pick starts at 1, got {}", pick))?
    };
    take_result(results, index)
}

/// Remove the result at zero-based `index`.
fn take_result(mut results: Vec<SearchResult>, index: usize) -> Result<SearchResult> {
    if index >= results.len() {
        anyhow::bail!("Result {} is out of range, {} result(s) found", index + 1, results.len());
    }
    Ok(results.swap_remove(index))
}

fn handle_scrape(
    target: &GameArgs,
    pick: usize,
    interactive: bool,
    prefetch_thumbnail: bool,
    config: &ScraperConfig,
) -> Result<()> {
    let game = game_for(target, config)?;
    let mux = Multiplexer::with_http().context("Failed to start transfer multiplexer")?;

    let results = run_search(&game, target, config, &mux);
    if results.is_empty() {
        println!("{YELLOW}[!]{RESET} No results found for {}", game.path().display());
        return Ok(());
    }
    let mut result = choose(results, pick, interactive)?;
    let title = result.metadata.name.clone();
    println!("{GREEN}[✓]{RESET} Matched {BOLD}{}{RESET}", title);

    if prefetch_thumbnail {
        let mut fetch = ThumbnailFetch::new(result, config, &mux);
        if drive(&mut fetch, "Fetching thumbnail...", |_| None).is_error() {
            // Not fatal: the resolve downloads it again.
            if let Some(err) = fetch.error() {
                println!("{YELLOW}[!]{RESET} Thumbnail: {}", err);
            }
        }
        result = fetch.into_result();
    }

    let mut resolve = MediaResolveHandle::new(result, &game, config, &mux);
    if resolve.categories().is_empty() {
        println!("{YELLOW}[!]{RESET} Nothing to download");
        return Ok(());
    }

    let message = format!("Downloading {} asset(s)...", resolve.categories().len());
    let spinner_status = drive(&mut resolve, &message, |handle| {
        let (received, total) = handle.transfer_progress();
        (received > 0).then(|| match total {
            Some(total) => format!("{} / {}", format_bytes(received), format_bytes(total)),
            None => format_bytes(received),
        })
    });

    for file in resolve.saved_files() {
        println!("  {GREEN}+{RESET} {}", file.display());
    }

    if spinner_status.is_error() {
        let subject = match resolve.failed_category() {
            Some(category) => format!("the {} of \"{}\"", category, title),
            None => format!("\"{}\"", title),
        };
        fail(&subject, resolve.error());
    }

    if resolve.saved_new_media() {
        println!("{GREEN}[✓]{RESET} Saved {} file(s) for {}", resolve.saved_files().len(), title);
    } else {
        println!("{YELLOW}[!]{RESET} Existing media kept, nothing new saved");
    }
    Ok(())
}

fn handle_providers(config: &ScraperConfig) {
    let registry = ProviderRegistry::with_defaults();
    println!();
    println!("{BRIGHT_CYAN}{BOLD}=== Providers ==={RESET}");
    println!();
    for name in registry.names() {
        if name == config.provider {
            println!("  {} {}", "*".green(), name.bold());
        } else {
            println!("    {}", name);
        }
    }
    if !registry.is_valid_configured(config) {
        println!();
        println!(
            "{YELLOW}[!]{RESET} Configured provider '{}' is not available",
            config.provider
        );
    }
    println!();
}

fn handle_config(command: Option<ConfigCommands>, config: ScraperConfig) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{BRIGHT_CYAN}{BOLD}=== gamescrape Configuration ==={RESET}");
            println!();
            for (key, value) in config.display_entries() {
                println!("  {:<26} {}", key, value);
            }
            println!();
            if let Ok(path) = config_path() {
                println!("Config file: {}", path.display());
            }
            println!();
        }
        Some(ConfigCommands::Path) => {
            println!("{}", config_path()?.display());
        }
        Some(ConfigCommands::Set { key, value }) => {
            set_config_value(&key, &value)?;
            println!("{GREEN}[✓]{RESET} {} set", key);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{RED}[!]{RESET} Failed to load configuration: {:#}", e);
            std::process::exit(CONFIG);
        }
    };

    // Command-line overrides only apply to scraping.
    if !matches!(cli.command, Commands::Config { .. }) {
        if let Some(provider) = cli.provider {
            config.provider = provider;
        }
        if let Some(root) = cli.media_root {
            config.media_root = root;
        }
    }

    match cli.command {
        Commands::Providers => handle_providers(&config),
        Commands::Search { target, json } => handle_search(&target, json, &config)?,
        Commands::Scrape {
            target,
            pick,
            interactive,
            no_thumbnail,
        } => handle_scrape(&target, pick, interactive, !no_thumbnail, &config)?,
        Commands::Config { command } => handle_config(command, config)?,
    }
    Ok(())
}
