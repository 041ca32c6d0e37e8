//! Chime - console driver for the playback engine
//!
//! Reads one command per line from stdin and prints results and
//! notifications. Run with `RUST_LOG=debug` for engine logs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chime::cache::{self, CacheLayout};
use chime::catalog::CatalogClient;
use chime::library::LibraryScanner;
use chime::metadata::MetadataExtractor;
use chime::notifier::notification_channel;
use chime::playback::{
    ControlResult, PlaybackSession, RodioBackend, SessionHandle, backend_event_channel,
    spawn_session,
};
use chime::settings::Settings;
use chime::utils::format_time;

const HELP: &str = "\
commands:
  play <url>        play a remote URL
  local <path>      play a local file
  search <query>    search the catalog and play the best match
  pause             pause / resume / replay
  stop              stop playback
  seek <seconds>    jump to a position
  status            show the current state
  lyrics            print the lyrics of the current track
  scan              list the local library
  dir <path>        set and save the music directory
  pick <n>          play entry n of the last scan
  cache             show cache usage
  quit              exit";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load();
    let cache = open_cache(&settings);
    let catalog =
        CatalogClient::new(settings.catalog.clone()).context("failed to build catalog client")?;
    let extractor = MetadataExtractor::new(settings.metadata.tag_support());

    let (notifier, mut notifications) = notification_channel();
    tokio::spawn(async move {
        while let Some(message) = notifications.recv().await {
            println!("» {}", message);
        }
    });

    let (event_tx, event_rx) = backend_event_channel();
    let backend = RodioBackend::spawn(event_tx).context("failed to open audio output")?;

    let mut session = PlaybackSession::new(Box::new(backend))
        .with_catalog(catalog)
        .with_extractor(extractor)
        .with_notifier(Arc::new(notifier));
    if let Some(layout) = cache.clone() {
        session = session.with_cache(layout);
    }
    let handle = spawn_session(session, event_rx);

    let mut console = Console {
        handle,
        cache,
        scanner: LibraryScanner::new(extractor),
        settings,
    };

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !console.dispatch(line.trim()).await? {
            break;
        }
    }

    console.handle.stop().await;
    info!("Bye");
    Ok(())
}

/// Create the cache layout and clear leftovers of interrupted downloads
///
/// The engine keeps running without a cache when the layout cannot be created.
fn open_cache(settings: &Settings) -> Option<CacheLayout> {
    let root = settings.cache_root();
    match cache::ensure_layout(&root) {
        Ok(layout) => {
            cache::purge_temp(&layout);
            Some(layout)
        }
        Err(e) => {
            warn!("Running without cache: {}", e);
            None
        }
    }
}

struct Console {
    handle: SessionHandle,
    cache: Option<CacheLayout>,
    scanner: LibraryScanner,
    settings: Settings,
}

impl Console {
    /// Run one command line, returning `false` on quit
    async fn dispatch(&mut self, line: &str) -> Result<bool> {
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "quit" | "exit" => return Ok(false),
            "help" => println!("{}", HELP),
            "play" => print_result(&self.handle.play_url(arg).await),
            "local" => print_result(&self.handle.play_local_file(arg).await),
            "search" => print_result(&self.handle.search_and_play(arg).await),
            "pause" => print_result(&self.handle.pause_resume().await),
            "stop" => print_result(&self.handle.stop().await),
            "seek" => match arg.parse::<f64>() {
                Ok(seconds) => print_result(&self.handle.seek(seconds).await),
                Err(_) => println!("usage: seek <seconds>"),
            },
            "lyrics" => print_result(&self.handle.lyrics().await),
            "status" => self.print_status().await?,
            "scan" => self.scan(),
            "dir" => self.set_library_dir(arg),
            "pick" => self.pick(arg).await,
            "cache" => self.print_cache(),
            other => println!("unknown command {:?}, try `help`", other),
        }
        Ok(true)
    }

    async fn print_status(&self) -> Result<()> {
        let snapshot = self.handle.status().await;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        if let Some(line) = snapshot.current_lyric() {
            println!("♪ {}", line.display());
        }
        Ok(())
    }

    fn scan(&mut self) {
        let Some(dir) = self.library_dir() else {
            println!("no music directory configured");
            return;
        };
        let max_age = Duration::from_secs(self.settings.library.max_index_age_secs);
        let index = tokio::task::block_in_place(|| self.scanner.get_or_scan(&dir, max_age));

        println!("{} tracks in {}", index.len(), index.directory.display());
        for (i, entry) in index.entries.iter().enumerate() {
            let duration = entry.duration_seconds.map(format_time).unwrap_or_default();
            println!("{:>4}  {}  {}", i, entry.label(), duration);
        }
    }

    fn set_library_dir(&mut self, arg: &str) {
        let dir = PathBuf::from(arg);
        if arg.is_empty() || !dir.is_dir() {
            println!("usage: dir <existing directory>");
            return;
        }

        self.settings.library.music_dir = Some(dir);
        match self.settings.save() {
            Ok(()) => println!("music directory saved"),
            Err(e) => warn!("Failed to save settings: {}", e),
        }
    }

    async fn pick(&mut self, arg: &str) {
        let path: Option<PathBuf> = arg.parse::<usize>().ok().and_then(|i| {
            self.scanner
                .cached()
                .and_then(|index| index.entries.get(i))
                .map(|entry| entry.source_path.clone())
        });

        match path {
            Some(path) => print_result(&self.handle.play_local_file(path).await),
            None => println!("usage: pick <n> (run `scan` first)"),
        }
    }

    fn print_cache(&self) {
        match &self.cache {
            Some(layout) => {
                let stats = layout.stats();
                println!(
                    "{}: {} files ({} MB), {} staged",
                    layout.root.display(),
                    stats.persisted_files,
                    stats.total_mb(),
                    stats.temp_files
                );
            }
            None => println!("cache disabled"),
        }
    }

    fn library_dir(&self) -> Option<PathBuf> {
        self.settings.library.music_dir.clone()
    }
}

fn print_result(result: &ControlResult) {
    println!("[{:?}] {}", result.status, result.message);
    for line in &result.lines {
        println!("  {}", line);
    }
}
