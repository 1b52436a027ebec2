mod config;

use std::env;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;

use common::TrackRecord;
use config::{config_path_from_env, load_or_create_config, resolve_path, Settings};
use library::{
    load_playlist, matched_entries, ChannelObserver, LibraryIndex, MetadataBackend,
    PlaylistMatch, ScanPhase, ScanStatus, TrackMatch,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: reconcile [--json] [--dir <path>]... (search <query...> | playlist <file>)";

enum Command {
    Search(String),
    Playlist(PathBuf),
}

struct Args {
    command: Command,
    json: bool,
    directories: Vec<PathBuf>,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut json = false;
    let mut directories = Vec::new();
    let mut rest = Vec::new();
    let mut raw = raw.into_iter();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--dir" => {
                let dir = raw.next().ok_or("--dir needs a path")?;
                directories.push(PathBuf::from(dir));
            }
            _ => rest.push(arg),
        }
    }

    let mut rest = rest.into_iter();
    let command = match rest.next().as_deref() {
        Some("search") => {
            let query = rest.collect::<Vec<_>>().join(" ");
            if query.trim().is_empty() {
                return Err("search needs a query".to_string());
            }
            Command::Search(query)
        }
        Some("playlist") => {
            let file = rest.next().ok_or("playlist needs a file")?;
            Command::Playlist(PathBuf::from(file))
        }
        _ => return Err(USAGE.to_string()),
    };

    Ok(Args {
        command,
        json,
        directories,
    })
}

#[derive(Serialize)]
struct MatchOutput<'a> {
    #[serde(flatten)]
    record: &'a TrackRecord,
    length: String,
    quality: String,
    score: f64,
}

impl<'a> MatchOutput<'a> {
    fn new(found: &'a TrackMatch) -> Self {
        let record = found.record.as_ref();
        Self {
            record,
            length: record.length_label(),
            quality: record.quality_label(),
            score: found.score,
        }
    }
}

#[derive(Serialize)]
struct EntryOutput<'a> {
    entry: &'a str,
    matches: Vec<MatchOutput<'a>>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(env::args().skip(1))?;

    let config_path = config_path_from_env();
    let (settings, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let index = build_index(&settings, &config_path, &args.directories);
    if index.directories().is_empty() {
        return Err("no music directories configured".into());
    }

    scan(&index);
    match index.status() {
        ScanStatus::Completed(_) => {}
        ScanStatus::Failed(reason) => return Err(reason.into()),
        other => warn!("Scan ended as {:?}", other),
    }

    let threshold = settings.threshold();
    match args.command {
        Command::Search(query) => {
            let results = index.search(&query, threshold);
            if args.json {
                let out: Vec<MatchOutput> = results.iter().map(MatchOutput::new).collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_matches(&results);
            }
        }
        Command::Playlist(path) => {
            let entries = load_playlist(&path)?;
            let results = index.match_playlist(&entries, threshold);
            if args.json {
                let out: Vec<EntryOutput> = results
                    .iter()
                    .map(|m| EntryOutput {
                        entry: &m.entry,
                        matches: m.matches.iter().map(MatchOutput::new).collect(),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_playlist(&results);
            }
        }
    }

    Ok(())
}

fn build_index(
    settings: &Settings,
    config_path: &Path,
    extra: &[PathBuf],
) -> LibraryIndex {
    let index = LibraryIndex::with_backend(MetadataBackend::from_enabled(settings.read_tags));
    index.set_extensions(&settings.extensions);
    index.set_follow_links(settings.follow_links);

    let configured = settings
        .directories
        .iter()
        .map(|dir| resolve_path(config_path, dir));
    for dir in configured.chain(extra.iter().cloned()) {
        if !index.add_directory(&dir) {
            warn!("Ignoring music directory {:?}", dir);
        }
    }
    index
}

fn scan(index: &LibraryIndex) {
    let (tx, rx) = channel();
    if !index.start_scan(ChannelObserver::new(tx)) {
        return;
    }
    for progress in rx {
        match progress.phase {
            ScanPhase::Started => eprintln!("{}", progress.message),
            phase if phase.is_terminal() => eprintln!("\n{}", progress.message),
            _ => eprint!("\r{}", progress.message),
        }
    }
    index.wait();
}

fn print_matches(results: &[TrackMatch]) {
    if results.is_empty() {
        println!("No matches.");
        return;
    }
    for found in results {
        let record = &found.record;
        println!(
            "{:>5.1}%  {}  [{}, {}]  {}",
            found.score * 100.0,
            record.display_name(),
            record.length_label(),
            record.quality_label(),
            record.path.display()
        );
    }
}

fn print_playlist(results: &[PlaylistMatch]) {
    for result in results {
        match result.best() {
            Some(best) => println!(
                "{}\n    -> {} ({:.1}%, {} candidates)",
                result.entry,
                best.record.path.display(),
                best.score * 100.0,
                result.matches.len()
            ),
            None => println!("{}\n    -> no match", result.entry),
        }
    }
    println!(
        "Matched {} of {} entries",
        matched_entries(results),
        results.len()
    );
}
