mod filename;

use serde::Serialize;
use std::path::{Path, PathBuf};

pub use filename::{parse_filename, ParsedName};

pub const DEFAULT_EXTENSIONS: [&str; 6] = ["mp3", "m4a", "flac", "ogg", "aac", "wav"];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackRecord {
    pub id: String,
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub artist: String,
    pub song: String,
    pub track_number: Option<u32>,
    pub duration_secs: Option<u32>,
    pub bitrate_kbps: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Enrichment {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub duration_secs: Option<u32>,
    pub bitrate_kbps: Option<u32>,
}

impl TrackRecord {
    pub fn new(
        path: PathBuf,
        size_bytes: u64,
        parsed: ParsedName,
        enrichment: Option<Enrichment>,
    ) -> Self {
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = file_extension(&path).unwrap_or_default();
        let id = stable_id(&path.to_string_lossy());

        let ParsedName {
            mut artist,
            mut song,
            track_number,
        } = parsed;
        let enrichment = enrichment.unwrap_or_default();
        if artist.is_empty() {
            if let Some(value) = non_empty(enrichment.artist) {
                artist = value;
            }
        }
        if song.is_empty() {
            if let Some(value) = non_empty(enrichment.title) {
                song = value;
            }
        }

        Self {
            id,
            path,
            filename,
            extension,
            size_bytes,
            artist,
            song,
            track_number,
            duration_secs: enrichment.duration_secs,
            bitrate_kbps: enrichment.bitrate_kbps,
        }
    }

    pub fn display_name(&self) -> String {
        if self.artist.is_empty() {
            self.song.clone()
        } else {
            format!("{} - {}", self.artist, self.song)
        }
    }

    pub fn length_label(&self) -> String {
        match self.duration_secs {
            Some(secs) => format!("{}:{:02}", secs / 60, secs % 60),
            None => "Unknown".to_string(),
        }
    }

    pub fn quality_label(&self) -> String {
        match self.bitrate_kbps {
            Some(kbps) => format!("{} kbps", kbps),
            None => "Unknown".to_string(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn stable_id(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn normalize_extension(value: &str) -> Option<String> {
    let ext = value.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}
