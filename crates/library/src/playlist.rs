use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::TrackRecord;

use crate::LibraryError;

#[derive(Clone, Debug)]
pub struct TrackMatch {
    pub record: Arc<TrackRecord>,
    pub score: f64,
}

#[derive(Clone, Debug)]
pub struct PlaylistMatch {
    pub entry: String,
    pub matches: Vec<TrackMatch>,
}

impl PlaylistMatch {
    pub fn best(&self) -> Option<&TrackMatch> {
        self.matches.first()
    }
}

pub fn matched_entries(results: &[PlaylistMatch]) -> usize {
    results.iter().filter(|m| !m.matches.is_empty()).count()
}

pub fn playlist_entries(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn load_playlist(path: &Path) -> Result<Vec<String>, LibraryError> {
    let contents = fs::read_to_string(path)?;
    Ok(playlist_entries(&contents))
}
