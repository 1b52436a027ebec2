use std::collections::HashMap;

use common::TrackRecord;

pub const WORD_MATCH_THRESHOLD: f64 = 0.5;

#[derive(Clone, Debug)]
pub struct PreparedQuery {
    text: String,
    tokens: Vec<String>,
}

impl PreparedQuery {
    pub fn new(query: &str) -> Self {
        let text = query.to_lowercase();
        let mut tokens = tokenize(&text);
        tokens.sort();
        tokens.dedup();
        Self { text, tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Haystack {
    text: String,
    artist_song: String,
    song_artist: String,
}

impl Haystack {
    pub fn new(record: &TrackRecord) -> Self {
        let filename = record.filename.to_lowercase();
        let artist = record.artist.to_lowercase();
        let song = record.song.to_lowercase();
        Self {
            text: format!("{} {} {}", filename, artist, song),
            artist_song: format!("{} - {}", artist, song),
            song_artist: format!("{} - {}", song, artist),
        }
    }
}

pub fn score(query: &str, record: &TrackRecord, threshold: f64) -> f64 {
    score_prepared(&PreparedQuery::new(query), &Haystack::new(record), threshold)
}

pub fn score_prepared(query: &PreparedQuery, haystack: &Haystack, threshold: f64) -> f64 {
    if !passes_gate(query, haystack) {
        return 0.0;
    }
    if threshold <= WORD_MATCH_THRESHOLD {
        return 1.0;
    }

    [
        &haystack.text,
        &haystack.artist_song,
        &haystack.song_artist,
    ]
    .iter()
    .map(|candidate| sequence_ratio(&query.text, candidate))
    .fold(0.0, f64::max)
}

fn passes_gate(query: &PreparedQuery, haystack: &Haystack) -> bool {
    // Substring containment on the raw haystack, so "beat" is found in "beatles".
    !query.is_empty()
        && query
            .tokens
            .iter()
            .all(|token| haystack.text.contains(token.as_str()))
}

fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// `2 * M / T`, where `M` is the number of characters in the matching blocks
/// found by recursively taking the longest common substring, and `T` is the
/// combined length. Two empty strings are identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut positions: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, ch) in b.iter().enumerate() {
        positions.entry(*ch).or_default().push(j);
    }

    let mut matched = 0usize;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, &positions, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

fn longest_match(
    a: &[char],
    positions: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0usize);
    let mut run_ending_at: HashMap<usize, usize> = HashMap::new();

    for (i, ch) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_runs = HashMap::new();
        if let Some(js) = positions.get(ch) {
            for &j in js {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let previous = j
                    .checked_sub(1)
                    .and_then(|p| run_ending_at.get(&p))
                    .copied()
                    .unwrap_or(0);
                let size = previous + 1;
                next_runs.insert(j, size);
                if size > best_size {
                    best_i = i + 1 - size;
                    best_j = j + 1 - size;
                    best_size = size;
                }
            }
        }
        run_ending_at = next_runs;
    }

    (best_i, best_j, best_size)
}
