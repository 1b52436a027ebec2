#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedName {
    pub artist: String,
    pub song: String,
    pub track_number: Option<u32>,
}

const SEPARATORS: [&str; 3] = ["-", "_-_", "_"];

/// Infer `(artist, song, track number)` from a filename such as
/// `"01 - Artist - Song.mp3"`.
pub fn parse_filename(filename: &str) -> ParsedName {
    let stem = strip_extension(filename);
    let (track_number, rest) = split_track_number(stem);

    for separator in SEPARATORS {
        if let Some((artist, song)) = split_first(rest, separator) {
            return ParsedName {
                artist: artist.to_string(),
                song: song.to_string(),
                track_number,
            };
        }
    }

    ParsedName {
        artist: String::new(),
        song: rest.trim().to_string(),
        track_number,
    }
}

fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) => &filename[..idx],
        None => filename,
    }
}

fn split_track_number(stem: &str) -> (Option<u32>, &str) {
    let digits_end = stem
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(stem.len());
    if digits_end == 0 {
        return (None, stem);
    }
    // Numbers too large for u32 are still stripped, they just aren't kept.
    let number = stem[..digits_end].parse::<u32>().ok();
    let rest = stem[digits_end..].trim_start_matches(is_track_padding);
    (number, rest)
}

fn is_track_padding(c: char) -> bool {
    c.is_whitespace() || c == '_' || c == '-'
}

fn is_part_padding(c: char) -> bool {
    c.is_whitespace() || c == '_'
}

fn split_first<'a>(input: &'a str, separator: &str) -> Option<(&'a str, &'a str)> {
    let (left, right) = input.split_once(separator)?;
    let left = left.trim_matches(is_part_padding);
    let right = right.trim_matches(is_part_padding);
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, right))
}
