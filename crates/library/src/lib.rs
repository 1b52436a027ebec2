mod error;
mod playlist;
mod progress;
mod record;
mod scan;
pub mod similarity;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use common::{normalize_extension, TrackRecord, DEFAULT_EXTENSIONS};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub use error::LibraryError;
pub use metadata::{LoftyReader, MetadataBackend, MetadataReader, NoMetadata, TagInfo};
pub use playlist::{
    load_playlist, matched_entries, playlist_entries, PlaylistMatch, TrackMatch,
};
pub use progress::{ChannelObserver, NullObserver, ScanObserver, ScanPhase, ScanProgress};
pub use record::build_record;

use scan::{run_scan, CancelToken, ScanOutcome, ScanPlan};
use similarity::{score_prepared, Haystack, PreparedQuery};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanSummary {
    pub files: usize,
    pub records: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScanStatus {
    Idle,
    Scanning { started: SystemTime },
    Completed(ScanSummary),
    Cancelled(ScanSummary),
    Failed(String),
}

impl ScanStatus {
    pub fn is_scanning(&self) -> bool {
        matches!(self, ScanStatus::Scanning { .. })
    }
}

struct IndexedRecord {
    record: Arc<TrackRecord>,
    haystack: Haystack,
}

impl IndexedRecord {
    fn new(record: TrackRecord) -> Self {
        let haystack = Haystack::new(&record);
        Self {
            record: Arc::new(record),
            haystack,
        }
    }
}

struct ScanConfig {
    directories: Vec<PathBuf>,
    extensions: BTreeSet<String>,
    follow_links: bool,
}

impl ScanConfig {
    fn plan(&self) -> ScanPlan {
        ScanPlan {
            roots: self.directories.clone(),
            extensions: self.extensions.clone(),
            follow_links: self.follow_links,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            follow_links: false,
        }
    }
}

struct Shared {
    config: RwLock<ScanConfig>,
    records: RwLock<Arc<Vec<IndexedRecord>>>,
    status: RwLock<ScanStatus>,
    scanning: AtomicBool,
    cancel: Mutex<Option<CancelToken>>,
    reader: Arc<dyn MetadataReader>,
}

impl Shared {
    fn snapshot(&self) -> Arc<Vec<IndexedRecord>> {
        Arc::clone(&self.records.read())
    }

    fn publish(&self, records: Vec<TrackRecord>) {
        let indexed: Vec<IndexedRecord> = records.into_iter().map(IndexedRecord::new).collect();
        *self.records.write() = Arc::new(indexed);
    }

    fn run(&self, plan: ScanPlan, token: CancelToken, observer: &dyn ScanObserver) {
        info!("Library scan started over {} directories", plan.roots.len());

        let report = match run_scan(&plan, self.reader.as_ref(), &token, observer) {
            ScanOutcome::Completed { total, records } => {
                let summary = ScanSummary {
                    files: total,
                    records: records.len(),
                };
                self.publish(records);
                *self.status.write() = ScanStatus::Completed(summary);
                info!(
                    "Library scan complete: {} files, {} records",
                    summary.files, summary.records
                );
                ScanProgress::completed(summary.files, summary.records)
            }
            ScanOutcome::Cancelled {
                processed,
                total,
                records,
            } => {
                let summary = ScanSummary {
                    files: processed,
                    records: records.len(),
                };
                // Files processed before the stop are kept.
                self.publish(records);
                *self.status.write() = ScanStatus::Cancelled(summary);
                info!("Library scan cancelled after {} of {} files", processed, total);
                ScanProgress::cancelled(processed, total)
            }
            ScanOutcome::Failed(err) => {
                let reason = err.to_string();
                // A failed scan never leaves stale records behind.
                self.publish(Vec::new());
                *self.status.write() = ScanStatus::Failed(reason.clone());
                warn!("Library scan failed: {}", reason);
                ScanProgress::failed(&reason)
            }
        };

        *self.cancel.lock() = None;
        self.scanning.store(false, Ordering::Release);
        observer.on_progress(&report);
    }
}

pub struct LibraryIndex {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LibraryIndex {
    pub fn new(reader: Arc<dyn MetadataReader>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: RwLock::new(ScanConfig::default()),
                records: RwLock::new(Arc::new(Vec::new())),
                status: RwLock::new(ScanStatus::Idle),
                scanning: AtomicBool::new(false),
                cancel: Mutex::new(None),
                reader,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn with_backend(backend: MetadataBackend) -> Self {
        Self::new(backend.reader())
    }

    pub fn add_directory(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let canonical = match fs::canonicalize(path) {
            Ok(canonical) if canonical.is_dir() => canonical,
            _ => {
                debug!("Rejected directory {:?}", path);
                return false;
            }
        };
        let mut config = self.shared.config.write();
        if config.directories.contains(&canonical) {
            return false;
        }
        config.directories.push(canonical);
        true
    }

    pub fn remove_directory(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut config = self.shared.config.write();
        let before = config.directories.len();
        config
            .directories
            .retain(|dir| dir != &canonical && dir != path);
        config.directories.len() != before
    }

    pub fn directories(&self) -> Vec<PathBuf> {
        self.shared.config.read().directories.clone()
    }

    pub fn set_extensions<I, S>(&self, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .filter_map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        self.shared.config.write().extensions = extensions;
    }

    pub fn extensions(&self) -> Vec<String> {
        self.shared.config.read().extensions.iter().cloned().collect()
    }

    pub fn set_follow_links(&self, follow_links: bool) {
        self.shared.config.write().follow_links = follow_links;
    }

    pub fn start_scan<O>(&self, observer: O) -> bool
    where
        O: ScanObserver + 'static,
    {
        // Held until the handle is stored so `wait` always joins the newest scan.
        let mut worker = self.worker.lock();
        if self
            .shared
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Scan already running");
            return false;
        }

        let plan = self.shared.config.read().plan();
        let token = CancelToken::new();
        *self.shared.cancel.lock() = Some(token.clone());
        *self.shared.status.write() = ScanStatus::Scanning {
            started: SystemTime::now(),
        };

        let observer: Arc<dyn ScanObserver> = Arc::new(observer);
        let shared = Arc::clone(&self.shared);
        let worker_observer = Arc::clone(&observer);
        let spawned = thread::Builder::new()
            .name("library-scan".to_string())
            .spawn(move || shared.run(plan, token, worker_observer.as_ref()));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                true
            }
            Err(err) => {
                let reason = format!("could not start scan thread: {}", err);
                warn!("{}", reason);
                *self.shared.cancel.lock() = None;
                *self.shared.status.write() = ScanStatus::Failed(reason.clone());
                self.shared.scanning.store(false, Ordering::Release);
                observer.on_progress(&ScanProgress::failed(&reason));
                false
            }
        }
    }

    pub fn cancel_scan(&self) -> bool {
        match self.shared.cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn wait(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Library scan thread panicked");
            }
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.shared.scanning.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ScanStatus {
        self.shared.status.read().clone()
    }

    pub fn records(&self) -> Vec<Arc<TrackRecord>> {
        self.shared
            .snapshot()
            .iter()
            .map(|indexed| Arc::clone(&indexed.record))
            .collect()
    }

    pub fn search(&self, query: &str, threshold: f64) -> Vec<TrackMatch> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let snapshot = self.shared.snapshot();
        rank(&snapshot, &PreparedQuery::new(query), threshold)
    }

    /// Run `search` for every playlist line. The result has one entry per
    /// input line, in input order, even when a line matched nothing.
    pub fn match_playlist<S: AsRef<str>>(&self, entries: &[S], threshold: f64) -> Vec<PlaylistMatch> {
        let snapshot = self.shared.snapshot();
        let results: Vec<PlaylistMatch> = entries
            .iter()
            .map(|entry| {
                let entry = entry.as_ref();
                let matches = if entry.trim().is_empty() {
                    Vec::new()
                } else {
                    rank(&snapshot, &PreparedQuery::new(entry), threshold)
                };
                PlaylistMatch {
                    entry: entry.to_string(),
                    matches,
                }
            })
            .collect();

        info!(
            "Found matches for {} of {} playlist entries",
            matched_entries(&results),
            results.len()
        );
        results
    }
}

impl Drop for LibraryIndex {
    fn drop(&mut self) {
        self.cancel_scan();
    }
}

fn rank(records: &[IndexedRecord], query: &PreparedQuery, threshold: f64) -> Vec<TrackMatch> {
    let mut matches: Vec<TrackMatch> = records
        .iter()
        .filter_map(|indexed| {
            let score = score_prepared(query, &indexed.haystack, threshold);
            // Gate rejections score 0.0 and never match, even at threshold 0.
            if score > 0.0 && score >= threshold {
                Some(TrackMatch {
                    record: Arc::clone(&indexed.record),
                    score,
                })
            } else {
                None
            }
        })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::mpsc::{channel, Receiver};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct SlowReader(Duration);

    impl MetadataReader for SlowReader {
        fn read(&self, _path: &Path) -> Option<TagInfo> {
            thread::sleep(self.0);
            None
        }
    }

    struct GatedReader(Arc<AtomicBool>);

    impl MetadataReader for GatedReader {
        fn read(&self, _path: &Path) -> Option<TagInfo> {
            while !self.0.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
            None
        }
    }

    fn library_dir(files: &[&str]) -> TempDir {
        let dir = tempdir().unwrap();
        for name in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, name.as_bytes()).unwrap();
        }
        dir
    }

    fn index_for(dir: &TempDir) -> LibraryIndex {
        let index = LibraryIndex::new(Arc::new(NoMetadata));
        assert!(index.add_directory(dir.path()));
        index
    }

    fn scan(index: &LibraryIndex) -> Vec<ScanProgress> {
        let (tx, rx) = channel();
        assert!(index.start_scan(ChannelObserver::new(tx)));
        index.wait();
        rx.try_iter().collect()
    }

    fn drain(rx: &Receiver<ScanProgress>) -> Vec<ScanProgress> {
        rx.try_iter().collect()
    }

    #[test]
    fn directories_are_validated_and_deduplicated() {
        let dir = library_dir(&["song.mp3"]);
        let index = LibraryIndex::new(Arc::new(NoMetadata));

        assert!(index.add_directory(dir.path()));
        assert!(!index.add_directory(dir.path()));
        assert!(!index.add_directory(dir.path().join("missing")));
        assert!(!index.add_directory(dir.path().join("song.mp3")));
        assert_eq!(index.directories().len(), 1);

        assert!(index.remove_directory(dir.path()));
        assert!(!index.remove_directory(dir.path()));
        assert!(index.directories().is_empty());
    }

    #[test]
    fn extensions_are_normalized() {
        let index = LibraryIndex::new(Arc::new(NoMetadata));
        assert_eq!(
            index.extensions(),
            vec!["aac", "flac", "m4a", "mp3", "ogg", "wav"]
        );
        index.set_extensions([".MP3", "Flac", "  ", "mp3"]);
        assert_eq!(index.extensions(), vec!["flac", "mp3"]);
    }

    #[test]
    fn scan_builds_records_and_reports_completion() {
        let dir = library_dir(&[
            "01 - Daft Punk - One More Time.mp3",
            "Albums/The Beatles - Help.FLAC",
            "notes.txt",
        ]);
        let index = index_for(&dir);
        let reports = scan(&index);

        let last = reports.last().unwrap();
        assert_eq!(last.phase, ScanPhase::Completed);
        assert_eq!((last.processed, last.total), (2, 2));
        assert_eq!(last.message, "Scan complete. Found 2 music files.");
        assert_eq!(reports[0].phase, ScanPhase::Started);
        assert_eq!(
            index.status(),
            ScanStatus::Completed(ScanSummary { files: 2, records: 2 })
        );
        assert!(!index.is_scanning());

        let records = index.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.path.is_absolute()));
        let daft = records.iter().find(|r| r.artist == "Daft Punk").unwrap();
        assert_eq!(daft.song, "One More Time");
        assert_eq!(daft.track_number, Some(1));
    }

    #[test]
    fn extension_changes_apply_on_next_scan() {
        let dir = library_dir(&["a - b.mp3", "c - d.ogg"]);
        let index = index_for(&dir);
        scan(&index);
        assert_eq!(index.records().len(), 2);

        index.set_extensions(["ogg"]);
        assert_eq!(index.records().len(), 2);
        scan(&index);
        let records = index.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].extension, "ogg");
    }

    #[test]
    fn search_filters_and_orders_by_score() {
        let dir = library_dir(&[
            "Daft Punk - One More Time.mp3",
            "Daft Punk - One More Time (Extended Club Mix).mp3",
            "Daft Punk - Around The World.mp3",
        ]);
        let index = index_for(&dir);
        scan(&index);

        assert!(index.search("   ", 0.6).is_empty());
        assert!(index.search("daft punk veridis", 0.3).is_empty());

        let results = index.search("daft punk one more time", 0.6);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.song, "One More Time");
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|m| m.score >= 0.6 && m.score <= 1.0));
    }

    #[test]
    fn equal_scores_keep_encounter_order() {
        let dir = library_dir(&[
            "a/Artist - First.mp3",
            "b/Artist - Second.mp3",
            "c/Artist - Third.mp3",
        ]);
        let index = index_for(&dir);
        scan(&index);

        let results = index.search("artist", 0.5);
        assert!(results.iter().all(|m| m.score == 1.0));
        let found: Vec<&str> = results.iter().map(|m| m.record.song.as_str()).collect();
        let encountered: Vec<String> = index.records().iter().map(|r| r.song.clone()).collect();
        assert_eq!(found, encountered);
    }

    #[test]
    fn playlist_output_matches_input_shape() {
        let dir = library_dir(&["Daft Punk - One More Time.mp3", "The Beatles - Help.mp3"]);
        let index = index_for(&dir);
        scan(&index);

        let entries = vec![
            "Help - The Beatles",
            "Nonexistent - Nobody",
            "",
            "One More Time - Daft Punk",
        ];
        let results = index.match_playlist(&entries, 0.5);
        assert_eq!(results.len(), entries.len());
        for (result, entry) in results.iter().zip(&entries) {
            assert_eq!(result.entry, *entry);
        }
        assert_eq!(results[0].best().unwrap().record.song, "Help");
        assert!(results[1].matches.is_empty());
        assert!(results[2].matches.is_empty());
        assert_eq!(results[3].best().unwrap().record.artist, "Daft Punk");
        assert_eq!(matched_entries(&results), 2);
    }

    #[test]
    fn busy_scan_is_rejected_without_side_effects() {
        let dir = library_dir(&["a - one.mp3", "b - two.mp3", "c - three.mp3"]);
        let gate = Arc::new(AtomicBool::new(false));
        let index = LibraryIndex::new(Arc::new(GatedReader(Arc::clone(&gate))));
        assert!(index.add_directory(dir.path()));

        let (tx, rx) = channel();
        assert!(index.start_scan(ChannelObserver::new(tx)));
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.phase, ScanPhase::Started);

        let (other_tx, other_rx) = channel();
        assert!(!index.start_scan(ChannelObserver::new(other_tx)));
        assert!(index.is_scanning());
        assert!(index.status().is_scanning());
        assert!(index.records().is_empty());

        gate.store(true, Ordering::Release);
        index.wait();

        let rest = drain(&rx);
        assert!(rest.iter().all(|p| p.phase != ScanPhase::Started));
        assert_eq!(rest.last().unwrap().phase, ScanPhase::Completed);
        assert_eq!(index.records().len(), 3);
        assert!(drain(&other_rx).is_empty());
    }

    #[test]
    fn cancelled_scan_keeps_only_processed_files() {
        let names: Vec<String> = (0..120).map(|i| format!("{:03} - Artist - Song {}.mp3", i, i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = library_dir(&refs);
        let index = LibraryIndex::new(Arc::new(SlowReader(Duration::from_millis(5))));
        assert!(index.add_directory(dir.path()));

        let (tx, rx) = channel();
        assert!(index.start_scan(ChannelObserver::new(tx)));
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.total, 120);
        assert!(index.cancel_scan());
        index.wait();

        let last = drain(&rx).pop().unwrap();
        assert_eq!(last.phase, ScanPhase::Cancelled);
        assert_eq!(last.message, "Scan cancelled.");
        assert!(last.processed < last.total);
        assert_eq!(index.records().len(), last.processed);
        assert_eq!(
            index.status(),
            ScanStatus::Cancelled(ScanSummary {
                files: last.processed,
                records: last.processed,
            })
        );
        assert!(!index.cancel_scan());

        // A later scan is not affected by the earlier cancellation.
        index.set_extensions(["flac"]);
        let reports = scan(&index);
        assert_eq!(reports.last().unwrap().phase, ScanPhase::Completed);
    }

    #[test]
    fn failed_scan_reports_zero_counts_and_drops_records() {
        let dir = library_dir(&["a - one.mp3"]);
        let root = dir.path().join("music");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("Artist - Song.mp3"), b"x").unwrap();

        let index = LibraryIndex::new(Arc::new(NoMetadata));
        assert!(index.add_directory(&root));
        scan(&index);
        assert_eq!(index.records().len(), 1);

        fs::remove_dir_all(&root).unwrap();
        let reports = scan(&index);
        let last = reports.last().unwrap();
        assert_eq!(last.phase, ScanPhase::Failed);
        assert_eq!((last.processed, last.total), (0, 0));
        assert!(last.message.starts_with("Error during scan:"));
        assert!(matches!(index.status(), ScanStatus::Failed(_)));
        assert!(index.records().is_empty());
    }

    #[test]
    fn rescanning_unchanged_tree_is_idempotent() {
        let dir = library_dir(&["x/01 - A - B.mp3", "y/C_-_D.flac", "Plain.wav"]);
        let index = index_for(&dir);

        let key = |index: &LibraryIndex| -> HashMap<PathBuf, (String, String, Option<u32>, u64)> {
            index
                .records()
                .iter()
                .map(|r| {
                    (
                        r.path.clone(),
                        (r.artist.clone(), r.song.clone(), r.track_number, r.size_bytes),
                    )
                })
                .collect()
        };

        scan(&index);
        let first = key(&index);
        scan(&index);
        let second = key(&index);
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn nothing_to_cancel_when_idle() {
        let index = LibraryIndex::with_backend(MetadataBackend::Disabled);
        assert!(!index.cancel_scan());
        assert_eq!(index.status(), ScanStatus::Idle);
        index.wait();
        assert!(index.match_playlist(&["anything"], 0.6)[0].matches.is_empty());
    }

    #[test]
    fn wait_joins_the_newest_scan_when_starts_race() {
        let dir = library_dir(&["Artist - Song.mp3"]);
        let index = index_for(&dir);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..25 {
                        index.start_scan(NullObserver);
                    }
                });
            }
        });
        index.wait();

        assert!(!index.is_scanning());
        assert_eq!(
            index.status(),
            ScanStatus::Completed(ScanSummary { files: 1, records: 1 })
        );
        assert_eq!(index.records().len(), 1);
    }
}
