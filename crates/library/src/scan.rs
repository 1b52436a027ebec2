use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{file_extension, TrackRecord};
use metadata::MetadataReader;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::progress::{ScanObserver, ScanProgress};
use crate::record::build_record;
use crate::LibraryError;

#[derive(Clone, Debug, Default)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ScanPlan {
    pub roots: Vec<PathBuf>,
    pub extensions: BTreeSet<String>,
    pub follow_links: bool,
}

impl ScanPlan {
    fn accepts(&self, path: &Path) -> bool {
        file_extension(path)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }
}

pub(crate) enum ScanOutcome {
    Completed {
        total: usize,
        records: Vec<TrackRecord>,
    },
    Cancelled {
        processed: usize,
        total: usize,
        records: Vec<TrackRecord>,
    },
    Failed(LibraryError),
}

pub(crate) fn run_scan(
    plan: &ScanPlan,
    reader: &dyn MetadataReader,
    cancel: &CancelToken,
    observer: &dyn ScanObserver,
) -> ScanOutcome {
    let mut counted = HashSet::new();
    let counting = visit_files(plan, |path| {
        counted.insert(path.to_path_buf());
        !cancel.is_cancelled()
    });
    let mut total = match counting {
        Ok(true) => counted.len(),
        Ok(false) => {
            return ScanOutcome::Cancelled {
                processed: 0,
                total: counted.len(),
                records: Vec::new(),
            }
        }
        Err(err) => return ScanOutcome::Failed(err),
    };
    drop(counted);
    debug!("Counted {} audio files", total);
    observer.on_progress(&ScanProgress::started(total));

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut processed = 0usize;
    let walking = visit_files(plan, |path| {
        if cancel.is_cancelled() {
            return false;
        }
        if !seen.insert(path.to_path_buf()) {
            return true;
        }

        match build_record(path, reader) {
            Ok(record) => records.push(record),
            Err(err) => warn!("Skipping {:?}: {}", path, err),
        }

        processed += 1;
        // Files created since the counting pass must not push progress past 100%.
        total = total.max(processed);
        observer.on_progress(&ScanProgress::running(processed, total));
        true
    });

    match walking {
        Ok(true) => ScanOutcome::Completed { total, records },
        Ok(false) => ScanOutcome::Cancelled {
            processed,
            total,
            records,
        },
        Err(err) => ScanOutcome::Failed(err),
    }
}

/// Visit every qualifying file under the plan's roots in file-name order.
///
/// Returns `Ok(false)` when the visitor asked to stop. An unreadable root
/// fails the walk; unreadable entries below a root are skipped.
fn visit_files<F>(plan: &ScanPlan, mut visit: F) -> Result<bool, LibraryError>
where
    F: FnMut(&Path) -> bool,
{
    for root in &plan.roots {
        let walker = WalkDir::new(root)
            .follow_links(plan.follow_links)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => return Err(LibraryError::Walk(err)),
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if !is_file_entry(&entry) || !plan.accepts(entry.path()) {
                continue;
            }
            if !visit(entry.path()) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

// Without link following walkdir reports a linked file as a symlink.
fn is_file_entry(entry: &DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}
