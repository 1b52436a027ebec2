use std::sync::mpsc::Sender;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanPhase {
    Started,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ScanPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanPhase::Completed | ScanPhase::Cancelled | ScanPhase::Failed
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    pub message: String,
    pub phase: ScanPhase,
}

impl ScanProgress {
    pub(crate) fn started(total: usize) -> Self {
        Self {
            processed: 0,
            total,
            message: "Starting scan...".to_string(),
            phase: ScanPhase::Started,
        }
    }

    pub(crate) fn running(processed: usize, total: usize) -> Self {
        let mut progress = Self {
            processed,
            total,
            message: String::new(),
            phase: ScanPhase::Running,
        };
        progress.message = format!(
            "Scanned {} of {} files ({:.1}%)",
            processed,
            total,
            progress.percent()
        );
        progress
    }

    pub(crate) fn completed(total: usize, records: usize) -> Self {
        Self {
            processed: total,
            total,
            message: format!("Scan complete. Found {} music files.", records),
            phase: ScanPhase::Completed,
        }
    }

    pub(crate) fn cancelled(processed: usize, total: usize) -> Self {
        Self {
            processed,
            total,
            message: "Scan cancelled.".to_string(),
            phase: ScanPhase::Cancelled,
        }
    }

    pub(crate) fn failed(reason: &str) -> Self {
        Self {
            processed: 0,
            total: 0,
            message: format!("Error during scan: {}", reason),
            phase: ScanPhase::Failed,
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.processed as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

pub trait ScanObserver: Send + Sync {
    fn on_progress(&self, progress: &ScanProgress);
}

impl<F> ScanObserver for F
where
    F: Fn(&ScanProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &ScanProgress) {
        self(progress)
    }
}

pub struct ChannelObserver(Sender<ScanProgress>);

impl ChannelObserver {
    pub fn new(sender: Sender<ScanProgress>) -> Self {
        Self(sender)
    }
}

impl ScanObserver for ChannelObserver {
    fn on_progress(&self, progress: &ScanProgress) {
        let _ = self.0.send(progress.clone());
    }
}

pub struct NullObserver;

impl ScanObserver for NullObserver {
    fn on_progress(&self, _progress: &ScanProgress) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn running_message_includes_percentage() {
        let progress = ScanProgress::running(1, 4);
        assert_eq!(progress.message, "Scanned 1 of 4 files (25.0%)");
        assert_eq!(progress.percent(), 25.0);
    }

    #[test]
    fn empty_total_reports_zero_percent() {
        assert_eq!(ScanProgress::started(0).percent(), 0.0);
        assert_eq!(ScanProgress::failed("boom").percent(), 0.0);
    }

    #[test]
    fn terminal_phases() {
        assert!(!ScanPhase::Started.is_terminal());
        assert!(!ScanPhase::Running.is_terminal());
        assert!(ScanPhase::Completed.is_terminal());
        assert!(ScanPhase::Cancelled.is_terminal());
        assert!(ScanPhase::Failed.is_terminal());
    }

    #[test]
    fn channel_observer_survives_dropped_receiver() {
        let (tx, rx) = channel();
        let observer = ChannelObserver::new(tx);
        observer.on_progress(&ScanProgress::started(3));
        assert_eq!(rx.recv().unwrap().phase, ScanPhase::Started);
        drop(rx);
        observer.on_progress(&ScanProgress::completed(3, 3));
    }
}
