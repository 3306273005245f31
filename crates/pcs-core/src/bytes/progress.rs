/// Observer notified as an upload or download makes progress.
///
/// `progress` is called once with `0` when the transfer starts, and may
/// restart from `0` if a failed transfer is retried from the beginning.
pub trait ProgressListener: Send + Sync {
    /// Called when the total size is known, usually at the start (but may
    /// arrive later for a chunked-encoded download). `None` means unknown.
    fn set_progress_total(&self, _total: Option<u64>) {}

    /// Called as bytes are transferred, with the cumulative count so far.
    fn progress(&self, _current: u64) {}

    /// Called if the operation is aborted (it may still be retried).
    fn aborted(&self) {}
}

/// A listener that discards every notification. The default when a caller
/// doesn't need progress feedback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressListener;

impl ProgressListener for NullProgressListener {}

/// A listener that prints a `current / total` line to stdout on each update.
#[derive(Debug, Default)]
pub struct StdoutProgressListener {
    total: std::sync::Mutex<Option<u64>>,
}

impl StdoutProgressListener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressListener for StdoutProgressListener {
    fn set_progress_total(&self, total: Option<u64>) {
        *self.total.lock().unwrap() = total;
    }

    fn progress(&self, current: u64) {
        let total = *self.total.lock().unwrap();
        match total {
            Some(t) => println!("progress: {current} / {t}"),
            None => println!("progress: {current} / ???"),
        }
        if total == Some(current) {
            println!("***** end of progress *****");
        }
    }

    fn aborted(&self) {
        println!("process has been aborted");
    }
}
