use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Caller-owned cooperative cancellation signal.
///
/// Clones share one flag. Long-running work checks it between steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
