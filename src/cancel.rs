use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::Error;

/// Cooperative cancellation for long builds and extractions.
///
/// Clones share the same flag, so one can be handed to another thread and
/// tripped from there. Work is checked between files, never mid-file. Output
/// of a cancelled operation is incomplete and should be discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
