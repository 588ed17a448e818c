use crate::error::{TsdbError, TsdbResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation scope for a single request.
///
/// Cloning is cheap; every querier, series set, and iterator derived from one
/// request observes the same flag. Backend queriers are expected to poll it
/// from their blocking operations.
#[derive(Clone, Debug, Default)]
pub struct QueryContext {
    cancelled: Arc<AtomicBool>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> TsdbResult<()> {
        if self.is_cancelled() {
            Err(TsdbError::Cancelled)
        } else {
            Ok(())
        }
    }
}
