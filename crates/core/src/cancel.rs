//! Cooperative cancellation.
//!
//! A [`CancelToken`] is polled at notification boundaries and at every block
//! emission of the three-way merger. Cancelling surfaces
//! [`MergeError::Cancelled`], which callers can tell apart from ordinary
//! failures via [`crate::errors::CoreError::is_cancelled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::errors::MergeError;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Running operations stop at their next poll.
    pub fn cancel(&self) {
        debug!("cancellation requested");
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Poll the flag, failing with [`MergeError::Cancelled`] once set.
    pub fn check(&self) -> Result<(), MergeError> {
        if self.is_cancelled() {
            return Err(MergeError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(MergeError::Cancelled)));
    }
}
