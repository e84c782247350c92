// src/pipeline/token.rs
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of one pipeline run. It goes stale as soon as the owning
/// controller is reset, and stale runs must not touch controller state.
#[derive(Debug, Clone)]
pub struct RunToken {
    epoch: u64,
    current: Arc<AtomicU64>,
}

impl RunToken {
    pub(crate) fn new(epoch: u64, current: Arc<AtomicU64>) -> Self {
        Self { epoch, current }
    }

    /// A token with no controller behind it; it never goes stale.
    pub fn detached() -> Self {
        Self::new(0, Arc::new(AtomicU64::new(0)))
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_stale(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_goes_stale_when_epoch_moves() {
        let current = Arc::new(AtomicU64::new(3));
        let token = RunToken::new(3, Arc::clone(&current));
        assert!(!token.is_stale());

        current.fetch_add(1, Ordering::SeqCst);
        assert!(token.is_stale());
        assert!(token.clone().is_stale());
    }

    #[test]
    fn test_detached_token_is_never_stale() {
        assert!(!RunToken::detached().is_stale());
    }
}
