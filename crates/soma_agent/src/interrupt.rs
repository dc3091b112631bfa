//! Cooperative interruption token.
//!
//! A new user turn sets the token; a stream that is about to forward a
//! fragment checks it first and stops promptly. The interrupting turn
//! clears the token once its own stream starts. No in-flight external call
//! is ever hard-cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    flag: Arc<AtomicBool>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_clear() {
        assert!(!InterruptToken::new().is_interrupted());
    }

    #[test]
    fn test_set_and_clear() {
        let token = InterruptToken::new();
        token.interrupt();
        assert!(token.is_interrupted());
        token.clear();
        assert!(!token.is_interrupted());
    }

    #[test]
    fn test_clones_share_state() {
        let token = InterruptToken::new();
        let other = token.clone();
        token.interrupt();
        assert!(other.is_interrupted());
        other.clear();
        assert!(!token.is_interrupted());
    }
}
