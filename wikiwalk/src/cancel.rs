use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheap, cloneable flag the search engine polls between frontier
/// expansions and before each neighbor fetch (see spec §5). The HTTP
/// boundary flips it when the originating request is abandoned.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Flips the wrapped token when dropped, unless [`CancelGuard::disarm`] was
/// called first. Held by the HTTP handler for the lifetime of a request so
/// that an abandoned connection (whose future actix-web drops without
/// polling to completion) cancels the in-flight search.
pub struct CancelGuard {
    token: CancellationToken,
    armed: bool,
}

impl CancelGuard {
    pub fn new(token: CancellationToken) -> Self {
        CancelGuard { token, armed: true }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_cancels_on_drop_unless_disarmed() {
        let token = CancellationToken::new();
        {
            let _guard = CancelGuard::new(token.clone());
        }
        assert!(token.is_cancelled());

        let token2 = CancellationToken::new();
        {
            let mut guard = CancelGuard::new(token2.clone());
            guard.disarm();
        }
        assert!(!token2.is_cancelled());
    }
}
