use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether a response has been produced for the current request
/// (`has_been_set`, which the engine uses to decide whether to still
/// forward to origin) and whether any plugin has touched it after it was
/// set (`has_been_modified`, advisory only — see Open Question 1 in
/// `DESIGN.md`).
#[derive(Default)]
pub struct ResponseState {
    has_been_set: AtomicBool,
    has_been_modified: AtomicBool,
}

impl ResponseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_set(&self) {
        self.has_been_set.store(true, Ordering::SeqCst);
    }

    pub fn mark_modified(&self) {
        self.has_been_modified.store(true, Ordering::SeqCst);
    }

    pub fn has_been_set(&self) -> bool {
        self.has_been_set.load(Ordering::SeqCst)
    }

    pub fn has_been_modified(&self) -> bool {
        self.has_been_modified.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset_and_unmodified() {
        let s = ResponseState::new();
        assert!(!s.has_been_set());
        assert!(!s.has_been_modified());
    }

    #[test]
    fn flags_are_monotonic() {
        let s = ResponseState::new();
        s.mark_set();
        s.mark_modified();
        assert!(s.has_been_set());
        assert!(s.has_been_modified());
    }
}
