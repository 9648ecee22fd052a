/// Reports a completion exactly once.
///
/// Once [`poll`](Self::poll) has returned `true`, every later call returns
/// `false` without evaluating the condition again, so callers run the
/// follow-up transition a single time.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompletionLatch {
    fired: bool,
}

impl CompletionLatch {
    #[must_use]
    pub const fn new() -> Self {
        Self { fired: false }
    }

    pub fn poll(&mut self, condition: impl FnOnce() -> bool) -> bool {
        if self.fired {
            return false;
        }
        self.fired = condition();
        self.fired
    }

    #[inline]
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_while_condition_holds() {
        let mut latch = CompletionLatch::new();
        assert!(!latch.poll(|| false));
        assert!(latch.poll(|| true));
        for _ in 0..8 {
            assert!(!latch.poll(|| true));
        }
        assert!(latch.has_fired());
    }

    #[test]
    fn condition_is_not_evaluated_after_firing() {
        let mut latch = CompletionLatch::new();
        assert!(latch.poll(|| true));
        assert!(!latch.poll(|| panic!("evaluated after firing")));
    }
}
