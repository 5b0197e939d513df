use std::time::Duration;

/// Which silence a deadline measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Char,
    Word,
}

/// Identifies one arming of the scheduler. Only the most recent token is
/// ever honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeadlineToken(u64);

/// The live deadline: fire `boundary` once `after` has elapsed since arming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedDeadline {
    pub token: DeadlineToken,
    pub boundary: Boundary,
    pub after: Duration,
}

/// Single-slot cancellable deadline.
///
/// This only tracks which deadline is current; the clock lives with whoever
/// drives the decoder. Arming hands out a fresh token and firing is accepted
/// only for that token, so a superseded or cancelled deadline can never take
/// effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryScheduler {
    generation: u64,
    armed: Option<ArmedDeadline>,
}

impl BoundaryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any existing deadline with a new one
    pub fn arm(&mut self, after: Duration, boundary: Boundary) -> ArmedDeadline {
        self.generation += 1;
        let deadline = ArmedDeadline {
            token: DeadlineToken(self.generation),
            boundary,
            after,
        };
        self.armed = Some(deadline);
        deadline
    }

    /// Discard the current deadline without firing. Returns whether one was armed.
    pub fn cancel(&mut self) -> bool {
        self.armed.take().is_some()
    }

    /// Consume a firing. Yields the boundary only if `token` is the live one.
    pub fn fire(&mut self, token: DeadlineToken) -> Option<Boundary> {
        match self.armed {
            Some(deadline) if deadline.token == token => {
                self.armed = None;
                Some(deadline.boundary)
            }
            _ => None,
        }
    }

    pub fn armed(&self) -> Option<ArmedDeadline> {
        self.armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_deadline_fires() {
        let mut scheduler = BoundaryScheduler::new();
        let first = scheduler.arm(Duration::from_millis(10), Boundary::Char);
        let second = scheduler.arm(Duration::from_millis(20), Boundary::Word);
        assert_ne!(first.token, second.token);

        assert_eq!(scheduler.fire(first.token), None);
        assert_eq!(scheduler.fire(second.token), Some(Boundary::Word));
        // a deadline fires at most once
        assert_eq!(scheduler.fire(second.token), None);
    }

    #[test]
    fn test_cancelled_deadline_never_fires() {
        let mut scheduler = BoundaryScheduler::new();
        let deadline = scheduler.arm(Duration::from_millis(10), Boundary::Char);
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());
        assert_eq!(scheduler.fire(deadline.token), None);
        assert_eq!(scheduler.armed(), None);
    }
}
