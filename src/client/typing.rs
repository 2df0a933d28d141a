use std::time::Duration;

use tokio::time::Instant;

pub const TYPING_QUIET_PERIOD: Duration = Duration::from_millis(3000);

/// Turns keystrokes into `typing` / `stop typing` edges.
///
/// Holds a single deadline that every keystroke pushes back, so a burst
/// ends exactly one quiet period after its last keystroke.
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    quiet_period: Duration,
    deadline: Option<Instant>,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        TypingDebouncer::new(TYPING_QUIET_PERIOD)
    }
}

impl TypingDebouncer {
    pub fn new(quiet_period: Duration) -> Self {
        TypingDebouncer { quiet_period, deadline: None }
    }

    /// Returns `true` when this keystroke starts a burst.
    pub fn keystroke(&mut self, now: Instant) -> bool {
        let started = self.deadline.is_none();
        self.deadline = Some(now + self.quiet_period);
        started
    }

    /// Returns `true` once, when the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Ends the burst early, returning whether one was running.
    pub fn reset(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_typing(&self) -> bool {
        self.deadline.is_some()
    }
}
