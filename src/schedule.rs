use std::time::{Duration, Instant};

/// Coalesces rapid selection-change events into a single trailing build.
/// There is exactly one deadline; a new event restarts it rather than
/// stacking a second one, so an arbitrarily fast stream of toggles collapses
/// into one build ~200ms after the last event.
#[derive(Debug)]
pub struct BuildScheduler {
    window: Duration,
    deadline: Option<Instant>,
}

pub const COALESCE_WINDOW: Duration = Duration::from_millis(200);

impl BuildScheduler {
    pub fn new(window: Duration) -> Self {
        BuildScheduler {
            window,
            deadline: None,
        }
    }

    pub fn notify(&mut self) {
        self.notify_at(Instant::now());
    }

    /// Consumes the deadline when it has passed; at most one `true` per
    /// scheduled build.
    pub fn due(&mut self) -> bool {
        self.due_at(Instant::now())
    }

    pub fn pending(&self) -> bool {
        self.deadline.is_some()
    }

    fn notify_at(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    fn due_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if d <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for BuildScheduler {
    fn default() -> Self {
        BuildScheduler::new(COALESCE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_window() {
        let mut s = BuildScheduler::new(Duration::from_millis(200));
        let t0 = Instant::now();
        s.notify_at(t0);
        assert!(!s.due_at(t0 + Duration::from_millis(100)));
        assert!(s.due_at(t0 + Duration::from_millis(200)));
        // Consumed: no second build.
        assert!(!s.due_at(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn new_event_restarts_the_timer() {
        let mut s = BuildScheduler::new(Duration::from_millis(200));
        let t0 = Instant::now();
        s.notify_at(t0);
        s.notify_at(t0 + Duration::from_millis(150));
        assert!(!s.due_at(t0 + Duration::from_millis(250)));
        assert!(s.due_at(t0 + Duration::from_millis(350)));
    }

    #[test]
    fn idle_scheduler_never_fires() {
        let mut s = BuildScheduler::default();
        assert!(!s.pending());
        assert!(!s.due());
    }
}
