//! Delayed one-shot tasks with cancel-and-replace semantics.
//!
//! Each [`TimerKind`] owns a single slot: arming it again before it fires replaces the
//! pending deadline, so bursts of requests coalesce into one firing.

/// Purposes that can have a deferred task pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Debounced population top-up after removals.
    Respawn,
    /// Second platform scan after an empty first attempt.
    RescanRetry,
}

impl TimerKind {
    pub const ALL: [TimerKind; 2] = [TimerKind::Respawn, TimerKind::RescanRetry];

    const fn slot(self) -> usize {
        match self {
            TimerKind::Respawn => 0,
            TimerKind::RescanRetry => 1,
        }
    }
}

/// Single-slot-per-kind timer table. Deadlines are milliseconds on the world clock.
#[derive(Debug, Clone, Default)]
pub struct TimerWheel {
    slots: [Option<f64>; 2],
}

impl TimerWheel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire at `due`, replacing any pending deadline.
    pub fn arm(&mut self, kind: TimerKind, due: f64) {
        self.slots[kind.slot()] = Some(due);
    }

    /// Drop a pending deadline. Returns whether one was pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.slots[kind.slot()].take().is_some()
    }

    pub fn cancel_all(&mut self) {
        self.slots = [None; 2];
    }

    #[must_use]
    pub fn pending(&self, kind: TimerKind) -> Option<f64> {
        self.slots[kind.slot()]
    }

    /// Earliest pending deadline, if any.
    #[must_use]
    pub fn next_due(&self) -> Option<f64> {
        self.slots.iter().flatten().copied().reduce(f64::min)
    }

    /// Pop every timer whose deadline has passed, in deadline order.
    pub fn take_due(&mut self, now: f64) -> Vec<TimerKind> {
        let mut due: Vec<(f64, TimerKind)> = TimerKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let deadline = self.slots[kind.slot()]?;
                (deadline <= now).then_some((deadline, kind))
            })
            .collect();
        due.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (_, kind) in &due {
            self.slots[kind.slot()] = None;
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearming_replaces_pending_deadline() {
        let mut timers = TimerWheel::new();
        timers.arm(TimerKind::Respawn, 100.0);
        timers.arm(TimerKind::Respawn, 160.0);
        assert!(timers.take_due(120.0).is_empty());
        assert_eq!(timers.take_due(160.0), vec![TimerKind::Respawn]);
        assert!(timers.take_due(1_000.0).is_empty());
    }

    #[test]
    fn due_timers_fire_in_deadline_order() {
        let mut timers = TimerWheel::new();
        timers.arm(TimerKind::Respawn, 50.0);
        timers.arm(TimerKind::RescanRetry, 20.0);
        assert_eq!(timers.next_due(), Some(20.0));
        assert_eq!(
            timers.take_due(60.0),
            vec![TimerKind::RescanRetry, TimerKind::Respawn]
        );
        assert_eq!(timers.next_due(), None);
    }

    #[test]
    fn cancel_all_clears_every_slot() {
        let mut timers = TimerWheel::new();
        timers.arm(TimerKind::Respawn, 10.0);
        timers.arm(TimerKind::RescanRetry, 10.0);
        assert!(timers.cancel(TimerKind::Respawn));
        assert!(!timers.cancel(TimerKind::Respawn));
        timers.cancel_all();
        assert_eq!(timers.pending(TimerKind::RescanRetry), None);
        assert!(timers.take_due(f64::MAX).is_empty());
    }
}
