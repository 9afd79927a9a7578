//! Cancellable, clock-driven timed tasks tied to notes.
//!
//! The scheduler owns no output and no note state. The host drives it by
//! polling [`AutomationScheduler::next_due`] with the current time; the engine
//! applies each firing and removes completed handles from their owning note.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use ivory_types::AutomationKind;

/// Shortest interval a periodic automation may fire at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Furthest ahead any firing is scheduled.
const HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

/// `now + d`, capped at [`HORIZON`] so a huge duration can never overflow the clock.
fn deadline(now: Instant, d: Duration) -> Instant {
    let d = d.min(HORIZON);
    now.checked_add(d).unwrap_or(now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AutomationId(u64);

/// Lifecycle token for one running automation. Owned by exactly one note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AutomationHandle {
    id: AutomationId,
    kind: AutomationKind,
    midi_note: u8,
}

impl AutomationHandle {
    pub fn id(&self) -> AutomationId {
        self.id
    }
    pub fn kind(&self) -> AutomationKind {
        self.kind
    }
    pub fn midi_note(&self) -> u8 {
        self.midi_note
    }
}

/// How an automation fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationSpec {
    pub kind: AutomationKind,
    /// Firing interval for periodic automations.
    pub interval: Option<Duration>,
    /// Total lifetime. `None` runs until cancelled.
    pub duration: Option<Duration>,
}

impl AutomationSpec {
    /// Fires once, when `duration` has elapsed.
    pub fn one_shot(kind: AutomationKind, duration: Duration) -> Self {
        Self {
            kind,
            interval: None,
            duration: Some(duration),
        }
    }

    /// Fires every `interval` until cancelled.
    pub fn periodic(kind: AutomationKind, interval: Duration) -> Self {
        Self {
            kind,
            interval: Some(interval.max(MIN_INTERVAL)),
            duration: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Task {
    handle: AutomationHandle,
    next_fire: Instant,
    interval: Option<Duration>,
    ends_at: Option<Instant>,
}

/// One due callback, returned by [`AutomationScheduler::next_due`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Firing {
    pub handle: AutomationHandle,
    /// The automation reached its end and has already been removed.
    pub completed: bool,
}

#[derive(Debug, Default)]
pub struct AutomationScheduler {
    tasks: BTreeMap<AutomationId, Task>,
    next_id: u64,
}

impl AutomationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, midi_note: u8, spec: AutomationSpec, now: Instant) -> AutomationHandle {
        let id = AutomationId(self.next_id);
        self.next_id += 1;
        let handle = AutomationHandle {
            id,
            kind: spec.kind,
            midi_note,
        };
        let ends_at = spec.duration.map(|d| deadline(now, d));
        let next_fire = match (spec.interval, ends_at) {
            (Some(interval), Some(end)) => deadline(now, interval).min(end),
            (Some(interval), None) => deadline(now, interval),
            (None, Some(end)) => end,
            (None, None) => now,
        };
        self.tasks.insert(
            id,
            Task {
                handle,
                next_fire,
                interval: spec.interval,
                ends_at,
            },
        );
        log::trace!(target: "audio::automation", "start {:?} #{} on note {}", spec.kind, id.0, midi_note);
        handle
    }

    /// Stop all future firings. Returns false if the handle was already gone.
    pub fn cancel(&mut self, handle: AutomationHandle) -> bool {
        let removed = self.tasks.remove(&handle.id).is_some();
        if removed {
            log::trace!(
                target: "audio::automation",
                "cancel {:?} #{} on note {}",
                handle.kind,
                handle.id.0,
                handle.midi_note
            );
        }
        removed
    }

    pub fn is_active(&self, handle: AutomationHandle) -> bool {
        self.tasks.contains_key(&handle.id)
    }

    /// Number of automations that will still fire.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn pending_for(&self, midi_note: u8) -> usize {
        self.tasks
            .values()
            .filter(|t| t.handle.midi_note == midi_note)
            .count()
    }

    /// Pop the earliest automation due at `now`, advancing or removing it.
    pub fn next_due(&mut self, now: Instant) -> Option<Firing> {
        let id = self
            .tasks
            .values()
            .filter(|t| t.next_fire <= now)
            .min_by_key(|t| (t.next_fire, t.handle.id))
            .map(|t| t.handle.id)?;

        let task = self.tasks.get_mut(&id)?;
        let handle = task.handle;

        let finished = match (task.ends_at, task.interval) {
            (Some(end), _) if now >= end => true,
            (_, None) => true,
            (ends_at, Some(interval)) => {
                let next = deadline(now, interval);
                task.next_fire = ends_at.map_or(next, |end| next.min(end));
                false
            }
        };

        if finished {
            self.tasks.remove(&id);
        }
        Some(Firing {
            handle,
            completed: finished,
        })
    }

    /// Drop every automation. Returns how many were still pending.
    pub fn clear(&mut self) -> usize {
        let n = self.tasks.len();
        self.tasks.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn one_shot_fires_once_at_end() {
        let t0 = Instant::now();
        let mut sched = AutomationScheduler::new();
        let h = sched.start(60, AutomationSpec::one_shot(AutomationKind::AttackNoise, ms(30)), t0);

        assert!(sched.next_due(t0 + ms(10)).is_none());
        let firing = sched.next_due(t0 + ms(30)).unwrap();
        assert_eq!(firing.handle, h);
        assert!(firing.completed);
        assert!(!sched.is_active(h));
        assert!(sched.next_due(t0 + ms(100)).is_none());
    }

    #[test]
    fn periodic_fires_until_cancelled() {
        let t0 = Instant::now();
        let mut sched = AutomationScheduler::new();
        let h = sched.start(60, AutomationSpec::periodic(AutomationKind::PitchDrift, ms(16)), t0);

        let mut now = t0;
        for _ in 0..5 {
            now += ms(16);
            let f = sched.next_due(now).unwrap();
            assert!(!f.completed);
            assert!(sched.next_due(now).is_none());
        }
        assert!(sched.cancel(h));
        assert!(!sched.cancel(h));
        assert!(sched.next_due(now + ms(1000)).is_none());
    }

    #[test]
    fn earliest_due_fires_first() {
        let t0 = Instant::now();
        let mut sched = AutomationScheduler::new();
        let late = sched.start(21, AutomationSpec::one_shot(AutomationKind::SustainDecay, ms(50)), t0);
        let early = sched.start(
            108,
            AutomationSpec::one_shot(AutomationKind::ReleaseTransient, ms(20)),
            t0,
        );
        let now = t0 + ms(60);
        assert_eq!(sched.next_due(now).unwrap().handle, early);
        assert_eq!(sched.next_due(now).unwrap().handle, late);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn pending_counts_and_clear() {
        let t0 = Instant::now();
        let mut sched = AutomationScheduler::new();
        sched.start(60, AutomationSpec::periodic(AutomationKind::PitchDrift, ms(16)), t0);
        sched.start(60, AutomationSpec::one_shot(AutomationKind::AttackNoise, ms(30)), t0);
        sched.start(64, AutomationSpec::one_shot(AutomationKind::AttackNoise, ms(30)), t0);
        assert_eq!(sched.pending_for(60), 2);
        assert_eq!(sched.pending_for(64), 1);
        assert_eq!(sched.clear(), 3);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn huge_durations_do_not_overflow_the_clock() {
        let t0 = Instant::now();
        let mut sched = AutomationScheduler::new();
        let forever = Duration::from_secs(u64::MAX);
        let h = sched.start(21, AutomationSpec::one_shot(AutomationKind::SustainDecay, forever), t0);
        let p = sched.start(21, AutomationSpec::periodic(AutomationKind::PitchDrift, forever), t0);

        assert!(sched.next_due(t0 + Duration::from_secs(3600)).is_none());
        assert!(sched.is_active(h));
        assert!(sched.is_active(p));

        let later = t0 + HORIZON;
        let first = sched.next_due(later).unwrap();
        let second = sched.next_due(later).unwrap();
        assert_eq!((first.handle, second.handle), (h, p));
        assert!(first.completed);
        assert!(!second.completed);
    }

    #[test]
    fn handles_are_unique() {
        let t0 = Instant::now();
        let mut sched = AutomationScheduler::new();
        let a = sched.start(60, AutomationSpec::one_shot(AutomationKind::AttackNoise, ms(30)), t0);
        sched.cancel(a);
        let b = sched.start(60, AutomationSpec::one_shot(AutomationKind::AttackNoise, ms(30)), t0);
        assert_ne!(a.id(), b.id());
        assert!(!sched.is_active(a));
        assert!(sched.is_active(b));
    }
}
