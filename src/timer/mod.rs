//! Priority-queue ordered one-shot and interval timers.
//!
//! Time never comes from the wall clock here: the embedding loop advances
//! the queue's notion of "now" explicitly, which keeps every protocol
//! computation driven by the queue deterministic.

use std::collections::BTreeMap;

use rand::{rngs::StdRng, Rng, SeedableRng};

pub const SECOND: u32 = 1000;

/// bound of the first-arming jitter of interval timers, in percent of the period.
pub const JITTER_PERCENT: u32 = 10;

/// Monotonic time since process start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpfTime {
    pub sec: u32,
    pub msec: u32,
}

impl SpfTime {
    pub const ZERO: SpfTime = SpfTime { sec: 0, msec: 0 };

    pub fn from_millis(ms: u64) -> Self {
        Self {
            sec: (ms / SECOND as u64) as u32,
            msec: (ms % SECOND as u64) as u32,
        }
    }
    pub fn as_millis(&self) -> u64 {
        self.sec as u64 * SECOND as u64 + self.msec as u64
    }
    pub fn add_millis(&self, ms: u32) -> Self {
        Self::from_millis(self.as_millis() + ms as u64)
    }
    /// signed difference `self - earlier` in milliseconds.
    pub fn diff_millis(&self, earlier: &SpfTime) -> i64 {
        self.as_millis() as i64 - earlier.as_millis() as i64
    }
}

impl std::fmt::Display for SpfTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03}", self.sec, self.msec)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Interval,
}

struct Timer<A> {
    kind: TimerKind,
    period: u32,
    active: bool,
    slot: Option<(SpfTime, u64)>,
    action: A,
}

/// The timer queue. `A` is what a firing hands back to the caller.
pub struct TimerQueue<A> {
    now: SpfTime,
    timers: Vec<Option<Timer<A>>>,
    free: Vec<usize>,
    queue: BTreeMap<(SpfTime, u64), TimerId>,
    arrivals: u64,
    rng: StdRng,
}

impl<A: Clone> TimerQueue<A> {
    pub fn new(seed: u64) -> Self {
        Self {
            now: SpfTime::ZERO,
            timers: Vec::new(),
            free: Vec::new(),
            queue: BTreeMap::new(),
            arrivals: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn now(&self) -> SpfTime {
        self.now
    }

    pub fn advance(&mut self, ms: u64) {
        self.now = SpfTime::from_millis(self.now.as_millis() + ms);
    }

    /// moves the clock forward to `now`; the clock never runs backwards.
    pub fn set_now(&mut self, now: SpfTime) {
        if now > self.now {
            self.now = now;
        }
    }

    pub fn create(&mut self, kind: TimerKind, action: A) -> TimerId {
        let timer = Timer {
            kind,
            period: 0,
            active: false,
            slot: None,
            action,
        };
        match self.free.pop() {
            Some(index) => {
                self.timers[index] = Some(timer);
                TimerId(index)
            }
            None => {
                self.timers.push(Some(timer));
                TimerId(self.timers.len() - 1)
            }
        }
    }

    /// stops the timer and releases its slot. the id must not be used again.
    pub fn destroy(&mut self, id: TimerId) {
        self.stop(id);
        if let Some(entry) = self.timers.get_mut(id.0) {
            if entry.take().is_some() {
                self.free.push(id.0);
            }
        }
    }

    /// Arms the timer to fire `ms` from now. A running timer is rescheduled.
    /// Interval timers started with `randomize` get their first firing
    /// jittered by up to `JITTER_PERCENT` of the period.
    pub fn start(&mut self, id: TimerId, ms: u32, randomize: bool) {
        let Some(kind) = self.timer(id).map(|t| t.kind) else {
            crate::util::error(&format!("timer {:?}: start on a released timer", id));
            return;
        };
        self.unqueue(id);
        let period = match kind {
            TimerKind::Interval => ms.max(1),
            TimerKind::OneShot => ms,
        };
        let first = if randomize && kind == TimerKind::Interval {
            self.random_period(period)
        } else {
            period
        };
        let fire_at = self.now.add_millis(first);
        let key = self.enqueue(id, fire_at);
        if let Some(timer) = self.timer_mut(id) {
            timer.period = period;
            timer.active = true;
            timer.slot = Some(key);
        }
    }

    pub fn stop(&mut self, id: TimerId) {
        self.unqueue(id);
        if let Some(timer) = self.timer_mut(id) {
            timer.active = false;
        }
    }

    /// stop followed by start. `ms == 0` reuses the last period.
    pub fn restart(&mut self, id: TimerId, ms: u32) {
        let period = if ms == 0 {
            self.timer(id).map(|t| t.period).unwrap_or(0)
        } else {
            ms
        };
        self.stop(id);
        self.start(id, period, false);
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.timer(id).map(|t| t.active).unwrap_or(false)
    }

    pub fn interval(&self, id: TimerId) -> u32 {
        match self.timer(id) {
            Some(timer) if timer.active => timer.period,
            _ => 0,
        }
    }

    /// `None` when the timer is not running.
    pub fn milliseconds_to_firing(&self, id: TimerId) -> Option<u32> {
        let (fire_at, _) = self.timer(id).filter(|t| t.active)?.slot?;
        Some(fire_at.diff_millis(&self.now).max(0) as u32)
    }

    /// time until the head of the queue fires, `None` meaning wait indefinitely.
    pub fn timeout(&self) -> Option<u32> {
        let ((fire_at, _), _) = self.queue.first_key_value()?;
        Some(fire_at.diff_millis(&self.now).max(0) as u32)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Fires one timer. Interval timers are requeued for now+period before
    /// the action is handed out; one-shot timers go inactive.
    pub fn fire(&mut self, id: TimerId) -> Option<A> {
        let (kind, period, action) = {
            let timer = self.timer(id).filter(|t| t.active)?;
            (timer.kind, timer.period, timer.action.clone())
        };
        self.unqueue(id);
        match kind {
            TimerKind::Interval => {
                let fire_at = self.now.add_millis(period);
                let key = self.enqueue(id, fire_at);
                if let Some(timer) = self.timer_mut(id) {
                    timer.slot = Some(key);
                }
            }
            TimerKind::OneShot => {
                if let Some(timer) = self.timer_mut(id) {
                    timer.active = false;
                }
            }
        }
        Some(action)
    }

    /// Fires every timer whose time has passed, in queue order.
    pub fn tick(&mut self) -> Vec<A> {
        let mut due = Vec::new();
        loop {
            let Some((&(fire_at, seq), &id)) = self.queue.first_key_value() else {
                break;
            };
            if fire_at > self.now {
                break;
            }
            // an interval timer requeued by fire() lands strictly after now.
            match self.fire(id) {
                Some(action) => due.push(action),
                None => {
                    self.queue.remove(&(fire_at, seq));
                }
            }
        }
        due
    }

    pub fn random_period(&mut self, period: u32) -> u32 {
        let spread = period / 100 * JITTER_PERCENT + (period % 100) * JITTER_PERCENT / 100;
        if spread == 0 {
            return period;
        }
        let low = period - spread;
        let high = period.saturating_add(spread);
        self.rng.random_range(low..=high).max(1)
    }

    fn enqueue(&mut self, id: TimerId, fire_at: SpfTime) -> (SpfTime, u64) {
        self.arrivals += 1;
        let key = (fire_at, self.arrivals);
        self.queue.insert(key, id);
        key
    }

    fn unqueue(&mut self, id: TimerId) {
        if let Some(key) = self.timer_mut(id).and_then(|t| t.slot.take()) {
            self.queue.remove(&key);
        }
    }

    fn timer(&self, id: TimerId) -> Option<&Timer<A>> {
        self.timers.get(id.0).and_then(|t| t.as_ref())
    }

    fn timer_mut(&mut self, id: TimerId) -> Option<&mut Timer<A>> {
        self.timers.get_mut(id.0).and_then(|t| t.as_mut())
    }
}
