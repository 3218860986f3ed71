//! Loop phasing scheduler.
//!
//! Each armed phrase loops on its own clock: event `e` of cycle `k` fires at
//! `origin + k * period + e.offset`. Fire times are always recomputed from
//! the origin, never accumulated, so periods keep their exact ratios and the
//! phrases drift against each other indefinitely.
//!
//! The scheduler lives in the control domain. A host polls it with
//! [`advance_to`](LoopPhasingScheduler::advance_to) and it hands due events to
//! a [`TriggerSink`], which for the synth is an
//! [`EngineHandle`](crate::dsp::engine::EngineHandle) writing atomics.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PhraseError;
use crate::phrase::{Phrase, PhraseEvent, PhraseId, validate_all};

/// One event firing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fire {
    /// Scheduled time in seconds on the scheduler clock.
    pub time: f64,
    pub phrase: PhraseId,
    /// Which repetition of the phrase (0 for the first).
    pub cycle: u64,
    pub event_index: usize,
}

/// Receives due events.
pub trait TriggerSink {
    fn fire(&mut self, fire: &Fire, event: &PhraseEvent);
}

impl<F> TriggerSink for F
where
    F: FnMut(&Fire, &PhraseEvent),
{
    fn fire(&mut self, fire: &Fire, event: &PhraseEvent) {
        self(fire, event)
    }
}

/// A sink that only records what fired.
#[derive(Debug, Clone, Default)]
pub struct TriggerLog {
    pub fires: Vec<Fire>,
}

impl TriggerLog {
    pub fn new() -> Self {
        TriggerLog::default()
    }

    pub fn len(&self) -> usize {
        self.fires.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fires.is_empty()
    }

    pub fn for_phrase(&self, id: PhraseId) -> impl Iterator<Item = &Fire> + '_ {
        self.fires.iter().filter(move |f| f.phrase == id)
    }
}

impl TriggerSink for TriggerLog {
    fn fire(&mut self, fire: &Fire, _event: &PhraseEvent) {
        self.fires.push(*fire);
    }
}

/// How `engage_all` spreads phrase start times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StaggerPolicy {
    /// Every phrase starts now.
    Simultaneous,
    /// Phrase `i` (in id order) starts `i * step_seconds` later.
    Linear { step_seconds: f64 },
    /// Each phrase starts after a seeded random delay in `[0, max_seconds)`.
    Random { max_seconds: f64, seed: u64 },
}

impl Default for StaggerPolicy {
    fn default() -> Self {
        StaggerPolicy::Linear { step_seconds: 0.2 }
    }
}

impl StaggerPolicy {
    /// Start delays for `count` phrases, in order.
    pub fn delays(&self, count: usize) -> Vec<f64> {
        match *self {
            StaggerPolicy::Simultaneous => vec![0.0; count],
            StaggerPolicy::Linear { step_seconds } => {
                let step = step_seconds.max(0.0);
                (0..count).map(|i| i as f64 * step).collect()
            }
            StaggerPolicy::Random { max_seconds, seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                (0..count)
                    .map(|_| {
                        if max_seconds > 0.0 {
                            rng.gen_range(0.0..max_seconds)
                        } else {
                            0.0
                        }
                    })
                    .collect()
            }
        }
    }
}

/// Queue entry; ordered so the `BinaryHeap` pops the earliest fire first.
#[derive(Debug, Clone, Copy)]
struct Pending(Fire);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .time
            .total_cmp(&self.0.time)
            .then_with(|| other.0.phrase.cmp(&self.0.phrase))
            .then_with(|| other.0.event_index.cmp(&self.0.event_index))
    }
}

#[derive(Debug, Clone)]
struct Armed {
    phrase: Phrase,
    origin: f64,
}

impl Armed {
    fn fire_at(&self, cycle: u64, event_index: usize) -> Fire {
        let offset = self.phrase.events[event_index].offset_seconds;
        Fire {
            time: self.origin + cycle as f64 * self.phrase.base_period_seconds + offset,
            phrase: self.phrase.id,
            cycle,
            event_index,
        }
    }
}

/// Runs any number of independently periodic phrases.
#[derive(Debug, Clone, Default)]
pub struct LoopPhasingScheduler {
    /// Every known phrase, armed or stopped.
    library: BTreeMap<PhraseId, Phrase>,
    armed: BTreeMap<PhraseId, Armed>,
    queue: BinaryHeap<Pending>,
    now: f64,
}

impl LoopPhasingScheduler {
    pub fn new() -> Self {
        LoopPhasingScheduler::default()
    }

    /// A scheduler whose library holds `phrases`, all stopped.
    pub fn with_phrases(phrases: Vec<Phrase>) -> Result<Self, PhraseError> {
        validate_all(&phrases)?;
        let mut scheduler = LoopPhasingScheduler::new();
        for phrase in phrases {
            scheduler.library.insert(phrase.id, phrase);
        }
        Ok(scheduler)
    }

    /// Add or replace a stopped phrase in the library.
    pub fn add_phrase(&mut self, phrase: Phrase) -> Result<(), PhraseError> {
        phrase.validate()?;
        self.library.insert(phrase.id, phrase);
        Ok(())
    }

    pub fn phrase(&self, id: PhraseId) -> Option<&Phrase> {
        self.library.get(&id)
    }

    pub fn phrase_ids(&self) -> impl Iterator<Item = PhraseId> + '_ {
        self.library.keys().copied()
    }

    /// Current scheduler clock (the latest time passed to `advance_to`).
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Arm `phrase` under `id` with its cycle starting at `now`.
    ///
    /// Arming a phrase that is already armed leaves it running untouched,
    /// and its library entry keeps the definition that is playing.
    pub fn arm_phrase(&mut self, id: PhraseId, mut phrase: Phrase, now: f64) -> Result<(), PhraseError> {
        phrase.id = id;
        phrase.validate()?;
        if self.armed.contains_key(&id) {
            debug!(phrase = id, "already armed, new definition ignored");
            return Ok(());
        }
        self.library.insert(id, phrase.clone());
        self.start(phrase, now);
        Ok(())
    }

    /// Arm a phrase already in the library.
    pub fn arm(&mut self, id: PhraseId, now: f64) -> Result<(), PhraseError> {
        let phrase = self.library.get(&id).cloned().ok_or(PhraseError::UnknownPhrase(id))?;
        self.start(phrase, now);
        Ok(())
    }

    fn start(&mut self, phrase: Phrase, origin: f64) {
        if self.armed.contains_key(&phrase.id) {
            debug!(phrase = phrase.id, "already armed");
            return;
        }
        let armed = Armed { phrase, origin };
        for index in 0..armed.phrase.events.len() {
            self.queue.push(Pending(armed.fire_at(0, index)));
        }
        info!(
            phrase = armed.phrase.id,
            period = armed.phrase.base_period_seconds,
            origin,
            "phrase armed"
        );
        self.armed.insert(armed.phrase.id, armed);
    }

    /// Stop a phrase and cancel every pending fire it has. Returns whether
    /// it was armed.
    pub fn disarm_phrase(&mut self, id: PhraseId) -> bool {
        let was_armed = self.armed.remove(&id).is_some();
        self.queue.retain(|p| p.0.phrase != id);
        if was_armed {
            info!(phrase = id, "phrase disarmed");
        }
        was_armed
    }

    /// Arm every library phrase, spreading start times by `policy`.
    pub fn engage_all(&mut self, policy: StaggerPolicy, now: f64) {
        let phrases: Vec<Phrase> = self.library.values().cloned().collect();
        let delays = policy.delays(phrases.len());
        for (phrase, delay) in phrases.into_iter().zip(delays) {
            self.start(phrase, now + delay);
        }
        info!(armed = self.armed.len(), ?policy, "engaged all phrases");
    }

    /// Stop everything and drop all pending fires.
    pub fn silence_all(&mut self) {
        self.armed.clear();
        self.queue.clear();
        info!("all phrases silenced");
    }

    pub fn is_armed(&self, id: PhraseId) -> bool {
        self.armed.contains_key(&id)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Time of the earliest pending fire, if any phrase is armed.
    pub fn next_due(&self) -> Option<f64> {
        self.queue.peek().map(|p| p.0.time)
    }

    /// Fraction of the current cycle elapsed at `now`, in `[0, 1)`.
    /// Zero before the phrase's first cycle starts.
    pub fn progress(&self, id: PhraseId, now: f64) -> Option<f64> {
        let armed = self.armed.get(&id)?;
        let elapsed = now - armed.origin;
        if elapsed <= 0.0 {
            return Some(0.0);
        }
        Some((elapsed / armed.phrase.base_period_seconds).rem_euclid(1.0))
    }

    /// Fire everything due at or before `now`, in time order, and queue each
    /// fired event's next cycle. Returns the number of fires.
    pub fn advance_to(&mut self, now: f64, sink: &mut impl TriggerSink) -> usize {
        self.now = self.now.max(now);
        let mut fired = 0;
        while let Some(&Pending(fire)) = self.queue.peek() {
            if fire.time > now {
                break;
            }
            self.queue.pop();
            let Some(armed) = self.armed.get(&fire.phrase) else {
                continue;
            };
            debug!(phrase = fire.phrase, time = fire.time, cycle = fire.cycle, "fire");
            sink.fire(&fire, &armed.phrase.events[fire.event_index]);
            self.queue
                .push(Pending(armed.fire_at(fire.cycle + 1, fire.event_index)));
            fired += 1;
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phrase::airports;

    fn two_phrases() -> LoopPhasingScheduler {
        LoopPhasingScheduler::with_phrases(vec![
            Phrase::single(1, 17.069, 11.645),
            Phrase::single(2, 20.752, 7.163),
        ])
        .unwrap()
    }

    /// Step the clock in `dt` increments up to `end`.
    fn run(scheduler: &mut LoopPhasingScheduler, end: f64, dt: f64, log: &mut TriggerLog) {
        let steps = (end / dt).round() as usize;
        for i in 1..=steps {
            scheduler.advance_to(i as f64 * dt, log);
        }
    }

    #[test]
    fn two_phrases_fire_at_their_offsets() {
        let mut scheduler = two_phrases();
        scheduler.engage_all(StaggerPolicy::Simultaneous, 0.0);
        let mut log = TriggerLog::new();
        run(&mut scheduler, 21.0, 0.01, &mut log);

        assert_eq!(log.len(), 2, "fires: {:?}", log.fires);
        assert_eq!(log.fires[0].phrase, 2);
        assert!((log.fires[0].time - 7.163).abs() < 1e-9);
        assert_eq!(log.fires[1].phrase, 1);
        assert!((log.fires[1].time - 11.645).abs() < 1e-9);
    }

    #[test]
    fn phrases_repeat_on_their_own_period() {
        let mut scheduler = two_phrases();
        scheduler.engage_all(StaggerPolicy::Simultaneous, 0.0);
        let mut log = TriggerLog::new();
        scheduler.advance_to(200.0, &mut log);

        let times: Vec<f64> = log.for_phrase(1).map(|f| f.time).collect();
        for (k, t) in times.iter().enumerate() {
            let expected = 11.645 + k as f64 * 17.069;
            assert!((t - expected).abs() < 1e-9, "cycle {k}: {t} vs {expected}");
        }
        assert_eq!(times.len(), 12);
        assert!(log.fires.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn arm_then_disarm_fires_nothing() {
        let mut scheduler = LoopPhasingScheduler::new();
        scheduler
            .arm_phrase(7, Phrase::single(7, 5.0, 2.0), 0.0)
            .unwrap();
        scheduler.advance_to(1.0, &mut TriggerLog::new());
        assert!(scheduler.disarm_phrase(7));

        let mut log = TriggerLog::new();
        scheduler.advance_to(100.0, &mut log);
        assert!(log.is_empty());
        assert_eq!(scheduler.next_due(), None);
        assert!(!scheduler.is_armed(7));
    }

    #[test]
    fn silence_all_cancels_pending() {
        let mut scheduler = LoopPhasingScheduler::with_phrases(airports()).unwrap();
        scheduler.engage_all(StaggerPolicy::default(), 0.0);
        assert_eq!(scheduler.armed_count(), 8);
        scheduler.silence_all();
        let mut log = TriggerLog::new();
        scheduler.advance_to(1000.0, &mut log);
        assert!(log.is_empty());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[test]
    fn phase_offsets_never_repeat() {
        let p1 = 17.069;
        let mut scheduler = two_phrases();
        scheduler.engage_all(StaggerPolicy::Simultaneous, 0.0);

        let mut phases: Vec<f64> = (1..=1000)
            .map(|k| scheduler.progress(2, k as f64 * p1).unwrap())
            .collect();
        phases.sort_by(f64::total_cmp);
        for pair in phases.windows(2) {
            assert!(pair[1] - pair[0] > 1e-6, "phase repeated near {}", pair[0]);
        }
    }

    #[test]
    fn rearming_armed_phrase_is_noop() {
        let mut scheduler = LoopPhasingScheduler::new();
        scheduler.arm_phrase(1, Phrase::single(1, 4.0, 1.0), 0.0).unwrap();
        scheduler.arm_phrase(1, Phrase::single(1, 4.0, 1.0), 2.0).unwrap();
        let mut log = TriggerLog::new();
        scheduler.advance_to(3.5, &mut log);
        assert_eq!(log.len(), 1);
        assert!((log.fires[0].time - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rearming_keeps_the_playing_definition() {
        let mut scheduler = LoopPhasingScheduler::new();
        scheduler.arm_phrase(1, Phrase::single(1, 4.0, 1.0), 0.0).unwrap();
        scheduler.arm_phrase(1, Phrase::single(1, 9.0, 3.0), 0.5).unwrap();
        assert_eq!(scheduler.phrase(1).unwrap().base_period_seconds, 4.0);

        scheduler.silence_all();
        scheduler.engage_all(StaggerPolicy::Simultaneous, 10.0);
        let mut log = TriggerLog::new();
        scheduler.advance_to(19.5, &mut log);
        let times: Vec<f64> = log.fires.iter().map(|f| f.time).collect();
        assert_eq!(times.len(), 3, "fires: {times:?}");
        assert!((times[0] - 11.0).abs() < 1e-9);
        assert!((times[1] - 15.0).abs() < 1e-9);
        assert!((times[2] - 19.0).abs() < 1e-9);
    }

    #[test]
    fn linear_stagger_delays_origins() {
        let mut scheduler = two_phrases();
        scheduler.engage_all(StaggerPolicy::Linear { step_seconds: 0.5 }, 10.0);
        let mut log = TriggerLog::new();
        scheduler.advance_to(40.0, &mut log);
        let first_of = |id| log.for_phrase(id).next().map(|f| f.time);
        assert!((first_of(1).unwrap() - (10.0 + 11.645)).abs() < 1e-9);
        assert!((first_of(2).unwrap() - (10.5 + 7.163)).abs() < 1e-9);
    }

    #[test]
    fn random_stagger_is_seeded() {
        let policy = StaggerPolicy::Random { max_seconds: 3.0, seed: 42 };
        let a = policy.delays(8);
        assert_eq!(a, policy.delays(8));
        assert!(a.iter().all(|d| (0.0..3.0).contains(d)));
        assert_eq!(StaggerPolicy::Simultaneous.delays(3), vec![0.0; 3]);
    }

    #[test]
    fn progress_tracks_cycle() {
        let mut scheduler = LoopPhasingScheduler::new();
        scheduler.arm_phrase(3, Phrase::single(3, 4.0, 0.0), 1.0).unwrap();
        assert_eq!(scheduler.progress(3, 0.5), Some(0.0));
        assert!((scheduler.progress(3, 2.0).unwrap() - 0.25).abs() < 1e-12);
        assert!((scheduler.progress(3, 7.0).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(scheduler.progress(4, 1.0), None);
    }

    #[test]
    fn unknown_phrase_cannot_be_armed() {
        let mut scheduler = LoopPhasingScheduler::new();
        assert_eq!(scheduler.arm(9, 0.0), Err(PhraseError::UnknownPhrase(9)));
        assert!(scheduler.arm_phrase(1, Phrase::single(1, 1.0, 1.5), 0.0).is_err());
    }

    #[test]
    fn next_due_and_closure_sink() {
        let mut scheduler = two_phrases();
        scheduler.engage_all(StaggerPolicy::Simultaneous, 0.0);
        assert!((scheduler.next_due().unwrap() - 7.163).abs() < 1e-12);

        let mut seen = Vec::new();
        let mut sink = |fire: &Fire, _event: &PhraseEvent| seen.push(fire.phrase);
        scheduler.advance_to(12.0, &mut sink);
        assert_eq!(seen, vec![2, 1]);
    }
}
