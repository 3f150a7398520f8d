//! Software trigger evaluated on generated samples.
//!
//! ```text
//!  Disabled ──start──▶ Fired
//!  Armed ──match, holdoff > 0──▶ Holdoff ──holdoff done──▶ Fired
//!  Armed ──match, holdoff = 0──▶ Fired
//!  Fired ──rearm──▶ Armed (or Fired again without a trigger)
//!  any ──stop──▶ Stopped
//! ```

use std::collections::TryReserveError;
use std::collections::VecDeque;

use crate::trigger_config::{Trigger, TriggerCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// No trigger configured, everything is post-trigger data.
    Disabled,
    /// Scanning for a match, retaining pre-trigger samples.
    Armed,
    /// Matched, dropping samples until the holdoff has elapsed.
    Holdoff,
    Fired,
    Stopped,
}

/// What the controller should do with a sample fed to the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDisposition {
    /// Keep it in the pre-trigger buffer via [`TriggerMatcher::retain`].
    PreTrigger,
    /// The trigger matched on this sample. Flush the pre-trigger buffer,
    /// then output the sample.
    Trigger,
    /// Dropped during holdoff.
    Suppressed,
    Output,
    /// The matcher is stopped, the sample goes nowhere.
    Discard,
}

/// Per-acquisition trigger configuration and match history.
#[derive(Debug, Clone)]
pub struct TriggerSession {
    conditions: Vec<TriggerCondition>,
    previous: Vec<Option<bool>>,
    pre_trigger_budget: u64,
    holdoff_samples: u64,
    holdoff_remaining: u64,
    matched: bool,
}

impl TriggerSession {
    pub fn new(trigger: &Trigger, pre_trigger_budget: u64, holdoff_samples: u64) -> Self {
        Self {
            conditions: trigger.conditions.clone(),
            previous: vec![None; trigger.conditions.len()],
            pre_trigger_budget,
            holdoff_samples,
            holdoff_remaining: 0,
            matched: false,
        }
    }

    pub fn pre_trigger_budget(&self) -> u64 {
        self.pre_trigger_budget
    }

    pub fn holdoff_remaining(&self) -> u64 {
        self.holdoff_remaining
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    /// Check every condition against `raw` and record the levels as history
    /// for the next sample.
    fn check(&mut self, raw: &[u8]) -> bool {
        let mut all = true;
        for (cond, prev) in self.conditions.iter().zip(self.previous.iter_mut()) {
            let level = raw
                .get(cond.channel / 8)
                .is_some_and(|byte| (byte >> (cond.channel % 8)) & 1 == 1);
            all &= cond.kind.evaluate(*prev, level);
            *prev = Some(level);
        }
        all
    }
}

#[derive(Debug)]
pub struct TriggerMatcher {
    session: Option<TriggerSession>,
    state: TriggerState,
    pre_trigger: VecDeque<u8>,
    unit_size: usize,
}

impl TriggerMatcher {
    /// Create the matcher for one acquisition. The pre-trigger buffer is
    /// allocated up front so a failing allocation aborts the start.
    pub fn new(session: Option<TriggerSession>, unit_size: usize) -> Result<Self, TryReserveError> {
        let mut pre_trigger = VecDeque::new();
        let state = match &session {
            Some(s) => {
                let bytes = usize::try_from(s.pre_trigger_budget)
                    .unwrap_or(usize::MAX)
                    .saturating_mul(unit_size);
                pre_trigger.try_reserve_exact(bytes)?;
                TriggerState::Armed
            }
            None => TriggerState::Disabled,
        };

        Ok(Self {
            session,
            state,
            pre_trigger,
            unit_size,
        })
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn session(&self) -> Option<&TriggerSession> {
        self.session.as_ref()
    }

    pub fn is_fired(&self) -> bool {
        self.state == TriggerState::Fired
    }

    /// Acquisition start: without a trigger the data is post-trigger right away.
    pub fn start(&mut self) {
        if self.state == TriggerState::Disabled {
            self.state = TriggerState::Fired;
        }
    }

    /// Begin a new capture cycle after a finished one.
    pub fn rearm(&mut self) {
        if self.state == TriggerState::Stopped {
            return;
        }
        self.pre_trigger.clear();
        self.state = match self.session.as_mut() {
            Some(session) => {
                session.matched = false;
                session.holdoff_remaining = 0;
                TriggerState::Armed
            }
            None => TriggerState::Fired,
        };
    }

    pub fn stop(&mut self) {
        self.state = TriggerState::Stopped;
        self.pre_trigger.clear();
    }

    /// Advance the state machine by one raw sample.
    pub fn feed(&mut self, raw: &[u8]) -> SampleDisposition {
        let Some(session) = self.session.as_mut() else {
            return match self.state {
                TriggerState::Stopped => SampleDisposition::Discard,
                _ => SampleDisposition::Output,
            };
        };

        // Edge history is tracked on every sample so a re-armed trigger
        // compares against the sample right before it.
        let matched = session.check(raw);

        match self.state {
            TriggerState::Armed if matched => {
                session.matched = true;
                if session.holdoff_samples > 0 {
                    session.holdoff_remaining = session.holdoff_samples;
                    self.state = TriggerState::Holdoff;
                } else {
                    self.state = TriggerState::Fired;
                }
                SampleDisposition::Trigger
            }
            TriggerState::Armed => SampleDisposition::PreTrigger,
            TriggerState::Holdoff => {
                session.holdoff_remaining -= 1;
                if session.holdoff_remaining == 0 {
                    self.state = TriggerState::Fired;
                }
                SampleDisposition::Suppressed
            }
            TriggerState::Disabled | TriggerState::Fired => SampleDisposition::Output,
            TriggerState::Stopped => SampleDisposition::Discard,
        }
    }

    /// Keep a packed pre-trigger sample, dropping the oldest one once the
    /// budget is full.
    pub fn retain(&mut self, packed: &[u8]) {
        let budget = self.session.as_ref().map_or(0, |s| s.pre_trigger_budget);
        if budget == 0 || self.unit_size == 0 {
            return;
        }
        if self.pre_trigger_samples() >= budget {
            self.pre_trigger.drain(..self.unit_size);
        }
        self.pre_trigger.extend(&packed[..self.unit_size]);
    }

    pub fn pre_trigger_samples(&self) -> u64 {
        if self.unit_size == 0 {
            return 0;
        }
        (self.pre_trigger.len() / self.unit_size) as u64
    }

    /// Hand out the retained pre-trigger samples, oldest first.
    pub fn take_pre_trigger(&mut self) -> impl Iterator<Item = u8> + '_ {
        self.pre_trigger.drain(..)
    }
}
