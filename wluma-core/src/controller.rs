// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Edit-detection state machine and transition planning.
//!
//! Once per capture cycle the controller receives the smoothed lux, the
//! frame luma and the backlight level currently observed on the device, and
//! decides between staying idle, recording the observed level as a new
//! training point, or driving the backlight toward a predicted target.
//!
//! A backlight value that differs from whatever was last written is taken
//! as a user correction. The correction is held as a *pending edit* until
//! it has stayed put for [`EDIT_SETTLE_CYCLES`] cycles (≈3 s at the
//! capture rate); only then is it committed to the training set. Any
//! further change during the window restarts it with the fresh values.
//!
//! The controller never writes the backlight itself. A requested change is
//! returned as a [`TransitionPlan`] so the caller can interleave the
//! individual device writes with its own shutdown checks.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::point::TrainingPoint;
use crate::predict::predict;
use crate::store::TrainingStore;
use crate::training::TrainingSet;

/// Number of unchanged cycles before a user correction is committed.
pub const EDIT_SETTLE_CYCLES: u8 = 15;

/// Total wall-clock duration of one backlight transition.
const TRANSITION_TOTAL_MS: u64 = 300;

/// What the caller should do after a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to write this cycle.
    Idle,
    /// Drive the backlight along the given plan.
    Transition(TransitionPlan),
}

/// A gradual backlight change from `from` to `to` in ±1 steps.
///
/// The plan yields exactly `|to - from|` values, each one step beyond the
/// last, ending at `to`; paced by [`step_delay`](Self::step_delay) the whole
/// transition takes ≈300 ms regardless of magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Level currently on the device.
    pub from: u8,
    /// Target level.
    pub to: u8,
}

impl TransitionPlan {
    /// The successive backlight percentages to write, in order.
    pub fn steps(&self) -> impl Iterator<Item = u8> + use<> {
        let (from, to) = (self.from, self.to);
        let count = u16::from(from.abs_diff(to));
        (1..=count).map(move |i| {
            if to >= from {
                from + i as u8
            } else {
                from - i as u8
            }
        })
    }

    /// Pause between steps so the whole transition takes ≈300 ms.
    #[must_use]
    pub fn step_delay(&self) -> Duration {
        let count = u64::from(self.from.abs_diff(self.to));
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(TRANSITION_TOTAL_MS / count)
    }
}

#[derive(Clone, Copy, Debug)]
struct PendingEdit {
    lux: i64,
    luma: u8,
    backlight: u8,
    countdown: u8,
}

/// The per-cycle decision maker.
///
/// Construct it with the training set loaded at startup, and with the store
/// to persist into after every confirmed edit (`None` keeps the set purely
/// in memory, which the tests use).
#[derive(Debug)]
pub struct Controller {
    training: TrainingSet,
    store: Option<TrainingStore>,
    pending: Option<PendingEdit>,
    last_written: u8,
}

impl Controller {
    /// Creates a controller over a previously loaded training set.
    #[must_use]
    pub fn new(training: TrainingSet, store: Option<TrainingStore>) -> Self {
        Self {
            training,
            store,
            pending: None,
            last_written: 0,
        }
    }

    /// Records the currently observed backlight without interpreting it.
    ///
    /// Called during warm-up, while the lux window is still filling, so
    /// that the level present at startup is not mistaken for a user edit on
    /// the first real cycle.
    pub fn sync_observed(&mut self, backlight: u8) {
        self.last_written = backlight;
    }

    /// Runs one cycle with the smoothed lux, frame luma and observed
    /// backlight, and returns what the caller should do.
    pub fn cycle(&mut self, lux: i64, luma: u8, backlight: u8) -> Decision {
        let user_changed = backlight != self.last_written;
        let nothing_learned = self.training.is_empty() && self.pending.is_none();
        self.last_written = backlight;

        if user_changed || nothing_learned {
            debug!(lux, luma, backlight, "opening edit window");
            self.pending = Some(PendingEdit {
                lux,
                luma,
                backlight,
                countdown: EDIT_SETTLE_CYCLES,
            });
            return Decision::Idle;
        }

        if let Some(pending) = self.pending.as_mut() {
            pending.countdown -= 1;
            if pending.countdown <= 1 {
                let settled = *pending;
                self.pending = None;
                self.confirm(settled);
            }
            return Decision::Idle;
        }

        let Some(target) = predict(&self.training, lux, luma) else {
            return Decision::Idle;
        };
        if target == backlight {
            return Decision::Idle;
        }

        debug!(lux, luma, backlight, target, "adjusting backlight");
        self.last_written = target;
        Decision::Transition(TransitionPlan {
            from: backlight,
            to: target,
        })
    }

    fn confirm(&mut self, edit: PendingEdit) {
        let point = TrainingPoint::new(edit.lux, edit.luma, edit.backlight);
        self.training.insert(point);
        info!(
            lux = point.lux,
            luma = point.luma,
            backlight = point.backlight,
            "learned backlight preference"
        );

        if let Some(store) = self.store.as_mut() {
            // The in-memory set keeps the new point even if persisting it
            // fails; the next successful save writes the full set anyway.
            if let Err(err) = store.save(&self.training) {
                error!("unable to save training data: {err}");
            }
        }
    }

    /// The current training set.
    #[must_use]
    pub fn training(&self) -> &TrainingSet {
        &self.training
    }
}
