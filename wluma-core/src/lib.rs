// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core logic for the wluma adaptive-backlight daemon.
//!
//! `wluma_core` holds everything that can be reasoned about without a GPU or
//! a compositor: the learned training set and its dominance pruning, the
//! on-disk store, ambient-light smoothing, backlight prediction, and the
//! controller state machine that ties them together.
//!
//! # Architecture
//!
//! The crate is organized around one decision per capture cycle:
//!
//! ```text
//!   raw lux ──► LuxWindow ──┐
//!                           ▼
//!   luma %, backlight % ──► Controller::cycle() ──► Decision
//!                           │        ▲                  │
//!                           ▼        │                  ▼
//!                      TrainingSet ◄─┘          TransitionPlan
//!                           │                   (executed by the
//!                           ▼                    capture backend)
//!                      TrainingStore (disk)
//! ```
//!
//! **[`point`]** — The `(lux, luma, backlight)` training triple and the
//! dominance relation that keeps the set consistent with the most recent
//! user preference.
//!
//! **[`training`]** — Flat insertion-ordered point set with pruning and the
//! nearest-three scan used by prediction.
//!
//! **[`store`]** — Plain-text persistence under the XDG data directory with
//! synchronous write discipline.
//!
//! **[`lux`]** — Rolling-window average over raw ambient-light readings.
//!
//! **[`predict`]** — Local plane interpolation over the three nearest
//! training points.
//!
//! **[`controller`]** — Edit-detection state machine producing
//! [`Decision`](controller::Decision) values; backlight writes themselves
//! are performed by the caller.
//!
//! **[`geom`]** — Minimal 3-vector used by prediction.

pub mod controller;
pub mod geom;
pub mod lux;
pub mod point;
pub mod predict;
pub mod store;
pub mod training;

pub use controller::{Controller, Decision, TransitionPlan};
pub use lux::LuxWindow;
pub use point::TrainingPoint;
pub use store::{StoreError, TrainingStore};
pub use training::TrainingSet;
