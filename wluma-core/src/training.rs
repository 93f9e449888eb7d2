// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Insertion-ordered training set with dominance pruning.

use tracing::debug;

use crate::point::TrainingPoint;

/// The learned set of `(lux, luma, backlight)` preferences.
///
/// Points are kept in a flat vector in insertion order; pruning and the
/// nearest-neighbour scan are both single passes, which is plenty for the
/// few dozen points a user ever accumulates. Two invariants hold after
/// every [`insert`](Self::insert):
///
/// - no two points share `(lux, luma)`;
/// - no point is superseded by another under
///   [`TrainingPoint::superseded_by`].
///
/// `lux_max_seen` tracks the largest lux ever confirmed (or loaded) and is
/// never below 1, so prediction can normalize lux distances by it.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingSet {
    points: Vec<TrainingPoint>,
    lux_max_seen: i64,
}

impl Default for TrainingSet {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            lux_max_seen: 1,
        }
    }
}

impl TrainingSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from already-consistent points (a loaded file), without
    /// pruning, seeding `lux_max_seen` from the data.
    #[must_use]
    pub fn from_points(points: Vec<TrainingPoint>) -> Self {
        let lux_max_seen = points.iter().map(|p| p.lux).max().unwrap_or(0).max(1);
        Self {
            points,
            lux_max_seen,
        }
    }

    /// Inserts a confirmed point and removes every older point it
    /// supersedes.
    pub fn insert(&mut self, point: TrainingPoint) {
        let before = self.points.len();
        self.points.retain(|existing| !existing.superseded_by(&point));
        let pruned = before - self.points.len();
        self.points.push(point);
        self.lux_max_seen = self.lux_max_seen.max(point.lux).max(1);

        debug!(
            lux = point.lux,
            luma = point.luma,
            backlight = point.backlight,
            pruned,
            total = self.points.len(),
            "learned data point"
        );
    }

    /// Returns up to three points nearest to `(lux, luma)` under the
    /// lux-normalized planar distance, nearest first.
    ///
    /// Lux is clamped to `lux_max_seen` so far-out-of-range ambient values
    /// query the hull of observations, and the lux axis is rescaled to
    /// 0–100 so both axes weigh comparably. Ties keep the earlier point,
    /// so results are stable in set order.
    #[must_use]
    pub fn nearest_three(&self, lux: i64, luma: u8) -> Vec<TrainingPoint> {
        let lux_capped = lux.min(self.lux_max_seen) as f64;
        let luma = f64::from(luma);

        let mut nearest: Vec<(TrainingPoint, f64)> = Vec::with_capacity(3);
        for &point in &self.points {
            let dist_lux = (lux_capped - point.lux as f64) * 100.0 / self.lux_max_seen as f64;
            let dist_luma = luma - f64::from(point.luma);
            let dist = (dist_lux * dist_lux + dist_luma * dist_luma).sqrt();

            let rank = nearest
                .iter()
                .position(|&(_, d)| dist < d)
                .unwrap_or(nearest.len());
            if rank < 3 {
                nearest.insert(rank, (point, dist));
                nearest.truncate(3);
            }
        }

        nearest.into_iter().map(|(point, _)| point).collect()
    }

    /// Returns `true` when no points have been learned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of learned points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// All points in insertion order.
    #[must_use]
    pub fn points(&self) -> &[TrainingPoint] {
        &self.points
    }

    /// Largest lux value ever confirmed or loaded, at least 1.
    #[must_use]
    pub fn lux_max_seen(&self) -> i64 {
        self.lux_max_seen
    }
}

#[cfg(test)]
mod tests {
    use super::TrainingSet;
    use crate::point::TrainingPoint;

    #[test]
    fn insert_replaces_point_with_same_lux_and_luma() {
        let mut set = TrainingSet::new();
        set.insert(TrainingPoint::new(200, 50, 70));
        set.insert(TrainingPoint::new(200, 50, 40));

        assert_eq!(set.points(), &[TrainingPoint::new(200, 50, 40)]);
    }

    #[test]
    fn insert_prunes_superseded_points_and_keeps_consistent_ones() {
        let mut set = TrainingSet::new();
        set.insert(TrainingPoint::new(100, 50, 30));
        set.insert(TrainingPoint::new(500, 50, 60));
        // Teaching a mid-range point removes the brighter-ambient point at
        // the same luma outright; the darker-ambient dimmer point remains
        // consistent and survives.
        set.insert(TrainingPoint::new(300, 50, 80));

        assert_eq!(
            set.points(),
            &[
                TrainingPoint::new(100, 50, 30),
                TrainingPoint::new(300, 50, 80)
            ]
        );
    }

    #[test]
    fn no_pair_violates_dominance_after_inserts() {
        let mut set = TrainingSet::new();
        // A dense cube of near-identical points; every insert prunes.
        for lux in 9..=11 {
            for luma in 19..=21 {
                for backlight in 29..=31 {
                    set.insert(TrainingPoint::new(lux, luma, backlight));
                }
            }
        }

        let points = set.points();
        for (i, p) in points.iter().enumerate() {
            for (j, q) in points.iter().enumerate() {
                if i == j {
                    continue;
                }
                assert!(
                    !(p.lux == q.lux && p.luma == q.luma),
                    "duplicate key {p:?} / {q:?}"
                );
            }
        }
        // Each later point was inserted after each earlier one, so no
        // earlier point may be superseded by a later one.
        for i in 0..points.len() {
            for j in i + 1..points.len() {
                assert!(
                    !points[i].superseded_by(&points[j]),
                    "{:?} is superseded by {:?}",
                    points[i],
                    points[j]
                );
            }
        }
    }

    #[test]
    fn lux_max_seen_is_at_least_one_and_tracks_inserts() {
        let mut set = TrainingSet::new();
        assert_eq!(set.lux_max_seen(), 1);

        set.insert(TrainingPoint::new(0, 10, 20));
        assert_eq!(set.lux_max_seen(), 1);

        set.insert(TrainingPoint::new(700, 10, 20));
        assert_eq!(set.lux_max_seen(), 700);
    }

    #[test]
    fn from_points_seeds_lux_max_seen() {
        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(0, 0, 10),
            TrainingPoint::new(100, 0, 20),
        ]);
        assert_eq!(set.lux_max_seen(), 100);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn nearest_three_keeps_set_order_on_ties() {
        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(0, 0, 10),
            TrainingPoint::new(0, 100, 50),
            TrainingPoint::new(100, 0, 20),
        ]);

        // All three are equidistant from (50, 50) after lux normalization.
        let nearest = set.nearest_three(50, 50);
        assert_eq!(
            nearest,
            vec![
                TrainingPoint::new(0, 0, 10),
                TrainingPoint::new(0, 100, 50),
                TrainingPoint::new(100, 0, 20)
            ]
        );
    }

    #[test]
    fn nearest_three_orders_by_distance() {
        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(1000, 90, 80),
            TrainingPoint::new(10, 12, 30),
            TrainingPoint::new(500, 50, 60),
        ]);

        let nearest = set.nearest_three(0, 10);
        assert_eq!(nearest[0], TrainingPoint::new(10, 12, 30));
        assert_eq!(nearest[1], TrainingPoint::new(500, 50, 60));
        assert_eq!(nearest[2], TrainingPoint::new(1000, 90, 80));
    }

    #[test]
    fn nearest_three_clamps_query_lux_to_hull() {
        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(100, 50, 40),
            TrainingPoint::new(50, 50, 30),
        ]);

        // A reading far beyond anything observed behaves like the maximum.
        let far = set.nearest_three(1_000_000, 50);
        let edge = set.nearest_three(100, 50);
        assert_eq!(far, edge);
    }

    #[test]
    fn nearest_three_returns_fewer_when_set_is_small() {
        let mut set = TrainingSet::new();
        assert!(set.nearest_three(10, 10).is_empty());

        set.insert(TrainingPoint::new(5, 5, 50));
        assert_eq!(set.nearest_three(10, 10).len(), 1);
    }
}
