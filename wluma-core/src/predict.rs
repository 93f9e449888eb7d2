// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backlight prediction by local plane interpolation.
//!
//! The three nearest training points locally approximate the learned
//! `backlight = f(lux, luma)` surface as a plane. The predicted backlight is
//! the intersection of that plane with the vertical (backlight-axis) line
//! through the query, clamped to `1..=100` so extrapolation outside the
//! triangle can never run wild.

use crate::geom::Vec3;
use crate::point::TrainingPoint;
use crate::training::TrainingSet;

fn as_vec3(point: TrainingPoint) -> Vec3 {
    Vec3::new(
        point.lux as f64,
        f64::from(point.luma),
        f64::from(point.backlight),
    )
}

/// Predicts the backlight percentage for `(lux, luma)` from the training
/// set, or `None` when the set is empty.
///
/// With fewer than three points (or three colinear ones, whose plane normal
/// is perpendicular to the backlight axis) the nearest point's backlight is
/// used as-is.
#[must_use]
pub fn predict(set: &TrainingSet, lux: i64, luma: u8) -> Option<u8> {
    let nearest = set.nearest_three(lux, luma);
    let first = *nearest.first()?;

    if nearest.len() < 3 {
        return Some(first.backlight);
    }

    let anchor = as_vec3(first);
    let edge1 = as_vec3(nearest[1]) - anchor;
    let edge2 = as_vec3(nearest[2]) - anchor;
    let normal = edge1.cross(edge2).normalized();

    // Vertical line through the query: two points with equal lux and luma,
    // backlights 0 and 100.
    let line_point = Vec3::new(lux as f64, f64::from(luma), 0.0);
    let line_direction = (Vec3::new(lux as f64, f64::from(luma), 100.0) - line_point).normalized();

    let denominator = normal.dot(line_direction);
    if denominator.abs() <= f64::EPSILON {
        return Some(first.backlight);
    }

    let scale = normal.dot(line_point - anchor) / denominator;
    let intersection = line_point - line_direction * scale;

    Some(intersection.z.round().clamp(1.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::predict;
    use crate::point::TrainingPoint;
    use crate::training::TrainingSet;

    #[test]
    fn empty_set_predicts_nothing() {
        assert_eq!(predict(&TrainingSet::new(), 100, 50), None);
    }

    #[test]
    fn single_point_is_returned_verbatim() {
        let mut set = TrainingSet::new();
        set.insert(TrainingPoint::new(300, 40, 65));
        assert_eq!(predict(&set, 9999, 0), Some(65));
    }

    #[test]
    fn two_points_fall_back_to_the_nearest() {
        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(10, 10, 20),
            TrainingPoint::new(1000, 90, 80),
        ]);
        assert_eq!(predict(&set, 0, 0), Some(20));
        assert_eq!(predict(&set, 1000, 90), Some(80));
    }

    #[test]
    fn plane_intersection_interpolates_between_three_points() {
        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(0, 0, 10),
            TrainingPoint::new(0, 100, 50),
            TrainingPoint::new(100, 0, 20),
        ]);

        // Plane through the three points evaluated at (50, 50).
        assert_eq!(predict(&set, 50, 50), Some(35));
        // At the corners the plane passes through the points themselves.
        assert_eq!(predict(&set, 0, 0), Some(10));
        assert_eq!(predict(&set, 100, 0), Some(20));
    }

    #[test]
    fn colinear_points_fall_back_to_the_nearest() {
        // Three points on one line: the cross product is perpendicular to
        // the backlight axis, so no unique intersection exists.
        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(0, 0, 10),
            TrainingPoint::new(10, 0, 20),
            TrainingPoint::new(20, 0, 30),
        ]);
        assert_eq!(predict(&set, 0, 0), Some(10));
    }

    #[test]
    fn prediction_is_clamped_to_valid_backlight_range() {
        // A steep plane extrapolated far outside the triangle.
        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(0, 0, 1),
            TrainingPoint::new(10, 0, 90),
            TrainingPoint::new(0, 10, 90),
        ]);
        assert_eq!(predict(&set, 100, 100), Some(100));

        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(0, 100, 90),
            TrainingPoint::new(10, 100, 2),
            TrainingPoint::new(0, 90, 2),
        ]);
        let target = predict(&set, 100, 0).unwrap();
        assert!((1..=100).contains(&target));
    }
}
