// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The learned training triple and its dominance relation.

/// One user-confirmed preference: at ambient illuminance `lux` and screen
/// content brightness `luma`, the user wants backlight level `backlight`.
///
/// `lux` is non-negative and unbounded above; `luma` and `backlight` are
/// percentages in `0..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrainingPoint {
    /// Smoothed ambient illuminance at confirmation time.
    pub lux: i64,
    /// Perceived screen-content lightness percentage.
    pub luma: u8,
    /// Confirmed backlight percentage.
    pub backlight: u8,
}

impl TrainingPoint {
    /// Creates a training point.
    #[must_use]
    pub const fn new(lux: i64, luma: u8, backlight: u8) -> Self {
        Self {
            lux,
            luma,
            backlight,
        }
    }

    /// Returns `true` when `self` is superseded by the newer point `newer`
    /// and must be removed from the set.
    ///
    /// A freshly confirmed point wins over any older point that would now be
    /// inconsistent with it:
    ///
    /// - same `(lux, luma)` — exact replacement;
    /// - same `luma`, brighter ambient — the newer confirmation wins
    ///   regardless of backlight;
    /// - the four monotonicity violations (e.g. darker ambient with
    ///   equal-or-darker content must not keep a brighter backlight).
    #[must_use]
    pub fn superseded_by(&self, newer: &Self) -> bool {
        let exact_replacement = self.lux == newer.lux && self.luma == newer.luma;

        let brighter_ambient_same_content = self.lux > newer.lux && self.luma == newer.luma;

        let darker_ambient_brighter = self.lux < newer.lux
            && self.luma >= newer.luma
            && self.backlight > newer.backlight;

        let same_ambient_darker_content_dimmer = self.lux == newer.lux
            && self.luma < newer.luma
            && self.backlight < newer.backlight;

        let brighter_ambient_dimmer = self.lux > newer.lux
            && self.luma <= newer.luma
            && self.backlight < newer.backlight;

        let same_ambient_brighter_content_brighter = self.lux == newer.lux
            && self.luma > newer.luma
            && self.backlight > newer.backlight;

        exact_replacement
            || brighter_ambient_same_content
            || darker_ambient_brighter
            || same_ambient_darker_content_dimmer
            || brighter_ambient_dimmer
            || same_ambient_brighter_content_brighter
    }
}

#[cfg(test)]
mod tests {
    use super::TrainingPoint;

    #[test]
    fn exact_replacement_supersedes() {
        let old = TrainingPoint::new(200, 50, 70);
        let new = TrainingPoint::new(200, 50, 40);
        assert!(old.superseded_by(&new));
    }

    #[test]
    fn brighter_ambient_same_content_supersedes_regardless_of_backlight() {
        let new = TrainingPoint::new(300, 50, 80);
        // Higher backlight at higher lux would be consistent, but the newer
        // confirmation at the same luma still wins.
        assert!(TrainingPoint::new(500, 50, 90).superseded_by(&new));
        assert!(TrainingPoint::new(500, 50, 60).superseded_by(&new));
    }

    #[test]
    fn darker_ambient_same_content_dimmer_survives() {
        let new = TrainingPoint::new(300, 50, 80);
        assert!(!TrainingPoint::new(100, 50, 30).superseded_by(&new));
    }

    #[test]
    fn darker_ambient_brighter_backlight_is_removed() {
        let new = TrainingPoint::new(300, 50, 40);
        assert!(TrainingPoint::new(100, 50, 90).superseded_by(&new));
        assert!(TrainingPoint::new(100, 80, 90).superseded_by(&new));
    }

    #[test]
    fn same_ambient_darker_content_dimmer_is_removed() {
        let new = TrainingPoint::new(300, 50, 40);
        assert!(TrainingPoint::new(300, 20, 30).superseded_by(&new));
        assert!(!TrainingPoint::new(300, 20, 50).superseded_by(&new));
    }

    #[test]
    fn brighter_ambient_dimmer_backlight_is_removed() {
        let new = TrainingPoint::new(300, 50, 40);
        assert!(TrainingPoint::new(500, 30, 20).superseded_by(&new));
        assert!(TrainingPoint::new(500, 50, 20).superseded_by(&new));
    }

    #[test]
    fn same_ambient_brighter_content_brighter_backlight_is_removed() {
        let new = TrainingPoint::new(300, 50, 40);
        assert!(TrainingPoint::new(300, 80, 60).superseded_by(&new));
        assert!(!TrainingPoint::new(300, 80, 30).superseded_by(&new));
    }

    #[test]
    fn unrelated_quadrants_survive() {
        let new = TrainingPoint::new(300, 50, 40);
        // Darker ambient, darker content, dimmer backlight: consistent.
        assert!(!TrainingPoint::new(100, 20, 10).superseded_by(&new));
        // Brighter ambient, brighter content, brighter backlight: consistent.
        assert!(!TrainingPoint::new(500, 80, 90).superseded_by(&new));
    }
}
