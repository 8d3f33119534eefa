//! Geometry kernel for layout projection.
//!
//! This module defines the box model used by the projection tree:
//! - `Axis`: one-dimensional extent (`min..max`)
//! - `LayoutBox`: a pair of axes describing a measured rectangle
//! - `AxisDelta` / `Delta`: the translate+scale mapping one box onto another
//!
//! All functions here are pure. Degenerate input (zero-length source axes)
//! is normalized to identity scale so `NaN`/`Infinity` never leak out.
//!
//! # Usage
//!
//! ```
//! use glide_motion::geometry::{apply_box_delta, calc_box_delta, Delta, LayoutBox};
//!
//! let before = LayoutBox::from_rect(0.0, 0.0, 100.0, 100.0);
//! let after = LayoutBox::from_rect(50.0, 0.0, 200.0, 100.0);
//!
//! let mut delta = Delta::default();
//! calc_box_delta(&mut delta, &before, &after, (0.5, 0.5));
//!
//! let mut projected = before;
//! apply_box_delta(&mut projected, &delta);
//! assert!((projected.x.min - 50.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

/// Deltas closer than this to their identity value are snapped to identity.
pub const DELTA_EPSILON: f64 = 1e-4;

/// Origin fraction used when none is given (the centre of the axis).
pub const DEFAULT_ORIGIN: f64 = 0.5;

/// One-dimensional extent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
}

impl Axis {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Length of the axis (`max - min`).
    #[inline]
    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    /// Point at `fraction` along the axis.
    #[inline]
    pub fn point_at(&self, fraction: f64) -> f64 {
        mix(self.min, self.max, fraction)
    }

    /// Shift both edges by `distance`.
    pub fn translate(&mut self, distance: f64) {
        self.min += distance;
        self.max += distance;
    }
}

/// A measured 2D rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutBox {
    pub x: Axis,
    pub y: Axis,
}

impl LayoutBox {
    pub fn new(x: Axis, y: Axis) -> Self {
        Self { x, y }
    }

    /// Build a box from a top-left corner and a size.
    pub fn from_rect(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            x: Axis::new(left, left + width),
            y: Axis::new(top, top + height),
        }
    }

    pub fn width(&self) -> f64 {
        self.x.length()
    }

    pub fn height(&self) -> f64 {
        self.y.length()
    }

    /// Offset of this box's top-left corner relative to `other`'s.
    pub fn offset_from(&self, other: &LayoutBox) -> (f64, f64) {
        (self.x.min - other.x.min, self.y.min - other.y.min)
    }

    /// Copy of this box resized so each axis keeps its `min` but takes the
    /// length of the matching axis in `size_of`.
    pub fn with_size_of(&self, size_of: &LayoutBox) -> LayoutBox {
        LayoutBox {
            x: Axis::new(self.x.min, self.x.min + size_of.width()),
            y: Axis::new(self.y.min, self.y.min + size_of.height()),
        }
    }
}

/// Affine mapping of one axis onto another about an origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisDelta {
    pub translate: f64,
    pub scale: f64,
    /// Origin as a fraction of the source axis.
    pub origin: f64,
    /// Origin resolved to an absolute coordinate on the source axis.
    pub origin_point: f64,
}

impl Default for AxisDelta {
    fn default() -> Self {
        Self {
            translate: 0.0,
            scale: 1.0,
            origin: DEFAULT_ORIGIN,
            origin_point: 0.0,
        }
    }
}

impl AxisDelta {
    pub fn is_identity(&self) -> bool {
        self.translate == 0.0 && self.scale == 1.0
    }
}

/// Per-axis deltas mapping one box onto another.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Delta {
    pub x: AxisDelta,
    pub y: AxisDelta,
}

impl Delta {
    pub fn is_identity(&self) -> bool {
        self.x.is_identity() && self.y.is_identity()
    }
}

/// Linear mix between `from` and `to`.
#[inline]
pub fn mix(from: f64, to: f64, progress: f64) -> f64 {
    from + (to - from) * progress
}

#[inline]
fn is_near(value: f64, target: f64) -> bool {
    (value - target).abs() <= DELTA_EPSILON
}

/// Compute the delta that maps `source` onto `target` about `origin`.
///
/// Scale within `DELTA_EPSILON` of 1 snaps to exactly 1, translate within
/// `DELTA_EPSILON` of 0 snaps to 0, and non-finite results (a zero-length
/// source) are treated as identity.
pub fn calc_axis_delta(delta: &mut AxisDelta, source: &Axis, target: &Axis, origin: f64) {
    delta.origin = origin;
    delta.origin_point = source.point_at(origin);

    let scale = target.length() / source.length();
    delta.scale = if !scale.is_finite() || is_near(scale, 1.0) {
        1.0
    } else {
        scale
    };

    let translate = target.point_at(origin) - delta.origin_point;
    delta.translate = if !translate.is_finite() || is_near(translate, 0.0) {
        0.0
    } else {
        translate
    };
}

/// Compute per-axis deltas mapping `source` onto `target`.
pub fn calc_box_delta(delta: &mut Delta, source: &LayoutBox, target: &LayoutBox, origin: (f64, f64)) {
    calc_axis_delta(&mut delta.x, &source.x, &target.x, origin.0);
    calc_axis_delta(&mut delta.y, &source.y, &target.y, origin.1);
}

/// Scale `point` about `origin_point` by `scale`.
#[inline]
pub fn scale_point(point: f64, scale: f64, origin_point: f64) -> f64 {
    origin_point + (point - origin_point) * scale
}

/// Apply a translate+scale to a single point.
#[inline]
pub fn apply_point_delta(point: f64, translate: f64, scale: f64, origin_point: f64) -> f64 {
    scale_point(point, scale, origin_point) + translate
}

/// Transform an axis in place: scale about `origin_point`, then translate.
pub fn apply_axis_delta(axis: &mut Axis, translate: f64, scale: f64, origin_point: f64) {
    axis.min = apply_point_delta(axis.min, translate, scale, origin_point);
    axis.max = apply_point_delta(axis.max, translate, scale, origin_point);
}

/// Transform a box in place by a previously computed `Delta`.
pub fn apply_box_delta(layout_box: &mut LayoutBox, delta: &Delta) {
    apply_axis_delta(
        &mut layout_box.x,
        delta.x.translate,
        delta.x.scale,
        delta.x.origin_point,
    );
    apply_axis_delta(
        &mut layout_box.y,
        delta.y.translate,
        delta.y.scale,
        delta.y.origin_point,
    );
}

/// Apply a chain of ancestor deltas (root first) to `layout_box` and return
/// the accumulated scale per axis.
pub fn apply_tree_deltas<'a>(
    layout_box: &mut LayoutBox,
    ancestors: impl IntoIterator<Item = &'a Delta>,
) -> (f64, f64) {
    let mut tree_scale = (1.0, 1.0);
    for delta in ancestors {
        apply_box_delta(layout_box, delta);
        tree_scale.0 *= delta.x.scale;
        tree_scale.1 *= delta.y.scale;
    }
    tree_scale
}

/// Mix two axes edge by edge.
pub fn mix_axis(from: &Axis, to: &Axis, progress: f64) -> Axis {
    Axis::new(mix(from.min, to.min, progress), mix(from.max, to.max, progress))
}

/// Mix two boxes edge by edge.
pub fn mix_box(from: &LayoutBox, to: &LayoutBox, progress: f64) -> LayoutBox {
    LayoutBox::new(
        mix_axis(&from.x, &to.x, progress),
        mix_axis(&from.y, &to.y, progress),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-6;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    fn delta_for(source: Axis, target: Axis) -> AxisDelta {
        let mut delta = AxisDelta::default();
        calc_axis_delta(&mut delta, &source, &target, DEFAULT_ORIGIN);
        delta
    }

    #[test]
    fn test_identity_delta() {
        let delta = delta_for(Axis::new(0.0, 100.0), Axis::new(0.0, 100.0));
        assert_eq!(delta.scale, 1.0);
        assert_eq!(delta.translate, 0.0);
        assert!(delta.is_identity());
    }

    #[test]
    fn test_translate_only_delta() {
        let delta = delta_for(Axis::new(0.0, 100.0), Axis::new(50.0, 150.0));
        assert_eq!(delta.scale, 1.0);
        assert!(approx_eq(delta.translate, 50.0));
    }

    #[test]
    fn test_scale_only_delta() {
        let delta = delta_for(Axis::new(0.0, 100.0), Axis::new(0.0, 200.0));
        assert!(approx_eq(delta.scale, 2.0));
        assert!(approx_eq(delta.origin_point, 50.0));
        assert!(approx_eq(delta.translate, 50.0));
    }

    #[test]
    fn test_zero_length_source_is_identity_scale() {
        let delta = delta_for(Axis::new(10.0, 10.0), Axis::new(0.0, 200.0));
        assert_eq!(delta.scale, 1.0);
        assert!(delta.translate.is_finite());

        let degenerate = delta_for(Axis::new(10.0, 10.0), Axis::new(10.0, 10.0));
        assert_eq!(degenerate.scale, 1.0);
        assert_eq!(degenerate.translate, 0.0);
    }

    #[test]
    fn test_near_identity_is_clamped() {
        let delta = delta_for(Axis::new(0.0, 100.0), Axis::new(0.00001, 100.00001));
        assert_eq!(delta.scale, 1.0);
        assert_eq!(delta.translate, 0.0);
    }

    #[test]
    fn test_round_trip_reproduces_target() {
        let pairs = [
            (Axis::new(0.0, 100.0), Axis::new(50.0, 150.0)),
            (Axis::new(0.0, 100.0), Axis::new(0.0, 200.0)),
            (Axis::new(-40.0, 10.0), Axis::new(300.0, 301.5)),
            (Axis::new(12.5, 80.25), Axis::new(-90.0, 400.0)),
            (Axis::new(1000.0, 1003.0), Axis::new(2.0, 7.0)),
        ];

        for origin in [0.0, 0.25, 0.5, 1.0] {
            for (source, target) in pairs {
                let mut delta = AxisDelta::default();
                calc_axis_delta(&mut delta, &source, &target, origin);
                let mut projected = source;
                apply_axis_delta(&mut projected, delta.translate, delta.scale, delta.origin_point);
                assert!(
                    approx_eq(projected.min, target.min) && approx_eq(projected.max, target.max),
                    "origin {origin}: {source:?} -> {target:?} gave {projected:?}"
                );
            }
        }
    }

    #[test]
    fn test_box_delta_per_axis() {
        let source = LayoutBox::from_rect(0.0, 0.0, 100.0, 50.0);
        let target = LayoutBox::from_rect(20.0, 10.0, 100.0, 100.0);
        let mut delta = Delta::default();
        calc_box_delta(&mut delta, &source, &target, (0.5, 0.5));

        assert_eq!(delta.x.scale, 1.0);
        assert!(approx_eq(delta.x.translate, 20.0));
        assert!(approx_eq(delta.y.scale, 2.0));

        let mut projected = source;
        apply_box_delta(&mut projected, &delta);
        assert!(approx_eq(projected.y.min, 10.0));
        assert!(approx_eq(projected.y.max, 110.0));
    }

    #[test]
    fn test_tree_deltas_accumulate_scale() {
        let mut parent = Delta::default();
        calc_box_delta(
            &mut parent,
            &LayoutBox::from_rect(0.0, 0.0, 100.0, 100.0),
            &LayoutBox::from_rect(0.0, 0.0, 200.0, 50.0),
            (0.5, 0.5),
        );

        let mut child_box = LayoutBox::from_rect(25.0, 25.0, 50.0, 50.0);
        let scale = apply_tree_deltas(&mut child_box, [&parent, &parent]);
        assert!(approx_eq(scale.0, 4.0));
        assert!(approx_eq(scale.1, 0.25));
    }

    #[test]
    fn test_mix_box() {
        let from = LayoutBox::from_rect(0.0, 0.0, 100.0, 100.0);
        let to = LayoutBox::from_rect(100.0, 50.0, 200.0, 100.0);
        let mid = mix_box(&from, &to, 0.5);
        assert!(approx_eq(mid.x.min, 50.0));
        assert!(approx_eq(mid.x.max, 200.0));
        assert!(approx_eq(mid.y.min, 25.0));
    }

    #[test]
    fn test_with_size_of_keeps_position() {
        let from = LayoutBox::from_rect(10.0, 20.0, 100.0, 100.0);
        let to = LayoutBox::from_rect(300.0, 0.0, 40.0, 60.0);
        let resized = from.with_size_of(&to);
        assert_eq!(resized, LayoutBox::from_rect(10.0, 20.0, 40.0, 60.0));
    }
}
