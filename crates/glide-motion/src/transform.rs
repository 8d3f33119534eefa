//! CSS transform strings.
//!
//! Two transforms meet on every projected element:
//! - the *motion* transform, built from animated shorthands (`x`, `scale`,
//!   `rotate`, ...) in a fixed order: translate, scale, rotate, skew
//! - the *projection* transform, built from a layout `Delta`
//!
//! The projection is written first so it moves and scales the element's
//! layout box, and the motion transform then applies inside that space.

use std::collections::BTreeMap;

use crate::geometry::Delta;
use crate::style::{TRANSFORM_ORDER, css_value, format_number, numeric, transform_identity};
use crate::value::Value;

/// Build the motion transform from shorthand values. Shorthands at their
/// resting value are omitted; `None` means no transform is needed.
pub fn build_motion_transform(values: &BTreeMap<String, Value>) -> Option<String> {
    let mut parts = Vec::new();
    for key in TRANSFORM_ORDER {
        let Some(value) = values.get(key) else {
            continue;
        };
        if numeric(value) == Some(transform_identity(key)) {
            continue;
        }
        let function = match key {
            "x" => "translateX",
            "y" => "translateY",
            "z" => "translateZ",
            other => other,
        };
        parts.push(format!("{}({})", function, css_value(key, value)));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Build the projection transform for `delta`. Translation is divided by
/// the accumulated ancestor scale because it is applied inside the
/// ancestors' scaled coordinate space.
pub fn build_projection_transform(delta: &Delta, tree_scale: (f64, f64)) -> Option<String> {
    if delta.is_identity() {
        return None;
    }
    let divide = |n: f64, by: f64| if by == 0.0 { n } else { n / by };
    let tx = divide(delta.x.translate, tree_scale.0);
    let ty = divide(delta.y.translate, tree_scale.1);

    let mut out = String::new();
    if tx != 0.0 || ty != 0.0 {
        out.push_str(&format!(
            "translate3d({}px, {}px, 0)",
            format_number(tx),
            format_number(ty)
        ));
    }
    if delta.x.scale != 1.0 || delta.y.scale != 1.0 {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!(
            "scale({}, {})",
            format_number(delta.x.scale),
            format_number(delta.y.scale)
        ));
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Compose projection and motion transforms into one `transform` value.
pub fn compose(projection: Option<&str>, motion: Option<&str>) -> Option<String> {
    match (projection, motion) {
        (Some(p), Some(m)) => Some(format!("{} {}", p, m)),
        (Some(p), None) => Some(p.to_string()),
        (None, Some(m)) => Some(m.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{LayoutBox, calc_box_delta};

    fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_motion_transform_order_and_units() {
        let transform = build_motion_transform(&values(&[
            ("rotate", Value::Number(45.0)),
            ("x", Value::Number(10.0)),
            ("scale", Value::Number(1.5)),
            ("y", Value::from("50%")),
        ]));
        assert_eq!(
            transform.as_deref(),
            Some("translateX(10px) translateY(50%) scale(1.5) rotate(45deg)")
        );
    }

    #[test]
    fn test_motion_transform_skips_identity() {
        let transform = build_motion_transform(&values(&[
            ("x", Value::Number(0.0)),
            ("scale", Value::Number(1.0)),
        ]));
        assert_eq!(transform, None);
    }

    #[test]
    fn test_projection_transform() {
        let mut delta = Delta::default();
        let layout = LayoutBox::from_rect(100.0, 0.0, 100.0, 100.0);
        let target = LayoutBox::from_rect(0.0, 0.0, 200.0, 100.0);
        calc_box_delta(&mut delta, &layout, &target, (0.5, 0.5));

        assert_eq!(
            build_projection_transform(&delta, (1.0, 1.0)).as_deref(),
            Some("translate3d(-50px, 0px, 0) scale(2, 1)")
        );
        assert_eq!(
            build_projection_transform(&delta, (2.0, 1.0)).as_deref(),
            Some("translate3d(-25px, 0px, 0) scale(2, 1)")
        );
        assert_eq!(build_projection_transform(&Delta::default(), (1.0, 1.0)), None);
    }

    #[test]
    fn test_compose() {
        assert_eq!(
            compose(Some("scale(2, 2)"), Some("rotate(5deg)")).as_deref(),
            Some("scale(2, 2) rotate(5deg)")
        );
        assert_eq!(compose(None, None), None);
    }
}
