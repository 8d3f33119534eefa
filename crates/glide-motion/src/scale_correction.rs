//! Scale correction for styles that do not scale linearly with a transform.
//!
//! While a projection transform scales an element by `(sx, sy)`, a pixel
//! border radius or box shadow would be stretched with it. These helpers
//! rewrite such values so they look unscaled on the projected element.

use tracing::trace;

use crate::geometry::LayoutBox;
use crate::style::{format_number, split_unit};

/// What a corrector needs to know about the current projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionContext {
    /// Box the element visually occupies this frame.
    pub target: LayoutBox,
    /// Total scale applied to the element, including ancestors.
    pub scale_x: f64,
    pub scale_y: f64,
}

impl CorrectionContext {
    pub fn is_identity(&self) -> bool {
        self.scale_x == 1.0 && self.scale_y == 1.0
    }
}

/// Whether `key` needs correcting under a projection scale.
pub fn is_scale_corrected(key: &str) -> bool {
    key == "box-shadow" || is_radius_key(key)
}

fn is_radius_key(key: &str) -> bool {
    key == "border-radius" || (key.starts_with("border-") && key.ends_with("-radius"))
}

/// Correct a style value for `key`. Returns `None` when the key is not
/// corrected or the value cannot be parsed, in which case the value is
/// written as is.
pub fn correct(key: &str, value: &str, ctx: &CorrectionContext) -> Option<String> {
    if is_radius_key(key) {
        let corrected = correct_border_radius(value, &ctx.target);
        if corrected.is_none() {
            trace!(key, value, "radius left uncorrected");
        }
        corrected
    } else if key == "box-shadow" {
        Some(correct_box_shadow(value, ctx.scale_x, ctx.scale_y))
    } else {
        None
    }
}

/// Convert pixel radii into percentages of the projected box so they stay
/// visually constant under non-uniform scale.
///
/// A single length becomes `"x% y%"`. Several tokens alternate between the
/// horizontal and vertical dimension. With the elliptical `h / v` form the
/// radii before the slash are horizontal and those after it vertical.
/// Percentages pass through.
pub fn correct_border_radius(value: &str, target: &LayoutBox) -> Option<String> {
    if let Some((horizontal, vertical)) = value.split_once('/') {
        let x = radii_to_percent(horizontal, target.width())?;
        let y = radii_to_percent(vertical, target.height())?;
        return Some(format!("{} / {}", x, y));
    }

    let tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    if let [single] = tokens.as_slice() {
        let x = radius_to_percent(single, target.width())?;
        let y = radius_to_percent(single, target.height())?;
        return Some(format!("{} {}", x, y));
    }

    let mut out = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        let dimension = if i % 2 == 0 {
            target.width()
        } else {
            target.height()
        };
        out.push(radius_to_percent(token, dimension)?);
    }
    Some(out.join(" "))
}

/// Every radius in `side` against one dimension.
fn radii_to_percent(side: &str, dimension: f64) -> Option<String> {
    let tokens: Vec<&str> = side.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    let converted = tokens
        .into_iter()
        .map(|token| radius_to_percent(token, dimension))
        .collect::<Option<Vec<_>>>()?;
    Some(converted.join(" "))
}

fn radius_to_percent(token: &str, dimension: f64) -> Option<String> {
    let (n, unit) = split_unit(token)?;
    match unit {
        "%" => Some(token.to_string()),
        "" | "px" => {
            if dimension == 0.0 {
                return Some("0%".to_string());
            }
            Some(format!("{}%", format_number(n / dimension * 100.0)))
        }
        _ => None,
    }
}

/// Divide shadow offsets by the matching axis scale and blur/spread by the
/// average scale. Comma separated shadows are corrected independently;
/// commas inside color functions are left alone.
pub fn correct_box_shadow(value: &str, scale_x: f64, scale_y: f64) -> String {
    let average = (scale_x + scale_y) / 2.0;
    split_top_level(value, ',')
        .into_iter()
        .map(|shadow| correct_single_shadow(shadow.trim(), scale_x, scale_y, average))
        .collect::<Vec<_>>()
        .join(", ")
}

fn correct_single_shadow(shadow: &str, scale_x: f64, scale_y: f64, average: f64) -> String {
    let mut lengths = 0;
    split_top_level(shadow, ' ')
        .into_iter()
        .filter(|token| !token.is_empty())
        .map(|token| match split_unit(token) {
            Some((n, unit)) => {
                let divisor = match lengths {
                    0 => scale_x,
                    1 => scale_y,
                    _ => average,
                };
                lengths += 1;
                let corrected = if divisor == 0.0 || !divisor.is_finite() {
                    n
                } else {
                    n / divisor
                };
                format!("{}{}", format_number(corrected), unit)
            }
            None => token.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split on `separator` wherever it is not nested inside parentheses.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_shadow_uniform_scale() {
        assert_eq!(
            correct_box_shadow("10px 20px 5px black", 2.0, 2.0),
            "5px 10px 2.5px black"
        );
    }

    #[test]
    fn test_box_shadow_non_uniform_scale() {
        // offsets per axis, blur and spread by the average (2.0)
        assert_eq!(
            correct_box_shadow("8px 8px 4px 2px red", 1.0, 3.0),
            "8px 2.6667px 2px 1px red"
        );
    }

    #[test]
    fn test_box_shadow_multiple_with_color_functions() {
        let corrected = correct_box_shadow(
            "0px 4px 8px rgba(0, 0, 0, 0.5), inset 2px 2px 0px #fff",
            2.0,
            2.0,
        );
        assert_eq!(corrected, "0px 2px 4px rgba(0, 0, 0, 0.5), inset 1px 1px 0px #fff");
    }

    #[test]
    fn test_border_radius_single_value() {
        let target = LayoutBox::from_rect(0.0, 0.0, 200.0, 50.0);
        assert_eq!(
            correct_border_radius("10px", &target).as_deref(),
            Some("5% 20%")
        );
    }

    #[test]
    fn test_border_radius_alternates_axes() {
        let target = LayoutBox::from_rect(0.0, 0.0, 100.0, 50.0);
        assert_eq!(
            correct_border_radius("10px 10px 20% 5px", &target).as_deref(),
            Some("10% 20% 20% 10%")
        );
    }

    #[test]
    fn test_border_radius_rejects_other_units() {
        let target = LayoutBox::from_rect(0.0, 0.0, 100.0, 50.0);
        assert_eq!(correct_border_radius("1em", &target), None);
    }

    #[test]
    fn test_border_radius_elliptical_form() {
        let target = LayoutBox::from_rect(0.0, 0.0, 100.0, 50.0);
        assert_eq!(
            correct_border_radius("10px 20px / 5px", &target).as_deref(),
            Some("10% 20% / 10%")
        );
        assert_eq!(correct_border_radius("10px /", &target), None);
    }

    #[test]
    fn test_correct_dispatches_by_key() {
        let ctx = CorrectionContext {
            target: LayoutBox::from_rect(0.0, 0.0, 100.0, 100.0),
            scale_x: 2.0,
            scale_y: 2.0,
        };
        assert_eq!(correct("border-top-left-radius", "10px", &ctx).as_deref(), Some("10% 10%"));
        assert_eq!(correct("box-shadow", "2px 2px black", &ctx).as_deref(), Some("1px 1px black"));
        assert_eq!(correct("opacity", "1", &ctx), None);
        assert!(is_scale_corrected("border-radius"));
        assert!(!is_scale_corrected("border-width"));
    }
}
