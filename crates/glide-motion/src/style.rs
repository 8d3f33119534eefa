//! Style keys, CSS value formatting, and write suppression.
//!
//! Property names reach the engine in several spellings (`x`,
//! `translateX`, `translate-x`, `backgroundColor`, `background-color`).
//! Everything is normalized with [`canonical_key`] before lookup so one
//! logical property is stored and animated once.

use std::collections::HashMap;

use crate::host::ElementHandle;
use crate::value::Value;

/// Transform shorthand keys in the order they are composed into the
/// `transform` string: translate, scale, rotate, skew.
pub const TRANSFORM_ORDER: [&str; 12] = [
    "x", "y", "z", "scale", "scaleX", "scaleY", "rotate", "rotateX", "rotateY", "skew", "skewX",
    "skewY",
];

/// Normalize a property name.
///
/// Transform shorthands map to their short camel form (`translate-x` to
/// `x`, `rotateZ` to `rotate`), CSS custom properties are kept verbatim,
/// and any other camelCase name becomes kebab-case.
pub fn canonical_key(name: &str) -> String {
    if name.starts_with("--") {
        return name.to_string();
    }

    let compact: String = name
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    let shorthand = match compact.as_str() {
        "x" | "translatex" => Some("x"),
        "y" | "translatey" => Some("y"),
        "z" | "translatez" => Some("z"),
        "scale" => Some("scale"),
        "scalex" => Some("scaleX"),
        "scaley" => Some("scaleY"),
        "rotate" | "rotatez" => Some("rotate"),
        "rotatex" => Some("rotateX"),
        "rotatey" => Some("rotateY"),
        "skew" => Some("skew"),
        "skewx" => Some("skewX"),
        "skewy" => Some("skewY"),
        _ => None,
    };
    if let Some(key) = shorthand {
        return key.to_string();
    }

    let mut kebab = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch == '_' {
            kebab.push('-');
        } else if ch.is_ascii_uppercase() {
            kebab.push('-');
            kebab.push(ch.to_ascii_lowercase());
        } else {
            kebab.push(ch);
        }
    }
    kebab
}

pub fn is_transform_key(key: &str) -> bool {
    TRANSFORM_ORDER.contains(&key)
}

pub fn is_custom_property(key: &str) -> bool {
    key.starts_with("--")
}

/// Unit appended to plain numbers for `key`.
pub fn default_unit(key: &str) -> &'static str {
    match key {
        "x" | "y" | "z" => "px",
        "rotate" | "rotateX" | "rotateY" | "skew" | "skewX" | "skewY" => "deg",
        "scale" | "scaleX" | "scaleY" | "opacity" | "z-index" | "flex-grow" | "flex-shrink"
        | "order" | "font-weight" | "line-height" | "zoom" => "",
        k if is_custom_property(k) => "",
        k if k.contains("color") => "",
        _ => "px",
    }
}

/// Resting value of a transform shorthand.
pub fn transform_identity(key: &str) -> f64 {
    match key {
        "scale" | "scaleX" | "scaleY" => 1.0,
        _ => 0.0,
    }
}

/// Render a value as CSS text for `key`.
pub fn css_value(key: &str, value: &Value) -> String {
    match value {
        Value::Number(n) => format!("{}{}", format_number(*n), default_unit(key)),
        Value::Text(text) => text.clone(),
    }
}

/// Format a number for CSS, rounded to four decimals without trailing zeros.
pub fn format_number(n: f64) -> String {
    let rounded = (n * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 {
        // Avoid "-0".
        return "0".to_string();
    }
    format!("{}", rounded)
}

/// Split `"12.5px"` into `(12.5, "px")`. The unit must be alphabetic or `%`.
pub fn split_unit(text: &str) -> Option<(f64, &str)> {
    let text = text.trim();
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end = 1;
    }
    let digits_start = end;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    if end == digits_start || (seen_dot && end == digits_start + 1) {
        return None;
    }
    let number = text[..end].parse::<f64>().ok()?;
    let unit = &text[end..];
    if unit.chars().all(|c| c.is_ascii_alphabetic() || c == '%') {
        Some((number, unit))
    } else {
        None
    }
}

/// Numeric value of a style entry, ignoring its unit.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Text(text) => split_unit(text).map(|(n, _)| n),
    }
}

/// Inline style writer that skips writes equal to the last applied value.
#[derive(Debug, Default)]
pub struct StyleWriter {
    applied: HashMap<String, Option<String>>,
    writes: usize,
}

impl StyleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` (or remove the property when `None`). Returns whether
    /// the element was touched.
    pub fn write(&mut self, element: &dyn ElementHandle, name: &str, value: Option<&str>) -> bool {
        let unchanged = match self.applied.get(name) {
            Some(last) => last.as_deref() == value,
            // Removing a property that was never written is a no-op.
            None => value.is_none(),
        };
        if unchanged {
            return false;
        }
        element.set_style(name, value);
        self.applied
            .insert(name.to_string(), value.map(str::to_string));
        self.writes += 1;
        true
    }

    /// Last value written for `name`, if any.
    pub fn applied(&self, name: &str) -> Option<&str> {
        self.applied.get(name).and_then(|v| v.as_deref())
    }

    /// Number of writes that reached the element.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DetachedElement;

    #[test]
    fn test_canonical_key_shorthands() {
        assert_eq!(canonical_key("x"), "x");
        assert_eq!(canonical_key("translateX"), "x");
        assert_eq!(canonical_key("translate-x"), "x");
        assert_eq!(canonical_key("scale-x"), "scaleX");
        assert_eq!(canonical_key("rotateZ"), "rotate");
        assert_eq!(canonical_key("skewY"), "skewY");
    }

    #[test]
    fn test_canonical_key_css_names() {
        assert_eq!(canonical_key("backgroundColor"), "background-color");
        assert_eq!(canonical_key("background-color"), "background-color");
        assert_eq!(canonical_key("borderTopLeftRadius"), "border-top-left-radius");
        assert_eq!(canonical_key("--accentColor"), "--accentColor");
    }

    #[test]
    fn test_css_value_units() {
        assert_eq!(css_value("x", &Value::Number(10.0)), "10px");
        assert_eq!(css_value("rotate", &Value::Number(45.0)), "45deg");
        assert_eq!(css_value("opacity", &Value::Number(0.5)), "0.5");
        assert_eq!(css_value("width", &Value::Text("50%".into())), "50%");
    }

    #[test]
    fn test_split_unit() {
        assert_eq!(split_unit("12.5px"), Some((12.5, "px")));
        assert_eq!(split_unit("-3"), Some((-3.0, "")));
        assert_eq!(split_unit("50%"), Some((50.0, "%")));
        assert_eq!(split_unit("red"), None);
        assert_eq!(split_unit("1px 2px"), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.00001), "0");
        assert_eq!(format_number(1.0 / 3.0), "0.3333");
    }

    #[test]
    fn test_style_writer_suppresses_repeats() {
        let element = DetachedElement::new(Default::default());
        let mut writer = StyleWriter::new();

        assert!(writer.write(&element, "opacity", Some("0.5")));
        assert!(!writer.write(&element, "opacity", Some("0.5")));
        assert!(writer.write(&element, "opacity", Some("1")));
        assert!(!writer.write(&element, "transform", None));
        assert!(writer.write(&element, "opacity", None));

        assert_eq!(writer.writes(), 3);
        assert_eq!(element.style_writes(), 3);
        assert_eq!(element.style("opacity"), None);
    }
}
