//! Composable image filters.
//!
//! A [`FilterExpression`] is an ordered chain of colour operations with the
//! same semantics as the CSS `filter` property: each operation is a 3x4
//! affine colour matrix over linear `[0, 1]` RGB, applied in order with the
//! result clamped after every step.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// One step of a filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "amount", rename_all = "kebab-case")]
pub enum FilterOp {
    /// Multiply every channel (`1.0` = unchanged).
    Brightness(f32),
    /// Scale around mid-grey (`1.0` = unchanged).
    Contrast(f32),
    /// Saturation factor (`0.0` = grey, `1.0` = unchanged).
    Saturate(f32),
    /// Hue rotation in degrees.
    HueRotate(f32),
    /// Grayscale amount in `[0, 1]`.
    Grayscale(f32),
    /// Sepia amount in `[0, 1]`.
    Sepia(f32),
    /// Inversion amount in `[0, 1]`.
    Invert(f32),
}

/// Row-major 3x4 affine colour matrix: `out = M[..3] * rgb + M[3]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix(pub [[f32; 4]; 3]);

impl ColorMatrix {
    pub const IDENTITY: ColorMatrix = ColorMatrix([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ]);

    fn diagonal(scale: f32, offset: f32) -> Self {
        ColorMatrix([
            [scale, 0.0, 0.0, offset],
            [0.0, scale, 0.0, offset],
            [0.0, 0.0, scale, offset],
        ])
    }

    fn linear(rows: [[f32; 3]; 3]) -> Self {
        ColorMatrix([
            [rows[0][0], rows[0][1], rows[0][2], 0.0],
            [rows[1][0], rows[1][1], rows[1][2], 0.0],
            [rows[2][0], rows[2][1], rows[2][2], 0.0],
        ])
    }

    /// Apply to a normalized RGB triple, clamping the result to `[0, 1]`.
    #[inline]
    pub fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        let m = &self.0;
        let mut out = [0.0f32; 3];
        for (row, value) in m.iter().zip(out.iter_mut()) {
            *value =
                (row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2] + row[3]).clamp(0.0, 1.0);
        }
        out
    }
}

impl FilterOp {
    /// The colour matrix this operation applies.
    pub fn color_matrix(&self) -> ColorMatrix {
        match *self {
            FilterOp::Brightness(b) => ColorMatrix::diagonal(b.max(0.0), 0.0),
            FilterOp::Contrast(c) => {
                let c = c.max(0.0);
                ColorMatrix::diagonal(c, 0.5 - 0.5 * c)
            }
            FilterOp::Saturate(s) => {
                let s = s.max(0.0);
                ColorMatrix::linear([
                    [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
                    [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
                    [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
                ])
            }
            FilterOp::HueRotate(deg) => {
                let (sin, cos) = deg.to_radians().sin_cos();
                ColorMatrix::linear([
                    [
                        0.213 + cos * 0.787 - sin * 0.213,
                        0.715 - cos * 0.715 - sin * 0.715,
                        0.072 - cos * 0.072 + sin * 0.928,
                    ],
                    [
                        0.213 - cos * 0.213 + sin * 0.143,
                        0.715 + cos * 0.285 + sin * 0.140,
                        0.072 - cos * 0.072 - sin * 0.283,
                    ],
                    [
                        0.213 - cos * 0.213 - sin * 0.787,
                        0.715 - cos * 0.715 + sin * 0.715,
                        0.072 + cos * 0.928 + sin * 0.072,
                    ],
                ])
            }
            FilterOp::Grayscale(amount) => {
                let a = 1.0 - amount.clamp(0.0, 1.0);
                ColorMatrix::linear([
                    [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
                    [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
                    [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
                ])
            }
            FilterOp::Sepia(amount) => {
                let a = 1.0 - amount.clamp(0.0, 1.0);
                ColorMatrix::linear([
                    [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
                    [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
                    [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
                ])
            }
            FilterOp::Invert(amount) => {
                let a = amount.clamp(0.0, 1.0);
                ColorMatrix::diagonal(1.0 - 2.0 * a, a)
            }
        }
    }

    fn css_name(&self) -> &'static str {
        match self {
            FilterOp::Brightness(_) => "brightness",
            FilterOp::Contrast(_) => "contrast",
            FilterOp::Saturate(_) => "saturate",
            FilterOp::HueRotate(_) => "hue-rotate",
            FilterOp::Grayscale(_) => "grayscale",
            FilterOp::Sepia(_) => "sepia",
            FilterOp::Invert(_) => "invert",
        }
    }

    fn amount(&self) -> f32 {
        match *self {
            FilterOp::Brightness(v)
            | FilterOp::Contrast(v)
            | FilterOp::Saturate(v)
            | FilterOp::HueRotate(v)
            | FilterOp::Grayscale(v)
            | FilterOp::Sepia(v)
            | FilterOp::Invert(v) => v,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::HueRotate(deg) => write!(f, "hue-rotate({deg}deg)"),
            op => write!(f, "{}({})", op.css_name(), op.amount()),
        }
    }
}

/// An ordered chain of filter operations. The empty chain is the identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterExpression {
    ops: Vec<FilterOp>,
}

impl FilterExpression {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(ops: Vec<FilterOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[FilterOp] {
        &self.ops
    }

    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }

    /// Matrices in application order, ready for per-pixel use.
    pub fn compile(&self) -> Vec<ColorMatrix> {
        self.ops.iter().map(FilterOp::color_matrix).collect()
    }

    /// Run a single normalized RGB triple through the chain.
    pub fn apply_rgb(&self, rgb: [f32; 3]) -> [f32; 3] {
        self.compile()
            .iter()
            .fold(rgb, |acc, matrix| matrix.apply(acc))
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return write!(f, "none");
        }
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

impl FromStr for FilterExpression {
    type Err = ModelError;

    /// Parse CSS `filter` syntax, e.g. `"contrast(1.2) saturate(150%)"`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| ModelError::InvalidFilterExpression {
            input: input.to_string(),
            message,
        };

        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::identity());
        }

        let mut ops = Vec::new();
        let mut rest = trimmed;
        while !rest.is_empty() {
            let open = rest
                .find('(')
                .ok_or_else(|| invalid(format!("expected '(' in '{rest}'")))?;
            let close = rest
                .find(')')
                .ok_or_else(|| invalid(format!("unterminated '{rest}'")))?;
            if close < open {
                return Err(invalid(format!("unbalanced parentheses in '{rest}'")));
            }

            let name = rest[..open].trim().to_ascii_lowercase();
            let arg = rest[open + 1..close].trim();
            ops.push(parse_op(&name, arg).map_err(invalid)?);
            rest = rest[close + 1..].trim_start();
        }

        Ok(Self { ops })
    }
}

fn parse_op(name: &str, arg: &str) -> Result<FilterOp, String> {
    if name == "hue-rotate" {
        let value = if let Some(deg) = arg.strip_suffix("deg") {
            parse_number(deg)?
        } else if let Some(turn) = arg.strip_suffix("turn") {
            parse_number(turn)? * 360.0
        } else if let Some(rad) = arg.strip_suffix("rad") {
            parse_number(rad)?.to_degrees()
        } else {
            parse_number(arg)?
        };
        return Ok(FilterOp::HueRotate(value));
    }

    let amount = match arg.strip_suffix('%') {
        Some(pct) => parse_number(pct)? / 100.0,
        None => parse_number(arg)?,
    };
    if amount < 0.0 {
        return Err(format!("negative amount for {name}"));
    }

    match name {
        "brightness" => Ok(FilterOp::Brightness(amount)),
        "contrast" => Ok(FilterOp::Contrast(amount)),
        "saturate" => Ok(FilterOp::Saturate(amount)),
        "grayscale" => Ok(FilterOp::Grayscale(amount)),
        "sepia" => Ok(FilterOp::Sepia(amount)),
        "invert" => Ok(FilterOp::Invert(amount)),
        other => Err(format!("unknown filter function '{other}'")),
    }
}

fn parse_number(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a number"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("'{s}' is not finite"))
    }
}

/// An immutable, named catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub name: String,
    pub expression: FilterExpression,
}

impl FilterSpec {
    /// Name of the identity filter.
    pub const IDENTITY_NAME: &'static str = "none";

    pub fn new(name: impl Into<String>, expression: FilterExpression) -> Self {
        Self {
            name: name.into(),
            expression,
        }
    }

    pub fn identity() -> Self {
        Self::new(Self::IDENTITY_NAME, FilterExpression::identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-3)
    }

    #[test]
    fn identity_leaves_pixels_untouched() {
        let expr = FilterExpression::identity();
        assert!(expr.is_identity());
        assert_eq!(expr.apply_rgb([0.1, 0.5, 0.9]), [0.1, 0.5, 0.9]);
    }

    #[test]
    fn neutral_amounts_are_no_ops() {
        let expr: FilterExpression =
            "brightness(1) contrast(1) saturate(1) hue-rotate(0deg) grayscale(0) sepia(0) invert(0)"
                .parse()
                .unwrap();
        assert!(close(expr.apply_rgb([0.2, 0.4, 0.6]), [0.2, 0.4, 0.6]));
    }

    #[test]
    fn grayscale_equalizes_channels() {
        let out = FilterOp::Grayscale(1.0).color_matrix().apply([1.0, 0.0, 0.0]);
        assert!(close(out, [0.2126, 0.2126, 0.2126]));
    }

    #[test]
    fn contrast_pivots_on_mid_grey() {
        let m = FilterOp::Contrast(2.0).color_matrix();
        assert!(close(m.apply([0.5, 0.5, 0.5]), [0.5, 0.5, 0.5]));
        assert!(close(m.apply([0.75, 0.25, 1.0]), [1.0, 0.0, 1.0]));
    }

    #[test]
    fn invert_flips_channels() {
        let out = FilterOp::Invert(1.0).color_matrix().apply([0.0, 0.25, 1.0]);
        assert!(close(out, [1.0, 0.75, 0.0]));
    }

    #[test]
    fn hue_rotate_full_turn_is_identity() {
        let out = FilterOp::HueRotate(360.0).color_matrix().apply([0.3, 0.6, 0.1]);
        assert!(close(out, [0.3, 0.6, 0.1]));
    }

    #[test]
    fn parses_percent_and_units() {
        let expr: FilterExpression = "saturate(150%) hue-rotate(0.5turn) CONTRAST(1.2)"
            .parse()
            .unwrap();
        assert_eq!(
            expr.ops(),
            &[
                FilterOp::Saturate(1.5),
                FilterOp::HueRotate(180.0),
                FilterOp::Contrast(1.2)
            ]
        );
    }

    #[test]
    fn display_round_trips_through_parser() {
        let expr = FilterExpression::new(vec![FilterOp::Sepia(0.5), FilterOp::HueRotate(-15.0)]);
        assert_eq!(expr.to_string(), "sepia(0.5) hue-rotate(-15deg)");
        assert_eq!(expr.to_string().parse::<FilterExpression>().unwrap(), expr);
        assert_eq!(FilterExpression::identity().to_string(), "none");
        assert!("none".parse::<FilterExpression>().unwrap().is_identity());
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["blur(3px)", "contrast(", "contrast(abc)", "saturate(-1)", "sepia"] {
            assert!(bad.parse::<FilterExpression>().is_err(), "{bad} should fail");
        }
    }
}
