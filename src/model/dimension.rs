//! Image dimensions with units.

use crate::error::{Error, Result};
use std::str::FromStr;

/// Length units accepted in dimension strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// CSS pixel, 1/96 inch
    Px,
    /// Point, 1/72 inch
    Pt,
    /// Pica, 12 points
    Pc,
    /// Millimetre
    Mm,
    /// Centimetre
    Cm,
    /// Inch
    In,
    /// English Metric Unit, the native DrawingML unit
    Emu,
}

impl Unit {
    /// EMUs in one unit.
    pub fn emu_per_unit(&self) -> f64 {
        match self {
            Unit::Px => 9_525.0,
            Unit::Pt => 12_700.0,
            Unit::Pc => 152_400.0,
            Unit::Mm => 36_000.0,
            Unit::Cm => 360_000.0,
            Unit::In => 914_400.0,
            Unit::Emu => 1.0,
        }
    }

    /// Unit suffix as written in dimension strings.
    pub fn suffix(&self) -> &'static str {
        match self {
            Unit::Px => "px",
            Unit::Pt => "pt",
            Unit::Pc => "pc",
            Unit::Mm => "mm",
            Unit::Cm => "cm",
            Unit::In => "in",
            Unit::Emu => "emu",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "" | "px" => Some(Unit::Px),
            "pt" => Some(Unit::Pt),
            "pc" => Some(Unit::Pc),
            "mm" => Some(Unit::Mm),
            "cm" => Some(Unit::Cm),
            "in" => Some(Unit::In),
            "emu" => Some(Unit::Emu),
            _ => None,
        }
    }
}

/// A positive length such as `160mm`, `2.5cm` or `120` (pixels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimension {
    /// Numeric magnitude
    pub value: f64,
    /// Unit of `value`
    pub unit: Unit,
}

impl Dimension {
    /// Create a dimension.
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// A length in millimetres.
    pub fn mm(value: f64) -> Self {
        Self::new(value, Unit::Mm)
    }

    /// A length in pixels.
    pub fn px(value: f64) -> Self {
        Self::new(value, Unit::Px)
    }

    /// Parse an optional dimension. Empty strings and `auto` mean "unset".
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }

    /// Length in English Metric Units.
    pub fn to_emu(&self) -> u64 {
        (self.value * self.unit.emu_per_unit()).round() as u64
    }
}

impl FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);

        let value: f64 = number
            .parse()
            .map_err(|_| Error::InvalidPlan(format!("invalid dimension: {:?}", s)))?;
        let unit = Unit::from_suffix(suffix.trim())
            .ok_or_else(|| Error::InvalidPlan(format!("unsupported unit in dimension: {:?}", s)))?;

        if !value.is_finite() || value <= 0.0 {
            return Err(Error::InvalidPlan(format!(
                "dimension must be positive: {:?}",
                s
            )));
        }

        Ok(Self { value, unit })
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}
