//! Physical units and the fixed linear conversion table

use crate::error::UnitError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// UNIT CATEGORIES
// ============================================================================

/// One of the four closed physical-dimension families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitCategory {
    Frequency,
    Phase,
    Time,
    Power,
}

impl UnitCategory {
    /// All units of this category, smallest scale first.
    pub fn units(self) -> &'static [PhysicalUnit] {
        match self {
            UnitCategory::Frequency => &[
                PhysicalUnit::Frequency(FrequencyUnit::Hertz),
                PhysicalUnit::Frequency(FrequencyUnit::Kilohertz),
                PhysicalUnit::Frequency(FrequencyUnit::Megahertz),
                PhysicalUnit::Frequency(FrequencyUnit::Gigahertz),
            ],
            UnitCategory::Phase => &[
                PhysicalUnit::Phase(PhaseUnit::Degrees),
                PhysicalUnit::Phase(PhaseUnit::Radians),
            ],
            UnitCategory::Time => &[
                PhysicalUnit::Time(TimeUnit::Milliseconds),
                PhysicalUnit::Time(TimeUnit::Seconds),
                PhysicalUnit::Time(TimeUnit::Minutes),
            ],
            UnitCategory::Power => &[
                PhysicalUnit::Power(PowerUnit::Milliwatts),
                PhysicalUnit::Power(PowerUnit::Watts),
            ],
        }
    }

    /// Unit symbols of this category, used for fix-it suggestions.
    pub fn symbols(self) -> Vec<String> {
        self.units().iter().map(|u| u.symbol().to_string()).collect()
    }

    /// The Om type name that denotes a value of this category.
    pub fn type_name(self) -> &'static str {
        match self {
            UnitCategory::Frequency => "Frequency",
            UnitCategory::Phase => "Phase",
            UnitCategory::Time => "Time",
            UnitCategory::Power => "Power",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "Frequency" => Some(UnitCategory::Frequency),
            "Phase" => Some(UnitCategory::Phase),
            "Time" => Some(UnitCategory::Time),
            "Power" => Some(UnitCategory::Power),
            _ => None,
        }
    }
}

impl fmt::Display for UnitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            UnitCategory::Frequency => "frequency",
            UnitCategory::Phase => "phase",
            UnitCategory::Time => "time",
            UnitCategory::Power => "power",
        };
        write!(f, "{}", value)
    }
}

// ============================================================================
// UNITS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrequencyUnit {
    Hertz,
    Kilohertz,
    Megahertz,
    Gigahertz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseUnit {
    Degrees,
    Radians,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerUnit {
    Milliwatts,
    Watts,
}

/// A unit tagged with its category. Units never convert across categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalUnit {
    Frequency(FrequencyUnit),
    Phase(PhaseUnit),
    Time(TimeUnit),
    Power(PowerUnit),
}

impl PhysicalUnit {
    pub fn category(self) -> UnitCategory {
        match self {
            PhysicalUnit::Frequency(_) => UnitCategory::Frequency,
            PhysicalUnit::Phase(_) => UnitCategory::Phase,
            PhysicalUnit::Time(_) => UnitCategory::Time,
            PhysicalUnit::Power(_) => UnitCategory::Power,
        }
    }

    /// Canonical source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            PhysicalUnit::Frequency(FrequencyUnit::Hertz) => "Hz",
            PhysicalUnit::Frequency(FrequencyUnit::Kilohertz) => "kHz",
            PhysicalUnit::Frequency(FrequencyUnit::Megahertz) => "MHz",
            PhysicalUnit::Frequency(FrequencyUnit::Gigahertz) => "GHz",
            PhysicalUnit::Phase(PhaseUnit::Degrees) => "deg",
            PhysicalUnit::Phase(PhaseUnit::Radians) => "rad",
            PhysicalUnit::Time(TimeUnit::Milliseconds) => "ms",
            PhysicalUnit::Time(TimeUnit::Seconds) => "s",
            PhysicalUnit::Time(TimeUnit::Minutes) => "min",
            PhysicalUnit::Power(PowerUnit::Milliwatts) => "mW",
            PhysicalUnit::Power(PowerUnit::Watts) => "W",
        }
    }

    /// Factor that converts a value in this unit to the category's base unit
    /// (Hz, deg, s, W).
    pub fn scale(self) -> f64 {
        match self {
            PhysicalUnit::Frequency(FrequencyUnit::Hertz) => 1.0,
            PhysicalUnit::Frequency(FrequencyUnit::Kilohertz) => 1e3,
            PhysicalUnit::Frequency(FrequencyUnit::Megahertz) => 1e6,
            PhysicalUnit::Frequency(FrequencyUnit::Gigahertz) => 1e9,
            PhysicalUnit::Phase(PhaseUnit::Degrees) => 1.0,
            PhysicalUnit::Phase(PhaseUnit::Radians) => 180.0 / PI,
            PhysicalUnit::Time(TimeUnit::Milliseconds) => 1e-3,
            PhysicalUnit::Time(TimeUnit::Seconds) => 1.0,
            PhysicalUnit::Time(TimeUnit::Minutes) => 60.0,
            PhysicalUnit::Power(PowerUnit::Milliwatts) => 1e-3,
            PhysicalUnit::Power(PowerUnit::Watts) => 1.0,
        }
    }

    /// Resolve a literal suffix, accepting deprecated spellings.
    pub fn lookup_suffix(suffix: &str) -> Option<SuffixMatch> {
        let canonical = |unit| SuffixMatch {
            unit,
            deprecated: false,
        };
        let deprecated = |unit| SuffixMatch {
            unit,
            deprecated: true,
        };

        let found = match suffix {
            "Hz" => canonical(PhysicalUnit::Frequency(FrequencyUnit::Hertz)),
            "kHz" => canonical(PhysicalUnit::Frequency(FrequencyUnit::Kilohertz)),
            "MHz" => canonical(PhysicalUnit::Frequency(FrequencyUnit::Megahertz)),
            "GHz" => canonical(PhysicalUnit::Frequency(FrequencyUnit::Gigahertz)),
            "deg" => canonical(PhysicalUnit::Phase(PhaseUnit::Degrees)),
            "rad" => canonical(PhysicalUnit::Phase(PhaseUnit::Radians)),
            "ms" => canonical(PhysicalUnit::Time(TimeUnit::Milliseconds)),
            "s" => canonical(PhysicalUnit::Time(TimeUnit::Seconds)),
            "min" => canonical(PhysicalUnit::Time(TimeUnit::Minutes)),
            "mW" => canonical(PhysicalUnit::Power(PowerUnit::Milliwatts)),
            "W" => canonical(PhysicalUnit::Power(PowerUnit::Watts)),

            // Older drafts of the language used these spellings.
            "hz" => deprecated(PhysicalUnit::Frequency(FrequencyUnit::Hertz)),
            "khz" | "KHz" => deprecated(PhysicalUnit::Frequency(FrequencyUnit::Kilohertz)),
            "Mhz" => deprecated(PhysicalUnit::Frequency(FrequencyUnit::Megahertz)),
            "Ghz" => deprecated(PhysicalUnit::Frequency(FrequencyUnit::Gigahertz)),
            "degrees" => deprecated(PhysicalUnit::Phase(PhaseUnit::Degrees)),
            "radians" => deprecated(PhysicalUnit::Phase(PhaseUnit::Radians)),
            "msec" => deprecated(PhysicalUnit::Time(TimeUnit::Milliseconds)),
            "sec" => deprecated(PhysicalUnit::Time(TimeUnit::Seconds)),
            _ => return None,
        };
        Some(found)
    }
}

impl fmt::Display for PhysicalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Result of resolving a literal suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuffixMatch {
    pub unit: PhysicalUnit,
    /// Suffix was an accepted but deprecated spelling of `unit`.
    pub deprecated: bool,
}

/// Convert `value` from one unit to another of the same category.
pub fn convert(value: f64, from: PhysicalUnit, to: PhysicalUnit) -> Result<f64, UnitError> {
    if from.category() != to.category() {
        return Err(UnitError::CategoryMismatch {
            from: from.symbol().to_string(),
            to: to.symbol().to_string(),
        });
    }
    if from == to {
        return Ok(value);
    }
    Ok(value * from.scale() / to.scale())
}

// ============================================================================
// QUANTITIES
// ============================================================================

/// A numeric value carrying a physical unit, e.g. `41.5kHz`.
///
/// Serialized in its source spelling so configuration files and JSON dumps
/// read the same way Om code does.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    pub value: f64,
    pub unit: PhysicalUnit,
}

impl Quantity {
    pub fn new(value: f64, unit: PhysicalUnit) -> Self {
        Self { value, unit }
    }

    pub fn category(&self) -> UnitCategory {
        self.unit.category()
    }

    pub fn convert_to(&self, unit: PhysicalUnit) -> Result<Quantity, UnitError> {
        Ok(Quantity::new(convert(self.value, self.unit, unit)?, unit))
    }

    /// Value expressed in the category's base unit.
    pub fn base_value(&self) -> f64 {
        self.value * self.unit.scale()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.symbol())
    }
}

impl FromStr for Quantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
            .map(|(i, _)| i)
            .unwrap_or(trimmed.len());

        let (number, suffix) = trimmed.split_at(split);
        let value: f64 = number.parse().map_err(|_| UnitError::Malformed {
            input: s.to_string(),
        })?;

        if suffix.is_empty() {
            return Err(UnitError::MissingUnit {
                input: s.to_string(),
            });
        }

        let found = PhysicalUnit::lookup_suffix(suffix).ok_or_else(|| UnitError::UnknownUnit {
            suffix: suffix.to_string(),
        })?;

        Ok(Quantity::new(value, found.unit))
    }
}

impl TryFrom<String> for Quantity {
    type Error = UnitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> Self {
        q.to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_round_trip_through_lookup() {
        for category in [
            UnitCategory::Frequency,
            UnitCategory::Phase,
            UnitCategory::Time,
            UnitCategory::Power,
        ] {
            for unit in category.units() {
                let found = PhysicalUnit::lookup_suffix(unit.symbol()).unwrap();
                assert_eq!(found.unit, *unit);
                assert!(!found.deprecated);
                assert_eq!(unit.category(), category);
            }
        }
    }

    #[test]
    fn test_deprecated_spellings() {
        let found = PhysicalUnit::lookup_suffix("khz").unwrap();
        assert_eq!(found.unit, PhysicalUnit::Frequency(FrequencyUnit::Kilohertz));
        assert!(found.deprecated);
        assert!(PhysicalUnit::lookup_suffix("furlongs").is_none());
    }

    #[test]
    fn test_convert_khz_to_hz() {
        let hz = PhysicalUnit::Frequency(FrequencyUnit::Hertz);
        let khz = PhysicalUnit::Frequency(FrequencyUnit::Kilohertz);
        assert_eq!(convert(41.5, khz, hz).unwrap(), 41_500.0);
        assert_eq!(convert(500.0, hz, khz).unwrap(), 0.5);
    }

    #[test]
    fn test_convert_radians_to_degrees() {
        let deg = PhysicalUnit::Phase(PhaseUnit::Degrees);
        let rad = PhysicalUnit::Phase(PhaseUnit::Radians);
        let degrees = convert(PI, rad, deg).unwrap();
        assert!((degrees - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_across_categories_fails() {
        let hz = PhysicalUnit::Frequency(FrequencyUnit::Hertz);
        let deg = PhysicalUnit::Phase(PhaseUnit::Degrees);
        let err = convert(1.0, hz, deg).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Hz"));
        assert!(msg.contains("deg"));
    }

    #[test]
    fn test_quantity_from_str() {
        let q: Quantity = "41.5kHz".parse().unwrap();
        assert_eq!(q.value, 41.5);
        assert_eq!(q.unit, PhysicalUnit::Frequency(FrequencyUnit::Kilohertz));
        assert_eq!(q.to_string(), "41.5kHz");

        let q: Quantity = "500mW".parse().unwrap();
        assert_eq!(q.unit, PhysicalUnit::Power(PowerUnit::Milliwatts));

        assert!(matches!(
            "45".parse::<Quantity>(),
            Err(UnitError::MissingUnit { .. })
        ));
        assert!(matches!(
            "45parsecs".parse::<Quantity>(),
            Err(UnitError::UnknownUnit { .. })
        ));
        assert!(matches!(
            "kHz".parse::<Quantity>(),
            Err(UnitError::Malformed { .. })
        ));
    }

    #[test]
    fn test_category_symbols() {
        assert_eq!(UnitCategory::Phase.symbols(), vec!["deg", "rad"]);
        assert_eq!(
            UnitCategory::from_type_name("Frequency"),
            Some(UnitCategory::Frequency)
        );
        assert_eq!(UnitCategory::from_type_name("Wave"), None);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_category() -> impl Strategy<Value = UnitCategory> {
        prop_oneof![
            Just(UnitCategory::Frequency),
            Just(UnitCategory::Phase),
            Just(UnitCategory::Time),
            Just(UnitCategory::Power),
        ]
    }

    fn arb_unit_pair() -> impl Strategy<Value = (PhysicalUnit, PhysicalUnit)> {
        arb_category().prop_flat_map(|category| {
            let units = category.units();
            (
                prop::sample::select(units.to_vec()),
                prop::sample::select(units.to_vec()),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_conversion_recovers_value((a, b) in arb_unit_pair(), value in -1.0e6f64..1.0e6f64) {
            let there = convert(value, a, b).unwrap();
            let back = convert(there, b, a).unwrap();
            let tolerance = 1e-9 * value.abs().max(1.0);
            prop_assert!((back - value).abs() <= tolerance, "{} -> {} -> {}", value, there, back);
        }
    }
}
