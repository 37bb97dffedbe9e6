//! Type tags carried by every expression node
//!
//! The set is closed. `Dynamic` is the gradual-typing escape hatch: it is
//! compatible with every operation, and the parser initializes every node
//! with it until the checker assigns something more precise.

use om_core::{PhysicalUnit, Quantity, UnitCategory};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Ty {
    #[default]
    Dynamic,
    /// Unitless number.
    Number,
    Bool,
    Str,
    Void,
    /// Unit-bearing value. `unit` is the concrete unit when known.
    Quantity {
        category: UnitCategory,
        unit: Option<PhysicalUnit>,
    },
    Wave(WaveType),
    Pattern(PatternType),
    Field(FieldType),
    /// Vector literal of the given length.
    Vector(usize),
    Range(Box<Ty>),
    Function(FnSig),
}

impl Ty {
    pub fn quantity(category: UnitCategory) -> Self {
        Ty::Quantity {
            category,
            unit: None,
        }
    }

    pub fn of_unit(unit: PhysicalUnit) -> Self {
        Ty::Quantity {
            category: unit.category(),
            unit: Some(unit),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Ty::Dynamic)
    }

    pub fn category(&self) -> Option<UnitCategory> {
        match self {
            Ty::Quantity { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// The same type with statically folded wave components forgotten.
    pub fn without_folded_values(&self) -> Ty {
        let unknown = |waves: &[WaveType]| vec![WaveType::default(); waves.len()];
        match self {
            Ty::Wave(_) => Ty::Wave(WaveType::default()),
            Ty::Pattern(pattern) => Ty::Pattern(PatternType {
                waves: unknown(&pattern.waves),
                relationship: pattern.relationship,
            }),
            Ty::Field(field) => Ty::Field(FieldType {
                waves: unknown(&field.waves),
                ..field.clone()
            }),
            other => other.clone(),
        }
    }

    /// Structural compatibility used for arguments, annotations and pipe
    /// subjects. Quantities match by category; the concrete unit converts.
    pub fn is_compatible_with(&self, other: &Ty) -> bool {
        match (self, other) {
            (Ty::Dynamic, _) | (_, Ty::Dynamic) => true,
            (Ty::Quantity { category: a, .. }, Ty::Quantity { category: b, .. }) => a == b,
            (Ty::Wave(_), Ty::Wave(_)) => true,
            (Ty::Pattern(_), Ty::Pattern(_)) => true,
            (Ty::Field(_), Ty::Field(_)) => true,
            (Ty::Vector(a), Ty::Vector(b)) => a == b,
            (Ty::Range(a), Ty::Range(b)) => a.is_compatible_with(b),
            (Ty::Function(a), Ty::Function(b)) => {
                a.params.len() == b.params.len()
                    && a.params
                        .iter()
                        .zip(&b.params)
                        .all(|(x, y)| x.is_compatible_with(y))
                    && a.ret.is_compatible_with(&b.ret)
            }
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Dynamic => write!(f, "Dynamic"),
            Ty::Number => write!(f, "Number"),
            Ty::Bool => write!(f, "Bool"),
            Ty::Str => write!(f, "String"),
            Ty::Void => write!(f, "Void"),
            Ty::Quantity {
                category,
                unit: Some(unit),
            } => write!(f, "{}({})", category.type_name(), unit),
            Ty::Quantity { category, unit: None } => write!(f, "{}", category.type_name()),
            Ty::Wave(_) => write!(f, "Wave"),
            Ty::Pattern(p) => write!(f, "Pattern<{}>", p.relationship),
            Ty::Field(field) => write!(f, "Field<{}>", field.dimensions.len()),
            Ty::Vector(len) => write!(f, "Vector<{}>", len),
            Ty::Range(elem) => write!(f, "Range<{}>", elem),
            Ty::Function(sig) => {
                let params: Vec<String> = sig.params.iter().map(|p| p.to_string()).collect();
                write!(f, "fn({}) -> {}", params.join(", "), sig.ret)
            }
        }
    }
}

/// A statically known value, folded by the type checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Quantity(Quantity),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<Quantity> {
        match self {
            Value::Quantity(q) => Some(*q),
            _ => None,
        }
    }
}

/// A continuous wave. `None` components are not statically known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveType {
    pub frequency: Option<Quantity>,
    pub phase: Option<Quantity>,
    pub amplitude: Option<f64>,
}

/// How the member waves of a pattern relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Relationship {
    #[default]
    Sequence,
    Parallel,
    Matrix,
}

impl Relationship {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sequence" => Some(Relationship::Sequence),
            "parallel" => Some(Relationship::Parallel),
            "matrix" => Some(Relationship::Matrix),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Relationship::Sequence => "sequence",
            Relationship::Parallel => "parallel",
            Relationship::Matrix => "matrix",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternType {
    pub waves: Vec<WaveType>,
    pub relationship: Relationship,
}

/// Field edge behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryMode {
    Reflective,
    Absorbing,
    Periodic,
    #[default]
    Open,
}

impl BoundaryMode {
    pub const NAMES: [&'static str; 4] = ["reflective", "absorbing", "periodic", "open"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reflective" => Some(BoundaryMode::Reflective),
            "absorbing" => Some(BoundaryMode::Absorbing),
            "periodic" => Some(BoundaryMode::Periodic),
            "open" => Some(BoundaryMode::Open),
            _ => None,
        }
    }
}

/// How overlapping waves inside a field combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterferenceMode {
    #[default]
    Constructive,
    Destructive,
    Mixed,
}

impl InterferenceMode {
    pub const NAMES: [&'static str; 3] = ["constructive", "destructive", "mixed"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "constructive" => Some(InterferenceMode::Constructive),
            "destructive" => Some(InterferenceMode::Destructive),
            "mixed" => Some(InterferenceMode::Mixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldType {
    pub dimensions: Vec<u64>,
    pub waves: Vec<WaveType>,
    pub boundary: BoundaryMode,
    pub interference: InterferenceMode,
}

/// Function signature. The first parameter is the pipe subject when the
/// function is used as a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnSig {
    pub params: Vec<Ty>,
    pub ret: Box<Ty>,
    pub is_async: bool,
}
