//! Type environment and built-in stages

use crate::types::{FnSig, Ty, Value, WaveType};
use om_core::{SourceLocation, UnitCategory};
use std::collections::HashMap;

// ============================================================================
// BINDINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Const,
    Let,
    Param,
    Function,
    Pattern,
    Field,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub ty: Ty,
    /// Folded value, when statically known.
    pub value: Option<Value>,
    pub kind: BindingKind,
    pub location: SourceLocation,
}

impl Binding {
    pub fn new(ty: Ty, kind: BindingKind, location: SourceLocation) -> Self {
        Self {
            ty,
            value: None,
            kind,
            location,
        }
    }

    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: HashMap<String, Binding>,
    aliases: HashMap<String, Ty>,
}

/// Name → type mapping for one compilation unit.
///
/// A stack of lexical scopes, each holding value bindings and type aliases.
/// Created per checker run and dropped with it.
#[derive(Debug, Clone)]
pub struct TypeEnvironment {
    scopes: Vec<Scope>,
}

impl Default for TypeEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeEnvironment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pop the innermost scope. The global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bind `name` in the innermost scope, shadowing outer bindings.
    pub fn define(&mut self, name: impl Into<String>, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.into(), binding);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.bindings.get_mut(name))
    }

    /// Whether `name` resolves to a binding of the innermost scope.
    pub fn is_local(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.bindings.contains_key(name))
    }

    pub fn define_alias(&mut self, name: impl Into<String>, ty: Ty) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.aliases.insert(name.into(), ty);
        }
    }

    pub fn alias(&self, name: &str) -> Option<&Ty> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.aliases.get(name))
    }

    /// Alias declared in the innermost scope only.
    pub fn local_alias(&self, name: &str) -> Option<&Ty> {
        self.scopes.last().and_then(|scope| scope.aliases.get(name))
    }
}

// ============================================================================
// BUILT-IN STAGES
// ============================================================================

/// Built-in functions usable as pipe stages (`w | phase(45deg)`) or called
/// directly (`phase(45deg)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Frequency,
    Phase,
    Amplitude,
    Duration,
    Power,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "frequency" => Some(Builtin::Frequency),
            "phase" => Some(Builtin::Phase),
            "amplitude" => Some(Builtin::Amplitude),
            "duration" => Some(Builtin::Duration),
            "power" => Some(Builtin::Power),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Frequency => "frequency",
            Builtin::Phase => "phase",
            Builtin::Amplitude => "amplitude",
            Builtin::Duration => "duration",
            Builtin::Power => "power",
        }
    }

    /// Unit category of the argument; `None` means a unitless number.
    pub fn category(self) -> Option<UnitCategory> {
        match self {
            Builtin::Frequency => Some(UnitCategory::Frequency),
            Builtin::Phase => Some(UnitCategory::Phase),
            Builtin::Amplitude => None,
            Builtin::Duration => Some(UnitCategory::Time),
            Builtin::Power => Some(UnitCategory::Power),
        }
    }

    /// Type of the argument.
    pub fn argument_type(self) -> Ty {
        match self.category() {
            Some(category) => Ty::quantity(category),
            None => Ty::Number,
        }
    }

    /// Signature when used as a pipe stage: `(Wave, arg) -> Wave`.
    pub fn stage_signature(self) -> FnSig {
        FnSig {
            params: vec![Ty::Wave(WaveType::default()), self.argument_type()],
            ret: Box::new(Ty::Wave(WaveType::default())),
            is_async: false,
        }
    }

    /// Apply the stage to a known wave, folding the argument value in.
    pub fn apply(self, mut wave: WaveType, argument: Option<&Value>) -> WaveType {
        match self {
            Builtin::Frequency => wave.frequency = argument.and_then(Value::as_quantity),
            Builtin::Phase => wave.phase = argument.and_then(Value::as_quantity),
            Builtin::Amplitude => wave.amplitude = argument.and_then(Value::as_number),
            Builtin::Duration | Builtin::Power => {}
        }
        wave
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use om_core::{PhaseUnit, PhysicalUnit, Quantity};

    #[test]
    fn test_scopes_shadow_and_pop() {
        let mut env = TypeEnvironment::new();
        let here = SourceLocation::default();
        env.define("x", Binding::new(Ty::Number, BindingKind::Let, here));
        env.push_scope();
        env.define("x", Binding::new(Ty::Bool, BindingKind::Param, here));
        assert_eq!(env.lookup("x").map(|b| &b.ty), Some(&Ty::Bool));
        env.pop_scope();
        assert_eq!(env.lookup("x").map(|b| &b.ty), Some(&Ty::Number));
        env.pop_scope();
        assert_eq!(env.depth(), 1);
        assert!(env.lookup("y").is_none());
    }

    #[test]
    fn test_aliases_follow_scopes() {
        let mut env = TypeEnvironment::new();
        let here = SourceLocation::default();
        env.define_alias("Carrier", Ty::Wave(WaveType::default()));
        env.push_scope();
        env.define_alias("Carrier", Ty::Number);
        env.define_alias("Offset", Ty::quantity(UnitCategory::Phase));
        env.define("x", Binding::new(Ty::Number, BindingKind::Let, here));
        assert_eq!(env.alias("Carrier"), Some(&Ty::Number));
        assert!(env.local_alias("Offset").is_some());
        assert!(env.is_local("x"));

        env.push_scope();
        assert!(env.local_alias("Offset").is_none());
        assert!(env.alias("Offset").is_some());
        assert!(!env.is_local("x"));
        env.pop_scope();

        env.pop_scope();
        assert_eq!(env.alias("Carrier"), Some(&Ty::Wave(WaveType::default())));
        assert!(env.alias("Offset").is_none());
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(Builtin::lookup("phase"), Some(Builtin::Phase));
        assert_eq!(Builtin::lookup("Phase"), None);
        assert_eq!(Builtin::Amplitude.argument_type(), Ty::Number);
        assert_eq!(
            Builtin::Duration.argument_type(),
            Ty::quantity(UnitCategory::Time)
        );
    }

    #[test]
    fn test_builtin_apply_folds_component() {
        let phase = Quantity::new(45.0, PhysicalUnit::Phase(PhaseUnit::Degrees));
        let wave = Builtin::Phase.apply(WaveType::default(), Some(&Value::Quantity(phase)));
        assert_eq!(wave.phase, Some(phase));

        let wave = Builtin::Amplitude.apply(wave, Some(&Value::Number(0.8)));
        assert_eq!(wave.amplitude, Some(0.8));
        assert_eq!(wave.phase, Some(phase));
    }
}
