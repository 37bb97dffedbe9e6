//! Om Core - Shared Types
//!
//! Physical units and their conversion table, source locations,
//! driver-facing diagnostics, rule-set configuration and cancellation.
//! Every other Om crate depends on this one.

pub mod cancel;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod units;

pub use cancel::CancellationToken;
pub use config::{FrontEndOptions, RuleSet, RuleSetConfig};
pub use diagnostic::{has_errors, Diagnostic, Severity, SourceLocation, Stage};
pub use error::{ConfigError, OmError, OmResult, UnitError};
pub use units::{
    convert, FrequencyUnit, PhaseUnit, PhysicalUnit, PowerUnit, Quantity, SuffixMatch, TimeUnit,
    UnitCategory,
};
