//! Parsers turning generator output back into typed quadlets.
//!
//! The quadlet generator is the semantic authority: nothing here validates
//! unit files, it only restructures what the generator already accepted or
//! rejected.

pub mod dryrun;
pub mod extension;
pub mod service_kind;
pub mod unit;

pub use dryrun::DryRunParser;
pub use extension::quadlet_type_from_path;
pub use service_kind::{ServiceKind, classify_service_kind};
pub use unit::{ParsedUnit, UnitSection, parse_unit};
