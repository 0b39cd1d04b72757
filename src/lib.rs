//! Layered database resolution and time-vector loading for an energy-system
//! model.
//!
//! A [`resolver::DatabaseResolver`] overlays an ordered hierarchy of database
//! roots into one working copy, and a family of format loaders
//! ([`loaders::spreadsheet`], [`loaders::columnar`], [`loaders::container`])
//! reconstructs typed time indices, values and metadata from the three
//! storage formats behind one lazy-access trait,
//! [`loader::TimeVectorLoader`]. Component population from attribute tables
//! is an external collaborator and lives outside this crate.

pub mod error;
pub mod loader;
pub mod loaders;
pub mod metadata;
pub mod names;
pub mod resolver;
pub mod timeindex;
pub mod validate;

pub use error::GridVectorError;
pub use loader::{TimeVectorLoader, open_time_vector_loader};
pub use metadata::{MetaKey, RawMeta, ReferencePeriod, TimeVectorMetadata, cast_meta};
pub use names::DbNames;
pub use resolver::DatabaseResolver;
pub use timeindex::{TimeIndex, build_index};
pub use validate::{ValidationReport, validate_vector};
