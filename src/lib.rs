// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # quantity-reconcile
//!
//! Reconciles quantity kinds and units of measure from several ontology
//! sources (QUDT, OM 2.0, SI Digital Framework, …) into one canonical,
//! deduplicated, multilingual catalog.
//!
//! ## Architecture
//!
//! - **Normalization** (`normalize`): source rows into canonical records, driven by per-source profiles
//! - **Dimensions** (`dimension`): exact rational dimension vectors and their canonical keys
//! - **Labels** (`label`): dedupe and language-prioritize multilingual labels
//! - **Matching** (`matcher`): group cross-source records by dimension key and unit codes
//! - **Merging** (`merge`): one canonical entity per group, with provenance and conflicts
//! - **Catalog** (`catalog`): the end-to-end run and the conflict report
//!
//! ## Library usage
//!
//! ```no_run
//! use quantity_reconcile::catalog::CatalogBuilder;
//! use quantity_reconcile::config::ReconcileConfig;
//! use quantity_reconcile::feed::{load_feeds, FeedSpec};
//!
//! let specs = vec![
//!     FeedSpec::parse("qudt:units:qudt-units.json").unwrap(),
//!     FeedSpec::parse("om2:units:om2-units.json").unwrap(),
//! ];
//! let feeds = load_feeds(&specs).unwrap();
//! let catalog = CatalogBuilder::new(ReconcileConfig::default()).build(&feeds).unwrap();
//! println!("{}", catalog.stats());
//! ```

pub mod catalog;
pub mod config;
pub mod dimension;
pub mod error;
pub mod feed;
pub mod label;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod normalize;

pub use catalog::{Catalog, CatalogBuilder, CatalogStats, ConflictRecord};
pub use config::{ReconcileConfig, SourceProfile};
pub use dimension::{DimensionKey, DimensionVector};
pub use error::{ReconcileError, ReconcileResult};
pub use feed::{FeedSpec, SourceFeed};
pub use merge::CanonicalEntity;
pub use model::{EntityKind, EntityRecord, Label};
