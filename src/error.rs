//! Rich diagnostic error types for the reconciliation engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Most of these never abort a run: the
//! catalog builder turns them into entries of the conflict report. Only
//! [`MergeError::EmptyMatchGroup`] and the I/O-facing errors are fatal.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the reconciliation engine.
#[derive(Debug, Error, Diagnostic)]
pub enum ReconcileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dimension(#[from] DimensionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Label(#[from] LabelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),
}

// ---------------------------------------------------------------------------
// Normalization errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum NormalizeError {
    #[error("malformed record from source \"{source_name}\": {message}")]
    #[diagnostic(
        code(reconcile::normalize::malformed_record),
        help(
            "Every row needs a non-empty identifier in one of the profile's `id_fields`. \
             Check the source profile's field names against the query result columns."
        )
    )]
    MalformedRecord { source_name: String, message: String },
}

// ---------------------------------------------------------------------------
// Dimension errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum DimensionError {
    #[error("invalid dimension encoding \"{input}\": {message}")]
    #[diagnostic(
        code(reconcile::dimension::invalid),
        help(
            "Accepted encodings are QUDT vectors (`A0E0L1I0M0H0T-2D0`), flat vectors of \
             seven exponents in L,M,T,I,Θ,N,J order (`1,0,-2,0,0,0,0`), or per-dimension \
             fields configured on the source profile."
        )
    )]
    InvalidDimension { input: String, message: String },
}

// ---------------------------------------------------------------------------
// Label errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("invalid label at position {index}: {message}")]
    #[diagnostic(
        code(reconcile::label::invalid),
        help(
            "A label needs non-empty `text` and a `language` that is empty or a \
             BCP-47 style tag such as `en`, `de` or `en-US`."
        )
    )]
    InvalidLabel { index: usize, message: String },
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MergeError {
    #[error("cannot merge an empty match group")]
    #[diagnostic(
        code(reconcile::merge::empty_group),
        help(
            "The matcher produced a group without members. This is an internal invariant \
             violation; please file a bug report with the input feeds."
        )
    )]
    EmptyMatchGroup,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(reconcile::config::read),
        help("Ensure the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(reconcile::config::parse),
        help("Check the TOML syntax and the field names of each `[profiles.<name>]` table.")
    )]
    Parse { path: String, message: String },

    #[error("unknown base dimension \"{name}\" in profile \"{profile}\"")]
    #[diagnostic(
        code(reconcile::config::unknown_dimension),
        help(
            "Per-dimension fields are keyed by one of: length, mass, time, current, \
             temperature, amount, luminous_intensity."
        )
    )]
    UnknownDimension { profile: String, name: String },
}

// ---------------------------------------------------------------------------
// Feed errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FeedError {
    #[error("failed to read feed file: {path}")]
    #[diagnostic(
        code(reconcile::feed::read),
        help("Ensure the feed file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse feed file {path}: {message}")]
    #[diagnostic(
        code(reconcile::feed::parse),
        help(
            "A feed is either a SPARQL 1.1 JSON results document or a JSON array of \
             objects whose values are strings or arrays of strings."
        )
    )]
    Parse { path: String, message: String },

    #[error("invalid feed spec \"{spec}\": {message}")]
    #[diagnostic(
        code(reconcile::feed::spec),
        help("Feeds are given as `<source>:<quantities|units>:<path>`, e.g. `qudt:units:units.json`.")
    )]
    InvalidSpec { spec: String, message: String },
}

// ---------------------------------------------------------------------------
// Catalog errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("failed to serialize catalog: {message}")]
    #[diagnostic(
        code(reconcile::catalog::serialize),
        help("This indicates a bug in the catalog model; please file a bug report.")
    )]
    Serialize { message: String },

    #[error("failed to write catalog to {path}")]
    #[diagnostic(
        code(reconcile::catalog::write),
        help("Check that the output directory exists and is writable.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for top-level results.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

pub type NormalizeResult<T> = std::result::Result<T, NormalizeError>;
pub type DimensionResult<T> = std::result::Result<T, DimensionError>;
pub type LabelResult<T> = std::result::Result<T, LabelError>;
pub type MergeResult<T> = std::result::Result<T, MergeError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type FeedResult<T> = std::result::Result<T, FeedError>;
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
