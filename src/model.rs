//! Core data types shared by every reconciliation stage.
//!
//! Raw rows come in from source feeds, get normalized into [`EntityRecord`]s,
//! and leave the pipeline as canonical entities (see [`crate::merge`]).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dimension::DimensionVector;

/// What a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A quantity kind, e.g. "length" or "mobility".
    Quantity,
    /// A unit of measure, e.g. "metre".
    Unit,
}

impl EntityKind {
    /// Human-readable name for diagnostics and feed specs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quantity => "quantity",
            Self::Unit => "unit",
        }
    }

    /// Parse the plural form used in feed specs (`quantities`, `units`).
    pub fn from_feed_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "quantities" | "quantity" | "quantitykinds" | "quantity-kinds" => Some(Self::Quantity),
            "units" | "unit" => Some(Self::Unit),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A human-readable name in one language.
///
/// An empty `language` means "unspecified". Two labels with the same
/// `(text, language)` are duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    #[serde(default)]
    pub language: String,
}

impl Label {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.language.is_empty() {
            write!(f, "\"{}\"", self.text)
        } else {
            write!(f, "\"{}\"@{}", self.text, self.language)
        }
    }
}

/// A free-text description tagged with the source that supplied it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Description {
    pub source: String,
    pub text: String,
}

/// One normalized quantity kind or unit as seen by a single source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Opaque per-source identifier (usually an ontology IRI).
    pub source_id: String,
    pub kind: EntityKind,
    pub dimension: DimensionVector,
    /// Labels in source order; reconciled only when merged.
    pub labels: Vec<Label>,
    pub symbol: Option<String>,
    /// Multiplier to the coherent SI unit, in `{:e}` notation. Units only.
    pub conversion_factor: Option<String>,
    /// UCUM (or similar) codes. Always empty for quantity kinds.
    pub unit_codes: BTreeSet<String>,
    pub descriptions: BTreeSet<Description>,
    /// Cross-reference IRIs such as DBpedia or SI exact matches.
    pub external_matches: BTreeSet<String>,
    /// Parent quantity within the originating source. Never resolved across sources.
    pub broader: Option<String>,
    /// Name of the originating source.
    pub provenance: String,
    /// Row position inside the originating feed.
    pub ordinal: usize,
}

impl EntityRecord {
    /// Create a record with only the identifying fields set.
    pub fn new(
        kind: EntityKind,
        source_id: impl Into<String>,
        provenance: impl Into<String>,
        dimension: DimensionVector,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            dimension,
            labels: Vec::new(),
            symbol: None,
            conversion_factor: None,
            unit_codes: BTreeSet::new(),
            descriptions: BTreeSet::new(),
            external_matches: BTreeSet::new(),
            broader: None,
            provenance: provenance.into(),
            ordinal: 0,
        }
    }

    pub fn with_label(mut self, text: impl Into<String>, language: impl Into<String>) -> Self {
        self.labels.push(Label::new(text, language));
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_unit_code(mut self, code: impl Into<String>) -> Self {
        self.unit_codes.insert(code.into());
        self
    }

    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Sort key that defines "original order" independent of input permutation.
    pub(crate) fn canonical_order(&self) -> (&str, usize, &str) {
        (&self.provenance, self.ordinal, &self.source_id)
    }
}

/// A single field value of a raw query-result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Single(String),
    List(Vec<String>),
}

impl RawValue {
    /// Iterate over the contained strings, whether single or list-valued.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::List(values) => values,
        };
        slice.iter().map(String::as_str)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<&str>> for RawValue {
    fn from(values: Vec<&str>) -> Self {
        Self::List(values.into_iter().map(str::to_string).collect())
    }
}

/// A raw query-result row: field name to value. Ordered so reports serialize stably.
pub type RawRow = BTreeMap<String, RawValue>;

/// Build a [`RawRow`] from `(field, value)` pairs.
pub fn raw_row<I, K, V>(fields: I) -> RawRow
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<RawValue>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
