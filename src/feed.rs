//! Source feeds: raw rows tagged with a source name and entity kind.
//!
//! On disk a feed is either a SPARQL 1.1 JSON results document or a plain
//! JSON array of row objects. Several feed files are read and parsed in
//! parallel; reconciliation itself only starts once all of them are loaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{FeedError, FeedResult};
use crate::model::{EntityKind, RawRow, RawValue};

/// All rows one source contributes for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFeed {
    pub source: String,
    pub kind: EntityKind,
    pub rows: Vec<RawRow>,
}

impl SourceFeed {
    pub fn new(source: impl Into<String>, kind: EntityKind, rows: Vec<RawRow>) -> Self {
        Self {
            source: source.into(),
            kind,
            rows,
        }
    }
}

/// A feed file named on the command line as `<source>:<kind>:<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSpec {
    pub source: String,
    pub kind: EntityKind,
    pub path: PathBuf,
}

impl FeedSpec {
    /// Parse `<source>:<quantities|units>:<path>`. The path may itself contain `:`.
    pub fn parse(spec: &str) -> FeedResult<Self> {
        let invalid = |message: &str| FeedError::InvalidSpec {
            spec: spec.to_string(),
            message: message.to_string(),
        };
        let mut parts = spec.splitn(3, ':');
        let (Some(source), Some(kind), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected three `:`-separated parts"));
        };
        if source.trim().is_empty() {
            return Err(invalid("source name is empty"));
        }
        let kind = EntityKind::from_feed_name(kind)
            .ok_or_else(|| invalid("kind must be `quantities` or `units`"))?;
        if path.is_empty() {
            return Err(invalid("path is empty"));
        }
        Ok(Self {
            source: source.trim().to_string(),
            kind,
            path: PathBuf::from(path),
        })
    }

    /// Read and parse the file this spec names.
    pub fn load(&self) -> FeedResult<SourceFeed> {
        let rows = read_rows(&self.path)?;
        tracing::debug!(
            source = %self.source,
            kind = %self.kind,
            path = %self.path.display(),
            rows = rows.len(),
            "loaded feed"
        );
        Ok(SourceFeed::new(self.source.clone(), self.kind, rows))
    }
}

impl std::str::FromStr for FeedSpec {
    type Err = FeedError;

    fn from_str(s: &str) -> FeedResult<Self> {
        Self::parse(s)
    }
}

/// Load several feed files concurrently, one task per file.
///
/// The result keeps the order of `specs`; the first failure is returned.
pub fn load_feeds(specs: &[FeedSpec]) -> FeedResult<Vec<SourceFeed>> {
    specs.par_iter().map(FeedSpec::load).collect()
}

/// Read the rows of a feed file.
pub fn read_rows(path: &Path) -> FeedResult<Vec<RawRow>> {
    let text = std::fs::read_to_string(path).map_err(|e| FeedError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_rows(&text, &path.display().to_string())
}

// ── Parsing ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Deserialize)]
struct SparqlResults {
    bindings: Vec<BTreeMap<String, SparqlValue>>,
}

#[derive(Deserialize)]
struct SparqlValue {
    value: String,
    #[serde(rename = "xml:lang", default)]
    lang: Option<String>,
}

/// Parse feed text, auto-detecting the document shape. `origin` names the
/// text in error messages.
pub fn parse_rows(text: &str, origin: &str) -> FeedResult<Vec<RawRow>> {
    let parse_error = |message: String| FeedError::Parse {
        path: origin.to_string(),
        message,
    };
    let document: serde_json::Value =
        serde_json::from_str(text).map_err(|e| parse_error(e.to_string()))?;

    if document.get("results").is_some() {
        let response: SparqlResponse =
            serde_json::from_value(document).map_err(|e| parse_error(e.to_string()))?;
        Ok(response
            .results
            .bindings
            .into_iter()
            .map(binding_to_row)
            .collect())
    } else if document.is_array() {
        serde_json::from_value(document).map_err(|e| parse_error(e.to_string()))
    } else {
        Err(parse_error(
            "expected a SPARQL results object or an array of rows".into(),
        ))
    }
}

fn binding_to_row(binding: BTreeMap<String, SparqlValue>) -> RawRow {
    binding
        .into_iter()
        .map(|(field, v)| {
            let value = match v.lang.filter(|l| !l.is_empty()) {
                Some(lang) => format!("{}@{lang}", v.value),
                None => v.value,
            };
            (field, RawValue::Single(value))
        })
        .collect()
}
