//! Record normalization: raw query-result rows into [`EntityRecord`]s.
//!
//! A row either yields a record (possibly with non-fatal issues, such as a
//! dropped malformed label) or fails with `MalformedRecord` when it carries
//! no identifier. Normalization is pure: no I/O, no shared state.

use std::collections::BTreeMap;

use unicode_normalization::UnicodeNormalization;

use crate::config::{ReconcileConfig, SourceProfile};
use crate::dimension::{self, BaseDimension, DimensionVector};
use crate::error::{DimensionError, LabelError, NormalizeError, NormalizeResult};
use crate::label::{self, PRIMARY_LANGUAGE};
use crate::model::{Description, EntityKind, EntityRecord, Label, RawRow};

/// A problem found in a row that did not prevent building its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeIssue {
    /// A label value was dropped.
    InvalidLabel(LabelError),
    /// The dimension could not be parsed; the record carries the sentinel.
    InvalidDimension(DimensionError),
    /// A unit's conversion factor was not a finite non-zero number; it was dropped.
    InvalidConversionFactor(String),
}

/// Output of normalizing one row.
#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub record: EntityRecord,
    pub issues: Vec<NormalizeIssue>,
}

/// Normalizer bound to one source's profile and the run's label settings.
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    source: String,
    profile: SourceProfile,
    per_dimension: BTreeMap<BaseDimension, String>,
    config: ReconcileConfig,
}

impl RecordNormalizer {
    /// Build a normalizer for `source` using its configured profile.
    pub fn for_source(config: &ReconcileConfig, source: &str) -> Self {
        Self::with_profile(config, source, config.profile_for(source))
    }

    pub fn with_profile(config: &ReconcileConfig, source: &str, profile: SourceProfile) -> Self {
        let per_dimension = profile
            .dimension
            .per_dimension
            .iter()
            .filter_map(|(name, field)| BaseDimension::from_name(name).map(|d| (d, field.clone())))
            .collect();
        Self {
            source: source.to_string(),
            profile,
            per_dimension,
            config: config.clone(),
        }
    }

    /// Normalize one row. `ordinal` is the row's position in its feed.
    pub fn normalize(
        &self,
        row: &RawRow,
        kind: EntityKind,
        ordinal: usize,
    ) -> NormalizeResult<NormalizedRow> {
        let profile = &self.profile;
        let source_id = first_value(row, &profile.id_fields).ok_or_else(|| {
            NormalizeError::MalformedRecord {
                source_name: self.source.clone(),
                message: format!(
                    "no identifier in any of the fields [{}]",
                    profile.id_fields.join(", ")
                ),
            }
        })?;

        let mut issues = Vec::new();
        let (dimension, dim_issue) = self.dimension(row);
        issues.extend(dim_issue.map(NormalizeIssue::InvalidDimension));

        let mut record = EntityRecord::new(kind, source_id, self.source.clone(), dimension);
        record.ordinal = ordinal;
        record.labels = self.labels(row, kind, &mut issues);
        self.apply_label_override(&mut record);
        record.symbol = first_value(row, &profile.symbol_fields);
        if kind == EntityKind::Unit {
            record.unit_codes = split_fields(row, &profile.unit_code_fields, &profile.unit_code_separator)
                .map(str::to_string)
                .collect();
            if let Some(value) = first_value(row, &profile.conversion_factor_fields) {
                match conversion_factor(&value) {
                    Some(factor) => record.conversion_factor = Some(factor),
                    None => issues.push(NormalizeIssue::InvalidConversionFactor(value)),
                }
            }
        }
        record.descriptions =
            split_fields(row, &profile.description_fields, &profile.description_separator)
                .map(|text| Description {
                    source: self.source.clone(),
                    text: text.nfc().collect(),
                })
                .collect();
        record.external_matches = split_fields(
            row,
            &profile.external_match_fields,
            &profile.external_match_separator,
        )
        .map(str::to_string)
        .collect();
        record.broader = first_value(row, &profile.broader_fields);

        Ok(NormalizedRow { record, issues })
    }

    fn labels(&self, row: &RawRow, kind: EntityKind, issues: &mut Vec<NormalizeIssue>) -> Vec<Label> {
        let profile = &self.profile;
        let capitalize = kind == EntityKind::Quantity && profile.capitalize_quantity_labels;
        let mut labels = Vec::new();

        for (index, encoded) in
            split_fields(row, &profile.label_fields, &profile.label_separator).enumerate()
        {
            match label::parse_encoded_label(encoded, &profile.default_label_language) {
                Ok(parsed) => {
                    let language = self.config.canonical_language(&parsed.language).to_string();
                    let text: String = parsed.text.nfc().collect();
                    let text = if capitalize { capitalize_first(&text) } else { text };
                    labels.push(Label { text, language });
                }
                Err(LabelError::InvalidLabel { message, .. }) => {
                    issues.push(NormalizeIssue::InvalidLabel(LabelError::InvalidLabel {
                        index,
                        message: format!("\"{encoded}\": {message}"),
                    }));
                }
            }
        }
        labels
    }

    fn apply_label_override(&self, record: &mut EntityRecord) {
        let Some(text) = self.config.label_overrides.get(&record.source_id) else {
            return;
        };
        record.labels.retain(|l| l.language != PRIMARY_LANGUAGE);
        record.labels.insert(0, Label::new(text.clone(), PRIMARY_LANGUAGE));
    }

    fn dimension(&self, row: &RawRow) -> (DimensionVector, Option<DimensionError>) {
        let exponent_fields: BTreeMap<BaseDimension, &str> = self
            .per_dimension
            .iter()
            .filter_map(|(&dim, field)| {
                row.get(field)
                    .and_then(|v| v.values().map(str::trim).find(|s| !s.is_empty()))
                    .map(|value| (dim, value))
            })
            .collect();

        let parsed = if !exponent_fields.is_empty() {
            dimension::from_exponent_fields(&exponent_fields)
        } else if let Some(encoded) = first_value(row, &self.profile.dimension.fields) {
            dimension::parse_dimension(&encoded).map(Some)
        } else {
            Ok(None)
        };

        match parsed {
            Ok(Some(vector)) => (vector, None),
            Ok(None) => (DimensionVector::NotApplicable, None),
            Err(e) => (DimensionVector::NotApplicable, Some(e)),
        }
    }
}

/// First non-empty trimmed value among `fields`.
fn first_value(row: &RawRow, fields: &[String]) -> Option<String> {
    fields
        .iter()
        .filter_map(|f| row.get(f))
        .flat_map(|v| v.values())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// All values of all present `fields`, split on `separator`, trimmed, empties dropped.
fn split_fields<'r>(
    row: &'r RawRow,
    fields: &'r [String],
    separator: &'r str,
) -> impl Iterator<Item = &'r str> + 'r {
    fields
        .iter()
        .filter_map(move |f| row.get(f))
        .flat_map(|v| v.values())
        .flat_map(move |value| split_value(value, separator))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn split_value<'v>(value: &'v str, separator: &str) -> Vec<&'v str> {
    if separator.is_empty() {
        vec![value]
    } else if separator.trim().is_empty() {
        value.split_whitespace().collect()
    } else {
        value.split(separator).collect()
    }
}

/// A multiplier in `{:e}` notation, so `1000`, `1.0E3` and `1e3` compare equal.
fn conversion_factor(value: &str) -> Option<String> {
    let factor: f64 = value.parse().ok()?;
    (factor.is_finite() && factor != 0.0).then(|| format!("{factor:e}"))
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
