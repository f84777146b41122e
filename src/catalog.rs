//! Catalog builder: the end-to-end reconciliation run.
//!
//! normalize every feed → match quantities → merge → match units → merge →
//! sort. The builder only reads its inputs, and two runs over the same
//! feeds serialize to byte-identical JSON.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ReconcileConfig;
use crate::error::{CatalogError, CatalogResult, NormalizeError, ReconcileResult};
use crate::feed::SourceFeed;
use crate::matcher::{self, AmbiguousMatch};
use crate::merge::{self, CanonicalEntity, EntityConflict, SourcedValue};
use crate::model::{EntityKind, EntityRecord, RawRow};
use crate::normalize::{NormalizeIssue, RecordNormalizer};

/// One entry of the conflict report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictRecord {
    /// A row without an identifier; it was skipped.
    MalformedRecord {
        source: String,
        entity_kind: EntityKind,
        message: String,
        raw: RawRow,
    },
    /// A row whose dimension could not be parsed; its record was kept as an orphan.
    InvalidDimension {
        source: String,
        source_id: String,
        message: String,
        raw: RawRow,
    },
    /// A unit's conversion factor was not a usable number and was dropped.
    InvalidConversionFactor {
        source: String,
        source_id: String,
        value: String,
        raw: RawRow,
    },
    /// Labels dropped during normalization (`raw` set) or merging (`entity_id` set).
    InvalidLabel {
        source: String,
        source_id: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<RawRow>,
    },
    /// Several records of one source fell into the same match group.
    AmbiguousSourceMatch(AmbiguousMatch),
    /// Members of a canonical entity disagreed on the symbol.
    SymbolConflict {
        entity_id: String,
        chosen: String,
        candidates: Vec<SourcedValue>,
    },
    /// Members of a canonical unit disagreed on the conversion factor.
    ConversionFactorConflict {
        entity_id: String,
        chosen: String,
        candidates: Vec<SourcedValue>,
    },
}

impl ConflictRecord {
    /// The `kind` tag this record serializes with.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::MalformedRecord { .. } => "malformed_record",
            Self::InvalidDimension { .. } => "invalid_dimension",
            Self::InvalidConversionFactor { .. } => "invalid_conversion_factor",
            Self::InvalidLabel { .. } => "invalid_label",
            Self::AmbiguousSourceMatch(_) => "ambiguous_source_match",
            Self::SymbolConflict { .. } => "symbol_conflict",
            Self::ConversionFactorConflict { .. } => "conversion_factor_conflict",
        }
    }
}

/// The reconciled catalog plus its conflict report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub quantities: Vec<CanonicalEntity>,
    pub units: Vec<CanonicalEntity>,
    pub conflicts: Vec<ConflictRecord>,
}

impl Catalog {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> CatalogResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CatalogError::Serialize {
            message: e.to_string(),
        })
    }

    /// Write [`Self::to_json`] to `path`, creating parent directories.
    pub fn write_json(&self, path: &Path) -> CatalogResult<()> {
        let write_error = |e: std::io::Error| CatalogError::Write {
            path: path.display().to_string(),
            source: e,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(write_error)
    }

    /// Look up an entity of either kind by canonical id.
    pub fn get(&self, id: &str) -> Option<&CanonicalEntity> {
        self.quantities
            .iter()
            .chain(&self.units)
            .find(|e| e.id == id)
    }

    pub fn stats(&self) -> CatalogStats {
        let mut conflicts = BTreeMap::new();
        for conflict in &self.conflicts {
            *conflicts.entry(conflict.kind_name().to_string()).or_insert(0) += 1;
        }
        CatalogStats {
            quantities: self.quantities.len(),
            units: self.units.len(),
            merged_quantities: self.quantities.iter().filter(|e| e.members.len() > 1).count(),
            merged_units: self.units.iter().filter(|e| e.members.len() > 1).count(),
            conflicts,
        }
    }
}

/// Counts summarizing a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub quantities: usize,
    pub units: usize,
    /// Entities built from more than one source record.
    pub merged_quantities: usize,
    pub merged_units: usize,
    /// Conflict counts keyed by conflict kind.
    pub conflicts: BTreeMap<String, usize>,
}

impl CatalogStats {
    pub fn total_conflicts(&self) -> usize {
        self.conflicts.values().sum()
    }
}

impl std::fmt::Display for CatalogStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "quantities: {} ({} merged)",
            self.quantities, self.merged_quantities
        )?;
        writeln!(f, "units:      {} ({} merged)", self.units, self.merged_units)?;
        write!(f, "conflicts:  {}", self.total_conflicts())?;
        for (kind, count) in &self.conflicts {
            write!(f, "\n  {kind}: {count}")?;
        }
        Ok(())
    }
}

/// Runs reconciliation over a set of feeds.
pub struct CatalogBuilder {
    config: ReconcileConfig,
}

impl CatalogBuilder {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    /// Build the catalog. Only an internal invariant violation
    /// (`EmptyMatchGroup`) aborts the run; everything else is reported.
    pub fn build(&self, feeds: &[SourceFeed]) -> ReconcileResult<Catalog> {
        let rows: usize = feeds.iter().map(|f| f.rows.len()).sum();
        tracing::info!(feeds = feeds.len(), rows, "starting reconciliation run");

        let mut conflicts = Vec::new();
        let (quantities, units) = self.normalize_feeds(feeds, &mut conflicts);

        let quantities = reconcile_kind(EntityKind::Quantity, quantities, &mut conflicts)?;
        let units = reconcile_kind(EntityKind::Unit, units, &mut conflicts)?;

        let catalog = Catalog {
            quantities,
            units,
            conflicts,
        };
        let stats = catalog.stats();
        tracing::info!(
            quantities = stats.quantities,
            units = stats.units,
            merged_quantities = stats.merged_quantities,
            merged_units = stats.merged_units,
            conflicts = stats.total_conflicts(),
            "reconciliation run complete"
        );
        Ok(catalog)
    }

    fn normalize_feeds(
        &self,
        feeds: &[SourceFeed],
        conflicts: &mut Vec<ConflictRecord>,
    ) -> (Vec<EntityRecord>, Vec<EntityRecord>) {
        let mut normalizers: HashMap<&str, RecordNormalizer> = HashMap::new();
        let mut quantities = Vec::new();
        let mut units = Vec::new();

        for feed in feeds {
            let normalizer = normalizers
                .entry(feed.source.as_str())
                .or_insert_with(|| RecordNormalizer::for_source(&self.config, &feed.source));

            for (ordinal, row) in feed.rows.iter().enumerate() {
                let normalized = match normalizer.normalize(row, feed.kind, ordinal) {
                    Ok(normalized) => normalized,
                    Err(NormalizeError::MalformedRecord { message, .. }) => {
                        tracing::warn!(source = %feed.source, ordinal, %message, "skipping malformed record");
                        conflicts.push(ConflictRecord::MalformedRecord {
                            source: feed.source.clone(),
                            entity_kind: feed.kind,
                            message,
                            raw: row.clone(),
                        });
                        continue;
                    }
                };

                let record = normalized.record;
                for issue in normalized.issues {
                    conflicts.push(issue_conflict(&record, row, issue));
                }
                match record.kind {
                    EntityKind::Quantity => quantities.push(record),
                    EntityKind::Unit => units.push(record),
                }
            }
        }
        (quantities, units)
    }
}

fn issue_conflict(record: &EntityRecord, row: &RawRow, issue: NormalizeIssue) -> ConflictRecord {
    match issue {
        NormalizeIssue::InvalidDimension(e) => {
            tracing::warn!(source = %record.provenance, source_id = %record.source_id, error = %e, "invalid dimension");
            ConflictRecord::InvalidDimension {
                source: record.provenance.clone(),
                source_id: record.source_id.clone(),
                message: e.to_string(),
                raw: row.clone(),
            }
        }
        NormalizeIssue::InvalidConversionFactor(value) => {
            tracing::warn!(source = %record.provenance, source_id = %record.source_id, %value, "dropped invalid conversion factor");
            ConflictRecord::InvalidConversionFactor {
                source: record.provenance.clone(),
                source_id: record.source_id.clone(),
                value,
                raw: row.clone(),
            }
        }
        NormalizeIssue::InvalidLabel(e) => {
            tracing::warn!(source = %record.provenance, source_id = %record.source_id, error = %e, "dropped invalid label");
            ConflictRecord::InvalidLabel {
                source: record.provenance.clone(),
                source_id: record.source_id.clone(),
                message: e.to_string(),
                entity_id: None,
                raw: Some(row.clone()),
            }
        }
    }
}

/// Match and merge the records of one kind, returning sorted entities.
fn reconcile_kind(
    kind: EntityKind,
    records: Vec<EntityRecord>,
    conflicts: &mut Vec<ConflictRecord>,
) -> ReconcileResult<Vec<CanonicalEntity>> {
    let outcome = matcher::match_records(records);
    tracing::debug!(
        kind = %kind,
        groups = outcome.groups.len(),
        orphans = outcome.orphans.len(),
        "matching done"
    );

    for ambiguity in outcome.ambiguities {
        tracing::warn!(
            kind = %kind,
            source = %ambiguity.source,
            key = %ambiguity.dimension_key,
            kept = %ambiguity.kept,
            discarded = ambiguity.discarded.len(),
            "ambiguous source match"
        );
        conflicts.push(ConflictRecord::AmbiguousSourceMatch(ambiguity));
    }

    let mut entities = Vec::with_capacity(outcome.groups.len() + outcome.orphans.len());
    for group in &outcome.groups {
        entities.push(merge::merge_group(group)?);
    }
    for orphan in &outcome.orphans {
        entities.push(merge::merge_records(std::slice::from_ref(orphan))?);
    }
    ensure_unique_ids(&mut entities);

    entities.sort_by(|a, b| {
        (&a.dimension_key, a.primary_label(), &a.id).cmp(&(&b.dimension_key, b.primary_label(), &b.id))
    });

    for entity in &entities {
        conflicts.extend(entity.conflicts.iter().map(|c| entity_conflict(entity, c)));
    }
    Ok(entities)
}

/// Entities built from identical source records (a row repeated within a
/// feed) share a canonical id; re-derive theirs from row ordinals.
fn ensure_unique_ids(entities: &mut [CanonicalEntity]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for entity in entities.iter() {
        *counts.entry(entity.id.clone()).or_default() += 1;
    }
    let mut taken: HashSet<String> = counts.keys().cloned().collect();
    for entity in entities.iter_mut() {
        if counts.get(&entity.id).copied().unwrap_or(0) < 2 {
            continue;
        }
        let mut occurrence = 0;
        let mut id = merge::ordinal_id(entity, occurrence);
        while !taken.insert(id.clone()) {
            occurrence += 1;
            id = merge::ordinal_id(entity, occurrence);
        }
        tracing::debug!(shared = %entity.id, %id, "re-derived id of repeated record");
        entity.id = id;
    }
}

fn entity_conflict(entity: &CanonicalEntity, conflict: &EntityConflict) -> ConflictRecord {
    match conflict {
        EntityConflict::Symbol { chosen, candidates } => ConflictRecord::SymbolConflict {
            entity_id: entity.id.clone(),
            chosen: chosen.clone(),
            candidates: candidates.clone(),
        },
        EntityConflict::ConversionFactor { chosen, candidates } => {
            ConflictRecord::ConversionFactorConflict {
                entity_id: entity.id.clone(),
                chosen: chosen.clone(),
                candidates: candidates.clone(),
            }
        }
        EntityConflict::InvalidLabel {
            source,
            source_id,
            message,
        } => ConflictRecord::InvalidLabel {
            source: source.clone(),
            source_id: source_id.clone(),
            message: message.clone(),
            entity_id: Some(entity.id.clone()),
            raw: None,
        },
    }
}
