//! Merge engine: one canonical entity per match group or orphan.
//!
//! Attribute policy:
//!
//! - **labels**: union of member labels, reconciled (see [`crate::label`]).
//!   A member with malformed labels contributes none and the problem is
//!   recorded; the other members' labels still apply.
//! - **symbol, conversion factor**: the shared non-empty value; on
//!   disagreement the first member's wins and a conflict is recorded.
//! - **unit codes, external matches, descriptions**: set union.
//! - **broader**: kept per member, never unified across sources.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dimension::{DimensionKey, DimensionVector};
use crate::error::{MergeError, MergeResult};
use crate::label;
use crate::matcher::MatchGroup;
use crate::model::{Description, EntityKind, EntityRecord, Label};

/// The reconciled form of one quantity kind or unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    /// Deterministic id derived from the members' sources and ids, `OSW` + 32 hex digits.
    pub id: String,
    pub kind: EntityKind,
    pub dimension_key: DimensionKey,
    pub dimension: DimensionVector,
    pub labels: Vec<Label>,
    pub symbol: Option<String>,
    /// Multiplier to the coherent SI unit, in `{:e}` notation. Units only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_factor: Option<String>,
    pub unit_codes: BTreeSet<String>,
    pub descriptions: BTreeSet<Description>,
    pub external_matches: BTreeSet<String>,
    /// Contributing source names.
    pub sources: BTreeSet<String>,
    /// Per-member provenance, in member order.
    pub members: Vec<MemberProvenance>,
    pub conflicts: Vec<EntityConflict>,
}

impl CanonicalEntity {
    /// Text of the first reconciled label, or empty.
    pub fn primary_label(&self) -> &str {
        self.labels.first().map_or("", |l| l.text.as_str())
    }
}

/// Where one member of a canonical entity came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProvenance {
    pub source: String,
    pub source_id: String,
    /// Row position inside the member's feed.
    pub ordinal: usize,
    /// The member's parent quantity within its own source.
    pub broader: Option<String>,
}

/// A value as supplied by one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcedValue {
    pub source: String,
    pub source_id: String,
    pub value: String,
}

/// An attribute on which the members of an entity disagreed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "conflict", rename_all = "snake_case")]
pub enum EntityConflict {
    /// Members carried different non-empty symbols.
    Symbol {
        chosen: String,
        candidates: Vec<SourcedValue>,
    },
    /// Members carried different conversion factors.
    ConversionFactor {
        chosen: String,
        candidates: Vec<SourcedValue>,
    },
    /// A member's labels were not well-formed and were left out.
    InvalidLabel {
        source: String,
        source_id: String,
        message: String,
    },
}

/// Merge a match group.
pub fn merge_group(group: &MatchGroup) -> MergeResult<CanonicalEntity> {
    merge_records(&group.members)
}

/// Merge an arbitrary member list; a single record is a trivial merge.
pub fn merge_records(members: &[EntityRecord]) -> MergeResult<CanonicalEntity> {
    let first = members.first().ok_or(MergeError::EmptyMatchGroup)?;
    let id = canonical_id(first.kind, members);
    let mut conflicts = Vec::new();

    let mut labels: Vec<&Label> = Vec::new();
    for member in members {
        match label::validate_labels(&member.labels) {
            Ok(()) => labels.extend(&member.labels),
            Err(e) => {
                tracing::warn!(
                    entity = %id,
                    source = %member.provenance,
                    source_id = %member.source_id,
                    error = %e,
                    "dropping malformed labels of merge member"
                );
                conflicts.push(EntityConflict::InvalidLabel {
                    source: member.provenance.clone(),
                    source_id: member.source_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
    let labels = label::order_labels(labels);

    let symbol = single_valued(members, |m| m.symbol.as_deref()).map(|(chosen, disagreement)| {
        if let Some(candidates) = disagreement {
            tracing::warn!(entity = %id, %chosen, candidates = candidates.len(), "symbol conflict");
            conflicts.push(EntityConflict::Symbol {
                chosen: chosen.clone(),
                candidates,
            });
        }
        chosen
    });

    let conversion_factor = single_valued(members, |m| m.conversion_factor.as_deref()).map(
        |(chosen, disagreement)| {
            if let Some(candidates) = disagreement {
                tracing::warn!(entity = %id, %chosen, "conversion factor conflict");
                conflicts.push(EntityConflict::ConversionFactor {
                    chosen: chosen.clone(),
                    candidates,
                });
            }
            chosen
        },
    );

    Ok(CanonicalEntity {
        id,
        kind: first.kind,
        dimension_key: first.dimension.key(),
        dimension: first.dimension,
        labels,
        symbol,
        conversion_factor,
        unit_codes: members.iter().flat_map(|m| m.unit_codes.iter().cloned()).collect(),
        descriptions: members.iter().flat_map(|m| m.descriptions.iter().cloned()).collect(),
        external_matches: members
            .iter()
            .flat_map(|m| m.external_matches.iter().cloned())
            .collect(),
        sources: members.iter().map(|m| m.provenance.clone()).collect(),
        members: members
            .iter()
            .map(|m| MemberProvenance {
                source: m.provenance.clone(),
                source_id: m.source_id.clone(),
                ordinal: m.ordinal,
                broader: m.broader.clone(),
            })
            .collect(),
        conflicts,
    })
}

/// The first non-empty value in member order. When members disagree, every
/// supplied value comes back alongside it.
fn single_valued<'a>(
    members: &'a [EntityRecord],
    value: impl Fn(&'a EntityRecord) -> Option<&'a str>,
) -> Option<(String, Option<Vec<SourcedValue>>)> {
    let candidates: Vec<SourcedValue> = members
        .iter()
        .filter_map(|m| {
            let v = value(m).map(str::trim).filter(|v| !v.is_empty())?;
            Some(SourcedValue {
                source: m.provenance.clone(),
                source_id: m.source_id.clone(),
                value: v.to_string(),
            })
        })
        .collect();

    let chosen = candidates.first()?.value.clone();
    let disagreement = candidates
        .iter()
        .any(|c| c.value != chosen)
        .then_some(candidates);
    Some((chosen, disagreement))
}

/// `OSW` + the simple form of a UUIDv5 over the kind and the sorted
/// `(source, source_id)` pairs of the members.
pub fn canonical_id(kind: EntityKind, members: &[EntityRecord]) -> String {
    id_from_names(
        kind,
        members
            .iter()
            .map(|m| format!("{}\t{}", m.provenance, m.source_id))
            .collect(),
    )
}

/// Id for an entity whose members are the very same source records as another
/// entity's (a row repeated in a feed). Row ordinals tell them apart, and
/// `occurrence` separates whatever still collides.
pub fn ordinal_id(entity: &CanonicalEntity, occurrence: usize) -> String {
    let mut names: Vec<String> = entity
        .members
        .iter()
        .map(|m| format!("{}\t{}#{}", m.source, m.source_id, m.ordinal))
        .collect();
    if occurrence > 0 {
        names.push(format!("#{occurrence}"));
    }
    id_from_names(entity.kind, names)
}

fn id_from_names(kind: EntityKind, mut names: Vec<String>) -> String {
    names.sort_unstable();
    names.dedup();
    let name = format!("{kind}:{}", names.join("\n"));
    let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes());
    format!("OSW{}", uuid.simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::BaseDimension::*;

    fn metre(source: &str, id: &str, label: (&str, &str)) -> EntityRecord {
        EntityRecord::new(
            EntityKind::Unit,
            id,
            source,
            DimensionVector::from_pairs(&[(Length, 1)]),
        )
        .with_label(label.0, label.1)
        .with_unit_code("m")
    }

    #[test]
    fn empty_group_is_fatal() {
        let err = merge_records(&[]).unwrap_err();
        assert!(matches!(err, MergeError::EmptyMatchGroup));
    }

    #[test]
    fn labels_union_and_reconcile() {
        let a = metre("a", "a:metre", ("metre", "en"));
        let b = metre("b", "b:Meter", ("Meter", "de"));
        let e = merge_records(&[b, a]).unwrap();
        assert_eq!(e.labels, vec![Label::new("metre", "en"), Label::new("Meter", "de")]);
        assert_eq!(e.unit_codes.iter().collect::<Vec<_>>(), vec!["m"]);
        assert!(e.conflicts.is_empty());
        assert_eq!(e.sources.len(), 2);
    }

    #[test]
    fn single_record_merge_keeps_attributes() {
        let mut r = metre("a", "a:metre", ("metre", "en"))
            .with_label("Meter", "de")
            .with_symbol("m");
        r.external_matches.insert("http://dbpedia.org/resource/Metre".into());
        r.descriptions.insert(Description {
            source: "a".into(),
            text: "SI unit of length".into(),
        });
        r.broader = Some("a:LengthUnit".into());

        let e = merge_records(std::slice::from_ref(&r)).unwrap();
        assert_eq!(e.labels, r.labels);
        assert_eq!(e.symbol, r.symbol);
        assert_eq!(e.unit_codes, r.unit_codes);
        assert_eq!(e.external_matches, r.external_matches);
        assert_eq!(e.descriptions, r.descriptions);
        assert_eq!(e.dimension, r.dimension);
        assert_eq!(e.members[0].broader.as_deref(), Some("a:LengthUnit"));
        assert!(e.conflicts.is_empty());
        assert_ne!(e.id, r.source_id);
    }

    #[test]
    fn identical_symbols_do_not_conflict() {
        let a = metre("a", "a:m", ("metre", "en")).with_symbol("m");
        let b = metre("b", "b:m", ("Meter", "de")).with_symbol("m");
        let c = metre("c", "c:m", ("metro", "it"));
        let e = merge_records(&[a, b, c]).unwrap();
        assert_eq!(e.symbol.as_deref(), Some("m"));
        assert!(e.conflicts.is_empty());
    }

    #[test]
    fn differing_symbols_keep_first_and_conflict() {
        let a = metre("a", "a:m", ("metre", "en")).with_symbol("m");
        let b = metre("b", "b:m", ("Meter", "de")).with_symbol("mtr");
        let e = merge_records(&[a, b]).unwrap();
        assert_eq!(e.symbol.as_deref(), Some("m"));
        match &e.conflicts[..] {
            [EntityConflict::Symbol { chosen, candidates }] => {
                assert_eq!(chosen, "m");
                assert_eq!(candidates.len(), 2);
                assert_eq!(candidates[1].value, "mtr");
            }
            other => panic!("unexpected conflicts: {other:?}"),
        }
    }

    #[test]
    fn no_symbols_leave_empty() {
        let a = metre("a", "a:m", ("metre", "en"));
        let b = metre("b", "b:m", ("Meter", "de")).with_symbol("  ");
        assert!(merge_records(&[a, b]).unwrap().symbol.is_none());
    }

    #[test]
    fn malformed_member_labels_fall_back_to_others() {
        let a = metre("a", "a:m", ("metre", "en"));
        let b = metre("b", "b:m", ("", "de"));
        let e = merge_records(&[a, b]).unwrap();
        assert_eq!(e.labels, vec![Label::new("metre", "en")]);
        assert!(matches!(
            &e.conflicts[..],
            [EntityConflict::InvalidLabel { source, .. }] if source == "b"
        ));
    }

    #[test]
    fn broader_preserved_per_member() {
        let mut a = metre("a", "a:m", ("metre", "en"));
        a.broader = Some("a:Length".into());
        let mut b = metre("b", "b:m", ("Meter", "de"));
        b.broader = Some("b:Distance".into());
        let e = merge_records(&[a, b]).unwrap();
        let broader: Vec<_> = e.members.iter().filter_map(|m| m.broader.as_deref()).collect();
        assert_eq!(broader, vec!["a:Length", "b:Distance"]);
    }

    #[test]
    fn canonical_id_ignores_member_order() {
        let a = metre("a", "a:m", ("metre", "en"));
        let b = metre("b", "b:m", ("Meter", "de"));
        let ab = canonical_id(EntityKind::Unit, &[a.clone(), b.clone()]);
        let ba = canonical_id(EntityKind::Unit, &[b, a]);
        assert_eq!(ab, ba);
        assert!(ab.starts_with("OSW"));
        assert_eq!(ab.len(), 35);
    }

    #[test]
    fn canonical_id_tells_sources_apart() {
        let a = metre("a", "http://example.org/unit/M", ("metre", "en"));
        let b = metre("b", "http://example.org/unit/M", ("metre", "en"));
        assert_ne!(
            canonical_id(EntityKind::Unit, std::slice::from_ref(&a)),
            canonical_id(EntityKind::Unit, std::slice::from_ref(&b))
        );
        assert_ne!(
            canonical_id(EntityKind::Unit, std::slice::from_ref(&a)),
            canonical_id(EntityKind::Quantity, std::slice::from_ref(&a))
        );
    }

    #[test]
    fn ordinal_id_separates_repeated_rows() {
        let first = merge_records(&[metre("a", "a:m", ("metre", "en"))]).unwrap();
        let again = merge_records(&[metre("a", "a:m", ("metre", "en")).with_ordinal(3)]).unwrap();
        assert_eq!(first.id, again.id);
        assert_ne!(ordinal_id(&first, 0), ordinal_id(&again, 0));
        assert_ne!(ordinal_id(&first, 0), ordinal_id(&first, 1));
        assert_ne!(ordinal_id(&first, 0), first.id);
        assert_eq!(again.members[0].ordinal, 3);
    }

    #[test]
    fn conversion_factor_follows_first_member() {
        let mut a = metre("a", "a:km", ("kilometre", "en"));
        a.conversion_factor = Some("1e3".into());
        let mut b = metre("b", "b:km", ("Kilometer", "de"));
        b.conversion_factor = Some("1e3".into());
        let c = metre("c", "c:km", ("chilometro", "it"));
        let e = merge_records(&[a.clone(), b.clone(), c]).unwrap();
        assert_eq!(e.conversion_factor.as_deref(), Some("1e3"));
        assert!(e.conflicts.is_empty());

        b.conversion_factor = Some("1e-3".into());
        let e = merge_records(&[a, b]).unwrap();
        assert_eq!(e.conversion_factor.as_deref(), Some("1e3"));
        match &e.conflicts[..] {
            [EntityConflict::ConversionFactor { chosen, candidates }] => {
                assert_eq!(chosen, "1e3");
                assert_eq!(candidates[1].source, "b");
                assert_eq!(candidates[1].value, "1e-3");
            }
            other => panic!("unexpected conflicts: {other:?}"),
        }
    }
}
