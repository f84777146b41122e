//! Entity matching: group equivalent records from different sources.
//!
//! Records are joined on their dimension key. Quantity kinds have no other
//! discriminator, so one key partition is one candidate group. Units are
//! further split into connected components of shared unit codes, which
//! keeps dimensionally identical but distinct units (joule vs. newton-metre)
//! apart.
//!
//! Every decision is made on records in canonical order
//! `(provenance, ordinal, source_id)`, so the outcome does not depend on
//! the order in which records are handed in.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::dimension::DimensionKey;
use crate::model::{EntityKind, EntityRecord};

/// Records from at least two sources judged equivalent, one per source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchGroup {
    pub kind: EntityKind,
    pub key: DimensionKey,
    /// Members in canonical order.
    pub members: Vec<EntityRecord>,
}

/// Several records of one source landed in the same candidate group.
///
/// The first by canonical order is kept; the rest become orphans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousMatch {
    pub entity_kind: EntityKind,
    pub dimension_key: DimensionKey,
    pub source: String,
    pub kept: String,
    pub discarded: Vec<String>,
}

/// Result of matching one record set.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub groups: Vec<MatchGroup>,
    /// Records passed through unmerged, in canonical order.
    pub orphans: Vec<EntityRecord>,
    pub ambiguities: Vec<AmbiguousMatch>,
}

/// Group `records` into match groups and orphans.
///
/// Records of different kinds never match each other.
pub fn match_records(records: Vec<EntityRecord>) -> MatchOutcome {
    let mut records = records;
    records.sort_by(|a, b| {
        (a.kind, a.canonical_order()).cmp(&(b.kind, b.canonical_order()))
    });

    let mut outcome = MatchOutcome::default();
    let mut partitions: BTreeMap<(EntityKind, DimensionKey), Vec<usize>> = BTreeMap::new();
    let mut slots: Vec<Option<EntityRecord>> = Vec::with_capacity(records.len());

    for (idx, record) in records.into_iter().enumerate() {
        let key = record.dimension.key();
        if key.is_not_applicable() {
            outcome.orphans.push(record);
            slots.push(None);
        } else {
            partitions.entry((record.kind, key)).or_default().push(idx);
            slots.push(Some(record));
        }
    }

    for ((kind, key), members) in partitions {
        let components = match kind {
            EntityKind::Quantity => vec![members],
            EntityKind::Unit => {
                let records: Vec<&EntityRecord> =
                    members.iter().filter_map(|&i| slots[i].as_ref()).collect();
                code_components(&records)
                    .into_iter()
                    .map(|c| c.into_iter().map(|pos| members[pos]).collect())
                    .collect()
            }
        };
        for component in components {
            let records: Vec<EntityRecord> = component
                .iter()
                .filter_map(|&i| slots[i].take())
                .collect();
            resolve_component(kind, &key, records, &mut outcome);
        }
    }

    outcome.orphans.sort_by(|a, b| {
        (a.kind, a.canonical_order()).cmp(&(b.kind, b.canonical_order()))
    });
    outcome
}

/// Turn one candidate component into a group, or leave it to the orphans.
fn resolve_component(
    kind: EntityKind,
    key: &DimensionKey,
    records: Vec<EntityRecord>,
    outcome: &mut MatchOutcome,
) {
    let mut per_source: BTreeMap<String, usize> = BTreeMap::new();
    for record in &records {
        *per_source.entry(record.provenance.clone()).or_default() += 1;
    }
    if per_source.len() < 2 {
        tracing::debug!(%key, kind = %kind, count = records.len(), "single-source partition left unmatched");
        outcome.orphans.extend(records);
        return;
    }

    let mut members = Vec::with_capacity(per_source.len());
    let mut ambiguities: BTreeMap<String, AmbiguousMatch> = BTreeMap::new();
    for record in records {
        if let Some(kept) = members
            .iter()
            .find(|m: &&EntityRecord| m.provenance == record.provenance)
        {
            ambiguities
                .entry(record.provenance.clone())
                .or_insert_with(|| AmbiguousMatch {
                    entity_kind: kind,
                    dimension_key: key.clone(),
                    source: record.provenance.clone(),
                    kept: kept.source_id.clone(),
                    discarded: Vec::new(),
                })
                .discarded
                .push(record.source_id.clone());
            outcome.orphans.push(record);
        } else {
            members.push(record);
        }
    }

    outcome.ambiguities.extend(ambiguities.into_values());

    // A discarded record may have been the only code link between kept
    // members, so unit connectivity is recomputed over the kept ones.
    let groups = match kind {
        EntityKind::Quantity => vec![members],
        EntityKind::Unit => split_by_codes(members),
    };

    for members in groups {
        if members.len() < 2 {
            tracing::debug!(%key, kind = %kind, "unit lost its code link after ambiguity resolution");
            outcome.orphans.extend(members);
            continue;
        }
        tracing::debug!(%key, kind = %kind, members = members.len(), "match group formed");
        outcome.groups.push(MatchGroup {
            kind,
            key: key.clone(),
            members,
        });
    }
}

fn split_by_codes(records: Vec<EntityRecord>) -> Vec<Vec<EntityRecord>> {
    let components = {
        let refs: Vec<&EntityRecord> = records.iter().collect();
        code_components(&refs)
    };
    let mut slots: Vec<Option<EntityRecord>> = records.into_iter().map(Some).collect();
    components
        .into_iter()
        .map(|c| c.into_iter().filter_map(|pos| slots[pos].take()).collect())
        .collect()
}

/// Split units into components connected by shared unit codes.
///
/// Returns positions into `records`. Components are ordered by their first
/// member and members keep input order; records without codes are singletons.
fn code_components(records: &[&EntityRecord]) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..records.len()).collect();
    let mut code_owner: HashMap<&str, usize> = HashMap::new();

    for (pos, record) in records.iter().enumerate() {
        for code in &record.unit_codes {
            match code_owner.get(code.as_str()) {
                Some(&other) => union(&mut parent, pos, other),
                None => {
                    code_owner.insert(code.as_str(), pos);
                }
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for pos in 0..records.len() {
        let root = find(&mut parent, pos);
        components.entry(root).or_default().push(pos);
    }
    let mut ordered: Vec<Vec<usize>> = components.into_values().collect();
    ordered.sort_by_key(|c| c[0]);
    ordered
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        // Smaller root wins so roots stay at the earliest member.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}
