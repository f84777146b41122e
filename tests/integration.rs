//! End-to-end integration tests for quantity-reconcile.
//!
//! These tests run whole catalogs from in-memory and on-disk feeds and
//! check the merged entities and the conflict report together.

use quantity_reconcile::catalog::{Catalog, CatalogBuilder, ConflictRecord};
use quantity_reconcile::config::ReconcileConfig;
use quantity_reconcile::feed::{self, FeedSpec, SourceFeed};
use quantity_reconcile::model::{raw_row, EntityKind, Label, RawRow};

fn units(source: &str, rows: Vec<RawRow>) -> SourceFeed {
    SourceFeed::new(source, EntityKind::Unit, rows)
}

fn quantities(source: &str, rows: Vec<RawRow>) -> SourceFeed {
    SourceFeed::new(source, EntityKind::Quantity, rows)
}

fn build(feeds: &[SourceFeed]) -> Catalog {
    CatalogBuilder::new(ReconcileConfig::default())
        .build(feeds)
        .unwrap()
}

fn sample_feeds() -> Vec<SourceFeed> {
    vec![
        quantities(
            "a",
            vec![
                raw_row([("id", "a:Velocity"), ("labels", "velocity@en"), ("dimension", "1,0,-1,0,0,0,0")]),
                raw_row([("id", "a:Speed"), ("labels", "speed@en"), ("dimension", "1,0,-1,0,0,0,0")]),
                raw_row([("id", "a:Length"), ("labels", "length@en|Länge@de"), ("dimension", "1,0,0,0,0,0,0")]),
            ],
        ),
        quantities(
            "b",
            vec![
                raw_row([("id", "b:Velocity"), ("labels", "Geschwindigkeit@de"), ("dimension", "A0E0L1I0M0H0T-1D0")]),
                raw_row([("id", "b:Length"), ("labels", "longueur@fr|length@en"), ("dimension", "A0E0L1I0M0H0T0D0")]),
            ],
        ),
        units(
            "a",
            vec![
                raw_row([("id", "a:metre"), ("labels", "metre@en"), ("unitCodes", "m"), ("symbol", "m"), ("dimension", "1,0,0,0,0,0,0")]),
                raw_row([("id", "a:mps"), ("labels", "metre per second@en"), ("unitCodes", "m/s"), ("dimension", "1,0,-1,0,0,0,0")]),
            ],
        ),
        units(
            "b",
            vec![
                raw_row([("id", "b:Meter"), ("labels", "Meter@de"), ("unitCodes", "m"), ("symbol", "m"), ("dimension", "A0E0L1I0M0H0T0D0")]),
                raw_row([("id", "b:knot"), ("labels", "knot@en"), ("unitCodes", "[kn_i]"), ("dimension", "A0E0L1I0M0H0T-1D0")]),
                raw_row([("labels", "nameless@en")]),
            ],
        ),
    ]
}

#[test]
fn metre_and_meter_merge_into_one_unit() {
    let catalog = build(&[
        units(
            "A",
            vec![raw_row([("id", "A:metre"), ("labels", "metre@en"), ("unitCodes", "m"), ("dimension", "1,0,0,0,0,0,0")])],
        ),
        units(
            "B",
            vec![raw_row([("id", "B:Meter"), ("labels", "Meter@de"), ("unitCodes", "m"), ("dimension", "1,0,0,0,0,0,0")])],
        ),
    ]);

    assert_eq!(catalog.units.len(), 1);
    let metre = &catalog.units[0];
    assert_eq!(metre.labels, vec![Label::new("metre", "en"), Label::new("Meter", "de")]);
    assert_eq!(metre.unit_codes.iter().collect::<Vec<_>>(), vec!["m"]);
    assert_eq!(metre.sources.iter().collect::<Vec<_>>(), vec!["A", "B"]);
    assert!(metre.conflicts.is_empty());
    assert!(catalog.conflicts.is_empty());
}

#[test]
fn units_sharing_only_a_dimension_stay_apart() {
    let catalog = build(&sample_feeds());
    let velocity_units: Vec<_> = catalog
        .units
        .iter()
        .filter(|u| u.dimension_key.as_str() == "L1M0T-1I0H0N0J0")
        .collect();
    assert_eq!(velocity_units.len(), 2);
    assert!(velocity_units.iter().all(|u| u.members.len() == 1));
    let labels: Vec<_> = velocity_units.iter().map(|u| u.primary_label()).collect();
    assert_eq!(labels, vec!["knot", "metre per second"]);
}

#[test]
fn same_source_duplicates_are_ambiguous() {
    let catalog = build(&sample_feeds());

    let velocity: Vec<_> = catalog
        .quantities
        .iter()
        .filter(|q| q.dimension_key.as_str() == "L1M0T-1I0H0N0J0")
        .collect();
    assert_eq!(velocity.len(), 2);
    let merged = velocity.iter().find(|q| q.members.len() == 2).unwrap();
    let member_ids: Vec<_> = merged.members.iter().map(|m| m.source_id.as_str()).collect();
    assert_eq!(member_ids, vec!["a:Velocity", "b:Velocity"]);
    assert!(velocity.iter().any(|q| q.members[0].source_id == "a:Speed"));

    let ambiguous: Vec<_> = catalog
        .conflicts
        .iter()
        .filter_map(|c| match c {
            ConflictRecord::AmbiguousSourceMatch(m) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(ambiguous.len(), 1);
    assert_eq!(ambiguous[0].source, "a");
    assert_eq!(ambiguous[0].kept, "a:Velocity");
    assert_eq!(ambiguous[0].discarded, vec!["a:Speed".to_string()]);
}

#[test]
fn conflicts_follow_pipeline_order() {
    let catalog = build(&sample_feeds());
    let kinds: Vec<_> = catalog.conflicts.iter().map(|c| c.kind_name()).collect();
    assert_eq!(kinds, vec!["malformed_record", "ambiguous_source_match"]);
}

#[test]
fn entities_sorted_by_key_then_label() {
    let catalog = build(&sample_feeds());
    for list in [&catalog.quantities, &catalog.units] {
        let keys: Vec<_> = list
            .iter()
            .map(|e| (e.dimension_key.clone(), e.primary_label().to_string(), e.id.clone()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}

#[test]
fn repeated_runs_are_byte_identical() {
    let feeds = sample_feeds();
    let first = build(&feeds).to_json().unwrap();
    let second = build(&feeds).to_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn entities_do_not_depend_on_feed_order() {
    let feeds = sample_feeds();
    let mut reversed = feeds.clone();
    reversed.reverse();
    let a = build(&feeds);
    let b = build(&reversed);
    assert_eq!(a.quantities, b.quantities);
    assert_eq!(a.units, b.units);
}

#[test]
fn inputs_are_not_modified() {
    let feeds = sample_feeds();
    let snapshot = feeds.clone();
    let _ = build(&feeds);
    assert_eq!(feeds, snapshot);
}

#[test]
fn canonical_ids_never_reuse_source_ids() {
    let catalog = build(&sample_feeds());
    for entity in catalog.quantities.iter().chain(&catalog.units) {
        assert!(entity.id.starts_with("OSW"));
        assert!(entity.members.iter().all(|m| m.source_id != entity.id));
    }
}

#[test]
fn canonical_ids_unique_across_catalog() {
    let shared = "http://example.org/unit/X";
    let mut feeds = sample_feeds();
    feeds.push(units(
        "c",
        vec![
            raw_row([("id", shared), ("labels", "x@en"), ("unitCodes", "x"), ("dimension", "1,0,0,0,0,0,0")]),
            raw_row([("id", "c:once"), ("labels", "once@en"), ("dimension", "0,1,0,0,0,0,0")]),
            raw_row([("id", "c:once"), ("labels", "once@en"), ("dimension", "0,1,0,0,0,0,0")]),
        ],
    ));
    feeds.push(units(
        "d",
        vec![raw_row([("id", shared), ("labels", "x@en"), ("unitCodes", "y"), ("dimension", "0,0,1,0,0,0,0")])],
    ));
    let catalog = build(&feeds);

    let mut ids: Vec<&str> = catalog
        .quantities
        .iter()
        .chain(&catalog.units)
        .map(|e| e.id.as_str())
        .collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);

    let shared_entities = catalog
        .units
        .iter()
        .filter(|u| u.members.iter().any(|m| m.source_id == shared))
        .count();
    assert_eq!(shared_entities, 2);
}

// ── File-based feeds ────────────────────────────────────────────────────

const QUDT_UNITS: &str = r#"{
  "head": {"vars": ["unit", "labels", "ucumCodes", "symbol", "dimensionVector"]},
  "results": {"bindings": [
    {
      "unit": {"type": "uri", "value": "http://qudt.org/vocab/unit/M"},
      "labels": {"type": "literal", "value": "metre@en, Meter@de, meter@en-US"},
      "ucumCodes": {"type": "literal", "value": "m"},
      "symbol": {"type": "literal", "value": "m"},
      "conversionMultiplierSN": {"type": "literal", "datatype": "http://www.w3.org/2001/XMLSchema#double", "value": "1.0E0"},
      "dimensionVector": {"type": "uri", "value": "http://qudt.org/vocab/dimensionvector/A0E0L1I0M0H0T0D0"}
    },
    {
      "unit": {"type": "uri", "value": "http://qudt.org/vocab/unit/KiloGM"},
      "labels": {"type": "literal", "value": "kilogram@en"},
      "ucumCodes": {"type": "literal", "value": "kg"},
      "dimensionVector": {"type": "uri", "value": "http://qudt.org/vocab/dimensionvector/A0E0L0I0M1H0T0D0"}
    }
  ]}
}"#;

const OM2_UNITS: &str = r#"[
  {"uri": "om:metre", "label": ["metre@en", "mètre@fr"], "unitCodes": "m", "symbol": "m", "lengthExp": "1"},
  {"uri": "om:kilogram", "label": ["kilogram@en"], "unitCodes": "kg", "symbol": "kg", "massExp": "1"}
]"#;

const OM2_CONFIG: &str = r#"
[profiles.om2]
id_fields = ["uri"]
label_fields = ["label"]

[profiles.om2.dimension]
per_dimension = { length = "lengthExp", mass = "massExp" }
"#;

#[test]
fn file_feeds_with_profiles() {
    let dir = tempfile::TempDir::new().unwrap();
    let qudt_path = dir.path().join("qudt-units.json");
    let om2_path = dir.path().join("om2-units.json");
    let config_path = dir.path().join("reconcile.toml");
    std::fs::write(&qudt_path, QUDT_UNITS).unwrap();
    std::fs::write(&om2_path, OM2_UNITS).unwrap();
    std::fs::write(&config_path, OM2_CONFIG).unwrap();

    let config = ReconcileConfig::load(&config_path).unwrap();
    let specs = vec![
        FeedSpec::parse(&format!("qudt:units:{}", qudt_path.display())).unwrap(),
        FeedSpec::parse(&format!("om2:units:{}", om2_path.display())).unwrap(),
    ];
    let feeds = feed::load_feeds(&specs).unwrap();
    let catalog = CatalogBuilder::new(config).build(&feeds).unwrap();

    assert_eq!(catalog.units.len(), 2);
    assert!(catalog.conflicts.is_empty(), "{:?}", catalog.conflicts);
    assert!(catalog.units.iter().all(|u| u.sources.len() == 2));

    let metre = catalog.units.iter().find(|u| u.unit_codes.contains("m")).unwrap();
    assert_eq!(metre.dimension_key.as_str(), "L1M0T0I0H0N0J0");
    assert_eq!(metre.symbol.as_deref(), Some("m"));
    assert_eq!(metre.conversion_factor.as_deref(), Some("1e0"));
    assert_eq!(
        metre.labels,
        vec![
            Label::new("metre", "en"),
            Label::new("meter", "en"),
            Label::new("mètre", "fr"),
            Label::new("Meter", "de"),
        ]
    );

    let out = dir.path().join("out").join("catalog.json");
    catalog.write_json(&out).unwrap();
    let written = std::fs::read_to_string(&out).unwrap();
    assert_eq!(written, catalog.to_json().unwrap());
}

#[test]
fn catalog_json_shape() {
    let catalog = build(&sample_feeds());
    let json: serde_json::Value = serde_json::from_str(&catalog.to_json().unwrap()).unwrap();
    assert!(json["quantities"].is_array());
    assert!(json["units"].is_array());
    let conflict = &json["conflicts"][1];
    assert_eq!(conflict["kind"], "ambiguous_source_match");
    assert_eq!(conflict["entity_kind"], "quantity");
    let entity = &json["units"][0];
    for field in ["id", "kind", "dimension_key", "labels", "unit_codes", "sources", "members", "conflicts"] {
        assert!(entity.get(field).is_some(), "missing {field}");
    }
}
