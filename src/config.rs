//! Reconciliation configuration, persisted as TOML.
//!
//! The only process-wide state of a run. A [`SourceProfile`] tells the
//! normalizer which raw fields of a source hold which record attribute; the
//! rest of the config tunes label cleanup.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dimension::BaseDimension;
use crate::error::{ConfigError, ConfigResult};

/// Name of the fallback profile used for sources without their own.
pub const GENERIC_PROFILE: &str = "generic";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Language tags rewritten during normalization, e.g. `en-US → en`.
    pub language_aliases: BTreeMap<String, String>,
    /// English label text forced for specific source ids. Used to break label
    /// collisions between distinct upstream entities.
    pub label_overrides: BTreeMap<String, String>,
    /// Field mappings keyed by source name.
    pub profiles: BTreeMap<String, SourceProfile>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            language_aliases: default_language_aliases(),
            label_overrides: default_label_overrides(),
            profiles: builtin_profiles(),
        }
    }
}

fn default_language_aliases() -> BTreeMap<String, String> {
    [("en-US", "en"), ("en-GB", "en")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_label_overrides() -> BTreeMap<String, String> {
    [
        ("http://qudt.org/vocab/quantitykind/VaporPermeance", "VaporPermeance"),
        ("http://qudt.org/vocab/quantitykind/ConductivityVariance_NEON", "NEON Conductivity Variance"),
        ("http://qudt.org/vocab/quantitykind/TemperatureVariance_NEON", "NEON Temperature Variance"),
        (
            "http://qudt.org/vocab/quantitykind/EvaporativeHeatTransferCoefficient",
            "Evaporative Heat Transfer Coefficient",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Profiles compiled into the binary: `generic` and `qudt`.
pub fn builtin_profiles() -> BTreeMap<String, SourceProfile> {
    let mut profiles = BTreeMap::new();
    profiles.insert(GENERIC_PROFILE.to_string(), SourceProfile::default());
    profiles.insert("qudt".to_string(), SourceProfile::qudt());
    profiles
}

impl ReconcileConfig {
    /// Load from a TOML file. Built-in profiles fill in names the file omits.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse TOML text; `origin` names the text in error messages.
    pub fn from_toml_str(content: &str, origin: &str) -> ConfigResult<Self> {
        let mut config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        for (name, profile) in builtin_profiles() {
            config.profiles.entry(name).or_insert(profile);
        }
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "(in-memory config)".into(),
            message: e.to_string(),
        })
    }

    /// Reject per-dimension mappings that name unknown base dimensions.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, profile) in &self.profiles {
            for dim_name in profile.dimension.per_dimension.keys() {
                if BaseDimension::from_name(dim_name).is_none() {
                    return Err(ConfigError::UnknownDimension {
                        profile: name.clone(),
                        name: dim_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The profile for `source`, falling back to the generic one.
    pub fn profile_for(&self, source: &str) -> SourceProfile {
        self.profiles
            .get(source)
            .or_else(|| self.profiles.get(GENERIC_PROFILE))
            .cloned()
            .unwrap_or_default()
    }

    /// Apply language aliases to a tag.
    pub fn canonical_language<'a>(&'a self, tag: &'a str) -> &'a str {
        self.language_aliases
            .get(tag)
            .map(String::as_str)
            .unwrap_or(tag)
    }
}

/// How a source names the fields of its rows.
///
/// Every `*_fields` list is tried in order; values of all present fields are
/// collected (single-valued attributes take the first non-empty one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceProfile {
    pub id_fields: Vec<String>,
    pub label_fields: Vec<String>,
    /// Separator between encoded labels inside one value.
    pub label_separator: String,
    /// Language given to labels without an `@lang` suffix.
    pub default_label_language: String,
    /// Upper-case the first character of quantity-kind labels.
    pub capitalize_quantity_labels: bool,
    pub symbol_fields: Vec<String>,
    pub unit_code_fields: Vec<String>,
    pub unit_code_separator: String,
    /// Multiplier to the coherent SI unit. Read for units only.
    pub conversion_factor_fields: Vec<String>,
    pub description_fields: Vec<String>,
    pub description_separator: String,
    pub external_match_fields: Vec<String>,
    /// Whitespace-only separators split on any whitespace run.
    pub external_match_separator: String,
    pub broader_fields: Vec<String>,
    pub dimension: DimensionMapping,
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self {
            id_fields: strings(&["id", "uri", "iri"]),
            label_fields: strings(&["labels", "label"]),
            label_separator: "|".into(),
            default_label_language: String::new(),
            capitalize_quantity_labels: false,
            symbol_fields: strings(&["symbol"]),
            unit_code_fields: strings(&["unitCodes", "unit_codes", "ucumCodes", "ucumCode"]),
            unit_code_separator: ",".into(),
            conversion_factor_fields: strings(&["conversionFactor", "conversion_factor"]),
            description_fields: strings(&["descriptions", "description"]),
            description_separator: " #,# ".into(),
            external_match_fields: strings(&["externalMatches", "external_matches", "exactMatch"]),
            external_match_separator: " ".into(),
            broader_fields: strings(&["broader"]),
            dimension: DimensionMapping {
                fields: strings(&["dimension", "dimensionVector"]),
                per_dimension: BTreeMap::new(),
            },
        }
    }
}

impl SourceProfile {
    /// Column names produced by the QUDT quantity-kind and unit queries.
    pub fn qudt() -> Self {
        Self {
            id_fields: strings(&["applicableUnit", "quantity", "unit"]),
            label_fields: strings(&["labels", "qlabels"]),
            label_separator: ", ".into(),
            default_label_language: "en".into(),
            capitalize_quantity_labels: true,
            symbol_fields: strings(&["symbol"]),
            unit_code_fields: strings(&["ucumCodes", "ucumCode"]),
            unit_code_separator: ",".into(),
            conversion_factor_fields: strings(&["conversionMultiplierSN", "conversionMultiplier"]),
            description_fields: strings(&[
                "plainTextDescriptions",
                "plainTextDescription",
                "descriptions",
                "description",
            ]),
            description_separator: " #,# ".into(),
            external_match_fields: strings(&["dbpediaMatch", "siExactMatch"]),
            external_match_separator: " ".into(),
            broader_fields: strings(&["broader"]),
            dimension: DimensionMapping {
                fields: strings(&["dimensionVector", "hasDimensionVector"]),
                per_dimension: BTreeMap::new(),
            },
        }
    }
}

/// Where a source keeps its dimension information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionMapping {
    /// Fields holding a complete encoded vector (QUDT or flat form).
    pub fields: Vec<String>,
    /// One exponent field per base dimension, keyed by dimension name.
    /// Takes precedence over `fields` when any mapped field is present.
    pub per_dimension: BTreeMap<String, String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
