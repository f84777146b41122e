//! Label reconciliation: dedupe and language-prioritize multilingual labels.
//!
//! English labels come first, then labels without a language, then all
//! other languages in encounter order. The sort is stable, so reconciling
//! an already reconciled list is a no-op.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{LabelError, LabelResult};
use crate::model::Label;

/// Language that always sorts first.
pub const PRIMARY_LANGUAGE: &str = "en";

static RE_LANGUAGE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{2,8}(?:-[A-Za-z0-9]{1,8})*$").unwrap()
});

/// Whether `tag` is empty or a BCP-47 style language tag.
pub fn is_valid_language(tag: &str) -> bool {
    tag.is_empty() || RE_LANGUAGE_TAG.is_match(tag)
}

/// Check the well-formedness contract of a single label.
pub fn validate_label(label: &Label, index: usize) -> LabelResult<()> {
    if label.text.trim().is_empty() {
        return Err(LabelError::InvalidLabel {
            index,
            message: "label text is empty".into(),
        });
    }
    if !is_valid_language(&label.language) {
        return Err(LabelError::InvalidLabel {
            index,
            message: format!("\"{}\" is not a valid language tag", label.language),
        });
    }
    Ok(())
}

/// Validate every label of a sequence, reporting the first offender.
pub fn validate_labels(labels: &[Label]) -> LabelResult<()> {
    labels
        .iter()
        .enumerate()
        .try_for_each(|(i, label)| validate_label(label, i))
}

/// Reconcile a single label sequence.
pub fn reconcile(labels: &[Label]) -> LabelResult<Vec<Label>> {
    reconcile_all([labels])
}

/// Reconcile several label sequences into one ordered, deduplicated list.
///
/// Sequences are concatenated in the given order before deduplication;
/// `InvalidLabel` indices refer to positions in that concatenation.
pub fn reconcile_all<'a, I>(sequences: I) -> LabelResult<Vec<Label>>
where
    I: IntoIterator<Item = &'a [Label]>,
{
    let mut labels = Vec::new();
    for (index, label) in sequences.into_iter().flatten().enumerate() {
        validate_label(label, index)?;
        labels.push(label);
    }
    Ok(order_labels(labels))
}

/// Dedupe and order labels that are already known to be well-formed.
pub(crate) fn order_labels<'a, I>(labels: I) -> Vec<Label>
where
    I: IntoIterator<Item = &'a Label>,
{
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut ordered: Vec<Label> = labels
        .into_iter()
        .filter(|&l| seen.insert((l.text.as_str(), l.language.as_str())))
        .cloned()
        .collect();

    let rank = |label: &Label| -> u8 {
        match label.language.as_str() {
            PRIMARY_LANGUAGE => 0,
            "" => 1,
            _ => 2,
        }
    };
    ordered.sort_by_key(|label| rank(label));
    ordered
}

/// Reconcile untyped label elements, e.g. straight from a JSON document.
///
/// Each element must be an object with a string `text` and an optional
/// string `language` (or `lang`). Anything else fails with `InvalidLabel`.
/// `None` and empty input give an empty list.
pub fn reconcile_values(values: Option<&[Value]>) -> LabelResult<Vec<Label>> {
    let Some(values) = values else {
        return Ok(Vec::new());
    };
    let labels = values
        .iter()
        .enumerate()
        .map(|(i, v)| label_from_value(v, i))
        .collect::<LabelResult<Vec<_>>>()?;
    reconcile(&labels)
}

fn label_from_value(value: &Value, index: usize) -> LabelResult<Label> {
    let invalid = |message: String| LabelError::InvalidLabel { index, message };

    let obj = value
        .as_object()
        .ok_or_else(|| invalid(format!("expected a label object, found {}", json_type(value))))?;
    let text = match obj.get("text") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => return Err(invalid(format!("`text` must be a string, found {}", json_type(other)))),
        None => return Err(invalid("missing `text`".into())),
    };
    let language = match obj.get("language").or_else(|| obj.get("lang")) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(invalid(format!(
                "`language` must be a string, found {}",
                json_type(other)
            )));
        }
    };
    let label = Label { text, language };
    validate_label(&label, index)?;
    Ok(label)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse the `text@lang` encoding used by SPARQL label aggregates.
///
/// The last `@` separates the language when what follows it is a language
/// tag (or nothing). Otherwise the whole value is text in `default_language`,
/// so addresses like `info@example.org` survive. The result is validated.
pub fn parse_encoded_label(value: &str, default_language: &str) -> LabelResult<Label> {
    let (text, language) = match value.rsplit_once('@') {
        Some((text, lang)) if is_valid_language(lang.trim()) => (text.trim(), lang.trim()),
        _ => (value.trim(), default_language),
    };
    let label = Label::new(text, language);
    validate_label(&label, 0)?;
    Ok(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn l(text: &str, lang: &str) -> Label {
        Label::new(text, lang)
    }

    #[test]
    fn english_moves_first() {
        let out = reconcile(&[l("Beweglichkeit", "de"), l("mobility", "en")]).unwrap();
        assert_eq!(out, vec![l("mobility", "en"), l("Beweglichkeit", "de")]);
    }

    #[test]
    fn single_label_unchanged() {
        let input = vec![l("Beweglichkeit", "de")];
        assert_eq!(reconcile(&input).unwrap(), input);
    }

    #[test]
    fn empty_and_null_inputs() {
        assert!(reconcile(&[]).unwrap().is_empty());
        assert!(reconcile_values(None).unwrap().is_empty());
        assert!(reconcile_values(Some(&[])).unwrap().is_empty());
    }

    #[test]
    fn unspecified_language_between_english_and_others() {
        let out = reconcile(&[
            l("Meter", "de"),
            l("metre", ""),
            l("mètre", "fr"),
            l("metre", "en"),
        ])
        .unwrap();
        assert_eq!(
            out,
            vec![l("metre", "en"), l("metre", ""), l("Meter", "de"), l("mètre", "fr")]
        );
    }

    #[test]
    fn other_languages_keep_encounter_order() {
        let out = reconcile(&[
            l("metro", "it"),
            l("Meter", "de"),
            l("metro", "es"),
            l("Metre", "de"),
        ])
        .unwrap();
        assert_eq!(
            out,
            vec![l("metro", "it"), l("Meter", "de"), l("metro", "es"), l("Metre", "de")]
        );
    }

    #[test]
    fn duplicates_collapse_to_first() {
        let out = reconcile_all([
            &[l("metre", "en"), l("Meter", "de")][..],
            &[l("Meter", "de"), l("meter", "en")][..],
        ])
        .unwrap();
        assert_eq!(out, vec![l("metre", "en"), l("meter", "en"), l("Meter", "de")]);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let input = vec![
            l("Länge", "de"),
            l("length", "en"),
            l("longueur", "fr"),
            l("length", ""),
            l("Länge", "de"),
        ];
        let once = reconcile(&input).unwrap();
        let twice = reconcile(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_non_label_elements() {
        let err = reconcile_values(Some(&[json!("string")])).unwrap_err();
        assert!(matches!(err, LabelError::InvalidLabel { index: 0, .. }));

        let err = reconcile_values(Some(&[json!({"text": "ok", "lang": "en"}), json!(42)])).unwrap_err();
        assert!(matches!(err, LabelError::InvalidLabel { index: 1, .. }));
    }

    #[test]
    fn accepts_label_objects() {
        let out = reconcile_values(Some(&[
            json!({"text": "Beweglichkeit", "lang": "de"}),
            json!({"text": "mobility", "language": "en"}),
        ]))
        .unwrap();
        assert_eq!(out, vec![l("mobility", "en"), l("Beweglichkeit", "de")]);
    }

    #[test]
    fn rejects_malformed_typed_labels() {
        assert!(reconcile(&[l("", "en")]).is_err());
        assert!(reconcile(&[l("x", "not a tag")]).is_err());
    }

    #[test]
    fn language_tags() {
        assert!(is_valid_language(""));
        assert!(is_valid_language("en"));
        assert!(is_valid_language("en-US"));
        assert!(is_valid_language("zh-Hant-TW"));
        assert!(!is_valid_language("e"));
        assert!(!is_valid_language("en_US"));
        assert!(!is_valid_language("en-"));
    }

    #[test]
    fn encoded_labels() {
        assert_eq!(parse_encoded_label("metre@en", "").unwrap(), l("metre", "en"));
        assert_eq!(parse_encoded_label("metre", "en").unwrap(), l("metre", "en"));
        assert_eq!(parse_encoded_label("metre@", "en").unwrap(), l("metre", ""));
        assert!(parse_encoded_label("@de", "").is_err());
        assert!(parse_encoded_label("@", "en").is_err());
    }

    #[test]
    fn at_sign_inside_text_is_kept() {
        assert_eq!(
            parse_encoded_label("a@b c", "").unwrap(),
            l("a@b c", "")
        );
        assert_eq!(
            parse_encoded_label("support@example.org", "en").unwrap(),
            l("support@example.org", "en")
        );
        assert_eq!(
            parse_encoded_label("support@example.org@de", "en").unwrap(),
            l("support@example.org", "de")
        );
    }
}
