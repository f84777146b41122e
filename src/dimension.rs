//! Dimension vectors and the canonical dimension key.
//!
//! Every source encodes physical dimension differently: QUDT uses lettered
//! vectors (`A0E0L1I0M0H0T-2D0`), OM2 exposes one exponent per base
//! dimension, and hand-maintained feeds use flat comma lists. All of them are
//! parsed into a [`DimensionVector`] whose [`DimensionKey`] is the join
//! predicate across sources.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DimensionError, DimensionResult};

/// Key emitted for the "not applicable" sentinel. Never matches anything.
pub const NOT_APPLICABLE_KEY: &str = "not-applicable";

const SENTINEL_TOKENS: &[&str] = &["n/a", "na", "not-applicable", "not applicable", "none"];

static RE_QUDT_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z])([+-]?\d+(?:\.\d+)?(?:/\d+)?)").unwrap()
});

// ── Rational exponents ──────────────────────────────────────────────────

/// A signed rational number kept in lowest terms with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Rational {
    numer: i64,
    denom: i64,
}

impl Rational {
    pub const ZERO: Self = Self { numer: 0, denom: 1 };

    /// Build a reduced rational. Returns `None` for a zero denominator or
    /// when the reduced value does not fit in `i64` (e.g. `i64::MIN / -1`).
    pub fn new(numer: i64, denom: i64) -> Option<Self> {
        if denom == 0 {
            return None;
        }
        let (numer, denom) = (i128::from(numer), i128::from(denom));
        let sign = if denom < 0 { -1 } else { 1 };
        let g = gcd(numer.unsigned_abs(), denom.unsigned_abs()).max(1) as i128;
        Some(Self {
            numer: i64::try_from(sign * numer / g).ok()?,
            denom: i64::try_from(sign * denom / g).ok()?,
        })
    }

    pub fn integer(value: i64) -> Self {
        Self {
            numer: value,
            denom: 1,
        }
    }

    pub fn numer(&self) -> i64 {
        self.numer
    }

    pub fn denom(&self) -> i64 {
        self.denom
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.denom == 1 {
            write!(f, "{}", self.numer)
        } else {
            write!(f, "{}/{}", self.numer, self.denom)
        }
    }
}

impl std::str::FromStr for Rational {
    type Err = String;

    /// Accepts integers (`-2`), decimals (`-0.5`) and fractions (`3/2`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty exponent".into());
        }
        if let Some((n, d)) = s.split_once('/') {
            let numer: i64 = n.trim().parse().map_err(|_| format!("non-numeric exponent \"{s}\""))?;
            let denom: i64 = d.trim().parse().map_err(|_| format!("non-numeric exponent \"{s}\""))?;
            if denom == 0 {
                return Err(format!("zero denominator in \"{s}\""));
            }
            return Rational::new(numer, denom).ok_or_else(|| format!("exponent out of range \"{s}\""));
        }
        if let Some((int_part, frac_part)) = s.split_once('.') {
            if frac_part.is_empty()
                || frac_part.len() > 12
                || !frac_part.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(format!("non-numeric exponent \"{s}\""));
            }
            let (negative, int_digits) = match int_part.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, int_part.strip_prefix('+').unwrap_or(int_part)),
            };
            if !int_digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("non-numeric exponent \"{s}\""));
            }
            let whole: i64 = if int_digits.is_empty() {
                0
            } else {
                int_digits
                    .parse()
                    .map_err(|_| format!("non-numeric exponent \"{s}\""))?
            };
            let scale = 10_i64.pow(frac_part.len() as u32);
            let frac: i64 = frac_part
                .parse()
                .map_err(|_| format!("non-numeric exponent \"{s}\""))?;
            let magnitude = whole
                .checked_mul(scale)
                .and_then(|w| w.checked_add(frac))
                .ok_or_else(|| format!("exponent out of range \"{s}\""))?;
            let numer = if negative { -magnitude } else { magnitude };
            return Rational::new(numer, scale).ok_or_else(|| format!("invalid exponent \"{s}\""));
        }
        s.parse::<i64>()
            .map(Rational::integer)
            .map_err(|_| format!("non-numeric exponent \"{s}\""))
    }
}

impl From<Rational> for String {
    fn from(value: Rational) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Rational {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<i64> for Rational {
    fn from(value: i64) -> Self {
        Self::integer(value)
    }
}

// ── Base dimensions ─────────────────────────────────────────────────────

/// The seven SI base dimensions, in canonical key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseDimension {
    Length,
    Mass,
    Time,
    Current,
    Temperature,
    Amount,
    LuminousIntensity,
}

impl BaseDimension {
    pub const ALL: [BaseDimension; 7] = [
        Self::Length,
        Self::Mass,
        Self::Time,
        Self::Current,
        Self::Temperature,
        Self::Amount,
        Self::LuminousIntensity,
    ];

    /// Position in the exponent array.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Letter used in the canonical key.
    pub fn key_symbol(self) -> &'static str {
        match self {
            Self::Length => "L",
            Self::Mass => "M",
            Self::Time => "T",
            Self::Current => "I",
            Self::Temperature => "H",
            Self::Amount => "N",
            Self::LuminousIntensity => "J",
        }
    }

    /// Letter used in QUDT dimension vectors.
    pub fn qudt_letter(self) -> char {
        match self {
            Self::Length => 'L',
            Self::Mass => 'M',
            Self::Time => 'T',
            Self::Current => 'E',
            Self::Temperature => 'H',
            Self::Amount => 'A',
            Self::LuminousIntensity => 'I',
        }
    }

    fn from_qudt_letter(letter: char) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.qudt_letter() == letter)
    }

    /// Name used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Mass => "mass",
            Self::Time => "time",
            Self::Current => "current",
            Self::Temperature => "temperature",
            Self::Amount => "amount",
            Self::LuminousIntensity => "luminous_intensity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }
}

impl std::fmt::Display for BaseDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Dimension vector ────────────────────────────────────────────────────

/// Exponents of the seven SI base dimensions, or the "not applicable" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionVector {
    Exponents([Rational; 7]),
    NotApplicable,
}

impl DimensionVector {
    /// All exponents zero (ratios, counts, angles).
    pub fn dimensionless() -> Self {
        Self::Exponents([Rational::ZERO; 7])
    }

    /// Build from a sparse list of `(dimension, exponent)` pairs; absent dimensions are 0.
    pub fn from_pairs(pairs: &[(BaseDimension, i64)]) -> Self {
        let mut exponents = [Rational::ZERO; 7];
        for &(dim, exp) in pairs {
            exponents[dim.index()] = Rational::integer(exp);
        }
        Self::Exponents(exponents)
    }

    /// Like [`DimensionVector::from_pairs`] with rational exponents.
    pub fn from_rational_pairs(pairs: &[(BaseDimension, Rational)]) -> Self {
        let mut exponents = [Rational::ZERO; 7];
        for &(dim, exp) in pairs {
            exponents[dim.index()] = exp;
        }
        Self::Exponents(exponents)
    }

    pub fn is_applicable(&self) -> bool {
        matches!(self, Self::Exponents(_))
    }

    pub fn exponent(&self, dim: BaseDimension) -> Option<Rational> {
        match self {
            Self::Exponents(exps) => Some(exps[dim.index()]),
            Self::NotApplicable => None,
        }
    }

    /// The canonical join key for this vector.
    pub fn key(&self) -> DimensionKey {
        match self {
            Self::NotApplicable => DimensionKey(NOT_APPLICABLE_KEY.to_string()),
            Self::Exponents(exps) => {
                let mut key = String::with_capacity(24);
                for dim in BaseDimension::ALL {
                    key.push_str(dim.key_symbol());
                    key.push_str(&exps[dim.index()].to_string());
                }
                DimensionKey(key)
            }
        }
    }
}

/// Canonical, deterministic rendering of a dimension vector, e.g. `L1M0T-2I0H0N0J0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionKey(String);

impl DimensionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the sentinel key that never matches.
    pub fn is_not_applicable(&self) -> bool {
        self.0 == NOT_APPLICABLE_KEY
    }
}

impl std::fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Parsing ─────────────────────────────────────────────────────────────

fn invalid(input: &str, message: impl Into<String>) -> DimensionError {
    DimensionError::InvalidDimension {
        input: input.to_string(),
        message: message.into(),
    }
}

/// Parse any supported single-string encoding.
///
/// QUDT vectors (optionally as a full dimension-vector IRI) and flat
/// seven-exponent lists are detected automatically; sentinel tokens such as
/// `n/a` yield [`DimensionVector::NotApplicable`].
pub fn parse_dimension(input: &str) -> DimensionResult<DimensionVector> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input, "empty dimension encoding"));
    }
    if SENTINEL_TOKENS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return Ok(DimensionVector::NotApplicable);
    }

    let body = if trimmed.contains("://") {
        trimmed
            .rsplit(['/', '#'])
            .next()
            .unwrap_or(trimmed)
    } else {
        trimmed
    };

    if body.starts_with(|c: char| c.is_ascii_uppercase()) {
        parse_qudt_vector(body).map_err(|e| relabel(e, input))
    } else {
        parse_flat_vector(body).map_err(|e| relabel(e, input))
    }
}

fn relabel(err: DimensionError, input: &str) -> DimensionError {
    let DimensionError::InvalidDimension { message, .. } = err;
    invalid(input, message)
}

/// Parse a QUDT lettered vector such as `A0E0L1I0M0H0T-2D0`.
///
/// Letters absent from the string count as exponent 0. The `D` term only
/// marks dimensionless vectors in QUDT and carries no exponent of its own.
pub fn parse_qudt_vector(input: &str) -> DimensionResult<DimensionVector> {
    let mut exponents = [Rational::ZERO; 7];
    let mut seen = [false; 7];
    let mut cursor = 0;
    let mut terms = 0;

    for caps in RE_QUDT_TERM.captures_iter(input) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        if whole.start != cursor {
            return Err(invalid(
                input,
                format!("unexpected text \"{}\"", &input[cursor..whole.start]),
            ));
        }
        cursor = whole.end;
        terms += 1;

        let letter = caps[1].chars().next().unwrap_or(' ');
        let exponent: Rational = caps[2].parse().map_err(|e: String| invalid(input, e))?;
        if letter == 'D' {
            continue;
        }
        let dim = BaseDimension::from_qudt_letter(letter)
            .ok_or_else(|| invalid(input, format!("unknown dimension letter '{letter}'")))?;
        if seen[dim.index()] {
            return Err(invalid(input, format!("dimension letter '{letter}' repeated")));
        }
        seen[dim.index()] = true;
        exponents[dim.index()] = exponent;
    }

    if cursor != input.len() {
        return Err(invalid(
            input,
            format!("unexpected text \"{}\"", &input[cursor..]),
        ));
    }
    if terms == 0 {
        return Err(invalid(input, "no dimension terms"));
    }
    Ok(DimensionVector::Exponents(exponents))
}

/// Parse seven exponents in canonical order, separated by commas or whitespace.
pub fn parse_flat_vector(input: &str) -> DimensionResult<DimensionVector> {
    let inner = input
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);
    let tokens: Vec<&str> = inner
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() != BaseDimension::ALL.len() {
        return Err(invalid(
            input,
            format!("expected 7 exponents, found {}", tokens.len()),
        ));
    }
    let mut exponents = [Rational::ZERO; 7];
    for (slot, token) in exponents.iter_mut().zip(tokens) {
        *slot = token.parse().map_err(|e: String| invalid(input, e))?;
    }
    Ok(DimensionVector::Exponents(exponents))
}

/// Build a vector from one exponent string per base dimension (OM2 style).
///
/// Returns `Ok(None)` when no dimension is present at all.
pub fn from_exponent_fields(
    fields: &BTreeMap<BaseDimension, &str>,
) -> DimensionResult<Option<DimensionVector>> {
    if fields.is_empty() {
        return Ok(None);
    }
    let mut exponents = [Rational::ZERO; 7];
    for (&dim, &value) in fields {
        exponents[dim.index()] = value.parse().map_err(|e: String| {
            invalid(value, format!("{dim}: {e}"))
        })?;
    }
    Ok(Some(DimensionVector::Exponents(exponents)))
}

/// Canonical key for any supported single-string encoding.
pub fn dimension_key(input: &str) -> DimensionResult<DimensionKey> {
    parse_dimension(input).map(|v| v.key())
}
