use crate::error::{Result, WarehouseError};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Separator between labels in a multi-valued field.
pub const LABEL_SEPARATOR: char = ',';

/// Trim, lower-case, then replace anything outside `[a-zA-Z0-9_]` with `_`.
///
/// Idempotent: the output only contains characters the function keeps.
pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Raw tokens of a multi-valued field, trimmed, empty tokens skipped.
pub fn split_labels(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(LABEL_SEPARATOR)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// A normalized categorical token. Only [`Label::normalize`] builds one, so
/// the character class invariant always holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Label(String);

impl Label {
    pub fn normalize(raw: &str) -> Self {
        Self(normalize_label(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// A table, column or index name that is safe to template into SQL.
///
/// `Display` renders the double-quoted form, so `format!("{ident}")` is
/// always a valid quoted identifier. Quoting also covers names that start
/// with a digit or collide with keywords (`2d`, `user`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Cow<'static, str>);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if is_safe_identifier(&name) {
            Ok(Self(Cow::Owned(name)))
        } else {
            Err(WarehouseError::InvalidIdentifier(format!(
                "{name:?} must be 1-{MAX_IDENTIFIER_LEN} characters of [a-z0-9_]"
            )))
        }
    }

    /// For the fixed names of the warehouse schema; covered by
    /// `test_static_identifiers_are_safe`.
    pub(crate) const fn fixed(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// Picks a unique identifier for `base` among `taken`, truncating long names
/// and appending `_1`, `_2`, ... on collision. The result is recorded in
/// `taken`.
pub fn unique_identifier(base: &str, taken: &mut HashSet<String>) -> Result<Identifier> {
    let base = if base.is_empty() { "col" } else { base };
    let mut candidate = truncate(base, MAX_IDENTIFIER_LEN).to_owned();
    let mut count = 0;

    while taken.contains(&candidate) {
        count += 1;
        let suffix = format!("_{count}");
        candidate = format!(
            "{}{suffix}",
            truncate(base, MAX_IDENTIFIER_LEN - suffix.len())
        );
    }

    let identifier = Identifier::new(candidate.clone())?;
    taken.insert(candidate);
    Ok(identifier)
}

fn truncate(name: &str, max: usize) -> &str {
    // Callers only pass ASCII, but stay on a char boundary regardless.
    let mut end = name.len().min(max);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
