//! Normalizes and matches a package's `"exports"`/`"imports"` fields.
//!
//! Unlike a flattened per-condition precomputation, this keeps the raw [`ExportValue`] for
//! each matched key and resolves conditions lazily at lookup time, so a caller can pass a
//! fresh condition list per resolution (e.g. `require` vs `import`) without re-normalizing
//! the package.

use ahashmap::AHashMap;
use packagejson::ExportValue;

/// Normalized view of a package's `"exports"` field: three buckets, checked in order —
/// exact, then prefix (longest first), then wildcard (authored order).
#[derive(Debug, Default, Clone)]
pub struct ExportsTable {
    exact: AHashMap<String, ExportValue>,
    /// `(prefix, value)`, sorted by descending prefix length — longest match wins.
    prefix: Vec<(String, ExportValue)>,
    /// `(prefix, suffix, value)`; `suffix` is `None` when the `*` is the final character.
    wildcard: Vec<(String, Option<String>, ExportValue)>,
}

impl ExportsTable {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefix.is_empty() && self.wildcard.is_empty()
    }
}

/// Normalized view of a package's `"imports"` field: exact subpaths plus at most a single
/// `*` wildcard per key.
#[derive(Debug, Default, Clone)]
pub struct ImportsTable {
    exact: AHashMap<String, ExportValue>,
    wildcard: Vec<(String, Option<String>, ExportValue)>,
}

impl ImportsTable {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_empty()
    }
}

fn split_wildcard(key: &str) -> Option<(String, Option<String>)> {
    let (prefix, suffix) = key.split_once('*')?;
    let suffix = if suffix.is_empty() {
        None
    } else {
        Some(suffix.to_string())
    };
    Some((prefix.to_string(), suffix))
}

/// Normalizes a raw `"exports"` field into an [`ExportsTable`]. Invalid shapes (a key with
/// more than one `*`) are logged and dropped rather than rejecting the whole map.
///
/// `package.json` doesn't structurally distinguish a subpath map (`{".": ..., "./sub":
/// ...}`) from a root-level condition map (`{"import": ..., "require": ...}`) — both
/// deserialize to the same [`ExportValue::Conditional`] shape. Node's rule, followed here: if
/// the first key begins with `.`, it's a subpath map; otherwise the whole value is the match
/// value for `"."`.
pub fn normalize_exports(value: &ExportValue) -> ExportsTable {
    let mut table = ExportsTable::default();

    let path_map = match value {
        ExportValue::Conditional(map) => match map.keys().next() {
            Some(first) if first.starts_with('.') => map,
            _ => {
                table.exact.insert(".".to_string(), value.clone());
                return table;
            }
        },
        other => {
            table.exact.insert(".".to_string(), other.clone());
            return table;
        }
    };

    for (key, value) in path_map {
        let star_count = key.chars().filter(|c| *c == '*').count();
        if star_count > 1 {
            tracing::warn!(key, "exports key has more than one '*', ignoring entry");
            continue;
        }

        if star_count == 1 {
            if let Some((prefix, suffix)) = split_wildcard(key) {
                table.wildcard.push((prefix, suffix, value.clone()));
            }
        } else if key.ends_with('/') {
            table.prefix.push((key.clone(), value.clone()));
        } else {
            table.exact.insert(key.clone(), value.clone());
        }
    }

    table
        .prefix
        .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
    table
}

/// Normalizes a raw `"imports"` field into an [`ImportsTable`]. Keys not starting with `#`
/// are invalid and dropped.
pub fn normalize_imports(raw: &indexmap::IndexMap<String, ExportValue>) -> ImportsTable {
    let mut table = ImportsTable::default();
    for (key, value) in raw {
        if !key.starts_with('#') {
            tracing::warn!(key, "imports key does not start with '#', ignoring entry");
            continue;
        }
        let star_count = key.chars().filter(|c| *c == '*').count();
        if star_count > 1 {
            tracing::warn!(key, "imports key has more than one '*', ignoring entry");
            continue;
        }
        if star_count == 1 {
            if let Some((prefix, suffix)) = split_wildcard(key) {
                table.wildcard.push((prefix, suffix, value.clone()));
            }
        } else {
            table.exact.insert(key.clone(), value.clone());
        }
    }
    table
}

/// Default condition precedence used when a caller doesn't configure one.
pub const DEFAULT_CONDITIONS: &[&str] = &["browser", "require", "default", "module", "import"];

/// Resolves a matched [`ExportValue`] down to a single target path string.
///
/// - a string resolves to itself
/// - an array resolves to the first element that itself resolves to a string (no existence
///   check is performed here; that's the caller's job, against the real filesystem)
/// - a conditional map resolves via the first present condition in `conditions`
/// - an explicit `null` never resolves
pub fn find_exports_replacement(value: &ExportValue, conditions: &[String]) -> Option<String> {
    match value {
        ExportValue::Blocked(_) => None,
        ExportValue::Target(s) => Some(s.clone()),
        ExportValue::Array(items) => items
            .iter()
            .find_map(|item| find_exports_replacement(item, conditions)),
        ExportValue::Conditional(map) => conditions
            .iter()
            .find_map(|cond| map.get(cond.as_str()))
            .and_then(|v| find_exports_replacement(v, conditions)),
    }
}

/// Result of an exact-key lookup: distinguishes "no such key" (try the next match tier) from
/// "key present, but no condition resolved" (closed packages must fail here, not fall
/// through to prefix/wildcard entries — a literal match is authoritative).
pub fn match_exact(
    table: &ExportsTable,
    subpath: &str,
    conditions: &[String],
) -> Option<Option<String>> {
    table
        .exact
        .get(subpath)
        .map(|value| find_exports_replacement(value, conditions))
}

/// Yields resolved replacement targets for every prefix entry whose prefix matches
/// `subpath`, longest-prefix-first, with the path suffix already appended.
pub fn match_prefix_candidates<'a>(
    table: &'a ExportsTable,
    subpath: &'a str,
    conditions: &'a [String],
) -> impl Iterator<Item = String> + 'a {
    table.prefix.iter().filter_map(move |(prefix, value)| {
        let suffix = subpath.strip_prefix(prefix.as_str())?;
        find_exports_replacement(value, conditions).map(|target| format!("{target}{suffix}"))
    })
}

/// Yields resolved replacement targets for every wildcard entry matching `subpath`, in
/// authored order, with `*` substituted into the target.
pub fn match_wildcard_candidates<'a>(
    table: &'a ExportsTable,
    subpath: &'a str,
    conditions: &'a [String],
) -> impl Iterator<Item = String> + 'a {
    table
        .wildcard
        .iter()
        .filter_map(move |(prefix, suffix, value)| {
            let fill = match_star(prefix, suffix.as_deref(), subpath)?;
            find_exports_replacement(value, conditions)
                .map(|target| target.replacen('*', fill, 1))
        })
}

fn match_star<'a>(prefix: &str, suffix: Option<&str>, subpath: &'a str) -> Option<&'a str> {
    let remainder = subpath.strip_prefix(prefix)?;
    match suffix {
        None => Some(remainder),
        Some(suffix) => remainder.strip_suffix(suffix),
    }
}

/// Matches a `#`-prefixed subpath against an [`ImportsTable`] (exact, then wildcard).
pub fn match_imports(
    table: &ImportsTable,
    subpath: &str,
    conditions: &[String],
) -> Option<Option<String>> {
    if let Some(value) = table.exact.get(subpath) {
        return Some(find_exports_replacement(value, conditions));
    }
    for (prefix, suffix, value) in &table.wildcard {
        if let Some(fill) = match_star(prefix, suffix.as_deref(), subpath) {
            if let Some(target) = find_exports_replacement(value, conditions) {
                return Some(Some(target.replacen('*', fill, 1)));
            }
        }
    }
    None
}
