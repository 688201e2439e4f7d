//! Deserialization of the subset of `package.json` relevant to module resolution.
//!
//! The raw shapes here deliberately mirror the grammar a resolver needs, not the full
//! `package.json` schema: [`ExportValue`] is shared between the `"exports"` and `"imports"`
//! fields, since both allow the same string/array/conditional-map nesting.

use ahashmap::AHashSet;
use indexmap::IndexMap;
use serde::Deserialize;

/// A value found in a `package.json` `"exports"`/`"imports"` entry: a direct target, a list
/// of fallback candidates, or a map of condition name to nested value. `IndexMap` preserves
/// the authored key order of conditional maps, which matters for condition-list resolution
/// (§4.3): the object's own order does not decide anything (the caller's condition list does),
/// but round-tripping an unordered map would make debugging and golden-file tests
/// nondeterministic.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExportValue {
    /// `null`, used to explicitly block a subpath under a given condition.
    Blocked(Option<()>),
    Target(String),
    Array(Vec<ExportValue>),
    Conditional(IndexMap<String, ExportValue>),
}

fn deserialize_dependencies<'de, D>(deserializer: D) -> Result<AHashSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let map: Option<IndexMap<String, String>> = Option::deserialize(deserializer)?;
    Ok(map
        .map(|m| m.into_keys().collect())
        .unwrap_or_default())
}

/// Raw deserialization target for a `package.json` file: exactly the fields module
/// resolution needs, nothing more.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageJsonRaw {
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserField>,
    #[serde(default)]
    pub exports: Option<ExportValue>,
    #[serde(default)]
    pub imports: Option<IndexMap<String, ExportValue>>,
    #[serde(default, rename = "dependencies", deserialize_with = "deserialize_dependencies")]
    pub dependencies: AHashSet<String>,
}

/// package.json's `"browser"` field: either a single main-override string, or a map of
/// source path / bare specifier to replacement (string) or `false` (disabled).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    Main(String),
    Overrides(IndexMap<String, StringOrFalse>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StringOrFalse {
    Str(String),
    False(bool),
    /// Any other JSON shape. Node only ever writes a string or `false` here, but a malformed
    /// `package.json` shouldn't fail the whole parse over one bad override entry — the
    /// resolver surfaces this as an `invalid-override` error only if that specific entry is
    /// ever looked up.
    Other(serde_json::Value),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_conditional_exports_in_authored_order() {
        let raw: PackageJsonRaw = serde_json::from_str(
            r#"{
                "name": "pkg",
                "exports": {
                    ".": { "browser": "./browser.js", "default": "./index.js" }
                }
            }"#,
        )
        .unwrap();
        let ExportValue::Conditional(map) = raw.exports.unwrap() else {
            panic!("expected a path map");
        };
        let ExportValue::Conditional(cond) = map.get(".").unwrap() else {
            panic!("expected a conditional map");
        };
        let keys: Vec<&str> = cond.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["browser", "default"]);
    }

    #[test]
    fn parses_browser_overrides() {
        let raw: PackageJsonRaw = serde_json::from_str(
            r#"{"name": "pkg", "browser": {"fs": false, "./a.js": "./b.js"}}"#,
        )
        .unwrap();
        match raw.browser.unwrap() {
            BrowserField::Overrides(m) => {
                assert_eq!(m.get("fs"), Some(&StringOrFalse::False(false)));
                assert_eq!(
                    m.get("./a.js"),
                    Some(&StringOrFalse::Str("./b.js".to_string()))
                );
            }
            _ => panic!("expected overrides map"),
        }
    }

    #[test]
    fn collects_dependency_names_only() {
        let raw: PackageJsonRaw = serde_json::from_str(
            r#"{"name": "pkg", "dependencies": {"left-pad": "^1.0.0", "is-odd": "2.0.0"}}"#,
        )
        .unwrap();
        let mut deps: Vec<&str> = raw.dependencies.iter().map(String::as_str).collect();
        deps.sort_unstable();
        assert_eq!(deps, vec!["is-odd", "left-pad"]);
    }
}
