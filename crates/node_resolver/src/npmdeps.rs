//! Classpath npm-deps aggregation (§4.10, supplemented).

use ahashmap::AHashSet;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct DepsManifest {
    #[serde(rename = "npm-deps", default)]
    npm_deps: indexmap::IndexMap<String, String>,
}

/// Scans `classpath` for `manifest_name` files and flattens their `"npm-deps"` keys into a
/// single set of declared package names. A manifest that's missing is silently skipped; one
/// that exists but fails to parse is logged and skipped too — it must not fail construction.
pub fn scan_npm_deps(classpath: &[PathBuf], manifest_name: &str) -> AHashSet<String> {
    let mut deps = AHashSet::default();
    for root in classpath {
        let manifest_path = root.join(manifest_name);
        let content = match fs::read_to_string(&manifest_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!(file = %manifest_path.display(), error = %e, "failed to read npm deps manifest");
                continue;
            }
        };
        match serde_json::from_str::<DepsManifest>(&content) {
            Ok(manifest) => deps.extend(manifest.npm_deps.into_keys()),
            Err(e) => {
                tracing::warn!(file = %manifest_path.display(), error = %e, "failed to parse npm deps manifest");
            }
        }
    }
    deps
}

#[cfg(test)]
mod test {
    use super::*;
    use test_tmpdir::test_tmpdir;

    #[test]
    fn aggregates_npm_deps_across_classpath_roots() {
        let tmp = test_tmpdir!(
            "a/deps.cljs" => r#"{"npm-deps": {"left-pad": "1.0.0"}}"#,
            "b/deps.cljs" => r#"{"npm-deps": {"is-odd": "2.0.0"}}"#
        );
        let deps = scan_npm_deps(&[tmp.root_join("a"), tmp.root_join("b")], "deps.cljs");
        assert!(deps.contains("left-pad"));
        assert!(deps.contains("is-odd"));
    }

    #[test]
    fn missing_manifest_is_not_fatal() {
        let tmp = test_tmpdir!("a/deps.cljs" => r#"{"npm-deps": {"left-pad": "1.0.0"}}"#);
        let deps = scan_npm_deps(&[tmp.root_join("a"), tmp.root_join("missing")], "deps.cljs");
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn malformed_manifest_is_skipped_not_fatal() {
        let tmp = test_tmpdir!(
            "a/deps.cljs" => "not json",
            "b/deps.cljs" => r#"{"npm-deps": {"left-pad": "1.0.0"}}"#
        );
        let deps = scan_npm_deps(&[tmp.root_join("a"), tmp.root_join("b")], "deps.cljs");
        assert_eq!(deps.len(), 1);
        assert!(deps.contains("left-pad"));
    }
}
