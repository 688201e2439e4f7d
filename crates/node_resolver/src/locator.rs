use crate::error::Result;
use crate::package::{PackageJsonCache, PackageRecord};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Finds and caches [`PackageRecord`]s by bare package name (§4.5).
///
/// Holds the process-wide `packages` cache from §3: bare name → `PackageRecord` or `None` (a
/// `None` entry is a cached negative lookup, "known absent", and is as authoritative as a
/// positive one for callers).
#[derive(Debug)]
pub struct PackageLocator {
    js_package_dirs: Vec<PathBuf>,
    packages: DashMap<String, Option<Arc<PackageRecord>>>,
    package_json_cache: Arc<PackageJsonCache>,
}

/// Splits a require string into successively longer dotted-path prefixes (`a`, `a/b`,
/// `a/b/c`, ...) that are candidate package names, per §4.5's name discovery loop. The
/// starting length honors scoped names (`@scope/name` always needs at least two segments),
/// reusing [`path_utils::split_package_import`]'s scope-aware minimal split rather than
/// re-detecting `@`-prefixes here.
fn name_candidates(require: &str) -> Vec<String> {
    let Some((minimal, _)) = path_utils::split_package_import(require) else {
        return Vec::new();
    };
    let min_len = minimal.split('/').count();
    let segments: Vec<&str> = require.split('/').collect();
    if segments.len() < min_len {
        return Vec::new();
    }
    (min_len..=segments.len())
        .map(|n| segments[..n].join("/"))
        .collect()
}

impl PackageLocator {
    pub fn new(js_package_dirs: Vec<PathBuf>, package_json_cache: Arc<PackageJsonCache>) -> Self {
        Self {
            js_package_dirs,
            packages: DashMap::new(),
            package_json_cache,
        }
    }

    pub fn js_package_dirs(&self) -> &[PathBuf] {
        &self.js_package_dirs
    }

    /// Looks up `name` across every configured package root, in order; first hit wins.
    /// Results (including misses) are cached by the exact name.
    pub fn find_package(&self, name: &str) -> Result<Option<Arc<PackageRecord>>> {
        if let Some(cached) = self.packages.get(name) {
            return Ok(cached.clone());
        }

        for root in &self.js_package_dirs {
            let package_dir = root.join(name);
            if let Some(record) =
                self.package_json_cache
                    .read_package_json(&package_dir, root, None)?
            {
                self.packages.insert(name.to_string(), Some(Arc::clone(&record)));
                return Ok(Some(record));
            }
        }

        self.packages.insert(name.to_string(), None);
        Ok(None)
    }

    /// Resolves `require` to a package, preferring a nested install under `require_from`'s
    /// package before falling back to the configured package roots (§4.5).
    ///
    /// Returns the matched package plus `match_name`, the prefix of `require` that named it
    /// (everything after is a package-relative subpath).
    pub fn find_package_for_require(
        &self,
        require_from: Option<(&Path, &Path)>, // (package_dir, js_package_dir)
        require: &str,
        allow_nested_packages: bool,
    ) -> Result<Option<(Arc<PackageRecord>, String)>> {
        let candidates = name_candidates(require);
        if candidates.is_empty() {
            return Ok(None);
        }

        if allow_nested_packages {
            if let Some((start_dir, js_package_dir)) = require_from {
                if let Some(found) =
                    self.find_nested(start_dir, js_package_dir, &candidates)?
                {
                    return Ok(Some(found));
                }
            }
        }

        for name in &candidates {
            if let Some(record) = self.find_package(name)? {
                return Ok(Some((record, name.clone())));
            }
        }

        Ok(None)
    }

    fn find_nested(
        &self,
        start_dir: &Path,
        js_package_dir: &Path,
        candidates: &[String],
    ) -> Result<Option<(Arc<PackageRecord>, String)>> {
        let mut dir = start_dir;
        loop {
            let is_node_modules_segment = dir
                .file_name()
                .map(|f| f == "node_modules")
                .unwrap_or(false);

            if !is_node_modules_segment {
                for name in candidates {
                    let candidate_dir = dir.join("node_modules").join(name);
                    if let Some(record) = self.package_json_cache.read_package_json(
                        &candidate_dir,
                        js_package_dir,
                        None,
                    )? {
                        return Ok(Some((record, name.clone())));
                    }
                }
            }

            if dir == js_package_dir {
                return Ok(None);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_tmpdir::test_tmpdir;

    #[test]
    fn finds_package_in_configured_root() {
        let tmp = test_tmpdir!(
            "node_modules/pkg-a/package.json" => r#"{"name": "pkg-a", "main": "index.js"}"#
        );
        let root = tmp.root_join("node_modules");
        let locator = PackageLocator::new(vec![root], Arc::new(PackageJsonCache::new()));
        let found = locator.find_package("pkg-a").unwrap().unwrap();
        assert_eq!(found.package_name, "pkg-a");
        // negative cache
        assert!(locator.find_package("missing").unwrap().is_none());
        assert!(locator.find_package("missing").unwrap().is_none());
    }

    #[test]
    fn splits_scoped_and_plain_name_candidates() {
        assert_eq!(
            name_candidates("@scope/name/sub/path"),
            vec![
                "@scope/name".to_string(),
                "@scope/name/sub".to_string(),
                "@scope/name/sub/path".to_string(),
            ]
        );
        assert_eq!(
            name_candidates("plain/sub"),
            vec!["plain".to_string(), "plain/sub".to_string()]
        );
    }

    #[test]
    fn finds_nested_install_before_root() {
        let tmp = test_tmpdir!(
            "node_modules/pkg-a/package.json" => r#"{"name": "pkg-a", "version": "1.0.0"}"#,
            "node_modules/pkg-a/node_modules/dep/package.json" => r#"{"name": "dep", "version": "2.0.0"}"#,
            "node_modules/dep/package.json" => r#"{"name": "dep", "version": "1.0.0"}"#
        );
        let root = tmp.root_join("node_modules");
        let locator = PackageLocator::new(vec![root.clone()], Arc::new(PackageJsonCache::new()));
        let pkg_a_dir = root.join("pkg-a");
        let (found, match_name) = locator
            .find_package_for_require(Some((&pkg_a_dir, &root)), "dep", true)
            .unwrap()
            .unwrap();
        assert_eq!(match_name, "dep");
        assert_eq!(found.version, "2.0.0");
    }
}
