use ahashmap::AHashSet;
use crate::error::{ResolveError, Result};
use dashmap::DashMap;
use packagejson::{BrowserField, PackageJsonRaw};
pub use packagejson::StringOrFalse as BrowserOverrideValue;
use packagejson_exports::{normalize_exports, normalize_imports, ExportsTable, ImportsTable};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// The normalized, cached view of a single `package.json` and its location (§3).
///
/// Immutable once built. Nested packages discovered during in-package traversal (§4.4) chain
/// upward through `parent`, not downward — the root package's entry in the process-wide cache
/// owns the whole chain's lifetime.
#[derive(Debug)]
pub struct PackageRecord {
    pub package_name: String,
    pub package_id: String,
    pub package_dir: PathBuf,
    pub package_json: Arc<PackageJsonRaw>,
    pub version: String,
    pub dependencies: AHashSet<String>,
    pub browser: Option<String>,
    pub browser_overrides: Option<ahashmap::AHashMap<String, BrowserOverrideValue>>,
    pub exports: ExportsTable,
    pub exports_enabled: bool,
    pub imports: ImportsTable,
    pub js_package_dir: PathBuf,
    pub parent: Option<Arc<PackageRecord>>,
}

impl PartialEq for PackageRecord {
    fn eq(&self, other: &Self) -> bool {
        self.package_id == other.package_id
    }
}

impl PackageRecord {
    /// `true` iff `other` is the same package instance, per §3 ("`package_id` is the sole
    /// reliable equality key").
    pub fn is_same_package(&self, other: &PackageRecord) -> bool {
        self.package_id == other.package_id
    }

    fn from_raw(
        raw: PackageJsonRaw,
        package_dir: PathBuf,
        js_package_dir: PathBuf,
        parent: Option<Arc<PackageRecord>>,
    ) -> Self {
        let version = raw.version.clone().unwrap_or_default();
        let package_name = raw.name.clone().unwrap_or_default();
        let package_id = format!("{}@{}", package_dir.display(), version);

        let (browser, browser_overrides) = match &raw.browser {
            Some(BrowserField::Main(main)) => (Some(main.clone()), None),
            Some(BrowserField::Overrides(map)) => {
                let overrides = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                (None, Some(overrides))
            }
            None => (None, None),
        };

        let exports = raw
            .exports
            .as_ref()
            .map(normalize_exports)
            .unwrap_or_default();
        let exports_enabled = !exports.is_empty();
        let imports = raw
            .imports
            .as_ref()
            .map(normalize_imports)
            .unwrap_or_default();
        let dependencies = raw.dependencies.clone();

        PackageRecord {
            package_name,
            package_id,
            package_dir,
            package_json: Arc::new(raw),
            version,
            dependencies,
            browser,
            browser_overrides,
            exports,
            exports_enabled,
            imports,
            js_package_dir,
            parent,
        }
    }
}

/// Caches parsed `package.json` files keyed on their absolute path, revalidated by mtime
/// (§3, §4.2, §8: "`read_package_json(f)` called twice with unchanged mtime returns the
/// identical cached object"). Concurrent misses for the same key are idempotent: whichever
/// thread wins the `DashMap` entry race, every caller observes the same final `Arc`.
#[derive(Debug, Default)]
pub struct PackageJsonCache {
    entries: DashMap<PathBuf, (SystemTime, Arc<PackageRecord>)>,
}

impl PackageJsonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses `<package_dir>/package.json`, constructing a [`PackageRecord`].
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn read_package_json(
        &self,
        package_dir: &Path,
        js_package_dir: &Path,
        parent: Option<Arc<PackageRecord>>,
    ) -> Result<Option<Arc<PackageRecord>>> {
        let file = package_dir.join("package.json");
        let metadata = match fs::metadata(&file) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ResolveError::FileInfoFailed {
                    file,
                    source: anyhow::Error::from(e),
                })
            }
        };
        let mtime = metadata.modified().map_err(|e| ResolveError::FileInfoFailed {
            file: file.clone(),
            source: anyhow::Error::from(e),
        })?;

        if let Some(entry) = self.entries.get(&file) {
            if entry.0 == mtime {
                return Ok(Some(Arc::clone(&entry.1)));
            }
        }

        tracing::debug!(file = %file.display(), "parsing package.json");
        let content = fs::read_to_string(&file).map_err(|e| ResolveError::FileInfoFailed {
            file: file.clone(),
            source: anyhow::Error::from(e),
        })?;
        let raw: PackageJsonRaw =
            serde_json::from_str(&content).map_err(|e| ResolveError::FileInfoFailed {
                file: file.clone(),
                source: anyhow::Error::from(e),
            })?;
        let record = Arc::new(PackageRecord::from_raw(
            raw,
            package_dir.to_path_buf(),
            js_package_dir.to_path_buf(),
            parent,
        ));

        self.entries
            .entry(file)
            .and_modify(|e| {
                if e.0 != mtime {
                    *e = (mtime, Arc::clone(&record));
                }
            })
            .or_insert_with(|| (mtime, Arc::clone(&record)));

        // Re-read back out so concurrent winners of the race above all observe the same Arc.
        let file = package_dir.join("package.json");
        Ok(self.entries.get(&file).map(|e| Arc::clone(&e.1)))
    }

    pub fn mark_dirty(&self, package_dir: &Path) {
        self.entries.remove(&package_dir.join("package.json"));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_tmpdir::{test_tmpdir, TmpDir};

    #[test]
    fn reads_and_caches_package_json_by_mtime() {
        let tmp = test_tmpdir!(
            "pkg/package.json" => r#"{"name": "pkg-a", "version": "1.0.0", "main": "lib/index.js"}"#
        );
        let cache = PackageJsonCache::new();
        let dir = tmp.root_join("pkg");
        let first = cache
            .read_package_json(&dir, &dir, None)
            .unwrap()
            .unwrap();
        let second = cache
            .read_package_json(&dir, &dir, None)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.package_name, "pkg-a");
        assert_eq!(first.version, "1.0.0");
    }

    #[test]
    fn missing_package_json_returns_none() {
        let tmp = TmpDir::new();
        let cache = PackageJsonCache::new();
        assert!(cache
            .read_package_json(tmp.root(), tmp.root(), None)
            .unwrap()
            .is_none());
    }
}
