use crate::error::{ResolveError, Result};
use crate::resource::{ResourceId, ResourceKind, ResourceRecord, ResourceType, INSPECTOR_CACHE_KEY, NPM_CACHE_KEY};
use crate::Service;
use dashmap::DashMap;
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// The schema an external JS parser reports back for a single file (§4.7, §6). This crate
/// treats the parser as an opaque collaborator — see [`Inspector`].
#[derive(Debug, Clone, Default)]
pub struct InspectionResult {
    pub js_requires: Vec<String>,
    pub js_imports: Vec<String>,
    pub js_dynamic_imports: Vec<String>,
    pub js_invalid_requires: Vec<String>,
    pub js_errors: Vec<String>,
    pub js_warnings: Vec<String>,
    pub js_language: String,
    pub uses_global_buffer: bool,
    pub uses_global_process: bool,
}

/// The external JS parser collaborator (§6): given a file and its source, reports the
/// requires/imports it statically discovers plus a couple of global-usage flags. Out of
/// scope for this crate to implement — the downstream compiler supplies a real one.
pub trait Inspector: Send + Sync {
    fn inspect(&self, file: &Path, source: &str) -> anyhow::Result<InspectionResult>;
}

/// An in-memory fake used by this crate's own tests: returns a caller-configured
/// [`InspectionResult`] per file, or an empty one for unconfigured files.
#[derive(Debug, Default)]
pub struct FakeInspector {
    results: DashMap<PathBuf, InspectionResult>,
}

impl FakeInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, file: impl Into<PathBuf>, result: InspectionResult) {
        self.results.insert(file.into(), result);
    }
}

impl Inspector for FakeInspector {
    fn inspect(&self, file: &Path, _source: &str) -> anyhow::Result<InspectionResult> {
        Ok(self
            .results
            .get(file)
            .map(|r| r.clone())
            .unwrap_or_default())
    }
}

/// Caches resolved [`ResourceRecord`]s by absolute file path (the `files` cache of §3). No
/// explicit invalidation: a caller who suspects a file changed discards the entry itself via
/// [`FileInfoCache::mark_dirty`].
#[derive(Debug, Default)]
pub struct FileInfoCache {
    entries: DashMap<PathBuf, Arc<ResourceRecord>>,
}

impl FileInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&self, file: &Path) {
        self.entries.remove(file);
    }
}

fn dedup_preserve_order(lists: [&[String]; 3]) -> Vec<String> {
    let mut seen = ahashmap::AHashSet::default();
    let mut out = Vec::new();
    for list in lists {
        for item in list {
            let rewritten = item
                .strip_prefix("goog:")
                .map(str::to_string)
                .unwrap_or_else(|| item.clone());
            if seen.insert(rewritten.clone()) {
                out.push(rewritten);
            }
        }
    }
    out
}

/// Extracts file info for a resolved file (§4.7), consulting and filling `service`'s `files`
/// cache. `.json` files get a minimal resource with no dependency parse; everything else goes
/// through the configured [`Inspector`].
pub fn get_file_info(service: &Service, file: &Path) -> Result<Arc<ResourceRecord>> {
    if let Some(cached) = service.file_info_cache.entries.get(file) {
        return Ok(Arc::clone(&cached));
    }

    let metadata = std::fs::metadata(file)
        .map_err(|e| ResolveError::FileInfoFailed {
            file: file.to_path_buf(),
            source: anyhow::Error::from(e),
        })?;
    let last_modified = metadata.modified().ok();
    let resource_name = path_utils::resource_name_for_file(
        file,
        &service.js_package_dirs,
        &service.config.project_dir,
    )
    .map_err(|e| ResolveError::FilesOutsideProject(match e {
        path_utils::PathUtilsError::FilesOutsideProject(p) => p,
    }))?;
    let ns = path_utils::module_name_for_resource(&resource_name);
    let output_name = path_utils::output_name_for_resource(&ns, &resource_name);

    let is_json = file.extension().map(|e| e == "json").unwrap_or(false);

    let record = if is_json {
        Arc::new(ResourceRecord {
            resource_id: ResourceId {
                kind: ResourceKind::Resource,
                resource_name: resource_name.clone(),
            },
            resource_name,
            output_name,
            ns: ns.clone(),
            file: Some(file.to_path_buf()),
            last_modified,
            source: fs::read_to_string(file).map_err(|e| ResolveError::FileInfoFailed {
                file: file.to_path_buf(),
                source: anyhow::Error::from(e),
            })?,
            cache_key: Vec::new(),
            provides: vec![ns],
            requires: Vec::new(),
            js_deps: Vec::new(),
            deps: Vec::new(),
            package: None,
            resource_type: ResourceType::Js,
        })
    } else {
        let source = fs::read_to_string(file).map_err(|e| ResolveError::FileInfoFailed {
            file: file.to_path_buf(),
            source: anyhow::Error::from(e),
        })?;
        let inspected = service
            .inspector
            .inspect(file, &source)
            .map_err(|source| ResolveError::FileInfoFailed {
                file: file.to_path_buf(),
                source,
            })?;

        if !inspected.js_errors.is_empty() {
            return Err(ResolveError::FileInfoErrors {
                file: file.to_path_buf(),
                count: inspected.js_errors.len(),
            });
        }
        for invalid in &inspected.js_invalid_requires {
            tracing::info!(file = %file.display(), invalid, "invalid computed require");
        }
        for warning in &inspected.js_warnings {
            tracing::warn!(file = %file.display(), warning, "inspector warning");
        }

        let mut deps = dedup_preserve_order([
            &inspected.js_requires,
            &inspected.js_imports,
            &inspected.js_dynamic_imports,
        ]);
        if inspected.uses_global_buffer {
            deps.push("buffer".to_string());
        }
        if inspected.uses_global_process {
            deps.push("process".to_string());
        }

        let mut hasher = Sha1::new();
        hasher.update(source.as_bytes());
        let content_hash = hasher.finalize();
        let cache_key = vec![
            NPM_CACHE_KEY.to_string(),
            INSPECTOR_CACHE_KEY.to_string(),
            format!("{content_hash:x}"),
        ];

        Arc::new(ResourceRecord {
            resource_id: ResourceId {
                kind: ResourceKind::Resource,
                resource_name: resource_name.clone(),
            },
            resource_name,
            output_name,
            ns: ns.clone(),
            file: Some(file.to_path_buf()),
            last_modified,
            source,
            cache_key,
            provides: vec![ns],
            requires: Vec::new(),
            js_deps: deps.clone(),
            deps,
            package: None,
            resource_type: ResourceType::Js,
        })
    };

    service
        .file_info_cache
        .entries
        .entry(file.to_path_buf())
        .or_insert_with(|| Arc::clone(&record));
    Ok(Arc::clone(
        &service.file_info_cache.entries.get(file).unwrap(),
    ))
}

/// Builds a `shadow-js` resource for a non-JS asset (§4.9): cache key is `[canonical_path,
/// mtime]`, never content-hashed, and `output_name` uses [`path_utils::flat_filename`] rather
/// than the `ns`-based rule.
pub fn get_asset_info(service: &Service, file: &Path) -> Result<Arc<ResourceRecord>> {
    if let Some(cached) = service.file_info_cache.entries.get(file) {
        return Ok(Arc::clone(&cached));
    }

    let metadata = std::fs::metadata(file).map_err(|e| ResolveError::FileInfoFailed {
        file: file.to_path_buf(),
        source: anyhow::Error::from(e),
    })?;
    let last_modified = metadata.modified().ok();
    let resource_name = path_utils::resource_name_for_file(
        file,
        &service.js_package_dirs,
        &service.config.project_dir,
    )
    .map_err(|e| ResolveError::FilesOutsideProject(match e {
        path_utils::PathUtilsError::FilesOutsideProject(p) => p,
    }))?;
    let ns = path_utils::module_name_for_resource(&resource_name);
    let output_name = path_utils::flat_filename(&resource_name);
    let mtime_key = last_modified
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_default();

    let record = Arc::new(ResourceRecord {
        resource_id: ResourceId {
            kind: ResourceKind::Asset,
            resource_name: resource_name.clone(),
        },
        resource_name: resource_name.clone(),
        output_name,
        ns: ns.clone(),
        file: Some(file.to_path_buf()),
        last_modified,
        source: String::new(),
        cache_key: vec![file.display().to_string(), mtime_key],
        provides: vec![ns],
        requires: Vec::new(),
        js_deps: Vec::new(),
        deps: Vec::new(),
        package: None,
        resource_type: ResourceType::ShadowJs,
    });

    service
        .file_info_cache
        .entries
        .entry(file.to_path_buf())
        .or_insert_with(|| Arc::clone(&record));
    Ok(Arc::clone(
        &service.file_info_cache.entries.get(file).unwrap(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{JsOptions, ServiceConfig};
    use test_tmpdir::test_tmpdir;

    fn service_over(tmp: &test_tmpdir::TmpDir) -> Service {
        let config = ServiceConfig {
            node_modules_dir: None,
            js_package_dirs: Some(vec![tmp.root_join("node_modules")]),
            project_dir: tmp.root().to_path_buf(),
            js_options: JsOptions::default(),
            classpath: Vec::new(),
        };
        Service::new(config, Arc::new(FakeInspector::new())).unwrap()
    }

    #[test]
    fn dedups_and_rewrites_goog_prefixed_requires() {
        let tmp = test_tmpdir!("src/a.js" => "require('foo');");
        let service = service_over(&tmp);
        let inspector = FakeInspector::new();
        inspector.set(
            tmp.root_join("src/a.js"),
            InspectionResult {
                js_requires: vec!["goog:foo".to_string(), "foo".to_string()],
                js_imports: vec!["bar".to_string()],
                uses_global_buffer: true,
                ..Default::default()
            },
        );
        let service = Service {
            inspector: Arc::new(inspector),
            ..service
        };
        let rc = get_file_info(&service, &tmp.root_join("src/a.js")).unwrap();
        assert_eq!(rc.deps, vec!["foo".to_string(), "bar".to_string(), "buffer".to_string()]);
    }

    #[test]
    fn json_files_get_minimal_resource() {
        let tmp = test_tmpdir!("src/data.json" => "{}");
        let service = service_over(&tmp);
        let rc = get_file_info(&service, &tmp.root_join("src/data.json")).unwrap();
        assert!(rc.deps.is_empty());
        assert!(rc.cache_key.is_empty());
    }

    #[test]
    fn inspector_errors_fail_resolution() {
        let tmp = test_tmpdir!("src/bad.js" => "???");
        let service = service_over(&tmp);
        let inspector = FakeInspector::new();
        inspector.set(
            tmp.root_join("src/bad.js"),
            InspectionResult {
                js_errors: vec!["unexpected token".to_string()],
                ..Default::default()
            },
        );
        let service = Service {
            inspector: Arc::new(inspector),
            ..service
        };
        let err = get_file_info(&service, &tmp.root_join("src/bad.js")).unwrap_err();
        assert!(matches!(err, ResolveError::FileInfoErrors { .. }));
    }
}
