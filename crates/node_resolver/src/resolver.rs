//! Top-level and in-package module resolution (§4.4, §4.6).

use crate::config::OverrideValue;
use crate::error::{ResolveError, Result};
use crate::inspector::get_file_info;
use crate::package::{BrowserOverrideValue, PackageRecord};
use crate::resource::{empty_rc, ResourceRecord};
use crate::Service;
use packagejson_exports::{match_exact, match_imports, match_prefix_candidates, match_wildcard_candidates};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a require was issued from: the requesting file and, if it lives inside a package, the
/// `PackageRecord` that owns it (§4.6).
#[derive(Debug, Clone)]
pub struct RequireFrom {
    pub file: PathBuf,
    pub package: Option<Arc<PackageRecord>>,
}

fn rel_to_subpath(rel_require: &str) -> String {
    if rel_require == "./" {
        ".".to_string()
    } else {
        rel_require.to_string()
    }
}

fn normalize_entry_value(value: &str) -> String {
    if path_utils::is_relative_specifier(value) {
        value.to_string()
    } else {
        format!("./{value}")
    }
}

/// Top-level dispatch (§4.6): classifies `require` and routes it to the right resolution path.
pub fn find_resource(
    service: &Service,
    require_from: Option<&RequireFrom>,
    require: &str,
) -> Result<Arc<ResourceRecord>> {
    if path_utils::is_absolute_specifier(require) {
        return Err(ResolveError::AbsolutePath(PathBuf::from(require)));
    }

    if let Some(subpath) = require.strip_prefix('#') {
        let Some(from) = require_from else {
            return Err(ResolveError::NoImport {
                specifier: require.to_string(),
                package_name: String::new(),
            });
        };
        let Some(package) = &from.package else {
            return Err(ResolveError::NoImport {
                specifier: require.to_string(),
                package_name: String::new(),
            });
        };
        return resolve_import(service, package, from, &format!("#{subpath}"));
    }

    if path_utils::is_relative_specifier(require) {
        return resolve_relative(service, require_from, require);
    }

    resolve_bare(service, require_from, require)
}

fn resolve_import(
    service: &Service,
    package: &Arc<PackageRecord>,
    from: &RequireFrom,
    specifier: &str,
) -> Result<Arc<ResourceRecord>> {
    let conditions = &service.config.js_options.export_conditions;
    let matched = match_imports(&package.imports, specifier, conditions).ok_or_else(|| {
        ResolveError::NoImport {
            specifier: specifier.to_string(),
            package_name: package.package_name.clone(),
        }
    })?;
    let Some(target) = matched else {
        return Err(ResolveError::NoImport {
            specifier: specifier.to_string(),
            package_name: package.package_name.clone(),
        });
    };

    if path_utils::is_relative_specifier(&target) {
        find_resource_in_package(service, package, Some(from), &normalize_entry_value(&target))?
            .ok_or_else(|| ResolveError::NoImport {
                specifier: specifier.to_string(),
                package_name: package.package_name.clone(),
            })
    } else {
        find_resource(service, Some(from), &target)
    }
}

fn resolve_relative(
    service: &Service,
    require_from: Option<&RequireFrom>,
    require: &str,
) -> Result<Arc<ResourceRecord>> {
    let Some(from) = require_from else {
        return Err(ResolveError::NoRequireFrom {
            specifier: require.to_string(),
        });
    };
    let Some(mut package) = from.package.clone() else {
        return Err(ResolveError::NoPackageRequireFrom {
            specifier: require.to_string(),
        });
    };

    let from_dir = from
        .file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| from.file.clone());
    let target = path_utils::absolute_file(from_dir.join(require))
        .map_err(|_| ResolveError::RelativeOutsidePackage {
            specifier: require.to_string(),
            from: from.file.clone(),
        })?;

    loop {
        let relativized = pathdiff::diff_paths(&target, &package.package_dir).ok_or_else(|| {
            ResolveError::RelativeOutsidePackage {
                specifier: require.to_string(),
                from: from.file.clone(),
            }
        })?;
        let rel_str = relativized.to_string_lossy().replace('\\', "/");

        if !rel_str.starts_with("..") {
            let rel_require = normalize_entry_value(&rel_str);
            return find_resource_in_package(service, &package, Some(from), &rel_require)?
                .ok_or_else(|| ResolveError::RelativeOutsidePackage {
                    specifier: require.to_string(),
                    from: from.file.clone(),
                });
        }

        match &package.parent {
            Some(parent) => package = Arc::clone(parent),
            None => {
                return Err(ResolveError::RelativeOutsidePackage {
                    specifier: require.to_string(),
                    from: from.file.clone(),
                })
            }
        }
    }
}

fn resolve_bare(
    service: &Service,
    require_from: Option<&RequireFrom>,
    require: &str,
) -> Result<Arc<ResourceRecord>> {
    if service.config.js_options.use_browser_overrides {
        if let Some(from) = require_from {
            if let Some(package) = &from.package {
                if let Some(overrides) = &package.browser_overrides {
                    if let Some(value) = overrides.get(require) {
                        match value {
                            BrowserOverrideValue::False(false) => return Ok(Arc::new(empty_rc())),
                            BrowserOverrideValue::False(true) => {}
                            BrowserOverrideValue::Str(replacement) => {
                                if replacement != require {
                                    if path_utils::is_relative_specifier(replacement) {
                                        return find_resource_in_package(
                                            service,
                                            package,
                                            Some(from),
                                            &normalize_entry_value(replacement),
                                        )?
                                        .ok_or_else(|| ResolveError::PackageNotFound {
                                            specifier: require.to_string(),
                                        });
                                    }
                                    return find_resource(service, Some(from), replacement);
                                }
                            }
                            BrowserOverrideValue::Other(raw) => {
                                return Err(ResolveError::InvalidOverride {
                                    package_name: package.package_name.clone(),
                                    rel_path: require.to_string(),
                                    value: raw.to_string(),
                                })
                            }
                        }
                    }
                }
            }
        }
    }

    let require_from_dirs = require_from.and_then(|from| {
        from.package
            .as_ref()
            .map(|p| (p.package_dir.as_path(), p.js_package_dir.as_path()))
    });
    let found = service.locator.find_package_for_require(
        require_from_dirs,
        require,
        service.config.js_options.allow_nested_packages,
    )?;

    let Some((package, match_name)) = found else {
        return Err(ResolveError::PackageNotFound {
            specifier: require.to_string(),
        });
    };

    let rel_require = if require == match_name {
        "./".to_string()
    } else {
        format!(".{}", &require[match_name.len()..])
    };

    find_resource_in_package(service, &package, require_from, &rel_require)?.ok_or_else(|| {
        ResolveError::PackageNotFound {
            specifier: require.to_string(),
        }
    })
}

/// In-package resolution (§4.4): `rel_require` must start with `./`.
pub fn find_resource_in_package(
    service: &Service,
    package: &Arc<PackageRecord>,
    require_from: Option<&RequireFrom>,
    rel_require: &str,
) -> Result<Option<Arc<ResourceRecord>>> {
    debug_assert!(
        rel_require.starts_with("./"),
        "rel_require must start with ./, got {rel_require}"
    );

    let use_exports = package.exports_enabled && !service.config.js_options.ignore_exports;
    let internal = require_from
        .and_then(|from| from.package.as_ref())
        .map(|p| p.package_id == package.package_id)
        .unwrap_or(false);
    let closed = use_exports && !internal && !service.config.js_options.exports_bypass;

    if use_exports {
        if let Some(found) = try_exports(service, package, rel_require)? {
            return Ok(Some(found));
        }
        if closed {
            return Err(ResolveError::ExportsResolutionFailed {
                package_name: package.package_name.clone(),
                subpath: rel_require.to_string(),
            });
        }
    }

    match find_match_in_package(service, package, rel_require)? {
        Some((found_package, file)) => {
            apply_overrides(service, &found_package, require_from, &file).map(Some)
        }
        None => Ok(None),
    }
}

fn test_export_file(
    service: &Service,
    package: &Arc<PackageRecord>,
    replacement: &str,
) -> Result<Option<Arc<ResourceRecord>>> {
    let file = package.package_dir.join(replacement.trim_start_matches("./"));
    if file.is_file() {
        let rc = get_file_info(service, &file)?;
        return Ok(Some(attach_package(rc, package)));
    }
    Ok(None)
}

fn try_exports(
    service: &Service,
    package: &Arc<PackageRecord>,
    rel_require: &str,
) -> Result<Option<Arc<ResourceRecord>>> {
    let subpath = rel_to_subpath(rel_require);
    let conditions = &service.config.js_options.export_conditions;

    if let Some(exact) = match_exact(&package.exports, &subpath, conditions) {
        return match exact {
            Some(replacement) => test_export_file(service, package, &replacement),
            None => Ok(None),
        };
    }

    for candidate in match_prefix_candidates(&package.exports, &subpath, conditions) {
        if let Some(rc) = test_export_file(service, package, &candidate)? {
            return Ok(Some(rc));
        }
    }
    for candidate in match_wildcard_candidates(&package.exports, &subpath, conditions) {
        if let Some(rc) = test_export_file(service, package, &candidate)? {
            return Ok(Some(rc));
        }
    }
    Ok(None)
}

fn entry_value(package: &PackageRecord, key: &str) -> Option<String> {
    match key {
        "browser" => package.browser.clone(),
        "main" => package.package_json.main.clone(),
        "module" => package.package_json.module.clone(),
        _ => None,
    }
}

/// Classical (non-exports) matching (§4.4). Returns the owning package (which may be a nested
/// package discovered mid-traversal) plus the matched file.
fn find_match_in_package(
    service: &Service,
    package: &Arc<PackageRecord>,
    rel_require: &str,
) -> Result<Option<(Arc<PackageRecord>, PathBuf)>> {
    if rel_require == "./" {
        let mut saw_present = false;
        for key in &service.config.js_options.entry_keys {
            let Some(value) = entry_value(package, key) else {
                continue;
            };
            saw_present = true;
            let rel = normalize_entry_value(&value);
            if let Some(found) = find_match_in_package(service, package, &rel)? {
                return Ok(Some(found));
            }
        }
        if saw_present {
            return Err(ResolveError::MissingEntries {
                package_name: package.package_name.clone(),
                package_dir: package.package_dir.clone(),
            });
        }
        let index = package.package_dir.join("index.js");
        if index.is_file() {
            return Ok(Some((Arc::clone(package), index)));
        }
        return Ok(None);
    }

    let candidate = package.package_dir.join(rel_require.trim_start_matches("./"));

    if candidate.is_file() {
        return Ok(Some((Arc::clone(package), candidate)));
    }

    if !candidate.is_dir() {
        for ext in &service.config.js_options.extensions {
            let with_ext = append_ext(&candidate, ext);
            if with_ext.is_file() {
                return Ok(Some((Arc::clone(package), with_ext)));
            }
        }
        return Ok(None);
    }

    // `candidate` is a directory: `foo.js` beside `foo/` wins before descending into it.
    for ext in &service.config.js_options.extensions {
        let with_ext = append_ext(&candidate, ext);
        if with_ext.is_file() {
            return Ok(Some((Arc::clone(package), with_ext)));
        }
    }

    let nested_package_json = candidate.join("package.json");
    if nested_package_json.is_file() {
        if let Some(nested) = service.package_json_cache.read_package_json(
            &candidate,
            &package.js_package_dir,
            Some(Arc::clone(package)),
        )? {
            return find_match_in_package(service, &nested, "./");
        }
    }

    let index = candidate.join("index");
    for ext in &service.config.js_options.extensions {
        let with_ext = append_ext(&index, ext);
        if with_ext.is_file() {
            return Ok(Some((Arc::clone(package), with_ext)));
        }
    }

    Ok(None)
}

fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let ext = ext.strip_prefix('.').unwrap_or(ext);
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

enum OverrideOutcome {
    NoOverride,
    Empty,
    Relative(String),
    CrossPackage(String),
}

fn classify_value(rel_path: &str, value: &OverrideValue) -> OverrideOutcome {
    match value {
        OverrideValue::Disabled => OverrideOutcome::Empty,
        OverrideValue::Replacement(replacement) if replacement == rel_path => {
            OverrideOutcome::NoOverride
        }
        OverrideValue::Replacement(replacement) if path_utils::is_relative_specifier(replacement) => {
            OverrideOutcome::Relative(replacement.clone())
        }
        OverrideValue::Replacement(replacement) => OverrideOutcome::CrossPackage(replacement.clone()),
    }
}

fn classify_browser_value(rel_path: &str, value: &BrowserOverrideValue) -> Result<OverrideOutcome> {
    match value {
        BrowserOverrideValue::False(false) => Ok(OverrideOutcome::Empty),
        BrowserOverrideValue::False(true) => Ok(OverrideOutcome::NoOverride),
        BrowserOverrideValue::Str(replacement) if replacement == rel_path => {
            Ok(OverrideOutcome::NoOverride)
        }
        BrowserOverrideValue::Str(replacement) if path_utils::is_relative_specifier(replacement) => {
            Ok(OverrideOutcome::Relative(replacement.clone()))
        }
        BrowserOverrideValue::Str(replacement) => {
            Ok(OverrideOutcome::CrossPackage(replacement.clone()))
        }
        BrowserOverrideValue::Other(raw) => Err(ResolveError::InvalidOverride {
            package_name: String::new(),
            rel_path: rel_path.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn lookup_override(service: &Service, package: &PackageRecord, rel_path: &str) -> Result<OverrideOutcome> {
    let mut tried = vec![rel_path];
    if let Some(trimmed) = rel_path.strip_suffix(".js") {
        tried.push(trimmed);
    }

    for candidate in &tried {
        let candidate = *candidate;
        if let Some(package_overrides) = service.config.js_options.package_overrides.get(&package.package_name) {
            if let Some(value) = package_overrides.get(candidate) {
                return Ok(classify_value(rel_path, value));
            }
        }
    }

    for candidate in tried {
        if let Some(overrides) = &package.browser_overrides {
            if let Some(value) = overrides.get(candidate) {
                return classify_browser_value(rel_path, value)
                    .map_err(|e| match e {
                        ResolveError::InvalidOverride { rel_path, value, .. } => {
                            ResolveError::InvalidOverride {
                                package_name: package.package_name.clone(),
                                rel_path,
                                value,
                            }
                        }
                        other => other,
                    });
            }
        }
    }

    Ok(OverrideOutcome::NoOverride)
}

fn apply_overrides(
    service: &Service,
    package: &Arc<PackageRecord>,
    require_from: Option<&RequireFrom>,
    file: &Path,
) -> Result<Arc<ResourceRecord>> {
    let rel = pathdiff::diff_paths(file, &package.package_dir)
        .unwrap_or_else(|| file.to_path_buf());
    let rel_path = format!("./{}", rel.to_string_lossy().replace('\\', "/"));

    match lookup_override(service, package, &rel_path)? {
        OverrideOutcome::NoOverride => {
            let rc = get_file_info(service, file)?;
            Ok(attach_package(rc, package))
        }
        OverrideOutcome::Empty => Ok(Arc::new(empty_rc())),
        OverrideOutcome::Relative(replacement) => {
            find_resource_in_package(service, package, require_from, &normalize_entry_value(&replacement))?
                .ok_or_else(|| ResolveError::ExportsResolutionFailed {
                    package_name: package.package_name.clone(),
                    subpath: replacement,
                })
        }
        OverrideOutcome::CrossPackage(replacement) => find_resource(service, require_from, &replacement),
    }
}

fn attach_package(rc: Arc<ResourceRecord>, package: &Arc<PackageRecord>) -> Arc<ResourceRecord> {
    if rc.package.as_ref().map(|p| p.package_id == package.package_id).unwrap_or(false) {
        return rc;
    }
    let mut owned = (*rc).clone();
    owned.package = Some(Arc::clone(package));
    Arc::new(owned)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{JsOptions, ServiceConfig};
    use crate::inspector::FakeInspector;
    use pretty_assertions::assert_eq;
    use test_tmpdir::test_tmpdir;

    fn service_over(tmp: &test_tmpdir::TmpDir, js_options: JsOptions) -> Service {
        let config = ServiceConfig {
            node_modules_dir: None,
            js_package_dirs: Some(vec![tmp.root_join("node_modules")]),
            project_dir: tmp.root().to_path_buf(),
            js_options,
            classpath: Vec::new(),
        };
        Service::new(config, Arc::new(FakeInspector::new())).unwrap()
    }

    #[test]
    fn resolves_bare_main_to_package_entry_file() {
        let tmp = test_tmpdir!(
            "node_modules/pkg-a/package.json" => r#"{"name": "pkg-a", "main": "lib/index.js"}"#,
            "node_modules/pkg-a/lib/index.js" => "module.exports = 1;"
        );
        let service = service_over(&tmp, JsOptions::default());
        let rc = find_resource(&service, None, "pkg-a").unwrap();
        assert_eq!(rc.file, Some(tmp.root_join("node_modules/pkg-a/lib/index.js")));
    }

    #[test]
    fn resolves_nested_subpath_via_extension_search() {
        let tmp = test_tmpdir!(
            "node_modules/pkg-a/package.json" => r#"{"name": "pkg-a", "main": "index.js"}"#,
            "node_modules/pkg-a/index.js" => "require('./lib/helper');",
            "node_modules/pkg-a/lib/helper.js" => "module.exports = 2;"
        );
        let service = service_over(&tmp, JsOptions::default());
        let pkg_rc = find_resource(&service, None, "pkg-a").unwrap();
        let from = RequireFrom {
            file: pkg_rc.file.clone().unwrap(),
            package: pkg_rc.package.clone(),
        };
        let rc = find_resource(&service, Some(&from), "./lib/helper").unwrap();
        assert_eq!(
            rc.file,
            Some(tmp.root_join("node_modules/pkg-a/lib/helper.js"))
        );
    }

    #[test]
    fn closed_package_exports_miss_is_fatal() {
        let tmp = test_tmpdir!(
            "node_modules/pkg-a/package.json" => r#"{
                "name": "pkg-a",
                "exports": {".": "./index.js"}
            }"#,
            "node_modules/pkg-a/index.js" => "module.exports = 1;",
            "src/app.js" => "require('pkg-a/internal');"
        );
        let service = service_over(&tmp, JsOptions::default());
        let from = RequireFrom {
            file: tmp.root_join("src/app.js"),
            package: None,
        };
        let err = find_resource(&service, Some(&from), "pkg-a/internal").unwrap_err();
        assert!(matches!(err, ResolveError::ExportsResolutionFailed { .. }));
    }

    #[test]
    fn exports_bypass_allows_classical_fallback() {
        let tmp = test_tmpdir!(
            "node_modules/pkg-a/package.json" => r#"{
                "name": "pkg-a",
                "exports": {".": "./index.js"}
            }"#,
            "node_modules/pkg-a/index.js" => "module.exports = 1;",
            "node_modules/pkg-a/internal.js" => "module.exports = 2;"
        );
        let mut js_options = JsOptions::default();
        js_options.exports_bypass = true;
        let service = service_over(&tmp, js_options);
        let rc = find_resource(&service, None, "pkg-a/internal").unwrap();
        assert_eq!(
            rc.file,
            Some(tmp.root_join("node_modules/pkg-a/internal.js"))
        );
    }

    #[test]
    fn browser_override_redirects_to_sibling_package() {
        let tmp = test_tmpdir!(
            "node_modules/pkg-a/package.json" => r#"{
                "name": "pkg-a",
                "main": "index.js",
                "browser": {"fs": "pkg-b"}
            }"#,
            "node_modules/pkg-a/index.js" => "require('fs');",
            "node_modules/pkg-b/package.json" => r#"{"name": "pkg-b", "main": "index.js"}"#,
            "node_modules/pkg-b/index.js" => "module.exports = {};"
        );
        let service = service_over(&tmp, JsOptions::default());
        let pkg_rc = find_resource(&service, None, "pkg-a").unwrap();
        let from = RequireFrom {
            file: pkg_rc.file.clone().unwrap(),
            package: pkg_rc.package.clone(),
        };
        let rc = find_resource(&service, Some(&from), "fs").unwrap();
        assert_eq!(rc.file, Some(tmp.root_join("node_modules/pkg-b/index.js")));
    }

    #[test]
    fn false_override_yields_empty_resource() {
        let tmp = test_tmpdir!(
            "node_modules/pkg-a/package.json" => r#"{
                "name": "pkg-a",
                "main": "index.js",
                "browser": {"fs": false}
            }"#,
            "node_modules/pkg-a/index.js" => "require('fs');"
        );
        let service = service_over(&tmp, JsOptions::default());
        let pkg_rc = find_resource(&service, None, "pkg-a").unwrap();
        let from = RequireFrom {
            file: pkg_rc.file.clone().unwrap(),
            package: pkg_rc.package.clone(),
        };
        let rc = find_resource(&service, Some(&from), "fs").unwrap();
        assert_eq!(rc.ns, "shadow$empty");
    }
}
