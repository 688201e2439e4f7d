use anyhow::{Context, Result};
use md5::{Digest, Md5};
use path_slash::PathExt;
use relative_path::RelativePathBuf;
use std::env::current_dir;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum PathUtilsError {
    #[error("file {0:?} is outside of every configured package root and the project root")]
    FilesOutsideProject(PathBuf),
}

pub fn as_relative_slash_path<P: AsRef<Path>>(p: P) -> Result<RelativePathBuf> {
    let pref = p.as_ref();
    let relative_fence_path: RelativePathBuf =
        RelativePathBuf::from_path(pref).with_context(|| {
            let pref_str = pref.to_string_lossy();
            format!("failed to convert path to relative-path: \"{pref_str}\"")
        })?;
    let slashed_pbuf = PathBuf::from(relative_fence_path.as_str())
        .to_slash()
        .map(|s| s.to_string())
        .with_context(|| {
            let rel_fence_str = relative_fence_path.as_str();
            format!("failed to convert relative-path to a slashed path: \"{rel_fence_str}\"")
        })?;
    Ok(RelativePathBuf::from(slashed_pbuf))
}

/// Syntactically normalizes `path` to an absolute path, resolving it against the current
/// directory if relative. Never dereferences symlinks.
pub fn absolute_file(path: impl AsRef<Path>) -> Result<PathBuf> {
    let cwd = current_dir().context("failed to read current directory")?;
    abspath::join_abspath(cwd, path).map_err(anyhow::Error::from)
}

/// True for specifiers that Node treats as relative: `./foo`, `../foo`.
pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// True for specifiers naming a filesystem-absolute path rather than a package or relative
/// import.
pub fn is_absolute_specifier(specifier: &str) -> bool {
    Path::new(specifier).is_absolute()
}

/// Rewrites `.` to `_DOT_` in the first path segment of `name`, so that e.g. `object.assign`
/// and `object-assign` produce distinct resource names when both appear under `node_modules/`.
pub fn disambiguate_module_name(name: &str) -> String {
    match name.find('/') {
        Some(idx) => {
            let (head, tail) = name.split_at(idx);
            format!("{}{}", head.replace('.', "_DOT_"), tail)
        }
        None => name.replace('.', "_DOT_"),
    }
}

/// Computes the `resource_name` (§3) for a resolved file: the path relative to whichever
/// package root contains it (prefixed with `node_modules/`), or relative to the project root.
pub fn resource_name_for_file(
    file: &Path,
    package_roots: &[PathBuf],
    project_dir: &Path,
) -> Result<String, PathUtilsError> {
    let best_root = package_roots
        .iter()
        .filter(|root| file.starts_with(root))
        .max_by_key(|root| root.as_os_str().len());

    if let Some(root) = best_root {
        let rel = file
            .strip_prefix(root)
            .expect("starts_with checked above")
            .to_slash_lossy();
        return Ok(format!(
            "node_modules/{}",
            disambiguate_module_name(&rel)
        ));
    }

    if file.starts_with(project_dir) {
        let rel = file
            .strip_prefix(project_dir)
            .expect("starts_with checked above")
            .to_slash_lossy();
        return Ok(rel.to_string());
    }

    Err(PathUtilsError::FilesOutsideProject(file.to_path_buf()))
}

/// Flattens a resource-relative path into a single path segment, for use as an asset's
/// `output_name`: every separator becomes `_`, so assets from different directories never
/// collide in a flat output directory.
pub fn flat_filename(resource_name: &str) -> String {
    resource_name.replace(['/', '\\'], "_")
}

const MAX_OUTPUT_NAME_BYTES: usize = 127;

/// Derives the `output_name` (§3) for a resource: `{ns}.js`, or, if that would exceed
/// [`MAX_OUTPUT_NAME_BYTES`], `module$too_long_<md5hex(resource_name)>.js`.
pub fn output_name_for_resource(ns: &str, resource_name: &str) -> String {
    let candidate = format!("{ns}.js");
    if candidate.len() <= MAX_OUTPUT_NAME_BYTES {
        return candidate;
    }
    let mut hasher = Md5::new();
    hasher.update(resource_name.as_bytes());
    let digest = hasher.finalize();
    format!("module$too_long_{digest:x}.js")
}

/// Derives the module namespace symbol for a `resource_name`, per the canonical
/// "file to module name" rule: the extension is dropped, path separators become `$`,
/// remaining `.`/`-` become `_`, and the whole name is prefixed with `module$`. A leading
/// `#` (subpath-imports resources) becomes `_HASH_`.
pub fn module_name_for_resource(resource_name: &str) -> String {
    let without_ext = match resource_name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => resource_name,
    };

    let mut out = String::with_capacity(without_ext.len() + 8);
    out.push_str("module$");
    for segment in without_ext.split('/') {
        if out.len() > "module$".len() {
            out.push('$');
        }
        for c in segment.chars() {
            match c {
                '.' | '-' => out.push('_'),
                '#' => out.push_str("_HASH_"),
                c => out.push(c),
            }
        }
    }
    out
}

/// Splits a bare specifier into its package name and package-relative subpath, honoring
/// scoped package names (`@scope/name`). Returns `None` for relative/absolute/empty
/// specifiers.
pub fn split_package_import(specifier: &str) -> Option<(String, Option<String>)> {
    if specifier.is_empty() || is_relative_specifier(specifier) || is_absolute_specifier(specifier)
    {
        return None;
    }

    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let first = parts.next()?;
    let name = if specifier.starts_with('@') {
        let second = parts.next()?;
        format!("{first}/{second}")
    } else {
        first.to_string()
    };
    let rest: Vec<&str> = parts.collect();
    let subpath = if rest.is_empty() {
        None
    } else {
        Some(rest.join("/"))
    };
    Some((name, subpath))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn disambiguates_first_segment_only() {
        assert_eq!(
            disambiguate_module_name("object.assign/index.js"),
            "object_DOT_assign/index.js"
        );
        assert_eq!(
            disambiguate_module_name("object-assign/index.js"),
            "object-assign/index.js"
        );
    }

    #[test]
    fn module_name_drops_extension_and_joins_with_dollar() {
        assert_eq!(
            module_name_for_resource("node_modules/pkg-a/lib/index.js"),
            "module$node_modules$pkg_a$lib$index"
        );
    }

    #[test]
    fn module_name_rewrites_hash_imports() {
        assert_eq!(module_name_for_resource("#internal/thing.js"), "module$_HASH_internal$thing");
    }

    #[test]
    fn output_name_overflows_to_md5() {
        let long = "a".repeat(130);
        let ns = module_name_for_resource(&long);
        let out = output_name_for_resource(&ns, &long);
        assert!(out.starts_with("module$too_long_"));
        assert!(out.len() < ns.len());
    }

    #[test]
    fn split_package_import_handles_scopes() {
        assert_eq!(
            split_package_import("@scope/name/sub/path"),
            Some(("@scope/name".to_string(), Some("sub/path".to_string())))
        );
        assert_eq!(
            split_package_import("plain"),
            Some(("plain".to_string(), None))
        );
        assert_eq!(split_package_import("./relative"), None);
        assert_eq!(split_package_import("/abs"), None);
    }

    #[test]
    fn flat_filename_replaces_separators() {
        assert_eq!(flat_filename("a/b/c.png"), "a_b_c.png");
    }
}
