use ahashmap::AHashMap;
use std::path::PathBuf;

/// A user-supplied override value (§4.4): either a replacement path or `false` to disable
/// resolution entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideValue {
    Disabled,
    Replacement(String),
}

/// Build mode, consumed only by [`crate::special::js_resource_for_file`] (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Release,
    Dev,
}

/// Per-resolution knobs (§6). `Default` matches the documented defaults.
#[derive(Debug, Clone)]
pub struct JsOptions {
    pub extensions: Vec<String>,
    pub allow_nested_packages: bool,
    pub target: String,
    pub use_browser_overrides: bool,
    pub entry_keys: Vec<String>,
    pub export_conditions: Vec<String>,
    pub ignore_exports: bool,
    pub exports_bypass: bool,
    pub package_overrides: AHashMap<String, AHashMap<String, OverrideValue>>,
    pub mode: Mode,
    pub asset_extensions: Vec<String>,
    pub npm_deps_manifest_name: String,
}

impl Default for JsOptions {
    fn default() -> Self {
        Self {
            extensions: vec![".js".to_string(), ".mjs".to_string(), ".json".to_string()],
            allow_nested_packages: true,
            target: "browser".to_string(),
            use_browser_overrides: true,
            entry_keys: vec![
                "browser".to_string(),
                "main".to_string(),
                "module".to_string(),
            ],
            export_conditions: vec![
                "browser".to_string(),
                "require".to_string(),
                "default".to_string(),
                "module".to_string(),
                "import".to_string(),
            ],
            ignore_exports: false,
            exports_bypass: false,
            package_overrides: AHashMap::default(),
            mode: Mode::Dev,
            asset_extensions: vec![
                "css".to_string(),
                "scss".to_string(),
                "svg".to_string(),
                "png".to_string(),
                "gif".to_string(),
                "json".to_string(),
            ],
            npm_deps_manifest_name: "deps.cljs".to_string(),
        }
    }
}

/// Construction-time configuration for a [`crate::Service`] (§6).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub node_modules_dir: Option<PathBuf>,
    pub js_package_dirs: Option<Vec<PathBuf>>,
    pub project_dir: PathBuf,
    pub js_options: JsOptions,
    /// Classpath roots scanned for `npm_deps_manifest_name` files (§4.10).
    pub classpath: Vec<PathBuf>,
}

impl ServiceConfig {
    /// Normalizes `project_dir`, `node_modules_dir`, and `js_package_dirs` to absolute paths
    /// (§6) in place, via [`path_utils::absolute_file`].
    pub fn normalize(&mut self) -> anyhow::Result<()> {
        self.project_dir = path_utils::absolute_file(&self.project_dir)?;
        if let Some(dir) = &self.node_modules_dir {
            self.node_modules_dir = Some(path_utils::absolute_file(dir)?);
        }
        if let Some(dirs) = &self.js_package_dirs {
            self.js_package_dirs = Some(
                dirs.iter()
                    .map(path_utils::absolute_file)
                    .collect::<anyhow::Result<Vec<_>>>()?,
            );
        }
        Ok(())
    }

    /// Computes the effective, order-preserving list of package roots (§6): `node_modules_dir`
    /// (if set) first, then `js_package_dirs`, falling back to a single
    /// `<project_dir>/node_modules` root when neither is configured.
    pub fn effective_js_package_dirs(&self) -> Vec<PathBuf> {
        if self.node_modules_dir.is_none() && self.js_package_dirs.is_none() {
            return vec![self.project_dir.join("node_modules")];
        }
        let mut dirs = Vec::new();
        if let Some(dir) = &self.node_modules_dir {
            dirs.push(dir.clone());
        }
        if let Some(extra) = &self.js_package_dirs {
            dirs.extend(extra.iter().cloned());
        }
        dirs
    }
}
