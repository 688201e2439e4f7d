//! Node.js/bundler-style module resolution and file-info extraction (§1).
//!
//! [`Service`] is the single entry point: construct one per build, then call
//! [`Service::find_resource`] for every `require`/`import` the build graph discovers.

pub mod config;
pub mod error;
pub mod inspector;
pub mod locator;
pub mod npmdeps;
pub mod package;
pub mod resolver;
pub mod resource;
pub mod special;

pub use config::{JsOptions, Mode, OverrideValue, ServiceConfig};
pub use error::{ResolveError, Result};
pub use inspector::{FakeInspector, FileInfoCache, InspectionResult, Inspector};
pub use locator::PackageLocator;
pub use package::{BrowserOverrideValue, PackageJsonCache, PackageRecord};
pub use resolver::{find_resource, find_resource_in_package, RequireFrom};
pub use resource::{empty_rc, ResourceId, ResourceKind, ResourceRecord, ResourceType};

use ahashmap::AHashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Owns every cache described in §3 plus the collaborators needed to fill them. Cheap to
/// construct multiple of in tests; a real build normally keeps exactly one alive for its
/// lifetime so the caches stay warm across the whole module graph.
pub struct Service {
    pub config: ServiceConfig,
    pub js_package_dirs: Vec<PathBuf>,
    pub package_json_cache: Arc<PackageJsonCache>,
    pub locator: PackageLocator,
    pub file_info_cache: FileInfoCache,
    pub inspector: Arc<dyn Inspector>,
    pub npm_deps: AHashSet<String>,
}

impl Service {
    pub fn new(mut config: ServiceConfig, inspector: Arc<dyn Inspector>) -> anyhow::Result<Self> {
        config.normalize()?;
        let js_package_dirs = config.effective_js_package_dirs();
        let package_json_cache = Arc::new(PackageJsonCache::new());
        let locator = PackageLocator::new(js_package_dirs.clone(), Arc::clone(&package_json_cache));
        let npm_deps = npmdeps::scan_npm_deps(
            &config.classpath,
            &config.js_options.npm_deps_manifest_name,
        );

        Ok(Service {
            config,
            js_package_dirs,
            package_json_cache,
            locator,
            file_info_cache: FileInfoCache::new(),
            inspector,
            npm_deps,
        })
    }

    /// Answers "was `name` declared as an npm dependency anywhere on the classpath?" (§4.10).
    /// Purely informational — never consulted during resolution itself.
    pub fn is_declared_npm_dep(&self, name: &str) -> bool {
        self.npm_deps.contains(name)
    }

    pub fn find_resource(
        &self,
        require_from: Option<&RequireFrom>,
        require: &str,
    ) -> Result<Arc<ResourceRecord>> {
        resolver::find_resource(self, require_from, require)
    }

    pub fn get_file_info(&self, file: &Path) -> Result<Arc<ResourceRecord>> {
        inspector::get_file_info(self, file)
    }

    pub fn get_asset_info(&self, file: &Path) -> Result<Arc<ResourceRecord>> {
        inspector::get_asset_info(self, file)
    }

    pub fn js_resource_for_file(
        &self,
        file: &Path,
        file_min: Option<&Path>,
    ) -> Result<Arc<ResourceRecord>> {
        special::js_resource_for_file(self, self.config.js_options.mode, file, file_min)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_tmpdir::test_tmpdir;

    #[test]
    fn aggregates_npm_deps_at_construction() {
        let tmp = test_tmpdir!(
            "classpath/deps.cljs" => r#"{"npm-deps": {"left-pad": "1.0.0"}}"#
        );
        let config = ServiceConfig {
            node_modules_dir: None,
            js_package_dirs: None,
            project_dir: tmp.root().to_path_buf(),
            js_options: JsOptions::default(),
            classpath: vec![tmp.root_join("classpath")],
        };
        let service = Service::new(config, Arc::new(FakeInspector::new())).unwrap();
        assert!(service.is_declared_npm_dep("left-pad"));
        assert!(!service.is_declared_npm_dep("right-pad"));
    }
}
