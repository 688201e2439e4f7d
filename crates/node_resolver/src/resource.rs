use crate::package::PackageRecord;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Versions the resolver's own contribution to a produced `cache_key` (§3). Bump whenever a
/// change here would change resolution output for unchanged source files.
pub const NPM_CACHE_KEY: &str = "node_resolver/v1";

/// Versions the external inspector's contribution to a produced `cache_key` (§3/§6). Callers
/// supplying a real `Inspector` should pick a value that changes whenever the inspector's
/// parsing behavior changes.
pub const INSPECTOR_CACHE_KEY: &str = "inspector/v1";

/// Tag distinguishing the four kinds of [`ResourceRecord`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Resource,
    Asset,
    Empty,
    Global,
}

/// `(kind, resource_name)`, the identity of a produced resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub resource_name: String,
}

/// A resource's module type, as consumed by the downstream compiler (out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Js,
    ShadowJs,
}

/// The output of a successful resolution: everything a downstream compiler needs to compile
/// and cache a single module (§3).
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub resource_id: ResourceId,
    pub resource_name: String,
    pub output_name: String,
    pub ns: String,
    pub file: Option<PathBuf>,
    pub last_modified: Option<SystemTime>,
    pub source: String,
    pub cache_key: Vec<String>,
    pub provides: Vec<String>,
    pub requires: Vec<String>,
    /// The same dependency list as `deps`, under the name the original `get_file_info` schema
    /// (§4.7) also stores it under.
    pub js_deps: Vec<String>,
    pub deps: Vec<String>,
    pub package: Option<Arc<PackageRecord>>,
    pub resource_type: ResourceType,
}

/// The fixed `empty_rc` singleton: returned whenever resolution is deliberately disabled by
/// an override (§3, §4.4).
pub fn empty_rc() -> ResourceRecord {
    let ns = "shadow$empty".to_string();
    ResourceRecord {
        resource_id: ResourceId {
            kind: ResourceKind::Empty,
            resource_name: ns.clone(),
        },
        resource_name: ns.clone(),
        output_name: format!("{ns}.js"),
        ns: ns.clone(),
        file: None,
        last_modified: None,
        source: String::new(),
        cache_key: Vec::new(),
        provides: vec![ns],
        requires: Vec::new(),
        js_deps: Vec::new(),
        deps: Vec::new(),
        package: None,
        resource_type: ResourceType::Js,
    }
}
