//! Special resource constructors (§4.8).

use crate::config::Mode;
use crate::error::Result;
use crate::inspector::get_file_info;
use crate::resource::{ResourceId, ResourceKind, ResourceRecord, ResourceType, INSPECTOR_CACHE_KEY, NPM_CACHE_KEY};
use crate::Service;
use std::path::Path;
use std::sync::Arc;

/// Synthesizes a resource wiring `require(require)` to an existing browser global: its source
/// is `module.exports=(<global>);` and its `resource_id` is tagged `global`.
pub fn js_resource_for_global(require: &str, global: &str) -> Arc<ResourceRecord> {
    let ns = path_utils::module_name_for_resource(require);
    let source = format!("module.exports=({global});");
    Arc::new(ResourceRecord {
        resource_id: ResourceId {
            kind: ResourceKind::Global,
            resource_name: require.to_string(),
        },
        resource_name: require.to_string(),
        output_name: path_utils::output_name_for_resource(&ns, require),
        ns: ns.clone(),
        file: None,
        last_modified: None,
        source,
        cache_key: vec![NPM_CACHE_KEY.to_string(), INSPECTOR_CACHE_KEY.to_string()],
        provides: vec![ns],
        requires: Vec::new(),
        js_deps: Vec::new(),
        deps: Vec::new(),
        package: None,
        resource_type: ResourceType::Js,
    })
}

/// In `release` mode, prefers `file_min` (if given) over `file`; otherwise always uses `file`.
/// Returns the chosen file's info directly.
pub fn js_resource_for_file(
    service: &Service,
    mode: Mode,
    file: &Path,
    file_min: Option<&Path>,
) -> Result<Arc<ResourceRecord>> {
    let chosen = match (mode, file_min) {
        (Mode::Release, Some(min)) => min,
        _ => file,
    };
    get_file_info(service, chosen)
}

/// Produces the `shadow.js.require(...)` call emitters embed for a resolved resource.
pub fn shadow_js_require(resource: &ResourceRecord, semicolon: bool) -> String {
    let id = if resource.ns.is_empty() {
        resource.resource_name.as_str()
    } else {
        resource.ns.as_str()
    };
    let globals: Vec<String> = resource
        .deps
        .iter()
        .filter(|d| d.as_str() == "buffer" || d.as_str() == "process")
        .map(|d| format!("\"{d}\""))
        .collect();
    let call = format!(
        "shadow.js.require(\"{id}\", {{\"globals\":[{}]}})",
        globals.join(",")
    );
    if semicolon {
        format!("{call};")
    } else {
        call
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn global_resource_wraps_a_bare_expression() {
        let rc = js_resource_for_global("jquery", "window.jQuery");
        assert_eq!(rc.source, "module.exports=(window.jQuery);");
        assert_eq!(rc.resource_id.kind, ResourceKind::Global);
    }

    #[test]
    fn shadow_require_lists_global_deps() {
        let mut rc = js_resource_for_global("jquery", "window.jQuery");
        let mut owned = (*rc).clone();
        owned.deps = vec!["buffer".to_string()];
        rc = Arc::new(owned);
        let call = shadow_js_require(&rc, true);
        assert_eq!(call, "shadow.js.require(\"module$jquery\", {\"globals\":[\"buffer\"]});");
    }
}
