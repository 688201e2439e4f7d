use std::path::PathBuf;

/// The resolver's error taxonomy (§7). Every variant carries enough context to explain the
/// failure without the caller re-deriving it from logs.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("cannot resolve an absolute require path: {0:?}")]
    AbsolutePath(PathBuf),

    #[error("{specifier} is not declared in package.json \"imports\" for {package_name}")]
    NoImport {
        specifier: String,
        package_name: String,
    },

    #[error("relative require {specifier} has no require_from file to resolve against")]
    NoRequireFrom { specifier: String },

    #[error("relative require {specifier} has no require_from package to resolve against")]
    NoPackageRequireFrom { specifier: String },

    #[error("could not resolve package for {specifier}")]
    PackageNotFound { specifier: String },

    #[error("relative require {specifier} from {from:?} walked outside of every enclosing package")]
    RelativeOutsidePackage { specifier: String, from: PathBuf },

    #[error("package {package_name} is closed (has \"exports\") and none matched {subpath}")]
    ExportsResolutionFailed {
        package_name: String,
        subpath: String,
    },

    #[error("package {package_name} at {package_dir:?} declares entry_keys but none resolved")]
    MissingEntries {
        package_name: String,
        package_dir: PathBuf,
    },

    #[error("{0:?} is outside of every configured package root and the project root")]
    FilesOutsideProject(PathBuf),

    #[error("override for {rel_path} in {package_name} is neither false, a string, nor absent: {value}")]
    InvalidOverride {
        package_name: String,
        rel_path: String,
        value: String,
    },

    #[error("inspector reported {count} error(s) parsing {file:?}")]
    FileInfoErrors { file: PathBuf, count: usize },

    #[error("inspector failed on {file:?}: {source}")]
    FileInfoFailed {
        file: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, ResolveError>;
