//! Default import specifier resolution.
//!
//! Resolves import specifiers to absolute file paths when no resolve hook
//! claims the request.
//!
//! ## Specifier Types
//!
//! - Relative: `./utils`, `../lib/foo`
//! - Absolute: `/abs/path/to/module`
//! - Entry-style: `logger.js` interpreted against the request's resolve
//!   directory (also covers build entry points)
//! - `node:` builtins resolve as external
//!
//! Bare package specifiers (`lodash`, `@scope/pkg`) are not resolved here;
//! dependency installation and `node_modules` lookup belong to the host.

use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::hooks::Resolved;

/// Extension candidates tried when a specifier has no match on disk as-is.
const EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"];

/// Error during resolution.
#[derive(Debug)]
pub struct ResolveError {
    pub specifier: String,
    pub from: String,
    pub message: String,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.from.is_empty() {
            write!(f, "Cannot resolve '{}': {}", self.specifier, self.message)
        } else {
            write!(
                f,
                "Cannot resolve '{}' from '{}': {}",
                self.specifier, self.from, self.message
            )
        }
    }
}

impl std::error::Error for ResolveError {}

/// Filesystem resolver with a per-build resolution cache.
#[derive(Debug, Default)]
pub struct Resolver {
    /// Cached resolutions, keyed by (specifier, base directory).
    cache: RwLock<HashMap<(String, String), String>>,
}

impl Resolver {
    /// Create a new resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an import specifier to a canonical file path.
    ///
    /// # Arguments
    /// - `specifier`: the import specifier as written
    /// - `importer`: the file containing the import, if any
    /// - `resolve_dir`: base directory for entry-style specifiers
    pub fn resolve(
        &self,
        specifier: &str,
        importer: Option<&Path>,
        resolve_dir: &Path,
    ) -> Result<Resolved, ResolveError> {
        if specifier.starts_with("node:") {
            return Ok(Resolved::external(specifier));
        }

        let base = self.base_dir(specifier, importer, resolve_dir);
        let cache_key = (specifier.to_string(), base.display().to_string());
        if let Some(path) = self.cache.read().unwrap().get(&cache_key) {
            return Ok(Resolved::file(path.clone()));
        }

        let target = if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else {
            base.join(specifier)
        };
        let path = self.resolve_file(&target, specifier, importer)?;
        let path_str = path.display().to_string();

        self.cache
            .write()
            .unwrap()
            .insert(cache_key, path_str.clone());

        Ok(Resolved::file(path_str))
    }

    /// Directory a specifier is interpreted against.
    fn base_dir(&self, specifier: &str, importer: Option<&Path>, resolve_dir: &Path) -> PathBuf {
        // Relative imports resolve against the importer's directory; anything
        // else is entry-style and uses the request's resolve directory.
        if specifier.starts_with("./") || specifier.starts_with("../") {
            if let Some(dir) = importer.and_then(Path::parent) {
                return dir.to_path_buf();
            }
        }
        resolve_dir.to_path_buf()
    }

    /// Resolve a target path, trying extension candidates and index files.
    fn resolve_file(
        &self,
        target: &Path,
        specifier: &str,
        importer: Option<&Path>,
    ) -> Result<PathBuf, ResolveError> {
        if target.is_file() {
            return self.canonicalize(target, specifier, importer);
        }

        for ext in EXTENSIONS {
            let with_ext = PathBuf::from(format!("{}{}", target.display(), ext));
            if with_ext.is_file() {
                return self.canonicalize(&with_ext, specifier, importer);
            }
        }

        if target.is_dir() {
            for index in &["index.ts", "index.tsx", "index.js", "index.jsx"] {
                let index_path = target.join(index);
                if index_path.is_file() {
                    return self.canonicalize(&index_path, specifier, importer);
                }
            }
        }

        Err(self.not_found(specifier, importer, "File not found"))
    }

    fn canonicalize(
        &self,
        path: &Path,
        specifier: &str,
        importer: Option<&Path>,
    ) -> Result<PathBuf, ResolveError> {
        dunce::canonicalize(path).map_err(|e| self.not_found(specifier, importer, &e.to_string()))
    }

    fn not_found(&self, specifier: &str, importer: Option<&Path>, message: &str) -> ResolveError {
        ResolveError {
            specifier: specifier.to_string(),
            from: importer.map(|p| p.display().to_string()).unwrap_or_default(),
            message: message.to_string(),
        }
    }
}
