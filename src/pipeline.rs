//! Reference host pipeline.
//!
//! A minimal build pipeline that exercises the hook protocol: it resolves an
//! entry, loads modules (hooks first, filesystem second), scans their
//! imports and walks the graph breadth-first. Namespaces, suffixes and
//! plugin data are threaded between hook invocations exactly as a full
//! bundler host would.
//!
//! Modules are keyed by `(path, namespace, suffix)`, so the same file can
//! appear as several distinct instantiations.

use rustc_hash::FxHashMap as HashMap;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::hooks::{
    BuildHost, HookError, HookSet, LoadArgs, Loaded, Loader, Namespace, Plugin, ResolveArgs,
    ResolveKind, Resolved,
};
use crate::resolve::{ResolveError, Resolver};
use crate::scan::scan_imports;

/// Unique identifier for a module in the graph.
pub type ModuleId = usize;

/// Identity of a module instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    /// Resolved path.
    pub path: String,
    /// Namespace the module was loaded under.
    pub namespace: Namespace,
    /// Distinguishing suffix, if the resolution carried one.
    pub suffix: Option<String>,
}

impl ModuleKey {
    fn of(resolved: &Resolved) -> Self {
        Self {
            path: resolved.path.clone(),
            namespace: resolved.namespace.clone(),
            suffix: resolved.suffix.clone(),
        }
    }
}

/// A module in the built graph.
#[derive(Debug)]
pub struct BuiltModule {
    /// Identity of this instantiation.
    pub key: ModuleKey,
    /// Loaded source text (empty for externals).
    pub contents: String,
    /// Loader the contents should be parsed with.
    pub loader: Loader,
    /// External module: referenced but not loaded.
    pub external: bool,
    /// Module IDs this module depends on.
    pub dependencies: Vec<ModuleId>,
}

/// The module graph produced by a build. The entry module has ID 0.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<BuiltModule>,
    key_to_id: HashMap<ModuleKey, ModuleId>,
}

impl ModuleGraph {
    /// Number of modules in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Get a module by ID.
    #[must_use]
    pub fn get(&self, id: ModuleId) -> Option<&BuiltModule> {
        self.modules.get(id)
    }

    /// Get a module ID by its full key.
    #[must_use]
    pub fn id_of(&self, key: &ModuleKey) -> Option<ModuleId> {
        self.key_to_id.get(key).copied()
    }

    /// All instantiations of a path, across namespaces and suffixes.
    #[must_use]
    pub fn instantiations_of(&self, path: &str) -> Vec<ModuleId> {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.key.path == path)
            .map(|(id, _)| id)
            .collect()
    }

    /// Iterate over all modules.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &BuiltModule)> {
        self.modules.iter().enumerate()
    }

    /// Reserve an ID for a key; the module is completed later.
    fn add_pending(&mut self, key: ModuleKey) -> ModuleId {
        let id = self.modules.len();
        self.key_to_id.insert(key.clone(), id);
        self.modules.push(BuiltModule {
            key,
            contents: String::new(),
            loader: Loader::Js,
            external: false,
            dependencies: Vec::new(),
        });
        id
    }

    fn complete(&mut self, id: ModuleId, contents: String, loader: Loader, deps: Vec<ModuleId>) {
        let module = &mut self.modules[id];
        module.contents = contents;
        module.loader = loader;
        module.dependencies = deps;
    }

    fn mark_external(&mut self, id: ModuleId) {
        self.modules[id].external = true;
    }
}

/// Build pipeline error.
#[derive(Debug)]
pub struct BuildError {
    pub code: &'static str,
    pub message: String,
    pub path: Option<String>,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} ({})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for BuildError {}

impl From<HookError> for BuildError {
    fn from(err: HookError) -> Self {
        Self {
            code: "PLUGIN_ERROR",
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<ResolveError> for BuildError {
    fn from(err: ResolveError) -> Self {
        Self {
            code: "BUILD_RESOLVE_ERROR",
            message: err.to_string(),
            path: if err.from.is_empty() {
                None
            } else {
                Some(err.from)
            },
        }
    }
}

/// The reference pipeline: a hook set plus default resolution and loading.
pub struct Pipeline {
    cwd: PathBuf,
    hooks: HookSet,
    resolver: Resolver,
}

impl Pipeline {
    /// Create a pipeline rooted at the given working directory.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            hooks: HookSet::new(),
            resolver: Resolver::new(),
        }
    }

    /// Install a plugin: runs its setup against this pipeline's hook set.
    pub fn plugin(mut self, plugin: &dyn Plugin) -> Result<Self, BuildError> {
        debug!(plugin = plugin.name(), "installing plugin");
        plugin.setup(&mut self.hooks)?;
        Ok(self)
    }

    /// Build the module graph from an entry point.
    ///
    /// The entry module gets ID 0. A failing hook or an unresolvable import
    /// aborts the build with an error naming the module it came from.
    pub fn build(&self, entry: &Path) -> Result<ModuleGraph, BuildError> {
        debug!(entry = %entry.display(), "starting build");

        let entry_resolved = self.resolve_request(ResolveArgs {
            specifier: entry.display().to_string(),
            importer: None,
            resolve_dir: self.cwd.clone(),
            namespace: Namespace::file(),
            kind: ResolveKind::EntryPoint,
            plugin_data: None,
        })?;

        let mut graph = ModuleGraph::default();
        let mut queue: VecDeque<(ModuleId, Resolved)> = VecDeque::new();
        let entry_id = graph.add_pending(ModuleKey::of(&entry_resolved));
        queue.push_back((entry_id, entry_resolved));

        while let Some((id, resolved)) = queue.pop_front() {
            if resolved.external {
                graph.mark_external(id);
                continue;
            }

            let loaded = self.load(&resolved)?;
            debug!(path = %resolved.path, namespace = %resolved.namespace, "loaded module");

            let resolve_dir = loaded.resolve_dir.clone().unwrap_or_else(|| {
                Path::new(&resolved.path)
                    .parent()
                    .map_or_else(|| self.cwd.clone(), Path::to_path_buf)
            });

            let mut deps = Vec::new();
            for import in scan_imports(&loaded.contents) {
                let dep = self.resolve_request(ResolveArgs {
                    specifier: import.specifier,
                    importer: Some(resolved.path.clone()),
                    resolve_dir: resolve_dir.clone(),
                    namespace: resolved.namespace.clone(),
                    kind: import.kind,
                    plugin_data: loaded.plugin_data.clone(),
                })?;

                let key = ModuleKey::of(&dep);
                let dep_id = match graph.id_of(&key) {
                    Some(existing) => existing,
                    None => {
                        let new_id = graph.add_pending(key);
                        queue.push_back((new_id, dep));
                        new_id
                    }
                };
                deps.push(dep_id);
            }

            let loader = loaded
                .loader
                .unwrap_or_else(|| Loader::from_path(&resolved.path));
            graph.complete(id, loaded.contents, loader, deps);
        }

        Ok(graph)
    }

    /// Resolve through the hook chain, falling back to default resolution.
    ///
    /// A failing hook keeps its own error code instead of being folded into
    /// a resolution failure.
    fn resolve_request(&self, args: ResolveArgs) -> Result<Resolved, BuildError> {
        if let Some(resolved) = self.hooks.run_resolve(&args, self)? {
            return Ok(resolved);
        }
        self.resolver
            .resolve(
                &args.specifier,
                args.importer.as_deref().map(Path::new),
                &args.resolve_dir,
            )
            .map_err(BuildError::from)
    }

    /// Load a resolved module: load hooks first, filesystem fallback for the
    /// `file` namespace.
    fn load(&self, resolved: &Resolved) -> Result<Loaded, BuildError> {
        let args = LoadArgs {
            path: resolved.path.clone(),
            namespace: resolved.namespace.clone(),
            suffix: resolved.suffix.clone(),
            plugin_data: resolved.plugin_data.clone(),
        };

        if let Some(loaded) = self.hooks.run_load(&args)? {
            return Ok(loaded);
        }

        if !resolved.namespace.is_file() {
            return Err(BuildError {
                code: "BUILD_LOAD_ERROR",
                message: format!("no load hook for namespace '{}'", resolved.namespace),
                path: Some(resolved.path.clone()),
            });
        }

        let contents = std::fs::read_to_string(&resolved.path).map_err(|e| BuildError {
            code: "BUILD_READ_ERROR",
            message: e.to_string(),
            path: Some(resolved.path.clone()),
        })?;

        Ok(Loaded {
            contents,
            loader: None,
            resolve_dir: None,
            plugin_data: None,
        })
    }
}

impl BuildHost for Pipeline {
    fn resolve(&self, args: ResolveArgs) -> Result<Resolved, ResolveError> {
        match self.hooks.run_resolve(&args, self) {
            Ok(Some(resolved)) => Ok(resolved),
            Ok(None) => self.resolver.resolve(
                &args.specifier,
                args.importer.as_deref().map(Path::new),
                &args.resolve_dir,
            ),
            Err(e) => Err(ResolveError {
                specifier: args.specifier,
                from: args.importer.unwrap_or_default(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_build_walks_relative_imports() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("entry.js"),
            "import { x } from \"./util.js\";\nconsole.log(x);",
        )
        .unwrap();
        std::fs::write(dir.path().join("util.js"), "export const x = 1;").unwrap();

        let pipeline = Pipeline::new(dir.path());
        let graph = pipeline.build(Path::new("entry.js")).unwrap();

        assert_eq!(graph.len(), 2);
        let entry = graph.get(0).unwrap();
        assert!(entry.key.path.ends_with("entry.js"));
        assert_eq!(entry.dependencies.len(), 1);
        let dep = graph.get(entry.dependencies[0]).unwrap();
        assert_eq!(dep.contents, "export const x = 1;");
    }

    #[test]
    fn test_shared_dependency_deduplicated() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("entry.js"),
            "import \"./a.js\";\nimport \"./b.js\";",
        )
        .unwrap();
        std::fs::write(dir.path().join("a.js"), "import \"./shared.js\";").unwrap();
        std::fs::write(dir.path().join("b.js"), "import \"./shared.js\";").unwrap();
        std::fs::write(dir.path().join("shared.js"), "export default 0;").unwrap();

        let graph = Pipeline::new(dir.path())
            .build(Path::new("entry.js"))
            .unwrap();
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn test_builtin_import_is_external() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("entry.js"), "import fs from \"node:fs\";").unwrap();

        let graph = Pipeline::new(dir.path())
            .build(Path::new("entry.js"))
            .unwrap();
        assert_eq!(graph.len(), 2);
        let dep = graph.get(1).unwrap();
        assert!(dep.external);
        assert_eq!(dep.key.path, "node:fs");
    }

    #[test]
    fn test_missing_entry_errors() {
        let dir = tempdir().unwrap();
        let err = Pipeline::new(dir.path())
            .build(Path::new("missing.js"))
            .unwrap_err();
        assert_eq!(err.code, "BUILD_RESOLVE_ERROR");
    }

    #[test]
    fn test_default_loader_by_extension() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("entry.ts"), "const x: number = 1;").unwrap();

        let graph = Pipeline::new(dir.path())
            .build(Path::new("entry.ts"))
            .unwrap();
        assert_eq!(graph.get(0).unwrap().loader, Loader::Ts);
    }
}
