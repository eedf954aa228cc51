//! Hook protocol between plugins and the host pipeline.
//!
//! The pipeline calls back into registered hooks for every import it needs
//! resolved or loaded. Hooks are scoped by a specifier/path filter and an
//! optional namespace; the first hook that returns a result wins, and a hook
//! that returns `None` passes the request through to the next hook or to
//! default resolution/loading.
//!
//! Namespaces are opaque strings attached to resolve/load requests. They
//! route a request to the hooks that reserved them and carry no other
//! meaning to the pipeline.

use regex_lite::Regex;
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::resolve::ResolveError;

/// Result type for plugin hooks.
pub type HookResult<T> = Result<T, HookError>;

/// Error from a plugin hook.
#[derive(Debug)]
pub struct HookError {
    /// Plugin name that caused the error.
    pub plugin: String,
    /// Hook that failed.
    pub hook: &'static str,
    /// Error message.
    pub message: String,
}

impl HookError {
    /// Create a new hook error.
    pub fn new(plugin: impl Into<String>, hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            hook,
            message: message.into(),
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.hook, self.message)
    }
}

impl std::error::Error for HookError {}

/// Opaque namespace tag on resolve/load requests.
///
/// The default namespace for on-disk modules is [`Namespace::FILE`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// The default namespace for modules loaded from the filesystem.
    pub const FILE: &'static str = "file";

    /// Create a namespace from an arbitrary tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The default `file` namespace.
    #[must_use]
    pub fn file() -> Self {
        Self(Self::FILE.to_string())
    }

    /// Whether this is the default `file` namespace.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.0 == Self::FILE
    }

    /// The namespace tag as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::file()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of import triggered a resolve request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    /// Build entry point.
    EntryPoint,
    /// Static `import ... from` / `export ... from`.
    ImportStatement,
    /// Dynamic `import(...)`.
    DynamicImport,
    /// CommonJS `require(...)`.
    RequireCall,
}

/// Opaque payload attached to a resolution result.
///
/// The pipeline threads it unchanged: resolve result → load request → load
/// result → resolve requests for that module's own imports. Plugins use it
/// to carry state across the otherwise stateless hook boundary.
#[derive(Clone)]
pub struct PluginData(Arc<dyn Any + Send + Sync>);

impl PluginData {
    /// Wrap a value as an opaque payload.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the payload back as its concrete type.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for PluginData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PluginData(..)")
    }
}

/// A resolve request presented to resolve hooks.
#[derive(Debug, Clone)]
pub struct ResolveArgs {
    /// The import specifier exactly as written.
    pub specifier: String,
    /// Absolute path of the importing module, if any.
    pub importer: Option<String>,
    /// Directory to interpret entry-style specifiers against.
    pub resolve_dir: PathBuf,
    /// Namespace of the importing context.
    pub namespace: Namespace,
    /// What kind of import this is.
    pub kind: ResolveKind,
    /// Payload from the importer's load result, if any.
    pub plugin_data: Option<PluginData>,
}

/// A successful resolution: where a module lives and how to route its load.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Resolved path (absolute file path in the `file` namespace).
    pub path: String,
    /// Namespace the load request will carry.
    pub namespace: Namespace,
    /// Distinguishing suffix; modules with different suffixes are distinct
    /// instantiations of the same path.
    pub suffix: Option<String>,
    /// External module: recorded in the graph but never loaded.
    pub external: bool,
    /// Payload forwarded to the load request for this module.
    pub plugin_data: Option<PluginData>,
}

impl Resolved {
    /// A plain resolution in the `file` namespace.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: Namespace::file(),
            suffix: None,
            external: false,
            plugin_data: None,
        }
    }

    /// An external module result.
    pub fn external(path: impl Into<String>) -> Self {
        Self {
            external: true,
            ..Self::file(path)
        }
    }
}

/// A load request presented to load hooks.
#[derive(Debug, Clone)]
pub struct LoadArgs {
    /// Resolved module path.
    pub path: String,
    /// Namespace from the resolution result.
    pub namespace: Namespace,
    /// Suffix from the resolution result.
    pub suffix: Option<String>,
    /// Payload from the resolution result.
    pub plugin_data: Option<PluginData>,
}

/// A successful load: module contents plus routing hints.
#[derive(Debug, Clone)]
pub struct Loaded {
    /// Module source text.
    pub contents: String,
    /// Syntax loader hint; `None` lets the pipeline pick by extension.
    pub loader: Option<Loader>,
    /// Directory the module's own imports resolve against; defaults to the
    /// directory containing `path`.
    pub resolve_dir: Option<PathBuf>,
    /// Payload forwarded to resolve requests for this module's imports.
    pub plugin_data: Option<PluginData>,
}

/// Syntax loader applied to module text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Js,
    Jsx,
    Ts,
    Tsx,
    Json,
    Css,
    Text,
}

impl Loader {
    /// Parse a loader name as accepted in configuration.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "js" => Some(Self::Js),
            "jsx" => Some(Self::Jsx),
            "ts" => Some(Self::Ts),
            "tsx" => Some(Self::Tsx),
            "json" => Some(Self::Json),
            "css" => Some(Self::Css),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Default loader selection by file extension.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        match path.rsplit('.').next() {
            Some("jsx") => Self::Jsx,
            Some("ts" | "mts" | "cts") => Self::Ts,
            Some("tsx") => Self::Tsx,
            Some("json") => Self::Json,
            Some("css") => Self::Css,
            _ => Self::Js,
        }
    }

    /// Loader name as used in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::Jsx => "jsx",
            Self::Ts => "ts",
            Self::Tsx => "tsx",
            Self::Json => "json",
            Self::Css => "css",
            Self::Text => "text",
        }
    }
}

/// The host pipeline as seen from inside a hook.
///
/// Passed explicitly to resolve hooks so they can re-enter resolution (with
/// a different namespace tag) without holding a reference to global build
/// state.
pub trait BuildHost: Send + Sync {
    /// Resolve a request through the full hook chain plus default resolution.
    fn resolve(&self, args: ResolveArgs) -> Result<Resolved, ResolveError>;
}

/// Scope for a registered hook: a pattern plus an optional namespace.
///
/// The pattern is matched against the specifier for resolve hooks and
/// against the path for load hooks. `namespace: None` matches requests in
/// any namespace.
#[derive(Debug, Clone)]
pub struct HookFilter {
    filter: Option<Regex>,
    namespace: Option<Namespace>,
}

impl HookFilter {
    /// Match by pattern in any namespace.
    #[must_use]
    pub fn pattern(filter: Regex) -> Self {
        Self {
            filter: Some(filter),
            namespace: None,
        }
    }

    /// Match by pattern within one namespace.
    #[must_use]
    pub fn in_namespace(filter: Regex, namespace: Namespace) -> Self {
        Self {
            filter: Some(filter),
            namespace: Some(namespace),
        }
    }

    /// Match everything within one namespace.
    #[must_use]
    pub fn namespace(namespace: Namespace) -> Self {
        Self {
            filter: None,
            namespace: Some(namespace),
        }
    }

    fn matches(&self, subject: &str, namespace: &Namespace) -> bool {
        if let Some(ns) = &self.namespace {
            if ns != namespace {
                return false;
            }
        }
        match &self.filter {
            Some(re) => re.is_match(subject),
            None => true,
        }
    }
}

type ResolveFn = Box<dyn Fn(&ResolveArgs, &dyn BuildHost) -> HookResult<Option<Resolved>> + Send + Sync>;
type LoadFn = Box<dyn Fn(&LoadArgs) -> HookResult<Option<Loaded>> + Send + Sync>;

struct ResolveHook {
    filter: HookFilter,
    run: ResolveFn,
}

struct LoadHook {
    filter: HookFilter,
    run: LoadFn,
}

/// Registry of resolve and load hooks, in registration order.
///
/// Handed to [`Plugin::setup`] so plugins can attach their hooks; owned by
/// the pipeline afterwards.
#[derive(Default)]
pub struct HookSet {
    resolve_hooks: Vec<ResolveHook>,
    load_hooks: Vec<LoadHook>,
}

impl HookSet {
    /// Create an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolve hook.
    pub fn on_resolve<F>(&mut self, filter: HookFilter, run: F)
    where
        F: Fn(&ResolveArgs, &dyn BuildHost) -> HookResult<Option<Resolved>> + Send + Sync + 'static,
    {
        self.resolve_hooks.push(ResolveHook {
            filter,
            run: Box::new(run),
        });
    }

    /// Register a load hook.
    pub fn on_load<F>(&mut self, filter: HookFilter, run: F)
    where
        F: Fn(&LoadArgs) -> HookResult<Option<Loaded>> + Send + Sync + 'static,
    {
        self.load_hooks.push(LoadHook {
            filter,
            run: Box::new(run),
        });
    }

    /// Run resolve hooks in order; first `Some` wins.
    /// Returns `None` if no hook handled the request.
    pub fn run_resolve(
        &self,
        args: &ResolveArgs,
        host: &dyn BuildHost,
    ) -> HookResult<Option<Resolved>> {
        for hook in &self.resolve_hooks {
            if !hook.filter.matches(&args.specifier, &args.namespace) {
                continue;
            }
            if let Some(resolved) = (hook.run)(args, host)? {
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }

    /// Run load hooks in order; first `Some` wins.
    /// Returns `None` if no hook handled the request.
    pub fn run_load(&self, args: &LoadArgs) -> HookResult<Option<Loaded>> {
        for hook in &self.load_hooks {
            if !hook.filter.matches(&args.path, &args.namespace) {
                continue;
            }
            if let Some(loaded) = (hook.run)(args)? {
                return Ok(Some(loaded));
            }
        }
        Ok(None)
    }

    /// Check if any hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolve_hooks.is_empty() && self.load_hooks.is_empty()
    }
}

/// The plugin trait.
///
/// A plugin registers its hooks once at setup and holds no other connection
/// to the pipeline; everything else happens through the hook calls.
pub trait Plugin: Send + Sync {
    /// Plugin name for diagnostics and error messages.
    fn name(&self) -> &str;

    /// Register hooks. Called once per build, before the graph walk starts.
    fn setup(&self, hooks: &mut HookSet) -> HookResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoHost;

    impl BuildHost for NoHost {
        fn resolve(&self, args: ResolveArgs) -> Result<Resolved, ResolveError> {
            Err(ResolveError {
                specifier: args.specifier,
                from: String::new(),
                message: "no default resolution in tests".to_string(),
            })
        }
    }

    fn resolve_args(specifier: &str, namespace: Namespace) -> ResolveArgs {
        ResolveArgs {
            specifier: specifier.to_string(),
            importer: None,
            resolve_dir: PathBuf::from("/"),
            namespace,
            kind: ResolveKind::ImportStatement,
            plugin_data: None,
        }
    }

    #[test]
    fn test_first_matching_hook_wins() {
        let mut hooks = HookSet::new();
        hooks.on_resolve(HookFilter::pattern(Regex::new("^a$").unwrap()), |_, _| {
            Ok(Some(Resolved::file("/first")))
        });
        hooks.on_resolve(HookFilter::pattern(Regex::new("^a$").unwrap()), |_, _| {
            Ok(Some(Resolved::file("/second")))
        });

        let result = hooks
            .run_resolve(&resolve_args("a", Namespace::file()), &NoHost)
            .unwrap();
        assert_eq!(result.unwrap().path, "/first");
    }

    #[test]
    fn test_pass_through_falls_to_next_hook() {
        let mut hooks = HookSet::new();
        hooks.on_resolve(HookFilter::pattern(Regex::new(".*").unwrap()), |_, _| Ok(None));
        hooks.on_resolve(HookFilter::pattern(Regex::new(".*").unwrap()), |_, _| {
            Ok(Some(Resolved::file("/fallback")))
        });

        let result = hooks
            .run_resolve(&resolve_args("anything", Namespace::file()), &NoHost)
            .unwrap();
        assert_eq!(result.unwrap().path, "/fallback");
    }

    #[test]
    fn test_namespace_scoping() {
        let mut hooks = HookSet::new();
        let ns = Namespace::new("scoped");
        hooks.on_resolve(
            HookFilter::in_namespace(Regex::new(".*").unwrap(), ns.clone()),
            |_, _| Ok(Some(Resolved::file("/scoped"))),
        );

        let miss = hooks
            .run_resolve(&resolve_args("x", Namespace::file()), &NoHost)
            .unwrap();
        assert!(miss.is_none());

        let hit = hooks.run_resolve(&resolve_args("x", ns), &NoHost).unwrap();
        assert_eq!(hit.unwrap().path, "/scoped");
    }

    #[test]
    fn test_plugin_data_roundtrip() {
        let data = PluginData::new(Resolved::file("/original.js"));
        let back = data.downcast::<Resolved>().unwrap();
        assert_eq!(back.path, "/original.js");
        assert!(data.downcast::<String>().is_none());
    }

    #[test]
    fn test_loader_names() {
        assert_eq!(Loader::from_name("jsx"), Some(Loader::Jsx));
        assert_eq!(Loader::from_name("nope"), None);
        assert_eq!(Loader::from_path("/src/app.tsx"), Loader::Tsx);
        assert_eq!(Loader::from_path("/src/app.special.js"), Loader::Js);
        assert_eq!(Loader::from_path("noext"), Loader::Js);
    }

    #[test]
    fn test_hook_error_display() {
        let err = HookError::new("mod-wrap:x", "resolve", "boom");
        assert_eq!(err.to_string(), "[mod-wrap:x] resolve: boom");
    }
}
