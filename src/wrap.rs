//! Module-wrapping interception.
//!
//! Redirects imports matched by a filter to a caller-supplied wrapper
//! module, while letting the wrapper reach the original module through a
//! private alias import. The original's source is never touched; wrapping
//! happens entirely at resolve/load time.
//!
//! ## Protocol
//!
//! 1. A matched import is redirected to the wrapper, tagged with this
//!    instance's *wrap* namespace. The original module is resolved eagerly
//!    and rides along as plugin data; a `?namespace:path` suffix keeps each
//!    wrapped module a distinct wrapper instantiation.
//! 2. Loads in the wrap namespace serve the wrapper's file text (read once
//!    per build) and forward the plugin data.
//! 3. The wrapper's import of the inner alias resolves back to the original
//!    path, tagged with the *unwrap* namespace so this instance never
//!    intercepts it again.
//! 4. Loads in the unwrap namespace read the original file verbatim.
//!
//! ## Usage
//!
//! ```ignore
//! use modwrap::{Pipeline, WrapOptions, WrapPlugin};
//! use regex_lite::Regex;
//!
//! let plugin = WrapPlugin::new(
//!     WrapOptions::new(Regex::new(r"\.special\.js$")?, "./logger.js"),
//! )?;
//! let graph = Pipeline::new(cwd).plugin(&plugin)?.build(entry)?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::error::Error;
use crate::hooks::{
    BuildHost, HookError, HookFilter, HookResult, HookSet, LoadArgs, Loaded, Loader, Namespace,
    Plugin, PluginData, ResolveArgs, ResolveKind, Resolved,
};
use regex_lite::Regex;

/// Default alias the wrapper imports to reach the original module.
pub const DEFAULT_INNER_NAME: &str = "wrapped-module";

/// Configuration for a [`WrapPlugin`] instance.
#[derive(Debug, Clone)]
pub struct WrapOptions {
    /// Pattern matched against import specifiers; matches get wrapped.
    pub filter: Regex,
    /// Import specifier of the wrapper module, resolved entry-style.
    pub wrapper: String,
    /// Loader hint applied when the wrapper text is parsed.
    pub wrapper_loader: Option<String>,
    /// Alias the wrapper imports to reach the original module.
    pub inner_name: Option<String>,
    /// Base directory for resolving `wrapper`; defaults to the process cwd.
    pub resolve_dir: Option<PathBuf>,
}

impl WrapOptions {
    /// Options with the required fields; everything else defaulted.
    pub fn new(filter: Regex, wrapper: impl Into<String>) -> Self {
        Self {
            filter,
            wrapper: wrapper.into(),
            wrapper_loader: None,
            inner_name: None,
            resolve_dir: None,
        }
    }

    /// Set the wrapper loader hint (`"js"`, `"jsx"`, `"ts"`, ...).
    #[must_use]
    pub fn wrapper_loader(mut self, loader: impl Into<String>) -> Self {
        self.wrapper_loader = Some(loader.into());
        self
    }

    /// Set the inner alias name.
    #[must_use]
    pub fn inner_name(mut self, name: impl Into<String>) -> Self {
        self.inner_name = Some(name.into());
        self
    }

    /// Set the base directory for resolving the wrapper.
    #[must_use]
    pub fn resolve_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resolve_dir = Some(dir.into());
        self
    }
}

/// Immutable per-instance state, shared with the registered hook closures.
#[derive(Debug)]
struct WrapState {
    /// Instance name, used in diagnostics and hook errors.
    name: String,
    filter: Regex,
    wrapper: String,
    wrapper_loader: Option<Loader>,
    inner_name: String,
    inner_filter: Regex,
    resolve_dir: PathBuf,
    /// Namespace of wrapper instantiations.
    wrap_ns: Namespace,
    /// Namespace marking already-intercepted requests.
    unwrap_ns: Namespace,
    /// Wrapper file text, read at most once per build.
    wrapper_text: OnceLock<String>,
}

/// The module-wrapping plugin.
///
/// Create one instance per wrap rule; instances are independent and their
/// namespaces never collide, even for wrapper specifiers that differ only in
/// characters the slug sanitizer replaces.
#[derive(Debug)]
pub struct WrapPlugin {
    state: Arc<WrapState>,
}

impl WrapPlugin {
    /// Validate options and build a plugin instance.
    ///
    /// # Errors
    /// Returns a configuration error for an empty wrapper specifier, a
    /// malformed inner alias, or an unknown loader name.
    pub fn new(options: WrapOptions) -> Result<Self, Error> {
        let wrapper = options.wrapper.trim().to_string();
        if wrapper.is_empty() {
            return Err(Error::config("wrapper module specifier is required"));
        }

        let inner_name = options
            .inner_name
            .unwrap_or_else(|| DEFAULT_INNER_NAME.to_string());
        if inner_name.is_empty()
            || inner_name
                .chars()
                .any(|c| c.is_whitespace() || c == '"' || c == '\'')
        {
            return Err(Error::config(format!(
                "inner alias '{inner_name}' must be a plain import specifier"
            )));
        }

        let wrapper_loader = match &options.wrapper_loader {
            Some(name) => Some(Loader::from_name(name).ok_or_else(|| Error::UnknownLoader {
                name: name.clone(),
            })?),
            None => None,
        };

        let inner_filter = Regex::new(&format!("^{}$", regex_lite::escape(&inner_name)))
            .map_err(|e| Error::config(format!("inner alias '{inner_name}': {e}")))?;

        let resolve_dir = options
            .resolve_dir
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

        let slug = instance_slug(&wrapper);
        let name = format!("mod-wrap:{slug}");

        Ok(Self {
            state: Arc::new(WrapState {
                wrap_ns: Namespace::new(format!("{name}:wrap")),
                unwrap_ns: Namespace::new(format!("{name}:unwrap")),
                name,
                filter: options.filter,
                wrapper,
                wrapper_loader,
                inner_name,
                inner_filter,
                resolve_dir,
                wrapper_text: OnceLock::new(),
            }),
        })
    }

    /// Namespace of wrapper instantiations for this instance.
    #[must_use]
    pub fn wrap_namespace(&self) -> &Namespace {
        &self.state.wrap_ns
    }

    /// Namespace marking already-intercepted requests for this instance.
    #[must_use]
    pub fn unwrap_namespace(&self) -> &Namespace {
        &self.state.unwrap_ns
    }
}

impl Plugin for WrapPlugin {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn setup(&self, hooks: &mut HookSet) -> HookResult<()> {
        // Intercept resolution of matched imports and redirect to the wrapper.
        let state = Arc::clone(&self.state);
        hooks.on_resolve(HookFilter::pattern(self.state.filter.clone()), move |args, host| {
            state.intercept(args, host)
        });

        // Serve the wrapper text for loads in the wrap namespace.
        let state = Arc::clone(&self.state);
        hooks.on_load(HookFilter::namespace(self.state.wrap_ns.clone()), move |args| {
            state.load_wrapper(args)
        });

        // Map the wrapper's inner alias import back to the original module.
        let state = Arc::clone(&self.state);
        hooks.on_resolve(
            HookFilter::in_namespace(self.state.inner_filter.clone(), self.state.wrap_ns.clone()),
            move |args, _host| state.resolve_inner(args),
        );

        // Load the original file verbatim; default loader selection applies.
        let state = Arc::clone(&self.state);
        hooks.on_load(HookFilter::namespace(self.state.unwrap_ns.clone()), move |args| {
            state.load_original(args)
        });

        Ok(())
    }
}

impl WrapState {
    /// Resolution interceptor (resolve hook, any namespace).
    fn intercept(&self, args: &ResolveArgs, host: &dyn BuildHost) -> HookResult<Option<Resolved>> {
        // Recursion guard: requests already inside this instance's
        // namespaces are never intercepted again.
        if args.namespace == self.unwrap_ns || args.namespace == self.wrap_ns {
            return Ok(None);
        }

        debug!(
            specifier = %args.specifier,
            importer = ?args.importer,
            wrapper = %self.wrapper,
            "wrapping import"
        );

        // Resolve the module being wrapped, tagged with the unwrap namespace
        // so the nested hook run passes straight through to the host.
        let original = host
            .resolve(ResolveArgs {
                specifier: args.specifier.clone(),
                importer: args.importer.clone(),
                resolve_dir: args.resolve_dir.clone(),
                namespace: self.unwrap_ns.clone(),
                kind: args.kind,
                plugin_data: None,
            })
            .map_err(|e| {
                HookError::new(
                    &self.name,
                    "resolve",
                    format!("could not resolve wrapped module '{}': {e}", args.specifier),
                )
            })?;

        // Builtins and other externals cannot be wrapped; hand the
        // resolution back unchanged.
        if original.external {
            return Ok(Some(original));
        }

        // Resolve the wrapper module itself, entry-style.
        let wrapper = host
            .resolve(ResolveArgs {
                specifier: self.wrapper.clone(),
                importer: None,
                resolve_dir: self.resolve_dir.clone(),
                namespace: self.unwrap_ns.clone(),
                kind: ResolveKind::EntryPoint,
                plugin_data: None,
            })
            .map_err(|e| {
                HookError::new(
                    &self.name,
                    "resolve",
                    format!("could not resolve module wrapper '{}': {e}", self.wrapper),
                )
            })?;

        // Redirect to the wrapper:
        // - wrap namespace routes the load to our wrapper loader
        // - plugin data carries the resolved original for the inner alias
        // - the suffix keeps each wrapped module a distinct instantiation
        let suffix = format!("?{}:{}", original.namespace, original.path);
        Ok(Some(Resolved {
            path: wrapper.path,
            namespace: self.wrap_ns.clone(),
            suffix: Some(suffix),
            external: false,
            plugin_data: Some(PluginData::new(original)),
        }))
    }

    /// Wrapper loader (load hook, wrap namespace).
    fn load_wrapper(&self, args: &LoadArgs) -> HookResult<Option<Loaded>> {
        let path = Path::new(&args.path);
        let text = self.wrapper_text(path).map_err(|e| {
            HookError::new(
                &self.name,
                "load",
                format!("could not read module wrapper '{}': {e}", args.path),
            )
        })?;

        Ok(Some(Loaded {
            contents: text.to_string(),
            loader: self.wrapper_loader,
            resolve_dir: path.parent().map(Path::to_path_buf),
            // Forward so the inner alias resolution sees the payload.
            plugin_data: args.plugin_data.clone(),
        }))
    }

    /// Inner resolver (resolve hook, wrap namespace, inner alias only).
    fn resolve_inner(&self, args: &ResolveArgs) -> HookResult<Option<Resolved>> {
        let original = args
            .plugin_data
            .as_ref()
            .and_then(|data| data.downcast::<Resolved>())
            .ok_or_else(|| {
                HookError::new(
                    &self.name,
                    "resolve",
                    format!(
                        "inner alias '{}' resolved without a wrapped-module payload",
                        self.inner_name
                    ),
                )
            })?;

        debug!(alias = %self.inner_name, original = %original.path, "unwrapping alias");

        Ok(Some(Resolved {
            path: original.path.clone(),
            namespace: self.unwrap_ns.clone(),
            suffix: None,
            external: false,
            plugin_data: None,
        }))
    }

    /// Original-module loader (load hook, unwrap namespace).
    fn load_original(&self, args: &LoadArgs) -> HookResult<Option<Loaded>> {
        let contents = std::fs::read_to_string(&args.path).map_err(|e| {
            HookError::new(
                &self.name,
                "load",
                format!("could not read wrapped module '{}': {e}", args.path),
            )
        })?;

        Ok(Some(Loaded {
            contents,
            loader: None,
            resolve_dir: Path::new(&args.path).parent().map(Path::to_path_buf),
            plugin_data: None,
        }))
    }

    /// Wrapper text, read from disk at most once per build.
    ///
    /// Concurrent first reads may race; all produce identical content and
    /// only one is kept.
    fn wrapper_text(&self, path: &Path) -> Result<&str, std::io::Error> {
        if let Some(text) = self.wrapper_text.get() {
            return Ok(text);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(self.wrapper_text.get_or_init(|| text))
    }
}

/// Collision-resistant slug for a wrapper specifier.
///
/// The readable part keeps filename-ish characters; the blake3 tail keeps
/// two specifiers distinct even when sanitization maps them to the same
/// readable part.
fn instance_slug(wrapper: &str) -> String {
    let mut sanitized: String = wrapper
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if sanitized.len() > 40 {
        // Keep the tail; it usually holds the file name.
        sanitized = sanitized.split_off(sanitized.len() - 40);
    }
    let digest = blake3::hash(wrapper.as_bytes());
    format!("{sanitized}-{}", &digest.to_hex().as_str()[..12])
}
