//! `modwrap` — module-wrapping interception for a bundler pipeline.
//!
//! Substitutes a caller-supplied wrapper module in place of every import
//! matched by a pattern, while giving the wrapper access to the original
//! module's output through a private alias import. Useful for injecting
//! instrumentation, shims or higher-order transforms around modules without
//! touching their source.
//!
//! The crate has two halves:
//!
//! - [`WrapPlugin`] — the interception plugin itself, built on the
//!   resolve/load hook protocol in [`hooks`].
//! - [`Pipeline`] — a reference host that walks a module graph through the
//!   same protocol, so the plugin can be driven and tested end to end.
//!
//! ## Example
//!
//! ```ignore
//! use modwrap::{Pipeline, WrapOptions, WrapPlugin};
//! use regex_lite::Regex;
//!
//! let plugin = WrapPlugin::new(
//!     WrapOptions::new(Regex::new(r"\.special\.js$")?, "./logger.js")
//!         .wrapper_loader("js"),
//! )?;
//! let graph = Pipeline::new("/project")
//!     .plugin(&plugin)?
//!     .build("src/index.js".as_ref())?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod hooks;
pub mod pipeline;
pub mod resolve;
pub mod scan;
pub mod wrap;

pub use error::Error;
pub use hooks::{
    BuildHost, HookError, HookFilter, HookResult, HookSet, LoadArgs, Loaded, Loader, Namespace,
    Plugin, PluginData, ResolveArgs, ResolveKind, Resolved,
};
pub use pipeline::{BuildError, BuiltModule, ModuleGraph, ModuleId, ModuleKey, Pipeline};
pub use resolve::{ResolveError, Resolver};
pub use scan::{scan_imports, Import};
pub use wrap::{WrapOptions, WrapPlugin, DEFAULT_INNER_NAME};
