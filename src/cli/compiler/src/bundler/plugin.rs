/* src/cli/compiler/src/bundler/plugin.rs */

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use regex::Regex;

use crate::classify::LoaderKind;
use crate::error::CompileError;

/// Namespace of modules read straight from disk.
pub const FILE_NAMESPACE: &str = "file";

/// Compile a hook filter.
pub fn filter(pattern: &str) -> Result<Regex, CompileError> {
  Regex::new(pattern).map_err(|e| CompileError::Config(format!("invalid plugin filter {pattern}: {e}")))
}

pub type HookResult<T> = Result<Option<T>, String>;
pub type HookFuture<T> = BoxFuture<'static, HookResult<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
  EntryPoint,
  ImportStatement,
  RequireCall,
  DynamicImport,
}

impl ImportKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::EntryPoint => "entry-point",
      Self::ImportStatement => "import-statement",
      Self::RequireCall => "require-call",
      Self::DynamicImport => "dynamic-import",
    }
  }
}

#[derive(Debug, Clone)]
pub struct ResolveArgs {
  pub path: String,
  /// Path of the importing module; `None` for entry points.
  pub importer: Option<String>,
  pub namespace: String,
  pub resolve_dir: PathBuf,
  pub kind: ImportKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
  pub path: String,
  pub namespace: String,
  pub external: bool,
}

impl ResolveResult {
  pub fn file(path: impl Into<String>) -> Self {
    Self { path: path.into(), namespace: FILE_NAMESPACE.to_string(), external: false }
  }

  pub fn external(path: impl Into<String>) -> Self {
    Self { path: path.into(), namespace: FILE_NAMESPACE.to_string(), external: true }
  }

  pub fn in_namespace(path: impl Into<String>, namespace: impl Into<String>) -> Self {
    Self { path: path.into(), namespace: namespace.into(), external: false }
  }
}

#[derive(Debug, Clone)]
pub struct LoadArgs {
  pub path: String,
  pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
  pub contents: String,
  /// Defaults to the loader implied by the path's extension.
  pub loader: Option<LoaderKind>,
  /// Directory imports of this module resolve against.
  pub resolve_dir: Option<PathBuf>,
}

pub type ResolveHandler = Arc<dyn Fn(ResolveArgs) -> HookFuture<ResolveResult> + Send + Sync>;
pub type LoadHandler = Arc<dyn Fn(LoadArgs) -> HookFuture<LoadResult> + Send + Sync>;

/// Resolution hook: consulted for specifiers matching `filter`, optionally
/// only when imported from modules in `namespace`.
#[derive(Clone)]
pub struct OnResolve {
  pub filter: Regex,
  pub namespace: Option<String>,
  pub handler: ResolveHandler,
}

/// Load hook: consulted for modules in `namespace` whose path matches `filter`.
#[derive(Clone)]
pub struct OnLoad {
  pub filter: Regex,
  pub namespace: String,
  pub handler: LoadHandler,
}

/// A bundler plugin: a name plus whichever hooks it provides. Plugins are
/// consulted in registration order and the first hook that answers wins.
#[derive(Clone)]
pub struct Plugin {
  pub name: String,
  pub on_resolve: Option<OnResolve>,
  pub on_load: Option<OnLoad>,
}

impl fmt::Debug for Plugin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Plugin")
      .field("name", &self.name)
      .field("on_resolve", &self.on_resolve.as_ref().map(|h| h.filter.as_str()))
      .field("on_load", &self.on_load.as_ref().map(|h| (h.filter.as_str(), h.namespace.as_str())))
      .finish()
  }
}

impl Plugin {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), on_resolve: None, on_load: None }
  }

  pub fn on_resolve<F, Fut>(mut self, filter: Regex, handler: F) -> Self
  where
    F: Fn(ResolveArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult<ResolveResult>> + Send + 'static,
  {
    self.on_resolve = Some(OnResolve { filter, namespace: None, handler: Arc::new(move |args| handler(args).boxed()) });
    self
  }

  pub fn on_load<F, Fut>(mut self, filter: Regex, namespace: impl Into<String>, handler: F) -> Self
  where
    F: Fn(LoadArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult<LoadResult>> + Send + 'static,
  {
    self.on_load = Some(OnLoad {
      filter,
      namespace: namespace.into(),
      handler: Arc::new(move |args| handler(args).boxed()),
    });
    self
  }

  pub(crate) fn wants_resolve(&self, args: &ResolveArgs) -> Option<&ResolveHandler> {
    let hook = self.on_resolve.as_ref()?;
    let namespace_ok = hook.namespace.as_ref().is_none_or(|ns| *ns == args.namespace);
    (namespace_ok && hook.filter.is_match(&args.path)).then_some(&hook.handler)
  }

  pub(crate) fn wants_load(&self, args: &LoadArgs) -> Option<&LoadHandler> {
    let hook = self.on_load.as_ref()?;
    (hook.namespace == args.namespace && hook.filter.is_match(&args.path)).then_some(&hook.handler)
  }
}
