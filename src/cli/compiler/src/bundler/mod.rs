/* src/cli/compiler/src/bundler/mod.rs */

//! A small module bundler: resolves and loads a module graph through a
//! plugin pipeline, wraps every module in a registry `define` call and writes
//! content-hashed chunks plus an esbuild-shaped metafile.

mod emit;
mod metafile;
mod plugin;
mod resolve;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};
use tracing::debug;

pub use emit::{content_hash, write_atomic};
pub use metafile::{Metafile, MetafileImport, MetafileInput, MetafileOutput, MetafileOutputInput};
pub use plugin::{
  FILE_NAMESPACE, HookFuture, HookResult, ImportKind, LoadArgs, LoadHandler, LoadResult, OnLoad,
  OnResolve, Plugin, ResolveArgs, ResolveHandler, ResolveResult, filter,
};
pub use resolve::{RESOLVE_EXTENSIONS, Resolved, Resolver};

use crate::classify::{BROWSER_VIEW_SUFFIX, EMPTY_MODULE, LoaderKind, VirtualKind, classify};
use crate::error::{BuildFailure, CompileError, Diagnostic};
use crate::markdown::compile_markdown;
use crate::package::Platform;
use crate::scan::{CallKind, ModuleScan, line_column, scan_module};

/// Namespace of files replaced by an empty module.
pub const EMPTY_NAMESPACE: &str = "empty-module";
const STDIN_NAMESPACE: &str = "stdin";
const STDIN_PATH: &str = "<stdin>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  /// ES modules; required for code splitting.
  Esm,
  /// A single CommonJS file.
  Cjs,
}

/// A synthesized entry module.
#[derive(Debug, Clone)]
pub struct StdinEntry {
  pub contents: String,
  pub resolve_dir: PathBuf,
  pub loader: LoaderKind,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
  /// Metafile keys and module ids are relative to this directory.
  pub root_dir: PathBuf,
  pub entry_points: Vec<String>,
  pub stdin: Option<StdinEntry>,
  pub outdir: PathBuf,
  /// Entry chunk names keep their path relative to this directory.
  pub outbase: PathBuf,
  /// Fixed, unhashed output name (relative to `outdir`) for a single entry.
  pub outfile: Option<String>,
  pub public_path: String,
  pub platform: Platform,
  pub format: Format,
  pub splitting: bool,
  /// Dotted globals replaced by expressions, e.g. `process.env.NODE_ENV`.
  pub define: Vec<(String, String)>,
  pub aliases: Vec<(String, PathBuf)>,
  pub plugins: Vec<Plugin>,
  /// When false, outputs are returned but not written.
  pub write: bool,
}

impl BuildOptions {
  pub fn new(root_dir: impl Into<PathBuf>, outdir: impl Into<PathBuf>) -> Self {
    let root_dir = root_dir.into();
    Self {
      outbase: root_dir.clone(),
      root_dir,
      entry_points: Vec::new(),
      stdin: None,
      outdir: outdir.into(),
      outfile: None,
      public_path: "/".to_string(),
      platform: Platform::Browser,
      format: Format::Esm,
      splitting: false,
      define: Vec::new(),
      aliases: Vec::new(),
      plugins: Vec::new(),
      write: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
  /// Absolute output path.
  pub path: PathBuf,
  pub contents: Vec<u8>,
}

impl OutputFile {
  pub fn text(&self) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(&self.contents)
  }
}

#[derive(Debug, Clone)]
pub struct BuildResult {
  pub outputs: Vec<OutputFile>,
  pub metafile: Metafile,
}

impl BuildResult {
  pub fn output(&self, path: &Path) -> Option<&OutputFile> {
    self.outputs.iter().find(|o| o.path == path)
  }
}

#[derive(Debug, Clone)]
pub(crate) enum ModuleBody {
  Script { source: String, scan: Arc<ModuleScan> },
  Json(String),
  Text(String),
  Asset { url: String, file: String, bytes: Vec<u8> },
  External(String),
  Empty,
}

#[derive(Debug, Clone)]
pub(crate) struct ModuleDep {
  pub specifier: String,
  pub target: usize,
  pub kind: ImportKind,
}

#[derive(Debug, Clone)]
pub(crate) struct Module {
  /// Registry id and metafile key.
  pub id: String,
  pub namespace: String,
  pub path: String,
  pub body: ModuleBody,
  pub deps: Vec<ModuleDep>,
  pub input_bytes: usize,
}

impl Module {
  pub fn is_external(&self) -> bool {
    matches!(self.body, ModuleBody::External(_))
  }

  /// Statically known exports of the module.
  pub fn export_names(&self) -> Vec<String> {
    match &self.body {
      ModuleBody::Script { scan, .. } if scan.is_esm() => scan.export_names(),
      ModuleBody::Empty => Vec::new(),
      _ => vec!["default".to_string()],
    }
  }
}

#[derive(Debug, Default)]
pub(crate) struct Graph {
  pub modules: Vec<Module>,
  pub entries: Vec<usize>,
}

enum Target {
  Module { namespace: String, path: String },
  External(String),
}

struct Loaded {
  contents: Vec<u8>,
  loader: LoaderKind,
  resolve_dir: PathBuf,
}

/// Reusable build state: options plus a parse cache keyed by content hash.
/// Disposing makes every later rebuild fail.
#[derive(Debug)]
pub struct BuildContext {
  options: BuildOptions,
  resolver: Resolver,
  parsed: Mutex<HashMap<String, Arc<ModuleScan>>>,
  disposed: AtomicBool,
}

/// One-shot build.
pub async fn build(options: BuildOptions) -> Result<BuildResult, CompileError> {
  BuildContext::new(options).rebuild().await
}

impl BuildContext {
  pub fn new(options: BuildOptions) -> Self {
    let resolver = Resolver { platform: options.platform, aliases: options.aliases.clone() };
    Self { options, resolver, parsed: Mutex::new(HashMap::new()), disposed: AtomicBool::new(false) }
  }

  /// Whether `rebuild` writes its outputs; callers that stage writes
  /// themselves turn this off.
  pub fn writing(mut self, write: bool) -> Self {
    self.options.write = write;
    self
  }

  pub fn options(&self) -> &BuildOptions {
    &self.options
  }

  pub fn dispose(&self) {
    self.disposed.store(true, Ordering::SeqCst);
    self.parsed.lock().unwrap_or_else(PoisonError::into_inner).clear();
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::SeqCst)
  }

  /// Build the graph from scratch, reusing cached parses of unchanged sources.
  /// Outputs are written only when every module resolved and parsed.
  pub async fn rebuild(&self) -> Result<BuildResult, CompileError> {
    if self.is_disposed() {
      return Err(CompileError::Disposed);
    }
    let graph = self.collect().await?;
    let result = emit::assemble(&graph, &self.options);
    if self.is_disposed() {
      return Err(CompileError::Disposed);
    }
    if self.options.write {
      for output in &result.outputs {
        write_atomic(&output.path, &output.contents)?;
      }
    }
    debug!(outputs = result.outputs.len(), modules = graph.modules.len(), "bundle complete");
    Ok(result)
  }

  async fn collect(&self) -> Result<Graph, BuildFailure> {
    let mut walk = Walk::default();

    for spec in &self.options.entry_points {
      let args = ResolveArgs {
        path: spec.clone(),
        importer: None,
        namespace: FILE_NAMESPACE.to_string(),
        resolve_dir: self.options.root_dir.clone(),
        kind: ImportKind::EntryPoint,
      };
      match self.resolve(args).await {
        Ok(Target::Module { namespace, path }) => {
          let idx = walk.intern(&self.options.root_dir, namespace, path);
          walk.graph.entries.push(idx);
        }
        Ok(Target::External(_)) => {
          walk.diagnostics.push(Diagnostic::new(format!("The entry point \"{spec}\" cannot be marked as external")))
        }
        Err(text) => walk.diagnostics.push(Diagnostic::new(text)),
      }
    }
    if self.options.stdin.is_some() {
      let idx = walk.intern(&self.options.root_dir, STDIN_NAMESPACE.to_string(), STDIN_PATH.to_string());
      walk.graph.entries.push(idx);
    }

    while let Some(idx) = walk.queue.pop_front() {
      self.process(idx, &mut walk).await;
    }

    if walk.diagnostics.is_empty() {
      Ok(walk.graph)
    } else {
      Err(BuildFailure { diagnostics: walk.diagnostics })
    }
  }

  async fn process(&self, idx: usize, walk: &mut Walk) {
    let (namespace, path) = {
      let module = &walk.graph.modules[idx];
      (module.namespace.clone(), module.path.clone())
    };
    let display = self.display_path(&path);
    let loaded = match self.load(&namespace, &path).await {
      Ok(loaded) => loaded,
      Err(text) => {
        walk.diagnostics.push(Diagnostic::new(text));
        return;
      }
    };
    let input_bytes = loaded.contents.len();
    let resolve_dir = loaded.resolve_dir.clone();

    let body = match self.module_body(&path, loaded, &display) {
      Ok(body) => body,
      Err(diagnostic) => {
        walk.diagnostics.push(diagnostic);
        return;
      }
    };

    let mut deps = Vec::new();
    if let ModuleBody::Script { source, scan } = &body {
      for dep in scan.dependencies() {
        let kind = match dep.call {
          None => ImportKind::ImportStatement,
          Some(CallKind::Require) => ImportKind::RequireCall,
          Some(CallKind::DynamicImport) => ImportKind::DynamicImport,
        };
        let args = ResolveArgs {
          path: dep.specifier.clone(),
          importer: Some(path.clone()),
          namespace: namespace.clone(),
          resolve_dir: resolve_dir.clone(),
          kind,
        };
        match self.resolve(args).await {
          Ok(target) => {
            let target = match target {
              Target::Module { namespace, path } => walk.intern(&self.options.root_dir, namespace, path),
              Target::External(spec) => walk.intern_external(spec),
            };
            deps.push(ModuleDep { specifier: dep.specifier, target, kind });
          }
          Err(text) => {
            let (line, column) = line_column(source, dep.offset);
            walk.diagnostics.push(Diagnostic::at(text, &display, line, column));
          }
        }
      }
    }

    let module = &mut walk.graph.modules[idx];
    module.body = body;
    module.deps = deps;
    module.input_bytes = input_bytes;
  }

  fn module_body(&self, path: &str, loaded: Loaded, display: &Path) -> Result<ModuleBody, Diagnostic> {
    let Loaded { contents, loader, .. } = loaded;
    if loader.is_asset() {
      let file = asset_file_name(path, &contents);
      let url = format!("{}{file}", self.options.public_path);
      return Ok(ModuleBody::Asset { url, file, bytes: contents });
    }
    let text = String::from_utf8(contents)
      .map_err(|_| Diagnostic::new(format!("{} is not valid UTF-8", display.display())))?;
    match loader {
      LoaderKind::Json => {
        serde_json::from_str::<serde_json::Value>(&text)
          .map_err(|e| Diagnostic::at(e.to_string(), display, e.line(), e.column().saturating_sub(1)))?;
        Ok(ModuleBody::Json(text.trim().to_string()))
      }
      LoaderKind::Text => Ok(ModuleBody::Text(text)),
      LoaderKind::Markdown => {
        let source = compile_markdown(&text).map_err(|e| Diagnostic::at(e.message, display, e.line, e.column))?;
        let scan = self
          .parse(&source, LoaderKind::Jsx)
          .map_err(|e| Diagnostic::at(e.message, display, e.line, e.column))?;
        Ok(ModuleBody::Script { source, scan })
      }
      _ => {
        let source = match classify(path, Some(&text)).virtual_kind {
          Some(VirtualKind::EmptyModule) => EMPTY_MODULE.to_string(),
          _ => text,
        };
        let scan = self
          .parse(&source, loader)
          .map_err(|e| Diagnostic::at(e.message, display, e.line, e.column))?;
        Ok(ModuleBody::Script { source, scan })
      }
    }
  }

  fn parse(&self, source: &str, loader: LoaderKind) -> Result<Arc<ModuleScan>, crate::scan::SyntaxError> {
    let options = loader.scan_options();
    let mut hasher = Sha256::new();
    hasher.update([u8::from(options.jsx), u8::from(options.typescript)]);
    hasher.update(source.as_bytes());
    let key = hex::encode(hasher.finalize());

    if let Some(scan) = self.parsed.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
      return Ok(Arc::clone(scan));
    }
    let scan = Arc::new(scan_module(source, options)?);
    self.parsed.lock().unwrap_or_else(PoisonError::into_inner).insert(key, Arc::clone(&scan));
    Ok(scan)
  }

  async fn resolve(&self, args: ResolveArgs) -> Result<Target, String> {
    for plugin in &self.options.plugins {
      let Some(handler) = plugin.wants_resolve(&args) else {
        continue;
      };
      match handler(args.clone()).await {
        Ok(Some(result)) if result.external => return Ok(Target::External(result.path)),
        Ok(Some(result)) => return Ok(Target::Module { namespace: result.namespace, path: result.path }),
        Ok(None) => {}
        Err(e) => return Err(format!("[plugin {}] {e}", plugin.name)),
      }
    }
    match self.resolver.resolve(&args.path, &args.resolve_dir)? {
      Resolved::File(file) => {
        Ok(Target::Module { namespace: FILE_NAMESPACE.to_string(), path: file.to_string_lossy().into_owned() })
      }
      Resolved::External(spec) => Ok(Target::External(spec)),
      Resolved::Empty(file) => {
        Ok(Target::Module { namespace: EMPTY_NAMESPACE.to_string(), path: file.to_string_lossy().into_owned() })
      }
    }
  }

  async fn load(&self, namespace: &str, path: &str) -> Result<Loaded, String> {
    let fallback_dir = || Path::new(path.strip_suffix(BROWSER_VIEW_SUFFIX).unwrap_or(path)).parent().map(Path::to_path_buf);

    if namespace == STDIN_NAMESPACE
      && let Some(stdin) = &self.options.stdin
    {
      return Ok(Loaded {
        contents: stdin.contents.clone().into_bytes(),
        loader: stdin.loader,
        resolve_dir: stdin.resolve_dir.clone(),
      });
    }

    let args = LoadArgs { path: path.to_string(), namespace: namespace.to_string() };
    for plugin in &self.options.plugins {
      let Some(handler) = plugin.wants_load(&args) else {
        continue;
      };
      match handler(args.clone()).await {
        Ok(Some(result)) => {
          return Ok(Loaded {
            contents: result.contents.into_bytes(),
            loader: result.loader.unwrap_or_else(|| classify(path, None).loader),
            resolve_dir: result.resolve_dir.or_else(fallback_dir).unwrap_or_else(|| self.options.root_dir.clone()),
          });
        }
        Ok(None) => {}
        Err(e) => return Err(format!("[plugin {}] {e}", plugin.name)),
      }
    }

    let resolve_dir = fallback_dir().unwrap_or_else(|| self.options.root_dir.clone());
    match namespace {
      EMPTY_NAMESPACE => Ok(Loaded { contents: Vec::new(), loader: LoaderKind::Js, resolve_dir }),
      FILE_NAMESPACE => {
        let contents = tokio::fs::read(path).await.map_err(|e| format!("Could not read \"{path}\": {e}"))?;
        Ok(Loaded { contents, loader: LoaderKind::from_path(Path::new(path)), resolve_dir })
      }
      _ => Err(format!("No loader is configured for \"{namespace}:{path}\"")),
    }
  }

  fn display_path(&self, path: &str) -> PathBuf {
    let file = Path::new(path.strip_suffix(BROWSER_VIEW_SUFFIX).unwrap_or(path));
    file.strip_prefix(&self.options.root_dir).unwrap_or(file).to_path_buf()
  }
}

#[derive(Default)]
struct Walk {
  graph: Graph,
  index: HashMap<(String, String), usize>,
  queue: VecDeque<usize>,
  diagnostics: Vec<Diagnostic>,
}

impl Walk {
  fn intern(&mut self, root: &Path, namespace: String, path: String) -> usize {
    let key = (namespace, path);
    if let Some(&idx) = self.index.get(&key) {
      return idx;
    }
    let (namespace, path) = key.clone();
    let idx = self.graph.modules.len();
    self.graph.modules.push(Module {
      id: module_id(root, &namespace, &path),
      namespace,
      path,
      body: ModuleBody::Empty,
      deps: Vec::new(),
      input_bytes: 0,
    });
    self.index.insert(key, idx);
    self.queue.push_back(idx);
    idx
  }

  fn intern_external(&mut self, specifier: String) -> usize {
    let key = ("external".to_string(), specifier);
    if let Some(&idx) = self.index.get(&key) {
      return idx;
    }
    let idx = self.graph.modules.len();
    self.graph.modules.push(Module {
      id: format!("external:{}", key.1),
      namespace: key.0.clone(),
      path: key.1.clone(),
      body: ModuleBody::External(key.1.clone()),
      deps: Vec::new(),
      input_bytes: 0,
    });
    self.index.insert(key, idx);
    idx
  }
}

/// Root-relative, `/`-separated; virtual namespaces are kept as a prefix.
fn module_id(root: &Path, namespace: &str, path: &str) -> String {
  let rel = Path::new(path)
    .strip_prefix(root)
    .map(|p| p.to_string_lossy().replace('\\', "/"))
    .unwrap_or_else(|_| path.to_string());
  if namespace == FILE_NAMESPACE { rel } else { format!("{namespace}:{rel}") }
}

fn asset_file_name(path: &str, contents: &[u8]) -> String {
  let file = Path::new(path);
  let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("asset");
  let hash = content_hash(contents);
  match file.extension().and_then(|e| e.to_str()) {
    Some(ext) => format!("_assets/{stem}-{hash}.{ext}"),
    None => format!("_assets/{stem}-{hash}"),
  }
}
