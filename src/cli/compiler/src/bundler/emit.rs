/* src/cli/compiler/src/bundler/emit.rs */

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::ops::Range;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::metafile::{Metafile, MetafileImport, MetafileInput, MetafileOutput, MetafileOutputInput};
use super::{BuildOptions, BuildResult, Format, Graph, Module, ModuleBody, OutputFile};
use crate::classify::BROWSER_VIEW_SUFFIX;
use crate::error::CompileError;
use crate::scan::{CallKind, ImportedName, ModuleScan, StatementKind, TokenKind};

/// Module registry shared by every chunk of an ESM build through
/// `globalThis`. CommonJS output keeps a private registry per file.
const RUNTIME_BODY: &str = r#"(function () {
  var defs = {}, cache = {};
  function load(id) {
    if (cache[id]) return cache[id].exports;
    var def = defs[id];
    if (!def) throw new Error("Module not found: " + id);
    var module = (cache[id] = { exports: {} });
    if (def.external) {
      module.exports = def.external();
    } else {
      def.factory.call(module.exports, module, module.exports, function (specifier) {
        var target = def.deps[specifier];
        if (target === undefined) throw new Error("Cannot find module \"" + specifier + "\" from " + id);
        return load(target);
      });
    }
    return module.exports;
  }
  function getter(target, name, get) {
    Object.defineProperty(target, name, { enumerable: true, get: get });
  }
  return {
    define: function (id, deps, factory) {
      if (!defs[id]) defs[id] = { deps: deps, factory: factory };
    },
    external: function (id, get) {
      if (!defs[id]) defs[id] = { external: get };
    },
    load: load,
    esm: function (exports, getters) {
      Object.defineProperty(exports, "__esModule", { value: true });
      for (var name in getters) getter(exports, name, getters[name]);
    },
    reexport: function (exports, source) {
      Object.keys(source).forEach(function (name) {
        if (name !== "default" && !Object.prototype.hasOwnProperty.call(exports, name)) {
          getter(exports, name, function () { return source[name]; });
        }
      });
    },
    ns: function (source) {
      var out = {};
      Object.defineProperty(out, "__esModule", { value: true });
      Object.keys(source).forEach(function (name) {
        getter(out, name, function () { return source[name]; });
      });
      return out;
    },
    interop: function (m) {
      if (m && m.__esModule) return m;
      var out = { default: m };
      if (m && typeof m === "object") {
        for (var name in m) if (name !== "default") out[name] = m[name];
      }
      return out;
    }
  };
})()"#;

fn runtime(format: Format) -> String {
  match format {
    Format::Esm => format!("var __ridge = globalThis.__ridge || (globalThis.__ridge = {RUNTIME_BODY});\n"),
    Format::Cjs => format!("var __ridge = {RUNTIME_BODY};\n"),
  }
}

/// First 8 hex digits of the SHA-256 of `bytes`, uppercase.
pub fn content_hash(bytes: &[u8]) -> String {
  hex::encode_upper(&Sha256::digest(bytes)[..4])
}

/// Write through a temporary file in the destination directory so readers
/// never observe a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CompileError> {
  let dir = path.parent().unwrap_or(Path::new("."));
  std::fs::create_dir_all(dir).map_err(|e| CompileError::write(dir, e))?;
  let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CompileError::write(path, e))?;
  tmp.write_all(contents).map_err(|e| CompileError::write(path, e))?;
  tmp.persist(path).map_err(|e| CompileError::write(path, e.error))?;
  Ok(())
}

fn quote(s: &str) -> String {
  serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

fn is_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  chars.next().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
    && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn member(object: &str, name: &str) -> String {
  if is_identifier(name) { format!("{object}.{name}") } else { format!("{object}[{}]", quote(name)) }
}

fn newlines_of(text: &str) -> String {
  text.chars().filter(|&c| c == '\n').collect()
}

type Define = (Vec<String>, String);

fn parse_defines(define: &[(String, String)]) -> Vec<Define> {
  define.iter().map(|(key, value)| (key.split('.').map(str::to_string).collect(), value.clone())).collect()
}

/// Turn an ES module into registry-compatible CommonJS: imports become
/// `require` calls bound to snapshots, exports become live getters on
/// `exports`. Line structure is preserved.
fn lower_script(source: &str, scan: &ModuleScan, defines: &[Define]) -> String {
  let mut edits: Vec<(Range<usize>, String)> = Vec::new();
  let mut getters: Vec<(String, String)> = Vec::new();
  let mut temp = 0usize;
  let mut next_temp = |prefix: &str| {
    let name = format!("__ridge_{prefix}{temp}");
    temp += 1;
    name
  };

  for stmt in &scan.statements {
    let span = stmt.start..stmt.end;
    let original = &source[span.clone()];
    match &stmt.kind {
      StatementKind::Import { source: from, bindings } => {
        let require = format!("require({})", quote(from));
        let text = if bindings.is_empty() {
          format!("{require};")
        } else {
          let tmp = next_temp("i");
          let mut parts = vec![format!("{tmp} = __ridge.interop({require})")];
          for binding in bindings {
            let value = match &binding.imported {
              ImportedName::Default => member(&tmp, "default"),
              ImportedName::Namespace => tmp.clone(),
              ImportedName::Named(name) => member(&tmp, name),
            };
            parts.push(format!("{} = {value}", binding.local));
          }
          format!("var {};", parts.join(", "))
        };
        edits.push((span, text + &newlines_of(original)));
      }
      StatementKind::ExportFrom { source: from, items } => {
        let tmp = next_temp("r");
        for (imported, exported) in items {
          let value = match imported {
            ImportedName::Default => member(&tmp, "default"),
            ImportedName::Namespace => tmp.clone(),
            ImportedName::Named(name) => member(&tmp, name),
          };
          getters.push((exported.clone(), value));
        }
        let text = format!("var {tmp} = __ridge.interop(require({}));", quote(from));
        edits.push((span, text + &newlines_of(original)));
      }
      StatementKind::ExportStar { source: from } => {
        let text = format!("__ridge.reexport(exports, require({}));", quote(from));
        edits.push((span, text + &newlines_of(original)));
      }
      StatementKind::ExportList { items } => {
        getters.extend(items.iter().map(|(local, exported)| (exported.clone(), local.clone())));
        edits.push((span, newlines_of(original)));
      }
      StatementKind::ExportDecl { names, decl_start } => {
        getters.extend(names.iter().map(|n| (n.clone(), n.clone())));
        edits.push((stmt.start..*decl_start, String::new()));
      }
      StatementKind::ExportDefaultDecl { name, decl_start, name_at } => {
        edits.push((stmt.start..*decl_start, String::new()));
        let local = match name {
          Some(name) => name.clone(),
          None => {
            edits.push((*name_at..*name_at, " __ridge_default".to_string()));
            "__ridge_default".to_string()
          }
        };
        getters.push(("default".to_string(), local));
      }
      StatementKind::ExportDefaultExpr { expr_start } => {
        edits.push((stmt.start..*expr_start, "var __ridge_default = ".to_string()));
        getters.push(("default".to_string(), "__ridge_default".to_string()));
      }
      StatementKind::TypeOnly => edits.push((span, newlines_of(original))),
      StatementKind::Decl { .. } | StatementKind::Other => {}
    }
  }

  for call in &scan.calls {
    if call.kind == CallKind::DynamicImport {
      let text = format!(
        "Promise.resolve().then(function () {{ return __ridge.interop(require({})); }})",
        quote(&call.specifier)
      );
      edits.push((call.span.clone(), text));
    }
  }
  edits.extend(define_edits(source, scan, defines));

  edits.sort_by(|a, b| a.0.start.cmp(&b.0.start).then(b.0.end.cmp(&a.0.end)));
  let mut out = String::with_capacity(source.len() + 256);
  if scan.is_esm() {
    let list: Vec<String> =
      getters.iter().map(|(name, local)| format!("{}: function () {{ return {local}; }}", quote(name))).collect();
    out.push_str(&format!("__ridge.esm(exports, {{ {} }});\n", list.join(", ")));
  }
  let mut cursor = 0;
  for (range, text) in edits {
    if range.start < cursor {
      continue;
    }
    out.push_str(&source[cursor..range.start]);
    out.push_str(&text);
    cursor = range.end;
  }
  out.push_str(&source[cursor..]);
  out
}

/// Replace dotted global references such as `process.env.NODE_ENV`. A match
/// preceded by `.` is a property access and is left alone.
fn define_edits(source: &str, scan: &ModuleScan, defines: &[Define]) -> Vec<(Range<usize>, String)> {
  let tokens = &scan.tokens;
  let text = |i: usize| &source[tokens[i].start..tokens[i].end];
  let mut edits = Vec::new();
  for (parts, value) in defines {
    let len = parts.len() * 2 - 1;
    for i in 0..tokens.len() {
      if i + len > tokens.len() || tokens[i].kind != TokenKind::Ident || text(i) != parts[0] {
        continue;
      }
      if i > 0 && matches!(text(i - 1), "." | "?.") {
        continue;
      }
      let matched = parts.iter().enumerate().skip(1).all(|(k, part)| {
        text(i + 2 * k - 1) == "." && tokens[i + 2 * k].kind == TokenKind::Ident && text(i + 2 * k) == part
      });
      if matched {
        edits.push((tokens[i].start..tokens[i + len - 1].end, value.clone()));
      }
    }
  }
  edits
}

/// The `__ridge.define(...)` statement for a module, or `None` for externals.
fn define_statement(module: &Module, graph: &Graph, defines: &[Define]) -> Option<String> {
  let body = match &module.body {
    ModuleBody::Script { source, scan } => lower_script(source, scan, defines),
    ModuleBody::Json(json) => format!("module.exports = {json};"),
    ModuleBody::Text(text) => format!("module.exports = {};", quote(text)),
    ModuleBody::Asset { url, .. } => format!("module.exports = {};", quote(url)),
    ModuleBody::Empty => String::new(),
    ModuleBody::External(_) => return None,
  };
  let deps: Vec<String> = module
    .deps
    .iter()
    .map(|d| format!("{}: {}", quote(&d.specifier), quote(&graph.modules[d.target].id)))
    .collect();
  Some(format!(
    "__ridge.define({}, {{ {} }}, function (module, exports, require) {{\n{}\n}});\n",
    quote(&module.id),
    deps.join(", "),
    body.trim_end()
  ))
}

struct Chunk {
  imports: String,
  body: String,
  externals: Vec<String>,
  inputs: BTreeMap<String, MetafileOutputInput>,
}

fn render_chunk(members: &[usize], graph: &Graph, defined: &[Option<String>], format: Format) -> Chunk {
  let mut members = members.to_vec();
  members.sort_by(|a, b| graph.modules[*a].id.cmp(&graph.modules[*b].id));

  let externals: BTreeSet<usize> = members
    .iter()
    .flat_map(|&m| graph.modules[m].deps.iter().map(|d| d.target))
    .filter(|&t| graph.modules[t].is_external())
    .collect();

  let mut imports = String::new();
  let mut body = runtime(format);
  let mut external_specs = Vec::new();
  for (k, &ext) in externals.iter().enumerate() {
    let module = &graph.modules[ext];
    let ModuleBody::External(spec) = &module.body else { continue };
    let get = match format {
      Format::Esm => {
        imports.push_str(&format!("import * as __ridge_ext{k} from {};\n", quote(spec)));
        format!("__ridge.ns(__ridge_ext{k})")
      }
      Format::Cjs => format!("require({})", quote(spec)),
    };
    body.push_str(&format!("__ridge.external({}, function () {{ return {get}; }});\n", quote(&module.id)));
    external_specs.push(spec.clone());
  }

  let mut inputs = BTreeMap::new();
  for &m in &members {
    if let Some(text) = &defined[m] {
      body.push_str(text);
      inputs.insert(graph.modules[m].id.clone(), MetafileOutputInput { bytes_in_output: text.len() });
    }
  }
  Chunk { imports, body, externals: external_specs, inputs }
}

fn entry_tail(entry: &Module, format: Format) -> String {
  let load = format!("__ridge.load({})", quote(&entry.id));
  match format {
    Format::Cjs => format!("module.exports = {load};\n"),
    Format::Esm => {
      let mut out = format!("var __ridge_entry = {load};\n");
      for name in entry.export_names() {
        if name == "default" {
          out.push_str("export default __ridge_entry.default;\n");
        } else if is_identifier(&name) {
          out.push_str(&format!("export var {name} = __ridge_entry.{name};\n"));
        }
      }
      out
    }
  }
}

/// `[dir]/[name]` of an entry relative to `outbase`.
fn entry_stem(entry: &Module, options: &BuildOptions) -> String {
  let file = Path::new(entry.path.strip_suffix(BROWSER_VIEW_SUFFIX).unwrap_or(&entry.path));
  let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("stdin");
  match file.strip_prefix(&options.outbase).ok().and_then(Path::parent) {
    Some(dir) if !dir.as_os_str().is_empty() => format!("{}/{stem}", dir.to_string_lossy().replace('\\', "/")),
    _ => stem.to_string(),
  }
}

fn relative_import(from_file: &str, to_file: &str) -> String {
  let depth = from_file.matches('/').count();
  if depth == 0 { format!("./{to_file}") } else { format!("{}{to_file}", "../".repeat(depth)) }
}

/// Split the graph into chunks, render them and describe the result.
pub(crate) fn assemble(graph: &Graph, options: &BuildOptions) -> BuildResult {
  let defines = parse_defines(&options.define);
  let defined: Vec<Option<String>> =
    graph.modules.iter().map(|m| define_statement(m, graph, &defines)).collect();
  let output_key = |file: &str| {
    let path = options.outdir.join(file);
    path.strip_prefix(&options.root_dir).unwrap_or(&path).to_string_lossy().replace('\\', "/")
  };

  let mut reach: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); graph.modules.len()];
  for (e, &entry) in graph.entries.iter().enumerate() {
    let mut stack = vec![entry];
    while let Some(m) = stack.pop() {
      if graph.modules[m].is_external() || !reach[m].insert(e) {
        continue;
      }
      stack.extend(graph.modules[m].deps.iter().map(|d| d.target));
    }
  }

  let mut entry_members: Vec<Vec<usize>> = vec![Vec::new(); graph.entries.len()];
  let mut shared: BTreeMap<Vec<usize>, Vec<usize>> = BTreeMap::new();
  for (m, set) in reach.iter().enumerate() {
    if set.len() > 1 && options.splitting {
      shared.entry(set.iter().copied().collect()).or_default().push(m);
    } else {
      for &e in set {
        entry_members[e].push(m);
      }
    }
  }

  let mut metafile = Metafile::default();
  for module in graph.modules.iter().filter(|m| !m.is_external()) {
    let imports = module
      .deps
      .iter()
      .map(|d| {
        let target = &graph.modules[d.target];
        MetafileImport {
          path: match &target.body {
            ModuleBody::External(spec) => spec.clone(),
            _ => target.id.clone(),
          },
          kind: d.kind.as_str().to_string(),
          external: target.is_external(),
        }
      })
      .collect();
    metafile.inputs.insert(module.id.clone(), MetafileInput { bytes: module.input_bytes, imports });
  }

  let mut outputs: Vec<OutputFile> = Vec::new();
  for module in &graph.modules {
    if let ModuleBody::Asset { file, bytes, .. } = &module.body {
      let path = options.outdir.join(file);
      if outputs.iter().any(|o| o.path == path) {
        continue;
      }
      let mut inputs = BTreeMap::new();
      inputs.insert(module.id.clone(), MetafileOutputInput { bytes_in_output: bytes.len() });
      metafile.outputs.insert(
        output_key(file),
        MetafileOutput { bytes: bytes.len(), inputs, ..MetafileOutput::default() },
      );
      outputs.push(OutputFile { path, contents: bytes.clone() });
    }
  }

  let external_imports = |specs: &[String]| -> Vec<MetafileImport> {
    specs
      .iter()
      .map(|s| MetafileImport { path: s.clone(), kind: "import-statement".into(), external: true })
      .collect()
  };

  let mut shared_files: Vec<(&Vec<usize>, String)> = Vec::new();
  for (set, members) in &shared {
    let chunk = render_chunk(members, graph, &defined, options.format);
    let contents = format!("{}{}", chunk.imports, chunk.body);
    let file = format!("_shared/chunk-{}.js", content_hash(contents.as_bytes()));
    metafile.outputs.insert(
      output_key(&file),
      MetafileOutput {
        bytes: contents.len(),
        imports: external_imports(&chunk.externals),
        inputs: chunk.inputs,
        ..MetafileOutput::default()
      },
    );
    outputs.push(OutputFile { path: options.outdir.join(&file), contents: contents.into_bytes() });
    shared_files.push((set, file));
  }

  let single = graph.entries.len() == 1;
  for (e, &entry_idx) in graph.entries.iter().enumerate() {
    let entry = &graph.modules[entry_idx];
    let stem = entry_stem(entry, options);
    let chunk = render_chunk(&entry_members[e], graph, &defined, options.format);
    let used: Vec<&String> = shared_files.iter().filter(|(set, _)| set.contains(&e)).map(|(_, f)| f).collect();

    let mut contents = String::new();
    for file in &used {
      contents.push_str(&format!("import {};\n", quote(&relative_import(&stem, file))));
    }
    contents.push_str(&chunk.imports);
    contents.push_str(&chunk.body);
    contents.push_str(&entry_tail(entry, options.format));

    let file = match &options.outfile {
      Some(name) if single => name.clone(),
      _ => format!("{stem}-{}.js", content_hash(contents.as_bytes())),
    };
    let mut imports: Vec<MetafileImport> = used
      .iter()
      .map(|f| MetafileImport { path: output_key(f), kind: "import-statement".into(), external: false })
      .collect();
    imports.extend(external_imports(&chunk.externals));
    metafile.outputs.insert(
      output_key(&file),
      MetafileOutput {
        bytes: contents.len(),
        imports,
        exports: entry.export_names(),
        entry_point: Some(entry.id.clone()),
        inputs: chunk.inputs,
      },
    );
    outputs.push(OutputFile { path: options.outdir.join(&file), contents: contents.into_bytes() });
  }

  BuildResult { outputs, metafile }
}
