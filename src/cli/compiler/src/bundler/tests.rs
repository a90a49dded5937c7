/* src/cli/compiler/src/bundler/tests.rs */

use std::fs;

use regex::Regex;

use super::*;

fn write(root: &Path, rel: &str, contents: &str) {
  let path = root.join(rel);
  fs::create_dir_all(path.parent().unwrap()).unwrap();
  fs::write(path, contents).unwrap();
}

fn browser_options(root: &Path, entries: &[&str]) -> BuildOptions {
  let mut options = BuildOptions::new(root, root.join("public/build"));
  options.outbase = root.join("app");
  options.public_path = "/build/".into();
  options.splitting = true;
  options.entry_points = entries.iter().map(|e| root.join(e).to_string_lossy().into_owned()).collect();
  options
}

#[tokio::test]
async fn shared_modules_move_to_a_shared_chunk() {
  let tmp = tempfile::tempdir().unwrap();
  let root = tmp.path();
  write(root, "app/shared.js", "export const shared = 1;\n");
  write(root, "app/a.js", "import { shared } from \"./shared.js\";\nexport default function A() { return shared; }\n");
  write(root, "app/routes/b.js", "import { shared } from \"../shared\";\nexport const meta = () => shared;\n");

  let result = build(browser_options(root, &["app/a.js", "app/routes/b.js"])).await.unwrap();
  assert_eq!(result.outputs.len(), 3);

  let (a_key, a) = result.metafile.output_for_entry("app/a.js").unwrap();
  assert!(a_key.starts_with("public/build/a-") && a_key.ends_with(".js"));
  assert_eq!(a.exports, vec!["default".to_string()]);
  assert_eq!(a.imports.len(), 1);
  let shared_key = a.imports[0].path.clone();
  assert!(shared_key.starts_with("public/build/_shared/chunk-"));
  assert!(result.metafile.outputs[&shared_key].inputs.contains_key("app/shared.js"));

  let (b_key, b) = result.metafile.output_for_entry("app/routes/b.js").unwrap();
  assert!(b_key.starts_with("public/build/routes/b-"));
  assert_eq!(b.imports[0].path, shared_key);

  let b_file = result.output(&root.join(b_key)).unwrap().text().into_owned();
  assert!(b_file.starts_with("import \"../_shared/chunk-"));
  assert!(b_file.contains("export var meta = __ridge_entry.meta;"));
  assert!(!b_file.contains("export const shared"));
  assert!(root.join(&shared_key).is_file());
}

#[tokio::test]
async fn rebuilds_are_deterministic() {
  let tmp = tempfile::tempdir().unwrap();
  let root = tmp.path();
  write(root, "app/a.js", "export default 1;\n");
  let ctx = BuildContext::new(browser_options(root, &["app/a.js"]));
  let first = ctx.rebuild().await.unwrap();
  let second = ctx.rebuild().await.unwrap();
  assert_eq!(first.outputs, second.outputs);
  assert_eq!(first.metafile, second.metafile);
}

#[tokio::test]
async fn unresolved_imports_fail_without_writing() {
  let tmp = tempfile::tempdir().unwrap();
  let root = tmp.path();
  write(root, "app/a.js", "// header\nimport missing from \"./missing\";\nexport default missing;\n");

  let err = build(browser_options(root, &["app/a.js"])).await.unwrap_err();
  let CompileError::Build(failure) = err else { panic!("expected a build failure, got {err:?}") };
  assert_eq!(failure.diagnostics.len(), 1);
  let diagnostic = &failure.diagnostics[0];
  assert_eq!(diagnostic.text, "Could not resolve \"./missing\"");
  let location = diagnostic.location.as_ref().unwrap();
  assert_eq!(location.file, Path::new("app/a.js"));
  assert_eq!((location.line, location.column), (2, 0));
  assert!(!root.join("public/build").exists());
}

#[tokio::test]
async fn syntax_errors_carry_their_location() {
  let tmp = tempfile::tempdir().unwrap();
  let root = tmp.path();
  write(root, "app/a.js", "export default \"unterminated;\n");
  let err = build(browser_options(root, &["app/a.js"])).await.unwrap_err();
  let CompileError::Build(failure) = err else { panic!("expected a build failure") };
  assert_eq!(failure.diagnostics[0].text, "Unterminated string literal");
  assert_eq!(failure.diagnostics[0].location.as_ref().unwrap().line, 1);
}

#[tokio::test]
async fn disposed_contexts_refuse_to_build() {
  let tmp = tempfile::tempdir().unwrap();
  let root = tmp.path();
  write(root, "app/a.js", "export default 1;\n");
  let ctx = BuildContext::new(browser_options(root, &["app/a.js"]));
  ctx.rebuild().await.unwrap();
  ctx.dispose();
  assert!(ctx.is_disposed());
  assert!(matches!(ctx.rebuild().await, Err(CompileError::Disposed)));
}

#[tokio::test]
async fn first_answering_plugin_wins() {
  let tmp = tempfile::tempdir().unwrap();
  let root = tmp.path();
  write(root, "app/a.js", "import { value } from \"virtual:answer\";\nexport default value;\n");

  let mut options = browser_options(root, &["app/a.js"]);
  options.write = false;
  options.plugins = vec![
    Plugin::new("virtual")
      .on_resolve(Regex::new("^virtual:").unwrap(), |args: ResolveArgs| async move {
        Ok(Some(ResolveResult::in_namespace(args.path, "virtual")))
      })
      .on_load(Regex::new(".*").unwrap(), "virtual", |_args: LoadArgs| async move {
        Ok(Some(LoadResult {
          contents: "export const value = 42;\n".into(),
          loader: Some(LoaderKind::Js),
          resolve_dir: None,
        }))
      }),
    Plugin::new("never").on_resolve(Regex::new("^virtual:").unwrap(), |_args: ResolveArgs| async move {
      Err("consulted after an earlier plugin answered".to_string())
    }),
  ];

  let result = build(options).await.unwrap();
  let text = result.outputs[0].text().into_owned();
  assert!(text.contains("__ridge.define(\"virtual:virtual:answer\""));
  assert!(text.contains("const value = 42;"));
  assert!(!root.join("public/build").exists());
  assert!(result.metafile.inputs.contains_key("virtual:virtual:answer"));
}

#[tokio::test]
async fn commonjs_output_requires_externals() {
  let tmp = tempfile::tempdir().unwrap();
  let root = tmp.path();
  write(root, "app/server.js", "import fs from \"fs\";\nexport const read = () => fs.readFileSync;\n");

  let mut options = BuildOptions::new(root, root.join("build"));
  options.entry_points = vec![root.join("app/server.js").to_string_lossy().into_owned()];
  options.platform = Platform::Node;
  options.format = Format::Cjs;
  options.outfile = Some("index.js".into());

  let result = build(options).await.unwrap();
  let text = fs::read_to_string(root.join("build/index.js")).unwrap();
  assert!(text.contains("__ridge.external(\"external:fs\", function () { return require(\"fs\"); });"));
  assert!(text.ends_with("module.exports = __ridge.load(\"app/server.js\");\n"));
  let output = &result.metafile.outputs["build/index.js"];
  assert!(output.imports.iter().any(|i| i.path == "fs" && i.external));
}

#[tokio::test]
async fn json_text_and_asset_modules() {
  let tmp = tempfile::tempdir().unwrap();
  let root = tmp.path();
  write(root, "app/data.json", "{ \"name\": \"ridge\" }\n");
  write(root, "app/logo.svg", "<svg></svg>");
  write(
    root,
    "app/a.js",
    "import data from \"./data.json\";\nimport logo from \"./logo.svg\";\nexport default [data, logo];\n",
  );

  let result = build(browser_options(root, &["app/a.js"])).await.unwrap();
  let asset = result.outputs.iter().find(|o| o.path.to_string_lossy().contains("_assets/logo-")).unwrap();
  assert_eq!(asset.contents, b"<svg></svg>");
  let file = asset.path.strip_prefix(root.join("public/build")).unwrap().to_string_lossy().into_owned();

  let (_, entry) = result.metafile.output_for_entry("app/a.js").unwrap();
  assert!(entry.inputs.contains_key("app/data.json"));
  let text = result.outputs.iter().find(|o| o.text().contains("__ridge_entry")).unwrap().text().into_owned();
  assert!(text.contains("module.exports = { \"name\": \"ridge\" };"));
  assert!(text.contains(&format!("module.exports = \"/build/{file}\";")));
}

#[tokio::test]
async fn whitespace_modules_have_no_exports() {
  let tmp = tempfile::tempdir().unwrap();
  let root = tmp.path();
  write(root, "app/blank.jsx", "  \n\n");
  let result = build(browser_options(root, &["app/blank.jsx"])).await.unwrap();
  let (_, output) = result.metafile.output_for_entry("app/blank.jsx").unwrap();
  assert!(output.exports.is_empty());
  assert!(!result.outputs[0].text().contains("export default"));
}
