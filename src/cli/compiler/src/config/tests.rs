/* src/cli/compiler/src/config/tests.rs */

use std::fs;
use std::path::Path;

use super::*;

fn touch(root: &Path, rel: &str) {
  let path = root.join(rel);
  fs::create_dir_all(path.parent().unwrap()).unwrap();
  fs::write(path, "export default function Page() {}\n").unwrap();
}

fn project(files: &[&str]) -> tempfile::TempDir {
  let dir = tempfile::tempdir().unwrap();
  for file in ["app/root.jsx", "app/entry.client.jsx", "app/entry.server.jsx"].iter().chain(files) {
    touch(dir.path(), file);
  }
  dir
}

fn route<'a>(config: &'a AppConfig, id: &str) -> &'a ridge_server::RouteDef {
  config.route(id).unwrap_or_else(|| panic!("no route {id}"))
}

#[test]
fn route_paths_follow_file_convention() {
  assert_eq!(create_route_path("index"), None);
  assert_eq!(create_route_path("about"), Some("about".into()));
  assert_eq!(create_route_path("$slug"), Some(":slug".into()));
  assert_eq!(create_route_path("$"), Some("*".into()));
  assert_eq!(create_route_path("blog.$slug"), Some("blog/:slug".into()));
  assert_eq!(create_route_path("users/index"), Some("users".into()));
  assert_eq!(create_route_path("__auth"), None);
  assert_eq!(create_route_path("__auth/login"), Some("login".into()));
  assert_eq!(create_route_path("sitemap[.]xml"), Some("sitemap.xml".into()));
}

#[test]
fn discovers_nested_routes_with_parents() {
  let dir = project(&[
    "app/routes/index.jsx",
    "app/routes/parent.jsx",
    "app/routes/parent/child.tsx",
    "app/routes/parent/index.jsx",
    "app/routes/__auth.jsx",
    "app/routes/__auth/login.jsx",
    "app/routes/files/$.jsx",
  ]);
  let config = read_config(dir.path()).unwrap();

  assert_eq!(config.routes[0].id, "root");
  assert_eq!(config.routes[0].path.as_deref(), Some(""));
  assert_eq!(config.entry_client_file, "entry.client.jsx");

  let child = route(&config, "routes/parent/child");
  assert_eq!(child.parent_id.as_deref(), Some("routes/parent"));
  assert_eq!(child.path.as_deref(), Some("child"));
  assert_eq!(child.file, "routes/parent/child.tsx");

  let idx = route(&config, "routes/parent/index");
  assert!(idx.index);
  assert_eq!(idx.path, None);

  let layout = route(&config, "routes/__auth");
  assert_eq!(layout.path, None);
  let login = route(&config, "routes/__auth/login");
  assert_eq!(login.parent_id.as_deref(), Some("routes/__auth"));
  assert_eq!(login.path.as_deref(), Some("login"));

  let splat = route(&config, "routes/files/$");
  assert_eq!(splat.parent_id.as_deref(), Some("root"));
  assert_eq!(splat.path.as_deref(), Some("files/*"));

  assert!(route(&config, "routes/index").index);
}

#[test]
fn declaration_order_is_sorted() {
  let dir = project(&["app/routes/zeta.jsx", "app/routes/alpha.jsx", "app/routes/mid.jsx"]);
  let config = read_config(dir.path()).unwrap();
  let ids: Vec<&str> = config.routes.iter().map(|r| r.id.as_str()).collect();
  assert_eq!(ids, ["root", "routes/alpha", "routes/mid", "routes/zeta"]);
}

#[test]
fn ignored_globs_and_manual_routes() {
  let dir = project(&["app/routes/keep.jsx", "app/routes/.hidden.jsx", "app/routes/keep.test.jsx", "app/custom.jsx"]);
  fs::write(
    dir.path().join("ridge.toml"),
    r#"
[app]
ignored_route_files = ["**/.*", "**/*.test.*"]
server_dependencies_to_bundle = ["exact-pkg", "/^@scope\\//"]
server_build_target = "cloudflare-workers"

[[routes]]
id = "custom"
parent_id = "root"
path = "custom"
file = "custom.jsx"
"#,
  )
  .unwrap();
  let config = read_config(dir.path()).unwrap();
  let ids: Vec<&str> = config.routes.iter().map(|r| r.id.as_str()).collect();
  assert_eq!(ids, ["root", "routes/keep", "custom"]);
  assert_eq!(config.server_build_target, ServerBuildTarget::CloudflareWorkers);
  assert!(config.server_build_target.is_single_file());
  assert!(config.should_bundle_server_dependency("exact-pkg"));
  assert!(config.should_bundle_server_dependency("@scope/thing"));
  assert!(!config.should_bundle_server_dependency("exact-pkg/sub"));
}

#[test]
fn defaults_apply_without_config_file() {
  let dir = project(&[]);
  let config = read_config(dir.path()).unwrap();
  let root = dir.path().canonicalize().unwrap();
  assert_eq!(config.assets_build_directory, root.join("public/build"));
  assert_eq!(config.server_build_directory, root.join("build"));
  assert_eq!(config.public_path, "/build/");
  assert_eq!(config.server_build_target, ServerBuildTarget::NodeCjs);
  assert_eq!(config.dev_server_port, 8002);
}

#[test]
fn dependencies_come_from_package_json() {
  let dir = project(&[]);
  fs::write(
    dir.path().join("package.json"),
    r#"{"dependencies": {"react": "^18"}, "devDependencies": {"typescript": "^5"}}"#,
  )
  .unwrap();
  let config = read_config(dir.path()).unwrap();
  assert!(config.dependencies.contains("react"));
  assert!(config.dependencies.contains("typescript"));
}

#[test]
fn conflicting_paths_are_rejected() {
  let dir = project(&["app/routes/about.jsx", "app/routes/about/index.jsx", "app/routes/about/index/deep.jsx"]);
  let err = read_config(dir.path()).err().unwrap();
  assert!(err.to_string().contains("not allowed in index routes"));

  let dir = project(&["app/routes/a.b.jsx", "app/routes/a/b.jsx"]);
  let err = read_config(dir.path()).err().unwrap();
  assert!(err.to_string().contains("conflicts with"));
}

#[test]
fn missing_entry_is_a_config_error() {
  let dir = tempfile::tempdir().unwrap();
  touch(dir.path(), "app/root.jsx");
  touch(dir.path(), "app/entry.server.jsx");
  let err = read_config(dir.path()).err().unwrap();
  assert!(err.to_string().contains("entry.client"));
}

#[test]
fn entry_points_include_routes_and_entries() {
  let dir = project(&["app/routes/about.jsx"]);
  let config = read_config(dir.path()).unwrap();
  assert!(config.is_entry_point(&config.app_directory.join("routes/about.jsx")));
  assert!(config.is_entry_point(&config.app_directory.join("entry.client.jsx")));
  assert!(!config.is_entry_point(&config.app_directory.join("components/button.jsx")));
}

#[test]
fn find_config_walks_upward() {
  let dir = project(&[]);
  fs::write(dir.path().join(CONFIG_FILE), "").unwrap();
  let nested = dir.path().join("app/routes");
  fs::create_dir_all(&nested).unwrap();
  assert_eq!(find_config(&nested).unwrap(), dir.path().canonicalize().unwrap());
}
