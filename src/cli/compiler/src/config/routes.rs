/* src/cli/compiler/src/config/routes.rs */

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use ridge_server::RouteDef;
use walkdir::WalkDir;

use crate::error::CompileError;

pub const ROUTE_MODULE_EXTENSIONS: [&str; 6] = ["js", "jsx", "ts", "tsx", "md", "mdx"];

/// `<dir>/<basename>.<ext>` for the first extension that exists, relative to `dir`.
pub(crate) fn find_module(dir: &Path, basename: &str, extensions: &[&str]) -> Option<String> {
  extensions
    .iter()
    .map(|ext| format!("{basename}.{ext}"))
    .find(|file| dir.join(file).is_file())
}

/// Routes defined by the `app/root.*` + `app/routes/**` file convention, root
/// first, then route ids in sorted order.
pub(crate) fn discover_routes(app_dir: &Path, ignored: &[Regex]) -> Result<Vec<RouteDef>, CompileError> {
  let root_file = find_module(app_dir, "root", &ROUTE_MODULE_EXTENSIONS).ok_or_else(|| {
    CompileError::Config(format!("missing \"root\" route file in {}", app_dir.display()))
  })?;
  let mut routes = vec![RouteDef {
    id: "root".to_string(),
    parent_id: None,
    path: Some(String::new()),
    index: false,
    case_sensitive: false,
    file: root_file,
  }];

  let routes_dir = app_dir.join("routes");
  if !routes_dir.is_dir() {
    return Ok(routes);
  }

  // route id -> file relative to the app directory
  let mut files: HashMap<String, String> = HashMap::new();
  for entry in WalkDir::new(&routes_dir).sort_by_file_name() {
    let entry = entry.map_err(|e| {
      CompileError::io(format!("failed to walk {}", routes_dir.display()), e.into())
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let path = entry.path();
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
    if !ROUTE_MODULE_EXTENSIONS.contains(&ext) {
      continue;
    }
    let Ok(rel) = path.strip_prefix(&routes_dir) else { continue };
    let rel = rel.to_string_lossy().replace('\\', "/");
    if ignored.iter().any(|re| re.is_match(&rel)) {
      continue;
    }
    let stem = &rel[..rel.len() - ext.len() - 1];
    let id = format!("routes/{stem}");
    let file = format!("routes/{rel}");
    if let Some(existing) = files.get(&id) {
      return Err(CompileError::Config(format!(
        "route \"{id}\" is defined by both {existing} and {file}"
      )));
    }
    files.insert(id, file);
  }

  let mut ids: Vec<&String> = files.keys().collect();
  ids.sort();

  // "<full path>?index" -> route id, for conflict detection
  let mut unique: HashMap<String, &str> = HashMap::new();
  for &id in &ids {
    let parent_id = find_parent_id(&ids, id);
    let is_index = id.ends_with("/index");
    let full_path = create_route_path(&id["routes/".len()..]);
    let suffix = if is_index { "?index" } else { "" };
    let unique_key = format!("{}{suffix}", full_path.as_deref().unwrap_or(""));
    if !unique_key.is_empty() {
      if let Some(other) = unique.get(&unique_key) {
        return Err(CompileError::Config(format!(
          "path \"{}\" defined by route \"{id}\" conflicts with route \"{other}\"",
          full_path.as_deref().unwrap_or("")
        )));
      }
      unique.insert(unique_key, id.as_str());
    }
    if is_index && ids.iter().any(|other| find_parent_id(&ids, other) == Some(id.as_str())) {
      return Err(CompileError::Config(format!(
        "child routes are not allowed in index routes; remove the children of \"{id}\""
      )));
    }

    let relative = match parent_id {
      Some(parent) => &id[parent.len() + 1..],
      None => &id["routes/".len()..],
    };
    routes.push(RouteDef {
      id: id.clone(),
      parent_id: Some(parent_id.unwrap_or("root").to_string()),
      path: create_route_path(relative),
      index: is_index,
      case_sensitive: false,
      file: files[id].clone(),
    });
  }
  Ok(routes)
}

/// Longest other route id that `id` nests under.
fn find_parent_id<'a>(ids: &[&'a String], id: &str) -> Option<&'a str> {
  ids
    .iter()
    .filter(|candidate| {
      id.strip_prefix(candidate.as_str()).is_some_and(|rest| rest.starts_with('/'))
    })
    .max_by_key(|candidate| candidate.len())
    .map(|candidate| candidate.as_str())
}

/// URL pattern for a route file name relative to its parent. `None` for
/// pathless layouts and index routes.
pub fn create_route_path(partial_id: &str) -> Option<String> {
  let chars: Vec<char> = partial_id.chars().collect();
  let mut result = String::new();
  let mut raw_segment = String::new();
  let mut escape_depth = 0usize;
  let mut skip_segment = false;

  for (i, &c) in chars.iter().enumerate() {
    let prev = if i > 0 { Some(chars[i - 1]) } else { None };
    let next = chars.get(i + 1).copied();

    if skip_segment {
      if c == '/' || c == '.' {
        skip_segment = false;
      }
      continue;
    }
    if escape_depth == 0 && c == '[' && prev != Some('[') {
      escape_depth += 1;
      continue;
    }
    if escape_depth > 0 && c == ']' && next != Some(']') {
      escape_depth -= 1;
      continue;
    }
    if escape_depth > 0 {
      result.push(c);
      continue;
    }
    if c == '/' || c == '.' {
      if raw_segment == "index" && result.ends_with("index") {
        strip_index(&mut result);
      } else {
        result.push('/');
      }
      raw_segment.clear();
      continue;
    }
    if c == '_' && next == Some('_') && raw_segment.is_empty() {
      skip_segment = true;
      continue;
    }
    raw_segment.push(c);
    if c == '$' {
      result.push(if next.is_none() { '*' } else { ':' });
      continue;
    }
    result.push(c);
  }

  if raw_segment == "index" && result.ends_with("index") {
    strip_index(&mut result);
  }
  if result.is_empty() { None } else { Some(result) }
}

fn strip_index(result: &mut String) {
  result.truncate(result.len() - "index".len());
  if result.ends_with('/') {
    result.pop();
  }
}
