/* src/cli/core/src/ui.rs */

// Terminal output of the ridge commands. Status lines are tagged `[ridge]` so
// they stay recognizable when app logs share the terminal.

#![allow(clippy::print_stdout)]

use std::path::Path;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Working,
  Done,
  Warning,
  Failed,
}

impl Status {
  fn color(self) -> &'static str {
    match self {
      Self::Working => CYAN,
      Self::Done => GREEN,
      Self::Warning => YELLOW,
      Self::Failed => RED,
    }
  }
}

fn status_line(status: Status, msg: &str) -> String {
  format!("{}[ridge]{RESET} {msg}", status.color())
}

pub fn status(status: Status, msg: &str) {
  println!("{}", status_line(status, msg));
}

/// Printed once when a command starts.
pub fn heading(command: &str) {
  println!();
  println!("{BOLD}ridge {command}{RESET} {DIM}v{VERSION}{RESET}");
  println!();
}

/// Closing line of a command, set off by a blank line.
pub fn summary(msg: &str) {
  println!();
  status(Status::Done, msg);
}

fn output_line(path: &str, bytes: usize) -> String {
  format!("  {path:<48} {DIM}{:>9}{RESET}", human_size(bytes))
}

/// One file a build wrote.
pub fn output_file(path: &str, bytes: usize) {
  println!("{}", output_line(path, bytes));
}

/// A change the watcher picked up; `kind` is `+`, `~` or `-`.
pub fn file_event(kind: char, path: &Path) {
  println!("  {DIM}{kind} {}{RESET}", path.display());
}

/// Secondary information, dimmed.
pub fn note(msg: &str) {
  println!("  {DIM}{msg}{RESET}");
}

/// Machine-readable output, printed untouched.
pub fn plain(text: &str) {
  println!("{text}");
}

/// Binary units, matching what file managers show for build artifacts.
pub fn human_size(bytes: usize) -> String {
  const KIB: f64 = 1024.0;
  let n = bytes as f64;
  if n >= KIB * KIB {
    format!("{:.2} MiB", n / (KIB * KIB))
  } else if n >= KIB {
    format!("{:.2} KiB", n / KIB)
  } else {
    format!("{bytes} B")
  }
}
