/* src/cli/compiler/src/watch.rs */

//! Watch orchestrator: turns file-system events into coalesced rebuild
//! cycles over one set of build handles at a time.
//!
//! Content changes rebuild with the existing handles. Adding or removing an
//! entry point disposes the handles and restarts from a freshly read config,
//! since entry points cannot be added to an existing build handle. At most
//! one cycle runs at a time; triggers arriving meanwhile collapse into a
//! single pending cycle.

use std::future::pending;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, warn};

use crate::build::{BuildOutcome, Builders};
use crate::config::{BuildMode, read_config};
use crate::error::CompileError;

/// What a pending cycle has to do. `Restart` subsumes `Rebuild`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trigger {
  Rebuild,
  Restart,
}

/// A pending-request slot plus a single in-flight guard.
#[derive(Debug, Default)]
pub struct CoalescingQueue {
  pending: Option<Trigger>,
  in_flight: bool,
}

impl CoalescingQueue {
  pub fn push(&mut self, trigger: Trigger) {
    self.pending = self.pending.max(Some(trigger));
  }

  /// Take the pending trigger unless a cycle is already running.
  pub fn start(&mut self) -> Option<Trigger> {
    if self.in_flight {
      return None;
    }
    let trigger = self.pending.take()?;
    self.in_flight = true;
    Some(trigger)
  }

  pub fn finish(&mut self) {
    self.in_flight = false;
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  pub fn is_in_flight(&self) -> bool {
    self.in_flight
  }
}

/// Watch callbacks. File callbacks fire when the event is detected, before
/// the cycle it triggers finishes.
pub trait WatchObserver: Send + Sync + 'static {
  fn rebuild_start(&self) {}
  fn rebuild_finish(&self, _result: &Result<BuildOutcome, CompileError>) {}
  fn file_created(&self, _path: &Path) {}
  fn file_changed(&self, _path: &Path) {}
  fn file_deleted(&self, _path: &Path) {}
}

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
  pub mode: BuildMode,
  /// Quiet period before a rebuild starts.
  pub debounce: Duration,
  /// Quiet period before a restart starts.
  pub restart_debounce: Duration,
}

impl Default for WatchOptions {
  fn default() -> Self {
    Self {
      mode: BuildMode::Development,
      debounce: Duration::from_millis(100),
      restart_debounce: Duration::from_millis(500),
    }
  }
}

impl WatchOptions {
  fn debounce_for(&self, trigger: Trigger) -> Duration {
    match trigger {
      Trigger::Rebuild => self.debounce,
      Trigger::Restart => self.restart_debounce,
    }
  }
}

enum Command {
  Rebuild,
  Close,
}

/// A running watch. Dropping it without `close` leaves the loop running
/// until the runtime shuts down.
pub struct WatchHandle {
  commands: mpsc::UnboundedSender<Command>,
  task: JoinHandle<()>,
  watcher: RecommendedWatcher,
}

impl WatchHandle {
  /// Queue a rebuild that skips the debounce window.
  pub fn rebuild(&self) -> Result<(), CompileError> {
    self.commands.send(Command::Rebuild).map_err(|_| CompileError::Disposed)
  }

  /// Stop watching and dispose the build handles. A cycle still running is
  /// abandoned; its handles are already disposed so it cannot write.
  pub async fn close(self) {
    drop(self.watcher);
    let _ = self.commands.send(Command::Close);
    if let Err(e) = self.task.await {
      error!("watch loop failed: {e}");
    }
  }
}

/// Watch the app directory of the project at `root`. The first cycle is the
/// initial build. Must be called from within a tokio runtime.
pub fn watch(root: &Path, options: WatchOptions, observer: Arc<dyn WatchObserver>) -> Result<WatchHandle, CompileError> {
  let config = Arc::new(read_config(root)?);
  let builders = Arc::new(Builders::new(Arc::clone(&config), options.mode)?);

  let (event_tx, event_rx) = mpsc::channel(256);
  let mut watcher = RecommendedWatcher::new(
    move |res: Result<notify::Event, notify::Error>| {
      let _ = event_tx.blocking_send(res);
    },
    notify::Config::default(),
  )?;
  watcher.watch(&config.app_directory, RecursiveMode::Recursive)?;
  debug!(dir = %config.app_directory.display(), "watching");

  let (commands, command_rx) = mpsc::unbounded_channel();
  let mut orchestrator = Orchestrator {
    root: config.root_directory.clone(),
    options,
    observer,
    builders,
    queue: CoalescingQueue::default(),
    deadline: Some(Instant::now()),
    in_flight: None,
  };
  orchestrator.queue.push(Trigger::Rebuild);
  let task = tokio::spawn(orchestrator.run(event_rx, command_rx));
  Ok(WatchHandle { commands, task, watcher })
}

struct Orchestrator {
  root: PathBuf,
  options: WatchOptions,
  observer: Arc<dyn WatchObserver>,
  builders: Arc<Builders>,
  queue: CoalescingQueue,
  deadline: Option<Instant>,
  in_flight: Option<JoinHandle<Arc<Builders>>>,
}

async fn join_in_flight(task: &mut Option<JoinHandle<Arc<Builders>>>) -> Result<Arc<Builders>, JoinError> {
  match task {
    Some(task) => task.await,
    None => pending().await,
  }
}

impl Orchestrator {
  async fn run(
    mut self,
    mut events: mpsc::Receiver<Result<notify::Event, notify::Error>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
  ) {
    loop {
      let deadline = self.deadline;
      let quiet = async move {
        match deadline {
          Some(at) => sleep_until(at).await,
          None => pending().await,
        }
      };
      tokio::select! {
        command = commands.recv() => match command {
          Some(Command::Rebuild) => {
            self.queue.push(Trigger::Rebuild);
            self.deadline = Some(Instant::now());
          }
          Some(Command::Close) | None => break,
        },
        Some(event) = events.recv() => match event {
          Ok(event) => self.on_event(&event),
          Err(e) => warn!("file watcher error: {e}"),
        },
        () = quiet => {
          self.deadline = None;
          self.start_next();
        }
        joined = join_in_flight(&mut self.in_flight) => {
          self.in_flight = None;
          self.queue.finish();
          match joined {
            Ok(builders) => self.builders = builders,
            Err(e) => error!("rebuild task failed: {e}"),
          }
          if self.deadline.is_none() {
            self.start_next();
          }
        }
      }
    }
    self.shutdown();
  }

  fn on_event(&mut self, event: &notify::Event) {
    for path in &event.paths {
      let trigger = match event.kind {
        EventKind::Create(_) => self.created(path),
        EventKind::Remove(_) => self.deleted(path),
        EventKind::Modify(ModifyKind::Name(_)) if path.exists() => self.created(path),
        EventKind::Modify(ModifyKind::Name(_)) => self.deleted(path),
        EventKind::Modify(_) => {
          self.observer.file_changed(path);
          Trigger::Rebuild
        }
        _ => continue,
      };
      self.schedule(trigger);
    }
  }

  /// A new file may turn into a route, so entry-point detection needs a fresh
  /// config rather than the one the current handles were built from.
  fn created(&self, path: &Path) -> Trigger {
    self.observer.file_created(path);
    match read_config(&self.root) {
      Ok(config) if config.is_entry_point(path) => Trigger::Restart,
      Ok(_) => Trigger::Rebuild,
      Err(e) => {
        warn!("failed to reload config: {e}");
        Trigger::Rebuild
      }
    }
  }

  fn deleted(&self, path: &Path) -> Trigger {
    self.observer.file_deleted(path);
    if self.builders.config().is_entry_point(path) { Trigger::Restart } else { Trigger::Rebuild }
  }

  fn schedule(&mut self, trigger: Trigger) {
    self.queue.push(trigger);
    self.deadline = Some(Instant::now() + self.options.debounce_for(trigger));
  }

  fn start_next(&mut self) {
    let Some(trigger) = self.queue.start() else {
      return;
    };
    debug!(?trigger, "rebuild cycle");
    let cycle = run_cycle(trigger, Arc::clone(&self.builders), self.root.clone(), self.options.mode, Arc::clone(&self.observer));
    self.in_flight = Some(tokio::spawn(cycle));
  }

  fn shutdown(self) {
    self.builders.dispose();
    if let Some(task) = self.in_flight {
      task.abort();
    }
    debug!("watch closed");
  }
}

/// One cycle against the handles it was started with. A restart swaps in
/// handles built from a freshly read config; if that config is invalid the
/// old handles stay in place.
async fn run_cycle(
  trigger: Trigger,
  builders: Arc<Builders>,
  root: PathBuf,
  mode: BuildMode,
  observer: Arc<dyn WatchObserver>,
) -> Arc<Builders> {
  observer.rebuild_start();
  let builders = match trigger {
    Trigger::Rebuild => builders,
    Trigger::Restart => match read_config(&root).and_then(|config| Builders::new(Arc::new(config), mode)) {
      Ok(fresh) => {
        builders.dispose();
        Arc::new(fresh)
      }
      Err(e) => {
        error!("restart failed: {e}");
        observer.rebuild_finish(&Err(e));
        return builders;
      }
    },
  };
  let result = builders.build().await;
  if let Err(e) = &result {
    error!("rebuild failed: {e}");
  }
  observer.rebuild_finish(&result);
  builders
}
