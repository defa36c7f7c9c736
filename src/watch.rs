//! Watch mode.
//!
//! Files are polled with [`notify::PollWatcher`]. Each watched file gets its
//! own debounce lane: a burst of writes collapses into one pass that starts
//! once the file has been quiet for `debounce_ms`. A lane never interrupts
//! its own running pass; writes that land during a pass schedule exactly
//! one more pass afterwards. Lanes for different files run independently.

use anyhow::{Context, Result};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::report::SyncEvent;
use crate::sync::Syncer;

/// Per-key trailing-edge debounce with serial execution per key.
pub struct Debouncer<F> {
    delay: Duration,
    handler: Arc<F>,
    lanes: HashMap<String, mpsc::UnboundedSender<()>>,
}

impl<F, Fut> Debouncer<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(delay: Duration, handler: F) -> Self {
        Self {
            delay,
            handler: Arc::new(handler),
            lanes: HashMap::new(),
        }
    }

    /// Record a change for `key`; the handler runs once `key` goes quiet.
    pub fn trigger(&mut self, key: &str) {
        if let Some(lane) = self.lanes.get(key) {
            if lane.send(()).is_ok() {
                return;
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(());
        tokio::spawn(run_lane(
            key.to_string(),
            self.delay,
            rx,
            Arc::clone(&self.handler),
        ));
        self.lanes.insert(key.to_string(), tx);
    }
}

async fn run_lane<F, Fut>(
    key: String,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<()>,
    handler: Arc<F>,
) where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    while rx.recv().await.is_some() {
        // quiet period: restart the clock on every new signal
        while let Ok(Some(())) = tokio::time::timeout(delay, rx.recv()).await {}
        handler(key.clone()).await;
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

fn lookup<'a>(watched: &'a HashMap<PathBuf, String>, path: &Path) -> Option<&'a String> {
    watched.get(path).or_else(|| {
        std::fs::canonicalize(path)
            .ok()
            .and_then(|canonical| watched.get(&canonical))
    })
}

/// Reprocess `files` whenever they change, until Ctrl-C.
pub async fn watch_files(syncer: Arc<Syncer>, files: &[String], config: &WatchConfig) -> Result<()> {
    if files.is_empty() {
        info!("no files to watch");
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let notify_config =
        notify::Config::default().with_poll_interval(Duration::from_millis(config.poll_interval_ms));
    let mut watcher = PollWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify_config,
    )
    .context("Failed to start file watcher")?;

    let mut watched: HashMap<PathBuf, String> = HashMap::new();
    for relative in files {
        let path = syncer.root().join(relative);
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        if let Ok(canonical) = std::fs::canonicalize(&path) {
            watched.insert(canonical, relative.clone());
        }
        watched.insert(path, relative.clone());
    }

    let lane_syncer = Arc::clone(&syncer);
    let mut debouncer = Debouncer::new(Duration::from_millis(config.debounce_ms), move |relative: String| {
        let syncer = Arc::clone(&lane_syncer);
        async move {
            syncer
                .reporter()
                .report(SyncEvent::FileChanged(relative.clone()));
            let summary = syncer.process_file(&relative).await;
            debug!(path = %relative, ?summary, "reprocessed");
        }
    });

    info!(count = files.len(), "Watching for changes...");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(Ok(event)) if is_change(&event.kind) => {
                    for path in &event.paths {
                        if let Some(relative) = lookup(&watched, path) {
                            debouncer.trigger(relative);
                        }
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(error = %e, "watch error"),
                None => break,
            },
            _ = &mut ctrl_c => {
                info!("stopping watch");
                break;
            }
        }
    }

    drop(watcher);
    Ok(())
}
