use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind, RemoveKind};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;

use crate::source::SourceId;

/// 監控來源檔案時可能回傳的錯誤。 / Error type for source watching.
#[derive(Debug, Error)]
pub enum SourceWatchError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("watch channel disconnected")]
    ChannelDisconnected,
}

/// 來源檔案變更的種類。 / Kind of change observed on a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceChange {
    Modified,
    Removed,
    Renamed { to: PathBuf },
}

/// 來源檔案變更事件。 / Change reported for one watched source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub source: SourceId,
    pub kind: SourceChange,
}

/// 封裝 `notify`，回報被篩選來源的變更。 / Wraps `notify` to report changes to filtered sources.
///
/// Derived documents of a changed source hold stale text; the session evicts it
/// so the next read re-runs the chain.
pub struct SourceWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<SourceEvent>,
}

impl SourceWatcher {
    /// 建立新的監視器。 / Creates a watcher with no watched sources.
    pub fn new() -> Result<Self, SourceWatchError> {
        let (tx, rx) = mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Ok(event) = res {
                    if let Some(mapped) = map_event(event) {
                        let _ = tx.send(mapped);
                    }
                }
            },
            Config::default(),
        )?;
        Ok(Self { watcher, rx })
    }

    /// 開始監看來源。 / Starts watching a source file.
    pub fn watch(&mut self, source: &SourceId) -> Result<(), SourceWatchError> {
        self.watcher
            .watch(&source.to_path(), RecursiveMode::NonRecursive)
            .map_err(SourceWatchError::from)
    }

    /// 停止監看來源。 / Stops watching a source file.
    pub fn unwatch(&mut self, source: &SourceId) -> Result<(), SourceWatchError> {
        self.watcher
            .unwatch(&source.to_path())
            .map_err(SourceWatchError::from)
    }

    /// 非阻塞取得下一個事件。 / Fetches the next event without blocking.
    pub fn try_next(&self) -> Option<SourceEvent> {
        self.rx.try_recv().ok()
    }

    /// 在期限內等待事件。 / Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<SourceEvent>, SourceWatchError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SourceWatchError::ChannelDisconnected),
        }
    }
}

fn map_event(event: notify::Event) -> Option<SourceEvent> {
    let primary = event.paths.first()?.clone();
    let kind = match event.kind {
        EventKind::Modify(ModifyKind::Name(_)) if event.paths.len() >= 2 => SourceChange::Renamed {
            to: event.paths[1].clone(),
        },
        EventKind::Modify(ModifyKind::Name(_)) => SourceChange::Removed,
        EventKind::Modify(_) | EventKind::Create(_) => SourceChange::Modified,
        EventKind::Remove(RemoveKind::File) | EventKind::Remove(RemoveKind::Any) => {
            SourceChange::Removed
        }
        _ => return None,
    };
    Some(SourceEvent {
        source: SourceId::from_path(primary),
        kind,
    })
}
