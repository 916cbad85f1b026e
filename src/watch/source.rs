//! Change-event sources.
//!
//! The OS watcher is an external primitive: it only has to produce
//! [`SourceEvent`]s on a channel. [`NotifySource`] wraps `notify`;
//! [`ChannelSource`] is an in-process source that callers drive by hand.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{DiscoveryError, Result};

const STREAM_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
}

impl ChangeNotification {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Change(ChangeNotification),
    /// Notifications were dropped (e.g. an OS queue overflow); only a full
    /// rescan brings the endpoints back in line
    Rescan,
    /// The source broke; the stream should be reopened
    Failed(String),
}

/// An open subscription. Dropping it stops the underlying watcher.
pub struct ChangeStream {
    receiver: mpsc::Receiver<SourceEvent>,
    _guard: Option<Box<dyn Any + Send>>,
}

impl ChangeStream {
    pub fn new(receiver: mpsc::Receiver<SourceEvent>) -> Self {
        Self {
            receiver,
            _guard: None,
        }
    }

    pub fn with_guard(receiver: mpsc::Receiver<SourceEvent>, guard: impl Any + Send) -> Self {
        Self {
            receiver,
            _guard: Some(Box::new(guard)),
        }
    }

    /// `None` once the source has gone away.
    pub async fn next(&mut self) -> Option<SourceEvent> {
        self.receiver.recv().await
    }
}

pub trait ChangeSource: Send + Sync {
    fn open(&self, root: &Path) -> Result<ChangeStream>;
}

/// Recursive OS watcher backed by `notify`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifySource;

impl ChangeSource for NotifySource {
    fn open(&self, root: &Path) -> Result<ChangeStream> {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let events = match res {
                Ok(event) => translate(event),
                Err(e) => vec![SourceEvent::Failed(e.to_string())],
            };
            for event in events {
                // Receiver gone means the session ended
                if tx.blocking_send(event).is_err() {
                    return;
                }
            }
        })
        .map_err(|e| DiscoveryError::Watch(e.to_string()))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| DiscoveryError::Watch(e.to_string()))?;

        Ok(ChangeStream::with_guard(rx, watcher))
    }
}

fn translate(event: Event) -> Vec<SourceEvent> {
    if event.need_rescan() {
        return vec![SourceEvent::Rescan];
    }
    let change = |path: &PathBuf, kind| SourceEvent::Change(ChangeNotification::new(path.clone(), kind));
    match event.kind {
        EventKind::Create(_) => event.paths.iter().map(|p| change(p, ChangeKind::Created)).collect(),
        EventKind::Remove(_) => event.paths.iter().map(|p| change(p, ChangeKind::Deleted)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().map(|p| change(p, ChangeKind::Deleted)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(|p| change(p, ChangeKind::Created)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::new();
            if let Some(from) = event.paths.first() {
                out.push(change(from, ChangeKind::Deleted));
            }
            if let Some(to) = event.paths.get(1) {
                out.push(change(to, ChangeKind::Created));
            }
            out
        }
        // Data, metadata and undirected renames: the disk decides
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Deleted
                };
                change(p, kind)
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Default)]
struct ChannelState {
    streams: Vec<(PathBuf, mpsc::Sender<SourceEvent>)>,
    failing_opens: u32,
    opens: u32,
}

/// In-process change source. Clones share state, so a caller can keep one
/// handle to inject events while the engine owns another.
#[derive(Clone, Default)]
pub struct ChannelSource {
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live stream covering `path`, most recently opened first.
    fn sender_for(&self, path: &Path) -> Option<mpsc::Sender<SourceEvent>> {
        let mut state = self.state();
        state.streams.retain(|(_, tx)| !tx.is_closed());
        state
            .streams
            .iter()
            .rev()
            .find(|(root, _)| path.starts_with(root))
            .map(|(_, tx)| tx.clone())
    }

    /// Delivers a change to the stream watching `path`. Returns false when
    /// nothing is watching it.
    pub async fn emit(&self, path: impl Into<PathBuf>, kind: ChangeKind) -> bool {
        let path = path.into();
        let Some(tx) = self.sender_for(&path) else {
            return false;
        };
        tx.send(SourceEvent::Change(ChangeNotification::new(path, kind)))
            .await
            .is_ok()
    }

    /// Tells the stream watching `root` that events were lost.
    pub async fn request_rescan(&self, root: &Path) -> bool {
        let Some(tx) = self.sender_for(root) else {
            return false;
        };
        tx.send(SourceEvent::Rescan).await.is_ok()
    }

    /// Breaks the stream watching `root`.
    pub async fn fail(&self, root: &Path, reason: &str) -> bool {
        let Some(tx) = self.sender_for(root) else {
            return false;
        };
        tx.send(SourceEvent::Failed(reason.to_string())).await.is_ok()
    }

    /// The next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.state().failing_opens = count;
    }

    pub fn open_count(&self) -> u32 {
        self.state().opens
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        self.sender_for(root).is_some()
    }
}

impl ChangeSource for ChannelSource {
    fn open(&self, root: &Path) -> Result<ChangeStream> {
        let mut state = self.state();
        state.opens += 1;
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(DiscoveryError::Watch(format!(
                "source unavailable for {}",
                root.display()
            )));
        }
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        state.streams.push((root.to_path_buf(), tx));
        Ok(ChangeStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn kinds(events: Vec<SourceEvent>) -> Vec<(PathBuf, ChangeKind)> {
        events
            .into_iter()
            .filter_map(|e| match e {
                SourceEvent::Change(c) => Some((c.path, c.kind)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_translate_notify_events() {
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path("/p/a.js".into());
        assert_eq!(kinds(translate(created)), vec![("/p/a.js".into(), ChangeKind::Created)]);

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path("/p/b.js".into());
        assert_eq!(kinds(translate(removed)), vec![("/p/b.js".into(), ChangeKind::Deleted)]);

        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/p/old.js".into())
            .add_path("/p/new.js".into());
        assert_eq!(
            kinds(translate(renamed)),
            vec![
                ("/p/old.js".into(), ChangeKind::Deleted),
                ("/p/new.js".into(), ChangeKind::Created),
            ]
        );

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path("/p/a.js".into());
        assert!(translate(access).is_empty());
    }

    #[test]
    fn test_overflow_flag_requests_rescan() {
        let overflow = Event::new(EventKind::Other).set_flag(notify::event::Flag::Rescan);
        assert_eq!(translate(overflow), vec![SourceEvent::Rescan]);

        let flagged_modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path("/p/a.js".into())
            .set_flag(notify::event::Flag::Rescan);
        assert_eq!(translate(flagged_modify), vec![SourceEvent::Rescan]);

        assert!(translate(Event::new(EventKind::Other)).is_empty());
    }

    #[test]
    fn test_modify_of_missing_file_is_delete() {
        let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/definitely/not/here.js".into());
        assert_eq!(
            kinds(translate(modified)),
            vec![("/definitely/not/here.js".into(), ChangeKind::Deleted)]
        );
    }

    #[tokio::test]
    async fn test_channel_source_routes_by_root() {
        let source = ChannelSource::new();
        let mut a = source.open(Path::new("/work/a")).unwrap();
        let _b = source.open(Path::new("/work/b")).unwrap();

        assert!(source.emit("/work/a/app.js", ChangeKind::Modified).await);
        assert!(!source.emit("/elsewhere/x.js", ChangeKind::Modified).await);

        match a.next().await {
            Some(SourceEvent::Change(c)) => {
                assert_eq!(c.path, PathBuf::from("/work/a/app.js"));
                assert_eq!(c.kind, ChangeKind::Modified);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(source.open_count(), 2);
    }

    #[tokio::test]
    async fn test_channel_source_failures() {
        let source = ChannelSource::new();
        source.fail_next_opens(1);
        assert!(source.open(Path::new("/r")).is_err());

        let mut stream = source.open(Path::new("/r")).unwrap();
        assert!(source.is_watching(Path::new("/r")));
        assert!(source.fail(Path::new("/r"), "disk gone").await);
        assert_eq!(stream.next().await, Some(SourceEvent::Failed("disk gone".into())));
        assert!(source.request_rescan(Path::new("/r")).await);
        assert_eq!(stream.next().await, Some(SourceEvent::Rescan));

        drop(stream);
        assert!(!source.is_watching(Path::new("/r")));
    }
}
