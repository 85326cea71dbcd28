use std::collections::HashSet;
use std::time::{Duration, Instant};

use sift_core::{
    ChainRecord, CleanupReport, ContentProvider, DerivedId, DerivedStore, Event, MaterializeOptions,
    NoticeLevel, ProviderError, ReadOutcome, SourceChange, SourceEvent, SourceId, SourceLoader,
};
use sift_search::{Chain, Query, QueryKind};
use sift_settings::Preferences;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::highlights::{Highlight, HighlightState};
use crate::scheduler::PersistScheduler;
use crate::snapshot::{SessionSnapshot, SnapshotError, SnapshotStore};
use crate::tree::{Forest, NodeId, TreeError, TreeNode};

/// 工作階段錯誤。 / Errors surfaced by [`Session`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no derived document named {0}")]
    UnknownDocument(DerivedId),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("session has no snapshot store")]
    NoSnapshotStore,
}

/// Runtime knobs taken from [`Preferences`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub materialize: MaterializeOptions,
    pub palette: Vec<String>,
    pub cleanup_interval: Duration,
    pub persist_delay: Duration,
}

impl SessionConfig {
    pub fn from_preferences(preferences: &Preferences) -> Self {
        Self {
            materialize: MaterializeOptions {
                detailed_header: preferences.filter.detailed_header,
                max_results: preferences.filter.max_results,
            },
            palette: preferences.highlight.palette.clone(),
            cleanup_interval: preferences.session.cleanup_interval(),
            persist_delay: preferences.session.persist_delay(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_preferences(&Preferences::default())
    }
}

/// Where a new filter step starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The raw source file; the new chain has one step.
    Source(SourceId),
    /// An existing derived document; its chain is extended.
    Document(DerivedId),
}

impl Origin {
    /// Treats `sift:///` strings as derived documents and anything else as a source.
    pub fn parse(raw: &str) -> Self {
        if DerivedId::is_derived(raw) {
            Origin::Document(DerivedId::from_raw(raw))
        } else {
            Origin::Source(SourceId::new(raw))
        }
    }
}

/// 單一工作階段狀態。 / The single owned session state.
///
/// Owns the derived-document store (through the content provider), the
/// forest, highlight state and the debounced persistence schedule. Every
/// mutation of records, content or tree marks the session dirty; the host
/// calls [`Session::tick`] to flush once the debounce window has passed.
pub struct Session<L> {
    provider: ContentProvider<L>,
    forest: Forest,
    highlights: HighlightState,
    scheduler: PersistScheduler,
    snapshots: Option<SnapshotStore>,
    palette: Vec<String>,
    cleanup_interval: Duration,
    last_cleanup: Instant,
}

impl<L: SourceLoader> Session<L> {
    pub fn new(loader: L, config: SessionConfig) -> Self {
        Self {
            provider: ContentProvider::new(loader, config.materialize),
            forest: Forest::new(),
            highlights: HighlightState::new(),
            scheduler: PersistScheduler::new(config.persist_delay),
            snapshots: None,
            palette: config.palette,
            cleanup_interval: config.cleanup_interval,
            last_cleanup: Instant::now(),
        }
    }

    pub fn with_snapshot_store(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn snapshot_store(&self) -> Option<&SnapshotStore> {
        self.snapshots.as_ref()
    }

    pub fn store(&self) -> &DerivedStore {
        self.provider.store()
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn highlights(&self) -> &HighlightState {
        &self.highlights
    }

    pub fn loader_mut(&mut self) -> &mut L {
        self.provider.loader_mut()
    }

    pub fn is_dirty(&self) -> bool {
        self.scheduler.is_dirty()
    }

    /// 執行篩選鏈並回傳新文件的識別。 / Runs `query` on top of `origin` and returns the document identity.
    ///
    /// Running a chain that already exists refreshes its content in place. A
    /// different chain that truncates to the same identity replaces the
    /// earlier record.
    pub fn run_chain(&mut self, origin: &Origin, query: Query) -> Result<DerivedId, SessionError> {
        let mut query = query;
        query.normalize();

        let (base, source) = match origin {
            Origin::Source(source) => (Chain::new(), source.clone()),
            Origin::Document(parent) => {
                let record = self
                    .provider
                    .store()
                    .record(parent)
                    .ok_or_else(|| SessionError::UnknownDocument(parent.clone()))?;
                (record.chain.clone(), record.source_identity.clone())
            }
        };
        let record = ChainRecord::new(base.extended(query), source);
        let id = DerivedId::for_chain(&record.source_identity, &record.chain);

        let previous = self.provider.store().record(&id).cloned();
        let refresh = previous.as_ref() == Some(&record);
        if previous.is_some() && !refresh {
            warn!(%id, "derived identity collision, replacing earlier chain");
        }

        // Placement is settled before the store changes; a failed create leaves the tree alone.
        let parent = match origin {
            Origin::Document(parent) if self.forest.node_for(parent).is_some() => {
                Some(parent.clone())
            }
            _ => None,
        };
        let place = !refresh || self.forest.node_for(&id).is_none();

        let outcome = self.provider.create(id.clone(), record.clone())?;
        info!(
            %id,
            steps = record.chain.len(),
            matched = outcome.matched(),
            refresh,
            "chain run"
        );

        if place {
            let placed = match &parent {
                Some(parent) => self.forest.add_sub_chain(parent, id.clone(), &record),
                None => self.forest.add_root_chain(id.clone(), &record),
            };
            if let Err(err) = placed {
                warn!(%id, %err, "derived document stored without a tree node");
            }
            self.provider.events_mut().push(Event::TreeChanged);
        }
        self.touch();
        Ok(id)
    }

    /// Two-phase read; see [`ContentProvider::read`].
    pub fn read(&mut self, id: &DerivedId) -> ReadOutcome {
        self.provider.read(id)
    }

    /// Completes every read that answered [`ReadOutcome::Loading`].
    pub fn process_pending(&mut self) -> usize {
        let done = self.provider.process_pending();
        if done > 0 {
            self.touch();
        }
        done
    }

    pub fn read_now(&mut self, id: &DerivedId) -> Option<String> {
        let cached = self.provider.store().has_content(id);
        let text = self.provider.read_now(id);
        if !cached && text.is_some() {
            self.touch();
        }
        text
    }

    pub fn write(&mut self, id: &DerivedId, bytes: &[u8]) -> Result<(), SessionError> {
        self.provider.write(id, bytes)?;
        self.touch();
        Ok(())
    }

    /// Deletes one document. Its children move up to its parent.
    pub fn delete(&mut self, id: &DerivedId) -> bool {
        let existed = self.provider.delete(id);
        if self.forest.splice_out(id).is_some() {
            self.provider.events_mut().push(Event::TreeChanged);
        }
        if existed {
            self.touch();
        }
        existed
    }

    pub fn roots(&self) -> Vec<&TreeNode> {
        self.forest.roots()
    }

    pub fn children(&self, parent: NodeId) -> Result<Vec<&TreeNode>, SessionError> {
        Ok(self.forest.children(parent)?)
    }

    /// 關閉節點並刪除整個子樹。 / Closes a node and garbage-collects its whole subtree.
    pub fn close_node(&mut self, node: NodeId) -> Result<Vec<DerivedId>, SessionError> {
        let removed = self.forest.remove_node(node)?;
        for id in &removed {
            self.provider.delete(id);
        }
        info!(%node, removed = removed.len(), "node closed");
        self.provider.events_mut().push(Event::TreeChanged);
        self.touch();
        Ok(removed)
    }

    /// The host closed the editor for `id`: drop its content, keep record and node.
    pub fn document_closed(&mut self, id: &DerivedId) -> bool {
        let evicted = self.provider.evict(id);
        if evicted {
            debug!(%id, "content evicted");
            self.touch();
        }
        evicted
    }

    pub fn cleanup(&mut self, open: &HashSet<DerivedId>) -> CleanupReport {
        self.run_cleanup(Instant::now(), open)
    }

    /// Runs [`Session::cleanup`] when the cleanup interval has elapsed since the last pass.
    pub fn maybe_cleanup(
        &mut self,
        now: Instant,
        open: &HashSet<DerivedId>,
    ) -> Option<CleanupReport> {
        if now.saturating_duration_since(self.last_cleanup) < self.cleanup_interval {
            return None;
        }
        Some(self.run_cleanup(now, open))
    }

    fn run_cleanup(&mut self, now: Instant, open: &HashSet<DerivedId>) -> CleanupReport {
        let report = self.provider.cleanup(open);
        self.last_cleanup = now;
        if report != CleanupReport::default() {
            self.touch();
        }
        report
    }

    /// Sources that currently have a root, for the host to watch.
    pub fn watched_sources(&self) -> Vec<SourceId> {
        self.forest
            .roots()
            .into_iter()
            .map(|root| root.source.clone())
            .collect()
    }

    /// 來源變更時使其衍生內容失效。 / Invalidates derived content after a source changed on disk.
    pub fn apply_source_event(&mut self, event: &SourceEvent) -> Vec<DerivedId> {
        match &event.kind {
            SourceChange::Modified => {}
            SourceChange::Removed => self.provider.events_mut().notify(
                NoticeLevel::Warning,
                format!("source {} was removed", event.source),
            ),
            SourceChange::Renamed { to } => self.provider.events_mut().notify(
                NoticeLevel::Warning,
                format!("source {} was renamed to {}", event.source, to.display()),
            ),
        }
        let invalidated = self.provider.invalidate_source(&event.source);
        if !invalidated.is_empty() {
            debug!(source = %event.source, count = invalidated.len(), "derived content invalidated");
            self.touch();
        }
        invalidated
    }

    /// Toggles a persistent highlight; returns the entry when one was added.
    pub fn toggle_highlight(
        &mut self,
        pattern: &str,
        kind: QueryKind,
        case_sensitive: bool,
    ) -> Option<Highlight> {
        let added = self
            .highlights
            .toggle(pattern, kind, case_sensitive, &self.palette)
            .cloned();
        self.touch();
        added
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.provider.events_mut().drain()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let store = self.provider.store();
        SessionSnapshot {
            chain_data: store
                .records()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect(),
            contents_data: store
                .contents()
                .map(|(id, text)| (id.clone(), text.to_string()))
                .collect(),
            persistent_highlights: self.highlights.clone(),
        }
    }

    /// 由快照還原並重建森林。 / Replaces all state with `snapshot` and rebuilds the forest.
    ///
    /// Records are kept even when their source no longer exists; reading them
    /// later reports the source as unavailable. Content without a record is dropped.
    /// Regex steps of hand-edited snapshots get the dot-all flag back.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> usize {
        let store = self.provider.store_mut();
        store.clear();
        for (id, mut record) in snapshot.chain_data {
            record.chain.normalize();
            store.insert_record(id, record);
        }
        for (id, text) in snapshot.contents_data {
            if store.has_record(&id) {
                store.set_content(id, text);
            } else {
                debug!(%id, "content without record dropped");
            }
        }
        self.highlights = snapshot.persistent_highlights;

        self.forest.rebuild(self.provider.store().records());
        self.provider.events_mut().push(Event::TreeChanged);
        self.scheduler.mark_clean();

        let restored = self.provider.store().record_count();
        info!(
            records = restored,
            roots = self.forest.roots().len(),
            "session restored"
        );
        restored
    }

    /// Loads the snapshot store. Returns `false` when nothing was saved yet.
    pub fn load(&mut self) -> Result<bool, SessionError> {
        let loaded = self
            .snapshots
            .as_ref()
            .ok_or(SessionError::NoSnapshotStore)?
            .load()?;
        match loaded {
            Some(snapshot) => {
                self.restore(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes the snapshot now, whether or not anything changed.
    pub fn save(&mut self) -> Result<(), SessionError> {
        let store = self.snapshots.as_ref().ok_or(SessionError::NoSnapshotStore)?;
        store.save(&self.snapshot())?;
        info!(path = %store.path().display(), "session saved");
        self.scheduler.mark_clean();
        Ok(())
    }

    /// Writes the snapshot if there are unsaved changes.
    pub fn flush(&mut self) -> Result<bool, SessionError> {
        if !self.scheduler.is_dirty() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Debounced flush: writes only once the persistence delay has passed since the last change.
    pub fn tick(&mut self, now: Instant) -> Result<bool, SessionError> {
        if !self.scheduler.due(now) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Deadline of the pending write, if any.
    pub fn next_flush(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    fn touch(&mut self) {
        self.scheduler.mark_dirty(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::MemorySources;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const SOURCE: &str = "file:///logs/app.log";

    fn config() -> SessionConfig {
        SessionConfig {
            materialize: MaterializeOptions {
                detailed_header: false,
                max_results: 0,
            },
            palette: vec!["gold".into(), "teal".into()],
            cleanup_interval: Duration::from_secs(60),
            persist_delay: Duration::from_millis(200),
        }
    }

    fn session_with(text: &str) -> Session<MemorySources> {
        let mut sources = MemorySources::new();
        sources.insert(SourceId::new(SOURCE), text);
        Session::new(sources, config())
    }

    fn source() -> Origin {
        Origin::Source(SourceId::new(SOURCE))
    }

    #[test]
    fn origin_parse_distinguishes_documents() {
        assert_eq!(
            Origin::parse("sift:///[app] : T[x].log"),
            Origin::Document(DerivedId::from_raw("sift:///[app] : T[x].log"))
        );
        assert_eq!(Origin::parse("/tmp/app.log"), Origin::Source(SourceId::new("/tmp/app.log")));
    }

    #[test]
    fn run_chain_builds_nested_documents() {
        let mut session = session_with("GET /a 200\nPOST /a 500\nGET /b 500\n");
        let first = session.run_chain(&source(), Query::text("500")).unwrap();
        let second = session
            .run_chain(&Origin::Document(first.clone()), Query::text("get"))
            .unwrap();

        assert_eq!(session.read_now(&first).as_deref(), Some("POST /a 500\nGET /b 500\n"));
        assert_eq!(session.read_now(&second).as_deref(), Some("GET /b 500\n"));
        assert_eq!(session.store().record(&second).unwrap().chain.len(), 2);

        let root = session.roots()[0].id;
        let top = session.children(root).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].identity, Some(first));
        let nested = session.children(top[0].id).unwrap();
        assert_eq!(nested[0].identity, Some(second));
        assert!(session.is_dirty());
    }

    #[test]
    fn regex_steps_are_normalised_before_storing() {
        let mut session = session_with("a\n");
        let id = session.run_chain(&source(), Query::regex("a")).unwrap();
        let record = session.store().record(&id).unwrap();
        assert_eq!(record.chain.queries()[0].flags.as_deref(), Some("s"));
    }

    #[test]
    fn rerunning_a_chain_refreshes_without_new_node() {
        let mut session = session_with("x1\n");
        let id = session.run_chain(&source(), Query::text("x")).unwrap();
        session.loader_mut().insert(SourceId::new(SOURCE), "x1\nx2\n");
        session.drain_events();

        let again = session.run_chain(&source(), Query::text("x")).unwrap();
        assert_eq!(again, id);
        assert_eq!(session.forest().len(), 2);
        assert_eq!(session.read_now(&id).as_deref(), Some("x1\nx2\n"));
        assert!(!session.drain_events().contains(&Event::TreeChanged));
    }

    #[test]
    fn extending_a_truncated_identity_takes_over_the_node() {
        let mut session = session_with("alphabetagamma zz\nalphabetagamma\n");
        let mut id = session
            .run_chain(&source(), Query::text("alphabetagamma"))
            .unwrap();
        for _ in 0..2 {
            id = session
                .run_chain(&Origin::Document(id.clone()), Query::text("alphabetagamma"))
                .unwrap();
        }
        assert!(id.as_str().ends_with("....log"));
        let nodes_before = session.forest().len();

        let extended = session
            .run_chain(&Origin::Document(id.clone()), Query::text("zz"))
            .unwrap();
        assert_eq!(extended, id);
        let record = session.store().record(&id).unwrap();
        let node = session.forest().node_for(&id).unwrap();
        assert_eq!(record.chain.len(), 4);
        assert_eq!(node.chain, record.chain);
        assert_eq!(node.label, "T \"zz\"");
        assert_eq!(session.forest().len(), nodes_before);
        assert_eq!(
            session.read_now(&id).as_deref(),
            Some("alphabetagamma zz\n")
        );
    }

    #[test]
    fn invalid_chain_creates_nothing() {
        let mut session = session_with("a\n");
        let err = session.run_chain(&source(), Query::regex("(")).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Provider(ProviderError::InvalidChain(ref errors)) if errors[0].step == 1
        ));
        assert!(session.forest().is_empty());
        assert_eq!(session.store().record_count(), 0);
        assert!(session.drain_events().iter().any(|event| matches!(
            event,
            Event::Notice(notice) if notice.level == NoticeLevel::Error
        )));
    }

    #[test]
    fn unknown_origin_document_is_rejected() {
        let mut session = session_with("a\n");
        let ghost = DerivedId::from_raw("sift:///[app] : T[ghost].log");
        assert!(matches!(
            session.run_chain(&Origin::Document(ghost), Query::text("a")),
            Err(SessionError::UnknownDocument(_))
        ));
    }

    #[test]
    fn close_node_removes_subtree_from_store() {
        let mut session = session_with("ab\nabc\nb\n");
        let a = session.run_chain(&source(), Query::text("a")).unwrap();
        let ab = session
            .run_chain(&Origin::Document(a.clone()), Query::text("b"))
            .unwrap();
        let abc = session
            .run_chain(&Origin::Document(ab.clone()), Query::text("c"))
            .unwrap();
        let node = session.forest().node_for(&a).unwrap().id;

        let removed = session.close_node(node).unwrap();
        assert_eq!(removed, vec![a.clone(), ab.clone(), abc.clone()]);
        for id in [&a, &ab, &abc] {
            assert!(!session.store().has_record(id));
            assert!(!session.store().has_content(id));
        }
        assert!(!session.roots()[0].expandable);
    }

    #[test]
    fn delete_lifts_children() {
        let mut session = session_with("ab\n");
        let a = session.run_chain(&source(), Query::text("a")).unwrap();
        let ab = session
            .run_chain(&Origin::Document(a.clone()), Query::text("b"))
            .unwrap();
        assert!(session.delete(&a));
        let root = session.roots()[0].id;
        let top = session.children(root).unwrap();
        assert_eq!(top[0].identity, Some(ab));
        assert!(!session.delete(&a));
    }

    #[test]
    fn document_closed_evicts_and_read_regenerates() {
        let mut session = session_with("one\ntwo\n");
        let id = session.run_chain(&source(), Query::text("o")).unwrap();
        assert!(session.document_closed(&id));
        session.drain_events();

        assert_eq!(session.read(&id), ReadOutcome::Loading);
        assert_eq!(session.process_pending(), 1);
        assert_eq!(session.drain_events(), vec![Event::ContentChanged(id.clone())]);
        assert_eq!(session.read(&id), ReadOutcome::Ready("one\ntwo\n".into()));
    }

    #[test]
    fn source_events_invalidate_derived_content() {
        let mut session = session_with("e1\n");
        let id = session.run_chain(&source(), Query::text("e")).unwrap();
        session.loader_mut().insert(SourceId::new(SOURCE), "e1\ne2\n");

        let invalidated = session.apply_source_event(&SourceEvent {
            source: SourceId::new(SOURCE),
            kind: SourceChange::Modified,
        });
        assert_eq!(invalidated, vec![id.clone()]);
        assert_eq!(session.read_now(&id).as_deref(), Some("e1\ne2\n"));

        session.drain_events();
        session.apply_source_event(&SourceEvent {
            source: SourceId::new(SOURCE),
            kind: SourceChange::Renamed {
                to: PathBuf::from("/logs/app.old"),
            },
        });
        assert!(session.drain_events().iter().any(|event| matches!(
            event,
            Event::Notice(notice) if notice.level == NoticeLevel::Warning
        )));
        assert_eq!(session.watched_sources(), vec![SourceId::new(SOURCE)]);
    }

    #[test]
    fn maybe_cleanup_waits_for_interval() {
        let mut session = session_with("a\nb\n");
        let id = session.run_chain(&source(), Query::text("a")).unwrap();
        let open = HashSet::new();
        let start = Instant::now();

        assert!(session.maybe_cleanup(start, &open).is_none());
        let report = session
            .maybe_cleanup(start + Duration::from_secs(61), &open)
            .unwrap();
        assert_eq!(report.evicted, 1);
        assert!(session.store().has_record(&id));
        assert!(session
            .maybe_cleanup(start + Duration::from_secs(62), &open)
            .is_none());
    }

    #[test]
    fn highlights_cycle_palette() {
        let mut session = session_with("");
        let first = session.toggle_highlight("error", QueryKind::Text, false).unwrap();
        let second = session.toggle_highlight("warn", QueryKind::Text, false).unwrap();
        assert_eq!((first.color.as_str(), second.color.as_str()), ("gold", "teal"));
        assert!(session.toggle_highlight("error", QueryKind::Text, false).is_none());
        assert_eq!(session.highlights().len(), 1);
    }

    #[test]
    fn tick_flushes_after_debounce_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut session = session_with("a\n").with_snapshot_store(SnapshotStore::new(&path));
        session.run_chain(&source(), Query::text("a")).unwrap();

        let deadline = session.next_flush().unwrap();
        assert!(!session.tick(deadline - Duration::from_millis(100)).unwrap());
        assert!(!path.exists());
        assert!(session.tick(deadline).unwrap());
        assert!(path.exists());
        assert!(!session.tick(deadline + Duration::from_secs(5)).unwrap());
        assert!(!session.flush().unwrap());
    }

    #[test]
    fn persistence_requires_a_store() {
        let mut session = session_with("a\n");
        assert!(matches!(session.save(), Err(SessionError::NoSnapshotStore)));
        assert!(matches!(session.load(), Err(SessionError::NoSnapshotStore)));
    }

    #[test]
    fn restore_normalises_regex_steps() {
        let source = SourceId::new(SOURCE);
        let chain: Chain = vec![Query::regex("a.b")].into();
        let id = DerivedId::for_chain(&source, &chain);
        let snapshot = SessionSnapshot {
            chain_data: vec![(id.clone(), ChainRecord::new(chain, source))],
            ..SessionSnapshot::default()
        };

        let mut session = session_with("a\nb\n");
        session.restore(snapshot);
        let record = session.store().record(&id).unwrap();
        assert_eq!(record.chain.queries()[0].flags.as_deref(), Some("s"));
    }

    #[test]
    fn restore_drops_orphan_content_and_rebuilds() {
        let mut session = session_with("a\nab\n");
        let a = session.run_chain(&source(), Query::text("a")).unwrap();
        let ab = session
            .run_chain(&Origin::Document(a.clone()), Query::text("b"))
            .unwrap();
        let mut snapshot = session.snapshot();
        snapshot
            .contents_data
            .push((DerivedId::from_raw("sift:///[gone] : T[x].log"), "x".into()));

        let mut fresh = session_with("a\nab\n");
        assert_eq!(fresh.restore(snapshot), 2);
        assert_eq!(fresh.store().content_count(), 2);
        assert_eq!(fresh.forest().shape(), session.forest().shape());
        assert_eq!(
            fresh.forest().node_for(&ab).unwrap().parent,
            Some(fresh.forest().node_for(&a).unwrap().id)
        );
        assert!(!fresh.is_dirty());
    }
}
