use std::collections::{BTreeSet, HashSet};

use sift_search::{
    evaluate_chain, render_header, replay_chain, Chain, ChainOutcome, ValidationError,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::events::{Event, EventQueue, NoticeLevel};
use crate::identity::DerivedId;
use crate::source::{split_lines, SourceId, SourceLoader};
use crate::store::{ChainRecord, DerivedStore};

/// Body returned by the first read of a document whose content is being regenerated.
pub const LOADING_PLACEHOLDER: &str = "Loading filtered results...\n";

/// 內容提供者的錯誤。 / Errors raised by the content provider.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no derived document named {0}")]
    NotFound(DerivedId),
    #[error("invalid filter chain: {}", join_errors(.0))]
    InvalidChain(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// How materialised text is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeOptions {
    pub detailed_header: bool,
    /// Maximum number of result lines written into the document; 0 keeps all.
    pub max_results: usize,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            detailed_header: true,
            max_results: 0,
        }
    }
}

/// Result of a read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Ready(String),
    /// Content is queued for regeneration; a `ContentChanged` event follows once it is ready.
    Loading,
    NotFound,
}

impl ReadOutcome {
    /// Text to hand to the host: the content, the placeholder, or nothing.
    pub fn body(&self) -> Option<&str> {
        match self {
            ReadOutcome::Ready(text) => Some(text),
            ReadOutcome::Loading => Some(LOADING_PLACEHOLDER),
            ReadOutcome::NotFound => None,
        }
    }
}

/// Counts from one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Content entries without a record.
    pub orphans: usize,
    /// Content of documents that are not open; their records stay.
    pub evicted: usize,
}

/// 將衍生文件以虛擬檔案形式提供給主機。 / Serves derived documents to the host as virtual files.
///
/// Reads hit the content map first and fall back to re-running the recorded
/// chain against the current source text. Regeneration is two-phase: the first
/// read answers [`ReadOutcome::Loading`] and queues the identity once, and
/// [`ContentProvider::process_pending`] materialises every queued document.
#[derive(Debug)]
pub struct ContentProvider<L> {
    loader: L,
    store: DerivedStore,
    pending: BTreeSet<DerivedId>,
    events: EventQueue,
    options: MaterializeOptions,
}

impl<L: SourceLoader> ContentProvider<L> {
    pub fn new(loader: L, options: MaterializeOptions) -> Self {
        Self {
            loader,
            store: DerivedStore::new(),
            pending: BTreeSet::new(),
            events: EventQueue::new(),
            options,
        }
    }

    pub fn store(&self) -> &DerivedStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DerivedStore {
        &mut self.store
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    pub fn options(&self) -> MaterializeOptions {
        self.options
    }

    pub fn is_pending(&self, id: &DerivedId) -> bool {
        self.pending.contains(id)
    }

    /// Splits the current text of `source` into lines; an unreadable source counts as empty.
    pub fn source_lines(&mut self, source: &SourceId) -> Vec<String> {
        match self.loader.load(source) {
            Ok(text) => split_lines(&text).into_iter().map(str::to_string).collect(),
            Err(err) => {
                self.events.notify(NoticeLevel::Error, err.to_string());
                Vec::new()
            }
        }
    }

    /// Validates and runs a new chain, then registers it under `id` with fresh content.
    ///
    /// Nothing is stored when validation fails.
    pub fn create(
        &mut self,
        id: DerivedId,
        record: ChainRecord,
    ) -> Result<ChainOutcome, ProviderError> {
        let lines = self.source_lines(&record.source_identity);
        let outcome = evaluate_chain(&lines, &record.chain);
        if outcome.is_aborted() {
            for error in &outcome.errors {
                self.events
                    .notify(NoticeLevel::Error, format!("invalid pattern at {error}"));
            }
            return Err(ProviderError::InvalidChain(outcome.errors));
        }
        if outcome.lines.is_empty() {
            self.events
                .notify(NoticeLevel::Info, format!("no lines matched for {id}"));
        }

        let text = self.render(&record.chain, &outcome);
        info!(%id, matched = outcome.matched(), "derived document created");
        self.pending.remove(&id);
        self.store.insert_record(id.clone(), record);
        self.store.set_content(id.clone(), text);
        self.events.push(Event::ContentChanged(id));
        Ok(outcome)
    }

    /// Answers a read from the content map, queueing regeneration on a miss.
    pub fn read(&mut self, id: &DerivedId) -> ReadOutcome {
        if !self.store.has_record(id) {
            return ReadOutcome::NotFound;
        }
        if let Some(text) = self.store.content(id) {
            return ReadOutcome::Ready(text.to_string());
        }
        if self.pending.insert(id.clone()) {
            debug!(%id, "content missing, regeneration queued");
        }
        ReadOutcome::Loading
    }

    /// Single-phase read: returns the content, regenerating it immediately when missing.
    pub fn read_now(&mut self, id: &DerivedId) -> Option<String> {
        if !self.store.has_record(id) {
            return None;
        }
        if let Some(text) = self.store.content(id) {
            return Some(text.to_string());
        }
        self.materialize(id).ok()?;
        self.store.content(id).map(str::to_string)
    }

    /// Regenerates every queued document and returns how many were materialised.
    pub fn process_pending(&mut self) -> usize {
        let queued = std::mem::take(&mut self.pending);
        let mut done = 0;
        for id in queued {
            if self.store.has_content(&id) {
                continue;
            }
            if self.materialize(&id).is_ok() {
                done += 1;
            }
        }
        done
    }

    /// Re-runs the recorded chain leniently and stores the result.
    pub fn materialize(&mut self, id: &DerivedId) -> Result<ChainOutcome, ProviderError> {
        let record = self
            .store
            .record(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.clone()))?;
        let lines = self.source_lines(&record.source_identity);
        let outcome = replay_chain(&lines, &record.chain);
        for skipped in &outcome.skipped {
            self.events
                .notify(NoticeLevel::Warning, format!("{id}: skipped {skipped}"));
        }
        let text = self.render(&record.chain, &outcome);
        debug!(%id, matched = outcome.matched(), "content regenerated");
        self.pending.remove(id);
        self.store.set_content(id.clone(), text);
        self.events.push(Event::ContentChanged(id.clone()));
        Ok(outcome)
    }

    /// Stores host edits verbatim; the chain is left untouched.
    pub fn write(&mut self, id: &DerivedId, bytes: &[u8]) -> Result<(), ProviderError> {
        if !self.store.has_record(id) {
            return Err(ProviderError::NotFound(id.clone()));
        }
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.pending.remove(id);
        self.store.set_content(id.clone(), text);
        self.events.push(Event::ContentChanged(id.clone()));
        Ok(())
    }

    /// Removes record and content. Returns whether the document existed.
    pub fn delete(&mut self, id: &DerivedId) -> bool {
        self.pending.remove(id);
        let existed = self.store.delete(id);
        if existed {
            self.events.push(Event::Deleted(id.clone()));
        }
        existed
    }

    /// Drops materialised content but keeps the record, so the next read regenerates it.
    pub fn evict(&mut self, id: &DerivedId) -> bool {
        self.store.remove_content(id).is_some()
    }

    /// Evicts the content of every document derived from `source`.
    pub fn invalidate_source(&mut self, source: &SourceId) -> Vec<DerivedId> {
        let mut invalidated = Vec::new();
        for id in self.store.derived_from(source) {
            if self.store.remove_content(&id).is_some() {
                self.events.push(Event::ContentChanged(id.clone()));
                invalidated.push(id);
            }
        }
        invalidated
    }

    /// Frees content the host is not showing: orphans first, then evictable documents.
    pub fn cleanup(&mut self, open: &HashSet<DerivedId>) -> CleanupReport {
        let mut report = CleanupReport::default();
        for id in self.store.orphaned_contents() {
            if !open.contains(&id) && self.store.remove_content(&id).is_some() {
                report.orphans += 1;
            }
        }
        let closed: Vec<DerivedId> = self
            .store
            .contents()
            .map(|(id, _)| id)
            .filter(|id| !open.contains(*id))
            .cloned()
            .collect();
        for id in closed {
            if self.store.remove_content(&id).is_some() {
                report.evicted += 1;
            }
        }
        if report.orphans + report.evicted > 0 {
            debug!(
                orphans = report.orphans,
                evicted = report.evicted,
                "content cleanup"
            );
        }
        report
    }

    fn render(&self, chain: &Chain, outcome: &ChainOutcome) -> String {
        let total = outcome.lines.len();
        let cap = self.options.max_results;
        let shown = if cap > 0 && total > cap { cap } else { total };
        let truncated = (shown < total).then_some(shown);

        let mut text = if self.options.detailed_header {
            render_header(chain, outcome, truncated)
        } else {
            String::new()
        };
        for line in &outcome.lines[..shown] {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}
