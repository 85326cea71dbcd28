use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sift_search::Chain;

use crate::identity::DerivedId;
use crate::source::SourceId;

/// 衍生文件的篩選鏈與來源。 / Chain and source behind one derived document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRecord {
    pub chain: Chain,
    pub source_identity: SourceId,
}

impl ChainRecord {
    pub fn new(chain: Chain, source_identity: SourceId) -> Self {
        Self {
            chain,
            source_identity,
        }
    }
}

/// Chain records (durable) and materialised text (evictable), both keyed by identity.
///
/// The store applies no policy of its own. Callers keep `contents` a subset of
/// `records`; [`crate::ContentProvider`] only writes content for known records.
#[derive(Debug, Clone, Default)]
pub struct DerivedStore {
    records: BTreeMap<DerivedId, ChainRecord>,
    contents: BTreeMap<DerivedId, String>,
}

impl DerivedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: &DerivedId) -> Option<&ChainRecord> {
        self.records.get(id)
    }

    pub fn has_record(&self, id: &DerivedId) -> bool {
        self.records.contains_key(id)
    }

    pub fn insert_record(&mut self, id: DerivedId, record: ChainRecord) -> Option<ChainRecord> {
        self.records.insert(id, record)
    }

    pub fn remove_record(&mut self, id: &DerivedId) -> Option<ChainRecord> {
        self.records.remove(id)
    }

    pub fn content(&self, id: &DerivedId) -> Option<&str> {
        self.contents.get(id).map(String::as_str)
    }

    pub fn has_content(&self, id: &DerivedId) -> bool {
        self.contents.contains_key(id)
    }

    pub fn set_content(&mut self, id: DerivedId, text: String) -> Option<String> {
        self.contents.insert(id, text)
    }

    pub fn remove_content(&mut self, id: &DerivedId) -> Option<String> {
        self.contents.remove(id)
    }

    /// Drops both the record and the content for `id`; returns whether anything was present.
    pub fn delete(&mut self, id: &DerivedId) -> bool {
        let had_record = self.records.remove(id).is_some();
        let had_content = self.contents.remove(id).is_some();
        had_record || had_content
    }

    pub fn records(&self) -> impl Iterator<Item = (&DerivedId, &ChainRecord)> {
        self.records.iter()
    }

    pub fn contents(&self) -> impl Iterator<Item = (&DerivedId, &str)> {
        self.contents.iter().map(|(id, text)| (id, text.as_str()))
    }

    /// Identities whose record points at `source`.
    pub fn derived_from(&self, source: &SourceId) -> Vec<DerivedId> {
        self.records
            .iter()
            .filter(|(_, record)| &record.source_identity == source)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Content keys that have no record.
    pub fn orphaned_contents(&self) -> Vec<DerivedId> {
        self.contents
            .keys()
            .filter(|id| !self.records.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn content_count(&self) -> usize {
        self.contents.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.contents.clear();
    }
}
