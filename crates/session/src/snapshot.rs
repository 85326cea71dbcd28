use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift_core::{ChainRecord, DerivedId};
use thiserror::Error;
use tracing::warn;

use crate::highlights::HighlightState;
use crate::util::write_atomic;

/// Serialized session state: both document maps as ordered pairs plus highlights.
///
/// ```json
/// { "chainData": [[id, {"chain": [..], "sourceIdentity": ".."}]],
///   "contentsData": [[id, "text"]],
///   "persistentHighlights": {..} }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub chain_data: Vec<(DerivedId, ChainRecord)>,
    #[serde(default)]
    pub contents_data: Vec<(DerivedId, String)>,
    #[serde(default)]
    pub persistent_highlights: HighlightState,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    #[serde(default)]
    chain_data: Vec<Value>,
    #[serde(default)]
    contents_data: Vec<Value>,
    #[serde(default)]
    persistent_highlights: Value,
}

impl SessionSnapshot {
    /// 寬鬆解析快照。 / Parses a snapshot, dropping entries that fail to decode.
    ///
    /// Only a payload that is not a JSON object at all is an error; a bad
    /// record, content pair or highlight block is skipped with a warning.
    pub fn from_json(payload: &str) -> Result<Self, SnapshotError> {
        let raw: RawSnapshot =
            serde_json::from_str(payload).map_err(|err| SnapshotError::Invalid(err.to_string()))?;

        let chain_data = decode_entries(raw.chain_data, "chainData");
        let contents_data = decode_entries(raw.contents_data, "contentsData");
        let persistent_highlights = if raw.persistent_highlights.is_null() {
            HighlightState::default()
        } else {
            serde_json::from_value(raw.persistent_highlights).unwrap_or_else(|err| {
                warn!(%err, "persistent highlights dropped");
                HighlightState::default()
            })
        };

        Ok(Self {
            chain_data,
            contents_data,
            persistent_highlights,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec_pretty(self).map_err(|err| SnapshotError::Invalid(err.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.chain_data.is_empty()
            && self.contents_data.is_empty()
            && self.persistent_highlights.is_empty()
    }
}

fn decode_entries<T>(values: Vec<Value>, field: &str) -> Vec<T>
where
    T: for<'de> Deserialize<'de>,
{
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(field, index, %err, "malformed snapshot entry skipped");
                None
            }
        })
        .collect()
}

/// 以 JSON 與原子寫入保存快照。 / Persists [`SessionSnapshot`]s as JSON with atomic writes.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, returning `Ok(None)` when the file is absent.
    pub fn load(&self) -> Result<Option<SessionSnapshot>, SnapshotError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => SessionSnapshot::from_json(&contents).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SnapshotError::Io(err)),
        }
    }

    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SnapshotError> {
        let payload = snapshot.to_json()?;
        write_atomic(&self.path, &payload).map_err(SnapshotError::Io)
    }
}

/// [`SnapshotStore`] 可能拋出的錯誤。 / Errors emitted by [`SnapshotStore`].
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid snapshot payload: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::SourceId;
    use sift_search::{Chain, Query};
    use tempfile::tempdir;

    fn sample() -> SessionSnapshot {
        let source = SourceId::new("file:///srv/app.log");
        let chain: Chain = vec![Query::text("error"), Query::regex("^id").with_flags("s")].into();
        let id = DerivedId::for_chain(&source, &chain);
        SessionSnapshot {
            chain_data: vec![(id.clone(), ChainRecord::new(chain, source))],
            contents_data: vec![(id, "error id\n".into())],
            persistent_highlights: HighlightState::default(),
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state").join("session.json"));
        let snapshot = sample();
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn uses_ordered_pair_layout() {
        let json: Value = serde_json::from_slice(&sample().to_json().unwrap()).unwrap();
        let pair = &json["chainData"][0];
        assert!(pair[0].as_str().unwrap().starts_with("sift:///[app] : "));
        assert_eq!(pair[1]["sourceIdentity"], "file:///srv/app.log");
        assert_eq!(pair[1]["chain"][0]["type"], "text");
        assert_eq!(json["contentsData"][0][1], "error id\n");
        assert!(json["persistentHighlights"].is_object());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let payload = r#"{
            "chainData": [
                ["sift:///[a] : T[x].log", {"chain": [{"type": "text", "pattern": "x"}], "sourceIdentity": "/a.log"}],
                ["broken"],
                42
            ],
            "contentsData": [["sift:///[a] : T[x].log", "x\n"], [1, 2]],
            "persistentHighlights": "nonsense"
        }"#;
        let snapshot = SessionSnapshot::from_json(payload).unwrap();
        assert_eq!(snapshot.chain_data.len(), 1);
        assert_eq!(snapshot.contents_data.len(), 1);
        assert!(snapshot.persistent_highlights.is_empty());
    }

    #[test]
    fn non_object_payload_is_invalid() {
        let err = SessionSnapshot::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, SnapshotError::Invalid(_)));
    }
}
