use std::fmt;

use serde::{Deserialize, Serialize};
use sift_search::{Chain, Query};

use crate::source::SourceId;

/// URI scheme of derived documents.
pub const DERIVED_SCHEME: &str = "sift";
/// Characters of a step pattern kept in the identity before `...` is appended.
pub const PATTERN_LIMIT: usize = 15;
/// Characters of the `[base] : chain` label kept before `...` is appended.
pub const LABEL_LIMIT: usize = 60;

const ELLIPSIS: &str = "...";

/// 衍生文件的可讀識別字串。 / Human-readable address of a derived document.
///
/// Built from the source name and a compact chain encoding, e.g.
/// `sift:///[app] : T[error]->R![^debug].log`. It is a label, not a hash: two
/// chains that truncate to the same text produce the same identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedId(String);

impl DerivedId {
    /// 依來源與篩選鏈建構識別。 / Builds the identity for `chain` applied to `source`.
    pub fn for_chain(source: &SourceId, chain: &Chain) -> Self {
        let encoding = chain
            .iter()
            .map(encode_step)
            .collect::<Vec<_>>()
            .join("->");
        let label = truncate(
            &format!("[{}] : {}", source.base_name(), encoding),
            LABEL_LIMIT,
        );
        Self(format!(
            "{DERIVED_SCHEME}:///{label}{}",
            source.extension()
        ))
    }

    /// 包裝既有字串（例如來自快照或主機）。 / Wraps an existing identity string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_derived(raw: &str) -> bool {
        raw.starts_with(DERIVED_SCHEME) && raw[DERIVED_SCHEME.len()..].starts_with(":///")
    }
}

impl fmt::Display for DerivedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn encode_step(query: &Query) -> String {
    format!(
        "{}[{}]",
        query.markers(),
        truncate(&query.pattern, PATTERN_LIMIT)
    )
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}
