use std::fmt;

use serde::{Deserialize, Serialize};

/// Flag that makes `.` match line terminators; every regex query carries it after normalisation.
pub const DOT_ALL_FLAG: char = 's';

/// Determines how the query pattern is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Text,
    Regex,
}

impl QueryKind {
    /// Single-letter marker used in derived-document identities and labels.
    pub fn marker(self) -> char {
        match self {
            QueryKind::Text => 'T',
            QueryKind::Regex => 'R',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QueryKind::Text => "Text",
            QueryKind::Regex => "Regex",
        }
    }
}

/// One filter step of a chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(rename = "type")]
    pub kind: QueryKind,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl Query {
    /// Creates a case-insensitive, non-inverted literal query.
    pub fn text(pattern: impl Into<String>) -> Self {
        Self {
            kind: QueryKind::Text,
            pattern: pattern.into(),
            flags: None,
            inverted: false,
            case_sensitive: false,
        }
    }

    /// Creates a case-insensitive, non-inverted regex query without explicit flags.
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            kind: QueryKind::Regex,
            pattern: pattern.into(),
            flags: None,
            inverted: false,
            case_sensitive: false,
        }
    }

    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.flags = Some(flags.into());
        self
    }

    pub fn inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Adds the dot-all flag to a regex query. Running it twice leaves the flags unchanged.
    pub fn normalize(&mut self) {
        if self.kind != QueryKind::Regex {
            return;
        }
        let flags = self.flags.get_or_insert_with(String::new);
        if !flags.contains(DOT_ALL_FLAG) {
            flags.push(DOT_ALL_FLAG);
        }
    }

    /// Marker prefix such as `T`, `R!` or `T!C`.
    pub fn markers(&self) -> String {
        let mut out = String::with_capacity(3);
        out.push(self.kind.marker());
        if self.inverted {
            out.push('!');
        }
        if self.case_sensitive {
            out.push('C');
        }
        out
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.markers(), self.pattern)
    }
}

/// Ordered list of queries; order is evaluation order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain(Vec<Query>);

impl Chain {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn queries(&self) -> &[Query] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Query> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&Query> {
        self.0.last()
    }

    pub fn push(&mut self, query: Query) {
        self.0.push(query);
    }

    /// Returns a new chain made of this one followed by `query`.
    pub fn extended(&self, query: Query) -> Self {
        let mut next = self.clone();
        next.push(query);
        next
    }

    /// Normalises every regex step (see [`Query::normalize`]).
    pub fn normalize(&mut self) {
        for query in &mut self.0 {
            query.normalize();
        }
    }

    /// `true` when `self` is a strict prefix of `other`, comparing steps by value.
    pub fn is_strict_prefix_of(&self, other: &Chain) -> bool {
        self.len() < other.len() && other.0[..self.len()] == self.0[..]
    }
}

impl From<Vec<Query>> for Chain {
    fn from(queries: Vec<Query>) -> Self {
        Self(queries)
    }
}

impl FromIterator<Query> for Chain {
    fn from_iter<I: IntoIterator<Item = Query>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Query;
    type IntoIter = std::slice::Iter<'a, Query>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
