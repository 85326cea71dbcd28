use serde::{Deserialize, Serialize};
use sift_search::{evaluate_step, Query, QueryKind};

/// 一筆持續性的醒目提示。 / One persistent highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub pattern: String,
    #[serde(rename = "type")]
    pub kind: QueryKind,
    #[serde(default)]
    pub case_sensitive: bool,
    pub color: String,
}

impl Highlight {
    fn same_target(&self, pattern: &str, kind: QueryKind, case_sensitive: bool) -> bool {
        self.pattern == pattern && self.kind == kind && self.case_sensitive == case_sensitive
    }

    fn query(&self) -> Query {
        let query = match self.kind {
            QueryKind::Text => Query::text(self.pattern.clone()),
            QueryKind::Regex => Query::regex(self.pattern.clone()),
        };
        query.case_sensitive(self.case_sensitive)
    }

    /// `true` when `line` contains a match. An invalid regex matches nothing.
    pub fn matches(&self, line: &str) -> bool {
        evaluate_step(&[line], &self.query())
            .map(|hits| !hits.is_empty())
            .unwrap_or(false)
    }
}

/// 醒目提示集合與色盤游標。 / Highlight entries plus the palette cursor.
///
/// Colors are assigned round-robin from the palette passed to [`HighlightState::toggle`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightState {
    #[serde(default)]
    entries: Vec<Highlight>,
    #[serde(default)]
    next_color: usize,
}

impl HighlightState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the highlight, or removes it when an identical one exists.
    ///
    /// Returns the added entry, or `None` when the toggle removed one.
    pub fn toggle(
        &mut self,
        pattern: &str,
        kind: QueryKind,
        case_sensitive: bool,
        palette: &[String],
    ) -> Option<&Highlight> {
        if let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.same_target(pattern, kind, case_sensitive))
        {
            self.entries.remove(index);
            return None;
        }

        let color = if palette.is_empty() {
            String::new()
        } else {
            palette[self.next_color % palette.len()].clone()
        };
        self.next_color = self.next_color.wrapping_add(1);
        self.entries.push(Highlight {
            pattern: pattern.to_string(),
            kind,
            case_sensitive,
            color,
        });
        self.entries.last()
    }

    pub fn entries(&self) -> &[Highlight] {
        &self.entries
    }

    /// Highlights that match `line`, in insertion order.
    pub fn matching(&self, line: &str) -> Vec<&Highlight> {
        self.entries.iter().filter(|entry| entry.matches(line)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_color = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> Vec<String> {
        vec!["red".into(), "blue".into()]
    }

    #[test]
    fn toggle_assigns_palette_round_robin() {
        let mut state = HighlightState::new();
        let colors: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|p| {
                state
                    .toggle(p, QueryKind::Text, false, &palette())
                    .unwrap()
                    .color
                    .clone()
            })
            .collect();
        assert_eq!(colors, vec!["red", "blue", "red"]);
    }

    #[test]
    fn toggle_twice_removes_entry() {
        let mut state = HighlightState::new();
        state.toggle("warn", QueryKind::Text, false, &palette());
        assert!(state.toggle("warn", QueryKind::Text, false, &palette()).is_none());
        assert!(state.is_empty());
        // A case-sensitive variant is a distinct highlight.
        state.toggle("warn", QueryKind::Text, false, &palette());
        state.toggle("warn", QueryKind::Text, true, &palette());
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn matching_follows_query_semantics() {
        let mut state = HighlightState::new();
        state.toggle("ERROR", QueryKind::Text, false, &palette());
        state.toggle(r"id=\d+", QueryKind::Regex, false, &palette());
        state.toggle("(", QueryKind::Regex, false, &palette());

        let hits = state.matching("error for id=42");
        assert_eq!(hits.len(), 2);
        assert!(state.matching("nothing here").is_empty());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let mut state = HighlightState::new();
        state.toggle("x", QueryKind::Regex, true, &palette());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["entries"][0]["type"], "regex");
        assert_eq!(json["entries"][0]["caseSensitive"], true);
        assert_eq!(json["nextColor"], 1);
    }
}
