use std::fmt::Write as _;

use crate::engine::ChainOutcome;
use crate::query::Chain;

const BANNER: &str = "====================";

/// Renders the summary block placed above filtered lines.
///
/// `shown` is the number of result lines actually emitted below the header when a
/// result cap truncated the output, `None` otherwise.
pub fn render_header(chain: &Chain, outcome: &ChainOutcome, shown: Option<usize>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{BANNER} sift: {} step(s) over {} line(s) {BANNER}",
        chain.len(),
        outcome.source_lines
    );

    for (query, stat) in chain.iter().zip(&outcome.stats) {
        let flags = query.flags.as_deref().filter(|f| !f.is_empty()).unwrap_or("-");
        let _ = writeln!(
            out,
            "[{}] {} \"{}\" | flags: {} | inverted: {} | case-sensitive: {} | matched: {}",
            stat.step,
            query.kind.name(),
            query.pattern,
            flags,
            yes_no(query.inverted),
            yes_no(query.case_sensitive),
            stat.matched
        );
    }

    for skipped in &outcome.skipped {
        let _ = writeln!(out, "[!] skipped {skipped}");
    }
    for error in &outcome.errors {
        let _ = writeln!(out, "[!] invalid {error}");
    }

    let _ = writeln!(
        out,
        "{BANNER} result: {} of {} line(s) ({:.2}%) {BANNER}",
        outcome.matched(),
        outcome.source_lines,
        outcome.percentage()
    );
    if let Some(shown) = shown {
        let _ = writeln!(out, "(showing first {shown} of {} line(s))", outcome.matched());
    }
    out.push('\n');
    out
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{evaluate_chain, Query};

    #[test]
    fn header_lists_every_step_with_counts() {
        let lines = vec!["apple", "Banana", "grape", "banana split"];
        let mut chain: Chain = vec![
            Query::text("an"),
            Query::regex("split$").inverted(true).case_sensitive(true),
        ]
        .into();
        chain.normalize();
        let outcome = evaluate_chain(&lines, &chain);
        let header = render_header(&chain, &outcome, None);

        let rows: Vec<&str> = header.lines().collect();
        assert!(rows[0].contains("2 step(s) over 4 line(s)"));
        assert_eq!(
            rows[1],
            "[1] Text \"an\" | flags: - | inverted: no | case-sensitive: no | matched: 2"
        );
        assert_eq!(
            rows[2],
            "[2] Regex \"split$\" | flags: s | inverted: yes | case-sensitive: yes | matched: 1"
        );
        assert!(rows[3].contains("result: 1 of 4 line(s) (25.00%)"));
        assert!(header.ends_with("\n\n"));
    }

    #[test]
    fn header_mentions_truncation() {
        let lines = vec!["a1", "a2", "a3"];
        let chain: Chain = vec![Query::text("a")].into();
        let outcome = evaluate_chain(&lines, &chain);
        let header = render_header(&chain, &outcome, Some(2));
        assert!(header.contains("(showing first 2 of 3 line(s))"));
    }
}
