use std::fmt;

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::{debug, warn};

use crate::query::{Chain, Query, QueryKind, DOT_ALL_FLAG};

/// Error conditions raised while compiling a single query.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("unsupported regex flag '{0}'")]
    UnsupportedFlag(char),
}

/// A query that failed to compile, tagged with its 1-based position in the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub step: usize,
    pub pattern: String,
    pub error: FilterError,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} (\"{}\"): {}", self.step, self.pattern, self.error)
    }
}

/// Number of lines left after a step ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepStat {
    /// 1-based position in the chain.
    pub step: usize,
    pub pattern: String,
    pub matched: usize,
}

/// Result of running a chain over a set of source lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainOutcome {
    pub lines: Vec<String>,
    pub stats: Vec<StepStat>,
    pub source_lines: usize,
    /// Pre-validation failures. When non-empty nothing was evaluated.
    pub errors: Vec<ValidationError>,
    /// Steps that failed to compile during evaluation and were passed through unfiltered.
    pub skipped: Vec<ValidationError>,
}

impl ChainOutcome {
    pub fn is_aborted(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn matched(&self) -> usize {
        self.lines.len()
    }

    /// Share of source lines that survived the whole chain, in percent.
    pub fn percentage(&self) -> f64 {
        if self.source_lines == 0 {
            0.0
        } else {
            self.lines.len() as f64 * 100.0 / self.source_lines as f64
        }
    }
}

/// Compiled form of a query.
#[derive(Debug)]
enum Matcher {
    Text { needle: String, case_sensitive: bool },
    Regex(Regex),
}

#[derive(Debug)]
struct CompiledStep {
    matcher: Matcher,
    inverted: bool,
}

impl CompiledStep {
    fn compile(query: &Query) -> Result<Self, FilterError> {
        let matcher = match query.kind {
            QueryKind::Text => Matcher::Text {
                needle: if query.case_sensitive {
                    query.pattern.clone()
                } else {
                    query.pattern.to_lowercase()
                },
                case_sensitive: query.case_sensitive,
            },
            QueryKind::Regex => Matcher::Regex(build_regex(query)?),
        };
        Ok(Self {
            matcher,
            inverted: query.inverted,
        })
    }

    fn matches(&self, line: &str) -> bool {
        let hit = match &self.matcher {
            Matcher::Text {
                needle,
                case_sensitive: true,
            } => line.contains(needle.as_str()),
            Matcher::Text {
                needle,
                case_sensitive: false,
            } => line.to_lowercase().contains(needle.as_str()),
            Matcher::Regex(regex) => regex.is_match(line),
        };
        hit != self.inverted
    }

    fn apply<'a>(&self, lines: &[&'a str]) -> Vec<&'a str> {
        lines
            .iter()
            .copied()
            .filter(|line| self.matches(line))
            .collect()
    }
}

/// Applies a single query to `lines`, preserving order.
pub fn evaluate_step<'a, S: AsRef<str>>(
    lines: &'a [S],
    query: &Query,
) -> Result<Vec<&'a str>, FilterError> {
    let step = CompiledStep::compile(query)?;
    let borrowed: Vec<&'a str> = lines.iter().map(AsRef::as_ref).collect();
    Ok(step.apply(&borrowed))
}

/// Compiles every regex step and reports all failures, not just the first.
pub fn validate_chain(chain: &Chain) -> Vec<ValidationError> {
    match compile_all(chain) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    }
}

/// Strict evaluation: the chain is validated first and nothing runs if any step is invalid.
///
/// Regex steps are compiled with the flags they carry. Call [`Chain::normalize`]
/// beforehand so `.` also matches line breaks inside a line.
pub fn evaluate_chain<S: AsRef<str>>(lines: &[S], chain: &Chain) -> ChainOutcome {
    let compiled = match compile_all(chain) {
        Ok(compiled) => compiled,
        Err(errors) => {
            warn!(
                invalid_steps = errors.len(),
                "chain rejected by validation"
            );
            return ChainOutcome {
                source_lines: lines.len(),
                errors,
                ..ChainOutcome::default()
            };
        }
    };

    let mut current: Vec<&str> = lines.iter().map(AsRef::as_ref).collect();
    let mut stats = Vec::with_capacity(chain.len());
    for (idx, (query, step)) in chain.iter().zip(&compiled).enumerate() {
        current = step.apply(&current);
        stats.push(StepStat {
            step: idx + 1,
            pattern: query.pattern.clone(),
            matched: current.len(),
        });
    }
    debug!(
        steps = chain.len(),
        source_lines = lines.len(),
        matched = current.len(),
        "chain evaluated"
    );

    ChainOutcome {
        lines: current.into_iter().map(str::to_string).collect(),
        stats,
        source_lines: lines.len(),
        errors: Vec::new(),
        skipped: Vec::new(),
    }
}

/// Lenient evaluation: a step that fails to compile is reported and its input passes through.
///
/// Used when regenerating content for chains that were validated when first run.
pub fn replay_chain<S: AsRef<str>>(lines: &[S], chain: &Chain) -> ChainOutcome {
    let mut current: Vec<&str> = lines.iter().map(AsRef::as_ref).collect();
    let mut stats = Vec::with_capacity(chain.len());
    let mut skipped = Vec::new();
    for (idx, query) in chain.iter().enumerate() {
        match CompiledStep::compile(query) {
            Ok(step) => current = step.apply(&current),
            Err(error) => {
                warn!(step = idx + 1, pattern = %query.pattern, %error, "skipping step");
                skipped.push(ValidationError {
                    step: idx + 1,
                    pattern: query.pattern.clone(),
                    error,
                });
            }
        }
        stats.push(StepStat {
            step: idx + 1,
            pattern: query.pattern.clone(),
            matched: current.len(),
        });
    }

    ChainOutcome {
        lines: current.into_iter().map(str::to_string).collect(),
        stats,
        source_lines: lines.len(),
        errors: Vec::new(),
        skipped,
    }
}

fn compile_all(chain: &Chain) -> Result<Vec<CompiledStep>, Vec<ValidationError>> {
    let mut compiled = Vec::with_capacity(chain.len());
    let mut errors = Vec::new();
    for (idx, query) in chain.iter().enumerate() {
        match CompiledStep::compile(query) {
            Ok(step) => compiled.push(step),
            Err(error) => errors.push(ValidationError {
                step: idx + 1,
                pattern: query.pattern.clone(),
                error,
            }),
        }
    }
    if errors.is_empty() {
        Ok(compiled)
    } else {
        Err(errors)
    }
}

fn build_regex(query: &Query) -> Result<Regex, FilterError> {
    let mut builder = RegexBuilder::new(&query.pattern);
    let mut case_insensitive = !query.case_sensitive;
    for flag in query.flags.as_deref().unwrap_or_default().chars() {
        match flag {
            'i' => case_insensitive = true,
            'm' => {
                builder.multi_line(true);
            }
            DOT_ALL_FLAG => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'U' => {
                builder.swap_greed(true);
            }
            'u' | 'g' => {}
            other => return Err(FilterError::UnsupportedFlag(other)),
        }
    }
    builder.case_insensitive(case_insensitive);
    builder
        .build()
        .map_err(|err| FilterError::InvalidPattern(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fruit() -> Vec<String> {
        vec!["apple".into(), "Banana".into(), "grape".into()]
    }

    #[test]
    fn text_step_is_case_insensitive_by_default() {
        let chain: Chain = vec![Query::text("an")].into();
        let outcome = evaluate_chain(&fruit(), &chain);
        assert_eq!(outcome.lines, vec!["Banana"]);
        assert_eq!(outcome.stats[0].matched, 1);
        assert_eq!(outcome.stats[0].step, 1);
    }

    #[test]
    fn inverted_text_step_keeps_non_matching_lines() {
        let chain: Chain = vec![Query::text("an").inverted(true)].into();
        let outcome = evaluate_chain(&fruit(), &chain);
        assert_eq!(outcome.lines, vec!["apple", "grape"]);
    }

    #[test]
    fn case_sensitive_text_step() {
        let lines = fruit();
        let query = Query::text("banana").case_sensitive(true);
        assert!(evaluate_step(&lines, &query).unwrap().is_empty());
        let query = Query::text("Banana").case_sensitive(true);
        assert_eq!(evaluate_step(&lines, &query).unwrap(), vec!["Banana"]);
    }

    #[test]
    fn empty_chain_returns_source_unchanged() {
        let outcome = evaluate_chain(&fruit(), &Chain::new());
        assert_eq!(outcome.lines, fruit());
        assert!(outcome.stats.is_empty());
        assert_eq!(outcome.source_lines, 3);
    }

    #[test]
    fn invalid_regex_aborts_whole_chain() {
        let chain: Chain = vec![Query::regex("(")].into();
        let outcome = evaluate_chain(&fruit(), &chain);
        assert!(outcome.is_aborted());
        assert!(outcome.lines.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].step, 1);
    }

    #[test]
    fn validation_collects_every_invalid_step() {
        let chain: Chain = vec![
            Query::regex("("),
            Query::text("ok"),
            Query::regex("[a-"),
            Query::regex("x").with_flags("q"),
        ]
        .into();
        let errors = validate_chain(&chain);
        let steps: Vec<usize> = errors.iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![1, 3, 4]);
        assert_eq!(errors[2].error, FilterError::UnsupportedFlag('q'));
    }

    #[test]
    fn replay_skips_step_that_fails_to_compile() {
        let chain: Chain = vec![Query::text("a"), Query::regex("("), Query::text("p")].into();
        let outcome = replay_chain(&fruit(), &chain);
        assert!(!outcome.is_aborted());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].step, 2);
        assert_eq!(outcome.lines, vec!["apple", "grape"]);
        let counts: Vec<usize> = outcome.stats.iter().map(|s| s.matched).collect();
        assert_eq!(counts, vec![3, 3, 2]);
    }

    #[test]
    fn regex_gets_implicit_case_insensitivity() {
        let lines = vec!["ERROR: disk", "warn: cpu"];
        let hits = evaluate_step(&lines, &Query::regex("^error")).unwrap();
        assert_eq!(hits, vec!["ERROR: disk"]);
        let strict = Query::regex("^error").case_sensitive(true);
        assert!(evaluate_step(&lines, &strict).unwrap().is_empty());
    }

    #[test]
    fn normalized_regex_dot_matches_embedded_newline() {
        let lines = vec!["a\nb"];
        let mut query = Query::regex("a.b");
        assert!(evaluate_step(&lines, &query).unwrap().is_empty());
        query.normalize();
        assert_eq!(evaluate_step(&lines, &query).unwrap(), vec!["a\nb"]);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let lines: Vec<String> = (0..200).map(|i| format!("line {i} value {}", i % 7)).collect();
        let chain: Chain = vec![
            Query::regex(r"value [1-3]"),
            Query::text("9").inverted(true),
        ]
        .into();
        let first = evaluate_chain(&lines, &chain);
        let second = evaluate_chain(&lines, &chain);
        assert_eq!(first, second);
    }

    #[test]
    fn inversion_is_order_preserving_complement() {
        let lines: Vec<String> = ["Alpha", "beta", "GAMMA", "delta", "alphabet", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for query in [
            Query::text("al"),
            Query::text("A").case_sensitive(true),
            Query::regex("^[a-d]"),
            Query::regex("ta$").case_sensitive(true),
        ] {
            let kept = evaluate_step(&lines, &query).unwrap();
            let dropped = evaluate_step(&lines, &query.clone().inverted(true)).unwrap();
            let expected: Vec<&str> = lines
                .iter()
                .map(String::as_str)
                .filter(|line| !kept.contains(line))
                .collect();
            assert_eq!(dropped, expected, "query {query}");
        }
    }

    #[test]
    fn case_insensitive_text_matches_any_casing_permutation() {
        for line in ["needle", "NEEDLE", "NeEdLe", "nEEDLe"] {
            let lines = vec![line];
            let query = Query::text("needle".to_uppercase());
            assert_eq!(evaluate_step(&lines, &query).unwrap(), vec![line]);
            let query = Query::text(line);
            assert_eq!(evaluate_step(&["needle"], &query).unwrap(), vec!["needle"]);
        }
    }

    #[test]
    fn percentage_handles_empty_source() {
        let chain: Chain = vec![Query::text("x")].into();
        let outcome = evaluate_chain(&Vec::<String>::new(), &chain);
        assert_eq!(outcome.percentage(), 0.0);
        assert_eq!(outcome.stats[0].matched, 0);
    }
}
