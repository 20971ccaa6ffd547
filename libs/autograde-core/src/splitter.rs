/// Test Unit Splitter
///
/// Cuts an instructor test suite into independently executable units.
/// The strategy is chosen once per language from a strategy table; no
/// per-language branching happens outside of it.
///
/// **Unit directives** (comment lines directly above a unit):
/// - `points: N` sets the unit's weight (default 1)
/// - `hidden` hides the unit from students
///
/// Malformed directives are authoring errors and block publication.

use crate::languages::{LanguageConfigManager, SplitStrategyKind};
use autograde_common::types::{Language, TestUnit};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("test suite contains no test units")]
    NoUnits,
    #[error("line {line}: duplicate '{directive}' directive for the same unit")]
    DuplicateMarker { line: usize, directive: &'static str },
    #[error("line {line}: directive is not followed by a test unit")]
    DanglingMarker { line: usize },
    #[error("line {line}: directive inside unit '{unit}' conflicts with its header")]
    ConflictingMarker { unit: String, line: usize },
    #[error("line {line}: invalid point value {value:?}")]
    InvalidPoints { line: usize, value: String },
    #[error("duplicate test unit '{id}'")]
    DuplicateUnit { id: String },
    #[error("unit '{unit}' has unbalanced braces")]
    UnbalancedBraces { unit: String },
    #[error("unit points add up to more than {}", u32::MAX)]
    PointsOverflow,
    #[error("unit points sum to {actual}, assignment declares {declared}")]
    PointMismatch { declared: u32, actual: u32 },
    #[error("no splitting strategy registered for {0}")]
    UnsupportedLanguage(Language),
}

/// Output of a strategy: shared preamble plus ordered units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSuite {
    pub preamble: String,
    pub units: Vec<TestUnit>,
}

impl SplitSuite {
    pub fn total_points(&self) -> Result<u32, ParseError> {
        self.units
            .iter()
            .try_fold(0u32, |sum, u| sum.checked_add(u.points))
            .ok_or(ParseError::PointsOverflow)
    }
}

pub trait SplitterStrategy: Debug + Send + Sync {
    fn name(&self) -> &'static str;
    fn split(&self, source: &str) -> Result<SplitSuite, ParseError>;
}

/// Strategy table keyed by language.
#[derive(Debug, Clone)]
pub struct TestUnitSplitter {
    strategies: HashMap<Language, Arc<dyn SplitterStrategy>>,
}

impl TestUnitSplitter {
    pub fn from_languages(languages: &LanguageConfigManager) -> Self {
        let python: Arc<dyn SplitterStrategy> = Arc::new(PythonSplitter);
        let brace: Arc<dyn SplitterStrategy> = Arc::new(BraceSplitter);

        let strategies = languages
            .configs()
            .map(|config| {
                let strategy = match config.split_strategy {
                    SplitStrategyKind::Python => python.clone(),
                    SplitStrategyKind::Brace => brace.clone(),
                };
                (config.name, strategy)
            })
            .collect();
        Self { strategies }
    }

    pub fn split(&self, source: &str, language: Language) -> Result<SplitSuite, ParseError> {
        let strategy = self
            .strategies
            .get(&language)
            .ok_or(ParseError::UnsupportedLanguage(language))?;

        let suite = strategy.split(source)?;
        if suite.units.is_empty() {
            return Err(ParseError::NoUnits);
        }

        let mut seen = HashSet::new();
        for unit in &suite.units {
            if !seen.insert(unit.id.as_str()) {
                return Err(ParseError::DuplicateUnit { id: unit.id.clone() });
            }
        }
        let total_points = suite.total_points()?;

        tracing::debug!(
            language = %language,
            strategy = strategy.name(),
            units = suite.units.len(),
            total_points = total_points,
            "Split test suite"
        );
        Ok(suite)
    }
}

/// Reject a suite whose point total differs from the assignment's declared total.
pub fn validate_total(suite: &SplitSuite, declared: u32) -> Result<(), ParseError> {
    let actual = suite.total_points()?;
    if actual != declared {
        return Err(ParseError::PointMismatch { declared, actual });
    }
    Ok(())
}

enum Directive {
    Points(u32),
    Hidden,
}

/// Parse `<prefix> points: N` / `<prefix> hidden`. Other comments yield `None`.
fn parse_directive(trimmed: &str, prefix: &str, line: usize) -> Result<Option<Directive>, ParseError> {
    let Some(body) = trimmed.strip_prefix(prefix) else {
        return Ok(None);
    };
    let body = body.trim();
    let lower = body.to_ascii_lowercase();

    if lower == "hidden" {
        return Ok(Some(Directive::Hidden));
    }
    let Some(value) = lower.strip_prefix("points:") else {
        return Ok(None);
    };
    let value = value.trim();
    match value.parse::<u32>() {
        Ok(points) if points > 0 => Ok(Some(Directive::Points(points))),
        _ => Err(ParseError::InvalidPoints {
            line,
            value: value.to_string(),
        }),
    }
}

/// Directives collected above the next unit.
#[derive(Default)]
struct Pending {
    points: Option<u32>,
    hidden: bool,
    first_line: Option<usize>,
}

impl Pending {
    fn apply(&mut self, directive: Directive, line: usize) -> Result<(), ParseError> {
        match directive {
            Directive::Points(points) => {
                if self.points.is_some() {
                    return Err(ParseError::DuplicateMarker { line, directive: "points" });
                }
                self.points = Some(points);
            }
            Directive::Hidden => {
                if self.hidden {
                    return Err(ParseError::DuplicateMarker { line, directive: "hidden" });
                }
                self.hidden = true;
            }
        }
        self.first_line.get_or_insert(line);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.first_line.is_none()
    }

    fn take_unit(&mut self, id: String, order: usize, code: String, label: String, entry: Option<String>) -> TestUnit {
        let pending = std::mem::take(self);
        TestUnit {
            id,
            order: order as u32,
            code,
            points: pending.points.unwrap_or(1),
            visible: !pending.hidden,
            label,
            entry,
        }
    }
}

fn is_top_level(line: &str) -> bool {
    !line.starts_with(' ') && !line.starts_with('\t')
}

/// Identifier following `keyword` up to `(`, e.g. `def test_add(x):` -> `test_add`.
fn function_name(after_keyword: &str) -> Option<String> {
    let name: String = after_keyword
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.starts_with("test_") || name == "test" {
        Some(name)
    } else {
        None
    }
}

fn trim_trailing_blank(lines: &mut Vec<&str>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

/// Test function being collected line by line.
struct OpenUnit<'a> {
    name: String,
    lines: Vec<&'a str>,
    pending: Pending,
    /// Brace strategy only: the body's opening brace has been seen.
    opened: bool,
}

impl<'a> OpenUnit<'a> {
    fn new(name: String, line: &'a str, pending: Pending) -> Self {
        Self {
            name,
            lines: vec![line],
            pending,
            opened: false,
        }
    }

    fn finish(mut self, order: usize) -> TestUnit {
        trim_trailing_blank(&mut self.lines);
        let code = self.lines.join("\n");
        self.pending
            .take_unit(self.name.clone(), order, code, self.name.clone(), Some(self.name))
    }
}

/// Python suites: `def test_*` functions and top-level `assert` statements.
#[derive(Debug, Default)]
pub struct PythonSplitter;

impl SplitterStrategy for PythonSplitter {
    fn name(&self) -> &'static str {
        "python"
    }

    fn split(&self, source: &str) -> Result<SplitSuite, ParseError> {
        let mut units = Vec::new();
        let mut preamble = Vec::new();
        let mut pending = Pending::default();
        let mut current: Option<OpenUnit> = None;
        let mut assert_count = 0usize;

        for (idx, line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();

            if let Some(mut open) = current.take() {
                if trimmed.is_empty() || !is_top_level(line) {
                    if parse_directive(trimmed, "#", line_no)?.is_some() {
                        return Err(ParseError::ConflictingMarker {
                            unit: open.name,
                            line: line_no,
                        });
                    }
                    open.lines.push(line);
                    current = Some(open);
                    continue;
                }
                units.push(open.finish(units.len()));
            }

            if let Some(directive) = parse_directive(trimmed, "#", line_no)? {
                pending.apply(directive, line_no)?;
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix("def ").filter(|_| is_top_level(line)) {
                if let Some(name) = function_name(rest) {
                    current = Some(OpenUnit::new(name, line, std::mem::take(&mut pending)));
                    continue;
                }
            }

            if is_top_level(line) && (trimmed.starts_with("assert ") || trimmed.starts_with("assert(")) {
                assert_count += 1;
                let order = units.len();
                units.push(pending.take_unit(
                    format!("assert_{}", assert_count),
                    order,
                    line.to_string(),
                    trimmed.to_string(),
                    None,
                ));
                continue;
            }

            if trimmed.is_empty() || trimmed.starts_with('#') {
                if pending.is_empty() {
                    preamble.push(line);
                }
                continue;
            }

            if let Some(line) = pending.first_line {
                return Err(ParseError::DanglingMarker { line });
            }
            preamble.push(line);
        }

        if let Some(open) = current {
            units.push(open.finish(units.len()));
        }
        if let Some(line) = pending.first_line {
            return Err(ParseError::DanglingMarker { line });
        }

        trim_trailing_blank(&mut preamble);
        Ok(SplitSuite {
            preamble: preamble.join("\n"),
            units,
        })
    }
}

/// Brace-delimited suites (Rust, Java, C++): every `test_*` function is a unit.
#[derive(Debug, Default)]
pub struct BraceSplitter;

/// Tracks brace depth while skipping string/char literals and comments.
#[derive(Default)]
struct BraceScanner {
    depth: i64,
    in_block_comment: bool,
}

impl BraceScanner {
    fn scan(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if self.in_block_comment {
                if c == '*' && next == Some('/') {
                    self.in_block_comment = false;
                    i += 1;
                }
                i += 1;
                continue;
            }

            match c {
                '/' if next == Some('/') => return,
                '/' if next == Some('*') => {
                    self.in_block_comment = true;
                    i += 1;
                }
                '"' => {
                    i += 1;
                    while i < chars.len() && chars[i] != '"' {
                        if chars[i] == '\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                }
                // Char literal ('x' or '\n'); a lone quote is a Rust lifetime.
                '\'' if next == Some('\\') => {
                    i += 2;
                    while i < chars.len() && chars[i] != '\'' {
                        i += 1;
                    }
                }
                '\'' if chars.get(i + 2) == Some(&'\'') => i += 2,
                '{' => self.depth += 1,
                '}' => self.depth -= 1,
                _ => {}
            }
            i += 1;
        }
    }
}

/// `#[test]`, `@Test` and similar lines that decorate the next declaration.
fn is_attribute(trimmed: &str) -> bool {
    trimmed.starts_with("#[") || (trimmed.starts_with('@') && !trimmed.starts_with("@interface"))
}

/// Declaration line without leading attributes, e.g. `@Test public void test_x() {`.
/// Test frameworks are not available in the sandbox, so their annotations are dropped.
fn strip_attributes(line: &str) -> &str {
    if !is_attribute(line.trim_start()) {
        return line;
    }
    let mut rest = line.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("#[") {
            match after.find(']') {
                Some(end) => rest = after[end + 1..].trim_start(),
                None => return rest,
            }
        } else if let Some(after) = rest.strip_prefix('@') {
            let name_end = after
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
                .unwrap_or(after.len());
            let after_name = &after[name_end..];
            match after_name.strip_prefix('(') {
                Some(args) => match args.find(')') {
                    Some(end) => rest = args[end + 1..].trim_start(),
                    None => return rest,
                },
                None => rest = after_name.trim_start(),
            }
        } else {
            return rest;
        }
    }
}

/// Name of a test function declared on this line, if any.
fn brace_function_name(trimmed: &str) -> Option<String> {
    if trimmed.ends_with(';') {
        // prototype or call
        return None;
    }
    let open = trimmed.find('(')?;
    let head = &trimmed[..open];
    let name_start = head
        .rfind(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(|p| p + 1)
        .unwrap_or(0);
    // require a return type or keyword before the name
    if name_start == 0 {
        return None;
    }
    function_name(&head[name_start..])
}

impl SplitterStrategy for BraceSplitter {
    fn name(&self) -> &'static str {
        "brace"
    }

    fn split(&self, source: &str) -> Result<SplitSuite, ParseError> {
        let mut units = Vec::new();
        let mut preamble = Vec::new();
        let mut pending = Pending::default();
        let mut scanner = BraceScanner::default();
        let mut current: Option<OpenUnit> = None;
        // Attribute lines (and comments after them) waiting to see what they decorate
        let mut held: Vec<&str> = Vec::new();

        for (idx, line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();

            if let Some(mut open) = current.take() {
                if open.opened && parse_directive(trimmed, "//", line_no)?.is_some() {
                    return Err(ParseError::ConflictingMarker {
                        unit: open.name,
                        line: line_no,
                    });
                }
                open.lines.push(line);
                scanner.scan(line);
                open.opened |= line.contains('{');

                if open.opened && scanner.depth < 0 {
                    return Err(ParseError::UnbalancedBraces { unit: open.name });
                }
                if open.opened && scanner.depth == 0 {
                    units.push(open.finish(units.len()));
                } else {
                    current = Some(open);
                }
                continue;
            }

            if scanner.depth == 0 && !scanner.in_block_comment {
                if let Some(directive) = parse_directive(trimmed, "//", line_no)? {
                    pending.apply(directive, line_no)?;
                    continue;
                }

                if let Some(name) = brace_function_name(strip_attributes(trimmed)) {
                    // `#[test]` would compile the function out of a non-test build
                    held.clear();
                    scanner.scan(line);
                    let mut open = OpenUnit::new(name, strip_attributes(line), std::mem::take(&mut pending));
                    open.opened = line.contains('{');
                    if open.opened && scanner.depth == 0 {
                        // single-line body
                        units.push(open.finish(units.len()));
                    } else {
                        current = Some(open);
                    }
                    continue;
                }

                if is_attribute(trimmed) {
                    scanner.scan(line);
                    held.push(line);
                    continue;
                }
            }

            scanner.scan(line);
            if scanner.depth < 0 {
                return Err(ParseError::UnbalancedBraces {
                    unit: "<preamble>".to_string(),
                });
            }

            let is_comment = trimmed.is_empty() || trimmed.starts_with("//");
            if !is_comment {
                if let Some(line) = pending.first_line {
                    return Err(ParseError::DanglingMarker { line });
                }
            }
            if !held.is_empty() {
                if is_comment {
                    held.push(line);
                    continue;
                }
                // decorates shared code, e.g. `#[derive(Debug)]`
                preamble.append(&mut held);
            }
            if pending.is_empty() {
                preamble.push(line);
            }
        }

        if let Some(open) = current {
            return Err(ParseError::UnbalancedBraces { unit: open.name });
        }
        preamble.append(&mut held);
        if let Some(line) = pending.first_line {
            return Err(ParseError::DanglingMarker { line });
        }
        if scanner.depth != 0 {
            return Err(ParseError::UnbalancedBraces {
                unit: "<preamble>".to_string(),
            });
        }

        trim_trailing_blank(&mut preamble);
        Ok(SplitSuite {
            preamble: preamble.join("\n"),
            units,
        })
    }
}
