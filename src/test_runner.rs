//! `.weftt` fixture files: an opcode stream, optional components and data,
//! and the HTML expected after rendering and after an update

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::dom::{Document, DomBackend};
use crate::environment::Registry;
use crate::error::{WeftError, WeftResult};
use crate::scanner::Scanner;
use crate::vm::expressions::to_text;

const EXTENSION: &str = "weftt";

#[derive(Debug, Default)]
pub struct TestCase {
    pub name: String,
    pub description: String,
    pub file: String,
    pub opcodes: String,
    pub components: Option<String>,
    pub data: Option<String>,
    pub update: Option<String>,
    pub expected: Option<String>,
    pub expected_update: Option<String>,
    pub expected_error: Option<String>,
    pub skip: Option<String>,
}

#[derive(Debug)]
pub enum TestResult {
    Pass,
    Fail { expected: String, actual: String },
    Error(String),
    Skipped(String),
}

impl TestResult {
    /// One-character progress mark, colored for a terminal
    fn mark(&self) -> &'static str {
        match self {
            TestResult::Pass => "\x1b[32m.\x1b[0m",
            TestResult::Fail { .. } => "\x1b[31mF\x1b[0m",
            TestResult::Error(_) => "\x1b[31mE\x1b[0m",
            TestResult::Skipped(_) => "\x1b[33mS\x1b[0m",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TestResult::Pass => "\x1b[32mPASS\x1b[0m",
            TestResult::Fail { .. } => "\x1b[31mFAIL\x1b[0m",
            TestResult::Error(_) => "\x1b[31mERROR\x1b[0m",
            TestResult::Skipped(_) => "\x1b[33mSKIP\x1b[0m",
        }
    }
}

/// HTML after the first render, and after the update when there is one
#[derive(Debug, Default)]
pub struct FixtureOutput {
    pub html: String,
    pub updated: Option<String>,
}

/// Split a fixture into `(SECTION, body)` pairs. A header is a line of the
/// form `--NAME--`; text before the first header is ignored.
fn sections(content: &str) -> Vec<(&str, String)> {
    let mut out: Vec<(&str, String)> = Vec::new();
    for line in content.lines() {
        let header = line
            .strip_prefix("--")
            .and_then(|rest| rest.strip_suffix("--"))
            .filter(|name| !name.is_empty());
        if let Some(name) = header {
            out.push((name, String::new()));
        } else if let Some((_, body)) = out.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    out
}

impl TestCase {
    pub fn parse(content: &str, file_path: &str) -> Result<Self, String> {
        let mut test = TestCase {
            file: file_path.to_string(),
            ..Default::default()
        };
        for (section, body) in sections(content) {
            let body = body.trim().to_string();
            match section {
                "TEST" => test.name = body,
                "DESCRIPTION" => test.description = body,
                "OPCODES" => test.opcodes = body,
                "COMPONENTS" => test.components = Some(body),
                "DATA" => test.data = Some(body),
                "UPDATE" => test.update = Some(body),
                "EXPECT" => test.expected = Some(body),
                "EXPECT_UPDATE" => test.expected_update = Some(body),
                "EXPECT_ERROR" => test.expected_error = Some(body),
                "SKIPIF" => test.skip = Some(body),
                _ => {}
            }
        }

        let missing = if test.name.is_empty() {
            Some("--TEST--")
        } else if test.opcodes.is_empty() {
            Some("--OPCODES--")
        } else if test.expected.is_none() && test.expected_error.is_none() {
            Some("--EXPECT-- or --EXPECT_ERROR--")
        } else if test.update.is_some() != test.expected_update.is_some() {
            Some("--UPDATE-- together with --EXPECT_UPDATE--")
        } else {
            None
        };
        match missing {
            Some(what) => Err(format!("{}: missing {}", file_path, what)),
            None => Ok(test),
        }
    }

    pub fn run(&self) -> TestResult {
        if let Some(reason) = &self.skip {
            return TestResult::Skipped(reason.clone());
        }

        let output = match (run_fixture(self), &self.expected_error) {
            (Err(error), Some(wanted)) => {
                return if error.contains(wanted.as_str()) {
                    TestResult::Pass
                } else {
                    TestResult::Fail {
                        expected: wanted.clone(),
                        actual: error,
                    }
                };
            }
            (Err(error), None) => return TestResult::Error(error),
            (Ok(output), Some(wanted)) => {
                return TestResult::Fail {
                    expected: format!("error containing {:?}", wanted),
                    actual: output.html,
                };
            }
            (Ok(output), None) => output,
        };

        let checks = [
            (self.expected.as_deref(), Some(output.html)),
            (self.expected_update.as_deref(), output.updated),
        ];
        for (expected, actual) in checks {
            if let (Some(expected), Some(actual)) = (expected, actual) {
                if !same_html(&actual, expected) {
                    return TestResult::Fail {
                        expected: expected.to_string(),
                        actual,
                    };
                }
            }
        }
        TestResult::Pass
    }
}

/// Helpers and modifiers every fixture can use
pub fn fixture_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_helper("upper", |positional, _| {
        Value::String(
            positional
                .first()
                .map(to_text)
                .unwrap_or_default()
                .to_uppercase(),
        )
    });
    registry.register_helper("eq", |positional, _| {
        Value::Bool(positional.len() == 2 && positional[0] == positional[1])
    });
    registry.register_helper("join", |positional, named| {
        let separator = named
            .get("sep")
            .map(to_text)
            .unwrap_or_else(|| ", ".to_string());
        match positional.first() {
            Some(Value::Array(items)) => {
                Value::String(items.iter().map(to_text).collect::<Vec<_>>().join(&separator))
            }
            other => Value::String(other.map(to_text).unwrap_or_default()),
        }
    });
    registry.register_modifier("mark", |dom, element, positional, _| {
        let label = positional.first().map(to_text).unwrap_or_default();
        dom.set_attribute(element, "data-mark", &label, None);
    });
    registry
}

fn parse_json(section: &str, source: &Option<String>) -> Result<Value, String> {
    match source {
        Some(text) if !text.is_empty() => serde_json::from_str(text)
            .map_err(|e| format!("invalid JSON in --{}--: {}", section, e)),
        _ => Ok(Value::Null),
    }
}

/// Register `{tag: [opcodes...]}` as components, in order
fn register_components(registry: &mut Registry, components: &Value) -> WeftResult<()> {
    let Value::Object(map) = components else {
        return Ok(());
    };
    for (tag, stream) in map {
        let spec = crate::compile_opcodes(&stream.to_string())?;
        let layout = Scanner::new(&spec, &*registry).scan_layout()?;
        registry.register_component(tag, layout);
    }
    Ok(())
}

fn run_fixture(test: &TestCase) -> Result<FixtureOutput, String> {
    let data = parse_json("DATA", &test.data)?;
    let components = parse_json("COMPONENTS", &test.components)?;
    let update = match &test.update {
        Some(_) => Some(parse_json("UPDATE", &test.update)?),
        None => None,
    };

    let render = move || -> WeftResult<FixtureOutput> {
        let mut registry = fixture_registry();
        register_components(&mut registry, &components)?;

        let spec = crate::compile_opcodes(&test.opcodes)?;
        let entry = Scanner::new(&spec, &registry).scan_entry_point()?;

        let mut doc = Document::new();
        let root = doc.create_fragment();
        let mut result = entry.render(&registry, &mut doc, root, data)?;
        let html = doc.inner_html(root);

        let updated = match update {
            Some(update) => {
                result.rerender(&registry, &mut doc, update)?;
                Some(doc.inner_html(root))
            }
            None => None,
        };
        Ok(FixtureOutput { html, updated })
    };
    render().map_err(|e: WeftError| e.to_string())
}

fn same_html(actual: &str, expected: &str) -> bool {
    let normalize = |s: &str| s.trim().replace("\r\n", "\n");
    normalize(actual) == normalize(expected)
}

#[derive(Debug, Default)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    /// (name, expected, actual)
    pub failures: Vec<(String, String, String)>,
}

impl TestSummary {
    fn record(&mut self, name: &str, result: TestResult) {
        self.total += 1;
        match result {
            TestResult::Pass => self.passed += 1,
            TestResult::Skipped(_) => self.skipped += 1,
            TestResult::Fail { expected, actual } => {
                self.failed += 1;
                self.failures.push((name.to_string(), expected, actual));
            }
            TestResult::Error(error) => {
                self.errors += 1;
                self.failures
                    .push((name.to_string(), "no error".to_string(), error));
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.failures.is_empty() {
            writeln!(f, "\x1b[31mFailures:\x1b[0m\n")?;
        }
        let indent = |s: &str| s.replace('\n', "\n     ");
        for (i, (name, expected, actual)) in self.failures.iter().enumerate() {
            writeln!(f, "{:>3}) {}", i + 1, name)?;
            writeln!(f, "   expected: {}", indent(expected))?;
            writeln!(f, "   actual:   {}\n", indent(actual))?;
        }

        let color = match (self.is_success(), self.skipped) {
            (false, _) => "\x1b[31m",
            (true, 0) => "\x1b[32m",
            (true, _) => "\x1b[33m",
        };
        write!(
            f,
            "{}{} fixtures: {} passed, {} failed, {} errors, {} skipped\x1b[0m",
            color, self.total, self.passed, self.failed, self.errors, self.skipped
        )
    }
}

pub struct TestRunner {
    root: PathBuf,
    verbose: bool,
}

impl TestRunner {
    pub fn new(root: &Path, verbose: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            verbose,
        }
    }

    fn is_fixture(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == EXTENSION)
    }

    /// Every fixture under the root, sorted; the root may be a single file
    pub fn discover_tests(&self) -> Result<Vec<PathBuf>, String> {
        if self.root.is_file() {
            return if Self::is_fixture(&self.root) {
                Ok(vec![self.root.clone()])
            } else {
                Err(format!("not a .{} file: {}", EXTENSION, self.root.display()))
            };
        }
        if !self.root.is_dir() {
            return Err(format!("no such path: {}", self.root.display()));
        }

        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir)
                .map_err(|e| format!("cannot read {}: {}", dir.display(), e))?;
            for entry in entries {
                let path = entry.map_err(|e| e.to_string())?.path();
                if path.is_dir() {
                    pending.push(path);
                } else if Self::is_fixture(&path) {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    fn display_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(path)
            .display()
            .to_string()
    }

    pub fn run_all(&self) -> Result<TestSummary, String> {
        let fixtures = self.discover_tests()?;
        let mut summary = TestSummary::default();
        if fixtures.is_empty() {
            println!("no fixtures under {}", self.root.display());
            return Ok(summary);
        }
        println!("running {} fixtures\n", fixtures.len());

        for path in &fixtures {
            let name = self.display_name(path);
            let content = fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            let (name, result) = match TestCase::parse(&content, &name) {
                Ok(test) => (test.name.clone(), test.run()),
                Err(error) => (name, TestResult::Error(error)),
            };

            if self.verbose {
                match &result {
                    TestResult::Error(detail) | TestResult::Skipped(detail) => {
                        println!("  {} {}: {}", result.label(), name, detail)
                    }
                    _ => println!("  {} {}", result.label(), name),
                }
            } else {
                print!("{}", result.mark());
            }
            summary.record(&name, result);
        }

        println!("\n\n{}", summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_sections() {
        let content = "--TEST--\nhello\n--OPCODES--\n[[\"startProgram\", {\"blockParams\": []}], [\"text\", \"hi\"], [\"endProgram\"]]\n--EXPECT--\nhi\n";
        let test = TestCase::parse(content, "hello.weftt").unwrap();
        assert_eq!(test.name, "hello");
        assert!(matches!(test.run(), TestResult::Pass));
    }

    #[test]
    fn test_update_requires_expectation() {
        let content = "--TEST--\nx\n--OPCODES--\n[]\n--UPDATE--\n{}\n--EXPECT--\n\n";
        let err = TestCase::parse(content, "x.weftt").unwrap_err();
        assert!(err.contains("--EXPECT_UPDATE--"));
    }

    #[test]
    fn test_expected_error_must_occur() {
        let content = "--TEST--\nx\n--OPCODES--\n[[\"startProgram\", {\"blockParams\": []}], [\"endProgram\"]]\n--EXPECT_ERROR--\nboom\n";
        let test = TestCase::parse(content, "x.weftt").unwrap();
        assert!(matches!(test.run(), TestResult::Fail { .. }));
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = TestSummary::default();
        summary.record("a", TestResult::Pass);
        summary.record("b", TestResult::Error("bad".to_string()));
        summary.record("c", TestResult::Skipped("later".to_string()));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failures.len(), 1);
        assert!(!summary.is_success());
    }
}
