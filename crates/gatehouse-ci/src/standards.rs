//! Native SDLC standards check for Python sources.
//!
//! This is a line scan, not a parser. It recognises `def`, `class` and
//! `from ... import *` statements outside triple-quoted strings and follows
//! indentation to find where a function body ends. Errors fail the check,
//! warnings are reported only.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;

use crate::check::{Check, Invocation, Workspace};

const SKIP_DIRS: [&str; 7] = [
    ".git",
    "venv",
    ".venv",
    "env",
    "__pycache__",
    "target",
    ".gatehouse",
];

/// Checks Python files under the workspace root against the project standards:
/// snake_case modules and functions, PascalCase classes, docstrings on public
/// definitions, a `src/` package layout, size limits and no wildcard imports.
#[derive(Debug, Clone)]
pub struct StandardsCheck {
    max_file_lines: usize,
    max_function_lines: usize,
}

impl Default for StandardsCheck {
    fn default() -> Self {
        Self {
            max_file_lines: 500,
            max_function_lines: 50,
        }
    }
}

/// Findings of one scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StandardsReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

struct Patterns {
    module_name: Regex,
    function_name: Regex,
    class_name: Regex,
    def: Regex,
    class: Regex,
    wildcard: Regex,
}

impl Patterns {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            module_name: Regex::new(r"^[a-z][a-z0-9_]*$")?,
            function_name: Regex::new(r"^[a-z_][a-z0-9_]*$")?,
            class_name: Regex::new(r"^[A-Z][a-zA-Z0-9]*$")?,
            def: Regex::new(r"^\s*def\s+([A-Za-z_][A-Za-z0-9_]*)")?,
            class: Regex::new(r"^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)")?,
            wildcard: Regex::new(r"^\s*from\s+([\w.]+)\s+import\s+\*")?,
        })
    }
}

impl StandardsCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, max_file_lines: usize, max_function_lines: usize) -> Self {
        self.max_file_lines = max_file_lines;
        self.max_function_lines = max_function_lines;
        self
    }

    /// Scan `root` synchronously.
    pub fn scan(&self, root: &Path) -> anyhow::Result<StandardsReport> {
        let patterns = Patterns::new()?;
        let mut files = Vec::new();
        collect_files(root, &mut files)?;
        files.sort();

        let mut report = StandardsReport::default();
        for path in &files {
            check_file_name(&patterns, root, path, &mut report);
        }
        check_module_structure(root, &mut report)?;
        for path in &files {
            let display = relative(root, path);
            match std::fs::read_to_string(path) {
                Ok(source) => self.check_source(&patterns, &display, &source, &mut report),
                Err(e) => report
                    .warnings
                    .push(format!("{}: could not be read ({})", display, e)),
            }
        }
        Ok(report)
    }

    fn check_source(
        &self,
        patterns: &Patterns,
        display: &str,
        source: &str,
        report: &mut StandardsReport,
    ) {
        let lines = classify(source);

        let line_count = source.split('\n').count();
        if line_count > self.max_file_lines {
            report.warnings.push(format!(
                "{}: has {} lines (limit {}), consider splitting it",
                display, line_count, self.max_file_lines
            ));
        }
        if !has_module_docstring(&lines) {
            report
                .warnings
                .push(format!("{}: missing module docstring", display));
        }

        for (idx, line) in lines.iter().enumerate() {
            if line.in_string {
                continue;
            }
            let at = format!("{}:{}", display, idx + 1);

            if let Some(caps) = patterns.wildcard.captures(line.text) {
                report
                    .errors
                    .push(format!("{}: wildcard import from {}", at, &caps[1]));
            } else if let Some(caps) = patterns.def.captures(line.text) {
                let name = &caps[1];
                if !patterns.function_name.is_match(name) {
                    report
                        .errors
                        .push(format!("{}: function '{}' is not snake_case", at, name));
                }
                let header = header_end(&lines, idx);
                if is_public(name) && !has_docstring(&lines, &header) {
                    report.errors.push(format!(
                        "{}: public function '{}' has no docstring",
                        at, name
                    ));
                }
                let length = function_length(&lines, idx, &header);
                if length > self.max_function_lines {
                    report.warnings.push(format!(
                        "{}: function '{}' is {} lines (limit {}), consider refactoring",
                        at, name, length, self.max_function_lines
                    ));
                }
            } else if let Some(caps) = patterns.class.captures(line.text) {
                let name = &caps[1];
                if !patterns.class_name.is_match(name) {
                    report
                        .errors
                        .push(format!("{}: class '{}' is not PascalCase", at, name));
                }
                let header = header_end(&lines, idx);
                if is_public(name) && !has_docstring(&lines, &header) {
                    report
                        .errors
                        .push(format!("{}: public class '{}' has no docstring", at, name));
                }
            }
        }
    }
}

fn check_file_name(patterns: &Patterns, root: &Path, path: &Path, report: &mut StandardsReport) {
    let stem = match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => stem,
        None => return,
    };
    if stem == "__init__" {
        return;
    }
    let display = relative(root, path);
    if !patterns.module_name.is_match(stem) {
        report
            .errors
            .push(format!("{}: file name is not snake_case", display));
    }
    if stem.starts_with('_') && !stem.starts_with("__") {
        report.warnings.push(format!(
            "{}: starts with underscore (consider making it public)",
            display
        ));
    }
}

fn check_module_structure(root: &Path, report: &mut StandardsReport) -> anyhow::Result<()> {
    let src = root.join("src");
    if !src.is_dir() {
        report
            .errors
            .push("missing 'src' directory for source code".to_string());
        return Ok(());
    }
    let mut packages = Vec::new();
    collect_dirs(&src, &mut packages)?;
    packages.sort();
    for dir in packages {
        if !dir.join("__init__.py").is_file() {
            report
                .warnings
                .push(format!("{}: package has no __init__.py", relative(root, &dir)));
        }
    }
    Ok(())
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn is_skipped(name: &std::ffi::OsStr) -> bool {
    SKIP_DIRS.iter().any(|s| name == *s)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if !is_skipped(&entry.file_name()) {
                collect_files(&path, out)?;
            }
        } else if file_type.is_file() && path.extension().map_or(false, |e| e == "py") {
            out.push(path);
        }
    }
    Ok(())
}

fn collect_dirs(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() && !is_skipped(&entry.file_name()) {
            let path = entry.path();
            collect_dirs(&path, out)?;
            out.push(path);
        }
    }
    Ok(())
}

struct Line<'a> {
    text: &'a str,
    /// Starts inside a triple-quoted string opened on an earlier line.
    in_string: bool,
}

fn classify(source: &str) -> Vec<Line<'_>> {
    let mut open = None;
    source
        .lines()
        .map(|text| {
            let line = Line {
                text,
                in_string: open.is_some(),
            };
            open = open_triple_quote(text, open);
            line
        })
        .collect()
}

/// The triple quote still open at the end of `text`, given the one open at its start.
fn open_triple_quote(text: &str, mut open: Option<char>) -> Option<char> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match open {
            Some(q) => {
                if c == '\\' {
                    i += 2;
                } else if is_triple(&chars, i, q) {
                    open = None;
                    i += 3;
                } else {
                    i += 1;
                }
            }
            None => match c {
                '#' => break,
                '"' | '\'' if is_triple(&chars, i, c) => {
                    open = Some(c);
                    i += 3;
                }
                '"' | '\'' => i = skip_short_string(&chars, i),
                _ => i += 1,
            },
        }
    }
    open
}

fn is_triple(chars: &[char], i: usize, quote: char) -> bool {
    chars.len() >= i + 3 && chars[i..i + 3].iter().all(|&c| c == quote)
}

fn skip_short_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn is_blank_or_comment(line: &Line<'_>) -> bool {
    let trimmed = line.text.trim();
    !line.in_string && (trimmed.is_empty() || trimmed.starts_with('#'))
}

fn indent_of(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

fn is_public(name: &str) -> bool {
    !name.starts_with('_') || name.starts_with("__")
}

/// A string literal that can serve as a docstring (`r`/`u` prefixes allowed).
fn starts_with_string(text: &str) -> bool {
    let unprefixed = text.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U'));
    text.len() - unprefixed.len() <= 2 && unprefixed.starts_with(|c: char| c == '"' || c == '\'')
}

fn has_module_docstring(lines: &[Line<'_>]) -> bool {
    lines
        .iter()
        .find(|l| !is_blank_or_comment(l))
        .map_or(false, |l| starts_with_string(l.text.trim_start()))
}

/// End of a `def`/`class` header: the line holding its closing colon and the
/// code after that colon when the body sits on the same line.
struct Header<'a> {
    line: usize,
    inline_body: &'a str,
}

fn header_end<'a>(lines: &[Line<'a>], start: usize) -> Header<'a> {
    let mut depth = 0i32;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        let text = line.text;
        let mut quote: Option<char> = None;
        let mut chars = text.char_indices();
        while let Some((pos, c)) = chars.next() {
            if let Some(q) = quote {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '#' => break,
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ':' if depth <= 0 => {
                    let rest = text[pos + 1..].trim();
                    return Header {
                        line: idx,
                        inline_body: if rest.starts_with('#') { "" } else { rest },
                    };
                }
                _ => {}
            }
        }
    }
    Header {
        line: start,
        inline_body: "",
    }
}

fn has_docstring(lines: &[Line<'_>], header: &Header<'_>) -> bool {
    if !header.inline_body.is_empty() {
        return starts_with_string(header.inline_body);
    }
    lines[header.line + 1..]
        .iter()
        .find(|l| !is_blank_or_comment(l))
        .map_or(false, |l| starts_with_string(l.text.trim_start()))
}

/// Lines from the `def` to the last line of its body. Trailing blank and
/// comment lines are not part of the body.
fn function_length(lines: &[Line<'_>], start: usize, header: &Header<'_>) -> usize {
    if !header.inline_body.is_empty() {
        return header.line - start + 1;
    }
    let indent = indent_of(lines[start].text);
    let mut end = header.line;
    for (idx, line) in lines.iter().enumerate().skip(header.line + 1) {
        if line.in_string {
            end = idx;
            continue;
        }
        if is_blank_or_comment(line) {
            continue;
        }
        if indent_of(line.text) <= indent {
            break;
        }
        end = idx;
    }
    end - start + 1
}

#[async_trait]
impl Check for StandardsCheck {
    fn describe(&self) -> String {
        "SDLC standards (naming, docstrings, layout, size, imports)".to_string()
    }

    async fn invoke(&self, workspace: &Workspace) -> anyhow::Result<Invocation> {
        let start = Instant::now();
        let this = self.clone();
        let root = workspace.root().to_path_buf();
        let report = tokio::task::spawn_blocking(move || this.scan(&root)).await??;

        let mut stdout = String::new();
        for e in &report.errors {
            stdout.push_str(&format!("ERROR: {}\n", e));
        }
        for w in &report.warnings {
            stdout.push_str(&format!("WARNING: {}\n", w));
        }

        Ok(Invocation {
            exit_code: if report.errors.is_empty() { 0 } else { 1 },
            stdout,
            stderr: String::new(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DOCUMENTED: &str = "\"\"\"Calculator.\"\"\"\n\n\ndef add(a, b):\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n";

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/__init__.py", "\"\"\"Package.\"\"\"\n");
        dir
    }

    fn scan_one(rel: &str, contents: &str) -> StandardsReport {
        let dir = project();
        write(dir.path(), rel, contents);
        StandardsCheck::new().scan(dir.path()).unwrap()
    }

    #[test]
    fn test_conforming_project_passes() {
        let dir = project();
        write(dir.path(), "src/calculator.py", DOCUMENTED);
        write(dir.path(), "tests/test_calculator.py", DOCUMENTED);
        let report = StandardsCheck::new().scan(dir.path()).unwrap();
        assert_eq!(report, StandardsReport::default());
    }

    #[test]
    fn test_camel_case_file_is_an_error() {
        let dir = project();
        write(dir.path(), "src/MyModule.py", DOCUMENTED);
        write(dir.path(), "src/notes.txt", "NotPython");
        let report = StandardsCheck::new().scan(dir.path()).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("MyModule.py"));
    }

    #[test]
    fn test_leading_underscore_file_is_error_and_warning() {
        let report = scan_one("src/_helpers.py", DOCUMENTED);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("_helpers.py"));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("underscore"));
    }

    #[test]
    fn test_missing_src_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lib/calculator.py", DOCUMENTED);
        let report = StandardsCheck::new().scan(dir.path()).unwrap();
        assert_eq!(
            report.errors,
            vec!["missing 'src' directory for source code".to_string()]
        );
    }

    #[test]
    fn test_package_without_init_warns() {
        let report = scan_one("src/engine/core.py", DOCUMENTED);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("src/engine: package has no __init__.py"));
    }

    #[test]
    fn test_function_and_class_names() {
        let source = "\"\"\"Orders.\"\"\"\n\n\
                      def calculateTotal():\n    \"\"\"Sum.\"\"\"\n    return 1\n\n\
                      def _private_helper():\n    return 2\n\n\
                      class order_line:\n    \"\"\"A line.\"\"\"\n\n\
                      class HTTPClient:\n    \"\"\"A client.\"\"\"\n";
        let report = scan_one("src/orders.py", source);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors[0].contains("function 'calculateTotal' is not snake_case"));
        assert!(report.errors[1].contains("class 'order_line' is not PascalCase"));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_public_definitions_need_docstrings() {
        let source = "\"\"\"Ledger.\"\"\"\n\n\
                      def total(): return 1\n\n\
                      def inline(): \"\"\"Documented inline.\"\"\"\n\n\
                      def documented(\n    a,\n    b,\n) -> int:\n    # leading comment\n    r\"\"\"Raw docstring.\"\"\"\n    return a\n\n\
                      def _helper():\n    return 2\n\n\
                      class Ledger:\n    pass\n\n\
                      class Entry:\n    \"\"\"An entry.\"\"\"\n\n    def __repr__(self):\n        return 'entry'\n";
        let report = scan_one("src/ledger.py", source);
        assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
        assert!(report.errors[0].contains(":3: public function 'total'"));
        assert!(report.errors[1].contains("public class 'Ledger'"));
        assert!(report.errors[2].contains("public function '__repr__'"));
    }

    #[test]
    fn test_missing_module_docstring_warns() {
        let report = scan_one("src/tools.py", "# tools\nimport os\n");
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("missing module docstring"));

        let report = scan_one(
            "src/cli.py",
            "#!/usr/bin/env python\n\n\"\"\"Entry point.\"\"\"\nimport sys\n",
        );
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_long_functions_warn() {
        let mut source = String::from(
            "\"\"\"Module.\"\"\"\n\n\n\
             def long_one():\n    \"\"\"Doc.\"\"\"\n    text = \"\"\"\n\
             def NotReal():\n\
             second\n\
             \"\"\"\n    x = 0\n",
        );
        source.push_str(&"    x += 1\n".repeat(44));
        source.push_str("    return x\n\n\ndef short():\n    \"\"\"Doc.\"\"\"\n    return 1\n");

        let report = scan_one("src/lengthy.py", &source);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
        assert!(report.warnings[0].contains("function 'long_one' is 52 lines"));

        let dir = project();
        write(dir.path(), "src/lengthy.py", &source);
        let report = StandardsCheck::new()
            .with_limits(500, 60)
            .scan(dir.path())
            .unwrap();
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_oversized_file_warns() {
        let mut source = String::from("\"\"\"Big.\"\"\"\n");
        source.push_str(&"x = 1\n".repeat(500));
        let report = scan_one("src/big.py", &source);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("has 502 lines"));
    }

    #[test]
    fn test_wildcard_import_is_an_error() {
        let report = scan_one(
            "src/paths.py",
            "\"\"\"Paths.\"\"\"\nfrom os.path import *\nfrom os import path\n",
        );
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("src/paths.py:2: wildcard import from os.path"));
    }

    #[test]
    fn test_skips_virtualenv_and_vcs_dirs() {
        let dir = project();
        write(dir.path(), ".venv/lib/BadName.py", "x = 1\n");
        write(dir.path(), "venv/BadName.py", "x = 1\n");
        write(dir.path(), ".git/hooks/BadName.py", "x = 1\n");
        write(dir.path(), "src/__pycache__/BadName.py", "x = 1\n");
        let report = StandardsCheck::new().scan(dir.path()).unwrap();
        assert_eq!(report, StandardsReport::default());
    }

    #[tokio::test]
    async fn test_invoke_maps_errors_to_exit_code() {
        let dir = project();
        write(dir.path(), "src/BadName.py", DOCUMENTED);
        let inv = StandardsCheck::new()
            .invoke(&Workspace::new(dir.path()))
            .await
            .unwrap();
        assert_eq!(inv.exit_code, 1);
        assert!(inv.stdout.starts_with("ERROR: "));
    }
}
