//! CLI output formatting.
//!
//! Output is a content inventory: one header line per source entry, in scan
//! order, naming where it goes, with indented context lines underneath.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! 001 blog/
//! 002 blog/first-post.md → blog/first-post.html
//!     Chain: markdown → layout
//! 003 index.css → index.css
//!     Chain: css-minify
//! 004 public/favicon.svg → public/favicon.svg
//!     Passthrough
//! ```
//!
//! ## Build / Check
//!
//! ```text
//! 001 blog/first-post.md → blog/first-post.html
//! 002 index.css → index.css
//!
//! Errors
//!     about.md: reference to 'missing.css' does not match any source file
//!
//! Built 2 files, 1 error in 2 waves
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::classify::Disposition;
use crate::engine::{BuildResult, Plan};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// `source → output`, or just the source when nothing is renamed.
fn mapping_line(index: usize, identity: &str, output: &str, is_dir: bool) -> String {
    if is_dir {
        format!("{} {}/", format_index(index), identity)
    } else {
        format!("{} {} → {}", format_index(index), identity, output)
    }
}

// ============================================================================
// Plan
// ============================================================================

pub fn format_plan(plan: &Plan) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, task) in plan.tasks().iter().enumerate() {
        let c = task.classification();
        let is_dir = c.disposition == Disposition::Directory;
        lines.push(mapping_line(i + 1, task.identity(), &c.output_path, is_dir));
        match c.disposition {
            Disposition::Directory => {}
            Disposition::Passthrough => lines.push(format!("{}Passthrough", indent(1))),
            Disposition::Transform if c.transformers.is_empty() => {
                lines.push(format!("{}Copied verbatim", indent(1)))
            }
            Disposition::Transform => lines.push(format!(
                "{}Chain: {}",
                indent(1),
                c.identities().join(" → ")
            )),
        }
        if task.is_failed() {
            lines.push(format!("{}Unreadable", indent(1)));
        }
    }
    for error in plan.errors() {
        lines.push(format!("{}{}", indent(1), error));
    }
    lines
}

pub fn print_plan(plan: &Plan) {
    for line in format_plan(plan) {
        println!("{}", line);
    }
}

// ============================================================================
// Build
// ============================================================================

/// Format a finished build. `wrote` distinguishes `build` from `check`.
pub fn format_build_result(result: &BuildResult, wrote: bool) -> Vec<String> {
    let mut lines = Vec::new();
    let files = result.artifacts.iter().filter(|a| !a.is_dir());
    for (i, artifact) in files.enumerate() {
        lines.push(mapping_line(
            i + 1,
            &artifact.identity,
            &artifact.output_path,
            false,
        ));
    }

    if !result.errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors".to_string());
        for error in &result.errors {
            lines.push(format!("{}{}", indent(1), error));
        }
    }

    let file_count = result.artifacts.iter().filter(|a| !a.is_dir()).count();
    let verb = if wrote { "Built" } else { "Checked" };
    let mut summary = format!("{verb} {}", plural(file_count, "file"));
    if result.stats.verbatim > 0 {
        summary.push_str(&format!(" ({} verbatim)", result.stats.verbatim));
    }
    summary.push_str(&format!(
        ", {} in {}",
        plural(result.errors.len(), "error"),
        plural(result.stats.waves, "wave")
    ));

    lines.push(String::new());
    lines.push(summary);
    lines
}

pub fn print_build_result(result: &BuildResult, wrote: bool) {
    for line in format_build_result(result, wrote) {
        println!("{}", line);
    }
}
