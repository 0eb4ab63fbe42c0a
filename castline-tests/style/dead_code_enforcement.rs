//! Dead Code Enforcement
//!
//! Production sources of the workspace crates must not silence the dead code
//! lint. Unused code is either removed or put to use; test code is exempt.

use std::fs;
use std::path::{Path, PathBuf};

/// Prefix shared by every crate directory in the workspace.
const CRATE_PREFIX: &str = "castline";

/// A dead code allowance found in production code
#[derive(Debug)]
struct DeadCodeViolation {
    file_path: PathBuf,
    line_number: usize,
    context: String,
}

/// Returns `(line_number, line)` for every attribute allowing dead code.
fn find_allowances(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
        })
        .map(|(index, line)| (index + 1, line))
        .collect()
}

/// Whether a source file only builds for tests.
fn is_test_source(path: &Path) -> bool {
    let path_str = path.to_string_lossy().replace('\\', "/");
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    path_str.contains("/tests/")
        || path_str.contains("castline-tests/")
        || file_name.starts_with("test_")
        || file_name.ends_with("_test.rs")
        || file_name.ends_with("tests.rs")
}

fn collect_rust_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden_or_build = path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with('.') || name == "target")
            .unwrap_or(false);
        if hidden_or_build {
            continue;
        }

        if path.is_dir() {
            collect_rust_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    Ok(())
}

/// Production sources of every workspace crate under `workspace_root`.
fn workspace_sources(workspace_root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(workspace_root)? {
        let path = entry?.path();
        let is_crate = path.is_dir()
            && path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(CRATE_PREFIX));
        if is_crate {
            collect_rust_files(&path, &mut files)?;
        }
    }
    files.retain(|path| !is_test_source(path));
    Ok(files)
}

fn check_workspace(workspace_root: &Path) -> std::io::Result<(usize, Vec<DeadCodeViolation>)> {
    let files = workspace_sources(workspace_root)?;
    let mut violations = Vec::new();

    for path in &files {
        let content = fs::read_to_string(path)?;
        for (line_number, line) in find_allowances(&content) {
            violations.push(DeadCodeViolation {
                file_path: path.clone(),
                line_number,
                context: line.trim().to_string(),
            });
        }
    }

    Ok((files.len(), violations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_test_source() {
        assert!(is_test_source(Path::new(
            "../castline-core/src/locator/test_fixtures.rs"
        )));
        assert!(is_test_source(Path::new("../castline-tests/integration.rs")));
        assert!(is_test_source(Path::new("../castline-web/tests/router.rs")));

        assert!(!is_test_source(Path::new("../castline-web/src/router.rs")));
        assert!(!is_test_source(Path::new("../castline-core/src/registry.rs")));
    }

    #[test]
    fn test_dead_code_detection() {
        let content = r#"
use std::collections::HashMap;

#[allow(dead_code)]
struct UnusedStruct {
    field: u32,
}

#[allow(clippy::missing_docs, dead_code)]
fn unused_function() {}

// #[allow(dead_code)] in a comment is fine
"#;

        let found = find_allowances(content);
        let lines: Vec<usize> = found.iter().map(|(line, _)| *line).collect();
        assert_eq!(lines, vec![4, 9]);
    }

    #[test]
    fn dead_code_enforcement() {
        // Integration tests run from the package directory
        let (files_checked, violations) =
            check_workspace(Path::new("..")).expect("Failed to scan workspace");

        for violation in &violations {
            println!(
                "{}:{}\n  {}",
                violation.file_path.display(),
                violation.line_number,
                violation.context
            );
        }

        assert!(files_checked > 0, "no production sources found");
        assert!(
            violations.is_empty(),
            "{} dead code allowance(s) in production code, see output above",
            violations.len()
        );
    }
}
