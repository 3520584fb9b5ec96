//! Architecture enforcement tests.
//!
//! Layering rules that keep every file mutation behind the store's lock:
//!
//! 1. **Command handlers** never touch the filesystem or the replace helpers
//!    directly; they only call `PropertyStore` operations
//! 2. **Library code** never installs a tracing subscriber; only the CLI does
//! 3. **Tier files** are only written through `core::ops::replace`

use std::fs;
use std::path::{Path, PathBuf};

/// Every `.rs` file under `dir`, recursively.
fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).unwrap_or_else(|_| panic!("Failed to read {}", dir.display())) {
        let path = entry.expect("Failed to read entry").path();
        if path.is_dir() {
            files.extend(rust_files(&path));
        } else if path.extension().map(|e| e == "rs").unwrap_or(false) {
            files.push(path);
        }
    }
    files
}

/// Source with any `#[cfg(test)]` module cut off.
fn non_test_source(path: &Path) -> String {
    let content =
        fs::read_to_string(path).unwrap_or_else(|_| panic!("Failed to read {}", path.display()));
    match content.find("#[cfg(test)]\nmod tests") {
        Some(idx) => content[..idx].to_string(),
        None => content,
    }
}

#[test]
fn commands_do_not_touch_files_directly() {
    let mut violations = Vec::new();

    for path in rust_files(Path::new("src/cli/commands")) {
        let content = non_test_source(&path);
        for forbidden in ["std::fs", "fs::write", "fs::remove", "ops::replace", "ops::lock"] {
            if content.contains(forbidden) {
                violations.push(format!("{}: uses {}", path.display(), forbidden));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Architecture violations found:\n  {}",
        violations.join("\n  ")
    );
}

#[test]
fn only_cli_installs_subscriber() {
    let mut violations = Vec::new();

    for path in rust_files(Path::new("src")) {
        if path.starts_with("src/cli") || path.ends_with("main.rs") {
            continue;
        }
        if non_test_source(&path).contains("tracing_subscriber") {
            violations.push(path.display().to_string());
        }
    }

    assert!(
        violations.is_empty(),
        "Library modules must not install a subscriber:\n  {}",
        violations.join("\n  ")
    );
}

#[test]
fn tier_files_only_written_through_replace() {
    let mut violations = Vec::new();

    for path in rust_files(Path::new("src/store")) {
        let content = non_test_source(&path);
        if content.contains("fs::write(") {
            violations.push(format!("{}: writes a file directly", path.display()));
        }
    }

    assert!(
        violations.is_empty(),
        "Architecture violations found:\n  {}",
        violations.join("\n  ")
    );
}
