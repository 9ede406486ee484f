//! Go import scanning.
//!
//! Handles single-line imports and grouped `import ( ... )` blocks. The block
//! parser tracks whether it is inside a group line by line until it sees the
//! closing parenthesis, or a line that cannot be an import spec.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::DependencySet;

/// Top-level standard library roots.
const STDLIB_ROOTS: &[&str] = &[
    "archive", "bufio", "builtin", "bytes", "cmp", "compress", "container", "context",
    "crypto", "database", "debug", "embed", "encoding", "errors", "expvar", "flag", "fmt",
    "go", "hash", "html", "image", "index", "io", "iter", "log", "maps", "math", "mime",
    "net", "os", "path", "plugin", "reflect", "regexp", "runtime", "slices", "sort",
    "strconv", "strings", "sync", "syscall", "testing", "text", "time", "unicode", "unique",
    "unsafe", "C",
];

fn single_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^import\s+(?:[\w.]+\s+)?"([^"]+)""#).expect("valid single-line import regex")
    })
}

fn block_entry() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(?:[\w.]+\s+)?"([^"]+)""#).expect("valid import block regex")
    })
}

pub fn is_stdlib(path: &str) -> bool {
    if path.starts_with('.') || path.starts_with("internal/") {
        return true;
    }
    let root = path.split('/').next().unwrap_or(path);
    // Module paths start with a domain; the standard library never does.
    !root.contains('.') && STDLIB_ROOTS.contains(&root)
}

pub fn scan(source: &str) -> DependencySet {
    let mut declared = BTreeSet::new();
    let mut in_block = false;

    for line in source.lines() {
        let trimmed = line.trim();

        if in_block {
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }
            match block_entry().captures(trimmed) {
                Some(caps) => {
                    declared.insert(caps[1].to_string());
                    // `"os")` closes the group on the entry's own line.
                    let rest = &trimmed[caps.get(0).map_or(0, |m| m.end())..];
                    let rest = rest.split("//").next().unwrap_or(rest);
                    if rest.contains(')') {
                        in_block = false;
                    }
                }
                // `)` or anything that is not an import spec ends the group.
                None => in_block = false,
            }
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("import") {
            let rest = rest.trim_start();
            if let Some(group) = rest.strip_prefix('(') {
                // `import ( "fmt" )` on one line, or the opening of a block.
                let group = group.trim();
                match group.find(')') {
                    Some(end) => {
                        for entry in group[..end].split(';') {
                            if let Some(caps) = block_entry().captures(entry.trim()) {
                                declared.insert(caps[1].to_string());
                            }
                        }
                    }
                    None => {
                        if let Some(caps) = block_entry().captures(group) {
                            declared.insert(caps[1].to_string());
                        }
                        in_block = true;
                    }
                }
                continue;
            }
        }

        if let Some(caps) = single_line().captures(trimmed) {
            declared.insert(caps[1].to_string());
        }
    }

    DependencySet::classify(declared, is_stdlib)
}
