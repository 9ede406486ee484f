//! JavaScript import scanning: `require()`, `import ... from`, re-exports,
//! dynamic `import()`, and `import { ... }` blocks spread over several lines.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::DependencySet;

const BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http",
    "http2", "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process",
    "punycode", "querystring", "readline", "repl", "stream", "string_decoder", "sys",
    "test", "timers", "tls", "trace_events", "tty", "url", "util", "v8", "vm", "wasi",
    "worker_threads", "zlib",
];

fn static_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(?:import|export)\s*(?:[\w*{}\s,$]+?\s*from\s*)?['"]([^'"]+)['"]"#)
            .expect("valid static import regex")
    })
}

fn call_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(?:require|import)\(\s*['"]([^'"]+)['"]\s*\)"#)
            .expect("valid require regex")
    })
}

/// `import {` / `export type {` left open at the end of the line.
fn block_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(?:import|export)\s+(?:type\s+)?[\w$,\s*]*\{"#)
            .expect("valid block open regex")
    })
}

fn block_close() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bfrom\s*['"]([^'"]+)['"]"#).expect("valid block close regex")
    })
}

/// Reduce a specifier to its package name; `None` for relative paths.
/// Object literals (`export default {`, `export const cfg = {`) are not
/// binding lists.
fn opens_block(line: &str) -> bool {
    let Some(m) = block_open().find(line) else {
        return false;
    };
    let head = &line[..m.end()];
    !line.contains('}')
        && !head.contains('=')
        && !head.contains('(')
        && !head.split_whitespace().any(|word| word == "default")
        && !line[m.end()..].contains(['=', '('])
}

fn package_name(specifier: &str) -> Option<String> {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.is_empty() {
        return None;
    }
    let mut parts = specifier.split('/');
    let first = parts.next()?;
    if first.starts_with('@') {
        let name = parts.next()?;
        return Some(format!("{first}/{name}"));
    }
    Some(first.to_string())
}

pub fn is_stdlib(name: &str) -> bool {
    name.starts_with("node:") || BUILTINS.contains(&name)
}

pub fn scan(source: &str) -> DependencySet {
    let mut declared = BTreeSet::new();
    let mut add = |specifier: &str| {
        if let Some(name) = package_name(specifier) {
            declared.insert(name);
        }
    };
    let mut in_block = false;

    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*") {
            continue;
        }

        if in_block {
            if let Some(caps) = block_close().captures(trimmed) {
                add(&caps[1]);
                in_block = false;
            } else if trimmed.contains([';', '}']) {
                // Statement ended without a `from`; give up on this block.
                in_block = false;
            }
        } else if let Some(caps) = static_import().captures(trimmed) {
            add(&caps[1]);
        } else if opens_block(trimmed) {
            in_block = true;
        }

        for caps in call_import().captures_iter(trimmed) {
            add(&caps[1]);
        }
    }

    DependencySet::classify(declared, is_stdlib)
}
