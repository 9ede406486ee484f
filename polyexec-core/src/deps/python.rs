//! Python import scanning: `import a, b.c as d` and `from x.y import z`,
//! including parenthesized `from x import (...)` groups. Only the top-level
//! package is recorded; relative imports are local and skipped.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::DependencySet;

const STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "atexit", "base64",
    "bisect", "builtins", "bz2", "calendar", "cmath", "codecs", "collections", "colorsys",
    "concurrent", "configparser", "contextlib", "contextvars", "copy", "csv", "ctypes",
    "dataclasses", "datetime", "decimal", "difflib", "dis", "email", "enum", "errno",
    "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch", "fractions", "ftplib",
    "functools", "gc", "getopt", "getpass", "gettext", "glob", "graphlib", "gzip", "hashlib",
    "heapq", "hmac", "html", "http", "imaplib", "importlib", "inspect", "io", "ipaddress",
    "itertools", "json", "keyword", "linecache", "locale", "logging", "lzma", "mailbox",
    "marshal", "math", "mimetypes", "mmap", "multiprocessing", "netrc", "numbers",
    "operator", "os", "pathlib", "pdb", "pickle", "pkgutil", "platform", "plistlib",
    "pprint", "profile", "pstats", "pty", "pwd", "queue", "random", "re", "readline",
    "reprlib", "resource", "runpy", "sched", "secrets", "select", "selectors", "shelve",
    "shlex", "shutil", "signal", "site", "smtplib", "socket", "socketserver", "sqlite3",
    "ssl", "stat", "statistics", "string", "struct", "subprocess", "sys", "sysconfig",
    "tarfile", "tempfile", "termios", "textwrap", "threading", "time", "timeit", "tkinter",
    "token", "tokenize", "tomllib", "trace", "traceback", "tracemalloc", "tty", "turtle",
    "types", "typing", "unicodedata", "unittest", "urllib", "uuid", "venv", "warnings",
    "wave", "weakref", "webbrowser", "wsgiref", "xml", "xmlrpc", "zipapp", "zipfile",
    "zipimport", "zlib", "zoneinfo",
];

fn plain_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^import\s+(.+)$").expect("valid import regex"))
}

fn from_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^from\s+([A-Za-z_][\w.]*)\s+import\b").expect("valid from-import regex")
    })
}

fn top_level(module: &str) -> Option<String> {
    let root = module.split('.').next()?.trim();
    let valid = !root.is_empty()
        && root.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !root.starts_with(|c: char| c.is_ascii_digit());
    valid.then(|| root.to_string())
}

pub fn is_stdlib(name: &str) -> bool {
    STDLIB.contains(&name)
}

pub fn scan(source: &str) -> DependencySet {
    let mut declared = BTreeSet::new();

    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            continue;
        }
        // Drop the trailing comment, then scan each `;`-separated statement.
        let code = trimmed.split('#').next().unwrap_or_default();
        for statement in code.split(';').map(str::trim) {
            if let Some(caps) = from_import().captures(statement) {
                if let Some(root) = top_level(&caps[1]) {
                    declared.insert(root);
                }
            } else if let Some(caps) = plain_import().captures(statement) {
                for item in caps[1].split(',') {
                    let module = item.split_whitespace().next().unwrap_or_default();
                    if let Some(root) = top_level(module) {
                        declared.insert(root);
                    }
                }
            }
        }
    }

    DependencySet::classify(declared, is_stdlib)
}
