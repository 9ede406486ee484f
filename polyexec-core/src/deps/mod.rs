//! Dependency Scanner
//!
//! Best-effort static extraction of imported packages. Nothing is executed
//! and scanning never fails: a line the patterns do not understand is
//! skipped, so `declared_imports` can be a strict subset of the program's
//! real imports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::language::Language;

pub mod go;
pub mod javascript;
pub mod python;

/// Imports found in one piece of source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    /// Every import the scanner recognized
    pub declared_imports: BTreeSet<String>,
    /// `declared_imports` minus the language's standard library
    pub external_imports: BTreeSet<String>,
}

impl DependencySet {
    /// Split `declared` into standard-library and external imports.
    pub fn classify<F>(declared: BTreeSet<String>, is_stdlib: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let external_imports = declared
            .iter()
            .filter(|name| !is_stdlib(name))
            .cloned()
            .collect();
        Self {
            declared_imports: declared,
            external_imports,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.declared_imports.is_empty()
    }
}

/// Scan `source` using the import grammar of `language`.
pub fn scan(language: Language, source: &str) -> DependencySet {
    match language {
        Language::Go => go::scan(source),
        Language::JavaScript => javascript::scan(source),
        Language::Python => python::scan(source),
    }
}
