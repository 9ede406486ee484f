//! Closed language set and the family classification that drives timeout
//! and build-step policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Classification of a language by how its source becomes a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LanguageFamily {
    /// A build step produces a native binary which is then run.
    CompiledNative,
    /// A server-side scripting runtime interprets the source directly.
    InterpretedDynamic,
    /// A general-purpose scripting interpreter runs the source directly.
    InterpretedScripting,
}

impl LanguageFamily {
    /// Directory name used for this family's scratch subtree.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::CompiledNative => "compiled-native",
            Self::InterpretedDynamic => "interpreted-dynamic",
            Self::InterpretedScripting => "interpreted-scripting",
        }
    }

    pub fn has_build_step(self) -> bool {
        matches!(self, Self::CompiledNative)
    }
}

impl fmt::Display for LanguageFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Languages the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    JavaScript,
    Python,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Go, Language::JavaScript, Language::Python];

    pub fn family(self) -> LanguageFamily {
        match self {
            Self::Go => LanguageFamily::CompiledNative,
            Self::JavaScript => LanguageFamily::InterpretedDynamic,
            Self::Python => LanguageFamily::InterpretedScripting,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::JavaScript => "javascript",
            Self::Python => "python",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = EngineError;

    /// Accepts product names and family names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "go" | "golang" | "compiled-native" => Ok(Self::Go),
            "javascript" | "js" | "node" | "nodejs" | "interpreted-dynamic" => {
                Ok(Self::JavaScript)
            }
            "python" | "py" | "python3" | "interpreted-scripting" => Ok(Self::Python),
            _ => Err(EngineError::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// Module resolution mode for the interpreted-dynamic family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleMode {
    /// ES modules: `.mjs` source plus a `{"type":"module"}` manifest.
    #[default]
    Module,
    /// CommonJS: plain `.js` source, no manifest.
    CommonJs,
}

impl FromStr for ModuleMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "module" | "esm" => Ok(Self::Module),
            "commonjs" | "cjs" => Ok(Self::CommonJs),
            other => Err(EngineError::Setup(format!("unknown module mode '{other}'"))),
        }
    }
}
