//! Supported source languages.

use phf::phf_map;
use serde::{Deserialize, Serialize};

/// Alternative spellings accepted in configuration files.
static LANGUAGE_ALIASES: phf::Map<&'static str, Language> = phf_map! {
    "c" => Language::Cpp,
    "c++" => Language::Cpp,
    "c#" => Language::Csharp,
    "typescript" => Language::Javascript,
    "kotlin" => Language::Java,
};

/// A language the engine can build a database for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Language {
    Cpp,
    Csharp,
    Go,
    Java,
    Javascript,
    Python,
    Ruby,
}

impl Language {
    /// Every supported language, in status-report order.
    pub const ALL: [Language; 7] = [
        Language::Cpp,
        Language::Csharp,
        Language::Go,
        Language::Java,
        Language::Javascript,
        Language::Python,
        Language::Ruby,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Csharp => "csharp",
            Language::Go => "go",
            Language::Java => "java",
            Language::Javascript => "javascript",
            Language::Python => "python",
            Language::Ruby => "ruby",
        }
    }

    /// Parse a language name, accepting the canonical names and known aliases.
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        if let Some(lang) = LANGUAGE_ALIASES.get(lower.as_str()) {
            return Some(*lang);
        }
        Language::ALL.iter().copied().find(|l| l.as_str() == lower)
    }

    /// Whether the database must be extracted explicitly, rather than as a
    /// side effect of tracing the user's build.
    ///
    /// Go is only scanned when extraction reconciliation is enabled.
    pub fn is_scanned(&self, go_extraction_reconciliation: bool) -> bool {
        match self {
            Language::Javascript | Language::Python | Language::Ruby => true,
            Language::Go => go_extraction_reconciliation,
            Language::Cpp | Language::Csharp | Language::Java => false,
        }
    }

    /// Whether the database is produced by tracing a build.
    pub fn is_traced(&self, go_extraction_reconciliation: bool) -> bool {
        !self.is_scanned(go_extraction_reconciliation)
    }

    /// File extensions counted towards this language's baseline.
    pub fn extensions(&self) -> &[&'static str] {
        match self {
            Language::Cpp => &["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx"],
            Language::Csharp => &["cs", "cshtml", "razor"],
            Language::Go => &["go"],
            Language::Java => &["java", "kt", "kts"],
            Language::Javascript => &["js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts", "vue"],
            Language::Python => &["py", "pyi"],
            Language::Ruby => &["rb", "erb", "gemspec", "rake"],
        }
    }

    /// Prefixes that mark a whole line as a comment.
    pub fn line_comment_prefixes(&self) -> &[&'static str] {
        match self {
            Language::Python | Language::Ruby => &["#"],
            _ => &["//"],
        }
    }

    /// Delimiters of block comments, if the language has them.
    pub fn block_comment(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Language::Python | Language::Ruby => None,
            _ => Some(("/*", "*/")),
        }
    }

    /// Determine the language from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        Language::ALL
            .iter()
            .copied()
            .find(|l| l.extensions().contains(&ext.as_str()))
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::parse(s).ok_or_else(|| format!("unknown language: {}", s))
    }
}

impl TryFrom<String> for Language {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
