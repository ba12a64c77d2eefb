use serde::{Deserialize, Serialize};

/// A language the remote execution service can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSpec {
    pub tag: &'static str,
    pub runtime: &'static str,
    pub version: &'static str,
    pub extension: &'static str,
    pub display_name: &'static str,
}

pub const SUPPORTED_LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        tag: "javascript",
        runtime: "javascript",
        version: "18.15.0",
        extension: "js",
        display_name: "JavaScript",
    },
    LanguageSpec {
        tag: "python",
        runtime: "python",
        version: "3.10.0",
        extension: "py",
        display_name: "Python",
    },
    LanguageSpec {
        tag: "cpp",
        runtime: "c++",
        version: "10.2.0",
        extension: "cpp",
        display_name: "C++",
    },
    LanguageSpec {
        tag: "c",
        runtime: "c",
        version: "10.2.0",
        extension: "c",
        display_name: "C",
    },
    LanguageSpec {
        tag: "java",
        runtime: "java",
        version: "15.0.2",
        extension: "java",
        display_name: "Java",
    },
    LanguageSpec {
        tag: "typescript",
        runtime: "typescript",
        version: "5.0.3",
        extension: "ts",
        display_name: "TypeScript",
    },
    LanguageSpec {
        tag: "go",
        runtime: "go",
        version: "1.16.2",
        extension: "go",
        display_name: "Go",
    },
    LanguageSpec {
        tag: "rust",
        runtime: "rust",
        version: "1.68.2",
        extension: "rs",
        display_name: "Rust",
    },
    LanguageSpec {
        tag: "ruby",
        runtime: "ruby",
        version: "3.0.1",
        extension: "rb",
        display_name: "Ruby",
    },
    LanguageSpec {
        tag: "php",
        runtime: "php",
        version: "8.2.3",
        extension: "php",
        display_name: "PHP",
    },
];

pub fn lookup(tag: &str) -> Option<&'static LanguageSpec> {
    SUPPORTED_LANGUAGES.iter().find(|l| l.tag == tag)
}

/// Runtime entry as reported by `GET /runtimes`, or synthesized from the
/// built-in table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl From<&LanguageSpec> for Language {
    fn from(spec: &LanguageSpec) -> Self {
        Self {
            id: spec.tag.to_string(),
            name: capitalize(spec.tag),
            version: spec.version.to_string(),
            aliases: vec![spec.runtime.to_string()],
        }
    }
}

pub fn builtin_languages() -> Vec<Language> {
    SUPPORTED_LANGUAGES.iter().map(Language::from).collect()
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
