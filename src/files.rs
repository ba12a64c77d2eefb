//! Filename and language helpers shared by the workspace and the CLI.

pub const DEFAULT_LANGUAGE: &str = "javascript";
pub const DEFAULT_FILE_CONTENT: &str = "// Write your code here\n";

const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("javascript", ".js"),
    ("typescript", ".ts"),
    ("python", ".py"),
    ("java", ".java"),
    ("cpp", ".cpp"),
    ("c", ".c"),
    ("csharp", ".cs"),
    ("go", ".go"),
    ("rust", ".rs"),
    ("ruby", ".rb"),
    ("php", ".php"),
    ("html", ".html"),
    ("css", ".css"),
    ("json", ".json"),
    ("xml", ".xml"),
    ("yaml", ".yaml"),
    ("markdown", ".md"),
    ("sql", ".sql"),
    ("shell", ".sh"),
    ("powershell", ".ps1"),
];

const EXTENSION_LANGUAGES: &[(&str, &str)] = &[
    (".js", "javascript"),
    (".jsx", "javascript"),
    (".ts", "typescript"),
    (".tsx", "typescript"),
    (".py", "python"),
    (".java", "java"),
    (".cpp", "cpp"),
    (".cc", "cpp"),
    (".cxx", "cpp"),
    (".c", "c"),
    (".h", "c"),
    (".cs", "csharp"),
    (".go", "go"),
    (".rs", "rust"),
    (".rb", "ruby"),
    (".php", "php"),
    (".html", "html"),
    (".htm", "html"),
    (".css", "css"),
    (".scss", "css"),
    (".sass", "css"),
    (".json", "json"),
    (".xml", "xml"),
    (".yaml", "yaml"),
    (".yml", "yaml"),
    (".md", "markdown"),
    (".sql", "sql"),
    (".sh", "shell"),
    (".bash", "shell"),
    (".ps1", "powershell"),
];

/// Extension (with leading dot) for a language tag, `.txt` when unknown.
pub fn extension_for_language(language: &str) -> &'static str {
    let language = language.to_ascii_lowercase();
    LANGUAGE_EXTENSIONS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, ext)| *ext)
        .unwrap_or(".txt")
}

/// Suffix starting at the last dot, or `None` when the name has no dot or
/// only a leading one.
fn dotted_suffix(filename: &str) -> Option<&str> {
    match filename.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&filename[idx..]),
    }
}

/// Language tag for a filename, falling back to JavaScript.
pub fn language_from_filename(filename: &str) -> &'static str {
    let ext = match filename.rfind('.') {
        Some(idx) => filename[idx..].to_ascii_lowercase(),
        None => return DEFAULT_LANGUAGE,
    };
    EXTENSION_LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or(DEFAULT_LANGUAGE)
}

/// Adds the language's extension when missing, or swaps an extension that
/// belongs to a different language.
pub fn ensure_correct_extension(filename: &str, language: &str) -> String {
    let correct = extension_for_language(language);
    let Some(current) = dotted_suffix(filename) else {
        return format!("{filename}{correct}");
    };
    if language_from_filename(filename) != language {
        let stem = &filename[..filename.len() - current.len()];
        return format!("{stem}{correct}");
    }
    filename.to_string()
}
