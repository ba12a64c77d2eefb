use regex::Regex;
use std::sync::LazyLock;

use crate::completion::types::{
    ChatMessage, ChatRequest, ChatResponse, CompletionSuggestion, CursorPosition,
};
use crate::config::CompletionConfig;

pub const CURSOR_MARKER: char = '█';

const SYSTEM_PROMPT: &str = "You are an expert code completion assistant. Provide concise, accurate code suggestions. Return only the completion text without explanations.";

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```\w*\n?").expect("static fence regex"));

/// Last `n` characters of `s` (whole string when shorter).
pub fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

pub fn build_prompt(context: &str, language: &str, _cursor: CursorPosition) -> String {
    format!(
        "Complete the following {language} code. Provide only the next logical code completion:\n\n```{language}\n{context}{CURSOR_MARKER}\n```\n\nProvide 1-3 short, relevant completions for the cursor position (marked with {CURSOR_MARKER}). Return only the completion text."
    )
}

pub fn build_chat_request(
    cfg: &CompletionConfig,
    code: &str,
    language: &str,
    cursor: CursorPosition,
) -> ChatRequest {
    let context = tail_chars(code, cfg.context_window);
    ChatRequest {
        model: cfg.model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".into(),
                content: SYSTEM_PROMPT.into(),
            },
            ChatMessage {
                role: "user".into(),
                content: build_prompt(context, language, cursor),
            },
        ],
        max_tokens: cfg.max_tokens,
        temperature: cfg.temperature,
        n: cfg.suggestions,
        stop: vec!["\n\n".into(), "```".into()],
    }
}

/// Strips fences and explanatory lines; returns an empty string when nothing
/// code-like is left.
pub fn clean_completion_text(text: &str) -> String {
    let text = CODE_FENCE_RE.replace_all(text, "");
    text.trim()
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            let lower = trimmed.to_lowercase();
            !trimmed.is_empty()
                && !trimmed.starts_with("//")
                && !trimmed.starts_with('#')
                && !trimmed.starts_with("/*")
                && !lower.starts_with("explanation:")
                && !lower.starts_with("note:")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

pub fn parse_suggestions(response: ChatResponse, language: &str) -> Vec<CompletionSuggestion> {
    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.and_then(|m| m.content))
        .map(|content| clean_completion_text(content.trim()))
        .filter(|text| !text.is_empty())
        .map(|text| CompletionSuggestion::ai(text, language))
        .collect()
}
