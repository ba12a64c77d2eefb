use std::collections::{HashMap, VecDeque};

use crate::completion::prompt::tail_chars;
use crate::completion::types::{CompletionRequest, CompletionSuggestion};

/// `"{language}:{line}:{column}:{trailing window}"`.
///
/// Only the tail of the buffer takes part, so two buffers that end the same
/// way share an entry.
pub fn cache_key(request: &CompletionRequest, window: usize) -> String {
    format!(
        "{}:{}:{}:{}",
        request.language,
        request.cursor.line,
        request.cursor.column,
        tail_chars(&request.code, window)
    )
}

/// Bounded map evicting in insertion order.
#[derive(Debug)]
pub struct SuggestionCache {
    capacity: usize,
    entries: HashMap<String, Vec<CompletionSuggestion>>,
    order: VecDeque<String>,
}

impl SuggestionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<CompletionSuggestion>> {
        self.entries.get(key).cloned()
    }

    /// Returns the evicted key, if the insert pushed the cache over capacity.
    /// Overwriting an existing key keeps its original position.
    pub fn insert(&mut self, key: String, value: Vec<CompletionSuggestion>) -> Option<String> {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return None;
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        if self.entries.len() > self.capacity {
            let oldest = self.order.pop_front()?;
            self.entries.remove(&oldest);
            return Some(oldest);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
