//! AI code completion with a bounded result cache and coalescing of
//! identical in-flight requests.

mod cache;
mod client;
mod prompt;
pub mod types;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use cache::{SuggestionCache, cache_key};
pub use client::{CompletionBackend, OpenAIClient};
pub use types::{CompletionRequest, CompletionSuggestion, CursorPosition};

type PendingCompletion = Shared<BoxFuture<'static, Vec<CompletionSuggestion>>>;

struct CacheState {
    results: SuggestionCache,
    in_flight: HashMap<String, PendingCompletion>,
}

#[derive(Clone)]
pub struct CompletionService {
    backend: Arc<dyn CompletionBackend>,
    state: Arc<Mutex<CacheState>>,
    key_window: usize,
}

impl CompletionService {
    pub fn new(backend: Arc<dyn CompletionBackend>, capacity: usize, key_window: usize) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(CacheState {
                results: SuggestionCache::new(capacity),
                in_flight: HashMap::new(),
            })),
            key_window,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    pub async fn get_completions(&self, request: CompletionRequest) -> Vec<CompletionSuggestion> {
        if !self.backend.is_configured() {
            warn!("completion API key not configured; skipping request");
            return Vec::new();
        }

        let key = cache_key(&request, self.key_window);
        let pending = {
            let mut state = lock(&self.state);
            if let Some(hit) = state.results.get(&key) {
                debug!(cache_size = state.results.len(), "completion cache hit");
                return hit;
            }
            if let Some(pending) = state.in_flight.get(&key) {
                debug!("joining in-flight completion request");
                pending.clone()
            } else {
                let pending = self.start_request(key.clone(), request);
                state.in_flight.insert(key, pending.clone());
                pending
            }
        };
        pending.await
    }

    /// The returned future settles the cache itself, so the bookkeeping runs
    /// exactly once no matter how many callers await it.
    fn start_request(&self, key: String, request: CompletionRequest) -> PendingCompletion {
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        async move {
            let suggestions = backend.fetch(&request).await;
            let mut state = lock(&state);
            state.in_flight.remove(&key);
            if let Some(evicted) = state.results.insert(key, suggestions.clone()) {
                debug!(evicted = %evicted.chars().take(40).collect::<String>(), "completion cache evicted oldest entry");
            }
            suggestions
        }
        .boxed()
        .shared()
    }

    pub fn clear_cache(&self) {
        lock(&self.state).results.clear();
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
