//! Team name resolution against the alias table.
//!
//! The resolver keeps one process-wide cache of aliases and refreshes
//! it synchronously when it goes stale. Lookup never fails: an unknown
//! name comes back verbatim with zero confidence and the caller
//! decides what to do with it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::db::models::AliasEntry;
use crate::ingest::normalize;

/// Time source, injectable so tests can step the cache clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Loads the full alias table. Backed by the database in production.
pub type AliasSource = Arc<dyn Fn() -> anyhow::Result<Vec<AliasEntry>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub canonical: String,
    /// 1.0 exact, (threshold, 1.0) fuzzy, 0.0 unresolved.
    pub confidence: f64,
}

struct CacheState {
    /// Lowercased alias (and canonical) → canonical name.
    by_alias: HashMap<String, String>,
    /// Same pairs sorted by key, so fuzzy ties break deterministically.
    candidates: Vec<(String, String)>,
    loaded_at: Instant,
}

pub struct TeamResolver {
    source: AliasSource,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    threshold: f64,
    cache: RwLock<Option<CacheState>>,
    refresh_lock: Mutex<()>,
}

impl TeamResolver {
    pub fn new(source: AliasSource, clock: Arc<dyn Clock>, ttl: Duration, threshold: f64) -> Self {
        TeamResolver {
            source,
            clock,
            ttl,
            threshold,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Resolves free-form team text to a canonical name.
    ///
    /// Exact alias or canonical hits score 1.0. Otherwise the best
    /// fuzzy candidate at or above the similarity threshold wins with
    /// its similarity as confidence. Anything else comes back as the
    /// trimmed input at confidence 0.0.
    pub async fn resolve(&self, input: &str) -> Resolution {
        let trimmed = normalize::clean_text(input);
        if trimmed.is_empty() {
            return Resolution {
                canonical: trimmed,
                confidence: 0.0,
            };
        }

        self.ensure_fresh().await;

        let key = trimmed.to_lowercase();
        let cache = self.cache.read().await;
        if let Some(state) = cache.as_ref() {
            if let Some(canonical) = state.by_alias.get(&key) {
                return Resolution {
                    canonical: canonical.clone(),
                    confidence: 1.0,
                };
            }
            let mut best: Option<(f64, &String)> = None;
            for (candidate, canonical) in &state.candidates {
                let similarity = strsim::normalized_levenshtein(&key, candidate);
                if best.map_or(true, |(score, _)| similarity > score) {
                    best = Some((similarity, canonical));
                }
            }
            if let Some((similarity, canonical)) = best {
                if similarity >= self.threshold {
                    return Resolution {
                        canonical: canonical.clone(),
                        confidence: similarity,
                    };
                }
            }
        }

        Resolution {
            canonical: trimmed,
            confidence: 0.0,
        }
    }

    /// Drops the cache so the next resolve reloads the alias table.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Refreshes the cache if it is missing or past its TTL. Concurrent
    /// callers coalesce onto a single reload; a failed reload keeps
    /// whatever cache is already there.
    async fn ensure_fresh(&self) {
        if self.is_fresh().await {
            return;
        }
        let _guard = self.refresh_lock.lock().await;
        if self.is_fresh().await {
            return;
        }
        match (self.source)() {
            Ok(entries) => {
                let count = entries.len();
                let state = build_state(entries, self.clock.now());
                *self.cache.write().await = Some(state);
                info!("Alias cache refreshed: {count} entries");
            }
            Err(err) => {
                warn!("Alias table refresh failed, serving stale cache: {err:#}");
            }
        }
    }

    async fn is_fresh(&self) -> bool {
        let cache = self.cache.read().await;
        match cache.as_ref() {
            Some(state) => self.clock.now().duration_since(state.loaded_at) < self.ttl,
            None => false,
        }
    }
}

fn build_state(entries: Vec<AliasEntry>, loaded_at: Instant) -> CacheState {
    let mut by_alias = HashMap::with_capacity(entries.len() * 2);
    for entry in entries {
        by_alias.insert(entry.canonical.to_lowercase(), entry.canonical.clone());
        by_alias.insert(entry.alias.to_lowercase(), entry.canonical);
    }
    let mut candidates: Vec<(String, String)> = by_alias
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    candidates.sort();
    CacheState {
        by_alias,
        candidates,
        loaded_at,
    }
}
