//! Multi-endpoint round-robin backend pool.
//!
//! A flat list of `(endpoint, credentials, params, is_multimodal)` tuples,
//! selected round-robin with a filter that only considers multimodal-capable
//! backends when the outgoing request carries a non-text attachment.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

/// One backend in the pool.
#[derive(Debug, Clone)]
pub struct Backend {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub is_multimodal: bool,
}

impl Backend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            is_multimodal: false,
        }
    }

    pub fn multimodal(mut self, yes: bool) -> Self {
        self.is_multimodal = yes;
        self
    }
}

/// Round-robin pool over one or more [`Backend`]s, guarded by a single
/// atomic counter.
#[derive(Debug)]
pub struct EndpointPool {
    backends: Vec<Backend>,
    cursor: AtomicUsize,
}

impl Clone for EndpointPool {
    fn clone(&self) -> Self {
        Self {
            backends: self.backends.clone(),
            cursor: AtomicUsize::new(self.cursor.load(Ordering::Relaxed)),
        }
    }
}

impl EndpointPool {
    pub fn new(backends: Vec<Backend>) -> Self {
        Self {
            backends,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn single(backend: Backend) -> Self {
        Self::new(vec![backend])
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Appends `other`'s backends into a new pool (the `+` composition of
    /// two endpoint pools).
    pub fn combine(&self, other: &EndpointPool) -> EndpointPool {
        let mut backends = self.backends.clone();
        backends.extend(other.backends.iter().cloned());
        EndpointPool::new(backends)
    }

    /// Selects the next eligible backend round-robin. When `requires_multimodal`
    /// is set, only multimodal-capable backends are considered; the
    /// round-robin cursor still advances over the full backend list so
    /// selection stays fair across repeated calls.
    pub fn select(&self, requires_multimodal: bool) -> Result<Backend> {
        if self.backends.is_empty() {
            return Err(Error::config("no backends configured in endpoint pool"));
        }

        let eligible: Vec<&Backend> = self
            .backends
            .iter()
            .filter(|b| !requires_multimodal || b.is_multimodal)
            .collect();

        if eligible.is_empty() {
            return Err(Error::other("NoCompatibleBackend: no multimodal-capable backend configured"));
        }

        let n = self.backends.len();
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
        let candidate = &self.backends[idx];
        if !requires_multimodal || candidate.is_multimodal {
            return Ok(candidate.clone());
        }

        // Candidate at the raw round-robin position isn't eligible; fall
        // forward to the next eligible one so selection still progresses.
        for offset in 1..n {
            let candidate = &self.backends[(idx + offset) % n];
            if !requires_multimodal || candidate.is_multimodal {
                return Ok(candidate.clone());
            }
        }
        unreachable!("eligible was non-empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_distributes_evenly() {
        let pool = EndpointPool::new(vec![
            Backend::new("a", "k", "m"),
            Backend::new("b", "k", "m"),
            Backend::new("c", "k", "m"),
        ]);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..9 {
            let b = pool.select(false).unwrap();
            *counts.entry(b.base_url).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), 3);
        for v in counts.values() {
            assert_eq!(*v, 3);
        }
    }

    #[test]
    fn test_multimodal_filter_excludes_text_only_backends() {
        let pool = EndpointPool::new(vec![
            Backend::new("a", "k", "m"),
            Backend::new("b", "k", "m").multimodal(true),
        ]);
        for _ in 0..5 {
            let b = pool.select(true).unwrap();
            assert_eq!(b.base_url, "b");
        }
    }

    #[test]
    fn test_no_compatible_backend_errors() {
        let pool = EndpointPool::new(vec![Backend::new("a", "k", "m")]);
        assert!(pool.select(true).is_err());
    }

    #[test]
    fn test_combine_appends_backends() {
        let a = EndpointPool::single(Backend::new("a", "k", "m"));
        let b = EndpointPool::single(Backend::new("b", "k", "m"));
        let combined = a.combine(&b);
        assert_eq!(combined.backends().len(), 2);
    }
}
