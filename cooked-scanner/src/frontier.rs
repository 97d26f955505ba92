//! Random-order frontier exploration of a single site.
//!
//! The explorer keeps three sets of canonical URLs: `candidates`
//! (discovered, not fetched), `visited` (fetch attempted) and `results`
//! (fetched as internal HTML). Candidates are drawn uniformly at random,
//! which spreads exploration across the site instead of walking one path.
//!
//! Invariants, held after every step:
//! - `visited ∩ candidates = ∅`
//! - `results ⊆ visited`

use crate::browser::PageFetcher;
use crate::normalize::{canonicalize, normalize, same_host};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Default)]
pub struct Frontier {
    candidates: Vec<Url>,
    candidate_set: HashSet<Url>,
    visited: HashSet<Url>,
    results: Vec<Url>,
    result_set: HashSet<Url>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frontier whose only candidate is `start`.
    pub fn seeded(start: Url) -> Self {
        let mut frontier = Self::new();
        frontier.offer(start);
        frontier
    }

    /// Add a candidate unless it was already visited or is already queued.
    pub fn offer(&mut self, url: Url) -> bool {
        if self.visited.contains(&url) || self.candidate_set.contains(&url) {
            return false;
        }
        self.candidate_set.insert(url.clone());
        self.candidates.push(url);
        true
    }

    /// Remove and return a uniformly random candidate.
    pub fn pop_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Url> {
        if self.candidates.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.candidates.len());
        let url = self.candidates.swap_remove(index);
        self.candidate_set.remove(&url);
        Some(url)
    }

    /// Returns false when `url` had already been visited.
    pub fn mark_visited(&mut self, url: &Url) -> bool {
        self.visited.insert(url.clone())
    }

    /// Record a successful internal HTML fetch. The URL must be visited.
    pub fn record_result(&mut self, url: Url) {
        debug_assert!(self.visited.contains(&url));
        if self.result_set.insert(url.clone()) {
            self.results.push(url);
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn is_candidate(&self, url: &Url) -> bool {
        self.candidate_set.contains(url)
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(url)
    }

    pub fn results(&self) -> &[Url] {
        &self.results
    }

    pub fn into_results(self) -> Vec<Url> {
        self.results
    }

    /// Check the set invariants; returns a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if let Some(url) = self.candidates.iter().find(|u| self.visited.contains(*u)) {
            return Err(format!("{} is both a candidate and visited", url));
        }
        if let Some(url) = self.results.iter().find(|u| !self.visited.contains(*u)) {
            return Err(format!("{} is a result but was never visited", url));
        }
        if self.candidates.len() != self.candidate_set.len() {
            return Err("candidate list holds duplicates".to_string());
        }
        Ok(())
    }
}

/// Observer invoked after every explorer step, mainly for tests and progress.
pub type StepObserver = Box<dyn FnMut(&Frontier) + Send>;

pub struct Explorer<'a, F, R = StdRng> {
    fetcher: &'a F,
    rng: R,
    observer: Option<StepObserver>,
}

impl<'a, F: PageFetcher> Explorer<'a, F, StdRng> {
    pub fn new(fetcher: &'a F) -> Self {
        Self::with_rng(fetcher, StdRng::from_os_rng())
    }

    pub fn seeded(fetcher: &'a F, seed: u64) -> Self {
        Self::with_rng(fetcher, StdRng::seed_from_u64(seed))
    }
}

impl<'a, F: PageFetcher, R: Rng> Explorer<'a, F, R> {
    pub fn with_rng(fetcher: &'a F, rng: R) -> Self {
        Self {
            fetcher,
            rng,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: StepObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Discover up to `target` internal HTML pages reachable from `start`.
    ///
    /// Returns fewer than `target` URLs only when the frontier runs dry.
    pub async fn explore(&mut self, start: &Url, target: usize) -> Vec<Url> {
        let start = canonicalize(start.clone());
        info!("Exploring {} for up to {} pages", start, target);

        let mut frontier = Frontier::seeded(start.clone());

        while frontier.result_count() < target {
            let Some(candidate) = frontier.pop_random(&mut self.rng) else {
                break;
            };

            if !frontier.mark_visited(&candidate) {
                continue;
            }

            match self.fetcher.fetch_page(&candidate).await {
                Ok(page) => {
                    let mut discovered = 0;
                    for href in page.links() {
                        match normalize(&href, Some(&candidate)) {
                            Ok(link) if same_host(&link, &start) => {
                                if frontier.offer(link) {
                                    discovered += 1;
                                }
                            }
                            Ok(link) => debug!("  -> External link {}, skipping", link),
                            Err(e) => debug!("  -> {}", e),
                        }
                    }
                    debug!(
                        "{} yielded {} new candidates in {:?}",
                        candidate, discovered, page.response_time
                    );
                    frontier.record_result(candidate);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", candidate, e);
                }
            }

            if let Some(observer) = self.observer.as_mut() {
                observer(&frontier);
            }
        }

        info!(
            "Explored {}: {} pages from {} visited",
            start,
            frontier.result_count(),
            frontier.visited_count()
        );
        frontier.into_results()
    }
}
