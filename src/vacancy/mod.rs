//! Regional vacancy lookup: cached feed rows plus address matching.
//!
//! A fetch is split in two so the session loop can run the network call on
//! a background task and still own every state change:
//!
//! 1. `begin(force)` either answers from the cache or issues a `FetchTicket`
//!    carrying a fresh sequence number.
//! 2. `complete(ticket, outcome)` applies the outcome only if the ticket is
//!    still the latest one issued. Stale completions are discarded.
//!
//! `fetch(force)` runs both halves inline for one-shot callers.

pub mod matching;

use crate::models::RegionVacancyRow;
use crate::sources::{LookupError, VacancySource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use self::matching::{auto_match, latest_by_region, period_sort_key, rank_for_address, select_candidates};

// ── Cache ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct VacancyCache {
    rows: Vec<RegionVacancyRow>,
    fetched_at: Option<Instant>,
    ttl: Duration,
}

impl VacancyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            rows: Vec::new(),
            fetched_at: None,
            ttl,
        }
    }

    pub fn fresh(&self, now: Instant) -> Option<&[RegionVacancyRow]> {
        let at = self.fetched_at?;
        if self.rows.is_empty() || now.saturating_duration_since(at) >= self.ttl {
            return None;
        }
        Some(&self.rows)
    }

    /// Empty results never replace a good cache.
    pub fn store(&mut self, rows: &[RegionVacancyRow], now: Instant) {
        if rows.is_empty() {
            return;
        }
        self.rows = rows.to_vec();
        self.fetched_at = Some(now);
    }
}

// ── Sequencing ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: u64,
}

impl RequestSequencer {
    pub fn issue(&mut self) -> FetchTicket {
        self.latest += 1;
        FetchTicket { seq: self.latest }
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.seq == self.latest
    }
}

// ── Lookup ────────────────────────────────────────────────────────────────────

pub enum Begin {
    Cached(Vec<RegionVacancyRow>),
    Fetch(FetchTicket),
}

pub struct VacancyLookup {
    source: Arc<dyn VacancySource>,
    cache: VacancyCache,
    sequencer: RequestSequencer,
}

impl VacancyLookup {
    pub fn new(source: Arc<dyn VacancySource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: VacancyCache::new(ttl),
            sequencer: RequestSequencer::default(),
        }
    }

    pub fn source(&self) -> Arc<dyn VacancySource> {
        Arc::clone(&self.source)
    }

    pub fn begin(&mut self, force: bool, now: Instant) -> Begin {
        if !force {
            if let Some(rows) = self.cache.fresh(now) {
                debug!("Vacancy rows served from cache ({} rows)", rows.len());
                return Begin::Cached(rows.to_vec());
            }
        }
        let ticket = self.sequencer.issue();
        debug!("Vacancy fetch #{} issued (force={})", ticket.seq, force);
        Begin::Fetch(ticket)
    }

    /// `None` when a newer fetch has been issued since `ticket`.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        outcome: Result<Vec<RegionVacancyRow>, LookupError>,
        now: Instant,
    ) -> Option<Result<Vec<RegionVacancyRow>, LookupError>> {
        if !self.sequencer.is_current(ticket) {
            debug!("Discarding stale vacancy fetch #{}", ticket.seq);
            return None;
        }
        match &outcome {
            Ok(rows) if rows.is_empty() => warn!("Vacancy feed returned no rows"),
            Ok(rows) => {
                info!("Vacancy cache refreshed with {} rows", rows.len());
                self.cache.store(rows, now);
            }
            Err(e) => warn!("Vacancy fetch failed: {}", e),
        }
        Some(outcome)
    }

    pub async fn fetch(&mut self, force: bool) -> Result<Vec<RegionVacancyRow>, LookupError> {
        match self.begin(force, Instant::now()) {
            Begin::Cached(rows) => Ok(rows),
            Begin::Fetch(ticket) => {
                let outcome = self.source.fetch_rows().await;
                self.complete(ticket, outcome, Instant::now())
                    .unwrap_or_else(|| Err(LookupError::Worker("superseded".into())))
            }
        }
    }
}
