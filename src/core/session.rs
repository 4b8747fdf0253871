use crate::config::{MatchConfig, VectorTables};
use crate::core::accumulator::TraitAccumulator;
use crate::core::events::Observers;
use crate::core::normalizer::ProvisionalNormalizer;
use crate::core::reducer::DimensionalityReducer;
use crate::metric::magnitude;
use crate::storage::{LoadState, ResponseStore, RetryPolicy};
use crate::{ReducedVector, TraitVector, QUESTION_COUNT, REDUCED_AXES, TRAIT_AXES};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The local user's current vectors as seen by publication and ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalVector {
    pub normalized: TraitVector,
    pub reduced: ReducedVector,
    pub completion_ratio: f32,
    pub is_provisional: bool,
}

impl Default for LocalVector {
    fn default() -> Self {
        Self {
            normalized: [0.0; TRAIT_AXES],
            reduced: [0.0; REDUCED_AXES],
            completion_ratio: 0.0,
            is_provisional: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Every attempt failed; the session runs on empty in-memory data.
    Defaulted,
}

/// One local player's assessment: accumulates answers, keeps the normalized
/// vector current, and persists through a [`ResponseStore`].
#[derive(Debug)]
pub struct MatchSession<S: ResponseStore> {
    accumulator: TraitAccumulator,
    normalizer: ProvisionalNormalizer,
    reducer: DimensionalityReducer,
    store: S,
    retry: RetryPolicy,
    load_state: LoadState,
    failed_attempts: u32,
    normalized: TraitVector,
    finalized: bool,
    on_vector_updated: Observers<LocalVector>,
    on_vector_finalized: Observers<LocalVector>,
}

impl<S: ResponseStore> MatchSession<S> {
    pub fn new(config: &MatchConfig, tables: Arc<VectorTables>, store: S) -> Self {
        Self {
            reducer: DimensionalityReducer::new(&tables),
            accumulator: TraitAccumulator::new(tables),
            normalizer: ProvisionalNormalizer::from_settings(&config.vector),
            store,
            retry: RetryPolicy::from_settings(&config.storage),
            load_state: LoadState::Idle,
            failed_attempts: 0,
            normalized: [0.0; TRAIT_AXES],
            finalized: false,
            on_vector_updated: Observers::new(),
            on_vector_finalized: Observers::new(),
        }
    }

    /// Makes the first load attempt. Failures are retried from [`tick`](Self::tick).
    pub fn begin_load(&mut self) -> Option<LoadOutcome> {
        self.failed_attempts = 0;
        self.try_load()
    }

    /// Advances a pending retry. Returns the outcome once loading settles.
    pub fn tick(&mut self, delta_time: f32) -> Option<LoadOutcome> {
        match &mut self.load_state {
            LoadState::Pending { remaining, .. } => {
                *remaining -= delta_time;
                if *remaining <= 0.0 {
                    self.try_load()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn try_load(&mut self) -> Option<LoadOutcome> {
        let attempt = self.failed_attempts + 1;
        debug!("Loading player data (attempt {})", attempt);

        match self.store.load() {
            Ok(()) => {
                self.adopt_stored();
                self.load_state = LoadState::Loaded;
                info!(
                    "Player data loaded - progress: {}/{}, finalized: {}",
                    self.accumulator.answered_count(),
                    QUESTION_COUNT,
                    self.finalized
                );
                Some(LoadOutcome::Loaded)
            }
            Err(e) => {
                self.failed_attempts = attempt;
                if self.retry.should_retry(attempt) {
                    let delay = self.retry.backoff(attempt);
                    warn!("Player data load failed ({}), retrying in {}s", e, delay);
                    self.load_state = LoadState::Pending {
                        attempt: attempt + 1,
                        remaining: delay,
                    };
                    None
                } else {
                    warn!(
                        "Player data load failed after {} attempts ({}), using defaults",
                        attempt, e
                    );
                    self.store.clear();
                    self.accumulator.reset();
                    self.normalized = [0.0; TRAIT_AXES];
                    self.finalized = false;
                    self.load_state = LoadState::Failed;
                    Some(LoadOutcome::Defaulted)
                }
            }
        }
    }

    fn adopt_stored(&mut self) {
        self.accumulator.rebuild_all(&self.store.responses());
        let stored = self.store.vector();
        let usable = stored.iter().all(|v| v.is_finite()) && magnitude(&stored) > 0.0;

        if self.accumulator.is_complete() {
            self.normalized = if usable {
                stored
            } else {
                self.normalizer.finalize(&self.accumulator.working_vector())
            };
            self.finalized = true;
        } else {
            self.refresh_normalized();
            self.finalized = false;
        }
    }

    fn refresh_normalized(&mut self) {
        self.normalized = self.normalizer.normalize(
            &self.accumulator.working_vector(),
            self.accumulator.answered_count(),
        );
    }

    fn persist(&mut self) {
        self.store.set_vector(&self.normalized);
        if let Err(e) = self.store.save() {
            warn!("Failed to save player data: {}", e);
        }
    }

    /// Records one answer. Out-of-range input, answers before loading
    /// settles, and answers after finalization are ignored.
    pub fn answer(&mut self, question: usize, response: u8) -> bool {
        if !self.load_state.is_settled() {
            debug!("Answer to Q{} ignored: player data not loaded", question);
            return false;
        }
        if self.finalized {
            debug!("Answer to Q{} ignored: vector already finalized", question);
            return false;
        }
        if !self.accumulator.answer(question, response) {
            return false;
        }

        self.store.set_response(question, response);
        self.refresh_normalized();
        self.persist();
        debug!(
            "Q{} = {}, progress {}/{}",
            question + 1,
            response,
            self.accumulator.answered_count(),
            QUESTION_COUNT
        );

        let local = self.local_vector();
        self.on_vector_updated.notify(&local);

        if self.accumulator.is_complete() {
            self.finalize();
        }
        true
    }

    /// Locks in the unit-normalized vector. Refused until every question is answered.
    pub fn finalize(&mut self) -> bool {
        if !self.accumulator.is_complete() {
            warn!(
                "Finalize refused: {}/{} questions answered",
                self.accumulator.answered_count(),
                QUESTION_COUNT
            );
            return false;
        }

        self.normalized = self.normalizer.finalize(&self.accumulator.working_vector());
        self.finalized = true;
        self.persist();
        info!("Trait vector finalized");

        let local = self.local_vector();
        self.on_vector_finalized.notify(&local);
        true
    }

    /// Clears responses, vectors, and persisted data.
    pub fn reset(&mut self) {
        self.accumulator.reset();
        self.normalized = [0.0; TRAIT_AXES];
        self.finalized = false;
        self.store.clear();
        if let Err(e) = self.store.save() {
            warn!("Failed to save cleared player data: {}", e);
        }
        info!("Player data reset");

        let local = self.local_vector();
        self.on_vector_updated.notify(&local);
    }

    pub fn local_vector(&self) -> LocalVector {
        LocalVector {
            normalized: self.normalized,
            reduced: self.reducer.reduce(&self.normalized),
            completion_ratio: self.accumulator.completion_ratio(),
            is_provisional: !self.finalized,
        }
    }

    pub fn on_vector_updated<F>(&mut self, listener: F)
    where
        F: FnMut(&LocalVector) + 'static,
    {
        self.on_vector_updated.subscribe(listener);
    }

    pub fn on_vector_finalized<F>(&mut self, listener: F)
    where
        F: FnMut(&LocalVector) + 'static,
    {
        self.on_vector_finalized.subscribe(listener);
    }

    pub fn normalized_vector(&self) -> TraitVector {
        self.normalized
    }

    pub fn working_vector(&self) -> TraitVector {
        self.accumulator.working_vector()
    }

    pub fn response(&self, question: usize) -> u8 {
        self.accumulator.response(question)
    }

    pub fn answered_count(&self) -> usize {
        self.accumulator.answered_count()
    }

    pub fn completion_ratio(&self) -> f32 {
        self.accumulator.completion_ratio()
    }

    pub fn next_unanswered(&self) -> Option<usize> {
        self.accumulator.next_unanswered()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state.is_settled()
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, PlayerData};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn session(store: MemoryStore) -> MatchSession<MemoryStore> {
        let config = MatchConfig::generated(4);
        let tables = Arc::new(config.validate().unwrap());
        MatchSession::new(&config, tables, store)
    }

    fn loaded() -> MatchSession<MemoryStore> {
        let mut s = session(MemoryStore::new());
        assert_eq!(s.begin_load(), Some(LoadOutcome::Loaded));
        s
    }

    #[test]
    fn test_answers_persist_and_notify() {
        let mut s = loaded();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        s.on_vector_updated(move |v| sink.borrow_mut().push(v.completion_ratio));

        assert!(s.answer(0, 5));
        assert!(s.answer(1, 2));
        assert!(!s.answer(2, 0));

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(s.store().persisted().map(|d| d.responses[0]), Some(5));
        assert_eq!(s.store().persisted().map(|d| d.progress()), Some(2));
        assert!(s.local_vector().is_provisional);
    }

    #[test]
    fn test_last_answer_finalizes() {
        let mut s = loaded();
        let finalized = Rc::new(RefCell::new(0));
        let counter = finalized.clone();
        s.on_vector_finalized(move |_| *counter.borrow_mut() += 1);

        for q in 0..QUESTION_COUNT {
            s.answer(q, (q % 5 + 1) as u8);
        }
        assert!(s.is_finalized());
        assert_eq!(*finalized.borrow(), 1);
        assert!((magnitude(&s.normalized_vector()) - 1.0).abs() < 1e-3);
        assert!(!s.local_vector().is_provisional);

        // Locked until reset.
        assert!(!s.answer(0, 1));
        s.reset();
        assert!(!s.is_finalized());
        assert_eq!(s.answered_count(), 0);
        assert!(s.answer(0, 1));
    }

    #[test]
    fn test_finalize_refused_when_incomplete() {
        let mut s = loaded();
        s.answer(0, 3);
        assert!(!s.finalize());
        assert!(!s.is_finalized());
    }

    #[test]
    fn test_answers_ignored_before_load() {
        let mut s = session(MemoryStore::new());
        assert!(!s.answer(0, 3));
        s.begin_load();
        assert!(s.answer(0, 3));
    }

    #[test]
    fn test_load_rebuilds_partial_profile() {
        let mut data = PlayerData::default();
        for q in 0..30 {
            data.responses[q] = 5;
        }
        let mut s = session(MemoryStore::with_persisted(data));
        s.begin_load();
        assert_eq!(s.answered_count(), 30);
        assert!(!s.is_finalized());
        assert!(magnitude(&s.normalized_vector()) > 0.9);
    }

    #[test]
    fn test_load_adopts_stored_final_vector() {
        let mut data = PlayerData::default();
        data.responses = [4; QUESTION_COUNT];
        data.vector[7] = 1.0;
        let mut s = session(MemoryStore::with_persisted(data));
        s.begin_load();
        assert!(s.is_finalized());
        assert_eq!(s.normalized_vector()[7], 1.0);
    }

    #[test]
    fn test_load_retries_with_backoff() {
        let mut store = MemoryStore::new();
        store.fail_next_loads(2);
        let mut s = session(store);

        assert_eq!(s.begin_load(), None);
        assert_eq!(s.load_state(), LoadState::Pending { attempt: 2, remaining: 2.0 });

        assert_eq!(s.tick(1.5), None);
        assert_eq!(s.tick(0.5), None); // second failure, now waits 4s
        assert!(matches!(s.load_state(), LoadState::Pending { attempt: 3, .. }));

        assert_eq!(s.tick(3.9), None);
        assert_eq!(s.tick(0.2), Some(LoadOutcome::Loaded));
        assert_eq!(s.store().load_calls(), 3);
    }

    #[test]
    fn test_load_exhaustion_uses_defaults() {
        let mut store = MemoryStore::new();
        store.fail_next_loads(10);
        let mut s = session(store);

        s.begin_load();
        s.tick(2.0);
        assert_eq!(s.tick(4.0), Some(LoadOutcome::Defaulted));
        assert_eq!(s.load_state(), LoadState::Failed);
        assert!(s.is_loaded());
        assert!(s.answer(0, 2));
    }

    #[test]
    fn test_save_failures_do_not_block_answers() {
        let mut store = MemoryStore::new();
        store.set_failing_saves(true);
        let mut s = session(store);
        s.begin_load();
        assert!(s.answer(3, 4));
        assert_eq!(s.response(3), 4);
        assert_eq!(s.store().response(3), 4);
    }
}
