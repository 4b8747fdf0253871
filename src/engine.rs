//! Per-user facade that owns every component and drives them from one
//! `tick(dt)` per frame.

use crate::config::{MatchConfig, VectorTables};
use crate::core::ranking::{CompatibilityRanker, CompatibilityResult, LocalSnapshot};
use crate::core::scheduler::{BudgetScheduler, PerformanceState};
use crate::core::session::{LoadOutcome, LocalVector, MatchSession};
use crate::core::summary::{ProfileSummary, SummaryGenerator};
use crate::error::ConfigError;
use crate::peers::{PeerId, PeerSource};
use crate::publish::{ProfilePublisher, PublicationSink, PublishedProfile};
use crate::storage::ResponseStore;
use std::sync::Arc;
use tracing::info;

pub struct MatchEngine<S: ResponseStore, P: PeerSource, K: PublicationSink> {
    id: PeerId,
    scheduler: BudgetScheduler,
    session: MatchSession<S>,
    publisher: ProfilePublisher<K>,
    ranker: CompatibilityRanker<P>,
    summary: SummaryGenerator,
    frames: u64,
}

impl<S: ResponseStore, P: PeerSource, K: PublicationSink> MatchEngine<S, P, K> {
    /// Validates `config` and builds an engine. Mis-shaped tables never
    /// produce an engine.
    pub fn new(
        id: PeerId,
        display_name: impl Into<String>,
        config: &MatchConfig,
        store: S,
        peers: P,
        sink: K,
    ) -> Result<Self, ConfigError> {
        let tables = Arc::new(config.validate()?);
        Ok(Self::with_tables(id, display_name, config, tables, store, peers, sink))
    }

    /// Builds an engine on already-validated tables, shared across engines.
    pub fn with_tables(
        id: PeerId,
        display_name: impl Into<String>,
        config: &MatchConfig,
        tables: Arc<VectorTables>,
        store: S,
        peers: P,
        sink: K,
    ) -> Self {
        let summary = SummaryGenerator::new(config.summary.clone());
        Self {
            id,
            scheduler: BudgetScheduler::new(config.performance.clone()),
            session: MatchSession::new(config, tables, store),
            publisher: ProfilePublisher::new(
                config.publishing.clone(),
                summary.clone(),
                sink,
                display_name,
            ),
            ranker: CompatibilityRanker::new(config.matching.clone(), peers),
            summary,
            frames: 0,
        }
    }

    /// Begins loading persisted data.
    pub fn start(&mut self) {
        if let Some(outcome) = self.session.begin_load() {
            self.on_loaded(outcome);
        }
    }

    fn on_loaded(&mut self, outcome: LoadOutcome) {
        info!("User {} ready ({:?})", self.id, outcome);
        let local = self.session.local_vector();
        if self.session.store().is_public_sharing_enabled() {
            self.publisher.force_publish(&local);
        } else {
            self.publisher.hide();
        }
    }

    /// One frame: budget first, then load retries, publication clock, and
    /// the ranking scan.
    pub fn tick(&mut self, delta_time: f32) {
        self.frames += 1;
        self.scheduler.tick(delta_time);

        if let Some(outcome) = self.session.tick(delta_time) {
            self.on_loaded(outcome);
        }
        self.publisher.advance(delta_time);
        if self.publisher.has_pending() {
            let local = self.session.local_vector();
            self.publisher.flush_pending(&local);
        }

        if self.session.is_loaded() {
            let local = self.local_snapshot();
            self.ranker.tick(delta_time, &mut self.scheduler, &local);
        }
    }

    pub fn answer(&mut self, question: usize, response: u8) -> bool {
        let was_finalized = self.session.is_finalized();
        if !self.session.answer(question, response) {
            return false;
        }

        let local = self.session.local_vector();
        self.publisher.on_vector_updated(&local);
        if !was_finalized && self.session.is_finalized() {
            self.publisher.on_vector_finalized(&local);
        }
        let snapshot = self.local_snapshot();
        self.ranker.notify_vector_changed(&snapshot);
        true
    }

    pub fn finalize(&mut self) -> bool {
        if !self.session.finalize() {
            return false;
        }
        let local = self.session.local_vector();
        self.publisher.on_vector_finalized(&local);
        true
    }

    /// Clears all answers and persisted data and stops sharing.
    pub fn reset(&mut self) {
        self.session.reset();
        self.publisher.hide();
    }

    pub fn enable_public_sharing(&mut self) -> bool {
        let local = self.session.local_vector();
        self.publisher
            .enable_public_sharing(self.session.store_mut(), &local)
    }

    pub fn disable_public_sharing(&mut self) {
        self.publisher.disable_public_sharing(self.session.store_mut());
    }

    pub fn force_rescan(&mut self) -> bool {
        let local = self.local_snapshot();
        self.ranker.force_rescan(&local)
    }

    fn local_snapshot(&self) -> LocalSnapshot {
        let local = self.session.local_vector();
        LocalSnapshot {
            id: self.id,
            reduced: local.reduced,
            completion_ratio: local.completion_ratio,
        }
    }

    pub fn top_k(&self) -> Vec<Option<CompatibilityResult>> {
        self.ranker.top_k()
    }

    pub fn recommendations(&self) -> Vec<CompatibilityResult> {
        self.ranker.recommendations()
    }

    pub fn is_scanning(&self) -> bool {
        self.ranker.is_scanning()
    }

    pub fn scan_progress(&self) -> f32 {
        self.ranker.scan_progress()
    }

    pub fn performance(&self) -> PerformanceState {
        self.scheduler.state()
    }

    pub fn local_vector(&self) -> LocalVector {
        self.session.local_vector()
    }

    pub fn published(&self) -> PublishedProfile {
        self.publisher.published()
    }

    pub fn summary(&self) -> ProfileSummary {
        self.summary.summarize(&self.session.normalized_vector())
    }

    pub fn on_recommendations<F>(&mut self, listener: F)
    where
        F: FnMut(&Vec<CompatibilityResult>) + 'static,
    {
        self.ranker.on_scan_complete(listener);
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        self.publisher.display_name()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn session(&self) -> &MatchSession<S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MatchSession<S> {
        &mut self.session
    }

    pub fn scheduler(&self) -> &BudgetScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut BudgetScheduler {
        &mut self.scheduler
    }

    pub fn ranker(&self) -> &CompatibilityRanker<P> {
        &self.ranker
    }

    pub fn publisher(&self) -> &ProfilePublisher<K> {
        &self.publisher
    }
}

impl<S, P, K> std::fmt::Debug for MatchEngine<S, P, K>
where
    S: ResponseStore + std::fmt::Debug,
    P: PeerSource + std::fmt::Debug,
    K: PublicationSink + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("id", &self.id)
            .field("frames", &self.frames)
            .field("session", &self.session)
            .field("ranker", &self.ranker)
            .finish()
    }
}
