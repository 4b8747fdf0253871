use crate::config::MatchingSettings;
use crate::core::events::Observers;
use crate::core::scheduler::BudgetSource;
use crate::metric::{compatibility, magnitude};
use crate::peers::{PeerId, PeerSource, Profile};
use crate::ReducedVector;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibilityResult {
    pub peer_id: PeerId,
    pub display_name: String,
    /// Cosine similarity remapped to `[0, 1]`.
    pub similarity: f32,
    /// `min(‖mine‖, ‖theirs‖)` of the reduced vectors.
    pub confidence: f32,
    pub is_provisional: bool,
    pub completion_percentage: f32,
}

/// The local user's side of a scan, captured when the scan starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalSnapshot {
    pub id: PeerId,
    pub reduced: ReducedVector,
    pub completion_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// Ranks every present peer against the local user, spreading the work
/// over frames according to a [`BudgetSource`].
///
/// A scan works on a snapshot of the peer list and of the local vector taken
/// at start. Results are published all at once when the last peer has been
/// evaluated, so readers never see a half-finished ranking.
#[derive(Debug)]
pub struct CompatibilityRanker<P: PeerSource> {
    settings: MatchingSettings,
    peers: P,
    state: ScanState,

    snapshot: Vec<Profile>,
    local: Option<LocalSnapshot>,
    cursor: usize,
    pending: Vec<Option<CompatibilityResult>>,

    recommendations: Vec<CompatibilityResult>,
    had_peers: bool,
    recalc_timer: f32,
    seen_generation: u64,
    peer_change_countdown: Option<f32>,
    scans_completed: u64,

    on_scan_complete: Observers<Vec<CompatibilityResult>>,
}

impl<P: PeerSource> CompatibilityRanker<P> {
    pub fn new(settings: MatchingSettings, peers: P) -> Self {
        let seen_generation = peers.generation();
        Self {
            settings,
            peers,
            state: ScanState::Idle,
            snapshot: Vec::new(),
            local: None,
            cursor: 0,
            pending: Vec::new(),
            recommendations: Vec::new(),
            had_peers: false,
            recalc_timer: 0.0,
            seen_generation,
            peer_change_countdown: None,
            scans_completed: 0,
            on_scan_complete: Observers::new(),
        }
    }

    /// Starts a scan. Ignored while scanning or while the local profile is
    /// too incomplete. Returns `true` when the request was accepted.
    pub fn request_scan(&mut self, local: &LocalSnapshot) -> bool {
        if self.state == ScanState::Scanning {
            debug!("Scan request ignored: scan in progress");
            return false;
        }
        if local.completion_ratio <= self.settings.min_completion {
            debug!(
                "Scan request ignored: completion {:.2} not above {:.2}",
                local.completion_ratio, self.settings.min_completion
            );
            return false;
        }

        self.recalc_timer = 0.0;
        let mut snapshot = self.peers.snapshot();
        snapshot.retain(|p| p.id() != local.id);

        if snapshot.is_empty() {
            self.had_peers = false;
            self.recommendations.clear();
            debug!("No peers present, recommendations cleared");
            let results = self.recommendations.clone();
            self.on_scan_complete.notify(&results);
            return true;
        }

        debug!("Starting compatibility scan over {} profiles", snapshot.len());
        self.pending = Vec::with_capacity(snapshot.len());
        self.snapshot = snapshot;
        self.local = Some(*local);
        self.cursor = 0;
        self.state = ScanState::Scanning;
        true
    }

    /// The local vector changed. Rescans only when the last scan saw peers.
    pub fn notify_vector_changed(&mut self, local: &LocalSnapshot) -> bool {
        if !self.had_peers {
            return false;
        }
        self.request_scan(local)
    }

    /// Ignores the periodic timer and rescans now, unless already scanning.
    pub fn force_rescan(&mut self, local: &LocalSnapshot) -> bool {
        self.request_scan(local)
    }

    /// Runs triggers and advances an active scan by at most one budget grant.
    pub fn tick<B: BudgetSource>(&mut self, delta_time: f32, budget: &mut B, local: &LocalSnapshot) {
        let generation = self.peers.generation();
        if generation != self.seen_generation {
            self.seen_generation = generation;
            self.peer_change_countdown = Some(self.settings.profile_change_delay);
        }

        if let Some(remaining) = self.peer_change_countdown {
            let remaining = remaining - delta_time;
            if remaining <= 0.0 {
                self.peer_change_countdown = None;
                self.request_scan(local);
            } else {
                self.peer_change_countdown = Some(remaining);
            }
        }

        self.recalc_timer += delta_time.max(0.0);
        if self.recalc_timer >= self.settings.recalculation_interval {
            self.recalc_timer = 0.0;
            self.request_scan(local);
        }

        if self.state == ScanState::Scanning {
            self.advance(budget);
        }
    }

    fn advance<B: BudgetSource>(&mut self, budget: &mut B) {
        let remaining = self.snapshot.len() - self.cursor;
        let granted = budget.request_budget(remaining).min(remaining);
        let Some(local) = self.local else {
            return;
        };

        for profile in &self.snapshot[self.cursor..self.cursor + granted] {
            self.pending.push(evaluate(&self.settings, &local, profile));
        }
        self.cursor += granted;

        if self.cursor >= self.snapshot.len() {
            self.finish();
        }
    }

    fn finish(&mut self) {
        let evaluated = self.pending.len();
        let threshold = self.settings.similarity_threshold;
        let mut results: Vec<CompatibilityResult> = self
            .pending
            .drain(..)
            .flatten()
            .filter(|r| r.similarity > threshold)
            .collect();
        let valid = results.len();

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(self.settings.max_recommendations);

        self.recommendations = results;
        self.snapshot.clear();
        self.local = None;
        self.cursor = 0;
        self.state = ScanState::Idle;
        self.had_peers = true;
        self.scans_completed += 1;

        info!(
            "Compatibility scan complete - {} evaluated, {} valid, top {} recommended",
            evaluated,
            valid,
            self.recommendations.len()
        );
        let results = self.recommendations.clone();
        self.on_scan_complete.notify(&results);
    }

    /// Always `max_recommendations` long; empty slots are `None`.
    pub fn top_k(&self) -> Vec<Option<CompatibilityResult>> {
        (0..self.settings.max_recommendations)
            .map(|i| self.recommendations.get(i).cloned())
            .collect()
    }

    pub fn recommendations(&self) -> Vec<CompatibilityResult> {
        self.recommendations.clone()
    }

    pub fn recommendation(&self, index: usize) -> Option<CompatibilityResult> {
        self.recommendations.get(index).cloned()
    }

    pub fn valid_recommendation_count(&self) -> usize {
        self.recommendations.len()
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Fraction of the current snapshot evaluated; `1.0` when idle.
    pub fn scan_progress(&self) -> f32 {
        if self.state == ScanState::Idle || self.snapshot.is_empty() {
            return 1.0;
        }
        self.cursor as f32 / self.snapshot.len() as f32
    }

    pub fn scans_completed(&self) -> u64 {
        self.scans_completed
    }

    pub fn on_scan_complete<F>(&mut self, listener: F)
    where
        F: FnMut(&Vec<CompatibilityResult>) + 'static,
    {
        self.on_scan_complete.subscribe(listener);
    }

    pub fn peers(&self) -> &P {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut P {
        &mut self.peers
    }
}

fn evaluate(
    settings: &MatchingSettings,
    local: &LocalSnapshot,
    profile: &Profile,
) -> Option<CompatibilityResult> {
    if !profile.is_public() {
        return None;
    }

    let theirs = profile.reduced_vector();
    Some(CompatibilityResult {
        peer_id: profile.id(),
        display_name: profile.display_name().to_string(),
        similarity: compatibility(&local.reduced, &theirs, settings.epsilon),
        confidence: magnitude(&local.reduced).min(magnitude(&theirs)),
        is_provisional: profile.is_provisional(),
        completion_percentage: profile.completion_percentage(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::PeerDirectory;
    use crate::publish::PublishedProfile;
    use crate::REDUCED_AXES;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Grants a fixed number of units per frame.
    struct FixedBudget {
        per_frame: usize,
        used: usize,
    }

    impl FixedBudget {
        fn new(per_frame: usize) -> Self {
            Self { per_frame, used: 0 }
        }

        fn next_frame(&mut self) {
            self.used = 0;
        }
    }

    impl BudgetSource for FixedBudget {
        fn request_budget(&mut self, requested: usize) -> usize {
            let granted = requested.min(self.per_frame - self.used);
            self.used += granted;
            granted
        }
    }

    const ME: PeerId = 0;

    fn local(reduced: ReducedVector) -> LocalSnapshot {
        LocalSnapshot {
            id: ME,
            reduced,
            completion_ratio: 0.5,
        }
    }

    fn published(reduced: ReducedVector, public: bool) -> PublishedProfile {
        let mut p = PublishedProfile::hidden("peer");
        p.reduced_vector = reduced;
        p.is_public = public;
        p.completion_ratio = 0.75;
        p
    }

    fn axis(value: f32, index: usize) -> ReducedVector {
        let mut v = [0.0; REDUCED_AXES];
        v[index] = value;
        v
    }

    fn settings() -> MatchingSettings {
        MatchingSettings::default()
    }

    fn run_frames(
        ranker: &mut CompatibilityRanker<PeerDirectory>,
        budget: &mut FixedBudget,
        me: &LocalSnapshot,
        frames: usize,
    ) {
        for _ in 0..frames {
            budget.next_frame();
            ranker.tick(1.0 / 72.0, budget, me);
        }
    }

    #[test]
    fn test_budgeted_scan_takes_exact_frames() {
        let mut dir = PeerDirectory::new();
        for id in 1..=25u64 {
            let v = [0.2 + id as f32 * 0.01, 0.3, -0.1, 0.4, 0.1, 0.2];
            dir.publish(id, &published(v, true));
        }
        let mut ranker = CompatibilityRanker::new(settings(), dir);
        let me = local([0.3, 0.3, -0.1, 0.4, 0.1, 0.2]);
        let mut budget = FixedBudget::new(5);

        assert!(ranker.request_scan(&me));
        for frame in 1..=5 {
            assert_eq!(ranker.top_k(), vec![None, None, None], "frame {}", frame);
            run_frames(&mut ranker, &mut budget, &me, 1);
            if frame < 5 {
                assert!(ranker.is_scanning());
                assert!((ranker.scan_progress() - frame as f32 / 5.0).abs() < 1e-6);
            }
        }
        assert!(!ranker.is_scanning());
        assert_eq!(ranker.valid_recommendation_count(), 3);
        assert_eq!(ranker.scans_completed(), 1);
    }

    #[test]
    fn test_own_entry_costs_no_budget() {
        let mut dir = PeerDirectory::new();
        dir.publish(ME, &published(axis(0.7, 0), true));
        for id in 1..=25u64 {
            dir.publish(id, &published(axis(0.5 + id as f32 * 0.01, 0), true));
        }
        let mut ranker = CompatibilityRanker::new(settings(), dir);
        let me = local(axis(0.7, 0));
        let mut budget = FixedBudget::new(5);

        assert!(ranker.request_scan(&me));
        run_frames(&mut ranker, &mut budget, &me, 4);
        assert!(ranker.is_scanning());
        run_frames(&mut ranker, &mut budget, &me, 1);
        assert!(!ranker.is_scanning());
        assert!(ranker.recommendations().iter().all(|r| r.peer_id != ME));
    }

    #[test]
    fn test_alone_in_directory_clears_recommendations() {
        let mut dir = PeerDirectory::new();
        dir.publish(1, &published(axis(0.8, 0), true));
        let mut ranker = CompatibilityRanker::new(settings(), dir);
        let me = local(axis(0.7, 0));
        let mut budget = FixedBudget::new(10);
        ranker.request_scan(&me);
        run_frames(&mut ranker, &mut budget, &me, 1);
        assert_eq!(ranker.valid_recommendation_count(), 1);

        ranker.peers_mut().leave(1);
        ranker.peers_mut().publish(ME, &published(axis(0.7, 0), true));
        assert!(ranker.request_scan(&me));
        assert!(!ranker.is_scanning());
        assert_eq!(ranker.valid_recommendation_count(), 0);
        assert!(!ranker.notify_vector_changed(&me));
    }

    #[test]
    fn test_ranking_order_and_filtering() {
        let mut dir = PeerDirectory::new();
        dir.publish(1, &published(axis(0.8, 0), true)); // identical direction
        dir.publish(2, &published(axis(-0.8, 0), true)); // opposite: similarity 0
        dir.publish(3, &published([0.5, 0.5, 0.0, 0.0, 0.0, 0.0], true));
        dir.publish(4, &published(axis(0.9, 0), false)); // not public
        dir.publish(ME, &published(axis(0.9, 0), true)); // self
        dir.publish(5, &published(axis(0.6, 1), true)); // orthogonal: 0.5
        dir.publish(6, &published([0.0; REDUCED_AXES], true)); // incomparable

        let mut ranker = CompatibilityRanker::new(settings(), dir);
        let me = local(axis(0.7, 0));
        let mut budget = FixedBudget::new(100);
        ranker.request_scan(&me);
        run_frames(&mut ranker, &mut budget, &me, 1);

        let ids: Vec<_> = ranker.recommendations().iter().map(|r| r.peer_id).collect();
        assert_eq!(ids, vec![1, 3, 5]);

        let best = ranker.recommendation(0).unwrap();
        assert!((best.similarity - 1.0).abs() < 1e-5);
        assert!((best.confidence - 0.7).abs() < 1e-5);
        assert!((best.completion_percentage - 75.0).abs() < 1e-4);
        assert!(ranker.recommendation(3).is_none());
    }

    #[test]
    fn test_results_replace_wholesale() {
        let mut dir = PeerDirectory::new();
        dir.publish(1, &published(axis(0.8, 0), true));
        dir.publish(2, &published(axis(0.8, 1), true));
        let mut ranker = CompatibilityRanker::new(settings(), dir);
        let me = local(axis(0.7, 0));
        let mut budget = FixedBudget::new(1);

        ranker.request_scan(&me);
        run_frames(&mut ranker, &mut budget, &me, 2);
        assert_eq!(ranker.valid_recommendation_count(), 2);

        ranker.peers_mut().publish(1, &published(axis(0.8, 0), false));
        ranker.force_rescan(&me);
        run_frames(&mut ranker, &mut budget, &me, 1);
        assert_eq!(ranker.valid_recommendation_count(), 2, "old list until done");
        run_frames(&mut ranker, &mut budget, &me, 1);
        let ids: Vec<_> = ranker.recommendations().iter().map(|r| r.peer_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_snapshot_isolated_from_mid_scan_changes() {
        let dir = PeerDirectory::shared();
        dir.borrow_mut().publish(1, &published(axis(0.8, 0), true));
        dir.borrow_mut().publish(2, &published(axis(0.8, 0), true));
        let mut ranker = CompatibilityRanker::new(settings(), dir.clone());
        let me = local(axis(0.7, 0));
        let mut budget = FixedBudget::new(1);

        ranker.request_scan(&me);
        budget.next_frame();
        ranker.tick(0.01, &mut budget, &me);
        dir.borrow_mut().publish(3, &published(axis(0.8, 0), true));
        budget.next_frame();
        ranker.tick(0.01, &mut budget, &me);

        assert!(!ranker.is_scanning());
        assert_eq!(ranker.valid_recommendation_count(), 2);
    }

    #[test]
    fn test_concurrent_requests_ignored_and_gate() {
        let mut dir = PeerDirectory::new();
        dir.publish(1, &published(axis(0.8, 0), true));
        dir.publish(2, &published(axis(0.8, 0), true));
        let mut ranker = CompatibilityRanker::new(settings(), dir);

        let mut incomplete = local(axis(0.7, 0));
        incomplete.completion_ratio = 0.1;
        assert!(!ranker.request_scan(&incomplete));
        assert!(!ranker.is_scanning());

        let me = local(axis(0.7, 0));
        assert!(ranker.request_scan(&me));
        assert!(!ranker.request_scan(&me));
        assert!(ranker.is_scanning());
    }

    #[test]
    fn test_empty_snapshot_clears_and_notifies() {
        let mut dir = PeerDirectory::new();
        dir.publish(1, &published(axis(0.8, 0), true));
        let mut ranker = CompatibilityRanker::new(settings(), dir);
        let me = local(axis(0.7, 0));
        let mut budget = FixedBudget::new(10);
        ranker.request_scan(&me);
        run_frames(&mut ranker, &mut budget, &me, 1);
        assert_eq!(ranker.valid_recommendation_count(), 1);

        let notified = Rc::new(RefCell::new(Vec::new()));
        let sink = notified.clone();
        ranker.on_scan_complete(move |r| sink.borrow_mut().push(r.len()));

        ranker.peers_mut().leave(1);
        assert!(ranker.request_scan(&me));
        assert!(!ranker.is_scanning());
        assert_eq!(ranker.top_k(), vec![None, None, None]);
        assert_eq!(*notified.borrow(), vec![0]);

        // No peers last time, so a vector change does not rescan.
        assert!(!ranker.notify_vector_changed(&me));
    }

    #[test]
    fn test_periodic_and_peer_change_triggers() {
        let dir = PeerDirectory::shared();
        dir.borrow_mut().publish(1, &published(axis(0.8, 0), true));
        let mut ranker = CompatibilityRanker::new(settings(), dir.clone());
        let me = local(axis(0.7, 0));
        let mut budget = FixedBudget::new(10);

        budget.next_frame();
        ranker.tick(1.5, &mut budget, &me);
        assert_eq!(ranker.scans_completed(), 0);
        budget.next_frame();
        ranker.tick(0.5, &mut budget, &me);
        assert_eq!(ranker.scans_completed(), 1, "periodic scan at 2s");

        dir.borrow_mut().publish(2, &published(axis(0.6, 0), true));
        budget.next_frame();
        ranker.tick(0.3, &mut budget, &me);
        assert_eq!(ranker.scans_completed(), 1, "settling");
        budget.next_frame();
        ranker.tick(0.3, &mut budget, &me);
        assert_eq!(ranker.scans_completed(), 2, "peer change after delay");
        assert_eq!(ranker.valid_recommendation_count(), 2);

        assert!(ranker.notify_vector_changed(&me));
    }
}
