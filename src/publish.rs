//! Broadcast of the local user's reduced profile.

use crate::config::PublishSettings;
use crate::core::events::Observers;
use crate::core::session::LocalVector;
use crate::core::summary::SummaryGenerator;
use crate::metric::max_abs_diff;
use crate::storage::ResponseStore;
use crate::{ReducedVector, REDUCED_AXES};
use serde::Serialize;
use tracing::{debug, info};

/// What other users get to see.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedProfile {
    pub display_name: String,
    pub reduced_vector: ReducedVector,
    pub tags: Vec<String>,
    pub headline: String,
    pub is_provisional: bool,
    /// Fraction of questions answered, `0.0..=1.0`.
    pub completion_ratio: f32,
    pub is_public: bool,
}

impl PublishedProfile {
    pub fn hidden(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            reduced_vector: [0.0; REDUCED_AXES],
            tags: Vec::new(),
            headline: String::new(),
            is_provisional: true,
            completion_ratio: 0.0,
            is_public: false,
        }
    }
}

/// Transport for published profiles.
pub trait PublicationSink {
    fn publish(&mut self, profile: &PublishedProfile);
    fn hide(&mut self);
}

/// Sink that drops everything; for sessions that never share.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PublicationSink for NullSink {
    fn publish(&mut self, _profile: &PublishedProfile) {}
    fn hide(&mut self) {}
}

#[derive(Debug)]
pub struct ProfilePublisher<K: PublicationSink> {
    settings: PublishSettings,
    summary: SummaryGenerator,
    sink: K,
    display_name: String,
    clock: f32,
    last_publish: Option<f32>,
    pending: bool,
    pending_final: bool,
    current: PublishedProfile,
    on_published: Observers<PublishedProfile>,
    on_hidden: Observers<()>,
}

impl<K: PublicationSink> ProfilePublisher<K> {
    pub fn new(
        settings: PublishSettings,
        summary: SummaryGenerator,
        sink: K,
        display_name: impl Into<String>,
    ) -> Self {
        let display_name = display_name.into();
        Self {
            settings,
            summary,
            sink,
            current: PublishedProfile::hidden(display_name.clone()),
            display_name,
            clock: 0.0,
            last_publish: None,
            pending: false,
            pending_final: false,
            on_published: Observers::new(),
            on_hidden: Observers::new(),
        }
    }

    pub fn advance(&mut self, delta_time: f32) {
        if delta_time > 0.0 {
            self.clock += delta_time;
        }
    }

    fn since_last_publish(&self) -> f32 {
        self.last_publish
            .map(|at| self.clock - at)
            .unwrap_or(f32::INFINITY)
    }

    /// Publishes unless the previous broadcast is less than the minimum
    /// interval old.
    pub fn publish(&mut self, local: &LocalVector) -> bool {
        if self.since_last_publish() < self.settings.min_interval {
            debug!("Publish throttled");
            return false;
        }

        let profile = PublishedProfile {
            display_name: self.display_name.clone(),
            reduced_vector: local.reduced,
            tags: self.summary.tags(&local.normalized),
            headline: self.summary.headline(&local.normalized),
            is_provisional: local.is_provisional,
            completion_ratio: local.completion_ratio,
            is_public: true,
        };

        self.sink.publish(&profile);
        self.last_publish = Some(self.clock);
        self.pending = false;
        self.pending_final = false;
        info!(
            "Published profile - progress: {:.1}%, provisional: {}",
            profile.completion_ratio * 100.0,
            profile.is_provisional
        );
        self.current = profile;
        let snapshot = self.current.clone();
        self.on_published.notify(&snapshot);
        true
    }

    /// Publishes regardless of the throttle.
    pub fn force_publish(&mut self, local: &LocalVector) -> bool {
        self.last_publish = None;
        self.publish(local)
    }

    fn has_significant_change(&self, local: &LocalVector) -> bool {
        max_abs_diff(&local.reduced, &self.current.reduced_vector) > self.settings.vector_significance
            || (local.completion_ratio - self.current.completion_ratio).abs()
                > self.settings.progress_significance
    }

    /// Republishes while public when the auto interval has passed, or when the
    /// change is significant and the minimum interval has passed. A declined
    /// update stays pending until [`flush_pending`](Self::flush_pending) can
    /// send it.
    pub fn on_vector_updated(&mut self, local: &LocalVector) -> bool {
        if !self.current.is_public {
            return false;
        }
        let elapsed = self.since_last_publish();
        if elapsed >= self.settings.auto_interval
            || (elapsed >= self.settings.min_interval && self.has_significant_change(local))
        {
            self.publish(local)
        } else {
            self.pending = true;
            false
        }
    }

    /// Retries a declined update; called once per frame. A deferred final
    /// vector goes out as soon as the minimum interval allows.
    pub fn flush_pending(&mut self, local: &LocalVector) -> bool {
        if self.pending_final {
            return self.on_vector_finalized(local);
        }
        if !self.pending {
            return false;
        }
        self.on_vector_updated(local)
    }

    pub fn has_pending(&self) -> bool {
        self.pending || self.pending_final
    }

    /// A finalized vector is broadcast while public, regardless of the auto
    /// interval and significance. Within the minimum interval it is deferred
    /// to [`flush_pending`](Self::flush_pending).
    pub fn on_vector_finalized(&mut self, local: &LocalVector) -> bool {
        if !self.current.is_public {
            return false;
        }
        if self.publish(local) {
            true
        } else {
            self.pending_final = true;
            false
        }
    }

    /// Clears the published state. Safe to call repeatedly.
    pub fn hide(&mut self) {
        self.current = PublishedProfile::hidden(self.display_name.clone());
        self.pending = false;
        self.pending_final = false;
        self.sink.hide();
        info!("Profile hidden");
        self.on_hidden.notify(&());
    }

    pub fn enable_public_sharing<S: ResponseStore>(&mut self, store: &mut S, local: &LocalVector) -> bool {
        store.set_public_sharing(true);
        if let Err(e) = store.save() {
            tracing::warn!("Failed to persist sharing flag: {}", e);
        }
        self.force_publish(local)
    }

    pub fn disable_public_sharing<S: ResponseStore>(&mut self, store: &mut S) {
        store.set_public_sharing(false);
        if let Err(e) = store.save() {
            tracing::warn!("Failed to persist sharing flag: {}", e);
        }
        self.hide();
    }

    pub fn published(&self) -> PublishedProfile {
        self.current.clone()
    }

    pub fn is_public(&self) -> bool {
        self.current.is_public
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn on_published<F>(&mut self, listener: F)
    where
        F: FnMut(&PublishedProfile) + 'static,
    {
        self.on_published.subscribe(listener);
    }

    pub fn on_hidden<F>(&mut self, listener: F)
    where
        F: FnMut(&()) + 'static,
    {
        self.on_hidden.subscribe(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::TRAIT_AXES;

    #[derive(Default)]
    struct RecordingSink {
        published: Vec<PublishedProfile>,
        hides: usize,
    }

    impl PublicationSink for RecordingSink {
        fn publish(&mut self, profile: &PublishedProfile) {
            self.published.push(profile.clone());
        }
        fn hide(&mut self) {
            self.hides += 1;
        }
    }

    fn publisher() -> ProfilePublisher<RecordingSink> {
        ProfilePublisher::new(
            PublishSettings::default(),
            SummaryGenerator::default(),
            RecordingSink::default(),
            "alice",
        )
    }

    fn local(first_axis: f32, completion_ratio: f32) -> LocalVector {
        let mut normalized = [0.0; TRAIT_AXES];
        normalized[0] = first_axis;
        let mut reduced = [0.0; REDUCED_AXES];
        reduced[0] = first_axis;
        LocalVector {
            normalized,
            reduced,
            completion_ratio,
            is_provisional: completion_ratio < 1.0,
        }
    }

    #[test]
    fn test_min_interval_throttles() {
        let mut p = publisher();
        assert!(p.publish(&local(0.5, 0.2)));
        p.advance(0.5);
        assert!(!p.publish(&local(0.6, 0.3)));
        p.advance(0.5);
        assert!(p.publish(&local(0.6, 0.3)));
        assert_eq!(p.sink().published.len(), 2);
        assert_eq!(p.published().tags, vec!["Outgoing".to_string()]);
    }

    #[test]
    fn test_vector_updates_republish_on_significance_or_interval() {
        let mut p = publisher();
        p.on_vector_updated(&local(0.5, 0.2));
        assert!(p.sink().published.is_empty(), "not public yet");

        p.publish(&local(0.5, 0.2));
        p.advance(1.5);
        assert!(!p.on_vector_updated(&local(0.52, 0.21)), "insignificant");
        assert!(p.on_vector_updated(&local(0.8, 0.21)), "axis moved > 0.1");

        p.advance(2.0);
        assert!(!p.on_vector_updated(&local(0.81, 0.22)));
        p.advance(3.0);
        assert!(p.on_vector_updated(&local(0.81, 0.22)), "auto interval");
    }

    #[test]
    fn test_throttled_update_is_flushed_later() {
        let mut p = publisher();
        p.publish(&local(0.1, 0.1));
        assert!(!p.on_vector_updated(&local(0.6, 0.3)));
        assert!(p.has_pending());

        p.advance(0.5);
        assert!(!p.flush_pending(&local(0.6, 0.3)));
        p.advance(0.5);
        assert!(p.flush_pending(&local(0.6, 0.3)));
        assert!(!p.has_pending());
        assert_eq!(p.published().reduced_vector[0], 0.6);
        assert!(!p.flush_pending(&local(0.6, 0.3)));
    }

    #[test]
    fn test_finalize_waits_for_min_interval() {
        let mut p = publisher();
        p.publish(&local(0.5, 0.98));
        p.advance(0.1);
        assert!(!p.on_vector_finalized(&local(0.5, 1.0)));
        assert!(p.has_pending());
        assert!(p.published().is_provisional);
        assert_eq!(p.sink().published.len(), 1);

        p.advance(0.5);
        assert!(!p.flush_pending(&local(0.5, 1.0)));
        p.advance(0.5);
        // Insignificant change, well inside the auto interval: still sent.
        assert!(p.flush_pending(&local(0.5, 1.0)));
        assert!(!p.published().is_provisional);
        assert!(!p.has_pending());
        assert_eq!(p.sink().published.len(), 2);
    }

    #[test]
    fn test_finalize_publishes_immediately_when_interval_elapsed() {
        let mut p = publisher();
        p.publish(&local(0.5, 0.98));
        p.advance(1.5);
        assert!(p.on_vector_finalized(&local(0.5, 1.0)));
        assert!(!p.published().is_provisional);
    }

    #[test]
    fn test_hide_drops_deferred_final() {
        let mut p = publisher();
        p.publish(&local(0.5, 0.98));
        p.on_vector_finalized(&local(0.5, 1.0));
        p.hide();
        assert!(!p.has_pending());
        p.advance(2.0);
        assert!(!p.flush_pending(&local(0.5, 1.0)));
        assert!(!p.is_public());
    }

    #[test]
    fn test_hide_is_idempotent() {
        let mut p = publisher();
        p.publish(&local(0.5, 0.5));
        p.hide();
        let once = p.published();
        p.hide();
        assert_eq!(p.published(), once);
        assert!(!once.is_public);
        assert_eq!(once.reduced_vector, [0.0; REDUCED_AXES]);
        assert_eq!(p.sink().hides, 2);
    }

    #[test]
    fn test_sharing_toggles_store_flag() {
        let mut p = publisher();
        let mut store = MemoryStore::new();
        assert!(p.enable_public_sharing(&mut store, &local(0.4, 0.3)));
        assert!(store.is_public_sharing_enabled());
        assert!(p.is_public());

        p.disable_public_sharing(&mut store);
        assert!(!store.is_public_sharing_enabled());
        assert!(!p.is_public());
    }
}
