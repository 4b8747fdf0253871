//! Presence and published profiles of every user in the world.

use crate::publish::{PublicationSink, PublishedProfile};
use crate::{ReducedVector, REDUCED_AXES};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub type PeerId = u64;

/// A present user's last broadcast, as seen by everyone else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    id: PeerId,
    display_name: String,
    reduced: ReducedVector,
    tags: Vec<String>,
    headline: String,
    public: bool,
    provisional: bool,
    completion_percentage: f32,
}

impl Profile {
    /// A present user who has not shared anything.
    pub fn hidden(id: PeerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            reduced: [0.0; REDUCED_AXES],
            tags: Vec::new(),
            headline: String::new(),
            public: false,
            provisional: true,
            completion_percentage: 0.0,
        }
    }

    pub fn from_published(id: PeerId, published: &PublishedProfile) -> Self {
        Self {
            id,
            display_name: published.display_name.clone(),
            reduced: published.reduced_vector,
            tags: published.tags.clone(),
            headline: published.headline.clone(),
            public: published.is_public,
            provisional: published.is_provisional,
            completion_percentage: published.completion_ratio * 100.0,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn reduced_vector(&self) -> ReducedVector {
        self.reduced
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn headline(&self) -> &str {
        &self.headline
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_provisional(&self) -> bool {
        self.provisional
    }

    pub fn completion_percentage(&self) -> f32 {
        self.completion_percentage
    }
}

/// Source of peer profiles for the ranking engine.
pub trait PeerSource {
    /// Every present user, in a stable order.
    fn snapshot(&self) -> Vec<Profile>;
    /// Bumped whenever any profile is published, hidden, added, or removed.
    fn generation(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct PeerDirectory {
    profiles: BTreeMap<PeerId, Profile>,
    generation: u64,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedDirectory {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn join(&mut self, id: PeerId, display_name: impl Into<String>) {
        self.profiles.insert(id, Profile::hidden(id, display_name));
        self.generation += 1;
    }

    pub fn leave(&mut self, id: PeerId) -> bool {
        let removed = self.profiles.remove(&id).is_some();
        if removed {
            self.generation += 1;
        }
        removed
    }

    /// Replaces the whole profile for `id`, adding the user if absent.
    pub fn publish(&mut self, id: PeerId, published: &PublishedProfile) {
        self.profiles
            .insert(id, Profile::from_published(id, published));
        self.generation += 1;
    }

    pub fn hide(&mut self, id: PeerId) {
        if let Some(profile) = self.profiles.get_mut(&id) {
            *profile = Profile::hidden(id, profile.display_name.clone());
            self.generation += 1;
        }
    }

    pub fn get(&self, id: PeerId) -> Option<&Profile> {
        self.profiles.get(&id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn public_count(&self) -> usize {
        self.profiles.values().filter(|p| p.is_public()).count()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }
}

impl PeerSource for PeerDirectory {
    fn snapshot(&self) -> Vec<Profile> {
        self.profiles.values().cloned().collect()
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

/// Directory shared by every engine running in one thread.
pub type SharedDirectory = Rc<RefCell<PeerDirectory>>;

impl PeerSource for SharedDirectory {
    fn snapshot(&self) -> Vec<Profile> {
        self.borrow().snapshot()
    }

    fn generation(&self) -> u64 {
        self.borrow().generation()
    }
}

/// Publication sink that writes one user's profile into a shared directory.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    directory: SharedDirectory,
    id: PeerId,
}

impl DirectoryPublisher {
    pub fn new(directory: SharedDirectory, id: PeerId) -> Self {
        Self { directory, id }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }
}

impl PublicationSink for DirectoryPublisher {
    fn publish(&mut self, profile: &PublishedProfile) {
        self.directory.borrow_mut().publish(self.id, profile);
    }

    fn hide(&mut self) {
        self.directory.borrow_mut().hide(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn published(axis: f32) -> PublishedProfile {
        let mut p = PublishedProfile::hidden("bob");
        p.reduced_vector[1] = axis;
        p.completion_ratio = 0.5;
        p.is_public = true;
        p
    }

    #[test]
    fn test_generation_tracks_changes() {
        let mut dir = PeerDirectory::new();
        dir.join(1, "bob");
        let g = dir.generation();

        dir.publish(1, &published(0.4));
        assert!(dir.generation() > g);
        assert_eq!(dir.public_count(), 1);
        assert_eq!(dir.get(1).map(|p| p.completion_percentage()), Some(50.0));

        let g = dir.generation();
        dir.hide(1);
        assert!(dir.generation() > g);
        assert_eq!(dir.public_count(), 0);
        assert_eq!(dir.len(), 1);

        let g = dir.generation();
        dir.hide(99);
        assert_eq!(dir.generation(), g);
        assert!(dir.leave(1));
        assert!(dir.is_empty());
    }

    #[test]
    fn test_snapshot_is_ordered_by_id() {
        let mut dir = PeerDirectory::new();
        dir.join(3, "c");
        dir.join(1, "a");
        dir.join(2, "b");
        let ids: Vec<_> = dir.snapshot().iter().map(Profile::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_directory_publisher_writes_through() {
        let dir = PeerDirectory::shared();
        let mut sink = DirectoryPublisher::new(dir.clone(), 7);
        sink.publish(&published(0.9));
        assert!(dir.snapshot()[0].is_public());
        sink.hide();
        assert!(!dir.snapshot()[0].is_public());
        assert_eq!(dir.snapshot()[0].reduced_vector(), [0.0; REDUCED_AXES]);
    }
}
