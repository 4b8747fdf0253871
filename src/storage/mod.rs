//! Per-player persistence: question responses, the 30D vector, and sharing
//! flags.

pub mod file;
pub mod format;
pub mod memory;
pub mod retry;

pub use file::FileStore;
pub use format::PlayerRecord;
pub use memory::MemoryStore;
pub use retry::{LoadState, RetryPolicy};

use crate::error::StorageError;
use crate::{Responses, TraitVector, CHOICE_COUNT, QUESTION_COUNT, TRAIT_AXES};
use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProfileFlags: u32 {
        /// Profile is broadcast to other users.
        const PUBLIC_SHARING = 1 << 0;
        /// Share while the assessment is still incomplete.
        const PROVISIONAL_SHARING = 1 << 1;
    }
}

impl Serialize for ProfileFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

/// In-memory form of one player's saved state. Zeroed until loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerData {
    #[serde(with = "responses_serde")]
    pub responses: Responses,
    pub vector: TraitVector,
    pub flags: ProfileFlags,
    /// Seconds since the Unix epoch at the last save.
    pub last_active: u64,
}

impl Default for PlayerData {
    fn default() -> Self {
        Self {
            responses: [0; QUESTION_COUNT],
            vector: [0.0; TRAIT_AXES],
            flags: ProfileFlags::empty(),
            last_active: 0,
        }
    }
}

impl PlayerData {
    pub fn progress(&self) -> usize {
        self.responses
            .iter()
            .filter(|&&r| (1..=CHOICE_COUNT as u8).contains(&r))
            .count()
    }
}

mod responses_serde {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(responses: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(responses.iter())
    }
}

/// Storage backend for the local player's data.
///
/// Implementors supply `load`, `save`, and access to the [`PlayerData`];
/// every field accessor is provided on top of those.
pub trait ResponseStore {
    fn load(&mut self) -> Result<(), StorageError>;
    fn save(&mut self) -> Result<(), StorageError>;
    fn data(&self) -> &PlayerData;
    fn data_mut(&mut self) -> &mut PlayerData;

    fn response(&self, question: usize) -> u8 {
        self.data().responses.get(question).copied().unwrap_or(0)
    }

    /// Stores `response` (0 clears) for `question`; out-of-range input is ignored.
    fn set_response(&mut self, question: usize, response: u8) {
        if question < QUESTION_COUNT && response as usize <= CHOICE_COUNT {
            self.data_mut().responses[question] = response;
        }
    }

    fn responses(&self) -> Responses {
        self.data().responses
    }

    fn vector(&self) -> TraitVector {
        self.data().vector
    }

    fn set_vector(&mut self, vector: &TraitVector) {
        self.data_mut().vector = *vector;
    }

    fn flags(&self) -> ProfileFlags {
        self.data().flags
    }

    fn set_flags(&mut self, flags: ProfileFlags) {
        self.data_mut().flags = flags;
    }

    fn is_public_sharing_enabled(&self) -> bool {
        self.flags().contains(ProfileFlags::PUBLIC_SHARING)
    }

    fn set_public_sharing(&mut self, enabled: bool) {
        self.data_mut()
            .flags
            .set(ProfileFlags::PUBLIC_SHARING, enabled);
    }

    fn progress(&self) -> usize {
        self.data().progress()
    }

    fn clear(&mut self) {
        *self.data_mut() = PlayerData::default();
    }
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
