//! Bounded retry with exponential backoff for store loads, measured in
//! frame time rather than wall-clock time.

use crate::config::StorageSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: f32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: f32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: base_delay.max(0.0),
        }
    }

    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(settings.max_attempts, settings.base_delay)
    }

    /// Delay before retrying after `failed_attempts` failures:
    /// base, 2·base, 4·base, ...
    pub fn backoff(&self, failed_attempts: u32) -> f32 {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base_delay * (1u32 << exponent) as f32
    }

    /// `true` when another attempt is allowed after `failed_attempts` failures.
    pub fn should_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&StorageSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadState {
    /// No load requested yet.
    Idle,
    /// Waiting `remaining` seconds before attempt number `attempt` (1-based).
    Pending { attempt: u32, remaining: f32 },
    Loaded,
    /// Every attempt failed; running on defaults.
    Failed,
}

impl LoadState {
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Failed)
    }
}
