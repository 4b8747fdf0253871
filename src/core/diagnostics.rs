use crate::storage::format::{PlayerRecord, RECORD_MAGIC, RECORD_VERSION};
use crate::storage::ProfileFlags;
use crate::CHOICE_COUNT;

#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Corrupted(String),
    Suspicious(String),
}

pub struct Diagnostics;

impl Diagnostics {
    /// Performs a full health check on a decoded player record.
    ///
    /// `Corrupted` records must not be adopted; `Suspicious` ones are usable
    /// but worth a warning.
    pub fn check_record(record: &PlayerRecord) -> HealthStatus {
        if record.magic != RECORD_MAGIC {
            return HealthStatus::Corrupted("Invalid Magic Bytes".to_string());
        }
        if record.version != RECORD_VERSION {
            return HealthStatus::Corrupted(format!("Unknown version: {}", record.version));
        }

        if let Some(q) = record
            .responses
            .iter()
            .position(|&r| r as usize > CHOICE_COUNT)
        {
            return HealthStatus::Corrupted(format!(
                "Response {} out of range for question {}",
                record.responses[q], q
            ));
        }

        if let Some(axis) = record.vector.iter().position(|v| !v.is_finite()) {
            return HealthStatus::Corrupted(format!("Non-finite vector component on axis {}", axis));
        }

        // Normalized vectors are clamped to [-1, 1]. Anything outside is stale or hand-edited.
        if let Some(axis) = record.vector.iter().position(|v| v.abs() > 1.0) {
            return HealthStatus::Suspicious(format!(
                "Vector component {} on axis {} exceeds unit range",
                record.vector[axis], axis
            ));
        }

        let answered = record.responses.iter().filter(|&&r| r != 0).count();
        if answered != record.progress as usize {
            return HealthStatus::Suspicious(format!(
                "Progress {} disagrees with {} stored responses",
                record.progress, answered
            ));
        }

        if ProfileFlags::from_bits(record.flags).is_none() {
            return HealthStatus::Suspicious(format!("Unknown flag bits: {:#x}", record.flags));
        }

        HealthStatus::Healthy
    }
}
