//! Progressive trait-vector construction and compatibility ranking.
//!
//! Answers to a fixed 112-question assessment are folded into a 30D trait
//! vector, projected to 6D for broadcast, and ranked against other present
//! users by a scan that spreads its cost over frames.

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod metric;
pub mod peers;
pub mod publish;
pub mod sim;
pub mod storage;

/// Number of assessment questions.
pub const QUESTION_COUNT: usize = 112;
/// Choices per question; responses are `1..=CHOICE_COUNT`, `0` means unanswered.
pub const CHOICE_COUNT: usize = 5;
/// Dimensions of the full trait vector.
pub const TRAIT_AXES: usize = 30;
/// Dimensions of the published (reduced) vector.
pub const REDUCED_AXES: usize = 6;

pub type TraitVector = [f32; TRAIT_AXES];
pub type ReducedVector = [f32; REDUCED_AXES];
pub type Responses = [u8; QUESTION_COUNT];

pub use config::{MatchConfig, VectorTables};
pub use engine::MatchEngine;
pub use error::{ConfigError, StorageError};

/// Installs the `tracing` subscriber used by the binaries.
///
/// Honors `RUST_LOG`; defaults to `match_engine=info`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "match_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
