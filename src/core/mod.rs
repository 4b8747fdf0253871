pub mod accumulator;
pub mod diagnostics;
pub mod events;
pub mod normalizer;
pub mod ranking;
pub mod reducer;
pub mod scheduler;
pub mod session;
pub mod summary;
