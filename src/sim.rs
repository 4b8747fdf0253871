//! Synthetic multi-user world for the demo, simulator, and inspection
//! server. Every user runs its own [`MatchEngine`] against one shared
//! directory, all on the calling thread.

use crate::config::{MatchConfig, VectorTables};
use crate::engine::MatchEngine;
use crate::error::ConfigError;
use crate::metric::compatibility;
use crate::peers::{DirectoryPublisher, PeerDirectory, PeerId, PeerSource, Profile, SharedDirectory};
use crate::storage::MemoryStore;
use crate::{ReducedVector, Responses, CHOICE_COUNT, QUESTION_COUNT, TRAIT_AXES};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::info;

pub type WorldEngine = MatchEngine<MemoryStore, SharedDirectory, DirectoryPublisher>;

/// Answer sheet of a synthetic user with a hidden latent personality.
///
/// Each response is the choice whose weight lies closest to the latent
/// value of the question's target axis plus noise.
pub fn synthetic_answers(tables: &VectorTables, seed: u64, noise: f32) -> Responses {
    let mut rng = StdRng::seed_from_u64(seed);
    let latent: Vec<f32> = (0..TRAIT_AXES).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut responses = [0u8; QUESTION_COUNT];
    for (q, slot) in responses.iter_mut().enumerate() {
        let Some(question) = tables.question(q) else {
            continue;
        };
        let jitter = if noise > 0.0 { rng.gen_range(-noise..noise) } else { 0.0 };
        let wanted = latent[question.target_axis] + jitter;
        let best = (1..=CHOICE_COUNT as u8)
            .min_by(|&a, &b| {
                let da = (tables.response_weight(q, a) - wanted).abs();
                let db = (tables.response_weight(q, b) - wanted).abs();
                da.total_cmp(&db)
            })
            .unwrap_or(3);
        *slot = best;
    }
    responses
}

/// Generates `count` answer sheets in parallel. Sheet `i` depends only on
/// `seed + i`, so results are reproducible regardless of thread count.
pub fn generate_population(tables: &VectorTables, count: usize, seed: u64, noise: f32) -> Vec<Responses> {
    (0..count)
        .into_par_iter()
        .map(|i| synthetic_answers(tables, seed.wrapping_add(i as u64), noise))
        .collect()
}

/// Exhaustive ranking over a full peer list; the reference the frame-budgeted
/// scan must agree with.
pub fn brute_force_top_k(
    local_id: PeerId,
    local: &ReducedVector,
    peers: &[Profile],
    k: usize,
    threshold: f32,
    epsilon: f32,
) -> Vec<(PeerId, f32)> {
    let mut scored: Vec<(PeerId, f32)> = peers
        .par_iter()
        .filter(|p| p.is_public() && p.id() != local_id)
        .map(|p| (p.id(), compatibility(local, &p.reduced_vector(), epsilon)))
        .filter(|(_, s)| *s > threshold)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}

struct SimUser {
    engine: WorldEngine,
    sheet: Responses,
    next_question: usize,
}

pub struct World {
    config: MatchConfig,
    directory: SharedDirectory,
    users: Vec<SimUser>,
    clock: f32,
    answer_timer: f32,
}

impl World {
    /// Builds `users` engines that share one directory, each with a synthetic
    /// answer sheet. Every user shares publicly from the start.
    pub fn new(config: MatchConfig, users: usize, seed: u64) -> Result<Self, ConfigError> {
        let tables = Arc::new(config.validate()?);
        let sheets = generate_population(&tables, users, seed, 0.3);
        let directory = PeerDirectory::shared();

        let users = sheets
            .into_iter()
            .enumerate()
            .map(|(index, sheet)| {
                let id = index as PeerId + 1;
                let name = format!("user-{:03}", id);
                directory.borrow_mut().join(id, name.clone());
                let mut engine = MatchEngine::with_tables(
                    id,
                    name,
                    &config,
                    tables.clone(),
                    MemoryStore::new(),
                    directory.clone(),
                    DirectoryPublisher::new(directory.clone(), id),
                );
                engine.start();
                engine.enable_public_sharing();
                SimUser {
                    engine,
                    sheet,
                    next_question: 0,
                }
            })
            .collect::<Vec<_>>();

        info!("World created with {} users", users.len());
        Ok(Self {
            config,
            directory,
            users,
            clock: 0.0,
            answer_timer: 0.0,
        })
    }

    /// Every user answers their next `per_user` questions.
    pub fn answer_step(&mut self, per_user: usize) {
        for user in &mut self.users {
            for _ in 0..per_user {
                if user.next_question >= QUESTION_COUNT {
                    break;
                }
                let q = user.next_question;
                user.engine.answer(q, user.sheet[q]);
                user.next_question += 1;
            }
        }
    }

    /// Answers every remaining question for every user.
    pub fn answer_all(&mut self) {
        self.answer_step(QUESTION_COUNT);
    }

    /// Ticks every engine once. When `answer_interval` is positive, each user
    /// also answers one question per elapsed interval.
    pub fn tick(&mut self, delta_time: f32, answer_interval: f32) {
        self.clock += delta_time;
        if answer_interval > 0.0 {
            self.answer_timer += delta_time;
            while self.answer_timer >= answer_interval {
                self.answer_timer -= answer_interval;
                self.answer_step(1);
            }
        }
        for user in &mut self.users {
            user.engine.tick(delta_time);
        }
    }

    pub fn engines(&self) -> impl Iterator<Item = &WorldEngine> {
        self.users.iter().map(|u| &u.engine)
    }

    pub fn engine(&self, index: usize) -> Option<&WorldEngine> {
        self.users.get(index).map(|u| &u.engine)
    }

    pub fn engine_mut(&mut self, index: usize) -> Option<&mut WorldEngine> {
        self.users.get_mut(index).map(|u| &mut u.engine)
    }

    pub fn directory(&self) -> &SharedDirectory {
        &self.directory
    }

    pub fn peers(&self) -> Vec<Profile> {
        self.directory.snapshot()
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Exhaustive top-K for user `index` against the current directory.
    pub fn reference_top_k(&self, index: usize) -> Vec<(PeerId, f32)> {
        let Some(engine) = self.engine(index) else {
            return Vec::new();
        };
        let matching = &self.config.matching;
        brute_force_top_k(
            engine.id(),
            &engine.local_vector().reduced,
            &self.peers(),
            matching.max_recommendations,
            matching.similarity_threshold,
            matching.epsilon,
        )
    }
}
