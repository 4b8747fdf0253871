use crate::config::VectorTables;
use crate::{Responses, TraitVector, CHOICE_COUNT, QUESTION_COUNT, TRAIT_AXES};
use std::sync::Arc;

/// Running 30D trait vector built from question responses.
///
/// Invariant: `working[a] == Σ weight(q, responses[q]) * W[q][a]` over every
/// answered `q`. `answer` keeps it in O(30) by removing the old contribution
/// and adding the new one; `rebuild_all` recomputes it from scratch.
#[derive(Debug, Clone)]
pub struct TraitAccumulator {
    tables: Arc<VectorTables>,
    responses: Responses,
    working: TraitVector,
    answered: usize,
}

impl TraitAccumulator {
    pub fn new(tables: Arc<VectorTables>) -> Self {
        Self {
            tables,
            responses: [0; QUESTION_COUNT],
            working: [0.0; TRAIT_AXES],
            answered: 0,
        }
    }

    /// Records `response` (1..=5) for `question` (0..112).
    ///
    /// Out-of-range input leaves every field untouched and returns `false`.
    pub fn answer(&mut self, question: usize, response: u8) -> bool {
        if question >= QUESTION_COUNT || response == 0 || response as usize > CHOICE_COUNT {
            return false;
        }

        let old = self.responses[question];
        let row = self.tables.weight_row(question);

        if old == 0 {
            self.answered += 1;
        } else {
            let old_weight = self.tables.response_weight(question, old);
            for (value, loading) in self.working.iter_mut().zip(row.iter()) {
                *value -= old_weight * loading;
            }
        }

        let new_weight = self.tables.response_weight(question, response);
        for (value, loading) in self.working.iter_mut().zip(row.iter()) {
            *value += new_weight * loading;
        }

        self.responses[question] = response;
        true
    }

    /// Recomputes the working vector from a full response set.
    /// Values outside 1..=5 count as unanswered.
    pub fn rebuild_all(&mut self, responses: &Responses) {
        self.working = [0.0; TRAIT_AXES];
        self.answered = 0;

        for (question, &response) in responses.iter().enumerate() {
            let response = if (1..=CHOICE_COUNT as u8).contains(&response) {
                response
            } else {
                0
            };
            self.responses[question] = response;
            if response == 0 {
                continue;
            }

            self.answered += 1;
            let weight = self.tables.response_weight(question, response);
            let row = self.tables.weight_row(question);
            for (value, loading) in self.working.iter_mut().zip(row.iter()) {
                *value += weight * loading;
            }
        }
    }

    pub fn reset(&mut self) {
        self.responses = [0; QUESTION_COUNT];
        self.working = [0.0; TRAIT_AXES];
        self.answered = 0;
    }

    pub fn working_vector(&self) -> TraitVector {
        self.working
    }

    pub fn responses(&self) -> Responses {
        self.responses
    }

    pub fn response(&self, question: usize) -> u8 {
        self.responses.get(question).copied().unwrap_or(0)
    }

    pub fn answered_count(&self) -> usize {
        self.answered
    }

    pub fn completion_ratio(&self) -> f32 {
        self.answered as f32 / QUESTION_COUNT as f32
    }

    pub fn is_complete(&self) -> bool {
        self.answered == QUESTION_COUNT
    }

    /// First unanswered question, if any.
    pub fn next_unanswered(&self) -> Option<usize> {
        self.responses.iter().position(|&r| r == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn tables() -> Arc<VectorTables> {
        Arc::new(MatchConfig::generated(11).validate().unwrap())
    }

    fn assert_close(a: &TraitVector, b: &TraitVector) {
        for (axis, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!((x - y).abs() < 1e-5, "axis {}: {} vs {}", axis, x, y);
        }
    }

    #[test]
    fn test_overwrite_matches_rebuild() {
        let tables = tables();
        let mut incremental = TraitAccumulator::new(tables.clone());
        for q in 0..20 {
            assert!(incremental.answer(q, 4));
        }
        assert!(incremental.answer(0, 2));

        let mut responses = [0u8; QUESTION_COUNT];
        responses[0] = 2;
        for r in responses.iter_mut().take(20).skip(1) {
            *r = 4;
        }
        let mut rebuilt = TraitAccumulator::new(tables);
        rebuilt.rebuild_all(&responses);

        assert_close(&incremental.working_vector(), &rebuilt.working_vector());
        assert_eq!(incremental.answered_count(), 20);
        assert_eq!(rebuilt.answered_count(), 20);
        assert_eq!(incremental.responses(), responses);
    }

    #[test]
    fn test_random_sequences_match_rebuild() {
        let tables = tables();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..20 {
            let mut acc = TraitAccumulator::new(tables.clone());
            for _ in 0..300 {
                let q = rng.gen_range(0..QUESTION_COUNT);
                let r = rng.gen_range(1..=5u8);
                acc.answer(q, r);
            }
            let mut rebuilt = TraitAccumulator::new(tables.clone());
            rebuilt.rebuild_all(&acc.responses());
            assert_close(&acc.working_vector(), &rebuilt.working_vector());
            assert_eq!(acc.answered_count(), rebuilt.answered_count());
        }
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut acc = TraitAccumulator::new(tables());
        acc.answer(2, 3);
        let before = acc.working_vector();

        assert!(!acc.answer(QUESTION_COUNT, 3));
        assert!(!acc.answer(5, 0));
        assert!(!acc.answer(5, 6));

        assert_eq!(acc.working_vector(), before);
        assert_eq!(acc.answered_count(), 1);
        assert_eq!(acc.response(5), 0);
    }

    #[test]
    fn test_rebuild_sanitizes_stored_values() {
        let mut responses = [0u8; QUESTION_COUNT];
        responses[0] = 9;
        responses[1] = 5;
        let mut acc = TraitAccumulator::new(tables());
        acc.rebuild_all(&responses);
        assert_eq!(acc.answered_count(), 1);
        assert_eq!(acc.response(0), 0);
        assert_eq!(acc.next_unanswered(), Some(0));
    }

    #[test]
    fn test_completion_and_reset() {
        let mut acc = TraitAccumulator::new(tables());
        for q in 0..QUESTION_COUNT {
            acc.answer(q, 3);
        }
        assert!(acc.is_complete());
        assert_eq!(acc.completion_ratio(), 1.0);
        assert_eq!(acc.next_unanswered(), None);

        acc.reset();
        assert_eq!(acc.answered_count(), 0);
        assert_eq!(acc.working_vector(), [0.0; TRAIT_AXES]);
    }
}
