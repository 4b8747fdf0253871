//! Question, weight, and projection tables plus the tuning knobs of every
//! component.
//!
//! The on-disk form ([`MatchConfig`]) is plain JSON with loosely-shaped
//! vectors; [`MatchConfig::validate`] checks every shape and produces the
//! fixed-size [`VectorTables`] the engine runs on.

use crate::error::ConfigError;
use crate::{CHOICE_COUNT, QUESTION_COUNT, REDUCED_AXES, TRAIT_AXES};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDef {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub choices: Vec<String>,
    /// Axis this question mainly loads on (0..30).
    pub target_axis: usize,
    /// One weight per response value 1..=5.
    pub weights: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    /// Magnitude below which normalization falls back to clamping.
    pub epsilon: f32,
    /// Lower bound on the completion ratio used for provisional rescaling.
    pub completion_floor: f32,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            epsilon: 1e-3,
            completion_floor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    pub max_units_per_frame: usize,
    pub target_fps: f32,
    pub history_len: usize,
    /// Seconds between rolling-average recomputations.
    pub sample_interval: f32,
    /// Fraction of target FPS below which the host counts as underperforming.
    pub underperform_ratio: f32,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_units_per_frame: 10,
            target_fps: 72.0,
            history_len: 60,
            sample_interval: 0.1,
            underperform_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    pub max_recommendations: usize,
    /// Seconds between periodic rescans.
    pub recalculation_interval: f32,
    /// Results at or below this similarity are dropped.
    pub similarity_threshold: f32,
    /// Local completion ratio that must be exceeded before any scan starts.
    pub min_completion: f32,
    pub epsilon: f32,
    /// Settle time after a peer publishes or hides before rescanning.
    pub profile_change_delay: f32,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            max_recommendations: 3,
            recalculation_interval: 2.0,
            similarity_threshold: 0.1,
            min_completion: 0.1,
            epsilon: 1e-3,
            profile_change_delay: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    /// Hard floor between two broadcasts, in seconds.
    pub min_interval: f32,
    /// Republish cadence while answering even without significant change.
    pub auto_interval: f32,
    pub vector_significance: f32,
    pub progress_significance: f32,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            min_interval: 1.0,
            auto_interval: 5.0,
            vector_significance: 0.1,
            progress_significance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub significance_threshold: f32,
    pub max_tags: usize,
    pub max_sentences: usize,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            significance_threshold: 0.3,
            max_tags: 3,
            max_sentences: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub base_delay: f32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub questions: Vec<QuestionDef>,
    /// 112x30 question-to-axis loadings. Derived from target axes when absent.
    pub weight_matrix: Option<Vec<Vec<f32>>>,
    /// 30x6 reduction. Grouped averaging is used when absent.
    pub projection_matrix: Option<Vec<Vec<f32>>>,
    pub axis_names: Vec<String>,
    pub reduced_axis_names: Vec<String>,
    pub vector: VectorSettings,
    pub performance: PerformanceSettings,
    pub matching: MatchingSettings,
    pub publishing: PublishSettings,
    pub summary: SummarySettings,
    pub storage: StorageSettings,
}

impl MatchConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Deterministic sample tables: Likert weights, one-hot loadings with
    /// small cross-loadings, and an orthonormal grouped projection.
    pub fn generated(seed: u64) -> Self {
        const LIKERT: [f32; CHOICE_COUNT] = [-1.0, -0.5, 0.0, 0.5, 1.0];
        let mut rng = StdRng::seed_from_u64(seed);

        let questions = (0..QUESTION_COUNT)
            .map(|q| {
                let mut weights = LIKERT.to_vec();
                // Every fourth item is reverse-keyed.
                if q % 4 == 3 {
                    weights.reverse();
                }
                QuestionDef {
                    text: format!("Question {}", q + 1),
                    choices: vec![
                        "Strongly disagree".into(),
                        "Disagree".into(),
                        "Neutral".into(),
                        "Agree".into(),
                        "Strongly agree".into(),
                    ],
                    target_axis: q % TRAIT_AXES,
                    weights,
                }
            })
            .collect::<Vec<_>>();

        let weight_matrix = questions
            .iter()
            .map(|question| {
                let mut row = vec![0.0f32; TRAIT_AXES];
                row[question.target_axis] = 1.0;
                for _ in 0..2 {
                    let axis = rng.gen_range(0..TRAIT_AXES);
                    if axis != question.target_axis {
                        row[axis] += rng.gen_range(-0.15..0.15);
                    }
                }
                row
            })
            .collect();

        let group_weight = 1.0 / ((TRAIT_AXES / REDUCED_AXES) as f32).sqrt();
        let projection_matrix = (0..TRAIT_AXES)
            .map(|axis| {
                let mut row = vec![0.0f32; REDUCED_AXES];
                row[axis * REDUCED_AXES / TRAIT_AXES] = group_weight;
                row
            })
            .collect();

        Self {
            questions,
            weight_matrix: Some(weight_matrix),
            projection_matrix: Some(projection_matrix),
            reduced_axis_names: [
                "Energy",
                "Imagination",
                "Warmth",
                "Structure",
                "Composure",
                "Drive",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ..Self::default()
        }
    }

    /// Checks every table shape and every tuning parameter.
    pub fn validate(&self) -> Result<VectorTables, ConfigError> {
        self.validate_settings()?;

        if self.questions.len() != QUESTION_COUNT {
            return Err(ConfigError::QuestionCount {
                expected: QUESTION_COUNT,
                found: self.questions.len(),
            });
        }

        let mut questions = Vec::with_capacity(QUESTION_COUNT);
        for (index, def) in self.questions.iter().enumerate() {
            if def.weights.len() != CHOICE_COUNT {
                return Err(ConfigError::ChoiceCount {
                    question: index,
                    expected: CHOICE_COUNT,
                    found: def.weights.len(),
                });
            }
            if let Some(bad) = def.weights.iter().position(|w| !w.is_finite()) {
                return Err(ConfigError::NonFiniteWeight {
                    question: index,
                    choice: bad + 1,
                });
            }
            if def.target_axis >= TRAIT_AXES {
                return Err(ConfigError::TargetAxis {
                    question: index,
                    axis: def.target_axis,
                    axes: TRAIT_AXES,
                });
            }
            let mut weights = [0.0; CHOICE_COUNT];
            weights.copy_from_slice(&def.weights);
            questions.push(Question {
                target_axis: def.target_axis,
                weights,
            });
        }

        let mut weight_matrix = Box::new([[0.0f32; TRAIT_AXES]; QUESTION_COUNT]);
        match &self.weight_matrix {
            Some(rows) => {
                copy_matrix(rows, weight_matrix.as_mut_slice()).map_err(|detail| {
                    ConfigError::WeightMatrixShape {
                        rows: QUESTION_COUNT,
                        cols: TRAIT_AXES,
                        detail,
                    }
                })?;
            }
            None => {
                for (row, question) in weight_matrix.iter_mut().zip(&questions) {
                    row[question.target_axis] = 1.0;
                }
            }
        }

        let projection = match &self.projection_matrix {
            Some(rows) => {
                let mut matrix = [[0.0f32; REDUCED_AXES]; TRAIT_AXES];
                copy_matrix(rows, matrix.as_mut_slice()).map_err(|detail| ConfigError::ProjectionShape {
                    rows: TRAIT_AXES,
                    cols: REDUCED_AXES,
                    detail,
                })?;
                Some(matrix)
            }
            None => None,
        };

        let axis_names = names_or_default(&self.axis_names, TRAIT_AXES, "trait", "Axis")?;
        let reduced_axis_names =
            names_or_default(&self.reduced_axis_names, REDUCED_AXES, "reduced", "Reduced")?;

        Ok(VectorTables {
            questions,
            weight_matrix,
            projection,
            axis_names,
            reduced_axis_names,
        })
    }

    fn validate_settings(&self) -> Result<(), ConfigError> {
        fn check(ok: bool, name: &'static str, reason: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::InvalidParameter {
                    name,
                    reason: reason.to_string(),
                })
            }
        }

        check(self.vector.epsilon > 0.0, "vector.epsilon", "must be positive")?;
        check(
            self.vector.completion_floor > 0.0 && self.vector.completion_floor <= 1.0,
            "vector.completion_floor",
            "must be in (0, 1]",
        )?;
        check(
            self.performance.max_units_per_frame >= 1,
            "performance.max_units_per_frame",
            "must be at least 1",
        )?;
        check(self.performance.target_fps > 0.0, "performance.target_fps", "must be positive")?;
        check(self.performance.history_len >= 1, "performance.history_len", "must be at least 1")?;
        check(
            self.performance.underperform_ratio > 0.0 && self.performance.underperform_ratio <= 1.0,
            "performance.underperform_ratio",
            "must be in (0, 1]",
        )?;
        check(
            self.matching.max_recommendations >= 1,
            "matching.max_recommendations",
            "must be at least 1",
        )?;
        check(
            self.matching.recalculation_interval > 0.0,
            "matching.recalculation_interval",
            "must be positive",
        )?;
        check(self.matching.epsilon > 0.0, "matching.epsilon", "must be positive")?;
        check(
            (0.0..1.0).contains(&self.matching.similarity_threshold),
            "matching.similarity_threshold",
            "must be in [0, 1)",
        )?;
        check(
            (0.0..1.0).contains(&self.matching.min_completion),
            "matching.min_completion",
            "must be in [0, 1)",
        )?;
        check(
            self.publishing.min_interval >= 0.0
                && self.publishing.auto_interval >= self.publishing.min_interval,
            "publishing.auto_interval",
            "must be at least publishing.min_interval",
        )?;
        check(self.storage.max_attempts >= 1, "storage.max_attempts", "must be at least 1")?;
        Ok(())
    }
}

fn copy_matrix<const C: usize>(rows: &[Vec<f32>], out: &mut [[f32; C]]) -> Result<(), String> {
    if rows.len() != out.len() {
        return Err(format!("found {} rows", rows.len()));
    }
    for (index, (src, dst)) in rows.iter().zip(out.iter_mut()).enumerate() {
        if src.len() != C {
            return Err(format!("row {} has {} columns", index, src.len()));
        }
        if let Some(bad) = src.iter().position(|v| !v.is_finite()) {
            return Err(format!("row {} column {} is not finite", index, bad));
        }
        dst.copy_from_slice(src);
    }
    Ok(())
}

fn names_or_default(
    names: &[String],
    expected: usize,
    kind: &'static str,
    prefix: &str,
) -> Result<Vec<String>, ConfigError> {
    if names.is_empty() {
        return Ok((0..expected).map(|i| format!("{}_{}", prefix, i)).collect());
    }
    if names.len() != expected {
        return Err(ConfigError::AxisNames {
            kind,
            expected,
            found: names.len(),
        });
    }
    Ok(names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if name.is_empty() {
                format!("{}_{}", prefix, i)
            } else {
                name.clone()
            }
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Question {
    pub target_axis: usize,
    pub weights: [f32; CHOICE_COUNT],
}

/// Validated, immutable tables. Shared between components through `Arc`.
#[derive(Debug, Clone)]
pub struct VectorTables {
    questions: Vec<Question>,
    weight_matrix: Box<[[f32; TRAIT_AXES]; QUESTION_COUNT]>,
    projection: Option<[[f32; REDUCED_AXES]; TRAIT_AXES]>,
    axis_names: Vec<String>,
    reduced_axis_names: Vec<String>,
}

impl VectorTables {
    pub fn question(&self, question: usize) -> Option<&Question> {
        self.questions.get(question)
    }

    /// Weight of `response` (1..=5) on `question`; zero for anything out of range.
    pub fn response_weight(&self, question: usize, response: u8) -> f32 {
        match (self.questions.get(question), response) {
            (Some(q), 1..=5) => q.weights[response as usize - 1],
            _ => 0.0,
        }
    }

    pub fn axis_weight(&self, question: usize, axis: usize) -> f32 {
        if question >= QUESTION_COUNT || axis >= TRAIT_AXES {
            return 0.0;
        }
        self.weight_matrix[question][axis]
    }

    pub(crate) fn weight_row(&self, question: usize) -> &[f32; TRAIT_AXES] {
        &self.weight_matrix[question]
    }

    pub fn projection(&self) -> Option<&[[f32; REDUCED_AXES]; TRAIT_AXES]> {
        self.projection.as_ref()
    }

    pub fn axis_name(&self, axis: usize) -> &str {
        self.axis_names.get(axis).map(String::as_str).unwrap_or("Axis")
    }

    pub fn reduced_axis_name(&self, axis: usize) -> &str {
        self.reduced_axis_names
            .get(axis)
            .map(String::as_str)
            .unwrap_or("Reduced")
    }
}
