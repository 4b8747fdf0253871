use crate::config::VectorTables;
use crate::{ReducedVector, TraitVector, REDUCED_AXES, TRAIT_AXES};

const GROUP_SIZE: usize = TRAIT_AXES / REDUCED_AXES;

/// Linear 30D -> 6D projection for public broadcast.
///
/// Without a configured matrix the 30 axes are split into six contiguous
/// groups of five and averaged. That path is degraded but usable.
#[derive(Debug, Clone, Copy)]
pub struct DimensionalityReducer {
    projection: Option<[[f32; REDUCED_AXES]; TRAIT_AXES]>,
}

impl DimensionalityReducer {
    pub fn new(tables: &VectorTables) -> Self {
        Self {
            projection: tables.projection().copied(),
        }
    }

    pub fn with_projection(projection: [[f32; REDUCED_AXES]; TRAIT_AXES]) -> Self {
        Self {
            projection: Some(projection),
        }
    }

    pub fn grouped() -> Self {
        Self { projection: None }
    }

    pub fn is_projected(&self) -> bool {
        self.projection.is_some()
    }

    pub fn reduce(&self, normalized: &TraitVector) -> ReducedVector {
        let mut out = [0.0; REDUCED_AXES];
        match &self.projection {
            Some(matrix) => {
                for (value, row) in normalized.iter().zip(matrix.iter()) {
                    for (acc, weight) in out.iter_mut().zip(row.iter()) {
                        *acc += value * weight;
                    }
                }
            }
            None => {
                for (acc, group) in out.iter_mut().zip(normalized.chunks_exact(GROUP_SIZE)) {
                    *acc = group.iter().sum::<f32>() / GROUP_SIZE as f32;
                }
            }
        }
        out.map(|v| v.clamp(-1.0, 1.0))
    }
}
