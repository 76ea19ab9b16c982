use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub fn xavier_uniform<R: Rng>(rng: &mut R, size: usize) -> Vec<f64> {
    let limit = (6.0 / size.max(1) as f64).sqrt();
    (0..size)
        .map(|_| rng.gen_range(-limit..limit))
        .collect()
}

pub fn normal<R: Rng>(rng: &mut R, size: usize, mean: f64, std_dev: f64) -> Vec<f64> {
    (0..size)
        .map(|_| {
            // Box-Muller; 1 - u keeps the log argument in (0, 1].
            let u1: f64 = 1.0 - rng.gen::<f64>();
            let u2: f64 = rng.gen();
            let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
            z0 * std_dev + mean
        })
        .collect()
}

fn unit_length(mut vector: Vec<f64>) -> Vec<f64> {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    vector
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializationMethod {
    /// Non-negative uniform draws scaled to unit length.
    ScaledUniform,
    /// Absolute gaussian draws scaled to unit length.
    ScaledNormal,
    XavierUniform,
}

impl InitializationMethod {
    pub fn initialize<R: Rng>(&self, rng: &mut R, size: usize) -> Vec<f64> {
        match self {
            InitializationMethod::ScaledUniform => {
                unit_length((0..size).map(|_| 1.0 - rng.gen::<f64>()).collect())
            }
            InitializationMethod::ScaledNormal => {
                unit_length(normal(rng, size, 0.0, 1.0).into_iter().map(f64::abs).collect())
            }
            InitializationMethod::XavierUniform => xavier_uniform(rng, size),
        }
    }
}

/// Reproducible factor initialization: the same seed and salt always give
/// the same vectors.
#[derive(Debug, Clone)]
pub struct EmbeddingInitializer {
    method: InitializationMethod,
    dimension: usize,
    seed: u64,
}

impl EmbeddingInitializer {
    pub fn new(method: InitializationMethod, dimension: usize, seed: u64) -> Self {
        Self {
            method,
            dimension,
            seed,
        }
    }

    pub fn initialize_factors(&self, count: usize, salt: u64) -> Vec<DVector<f64>> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        (0..count)
            .map(|_| DVector::from_vec(self.method.initialize(&mut rng, self.dimension)))
            .collect()
    }
}
