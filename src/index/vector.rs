//! Embedding vector type and cosine math.

/// A dense f32 vector. Embeddings produced by the analyzer are
/// unit-length, so the cosine angle between two of them is their dot
/// product; [`cos_angle`](Vector::cos_angle) still guards against
/// non-normalized input.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    values: Vec<f32>,
}

impl Vector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Build a unit-length vector, leaving the zero vector untouched.
    pub fn unit(mut values: Vec<f32>) -> Self {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in values.iter_mut() {
                *v /= norm;
            }
        }
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dot(&self, other: &Vector) -> f32 {
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a * b)
            .sum()
    }

    fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Cosine of the angle between two vectors, in `[-1, 1]`; zero vectors
    /// compare as orthogonal.
    pub fn cos_angle(a: &Vector, b: &Vector) -> f32 {
        let denominator = a.norm() * b.norm();
        if denominator == 0.0 {
            return 0.0;
        }
        (a.dot(b) / denominator).clamp(-1.0, 1.0)
    }
}
