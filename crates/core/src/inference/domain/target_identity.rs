use crate::shared::face_image::FaceImage;

/// The fixed identity every detected face is swapped to.
///
/// Derived once from the configured source image during startup and
/// shared read-only (behind an `Arc`) with every worker afterwards, so
/// no locking is ever needed for reads.
#[derive(Clone, Debug)]
pub struct TargetIdentity {
    embedding: Vec<f32>,
    source_crop: FaceImage,
}

impl TargetIdentity {
    /// Stores the identity descriptor; the embedding is L2-normalized
    /// here so consumers can treat it as a unit latent.
    pub fn new(embedding: Vec<f32>, source_crop: FaceImage) -> Self {
        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        let embedding = if norm > 0.0 {
            embedding.iter().map(|v| v / norm).collect()
        } else {
            embedding
        };
        Self {
            embedding,
            source_crop,
        }
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn source_crop(&self) -> &FaceImage {
        &self.source_crop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_embedding_is_normalized() {
        let identity = TargetIdentity::new(vec![3.0, 4.0], FaceImage::filled(2, 2, 0));
        let e = identity.embedding();
        assert_relative_eq!(e[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(e[1], 0.8, epsilon = 1e-6);
        let norm: f32 = e.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_embedding_left_as_is() {
        let identity = TargetIdentity::new(vec![0.0, 0.0], FaceImage::filled(2, 2, 0));
        assert_eq!(identity.embedding(), &[0.0, 0.0]);
    }
}
