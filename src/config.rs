//! Quantization configuration.

use serde::{Deserialize, Serialize};

use crate::error::{MatrixError, Result};

/// Largest codebook addressable by a one-byte code.
pub const MAX_CODEBOOK_SIZE: usize = 256;

/// Parameters fixed at quantization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeConfig {
    /// Columns per sub-vector.
    pub dsub: usize,
    /// Quantize row norms separately from row directions.
    pub qnorm: bool,
    /// Centroids per sub-vector codebook.
    pub codebook_size: usize,
    /// Lloyd iterations per codebook.
    pub iterations: usize,
    /// Training sample cap, expressed per centroid.
    pub max_points_per_cluster: usize,
    /// Seed for sampling and centroid initialization.
    pub seed: u64,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            dsub: 2,
            qnorm: false,
            codebook_size: MAX_CODEBOOK_SIZE,
            iterations: 25,
            max_points_per_cluster: 256,
            seed: 1234,
        }
    }
}

impl QuantizeConfig {
    #[must_use]
    pub fn with_dsub(mut self, dsub: usize) -> Self {
        self.dsub = dsub;
        self
    }

    #[must_use]
    pub fn with_qnorm(mut self, qnorm: bool) -> Self {
        self.qnorm = qnorm;
        self
    }

    #[must_use]
    pub fn with_codebook_size(mut self, codebook_size: usize) -> Self {
        self.codebook_size = codebook_size;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Configure a deterministic seed.
    ///
    /// Quantizing the same matrix twice with the same seed yields identical codes.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check that every parameter is usable.
    pub fn validate(&self) -> Result<()> {
        if self.dsub == 0 {
            return Err(MatrixError::invalid("dsub must be greater than 0"));
        }
        if self.codebook_size == 0 || self.codebook_size > MAX_CODEBOOK_SIZE {
            return Err(MatrixError::invalid(format!(
                "codebook_size must be in 1..={MAX_CODEBOOK_SIZE}, got {}",
                self.codebook_size
            )));
        }
        if self.iterations == 0 {
            return Err(MatrixError::invalid("iterations must be greater than 0"));
        }
        if self.max_points_per_cluster == 0 {
            return Err(MatrixError::invalid(
                "max_points_per_cluster must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MatrixError::invalid(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QuantizeConfig::default();
        assert_eq!(config.dsub, 2);
        assert!(!config.qnorm);
        assert_eq!(config.codebook_size, 256);
        assert_eq!(config.iterations, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_dsub() {
        let config = QuantizeConfig::default().with_dsub(0);
        assert!(matches!(
            config.validate(),
            Err(MatrixError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_codebook() {
        let config = QuantizeConfig::default().with_codebook_size(257);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_partial_fields() {
        let config = QuantizeConfig::from_json_str(r#"{"dsub": 4, "qnorm": true}"#).unwrap();
        assert_eq!(config.dsub, 4);
        assert!(config.qnorm);
        assert_eq!(config.seed, 1234);
    }

    #[test]
    fn test_json_invalid_values() {
        assert!(QuantizeConfig::from_json_str(r#"{"dsub": 0}"#).is_err());
        assert!(QuantizeConfig::from_json_str("not json").is_err());
    }
}
