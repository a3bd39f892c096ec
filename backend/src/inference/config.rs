use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ModelConfigError {
    #[error("failed to read model manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse model manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("model manifest must list at least two labels")]
    TooFewLabels,
    #[error("model input size must be positive")]
    InvalidInputSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Onnx,
    Torch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// Batch, height, width, channels. Keras exports expect this.
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub size: u32,
    pub layout: TensorLayout,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            size: 224,
            layout: TensorLayout::Nhwc,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Apply softmax to the raw output; leave off when the artifact already
    /// ends in a softmax layer.
    #[serde(default)]
    pub softmax: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,
    pub model_path: PathBuf,
    #[serde(default)]
    pub input: InputConfig,
    pub labels: Vec<String>,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_backend() -> Backend {
    Backend::Onnx
}

impl ModelConfig {
    /// Reads the manifest and resolves a relative `model_path` against the
    /// manifest's own directory.
    pub fn load(path: &Path) -> Result<Self, ModelConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ModelConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw)?;
        if config.model_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.model_path = dir.join(&config.model_path);
            }
        }
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ModelConfigError> {
        let config: ModelConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ModelConfigError> {
        if self.labels.len() < 2 {
            return Err(ModelConfigError::TooFewLabels);
        }
        if self.input.size == 0 {
            return Err(ModelConfigError::InvalidInputSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
backend: onnx
model_path: MobileNetV2_x-ray.onnx
input:
  size: 224
  layout: nhwc
labels:
  - NORMAL
  - PNEUMONIA
"#;

    #[test]
    fn parses_manifest_with_defaults() {
        let config = ModelConfig::from_yaml(MANIFEST).unwrap();
        assert_eq!(config.backend, Backend::Onnx);
        assert_eq!(config.input.size, 224);
        assert_eq!(config.input.layout, TensorLayout::Nhwc);
        assert_eq!(config.labels, vec!["NORMAL", "PNEUMONIA"]);
        assert!(!config.output.softmax);
    }

    #[test]
    fn rejects_single_label() {
        let raw = "model_path: m.onnx\nlabels: [NORMAL]\n";
        assert!(matches!(
            ModelConfig::from_yaml(raw),
            Err(ModelConfigError::TooFewLabels)
        ));
    }

    #[test]
    fn resolves_model_path_next_to_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("model.yaml");
        std::fs::write(&manifest, MANIFEST).unwrap();

        let config = ModelConfig::load(&manifest).unwrap();
        assert_eq!(config.model_path, dir.path().join("MobileNetV2_x-ray.onnx"));
    }

    #[test]
    fn missing_manifest_is_a_read_error() {
        let err = ModelConfig::load(Path::new("/nonexistent/model.yaml")).unwrap_err();
        assert!(matches!(err, ModelConfigError::Read { .. }));
    }
}
