use ndarray::Array4;
use shared::ClassProbability;
use std::sync::Arc;

use super::config::{Backend, ModelConfig};
use super::onnx::OnnxClassifier;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("failed to load model artifact: {0}")]
    Load(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("model returned {actual} scores for {expected} labels")]
    OutputShape { expected: usize, actual: usize },
    #[error("model returned a non-finite score")]
    NonFinite,
    #[error("backend {0:?} is not compiled into this build")]
    BackendUnavailable(Backend),
}

/// A loaded model that maps a preprocessed NHWC batch to one score per label.
///
/// Implementations are shared across actix workers and must be usable from
/// several threads at once.
pub trait ImageClassifier: Send + Sync {
    fn labels(&self) -> &[String];

    fn input_size(&self) -> u32;

    fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    pub probabilities: Vec<ClassProbability>,
}

pub fn classify(
    classifier: &dyn ImageClassifier,
    input: &Array4<f32>,
) -> Result<Prediction, InferenceError> {
    let scores = classifier.infer(input)?;
    let labels = classifier.labels();
    if scores.len() != labels.len() {
        return Err(InferenceError::OutputShape {
            expected: labels.len(),
            actual: scores.len(),
        });
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(InferenceError::NonFinite);
    }

    let (class_index, confidence) = argmax(&scores);
    let probabilities = labels
        .iter()
        .zip(&scores)
        .map(|(label, score)| ClassProbability {
            label: label.clone(),
            probability: score.clamp(0.0, 1.0),
        })
        .collect();

    Ok(Prediction {
        label: labels[class_index].clone(),
        class_index,
        confidence: confidence.clamp(0.0, 1.0),
        probabilities,
    })
}

/// Index and value of the largest score; the first one wins on ties.
fn argmax(scores: &[f32]) -> (usize, f32) {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, s)| if s > best.1 { (i, s) } else { best })
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Loads the artifact described by `config` with the configured backend.
pub fn load_classifier(config: &ModelConfig) -> Result<Arc<dyn ImageClassifier>, InferenceError> {
    log::info!(
        "Loading {:?} model from {} ({} labels)",
        config.backend,
        config.model_path.display(),
        config.labels.len()
    );
    match config.backend {
        Backend::Onnx => Ok(Arc::new(OnnxClassifier::load(config)?)),
        #[cfg(feature = "torch")]
        Backend::Torch => Ok(Arc::new(super::torch::TorchClassifier::load(config)?)),
        #[cfg(not(feature = "torch"))]
        Backend::Torch => Err(InferenceError::BackendUnavailable(Backend::Torch)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeClassifier;
    use std::path::PathBuf;

    fn input() -> Array4<f32> {
        Array4::zeros((1, 224, 224, 3))
    }

    #[test]
    fn picks_highest_probability() {
        let classifier = FakeClassifier::new(vec![0.2, 0.8]);
        let prediction = classify(&classifier, &input()).unwrap();
        assert_eq!(prediction.label, "PNEUMONIA");
        assert_eq!(prediction.class_index, 1);
        assert!((prediction.confidence - 0.8).abs() < 1e-6);
        assert_eq!(prediction.probabilities.len(), 2);
        assert_eq!(prediction.probabilities[0].label, "NORMAL");
    }

    #[test]
    fn ties_resolve_to_first_label() {
        let classifier = FakeClassifier::new(vec![0.5, 0.5]);
        let prediction = classify(&classifier, &input()).unwrap();
        assert_eq!(prediction.label, "NORMAL");
    }

    #[test]
    fn confidence_stays_in_unit_range() {
        for scores in [vec![1.3, -0.2], vec![0.0, 0.0], vec![0.01, 0.99]] {
            let classifier = FakeClassifier::new(scores);
            let prediction = classify(&classifier, &input()).unwrap();
            assert!((0.0..=1.0).contains(&prediction.confidence));
            assert!(["NORMAL", "PNEUMONIA"].contains(&prediction.label.as_str()));
        }
    }

    #[test]
    fn mismatched_output_length_is_an_error() {
        let classifier = FakeClassifier::new(vec![0.1, 0.2, 0.7]);
        let err = classify(&classifier, &input()).unwrap_err();
        assert!(matches!(err, InferenceError::OutputShape { expected: 2, actual: 3 }));
    }

    #[test]
    fn nan_scores_are_rejected() {
        let classifier = FakeClassifier::new(vec![f32::NAN, 0.5]);
        assert!(matches!(
            classify(&classifier, &input()),
            Err(InferenceError::NonFinite)
        ));
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[2.0, 1.0, 0.1]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn missing_artifact_fails_to_load() {
        let config = ModelConfig::from_yaml(
            "model_path: /nonexistent/model.onnx\nlabels: [NORMAL, PNEUMONIA]\n",
        )
        .unwrap();
        assert_eq!(config.model_path, PathBuf::from("/nonexistent/model.onnx"));
        assert!(matches!(load_classifier(&config), Err(InferenceError::Load(_))));
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn torch_backend_requires_feature() {
        let config = ModelConfig::from_yaml(
            "backend: torch\nmodel_path: model.pt\nlabels: [NORMAL, PNEUMONIA]\n",
        )
        .unwrap();
        assert!(matches!(
            load_classifier(&config),
            Err(InferenceError::BackendUnavailable(Backend::Torch))
        ));
    }
}
