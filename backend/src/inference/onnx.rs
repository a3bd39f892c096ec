use ndarray::Array4;
use tract_onnx::prelude::*;

use super::classifier::{ImageClassifier, InferenceError, softmax};
use super::config::{ModelConfig, TensorLayout};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

pub struct OnnxClassifier {
    plan: OnnxPlan,
    labels: Vec<String>,
    input_size: u32,
    layout: TensorLayout,
    apply_softmax: bool,
}

impl OnnxClassifier {
    pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let side = config.input.size as usize;
        let shape = input_shape(config.input.layout, side);

        let plan = tract_onnx::onnx()
            .model_for_path(&config.model_path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(shape[0], shape[1], shape[2], shape[3])),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::Load(format!("{}: {}", config.model_path.display(), e)))?;

        Ok(Self {
            plan,
            labels: config.labels.clone(),
            input_size: config.input.size,
            layout: config.input.layout,
            apply_softmax: config.output.softmax,
        })
    }
}

fn input_shape(layout: TensorLayout, side: usize) -> [usize; 4] {
    match layout {
        TensorLayout::Nhwc => [1, side, side, 3],
        TensorLayout::Nchw => [1, 3, side, side],
    }
}

impl ImageClassifier for OnnxClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let data: Vec<f32> = match self.layout {
            TensorLayout::Nhwc => input.iter().copied().collect(),
            TensorLayout::Nchw => input.view().permuted_axes([0, 3, 1, 2]).iter().copied().collect(),
        };
        let shape = input_shape(self.layout, self.input_size as usize);
        let tensor = Tensor::from_shape(&shape, &data).map_err(|e| InferenceError::Model(e.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        let output = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        let scores: Vec<f32> = output.iter().copied().collect();

        if self.apply_softmax {
            Ok(softmax(&scores))
        } else {
            Ok(scores)
        }
    }
}
