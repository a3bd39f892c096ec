use ndarray::Array4;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, TchError, Tensor};

use super::classifier::{ImageClassifier, InferenceError};
use super::config::{ModelConfig, TensorLayout};

/// TorchScript backend. `CModule` is not `Sync`, so calls are serialized.
pub struct TorchClassifier {
    model: Mutex<CModule>,
    device: Device,
    labels: Vec<String>,
    input_size: u32,
    layout: TensorLayout,
    apply_softmax: bool,
}

impl TorchClassifier {
    pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(&config.model_path, device)
            .map_err(|e| InferenceError::Load(format!("{}: {}", config.model_path.display(), e)))?;
        log::info!("TorchScript model loaded on {:?}", device);

        Ok(Self {
            model: Mutex::new(model),
            device,
            labels: config.labels.clone(),
            input_size: config.input.size,
            layout: config.input.layout,
            apply_softmax: config.output.softmax,
        })
    }

    fn to_tensor(&self, input: &Array4<f32>) -> Result<Tensor, TchError> {
        let side = self.input_size as i64;
        let data: Vec<f32> = input.iter().copied().collect();
        let nhwc = Tensor::f_from_slice(&data)?.f_view([1, side, side, 3])?;
        let tensor = match self.layout {
            TensorLayout::Nhwc => nhwc,
            TensorLayout::Nchw => nhwc.f_permute([0, 3, 1, 2])?.f_contiguous()?,
        };
        tensor.f_to_device(self.device)
    }

    fn forward(&self, tensor: Tensor) -> Result<Vec<f32>, TchError> {
        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| TchError::Torch("model lock poisoned".to_string()))?;
            tch::no_grad(|| model.forward_ts(&[tensor]))?
        };
        let output = if self.apply_softmax {
            output.f_softmax(-1, Kind::Float)?
        } else {
            output.f_to_kind(Kind::Float)?
        };
        let output_flat = output.f_to_device(Device::Cpu)?.f_view([-1])?;
        Vec::<f32>::try_from(&output_flat)
    }
}

impl ImageClassifier for TorchClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        self.to_tensor(input)
            .and_then(|tensor| self.forward(tensor))
            .map_err(|e| InferenceError::Model(e.to_string()))
    }
}
