pub mod classifier;
pub mod config;
pub mod onnx;
pub mod preprocess;
#[cfg(feature = "torch")]
pub mod torch;
