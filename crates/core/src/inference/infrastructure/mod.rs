pub mod execution_provider;
pub mod model_resolver;
pub mod onnx_face_embedder;
pub mod onnx_face_enhancer;
pub mod onnx_face_locator;
pub mod onnx_identity_swapper;
