pub mod alignment;
pub mod face_enhancer;
pub mod face_locator;
pub mod identity_embedder;
pub mod identity_swapper;
pub mod target_identity;
