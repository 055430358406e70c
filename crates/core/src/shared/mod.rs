pub mod constants;
pub mod error;
pub mod face_image;
pub mod face_region;
pub mod frame;
pub mod landmarks;
pub mod stream_info;
