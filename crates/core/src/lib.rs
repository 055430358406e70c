pub mod compositing;
pub mod inference;
pub mod pipeline;
pub mod shared;
pub mod stream;
