pub mod frame_compositor;
