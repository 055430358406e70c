pub mod feather_compositor;
