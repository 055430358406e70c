pub mod degradation;
pub mod frame_queue;
pub mod infrastructure;
pub mod pipeline_executor;
pub mod pipeline_logger;
pub mod pipeline_stats;
pub mod reorder_buffer;
pub mod swap_stream_use_case;
