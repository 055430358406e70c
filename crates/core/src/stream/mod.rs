pub mod domain;
pub mod endpoint;
pub mod infrastructure;
