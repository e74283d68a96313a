pub mod log_buffer;
pub mod message;
pub mod task;
