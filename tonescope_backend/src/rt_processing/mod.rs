pub mod callback;
pub mod commands;
pub mod display_buffer;
pub mod fill;
pub mod performance;
