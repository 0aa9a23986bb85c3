pub mod log_message;
