pub mod handler;
pub mod instance_handler;
