pub mod aws_service;
pub mod compute;
pub mod launch_service;
pub mod network_service;
pub mod startup_script;
