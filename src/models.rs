pub mod cloud_instance;
pub mod machine_image;
pub mod security_group;
