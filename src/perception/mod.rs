pub mod ref_system;
pub mod types;
