pub mod jwt_verifier;
pub mod memory_directory;
