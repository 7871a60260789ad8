//! Shared utilities: program resolution, name grammar, MAC generation.

pub mod binary;
pub mod mac;
pub mod names;

pub use binary::{is_writable_dir, resolve_program, validate_program, BinaryError};
pub use mac::random_mac;
pub use names::valid_name;
