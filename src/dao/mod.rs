/// Hash-style ephemeral storage with per-key expiry.
pub mod kv;
/// Process-local storage backends.
pub mod memory;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for persistent records.
pub mod store;
