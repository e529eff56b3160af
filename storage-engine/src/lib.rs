//! Concrete page cache backends.

pub mod db;
pub mod factory;
pub mod hdd;
pub mod memory;
pub mod redis_store;

pub use db::DbBackend;
pub use factory::create_backend;
pub use hdd::HddBackend;
pub use memory::{MemoryBackend, MemoryEntry};
pub use redis_store::{RedisBackend, RedisBackendBuilder, RedisDialer};
