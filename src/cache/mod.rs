//! 共享存储之上的准入控制和旁路缓存

// 准入控制
pub mod admission;

// 旁路缓存
pub mod aside;

// 缓存键
pub mod keys;

pub mod memory;
pub mod redis_store;
pub mod store;

// 重新导出常用类型
pub use admission::{AdmissionConfig, AdmissionController, AdmissionOutcome, FailurePolicy};
pub use aside::{CacheAsideStore, CacheConfig};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{BoundedIncr, SharedStore, StoreError, bounded};
