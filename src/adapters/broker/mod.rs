pub mod memory_broker;
pub mod redis_broker;
