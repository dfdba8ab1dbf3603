pub mod connection;
pub mod object_store;
pub mod redis_store;
pub mod secrets;
