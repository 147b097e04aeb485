pub mod farewell_repository;
pub mod kv_store;
