pub mod error;
pub mod session_store;
pub mod staging;
pub mod storage;
pub mod upload_service;
pub mod worker;
