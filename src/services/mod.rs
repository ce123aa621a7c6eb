pub mod account_service;
pub mod audit;
pub mod authorization;
pub mod document_registry;
pub mod document_service;
pub mod profile_service;
pub mod storage;
