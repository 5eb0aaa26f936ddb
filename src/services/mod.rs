pub mod account_service;
pub mod chat_service;
pub mod notification_service;
