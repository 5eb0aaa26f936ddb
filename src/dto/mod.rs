pub mod account_dto;
pub mod chat_dto;
