pub mod chat_service;
pub mod messaging_api;
pub mod notifier;
