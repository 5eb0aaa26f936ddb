pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod sync;

use std::sync::Arc;

use crate::services::{
    account_service::AccountService,
    chat_service::ChatService,
    notification_service::{NotificationService, PushGateway},
};
use crate::store::{AccountDirectory, ChatStore};

#[derive(Clone)]
pub struct AppState {
    pub chat_service: ChatService,
    pub account_service: AccountService,
    pub notification_service: NotificationService,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn AccountDirectory>,
        gateway: Option<Arc<dyn PushGateway>>,
        jwt_secret: &str,
        site_url: &str,
    ) -> Self {
        let account_service = AccountService::new(directory);
        let notification_service = NotificationService::new(
            store.clone(),
            account_service.clone(),
            gateway,
            site_url.to_string(),
        );
        let chat_service = ChatService::new(
            store,
            account_service.clone(),
            notification_service.clone(),
        );

        Self {
            chat_service,
            account_service,
            notification_service,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}
