use std::sync::Arc;

use adoption_chat::{
    error::{Error, Result},
    models::account::Account,
    services::notification_service::{
        GatewayReceipt, NotificationResult, PushGateway, PushNotification,
    },
    store::{ChatStore, MemoryAccountDirectory, MemoryChatStore},
    AppState,
};
use async_trait::async_trait;
use mockall::{mock, predicate::always};
use uuid::Uuid;

mock! {
    pub Gateway {}

    #[async_trait]
    impl PushGateway for Gateway {
        async fn send(&self, notification: &PushNotification) -> Result<GatewayReceipt>;
    }
}

fn setup(gateway: Option<MockGateway>, shelter_token: Option<&str>) -> (AppState, MemoryChatStore, Account, Account) {
    let user = Account::new(Uuid::new_v4(), "Ana", false).with_push_token("user-player");
    let mut shelter = Account::new(Uuid::new_v4(), "Refugio Patitas", true);
    if let Some(token) = shelter_token {
        shelter = shelter.with_push_token(token);
    }
    let store = MemoryChatStore::new();
    let directory = MemoryAccountDirectory::with_accounts([user.clone(), shelter.clone()]);
    let gateway = gateway.map(|g| Arc::new(g) as Arc<dyn PushGateway>);
    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(directory),
        gateway,
        "test_secret_key",
        "https://adopt.example",
    );
    (state, store, user, shelter)
}

#[tokio::test]
async fn subscribed_recipient_gets_one_push() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_send()
        .withf(|n| {
            n.subscription == "shelter-player"
                && n.heading == "Message from Ana"
                && n.content == "I'm interested in adopting Luna"
                && n.data.animal_name == "Luna"
                && n.url.starts_with("https://adopt.example/chats/")
        })
        .times(1)
        .returning(|_| {
            Ok(GatewayReceipt {
                gateway_id: Some("notif-1".into()),
            })
        });
    let (state, _, user, shelter) = setup(Some(gateway), Some("shelter-player"));

    let started = state
        .chat_service
        .request_adoption(user.id, shelter.id, Some(Uuid::new_v4()), Some("Luna".into()))
        .await
        .unwrap();
    let result = started.notification.unwrap().await.unwrap();
    assert_eq!(
        result,
        NotificationResult::Sent {
            recipient_id: shelter.id,
            gateway_id: Some("notif-1".into()),
        }
    );
}

#[tokio::test]
async fn gateway_failure_does_not_undo_the_message() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_send()
        .with(always())
        .times(1)
        .returning(|_| Err(Error::Internal("gateway down".into())));
    let (state, store, user, shelter) = setup(Some(gateway), Some("shelter-player"));

    let chat = state
        .chat_service
        .get_or_create_chat(user.id, shelter.id, None, None)
        .await
        .unwrap()
        .chat;
    let delivery = state
        .chat_service
        .send_message(chat.id, user.id, "hello")
        .await
        .unwrap();

    let result = delivery.notification.await.unwrap();
    assert!(result.is_failure());

    let stored = store.find_chat(chat.id).await.unwrap().unwrap();
    assert_eq!(stored.unread_count_shelter, 1);
    assert_eq!(store.messages_for_chat(chat.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unsubscribed_recipient_skips_the_gateway() {
    let mut gateway = MockGateway::new();
    gateway.expect_send().times(0);
    let (state, _, user, shelter) = setup(Some(gateway), None);

    let chat = state
        .chat_service
        .get_or_create_chat(user.id, shelter.id, None, None)
        .await
        .unwrap()
        .chat;
    let result = state
        .notification_service
        .notify(chat.id, "hello", user.id)
        .await;
    assert_eq!(result, NotificationResult::NotSubscribed { recipient_id: shelter.id });
}

#[tokio::test]
async fn missing_gateway_reports_not_configured() {
    let (state, _, user, shelter) = setup(None, Some("shelter-player"));
    let chat = state
        .chat_service
        .get_or_create_chat(user.id, shelter.id, None, None)
        .await
        .unwrap()
        .chat;

    let result = state.notification_service.notify(chat.id, "hi", user.id).await;
    assert_eq!(result, NotificationResult::NotConfigured);
}

#[tokio::test]
async fn shelter_reply_targets_the_user() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_send()
        .withf(|n| n.subscription == "user-player" && n.heading == "Message from Refugio Patitas")
        .times(1)
        .returning(|_| Ok(GatewayReceipt { gateway_id: None }));
    let (state, _, user, shelter) = setup(Some(gateway), None);

    let chat = state
        .chat_service
        .get_or_create_chat(user.id, shelter.id, None, None)
        .await
        .unwrap()
        .chat;
    let delivery = state
        .chat_service
        .send_message(chat.id, shelter.id, "We'd love to meet you")
        .await
        .unwrap();
    let result = delivery.notification.await.unwrap();
    assert_eq!(
        result,
        NotificationResult::Sent {
            recipient_id: user.id,
            gateway_id: None,
        }
    );
}

#[tokio::test]
async fn unknown_chat_is_a_reported_failure() {
    let (state, _, user, _) = setup(None, None);
    let result = state
        .notification_service
        .notify(Uuid::new_v4(), "hi", user.id)
        .await;
    assert!(result.is_failure());
}
