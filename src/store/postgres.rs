use async_trait::async_trait;
use sqlx::{Acquire, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{AccountDirectory, AppendedMessage, ChatOpening, ChatStore, OpenOutcome};
use crate::error::{Error, Result};
use crate::models::account::Account;
use crate::models::chat::{Chat, NewChat};
use crate::models::message::{Message, MessageBody};

#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_or_fetch(
        tx: &mut Transaction<'_, Postgres>,
        request: &NewChat,
    ) -> Result<(Chat, bool)> {
        let inserted = sqlx::query_as::<_, Chat>(
            r#"
            INSERT INTO chats (user_id, shelter_id, animal_id, animal_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(request.shelter_id)
        .bind(request.animal_id)
        .bind(&request.animal_name)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(chat) = inserted {
            return Ok((chat, true));
        }

        let existing = sqlx::query_as::<_, Chat>(
            r#"
            SELECT * FROM chats
            WHERE user_id = $1 AND shelter_id = $2 AND animal_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(request.user_id)
        .bind(request.shelter_id)
        .bind(request.animal_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok((existing, false))
    }

    async fn append_in(
        tx: &mut Transaction<'_, Postgres>,
        chat_id: Uuid,
        sender_id: Uuid,
        body: &MessageBody,
    ) -> Result<AppendedMessage> {
        // Row lock on the chat serializes concurrent sends, so the preview,
        // timestamp and seq all follow commit order.
        let chat = sqlx::query_as::<_, Chat>(
            r#"
            UPDATE chats
            SET last_message = $2,
                last_message_at = GREATEST(clock_timestamp(), last_message_at),
                unread_count_user = unread_count_user
                    + CASE WHEN shelter_id = $3 THEN 1 ELSE 0 END,
                unread_count_shelter = unread_count_shelter
                    + CASE WHEN user_id = $3 THEN 1 ELSE 0 END
            WHERE id = $1 AND (user_id = $3 OR shelter_id = $3)
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(body.as_str())
        .bind(sender_id)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(chat) = chat else {
            let exists: bool =
                sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM chats WHERE id = $1)"#)
                    .bind(chat_id)
                    .fetch_one(&mut **tx)
                    .await?;
            return Err(if exists {
                Error::Forbidden("Account is not a party of this chat".into())
            } else {
                Error::NotFound("Chat not found".into())
            });
        };

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (chat_id, sender_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(sender_id)
        .bind(body.as_str())
        .bind(chat.last_message_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(AppendedMessage { chat, message })
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_chat(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(r#"SELECT * FROM chats WHERE id = $1"#)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(chat)
    }

    async fn get_or_create_chat(&self, request: &NewChat) -> Result<ChatOpening> {
        let mut tx = self.pool.begin().await?;
        let (chat, created) = Self::insert_or_fetch(&mut tx, request).await?;
        tx.commit().await?;
        if created {
            tracing::info!(chat_id = %chat.id, "chat created");
        }
        Ok(ChatOpening {
            chat,
            created,
            first_message: None,
        })
    }

    async fn create_chat_with_message(
        &self,
        request: &NewChat,
        opening: &MessageBody,
    ) -> Result<ChatOpening> {
        let mut tx = self.pool.begin().await?;
        let (chat, created) = Self::insert_or_fetch(&mut tx, request).await?;
        if !created {
            tx.commit().await?;
            return Ok(ChatOpening {
                chat,
                created: false,
                first_message: None,
            });
        }

        let appended = Self::append_in(&mut tx, chat.id, request.user_id, opening).await?;
        tx.commit().await?;
        tracing::info!(chat_id = %appended.chat.id, "chat created with opening message");
        Ok(ChatOpening {
            chat: appended.chat,
            created: true,
            first_message: Some(appended.message),
        })
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        body: &MessageBody,
    ) -> Result<AppendedMessage> {
        let mut tx = self.pool.begin().await?;
        let appended = Self::append_in(&mut tx, chat_id, sender_id, body).await?;
        tx.commit().await?;
        Ok(appended)
    }

    async fn open_chat(&self, chat_id: Uuid, viewer_id: Uuid) -> Result<OpenOutcome> {
        let mut tx = self.pool.begin().await?;

        let reset = sqlx::query(
            r#"
            UPDATE chats
            SET unread_count_user = CASE WHEN user_id = $2 THEN 0 ELSE unread_count_user END,
                unread_count_shelter = CASE WHEN shelter_id = $2 THEN 0 ELSE unread_count_shelter END
            WHERE id = $1 AND (user_id = $2 OR shelter_id = $2)
            "#,
        )
        .bind(chat_id)
        .bind(viewer_id)
        .execute(&mut *tx)
        .await?;

        if reset.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM chats WHERE id = $1)"#)
                    .bind(chat_id)
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists {
                Error::Forbidden("Account is not a party of this chat".into())
            } else {
                Error::NotFound("Chat not found".into())
            });
        }

        // The counter reset is what must land; read flags ride in a savepoint
        // so their failure does not take the reset down with them.
        let mut savepoint = tx.begin().await?;
        let marked = sqlx::query(
            r#"
            UPDATE messages
            SET read = TRUE
            WHERE chat_id = $1 AND sender_id <> $2 AND read = FALSE
            "#,
        )
        .bind(chat_id)
        .bind(viewer_id)
        .execute(&mut *savepoint)
        .await;

        let outcome = match marked {
            Ok(result) => {
                savepoint.commit().await?;
                OpenOutcome {
                    messages_marked_read: result.rows_affected(),
                    read_flags_applied: true,
                }
            }
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, error = ?e, "marking messages read failed");
                savepoint.rollback().await?;
                OpenOutcome {
                    messages_marked_read: 0,
                    read_flags_applied: false,
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn chats_for_account(&self, account_id: Uuid) -> Result<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(
            r#"
            SELECT * FROM chats
            WHERE user_id = $1 OR shelter_id = $1
            ORDER BY last_message_at DESC, created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chats)
    }

    async fn messages_for_chat(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE chat_id = $1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    async fn unread_total(&self, account_id: Uuid) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(
                GREATEST(CASE WHEN user_id = $1 THEN unread_count_user
                              ELSE unread_count_shelter END, 0)
            ), 0)::BIGINT
            FROM chats
            WHERE user_id = $1 OR shelter_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}

#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(r#"SELECT * FROM accounts WHERE id = $1"#)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_accounts(&self, account_ids: &[Uuid]) -> Result<Vec<Account>> {
        let accounts =
            sqlx::query_as::<_, Account>(r#"SELECT * FROM accounts WHERE id = ANY($1)"#)
                .bind(account_ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(accounts)
    }

    async fn set_push_token(&self, account_id: Uuid, token: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE accounts SET push_token = $2, updated_at = NOW() WHERE id = $1"#,
        )
        .bind(account_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, display_name, avatar_url, push_token, is_shelter)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET display_name = EXCLUDED.display_name,
                avatar_url = EXCLUDED.avatar_url,
                push_token = COALESCE(EXCLUDED.push_token, accounts.push_token),
                is_shelter = EXCLUDED.is_shelter,
                updated_at = NOW()
            "#,
        )
        .bind(account.id)
        .bind(&account.display_name)
        .bind(&account.avatar_url)
        .bind(&account.push_token)
        .bind(account.is_shelter)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
