use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Which side of a chat an account sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    User,
    Shelter,
}

impl PartyRole {
    pub fn counterpart(self) -> PartyRole {
        match self {
            PartyRole::User => PartyRole::Shelter,
            PartyRole::Shelter => PartyRole::User,
        }
    }
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartyRole::User => write!(f, "user"),
            PartyRole::Shelter => write!(f, "shelter"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub shelter_id: Uuid,
    pub animal_id: Option<Uuid>,
    /// Snapshot taken at creation; survives edits or removal of the listing.
    pub animal_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub unread_count_user: i32,
    pub unread_count_shelter: i32,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(request: &NewChat, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            shelter_id: request.shelter_id,
            animal_id: request.animal_id,
            animal_name: request.animal_name.clone(),
            last_message: None,
            last_message_at: now,
            unread_count_user: 0,
            unread_count_shelter: 0,
            created_at: now,
        }
    }

    pub fn key(&self) -> ChatKey {
        ChatKey {
            user_id: self.user_id,
            shelter_id: self.shelter_id,
            animal_id: self.animal_id,
        }
    }

    pub fn role_of(&self, account_id: Uuid) -> Option<PartyRole> {
        if account_id == self.user_id {
            Some(PartyRole::User)
        } else if account_id == self.shelter_id {
            Some(PartyRole::Shelter)
        } else {
            None
        }
    }

    pub fn party_id(&self, role: PartyRole) -> Uuid {
        match role {
            PartyRole::User => self.user_id,
            PartyRole::Shelter => self.shelter_id,
        }
    }

    /// The party that is not `account_id`, or `None` when `account_id` is
    /// not in this chat.
    pub fn counterpart_of(&self, account_id: Uuid) -> Option<Uuid> {
        self.role_of(account_id)
            .map(|role| self.party_id(role.counterpart()))
    }

    pub fn require_role(&self, account_id: Uuid) -> Result<PartyRole> {
        self.role_of(account_id)
            .ok_or_else(|| Error::Forbidden("Account is not a party of this chat".into()))
    }

    pub fn unread_for(&self, role: PartyRole) -> i32 {
        match role {
            PartyRole::User => clamp_counter(self.unread_count_user),
            PartyRole::Shelter => clamp_counter(self.unread_count_shelter),
        }
    }

    /// Applies a send from `sender` to the chat record: updates the preview
    /// and bumps the recipient's counter. The sender's own counter is never
    /// touched.
    pub fn record_message(&mut self, sender: PartyRole, content: &str, at: DateTime<Utc>) {
        self.last_message = Some(content.to_string());
        self.last_message_at = at;
        match sender.counterpart() {
            PartyRole::User => {
                self.unread_count_user = clamp_counter(self.unread_count_user).saturating_add(1)
            }
            PartyRole::Shelter => {
                self.unread_count_shelter =
                    clamp_counter(self.unread_count_shelter).saturating_add(1)
            }
        }
    }

    pub fn reset_unread(&mut self, viewer: PartyRole) {
        match viewer {
            PartyRole::User => self.unread_count_user = 0,
            PartyRole::Shelter => self.unread_count_shelter = 0,
        }
    }
}

/// Counters are stored signed; anything below zero reads as zero.
pub fn clamp_counter(value: i32) -> i32 {
    value.max(0)
}

/// Natural key of a chat. At most one chat exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub user_id: Uuid,
    pub shelter_id: Uuid,
    pub animal_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewChat {
    pub user_id: Uuid,
    pub shelter_id: Uuid,
    pub animal_id: Option<Uuid>,
    pub animal_name: Option<String>,
}

impl NewChat {
    pub fn new(
        user_id: Uuid,
        shelter_id: Uuid,
        animal_id: Option<Uuid>,
        animal_name: Option<String>,
    ) -> Result<Self> {
        if user_id == shelter_id {
            return Err(Error::BadRequest(
                "An account cannot open a chat with itself".into(),
            ));
        }
        let animal_name = animal_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(Self {
            user_id,
            shelter_id,
            animal_id,
            animal_name,
        })
    }

    pub fn key(&self) -> ChatKey {
        ChatKey {
            user_id: self.user_id,
            shelter_id: self.shelter_id,
            animal_id: self.animal_id,
        }
    }
}

/// Canned opening message for the adoption flow.
pub fn adoption_interest_message(animal_name: Option<&str>) -> String {
    match animal_name {
        Some(name) => format!("I'm interested in adopting {}", name),
        None => "I'm interested in adopting one of your animals".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat() -> Chat {
        let request = NewChat::new(Uuid::new_v4(), Uuid::new_v4(), Some(Uuid::new_v4()), Some("Luna".into()))
            .unwrap();
        Chat::new(&request, Utc::now())
    }

    #[test]
    fn self_chat_is_rejected() {
        let id = Uuid::new_v4();
        assert!(matches!(
            NewChat::new(id, id, None, None),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn sends_only_bump_the_recipient() {
        let mut chat = chat();
        chat.record_message(PartyRole::User, "hola", Utc::now());
        assert_eq!(chat.unread_count_shelter, 1);
        assert_eq!(chat.unread_count_user, 0);

        chat.record_message(PartyRole::Shelter, "hello back", Utc::now());
        assert_eq!(chat.unread_count_user, 1);
        assert_eq!(chat.unread_count_shelter, 1);
        assert_eq!(chat.last_message.as_deref(), Some("hello back"));
    }

    #[test]
    fn reset_only_touches_the_viewer() {
        let mut chat = chat();
        chat.record_message(PartyRole::User, "a", Utc::now());
        chat.record_message(PartyRole::Shelter, "b", Utc::now());
        chat.reset_unread(PartyRole::User);
        assert_eq!(chat.unread_count_user, 0);
        assert_eq!(chat.unread_count_shelter, 1);
    }

    #[test]
    fn negative_counters_clamp_to_zero() {
        let mut chat = chat();
        chat.unread_count_user = -3;
        assert_eq!(chat.unread_for(PartyRole::User), 0);
        chat.record_message(PartyRole::Shelter, "x", Utc::now());
        assert_eq!(chat.unread_count_user, 1);
    }

    #[test]
    fn counterpart_resolution() {
        let chat = chat();
        assert_eq!(chat.counterpart_of(chat.user_id), Some(chat.shelter_id));
        assert_eq!(chat.counterpart_of(chat.shelter_id), Some(chat.user_id));
        assert_eq!(chat.counterpart_of(Uuid::new_v4()), None);
        assert!(chat.require_role(Uuid::new_v4()).is_err());
    }

    #[test]
    fn blank_animal_names_are_dropped() {
        let request = NewChat::new(Uuid::new_v4(), Uuid::new_v4(), None, Some("  ".into())).unwrap();
        assert!(request.animal_name.is_none());
        assert_eq!(
            adoption_interest_message(Some("Luna")),
            "I'm interested in adopting Luna"
        );
    }
}
