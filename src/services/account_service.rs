use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::account::Account;
use crate::store::AccountDirectory;

/// Single resolver for party display info and push subscriptions.
#[derive(Clone)]
pub struct AccountService {
    directory: Arc<dyn AccountDirectory>,
}

impl AccountService {
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve_party(&self, account_id: Uuid) -> Result<Option<Account>> {
        self.directory.find_account(account_id).await
    }

    /// Unknown ids are simply absent from the returned map.
    pub async fn resolve_parties(&self, account_ids: &[Uuid]) -> Result<HashMap<Uuid, Account>> {
        let mut ids = account_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let accounts = self.directory.find_accounts(&ids).await?;
        Ok(accounts.into_iter().map(|a| (a.id, a)).collect())
    }

    /// Stores the caller's push subscription id. A blank token clears it.
    /// Returns whether the account ends up subscribed.
    pub async fn register_push_token(&self, account_id: Uuid, token: Option<&str>) -> Result<bool> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let updated = self.directory.set_push_token(account_id, token).await?;
        if !updated {
            return Err(Error::NotFound("Account not found".into()));
        }
        tracing::info!(account_id = %account_id, subscribed = token.is_some(), "push token updated");
        Ok(token.is_some())
    }

    pub async fn upsert(&self, account: &Account) -> Result<()> {
        self.directory.upsert_account(account).await
    }

    /// Loads a JSON array of accounts into the directory. Returns the number
    /// of accounts written.
    pub async fn seed_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Cannot read accounts seed {}: {}", path.display(), e))
        })?;
        let accounts: Vec<Account> = serde_json::from_str(&raw)?;
        for account in &accounts {
            self.upsert(account).await?;
        }
        tracing::info!(count = accounts.len(), path = %path.display(), "accounts seeded");
        Ok(accounts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAccountDirectory;

    fn service() -> (AccountService, Account, Account) {
        let user = Account::new(Uuid::new_v4(), "Ana", false);
        let shelter = Account::new(Uuid::new_v4(), "Refugio Patitas", true);
        let directory = MemoryAccountDirectory::with_accounts([user.clone(), shelter.clone()]);
        (AccountService::new(Arc::new(directory)), user, shelter)
    }

    #[tokio::test]
    async fn resolves_known_parties_only() {
        let (svc, user, shelter) = service();
        let stranger = Uuid::new_v4();
        let map = svc
            .resolve_parties(&[user.id, shelter.id, stranger, user.id])
            .await
            .unwrap();
        assert_eq!(map.len(), 2);
        assert!(map[&shelter.id].is_shelter);
        assert!(!map.contains_key(&stranger));
    }

    #[tokio::test]
    async fn blank_token_clears_subscription() {
        let (svc, user, _) = service();
        assert!(svc.register_push_token(user.id, Some(" player-1 ")).await.unwrap());
        let stored = svc.resolve_party(user.id).await.unwrap().unwrap();
        assert_eq!(stored.push_subscription(), Some("player-1"));

        assert!(!svc.register_push_token(user.id, Some("  ")).await.unwrap());
        let stored = svc.resolve_party(user.id).await.unwrap().unwrap();
        assert_eq!(stored.push_subscription(), None);
    }

    #[tokio::test]
    async fn unknown_account_cannot_register() {
        let (svc, _, _) = service();
        let err = svc
            .register_push_token(Uuid::new_v4(), Some("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
