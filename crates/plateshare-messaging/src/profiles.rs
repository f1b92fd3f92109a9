use crate::{Profile, Result, StorageAdapter, UserId};
use std::sync::Arc;

/// Read-mostly public profile snippets, owned by the (out-of-scope)
/// account system. The messaging core only reads them to decorate
/// conversation summaries and to tell registered callers apart from
/// unknown ids.
pub struct ProfileStore {
    storage: Arc<dyn StorageAdapter>,
}

fn profile_key(user: &UserId) -> String {
    format!("profile/{user}")
}

impl ProfileStore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    pub fn upsert(&self, profile: &Profile) -> Result<()> {
        self.storage
            .put(&profile_key(&profile.user_id), serde_json::to_string(profile)?)
    }

    pub fn get(&self, user: &UserId) -> Result<Option<Profile>> {
        let Some(raw) = self.storage.get(&profile_key(user))? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn exists(&self, user: &UserId) -> Result<bool> {
        Ok(self.storage.get(&profile_key(user))?.is_some())
    }
}
