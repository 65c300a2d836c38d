//! User profiles.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::info;

use crate::cache::{CacheKeys, CacheService, CacheTags};
use crate::domain::entities::UserProfile;
use crate::domain::types::UserRole;

use super::error::AppError;
use super::repos::{DocumentStore, USERS_COLLECTION, decode, encode};
use super::transaction::{TransactionError, TransactionPolicy, run_transaction};

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

/// Blank values are ignored.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

pub struct UserService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CacheService>,
    policy: TransactionPolicy,
}

impl UserService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<CacheService>,
        policy: TransactionPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
        }
    }

    /// Create the profile unless one exists. The very first user is an admin.
    ///
    /// Returns the stored profile, new or existing.
    pub async fn create_profile(&self, profile: NewProfile) -> Result<UserProfile, AppError> {
        if let Some(existing) = self
            .store
            .get_document(USERS_COLLECTION, &profile.uid)
            .await?
        {
            return Ok(decode(USERS_COLLECTION, &profile.uid, existing)?);
        }

        let is_first_user = self
            .store
            .list_documents(USERS_COLLECTION)
            .await?
            .is_empty();
        let record = UserProfile {
            uid: profile.uid,
            email: profile.email,
            display_name: profile.display_name,
            photo_url: profile.photo_url,
            role: if is_first_user {
                UserRole::Admin
            } else {
                UserRole::Author
            },
        };

        let document = encode(USERS_COLLECTION, &record.uid, &record)?;
        self.store
            .set_document(USERS_COLLECTION, &record.uid, document)
            .await?;
        info!(uid = %record.uid, role = record.role.as_str(), "user profile created");

        self.invalidate(&record.uid).await;
        Ok(record)
    }

    pub async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        let key = CacheKeys::user(uid);
        if let Some(profile) = self.cache.get::<UserProfile>(&key).await {
            return Ok(Some(profile));
        }

        let Some(document) = self.store.get_document(USERS_COLLECTION, uid).await? else {
            return Ok(None);
        };
        let profile: UserProfile = decode(USERS_COLLECTION, uid, document)?;
        self.cache
            .set(
                &key,
                &profile,
                Some(self.cache.config().entity_ttl),
                &[CacheTags::USERS],
            )
            .await;
        Ok(Some(profile))
    }

    /// Every profile ordered by display name.
    pub async fn list_users(&self) -> Result<Vec<UserProfile>, AppError> {
        self.cache
            .get_or_set(
                &CacheKeys::all_users(),
                || async {
                    let documents = self.store.list_documents(USERS_COLLECTION).await?;
                    let mut users = documents
                        .into_iter()
                        .map(|(key, document)| {
                            decode::<UserProfile>(USERS_COLLECTION, &key, document)
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
                    Ok::<_, AppError>(users)
                },
                Some(self.cache.config().list_ttl),
                &[CacheTags::USERS],
            )
            .await
    }

    pub async fn update_role(&self, uid: &str, role: UserRole) -> Result<(), AppError> {
        self.patch(uid, &[("role", json!(role.as_str()))]).await?;
        info!(uid, role = role.as_str(), "user role updated");
        Ok(())
    }

    pub async fn update_profile(&self, uid: &str, update: ProfileUpdate) -> Result<(), AppError> {
        let mut fields = Vec::new();
        if let Some(name) = update.display_name.filter(|name| !name.trim().is_empty()) {
            fields.push(("displayName", json!(name)));
        }
        if let Some(url) = update.photo_url.filter(|url| !url.trim().is_empty()) {
            fields.push(("photoURL", json!(url)));
        }
        if fields.is_empty() {
            return Ok(());
        }

        self.patch(uid, &fields).await?;
        info!(uid, "user profile updated");
        Ok(())
    }

    async fn patch(&self, uid: &str, fields: &[(&str, Value)]) -> Result<(), AppError> {
        run_transaction(
            self.store.as_ref(),
            &self.policy,
            USERS_COLLECTION,
            uid,
            |mut document| {
                let object = document
                    .as_object_mut()
                    .ok_or_else(|| TransactionError::aborted("user document is not an object"))?;
                for (field, value) in fields {
                    object.insert((*field).to_string(), value.clone());
                }
                Ok((document, ()))
            },
        )
        .await?;

        self.invalidate(uid).await;
        Ok(())
    }

    async fn invalidate(&self, uid: &str) {
        self.cache.delete(&CacheKeys::user(uid)).await;
        self.cache.clear_by_tags(&[CacheTags::USERS]).await;
    }
}
