//! The persisted session record: two fixed keys in a [`KeyValueStore`].

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::credential::{Credential, Identity};
use super::storage::KeyValueStore;

/// Bearer token string
pub const TOKEN_KEY: &str = "mywallet_token";

/// Identity JSON
pub const USER_KEY: &str = "mywallet_user";

/// Read the record. Anything short of a token plus a parseable identity is
/// treated as no session and both keys are purged.
pub async fn load(store: &dyn KeyValueStore) -> Result<Option<(Credential, Identity)>> {
    let token = store.get(TOKEN_KEY).await?;
    let user = store.get(USER_KEY).await?;

    match (token, user) {
        (Some(token), Some(user)) => match serde_json::from_str::<Identity>(&user) {
            Ok(identity) => return Ok(Some((Credential::new(token), identity))),
            Err(e) => warn!(error = %e, "Stored identity is unreadable, discarding session"),
        },
        (None, None) => return Ok(None),
        (token, _) => debug!(has_token = token.is_some(), "Partial session record, discarding"),
    }

    clear(store).await?;
    Ok(None)
}

/// Write token then identity. On failure whatever was written is rolled back.
pub async fn save(store: &dyn KeyValueStore, credential: &Credential, identity: &Identity) -> Result<()> {
    let user = serde_json::to_string(identity).context("Failed to serialize identity")?;

    let written = async {
        store.set(TOKEN_KEY, &credential.token).await?;
        store.set(USER_KEY, &user).await
    }
    .await;

    if let Err(e) = written {
        if let Err(rollback) = clear(store).await {
            warn!(error = %rollback, "Failed to roll back partial session record");
        }
        return Err(e);
    }
    Ok(())
}

/// Replace only the token; the identity entry stays as is.
pub async fn save_token(store: &dyn KeyValueStore, credential: &Credential) -> Result<()> {
    store.set(TOKEN_KEY, &credential.token).await
}

/// Remove both keys. Both removals are attempted even if the first fails.
pub async fn clear(store: &dyn KeyValueStore) -> Result<()> {
    let token = store.remove(TOKEN_KEY).await;
    let user = store.remove(USER_KEY).await;
    token.and(user)
}
