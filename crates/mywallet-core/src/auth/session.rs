use std::sync::Arc;

use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::credential::{Credential, Grant, Identity, LoginCredentials};
use super::error::AuthError;
use super::provider::IdentityProvider;
use super::record;
use super::storage::KeyValueStore;

/// Token and identity only ever exist together.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub credential: Credential,
    pub identity: Identity,
}

#[derive(Debug, Clone)]
enum State {
    /// Before the persisted record has been read.
    Unknown,
    SignedOut,
    SignedIn(SessionData),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Unknown,
    SignedOut,
    SignedIn(Identity),
}

impl SessionStatus {
    fn event(&self) -> Option<AuthEvent> {
        match self {
            SessionStatus::Unknown => None,
            SessionStatus::SignedOut => Some(AuthEvent::SignedOut),
            SessionStatus::SignedIn(identity) => Some(AuthEvent::SignedIn(identity.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
}

/// Single owner of "who is signed in and with what credential".
///
/// Reads are synchronous. Every mutation goes through `mutation`, so the
/// read-credential/decide/write-credential sequence of a refresh can't
/// interleave with another refresh, sign-in or sign-out.
pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    storage: Arc<dyn KeyValueStore>,
    state: RwLock<State>,
    mutation: Mutex<()>,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionStore {
    /// A store in the `Unknown` state. Call [`SessionStore::rehydrate`] before use.
    pub fn new(provider: Arc<dyn IdentityProvider>, storage: Arc<dyn KeyValueStore>) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Unknown);
        Self {
            provider,
            storage,
            state: RwLock::new(State::Unknown),
            mutation: Mutex::new(()),
            status_tx,
        }
    }

    /// Construct and rehydrate in one go.
    pub async fn open(provider: Arc<dyn IdentityProvider>, storage: Arc<dyn KeyValueStore>) -> Arc<Self> {
        let store = Arc::new(Self::new(provider, storage));
        store.rehydrate().await;
        store
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Resolve `Unknown` from the persisted record. Only the first call reads
    /// storage; later calls return the current status.
    pub async fn rehydrate(&self) -> SessionStatus {
        let _guard = self.mutation.lock().await;
        let resolved = !matches!(*self.state.read(), State::Unknown);
        if resolved {
            return self.status();
        }

        let next = match record::load(self.storage.as_ref()).await {
            Ok(Some((credential, identity))) => {
                info!(username = %identity.username, "Session restored");
                State::SignedIn(SessionData { credential, identity })
            }
            Ok(None) => {
                debug!("No stored session");
                State::SignedOut
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored session, discarding it");
                if let Err(e) = record::clear(self.storage.as_ref()).await {
                    warn!(error = %e, "Failed to remove unreadable session");
                }
                State::SignedOut
            }
        };
        self.commit(next);
        self.status()
    }

    pub async fn sign_in(&self, credentials: &LoginCredentials) -> Result<Identity, AuthError> {
        let _guard = self.mutation.lock().await;
        let grant = self.provider.login(credentials).await.map_err(|e| {
            warn!(username = %credentials.username, error = %e, "Sign-in failed");
            e
        })?;
        self.establish(grant).await
    }

    /// Create an account and sign into it.
    pub async fn sign_up(&self, credentials: &LoginCredentials) -> Result<Identity, AuthError> {
        let _guard = self.mutation.lock().await;
        let grant = self.provider.sign_up(credentials).await?;
        self.establish(grant).await
    }

    /// Persist a fresh grant, then switch memory over to it. Must hold `mutation`.
    async fn establish(&self, grant: Grant) -> Result<Identity, AuthError> {
        if let Err(e) = record::save(self.storage.as_ref(), &grant.credential, &grant.identity).await {
            warn!(error = %e, "Failed to persist session");
            // Put back whatever session was durable before this attempt
            let previous = self.state.read().clone();
            if let State::SignedIn(previous) = previous {
                if let Err(e) =
                    record::save(self.storage.as_ref(), &previous.credential, &previous.identity).await
                {
                    warn!(error = %e, "Failed to restore previous session record");
                }
            }
            return Err(AuthError::Storage(format!("{:#}", e)));
        }

        info!(username = %grant.identity.username, provider = self.provider.name(), "Signed in");
        self.provider.adopt(&grant);
        let Grant { credential, identity, .. } = grant;
        self.commit(State::SignedIn(SessionData {
            credential,
            identity: identity.clone(),
        }));
        Ok(identity)
    }

    /// Clear memory and storage. Never fails; storage and provider errors are logged.
    pub async fn sign_out(&self) {
        let _guard = self.mutation.lock().await;
        self.sign_out_locked().await;
    }

    async fn sign_out_locked(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), State::SignedOut);
        self.publish(SessionStatus::SignedOut);

        if let Err(e) = record::clear(self.storage.as_ref()).await {
            warn!(error = %e, "Failed to remove stored session");
        }

        if let State::SignedIn(data) = previous {
            info!(username = %data.identity.username, "Signed out");
            if let Err(e) = self.provider.sign_out(Some(&data.credential)).await {
                warn!(error = %e, "Identity provider sign-out failed");
            }
        }
    }

    pub fn current_token(&self) -> Option<Credential> {
        match &*self.state.read() {
            State::SignedIn(data) => Some(data.credential.clone()),
            _ => None,
        }
    }

    pub fn current_identity(&self) -> Option<Identity> {
        match &*self.state.read() {
            State::SignedIn(data) => Some(data.identity.clone()),
            _ => None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match &*self.state.read() {
            State::Unknown => SessionStatus::Unknown,
            State::SignedOut => SessionStatus::SignedOut,
            State::SignedIn(data) => SessionStatus::SignedIn(data.identity.clone()),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(*self.state.read(), State::SignedIn(_))
    }

    /// Ask the provider for a new credential for the current identity.
    /// On failure the session is left exactly as it was.
    pub async fn refresh(&self) -> Option<Credential> {
        let _guard = self.mutation.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Option<Credential> {
        let snapshot = self.state.read().clone();
        let current = match snapshot {
            State::SignedIn(data) => data,
            _ => return None,
        };

        let credential = match self.provider.refresh(&current.identity, &current.credential).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(username = %current.identity.username, error = %e, "Token refresh failed");
                return None;
            }
        };

        if let Err(e) = record::save_token(self.storage.as_ref(), &credential).await {
            warn!(error = %e, "Failed to persist refreshed token");
            return None;
        }

        debug!(username = %current.identity.username, "Token refreshed");
        self.commit(State::SignedIn(SessionData {
            credential: credential.clone(),
            identity: current.identity,
        }));
        Some(credential)
    }

    /// Recovery step after a request carrying `stale` was rejected.
    ///
    /// Concurrent callers queue on the mutation lock. The first one refreshes;
    /// the rest find a token different from the one they sent and reuse it
    /// without another provider call. If the refresh fails the session is
    /// signed out once, and later callers see `SignedOut` and get `None`.
    pub async fn refresh_or_invalidate(&self, stale: Option<&str>) -> Option<Credential> {
        let _guard = self.mutation.lock().await;

        let live = self.current_token();
        match live {
            None => return None,
            Some(live) if Some(live.token.as_str()) != stale => {
                debug!("Credential already replaced by a concurrent refresh");
                return Some(live);
            }
            Some(_) => {}
        }

        match self.refresh_locked().await {
            Some(credential) => Some(credential),
            None => {
                self.sign_out_locked().await;
                None
            }
        }
    }

    /// Sign out only if `rejected` is still the live token, so a session
    /// established in the meantime survives.
    pub async fn invalidate(&self, rejected: &str) {
        let _guard = self.mutation.lock().await;
        let still_live = self
            .current_token()
            .map(|c| c.token == rejected)
            .unwrap_or(false);
        if still_live {
            warn!("Credential rejected after refresh, signing out");
            self.sign_out_locked().await;
        }
    }

    /// Auth state changes as a stream: the current resolved state first, then
    /// each transition. Transitions that happen before the subscriber polls
    /// may be coalesced into the latest one. Dropping the stream unsubscribes.
    pub fn subscribe(&self) -> impl Stream<Item = AuthEvent> + Send + 'static {
        let rx = self.status_tx.subscribe();
        futures::stream::unfold((rx, true), |(mut rx, mut first)| async move {
            loop {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                first = false;
                let event = rx.borrow_and_update().event();
                if let Some(event) = event {
                    return Some((event, (rx, false)));
                }
            }
        })
    }

    fn commit(&self, next: State) {
        let status = match &next {
            State::Unknown => SessionStatus::Unknown,
            State::SignedOut => SessionStatus::SignedOut,
            State::SignedIn(data) => SessionStatus::SignedIn(data.identity.clone()),
        };
        *self.state.write() = next;
        self.publish(status);
    }

    fn publish(&self, status: SessionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;
    use crate::auth::record::{TOKEN_KEY, USER_KEY};
    use crate::auth::storage::{FileStore, MemoryStore};

    /// Accepts alice/secret, hands out T1, T2, ... on refresh.
    #[derive(Default)]
    struct FakeProvider {
        refreshes: AtomicUsize,
        fail_refresh: bool,
        sign_outs: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn login(&self, credentials: &LoginCredentials) -> Result<Grant, AuthError> {
            if credentials.username == "alice" && credentials.password == "secret" {
                Ok(Grant::new(Credential::new("T1"), Identity::new("alice")))
            } else {
                Err(AuthError::InvalidCredentials("Invalid credentials".into()))
            }
        }

        async fn refresh(&self, _identity: &Identity, _current: &Credential) -> Result<Credential, AuthError> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 2;
            if self.fail_refresh {
                Err(AuthError::InvalidCredentials("expired".into()))
            } else {
                Ok(Credential::new(format!("T{}", n)))
            }
        }

        async fn sign_out(&self, _current: Option<&Credential>) -> Result<(), AuthError> {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Storage that refuses every write.
    struct ReadOnlyStore;

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn remove(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn alice() -> LoginCredentials {
        LoginCredentials::new("alice", "secret")
    }

    async fn open(provider: FakeProvider) -> (Arc<SessionStore>, Arc<MemoryStore>) {
        let storage = Arc::new(MemoryStore::default());
        let store = SessionStore::open(Arc::new(provider), storage.clone()).await;
        (store, storage)
    }

    fn assert_consistent(store: &SessionStore, storage: &MemoryStore) {
        assert_eq!(store.current_token().is_some(), store.current_identity().is_some());
        let snapshot = storage.snapshot();
        assert_eq!(snapshot.contains_key(TOKEN_KEY), snapshot.contains_key(USER_KEY));
    }

    #[tokio::test]
    async fn test_starts_unknown_until_rehydrated() {
        let store = SessionStore::new(Arc::new(FakeProvider::default()), Arc::new(MemoryStore::default()));
        assert_eq!(store.status(), SessionStatus::Unknown);
        assert!(store.current_token().is_none());

        assert_eq!(store.rehydrate().await, SessionStatus::SignedOut);
    }

    #[tokio::test]
    async fn test_sign_in_writes_both_keys() {
        let (store, storage) = open(FakeProvider::default()).await;

        let identity = store.sign_in(&alice()).await.unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(store.current_token().unwrap().token, "T1");

        let snapshot = storage.snapshot();
        assert_eq!(snapshot.get(TOKEN_KEY).map(String::as_str), Some("T1"));
        assert_eq!(snapshot.get(USER_KEY).map(String::as_str), Some(r#"{"username":"alice"}"#));
        assert_consistent(&store, &storage);
    }

    #[tokio::test]
    async fn test_failed_sign_in_changes_nothing() {
        let (store, storage) = open(FakeProvider::default()).await;

        let err = store
            .sign_in(&LoginCredentials::new("alice", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials(_)));
        assert_eq!(store.status(), SessionStatus::SignedOut);
        assert!(storage.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_sign_in() {
        let store = SessionStore::open(Arc::new(FakeProvider::default()), Arc::new(ReadOnlyStore)).await;

        let err = store.sign_in(&alice()).await.unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
        assert!(!store.is_signed_in());
        assert!(store.current_token().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_is_idempotent() {
        let provider = Arc::new(FakeProvider::default());
        let storage = Arc::new(MemoryStore::default());
        let store = SessionStore::open(provider.clone(), storage.clone()).await;
        store.sign_in(&alice()).await.unwrap();

        store.sign_out().await;
        store.sign_out().await;

        assert_eq!(store.status(), SessionStatus::SignedOut);
        assert!(storage.snapshot().is_empty());
        // The provider only hears about the session that actually ended
        assert_eq!(provider.sign_outs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreadable_session_file_is_purged() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("session.json");
        std::fs::write(&file, r#"{"mywallet_tok"#).unwrap();
        let storage = Arc::new(FileStore::new(dir.path().to_path_buf()));

        let store = SessionStore::open(Arc::new(FakeProvider::default()), storage.clone()).await;
        assert_eq!(store.status(), SessionStatus::SignedOut);
        assert!(!file.exists());

        store.sign_in(&alice()).await.unwrap();
        store.sign_out().await;
        assert!(!file.exists());

        store.sign_in(&alice()).await.unwrap();
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap().as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_reload_restores_identity() {
        let storage = Arc::new(MemoryStore::default());
        let first = SessionStore::open(Arc::new(FakeProvider::default()), storage.clone()).await;
        first.sign_in(&alice()).await.unwrap();
        drop(first);

        let reloaded = SessionStore::open(Arc::new(FakeProvider::default()), storage.clone()).await;
        assert_eq!(reloaded.status(), SessionStatus::SignedIn(Identity::new("alice")));
        assert_eq!(reloaded.current_token().unwrap().token, "T1");
    }

    #[tokio::test]
    async fn test_refresh_replaces_token_keeps_identity() {
        let (store, storage) = open(FakeProvider::default()).await;
        store.sign_in(&alice()).await.unwrap();

        let refreshed = store.refresh().await.unwrap();
        assert_eq!(refreshed.token, "T2");
        assert_eq!(store.current_token().unwrap().token, "T2");
        assert_eq!(store.current_identity().unwrap(), Identity::new("alice"));
        assert_eq!(storage.snapshot().get(TOKEN_KEY).map(String::as_str), Some("T2"));
        assert_consistent(&store, &storage);
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_session() {
        let (store, storage) = open(FakeProvider {
            fail_refresh: true,
            ..Default::default()
        })
        .await;
        store.sign_in(&alice()).await.unwrap();

        assert!(store.refresh().await.is_none());
        assert_eq!(store.current_token().unwrap().token, "T1");
        assert_consistent(&store, &storage);
    }

    #[tokio::test]
    async fn test_refresh_when_signed_out() {
        let (store, _) = open(FakeProvider::default()).await;
        assert!(store.refresh().await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_or_invalidate_reuses_newer_token() {
        let provider = Arc::new(FakeProvider::default());
        let store = SessionStore::open(provider.clone(), Arc::new(MemoryStore::default())).await;
        store.sign_in(&alice()).await.unwrap();

        let first = store.refresh_or_invalidate(Some("T1")).await.unwrap();
        let second = store.refresh_or_invalidate(Some("T1")).await.unwrap();

        assert_eq!(first.token, "T2");
        assert_eq!(second.token, "T2");
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_or_invalidate_signs_out_on_failure() {
        let (store, storage) = open(FakeProvider {
            fail_refresh: true,
            ..Default::default()
        })
        .await;
        store.sign_in(&alice()).await.unwrap();

        assert!(store.refresh_or_invalidate(Some("T1")).await.is_none());
        assert_eq!(store.status(), SessionStatus::SignedOut);
        assert!(storage.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_spares_newer_session() {
        let (store, _) = open(FakeProvider::default()).await;
        store.sign_in(&alice()).await.unwrap();

        store.invalidate("T0").await;
        assert!(store.is_signed_in());

        store.invalidate("T1").await;
        assert!(!store.is_signed_in());
    }

    #[tokio::test]
    async fn test_subscribe_reports_transitions() {
        let (store, _) = open(FakeProvider::default()).await;
        let mut events = Box::pin(store.subscribe());

        assert_eq!(events.next().await, Some(AuthEvent::SignedOut));

        store.sign_in(&alice()).await.unwrap();
        assert_eq!(events.next().await, Some(AuthEvent::SignedIn(Identity::new("alice"))));

        store.sign_out().await;
        assert_eq!(events.next().await, Some(AuthEvent::SignedOut));

        // A new subscription starts over from the current state
        let mut again = Box::pin(store.subscribe());
        assert_eq!(again.next().await, Some(AuthEvent::SignedOut));
    }

    #[tokio::test]
    async fn test_dropping_subscription_has_no_effect() {
        let (store, _) = open(FakeProvider::default()).await;
        store.sign_in(&alice()).await.unwrap();

        let events = store.subscribe();
        drop(events);

        assert!(store.is_signed_in());
        store.sign_out().await;
        assert!(!store.is_signed_in());
    }

    #[tokio::test]
    async fn test_subscriber_waits_for_rehydration() {
        let storage = Arc::new(MemoryStore::default());
        record::save(storage.as_ref(), &Credential::new("T9"), &Identity::new("bob"))
            .await
            .unwrap();
        let store = Arc::new(SessionStore::new(Arc::new(FakeProvider::default()), storage));
        let mut events = Box::pin(store.subscribe());

        let rehydrating = store.clone();
        tokio::spawn(async move { rehydrating.rehydrate().await });

        assert_eq!(events.next().await, Some(AuthEvent::SignedIn(Identity::new("bob"))));
    }
}
