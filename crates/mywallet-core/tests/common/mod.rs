// Allow dead code: not every suite uses every helper
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mywallet_core::auth::{
    AuthError, Credential, Grant, Identity, IdentityProvider, KeyValueStore, LoginCredentials,
    MemoryStore, SessionStore,
};
use mywallet_core::ApiClient;

/// Accepts alice/secret with token T1; each refresh mints T2, T3, ...
#[derive(Default)]
pub struct ScriptedProvider {
    pub fail_refresh: bool,
    refreshes: AtomicUsize,
    sign_outs: AtomicUsize,
}

impl ScriptedProvider {
    pub fn failing_refresh() -> Self {
        Self {
            fail_refresh: true,
            ..Default::default()
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn login(&self, credentials: &LoginCredentials) -> Result<Grant, AuthError> {
        if credentials.username == "alice" && credentials.password == "secret" {
            Ok(Grant::new(Credential::new("T1"), Identity::new("alice")))
        } else {
            Err(AuthError::InvalidCredentials("Invalid credentials".into()))
        }
    }

    async fn refresh(&self, _identity: &Identity, _current: &Credential) -> Result<Credential, AuthError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers time to pile up behind the refresh
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        if self.fail_refresh {
            Err(AuthError::InvalidCredentials("refresh rejected".into()))
        } else {
            Ok(Credential::new(format!("T{}", n + 2)))
        }
    }

    async fn sign_out(&self, _current: Option<&Credential>) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory store whose writes can be switched to fail and whose removals
/// can be slowed down.
#[derive(Default)]
pub struct ControlledStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    remove_delay_ms: AtomicU64,
}

impl ControlledStore {
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.snapshot()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn slow_removals(&self, delay: Duration) {
        self.remove_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for ControlledStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let delay = self.remove_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.remove(key).await
    }
}

pub struct Fixture {
    pub api: ApiClient,
    pub provider: Arc<ScriptedProvider>,
    pub storage: Arc<ControlledStore>,
}

impl Fixture {
    pub fn session(&self) -> &Arc<SessionStore> {
        self.api.session()
    }
}

/// API client against `base_url`, not signed in.
pub async fn fixture(base_url: &str, provider: ScriptedProvider) -> Fixture {
    fixture_with_timeout(base_url, provider, 30).await
}

pub async fn fixture_with_timeout(base_url: &str, provider: ScriptedProvider, timeout_secs: u64) -> Fixture {
    let provider = Arc::new(provider);
    let storage = Arc::new(ControlledStore::default());
    let session = SessionStore::open(provider.clone(), storage.clone()).await;
    let api = ApiClient::new(base_url, timeout_secs, session).expect("client builds");
    Fixture { api, provider, storage }
}

/// API client against `base_url`, signed in as alice with token T1.
pub async fn signed_in(base_url: &str, provider: ScriptedProvider) -> Fixture {
    let fixture = fixture(base_url, provider).await;
    fixture
        .session()
        .sign_in(&LoginCredentials::new("alice", "secret"))
        .await
        .expect("alice signs in");
    fixture
}

/// A local address nothing is listening on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}
