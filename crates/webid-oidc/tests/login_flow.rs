//! End-to-end login flow tests.
//!
//! A redirect login spans two executions: the one that departs to the
//! provider and the fresh one constructed after the redirect back. These
//! tests run both halves against one shared store, reconstructing the
//! session between them the way a real page reload does.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use webid_oidc::{
    AuthError, AuthResult, AuthSession, HostWindow, IdTokenClaims, KeyValueStore, LoginOutcome,
    MemoryStore, PopupWindow, RegisterOptions, RelyingParty, RpClient, SessionConfig,
    ValidatedResponse,
};

const WEB_ID: &str = "https://alice.example/profile#me";
const NONCE_KEY: &str = "rp.nonce";

/// Host double: settable location, recorded navigations and history
/// replacements.
#[derive(Default)]
struct TestHost {
    location: Mutex<Option<Url>>,
    navigations: Mutex<Vec<Url>>,
    replacements: Mutex<Vec<Url>>,
}

impl TestHost {
    fn at(url: &str) -> Arc<Self> {
        let host = Self::default();
        *host.location.lock().unwrap() = Some(Url::parse(url).unwrap());
        Arc::new(host)
    }

    fn last_navigation(&self) -> Option<Url> {
        self.navigations.lock().unwrap().last().cloned()
    }

    fn visible_url(&self) -> Url {
        self.location.lock().unwrap().clone().unwrap()
    }
}

impl HostWindow for TestHost {
    fn current_location(&self) -> Option<Url> {
        self.location.lock().unwrap().clone()
    }

    fn navigate(&self, url: &Url) {
        self.navigations.lock().unwrap().push(url.clone());
    }

    fn replace_history(&self, url: &Url) {
        self.replacements.lock().unwrap().push(url.clone());
        *self.location.lock().unwrap() = Some(url.clone());
    }

    fn open_window(&self, _url: &Url, _name: &str, _features: &str) -> Option<Box<dyn PopupWindow>> {
        None
    }
}

/// RP double: clients carry a provider and a validation mode; requests
/// stash nonce material in the store like a real RP library would.
struct TestRp {
    registrations: AtomicUsize,
    rotate_keys: bool,
}

impl TestRp {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            registrations: AtomicUsize::new(0),
            rotate_keys: false,
        })
    }

    fn with_rotated_keys() -> Arc<Self> {
        Arc::new(Self {
            registrations: AtomicUsize::new(0),
            rotate_keys: true,
        })
    }
}

struct TestClient {
    provider: Url,
    rotate_keys: bool,
}

#[async_trait]
impl RpClient for TestClient {
    async fn create_request(&self, store: &dyn KeyValueStore) -> AuthResult<Url> {
        // A real RP stashes nonce/PKCE material keyed by the request.
        store.set(NONCE_KEY, "n-0001");
        let mut url = self.provider.join("authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("response_type", "id_token token")
            .append_pair("state", "st-0001")
            .append_pair("nonce", "n-0001");
        Ok(url)
    }

    async fn validate_response(
        &self,
        current_uri: &Url,
        store: &dyn KeyValueStore,
    ) -> AuthResult<ValidatedResponse> {
        if self.rotate_keys {
            return Err(AuthError::SigningKeyUnresolvable);
        }
        // The nonce written before the redirect must still be durable in
        // the post-redirect execution.
        if store.get(NONCE_KEY).as_deref() != Some("n-0001") {
            return Err(AuthError::auth_response_invalid("nonce material lost"));
        }
        let fragment = current_uri.fragment().unwrap_or_default();
        if !fragment.contains("id_token=") {
            return Err(AuthError::auth_response_invalid("no id_token in fragment"));
        }
        Ok(ValidatedResponse {
            id_token: "header.payload.sig".to_string(),
            access_token: "at-0001".to_string(),
            claims: IdTokenClaims::new(WEB_ID),
        })
    }

    fn serialize(&self) -> AuthResult<String> {
        Ok(format!(r#"{{"provider":"{}"}}"#, self.provider))
    }

    fn provider_url(&self) -> &Url {
        &self.provider
    }

    fn end_session_endpoint(&self) -> Option<Url> {
        None
    }
}

#[async_trait]
impl RelyingParty for TestRp {
    async fn register(
        &self,
        provider: &Url,
        _options: &RegisterOptions,
    ) -> AuthResult<Arc<dyn RpClient>> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TestClient {
            provider: provider.clone(),
            rotate_keys: self.rotate_keys,
        }))
    }

    fn reconstitute(&self, serialized: &str) -> AuthResult<Arc<dyn RpClient>> {
        let record: serde_json::Value = serde_json::from_str(serialized)?;
        let provider = record["provider"]
            .as_str()
            .and_then(|p| Url::parse(p).ok())
            .ok_or_else(|| AuthError::invalid_argument("bad registration record"))?;
        Ok(Arc::new(TestClient {
            provider,
            rotate_keys: self.rotate_keys,
        }))
    }
}

fn provider() -> Url {
    Url::parse("https://p.example/").unwrap()
}

fn web_id() -> Url {
    Url::parse(WEB_ID).unwrap()
}

/// Builds the callback URI the provider would redirect back to.
fn callback_uri(request: &Url) -> String {
    let state = webid_oidc::extract_state(request, webid_oidc::StateLocation::Query).unwrap();
    format!("https://app.example/#state={state}&id_token=header.payload.sig&access_token=at-0001")
}

#[tokio::test]
async fn test_fresh_login_issues_redirect_and_persists_correlation_record() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let host = TestHost::at("https://app.example/");
    let rp = TestRp::new();
    let mut session = AuthSession::new(
        host.clone(),
        Arc::clone(&store),
        rp.clone(),
        SessionConfig::new(),
    );

    let outcome = session.login(Some(provider())).await.unwrap();
    assert_eq!(outcome, LoginOutcome::RedirectIssued);
    assert_eq!(rp.registrations.load(Ordering::SeqCst), 1);

    // The correlation record exists under the documented key shape.
    assert_eq!(
        store.get("by-state.st-0001"),
        Some("https://p.example/".to_string())
    );
    // The client registration was persisted for the next execution.
    assert!(store.get("by-provider.https://p.example/").is_some());
    // The redirect went to the constructed authorization URI.
    let request = host.last_navigation().unwrap();
    assert!(request.as_str().starts_with("https://p.example/authorize?"));
}

#[tokio::test]
async fn test_callback_execution_resolves_web_id_and_persists_session() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let rp = TestRp::new();

    // Execution 1: depart for the provider.
    let host1 = TestHost::at("https://app.example/");
    let mut departing = AuthSession::new(
        host1.clone(),
        Arc::clone(&store),
        rp.clone(),
        SessionConfig::new(),
    );
    departing.login(Some(provider())).await.unwrap();
    let request = host1.last_navigation().unwrap();

    // Execution 2: the provider redirected back; a fresh session is
    // reconstructed from the shared store and the callback URI.
    let host2 = TestHost::at(&callback_uri(&request));
    let mut returning = AuthSession::new(
        host2.clone(),
        Arc::clone(&store),
        rp.clone(),
        SessionConfig::new(),
    );

    let user = returning.current_user().await.unwrap();
    assert_eq!(user, Some(web_id()));

    // The persisted client was reconstituted: exactly one registration
    // across both executions.
    assert_eq!(rp.registrations.load(Ordering::SeqCst), 1);

    // The session record landed in the store with the resolved WebID.
    let record: serde_json::Value =
        serde_json::from_str(&store.get("current-session").unwrap()).unwrap();
    assert_eq!(record["webId"], WEB_ID);
    assert_eq!(record["accessToken"], "at-0001");

    // Tokens no longer linger in the visible URI.
    assert_eq!(host2.visible_url().as_str(), "https://app.example/");

    // And the session survives yet another reload via the store alone.
    let host3 = TestHost::at("https://app.example/");
    let mut reloaded = AuthSession::new(host3, store, rp, SessionConfig::new());
    assert_eq!(reloaded.current_user().await.unwrap(), Some(web_id()));
}

#[tokio::test]
async fn test_rotated_signing_keys_resolve_not_logged_in() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let rp = TestRp::with_rotated_keys();

    let host1 = TestHost::at("https://app.example/");
    let mut departing = AuthSession::new(
        host1.clone(),
        Arc::clone(&store),
        rp.clone(),
        SessionConfig::new(),
    );
    departing.login(Some(provider())).await.unwrap();
    let request = host1.last_navigation().unwrap();

    let host2 = TestHost::at(&callback_uri(&request));
    let mut returning = AuthSession::new(
        host2.clone(),
        Arc::clone(&store),
        rp,
        SessionConfig::new(),
    );

    // login resolves rather than rejecting, with no identity.
    let outcome = returning.login(None).await.unwrap();
    assert_eq!(outcome, LoginOutcome::Incomplete);
    assert!(outcome.web_id().is_none());

    // The fragment was still cleared.
    assert_eq!(host2.visible_url().as_str(), "https://app.example/");
    assert!(store.get("current-session").is_none());
}

#[tokio::test]
async fn test_login_twice_without_redirect_returns_same_web_id() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let rp = TestRp::new();

    let host1 = TestHost::at("https://app.example/");
    let mut departing = AuthSession::new(
        host1.clone(),
        Arc::clone(&store),
        rp.clone(),
        SessionConfig::new(),
    );
    departing.login(Some(provider())).await.unwrap();
    let request = host1.last_navigation().unwrap();

    let host2 = TestHost::at(&callback_uri(&request));
    let mut returning = AuthSession::new(
        host2,
        Arc::clone(&store),
        rp.clone(),
        SessionConfig::new(),
    );

    let first = returning.login(None).await.unwrap();
    let second = returning.login(None).await.unwrap();
    assert_eq!(first, LoginOutcome::LoggedIn(web_id()));
    assert_eq!(second, LoginOutcome::LoggedIn(web_id()));

    // The second call short-circuited: still one registration, and one
    // validation round trip's worth of store traffic.
    assert_eq!(rp.registrations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cached_registration_is_never_reregistered() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let rp = TestRp::new();

    let host = TestHost::at("https://app.example/");
    let mut session = AuthSession::new(
        host.clone(),
        Arc::clone(&store),
        rp.clone(),
        SessionConfig::new(),
    );
    session.login(Some(provider())).await.unwrap();
    assert_eq!(rp.registrations.load(Ordering::SeqCst), 1);

    // A fresh execution against the same store reconstitutes instead of
    // registering again.
    let host2 = TestHost::at("https://app.example/");
    let mut second = AuthSession::new(host2, store, rp.clone(), SessionConfig::new());
    second.login(Some(provider())).await.unwrap();
    assert_eq!(rp.registrations.load(Ordering::SeqCst), 1);
}
