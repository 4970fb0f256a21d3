//! Scripted in-memory collaborators for engine tests.

use async_trait::async_trait;
use onboard_client::{
    AdminToken, Document, EntityKind, ResourceServerClient, StoreClient, StoreError, TokenError,
    TokenProvider,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backends::Backends;
use crate::metrics::RepairMetrics;
use crate::retry::RetryPolicy;

type Reply = Result<Document, StoreError>;

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub method: &'static str,
    pub kind: Option<EntityKind>,
    pub id: Option<String>,
    pub path: Option<String>,
    pub doc: Option<Document>,
    pub token: String,
    pub url: Option<String>,
}

impl Call {
    fn new(method: &'static str, token: &str) -> Self {
        Self {
            method,
            kind: None,
            id: None,
            path: None,
            doc: None,
            token: token.to_string(),
            url: None,
        }
    }
}

/// Catalogue or resource server double with per-method scripted replies.
///
/// Queued replies are consumed first, then the fallback, then a plain success.
#[derive(Default)]
pub(crate) struct MockRemote {
    queued: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    fallback: Mutex<HashMap<&'static str, Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a one-shot reply for `method`.
    pub fn push(&self, method: &'static str, reply: Reply) {
        self.queued
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(reply);
    }

    /// Reply to every unscripted call of `method` with `reply`.
    pub fn always(&self, method: &'static str, reply: Reply) {
        self.fallback.lock().unwrap().insert(method, reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    fn answer(&self, call: Call) -> Reply {
        let method = call.method;
        self.calls.lock().unwrap().push(call);
        if let Some(reply) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        self.fallback
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or_else(|| Ok(ok_doc()))
    }
}

#[async_trait]
impl StoreClient for MockRemote {
    async fn create(&self, kind: EntityKind, doc: &Document, token: &str) -> Reply {
        self.answer(Call {
            kind: Some(kind),
            doc: Some(doc.clone()),
            ..Call::new("create", token)
        })
    }

    async fn update(&self, kind: EntityKind, doc: &Document, token: &str) -> Reply {
        self.answer(Call {
            kind: Some(kind),
            doc: Some(doc.clone()),
            ..Call::new("update", token)
        })
    }

    async fn delete(&self, kind: EntityKind, id: &str, path: Option<&str>, token: &str) -> Reply {
        self.answer(Call {
            kind: Some(kind),
            id: Some(id.to_string()),
            path: path.map(str::to_string),
            ..Call::new("delete", token)
        })
    }

    async fn get(&self, kind: EntityKind, id: &str, token: &str) -> Reply {
        self.answer(Call {
            kind: Some(kind),
            id: Some(id.to_string()),
            ..Call::new("get", token)
        })
    }

    async fn get_related(&self, id: &str, relation: &str, filters: &[&str], token: &str) -> Reply {
        self.answer(Call {
            id: Some(id.to_string()),
            path: Some(format!("{relation}[{}]", filters.join(","))),
            ..Call::new("get_related", token)
        })
    }
}

#[async_trait]
impl ResourceServerClient for MockRemote {
    async fn register(&self, url: &str, id: &str, token: &str) -> Reply {
        self.answer(Call {
            id: Some(id.to_string()),
            url: Some(url.to_string()),
            ..Call::new("register", token)
        })
    }

    async fn deregister(&self, url: &str, id: &str, token: &str) -> Reply {
        self.answer(Call {
            id: Some(id.to_string()),
            url: Some(url.to_string()),
            ..Call::new("deregister", token)
        })
    }
}

/// Token service double.
#[derive(Default)]
pub(crate) struct MockTokens {
    failure: Mutex<Option<TokenError>>,
    mints: AtomicU32,
}

impl MockTokens {
    pub fn fail_with(&self, msg: &str) {
        *self.failure.lock().unwrap() = Some(TokenError(msg.to_string()));
    }

    pub fn mints(&self) -> u32 {
        self.mints.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for MockTokens {
    async fn mint(&self) -> Result<AdminToken, TokenError> {
        self.mints.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(AdminToken::new(ADMIN_TOKEN)),
        }
    }
}

pub(crate) const ADMIN_TOKEN: &str = "admin-token";
pub(crate) const CALLER_TOKEN: &str = "caller-token";
pub(crate) const RS_URL: &str = "rs.example.org";

pub(crate) fn ok_doc() -> Document {
    doc(json!({"type": "urn:dx:cat:Success", "title": "Success"}))
}

pub(crate) fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

pub(crate) fn status(code: u16) -> StoreError {
    StoreError::Status {
        status: code,
        message: format!("status {code}"),
    }
}

pub(crate) fn timeout() -> StoreError {
    StoreError::Timeout {
        url: format!("https://{RS_URL}/ngsi-ld/v1/ingestion"),
    }
}

pub(crate) fn resource_server_relation() -> Document {
    doc(json!({"type": "urn:dx:cat:Success", "results": [{"resourceServerRegURL": RS_URL}]}))
}

/// Every collaborator mocked, with a fast three-attempt retry policy.
pub(crate) struct Harness {
    pub local: Arc<MockRemote>,
    pub central: Arc<MockRemote>,
    pub rs: Arc<MockRemote>,
    pub tokens: Arc<MockTokens>,
    pub backends: Backends,
    pub policy: Arc<RetryPolicy>,
    pub metrics: Arc<RepairMetrics>,
}

impl Harness {
    pub const MAX_ATTEMPTS: u32 = 3;

    pub fn new() -> Self {
        let local = MockRemote::new();
        let central = MockRemote::new();
        let rs = MockRemote::new();
        let tokens = Arc::new(MockTokens::default());
        let backends = Backends {
            local: local.clone(),
            central: central.clone(),
            tokens: tokens.clone(),
            resource_server: rs.clone(),
        };
        let policy = Arc::new(RetryPolicy {
            max_attempts: Self::MAX_ATTEMPTS,
            backoff_floor: Duration::from_millis(1),
            backoff_ceiling: Duration::from_millis(2),
            jitter: false,
            ..Default::default()
        });
        Self {
            local,
            central,
            rs,
            tokens,
            backends,
            policy,
            metrics: Arc::new(RepairMetrics::new()),
        }
    }

    /// Wait for every detached compensation to reach its terminal outcome.
    pub async fn settle(&self) {
        assert!(
            self.metrics.wait_idle(Duration::from_secs(5)).await,
            "compensation did not settle: {:?}",
            self.metrics.snapshot()
        );
    }
}
