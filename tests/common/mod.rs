//! Common test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use serde_json::Value;

use portfolio_api::mail::MessageId;
use portfolio_api::{
    build_app, AppState, ContactSubmission, ContentStore, DatabaseError, MailError, Mailer,
    Settings,
};

pub const TEST_API_KEY: &str = "test_key_123";

/// Mailer that records submissions instead of sending them
#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<ContactSubmission>>,
    pub failure: Option<fn() -> MailError>,
}

impl FakeMailer {
    pub fn failing(failure: fn() -> MailError) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(failure),
        }
    }

    pub fn sent(&self) -> Vec<ContactSubmission> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, submission: &ContactSubmission) -> Result<MessageId, MailError> {
        if let Some(failure) = self.failure {
            return Err(failure());
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push(submission.clone());
        Ok(format!("fake-message-{}", sent.len()))
    }
}

/// Content store backed by canned documents
#[derive(Default)]
pub struct FakeContentStore {
    pub collections: HashMap<String, Vec<Value>>,
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeContentStore {
    pub fn with(mut self, collection: &str, documents: Vec<Value>) -> Self {
        self.collections.insert(collection.to_string(), documents);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn documents(&self, collection: &str) -> Result<Vec<Value>, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DatabaseError::NotConnected);
        }
        Ok(self.collections.get(collection).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ContentStore for FakeContentStore {
    async fn find_one(&self, collection: &str) -> Result<Option<Value>, DatabaseError> {
        Ok(self.documents(collection)?.into_iter().next())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, DatabaseError> {
        self.documents(collection)
    }
}

/// Settings for tests: the given overrides on top of the defaults, with the
/// test API key configured
pub fn test_settings(pairs: &[(&str, &str)]) -> Settings {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("API_SECRET_KEY".to_string(), TEST_API_KEY.to_string());
    vars.insert("SITE_NAME".to_string(), "Test Site".to_string());
    for (key, value) in pairs {
        vars.insert(key.to_string(), value.to_string());
    }

    Settings::from_lookup(|key| vars.get(key).cloned()).expect("valid test settings")
}

pub struct TestApp {
    pub app: Router,
    pub mailer: Arc<FakeMailer>,
    pub content: Arc<FakeContentStore>,
}

pub fn setup_app_with(
    settings: Settings,
    mailer: FakeMailer,
    content: FakeContentStore,
) -> TestApp {
    let mailer = Arc::new(mailer);
    let content = Arc::new(content);
    let state = AppState::new(settings, content.clone(), mailer.clone());

    TestApp {
        app: build_app(state),
        mailer,
        content,
    }
}

pub fn setup_app() -> TestApp {
    setup_app_with(
        test_settings(&[]),
        FakeMailer::default(),
        FakeContentStore::default(),
    )
}

/// Attach the peer address the server would record for a real connection
pub fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().expect("valid socket address");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
