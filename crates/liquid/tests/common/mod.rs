//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use liquid::{
    Connectivity, Error, Headers, Liquid, LiquidBuilder, MemoryStorage, Method, Response, Transport,
};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One exchange seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct Exchange {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
}

impl Exchange {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(self.body.as_deref().unwrap_or("null")).unwrap()
    }
}

/// Records every exchange and answers with a configurable status.
/// Liquid package requests get `package` as body.
pub struct ScriptedTransport {
    status: AtomicU16,
    package: Mutex<String>,
    exchanges: Mutex<Vec<Exchange>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            status: AtomicU16::new(200),
            package: Mutex::new(r#"{"values": []}"#.to_string()),
            exchanges: Mutex::new(Vec::new()),
        })
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn set_package(&self, package: &str) {
        *self.package.lock().unwrap() = package.to_string();
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.lock().unwrap().clone()
    }

    /// Exchanges whose URL ends with `suffix`.
    pub fn sent_to(&self, suffix: &str) -> Vec<Exchange> {
        self.exchanges()
            .into_iter()
            .filter(|e| e.url.ends_with(suffix))
            .collect()
    }

    /// Event names of every data point sent, in order.
    pub fn event_names(&self) -> Vec<String> {
        self.sent_to("/data_points")
            .iter()
            .map(|e| e.json()["event"]["name"].as_str().unwrap().to_string())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<&str>,
    ) -> Result<Response, Error> {
        self.exchanges.lock().unwrap().push(Exchange {
            method,
            url: url.to_string(),
            headers: headers.clone(),
            body: body.map(String::from),
        });
        if url.ends_with("liquid_package") {
            return Ok(Response::new(200, Some(self.package.lock().unwrap().clone())));
        }
        Ok(Response::new(self.status.load(Ordering::SeqCst), None))
    }
}

/// Connectivity probe that tests can flip.
#[derive(Default)]
pub struct Switch(AtomicBool);

impl Switch {
    pub fn online() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(true)))
    }

    pub fn offline() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(false)))
    }

    pub fn set(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for Switch {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builder wired to `transport`, with the periodic flush turned off.
pub fn builder(transport: &Arc<ScriptedTransport>) -> LiquidBuilder {
    Liquid::builder("tok_test")
        .storage(Arc::new(MemoryStorage::new()))
        .api_host("https://api.example.com/collect")
        .flush_interval(Duration::ZERO)
        .transport(transport.clone())
}

/// Wait until the worker processed everything submitted so far.
pub async fn settle(client: &Liquid) {
    client.pending_requests().await.unwrap();
}

/// Flush and wait for it to complete.
pub async fn flush(client: &Liquid) {
    client.flush().await.unwrap();
    settle(client).await;
}
