//! In-process transport for tests.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::api::{ApiRequest, Transport, Verb};
use crate::error::ApiError;

type Reply = Result<Value, ApiError>;

/// Records requests and answers them from canned responses.
///
/// `respond` sets a sticky answer for a verb and path. `gate` queues a
/// one-off answer the test releases by sending on the returned channel,
/// which takes precedence over the sticky one.
#[derive(Default)]
pub struct FakeTransport {
  requests: Mutex<Vec<ApiRequest>>,
  sticky: Mutex<HashMap<String, Reply>>,
  gates: Mutex<HashMap<String, VecDeque<oneshot::Receiver<Reply>>>>,
}

fn route(verb: Verb, path: &str) -> String {
  format!("{:?} {}", verb, path)
}

impl FakeTransport {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn respond(&self, verb: Verb, path: &str, reply: Reply) {
    self.sticky.lock().unwrap().insert(route(verb, path), reply);
  }

  pub fn gate(&self, verb: Verb, path: &str) -> oneshot::Sender<Reply> {
    let (tx, rx) = oneshot::channel();
    self
      .gates
      .lock()
      .unwrap()
      .entry(route(verb, path))
      .or_default()
      .push_back(rx);
    tx
  }

  pub fn requests(&self) -> Vec<ApiRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn count(&self, verb: Verb, path: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.verb == verb && r.path == path)
      .count()
  }
}

impl Transport for FakeTransport {
  fn send(&self, request: ApiRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
    let key = route(request.verb, &request.path);
    self.requests.lock().unwrap().push(request);

    let gated = self
      .gates
      .lock()
      .unwrap()
      .get_mut(&key)
      .and_then(VecDeque::pop_front);
    if let Some(rx) = gated {
      return Box::pin(async move {
        rx.await
          .unwrap_or_else(|_| Err(ApiError::network("gate dropped")))
      });
    }

    let reply = self
      .sticky
      .lock()
      .unwrap()
      .get(&key)
      .cloned()
      .unwrap_or_else(|| Err(ApiError::network(format!("no response for {}", key))));
    Box::pin(async move { reply })
  }
}

/// Give spawned fetches a moment to finish.
pub async fn settle() {
  tokio::time::sleep(Duration::from_millis(10)).await;
}
