//! In-process gRPC store with scripted responses.
//!
//! [`MockStore`] implements both the streaming duplicate-detect service and
//! the batched get service. Duplicate-detect streams are scripted per
//! request start key so concurrently issued requests stay deterministic;
//! batched gets are served from an in-memory value map.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ingot_proto::proto::import_service_server::{ImportService, ImportServiceServer};
use ingot_proto::proto::kv_service_server::{KvService, KvServiceServer};
use ingot_proto::proto::{
    BatchGetRequest, BatchGetResponse, DuplicateDetectRequest, DuplicateDetectResponse, KvPair,
    RegionError,
};
use parking_lot::Mutex;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_stream::Stream;
use tonic::{Request, Response, Status};

/// Script of one duplicate-detect stream.
#[derive(Debug, Clone)]
pub enum DetectScript {
    /// Send these responses, then end the stream.
    Respond(Vec<DuplicateDetectResponse>),
    /// Send these responses, then keep the stream open until the client
    /// goes away.
    RespondThenHang(Vec<DuplicateDetectResponse>),
}

#[derive(Default)]
struct MockStoreState {
    detect_scripts: Mutex<HashMap<Vec<u8>, VecDeque<DetectScript>>>,
    default_script: Mutex<Option<DetectScript>>,
    values: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    detect_calls: AtomicUsize,
    batch_get_calls: AtomicUsize,
    responses_sent: Mutex<Option<tokio::sync::watch::Sender<usize>>>,
}

/// Scriptable store shared between the server task and the test body.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<MockStoreState>,
}

impl MockStore {
    /// A store answering every stream with an immediate EOF.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a script for the next duplicate-detect request starting at
    /// `start_key`.
    pub fn push_detect_script(&self, start_key: Vec<u8>, script: DetectScript) {
        self.state.detect_scripts.lock().entry(start_key).or_default().push_back(script);
    }

    /// Script served when no queued script matches a request.
    pub fn set_default_script(&self, script: DetectScript) {
        *self.state.default_script.lock() = Some(script);
    }

    /// Seeds a value served by batched gets.
    pub fn insert_value(&self, key: Vec<u8>, value: Vec<u8>) {
        self.state.values.lock().insert(key, value);
    }

    /// Number of duplicate-detect streams opened so far.
    pub fn detect_calls(&self) -> usize {
        self.state.detect_calls.load(Ordering::SeqCst)
    }

    /// Number of batched gets served so far.
    pub fn batch_get_calls(&self) -> usize {
        self.state.batch_get_calls.load(Ordering::SeqCst)
    }

    /// Watches the count of duplicate-detect responses delivered to clients.
    pub fn responses_sent(&self) -> tokio::sync::watch::Receiver<usize> {
        let mut guard = self.state.responses_sent.lock();
        match guard.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = tokio::sync::watch::channel(0);
                *guard = Some(sender);
                receiver
            }
        }
    }

    fn pop_script(&self, start_key: &[u8]) -> DetectScript {
        if let Some(queue) = self.state.detect_scripts.lock().get_mut(start_key) {
            if let Some(script) = queue.pop_front() {
                return script;
            }
        }
        self.state
            .default_script
            .lock()
            .clone()
            .unwrap_or(DetectScript::Respond(Vec::new()))
    }

    fn note_response_sent(&self) {
        if let Some(sender) = self.state.responses_sent.lock().as_ref() {
            sender.send_modify(|count| *count += 1);
        }
    }
}

#[tonic::async_trait]
impl ImportService for MockStore {
    type DuplicateDetectStream =
        Pin<Box<dyn Stream<Item = Result<DuplicateDetectResponse, Status>> + Send>>;

    async fn duplicate_detect(
        &self,
        request: Request<DuplicateDetectRequest>,
    ) -> Result<Response<Self::DuplicateDetectStream>, Status> {
        self.state.detect_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.pop_script(&request.into_inner().start_key);
        let store = self.clone();
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            let (responses, hang) = match script {
                DetectScript::Respond(responses) => (responses, false),
                DetectScript::RespondThenHang(responses) => (responses, true),
            };
            for response in responses {
                if tx.send(Ok(response)).await.is_err() {
                    return;
                }
                store.note_response_sent();
            }
            if hang {
                // Keep the sender alive until the client hangs up.
                tx.closed().await;
            }
        });
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

#[tonic::async_trait]
impl KvService for MockStore {
    async fn kv_batch_get(
        &self,
        request: Request<BatchGetRequest>,
    ) -> Result<Response<BatchGetResponse>, Status> {
        self.state.batch_get_calls.fetch_add(1, Ordering::SeqCst);
        let request = request.into_inner();
        let values = self.state.values.lock();
        let pairs = request
            .keys
            .iter()
            .filter_map(|key| {
                values.get(key).map(|value| KvPair {
                    key: key.clone(),
                    value: value.clone(),
                    commit_ts: request.version,
                })
            })
            .collect();
        Ok(Response::new(BatchGetResponse { region_error: None, error: None, pairs }))
    }
}

/// A running mock store bound to an ephemeral port.
pub struct MockStoreServer {
    /// Address the server listens on.
    pub addr: SocketAddr,
    /// Handle to script responses and read counters.
    pub store: MockStore,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for MockStoreServer {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Starts a mock store on `127.0.0.1:0`.
pub async fn spawn_mock_store() -> MockStoreServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock store listener");
    let addr = listener.local_addr().expect("listener has no local addr");
    let store = MockStore::new();
    let import = store.clone();
    let kv = store.clone();
    let server = tokio::spawn(async move {
        let _ = tonic::transport::Server::builder()
            .add_service(ImportServiceServer::new(import))
            .add_service(KvServiceServer::new(kv))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await;
    });
    MockStoreServer { addr, store, server }
}

/// A response carrying collision pairs.
pub fn pairs_response(pairs: Vec<(Vec<u8>, Vec<u8>)>) -> DuplicateDetectResponse {
    DuplicateDetectResponse {
        region_error: None,
        key_error: None,
        pairs: pairs
            .into_iter()
            .map(|(key, value)| KvPair { key, value, commit_ts: 1 })
            .collect(),
    }
}

/// A response reporting a region error.
pub fn region_error_response(message: &str) -> DuplicateDetectResponse {
    DuplicateDetectResponse {
        region_error: Some(RegionError { message: message.to_string() }),
        key_error: None,
        pairs: Vec::new(),
    }
}
