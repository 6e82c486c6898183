//! Remote quantum-manager wire protocol: a parallel-mode timeline keeps its
//! own locally-owned keys but resolves keys owned by a peer timeline through
//! a server process shared by the whole run (§6 External Interfaces, §9).
//!
//! The server runs as an async tokio task multiplexing many client
//! connections; the client is deliberately a *blocking* wrapper (it parks the
//! calling thread on `Handle::block_on`) so every other part of the kernel —
//! which assumes synchronous, in-order quantum-manager calls — never has to
//! be rewritten around futures.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use parking_lot::{Mutex, RwLock};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;

use super::circuit::Circuit;
use super::manager::{QuantumManager, QuantumManagerHandle};
use super::state::{QuantumStateData, StateKey};
use crate::error::{Result, SimError};

/// One frame of the wire protocol: a `u32` big-endian length prefix followed
/// by a JSON body, mirroring the length-prefixed framing every socket-based
/// protocol in this codebase uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireRequest {
    Get { key: StateKey },
    Set { keys: Vec<StateKey>, state: QuantumStateData },
    Run { keys: Vec<StateKey>, circuit: Circuit, rng_seed: u64 },
    Remove { key: StateKey },
    Terminate,
    Sync,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireResponse {
    State(QuantumStateData),
    RunResult(Vec<bool>),
    Ack,
    Error(String),
}

pub async fn write_frame<W: AsyncWriteExt + Unpin>(stream: &mut W, body: &impl Serialize) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let mut framed = BytesMut::with_capacity(4 + payload.len());
    framed.put_u32(payload.len() as u32);
    framed.extend_from_slice(&payload);
    stream.write_all(&framed).await?;
    Ok(())
}

pub async fn read_frame<R: AsyncReadExt + Unpin, T: for<'de> Deserialize<'de>>(stream: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    let mut cursor = BytesMut::from(&body[..]);
    let value = serde_json::from_slice(cursor.chunk())?;
    cursor.advance(cursor.len());
    Ok(value)
}

/// Single-process multiplexing server. The original SeQUeNCe design uses a
/// `select()` loop over blocking sockets; a tokio task-per-connection loop is
/// the idiomatic equivalent here and keeps the same invariant (one shared
/// `QuantumManager`, serialized access per key via its internal locks).
pub struct RemoteManagerServer {
    manager: Arc<QuantumManager>,
}

impl RemoteManagerServer {
    pub fn new(manager: Arc<QuantumManager>) -> Self {
        Self { manager }
    }

    pub async fn serve(self: Arc<Self>, addr: impl tokio::net::ToSocketAddrs) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        loop {
            let (socket, peer) = listener.accept().await?;
            tracing::info!(%peer, "quantum manager server: client connected");
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(err) = server.handle_connection(socket).await {
                    tracing::warn!(%peer, error = %err, "quantum manager connection closed with error");
                }
            });
        }
    }

    async fn handle_connection(&self, mut socket: TcpStream) -> Result<()> {
        loop {
            let request: WireRequest = match read_frame(&mut socket).await {
                Ok(r) => r,
                Err(_) => return Ok(()), // peer closed the connection
            };
            let response = self.dispatch(request).await;
            let terminate = matches!(response, None);
            if let Some(resp) = response {
                write_frame(&mut socket, &resp).await?;
            }
            if terminate {
                return Ok(());
            }
        }
    }

    async fn dispatch(&self, request: WireRequest) -> Option<WireResponse> {
        use rand::SeedableRng;
        let response = match request {
            WireRequest::Get { key } => match self.manager.get(key) {
                Ok(state) => WireResponse::State(state.read().clone()),
                Err(err) => WireResponse::Error(err.to_string()),
            },
            WireRequest::Set { keys, state } => match self.manager.set(&keys, state) {
                Ok(()) => WireResponse::Ack,
                Err(err) => WireResponse::Error(err.to_string()),
            },
            WireRequest::Run { keys, circuit, rng_seed } => {
                let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
                match self.manager.run(&keys, &circuit, &mut rng) {
                    Ok(outcomes) => WireResponse::RunResult(outcomes),
                    Err(err) => WireResponse::Error(err.to_string()),
                }
            }
            WireRequest::Remove { key } => match self.manager.remove(key) {
                Ok(()) => WireResponse::Ack,
                Err(err) => WireResponse::Error(err.to_string()),
            },
            WireRequest::Sync => WireResponse::Ack,
            WireRequest::Terminate => return None,
        };
        Some(response)
    }
}

/// Blocking client for keys owned by a remote server. Internally parks on
/// `Handle::block_on` so callers never see an `async fn`; mirrors the
/// original's blocking `socket.send`/`recv` client used from synchronous
/// protocol code.
pub struct RemoteManagerClient {
    runtime: Handle,
    stream: Mutex<TcpStream>,
    /// Keys this client currently manages on behalf of the server, so
    /// `move_manage_to_client`/`move_manage_to_server` bookkeeping matches
    /// the original client's `managed_qubits` set.
    managed_keys: RwLock<std::collections::HashSet<StateKey>>,
    message_buffer: Mutex<Vec<WireRequest>>,
}

impl RemoteManagerClient {
    pub async fn connect(runtime: Handle, addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            runtime,
            stream: Mutex::new(stream),
            managed_keys: RwLock::new(std::collections::HashSet::new()),
            message_buffer: Mutex::new(Vec::new()),
        })
    }

    fn send_sync(&self, request: WireRequest) -> Result<WireResponse> {
        let stream = &self.stream;
        self.runtime.block_on(async {
            let mut guard = stream.lock();
            write_frame(&mut *guard, &request).await?;
            read_frame(&mut *guard).await
        })
    }

    /// Buffers a fire-and-forget request instead of sending immediately,
    /// matching `flush_message_buffer`'s batching in the original client.
    pub fn buffer_message(&self, request: WireRequest) {
        self.message_buffer.lock().push(request);
    }

    pub fn flush_message_buffer(&self) -> Result<()> {
        let pending: Vec<_> = std::mem::take(&mut *self.message_buffer.lock());
        for request in pending {
            self.send_sync(request)?;
        }
        Ok(())
    }

    pub fn move_manage_to_client(&self, key: StateKey) {
        self.managed_keys.write().insert(key);
    }

    pub fn move_manage_to_server(&self, key: StateKey) {
        self.managed_keys.write().remove(&key);
    }
}

impl QuantumManagerHandle for RemoteManagerClient {
    fn new_state(&self, keys: &[StateKey]) -> Result<()> {
        // New remote states start as the formalism default on the server;
        // expressed here as a Set of a fresh ket placeholder the server
        // overwrites with its own default on first touch.
        self.send_sync(WireRequest::Set {
            keys: keys.to_vec(),
            state: QuantumStateData::default_ket(keys.iter().copied().collect()),
        })
        .map(|_| ())
    }

    fn get(&self, key: StateKey) -> Result<Arc<RwLock<QuantumStateData>>> {
        match self.send_sync(WireRequest::Get { key })? {
            WireResponse::State(state) => Ok(Arc::new(RwLock::new(state))),
            WireResponse::Error(e) => Err(SimError::Protocol(e)),
            _ => Err(SimError::Protocol("unexpected response to Get".into())),
        }
    }

    fn set(&self, keys: &[StateKey], state: QuantumStateData) -> Result<()> {
        match self.send_sync(WireRequest::Set { keys: keys.to_vec(), state })? {
            WireResponse::Ack => Ok(()),
            WireResponse::Error(e) => Err(SimError::Protocol(e)),
            _ => Err(SimError::Protocol("unexpected response to Set".into())),
        }
    }

    fn run(&self, keys: &[StateKey], circuit: &Circuit, rng: &mut ChaCha8Rng) -> Result<Vec<bool>> {
        use rand::Rng as _;
        let rng_seed: u64 = rng.gen();
        match self.send_sync(WireRequest::Run { keys: keys.to_vec(), circuit: circuit.clone(), rng_seed })? {
            WireResponse::RunResult(outcomes) => Ok(outcomes),
            WireResponse::Error(e) => Err(SimError::Protocol(e)),
            _ => Err(SimError::Protocol("unexpected response to Run".into())),
        }
    }

    fn remove(&self, key: StateKey) -> Result<()> {
        match self.send_sync(WireRequest::Remove { key })? {
            WireResponse::Ack => Ok(()),
            WireResponse::Error(e) => Err(SimError::Protocol(e)),
            _ => Err(SimError::Protocol("unexpected response to Remove".into())),
        }
    }
}

/// Routes a call to the local arena or the remote client depending on which
/// process currently owns `key` — the split a parallel-mode timeline needs
/// without protocol code ever branching on it directly.
pub struct HybridManagerHandle {
    pub local: Arc<QuantumManager>,
    pub remote: Option<Arc<RemoteManagerClient>>,
    pub remote_keys: RwLock<std::collections::HashSet<StateKey>>,
}

impl HybridManagerHandle {
    pub fn local_only(local: Arc<QuantumManager>) -> Self {
        Self { local, remote: None, remote_keys: RwLock::new(Default::default()) }
    }

    fn is_remote(&self, key: StateKey) -> bool {
        self.remote_keys.read().contains(&key)
    }
}

impl QuantumManagerHandle for HybridManagerHandle {
    fn new_state(&self, keys: &[StateKey]) -> Result<()> {
        self.local.new_state(keys)
    }

    fn get(&self, key: StateKey) -> Result<Arc<RwLock<QuantumStateData>>> {
        if self.is_remote(key) {
            self.remote.as_ref().expect("remote client configured").get(key)
        } else {
            self.local.get(key)
        }
    }

    fn set(&self, keys: &[StateKey], state: QuantumStateData) -> Result<()> {
        if keys.iter().any(|k| self.is_remote(*k)) {
            self.remote.as_ref().expect("remote client configured").set(keys, state)
        } else {
            self.local.set(keys, state)
        }
    }

    fn run(&self, keys: &[StateKey], circuit: &Circuit, rng: &mut ChaCha8Rng) -> Result<Vec<bool>> {
        if keys.iter().any(|k| self.is_remote(*k)) {
            self.remote.as_ref().expect("remote client configured").run(keys, circuit, rng)
        } else {
            self.local.run(keys, circuit, rng)
        }
    }

    fn remove(&self, key: StateKey) -> Result<()> {
        if self.is_remote(key) {
            self.remote.as_ref().expect("remote client configured").remove(key)
        } else {
            self.local.remove(key)
        }
    }
}

