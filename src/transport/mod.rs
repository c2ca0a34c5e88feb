//! Per-connection transport: role-aware framing, a serialized write half, and
//! the peer-binding slot the splicing engine uses to pair two transports.

pub mod frame;
pub mod raw;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use frame::{encode_frame, read_frame, OpCode};
use parking_lot::Mutex as SyncMutex;
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, Notify};

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// The concrete stream type every connection arrives on: an HTTP/1.1
/// connection that has just been upgraded, adapted to Tokio's IO traits.
pub type Conn = hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>;

/// A transport bound to the switchboard's real connection type. Unit tests
/// exercise the generic [`Transport<S>`] directly over an in-memory duplex
/// stream instead.
pub type ConnTransport = Transport<Conn>;

/// Which wire format this transport speaks.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    WebSocket,
    Raw,
}

/// Which side of a splice this transport represents. Purely descriptive —
/// forwarding behavior is identical for both, but logging and the initial
/// handshake message (sent by the splicing engine, not the transport itself)
/// depend on it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Kind {
    Master,
    Client,
}

/// Injected at upgrade time, mirroring the mixin-style callbacks
/// (`on_open`/`on_message`/`on_close`) the original implementation composed
/// onto its request handler.
#[async_trait::async_trait]
pub trait Handler<S>: Send + Sync
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn on_open(&self, _transport: &Arc<Transport<S>>) {}
    async fn on_message(&self, transport: &Arc<Transport<S>>, payload: Bytes);
    async fn on_close(&self, transport: &Arc<Transport<S>>);
}

/// Forwards every message to whatever peer is currently bound, and tears the
/// peer down when this side closes. This is the only handler behavior the
/// splicing engine needs for both master and client transports — see
/// DESIGN.md for why a single impl suffices where the source used per-role
/// mixins.
pub struct SpliceHandler;

#[async_trait::async_trait]
impl<S> Handler<S> for SpliceHandler
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn on_message(&self, transport: &Arc<Transport<S>>, payload: Bytes) {
        if let Some(peer) = transport.peer() {
            if let Err(err) = peer.forward(&payload).await {
                tracing::debug!(transport_id = transport.id, error = %err, "forward to peer failed, closing peer");
                peer.close();
            }
        } else {
            tracing::warn!(transport_id = transport.id, kind = ?transport.kind, "message arrived with no bound peer, dropping");
        }
    }

    async fn on_close(&self, transport: &Arc<Transport<S>>) {
        if let Some(peer) = transport.take_peer() {
            peer.close();
        }
    }
}

/// A single upgraded connection: either a WebSocket master/client or a raw
/// master/client. Reads happen exclusively inside [`run`]; writes may be
/// issued concurrently by the peer's read loop and are serialized here.
pub struct Transport<S> {
    pub id: u64,
    pub role: Role,
    pub kind: Kind,
    write: AsyncMutex<WriteHalf<S>>,
    read_closed: AtomicBool,
    peer: SyncMutex<Option<Arc<Transport<S>>>>,
    close_signal: Notify,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Splits `stream` and returns the transport handle plus the read half
    /// the caller must feed into [`run`].
    pub fn new(stream: S, role: Role, kind: Kind) -> (Arc<Transport<S>>, ReadHalf<S>) {
        let (read_half, write_half) = split(stream);
        let transport = Arc::new(Transport {
            id: NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed),
            role,
            kind,
            write: AsyncMutex::new(write_half),
            read_closed: AtomicBool::new(false),
            peer: SyncMutex::new(None),
            close_signal: Notify::new(),
        });
        (transport, read_half)
    }

    pub fn is_closed(&self) -> bool {
        self.read_closed.load(Ordering::Acquire)
    }

    pub fn peer(&self) -> Option<Arc<Transport<S>>> {
        self.peer.lock().clone()
    }

    pub fn set_peer(&self, peer: Arc<Transport<S>>) {
        *self.peer.lock() = Some(peer);
    }

    pub fn take_peer(&self) -> Option<Arc<Transport<S>>> {
        self.peer.lock().take()
    }

    /// Sends a switchboard-originated application message in this
    /// transport's wire format: a text WebSocket frame, or a
    /// length-prefixed raw chunk. Used only for the splicing engine's
    /// client-attach signal — ordinary peer forwarding goes through
    /// [`forward`](Self::forward) instead, which does not add raw framing.
    pub async fn send(&self, payload: &[u8]) -> std::io::Result<()> {
        match self.role {
            Role::WebSocket => self.write_raw(&encode_frame(OpCode::Text, payload)).await,
            Role::Raw => self.write_raw(&raw::encode_raw(payload)).await,
        }
    }

    /// Forwards a message decoded from this transport's peer onward: a
    /// WebSocket payload is re-wrapped as a new text frame (message
    /// boundaries are meaningful on that side), but a raw chunk is written
    /// byte-for-byte with no added length prefix — raw forwarding preserves
    /// the inbound stream verbatim, per the asymmetric raw framing (see
    /// DESIGN.md).
    pub async fn forward(&self, payload: &[u8]) -> std::io::Result<()> {
        match self.role {
            Role::WebSocket => self.write_raw(&encode_frame(OpCode::Text, payload)).await,
            Role::Raw => self.write_raw(payload).await,
        }
    }

    async fn send_control(&self, opcode: OpCode, payload: &[u8]) -> std::io::Result<()> {
        self.write_raw(&encode_frame(opcode, payload)).await
    }

    /// Sends a WebSocket ping with an empty payload. A no-op (but not an
    /// error) on a `Role::Raw` transport, since raw connections have no
    /// control-frame mechanism to keep NAT bindings alive with.
    pub async fn send_ping(&self) -> std::io::Result<()> {
        match self.role {
            Role::WebSocket => self.send_control(OpCode::Ping, b"").await,
            Role::Raw => Ok(()),
        }
    }

    async fn write_raw(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut write = self.write.lock().await;
        write.write_all(bytes).await
    }

    /// Closes the read side: unblocks the read loop for this transport (P5 —
    /// displacement/peer-close must stop the read loop, not merely mark a
    /// flag nobody observes) and best-effort shuts down the write half so
    /// the remote peer also observes EOF.
    ///
    /// Uses `notify_one` rather than `notify_waiters`: the loop may be mid
    /// `on_message` (forwarding to its own peer) rather than parked in
    /// `close_signal.notified()` at the moment `close` runs, in which case
    /// `notify_waiters` would wake no one and the wakeup would be lost until
    /// the 1-hour read timeout. `notify_one` stores a permit when nobody is
    /// currently waiting, so the loop's next `notified().await` — even one
    /// issued well after this call returns — resolves immediately. `close`
    /// only ever runs once per transport (guarded by `read_closed`), so at
    /// most one permit is ever produced for the single read loop consuming it.
    pub fn close(&self) {
        if self.read_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_signal.notify_one();
        if let Ok(mut write) = self.write.try_lock() {
            let _ = futures_shutdown(&mut *write);
        }
    }
}

/// Best-effort, non-blocking shutdown attempt; we do not await here because
/// `close` must be callable from sync contexts (e.g. a `Drop`-adjacent path).
fn futures_shutdown<W: AsyncWrite + Unpin>(writer: &mut W) -> std::io::Result<()> {
    use std::task::{Context, Poll};
    let waker = futures_util_noop_waker();
    let mut cx = Context::from_waker(&waker);
    match std::pin::Pin::new(writer).poll_shutdown(&mut cx) {
        Poll::Ready(result) => result,
        Poll::Pending => Ok(()),
    }
}

fn futures_util_noop_waker() -> std::task::Waker {
    use std::task::{RawWaker, RawWakerVTable, Waker};
    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
}

const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3600);

/// Runs the WebSocket read loop to completion: fires `on_open`, dispatches
/// decoded application messages to `handler`, replies to ping/close per RFC
/// 6455, and fires `on_close` exactly once on any exit path.
pub async fn run_websocket<S, H>(transport: Arc<Transport<S>>, mut read: ReadHalf<S>, handler: Arc<H>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Handler<S> + 'static,
{
    handler.on_open(&transport).await;
    let mut pending: Option<Vec<u8>> = None;

    loop {
        let frame = tokio::select! {
            _ = transport.close_signal.notified() => break,
            frame = tokio::time::timeout(READ_TIMEOUT, read_frame(&mut read)) => frame,
        };

        let frame = match frame {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => break,
            Ok(Err(err)) => {
                tracing::debug!(transport_id = transport.id, error = %err, "frame protocol violation, closing");
                break;
            }
            Err(_elapsed) => {
                tracing::debug!(transport_id = transport.id, "read timed out after 1 hour");
                break;
            }
        };

        match frame.opcode {
            OpCode::Text | OpCode::Binary => {
                if frame.fin {
                    if let Some(mut assembled) = pending.take() {
                        assembled.extend_from_slice(&frame.payload);
                        handler.on_message(&transport, Bytes::from(assembled)).await;
                    } else {
                        handler.on_message(&transport, frame.payload).await;
                    }
                } else {
                    pending = Some(frame.payload.to_vec());
                }
            }
            OpCode::Continuation => {
                if let Some(assembled) = pending.as_mut() {
                    assembled.extend_from_slice(&frame.payload);
                }
                if frame.fin {
                    if let Some(assembled) = pending.take() {
                        handler.on_message(&transport, Bytes::from(assembled)).await;
                    }
                }
            }
            OpCode::Ping => {
                if transport.send_control(OpCode::Pong, &frame.payload).await.is_err() {
                    break;
                }
            }
            OpCode::Pong => {}
            OpCode::Close => {
                let _ = transport.send_control(OpCode::Close, &frame.payload).await;
                break;
            }
        }
    }

    transport.close();
    handler.on_close(&transport).await;
}

/// Runs the raw read loop: forwards opaque <=4 KiB chunks to `handler` with
/// no message-boundary framing on the inbound side (see `raw` module docs).
pub async fn run_raw<S, H>(transport: Arc<Transport<S>>, mut read: ReadHalf<S>, handler: Arc<H>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Handler<S> + 'static,
{
    handler.on_open(&transport).await;
    let mut buf = vec![0u8; raw::READ_CHUNK_SIZE];

    loop {
        let read_result = tokio::select! {
            _ = transport.close_signal.notified() => break,
            result = tokio::time::timeout(READ_TIMEOUT, read.read(&mut buf)) => result,
        };

        match read_result {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                handler.on_message(&transport, Bytes::copy_from_slice(&buf[..n])).await;
            }
            Ok(Err(err)) => {
                tracing::debug!(transport_id = transport.id, error = %err, "raw read error, closing");
                break;
            }
            Err(_elapsed) => {
                tracing::debug!(transport_id = transport.id, "raw read timed out after 1 hour");
                break;
            }
        }
    }

    transport.close();
    handler.on_close(&transport).await;
}

/// Spawns the role-appropriate read loop on its own task. Used identically
/// for a newly-parked master (which must start pumping before anyone grabs
/// it) and a newly-arrived client (started right after [`crate::splice::bind`]).
pub fn spawn<S, H>(transport: Arc<Transport<S>>, read: ReadHalf<S>, handler: Arc<H>) -> tokio::task::JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Handler<S> + 'static,
{
    tokio::spawn(async move {
        match transport.role {
            Role::WebSocket => run_websocket(transport, read, handler).await,
            Role::Raw => run_raw(transport, read, handler).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn raw_loop_forwards_chunks_and_closes_on_eof() {
        let (client_end, server_end) = duplex(1024);
        let (transport, read) = Transport::new(server_end, Role::Raw, Kind::Client);
        let handler = Arc::new(SpliceHandler);
        let join = tokio::spawn(run_raw(transport.clone(), read, handler));

        let mut client_end = client_end;
        client_end.write_all(b"hello").await.unwrap();
        drop(client_end);

        join.await.unwrap();
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn websocket_loop_replies_pong_to_ping() {
        let (mut client_end, server_end) = duplex(1024);
        let (transport, read) = Transport::new(server_end, Role::WebSocket, Kind::Client);
        let handler = Arc::new(SpliceHandler);
        let join = tokio::spawn(run_websocket(transport.clone(), read, handler));

        client_end.write_all(&encode_frame(OpCode::Ping, b"abc")).await.unwrap();
        client_end.write_all(&encode_frame(OpCode::Close, b"")).await.unwrap();

        let mut reply_header = [0u8; 2];
        client_end.read_exact(&mut reply_header).await.unwrap();
        assert_eq!(reply_header[0] & 0x0F, OpCode::Pong.as_raw());

        join.await.unwrap();
    }
}
