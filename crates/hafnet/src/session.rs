//! The session itself: the connect handshake, the main I/O loop and the
//! close handshake, all driven by a single worker task that owns the
//! socket and every piece of reliability state.

use crate::consts;
use crate::error::SessionError;
use crate::objack::ObjAckTracker;
use crate::protocol::rel;
use crate::protocol::sess::{SessReply, SessRequest};
use crate::protocol::{PMessage, RMessage};
use crate::reliability::{ReceiveQueue, SendQueue};
use bytes::{BufMut, Bytes, BytesMut};
use hearthen_binary::{BinaryReader, BinaryWriter, Readable, Writable};
use log::{debug, info, trace};
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

/// Interval between SESS transmissions while connecting.
const CONNECT_RETRY: Duration = Duration::from_secs(2);
const CONNECT_ATTEMPTS: u32 = 5;
/// Interval between CLOSE transmissions while tearing down.
const CLOSE_RETRY: Duration = Duration::from_millis(500);
const CLOSE_ATTEMPTS: u32 = 5;
/// A BEAT goes out after this much outbound silence.
const BEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Application boundary for everything the session delivers upward.
/// Implementations run on the I/O worker, so they should hand work off to
/// their own machinery rather than block.
pub trait MessageHandler: Send + Sync + 'static {
    /// An in-order reliable message.
    fn rel(&mut self, msg: RMessage) {
        let _ = msg;
    }

    /// A map-tile payload.
    fn mapdata(&mut self, data: Bytes) {
        let _ = data;
    }

    /// One object-state record. The implementation must consume the
    /// record's body from the reader; the default skips the rest of the
    /// packet.
    fn objdata(&mut self, flags: u8, id: u32, frame: i32, data: &mut BinaryReader) {
        let _ = (flags, id, frame);
        let _ = data.read_rest();
    }
}

/// State shared between producer threads and the worker.
#[derive(Debug)]
struct Shared {
    server: SocketAddr,
    username: String,
    sendq: Mutex<SendQueue>,
    /// Raw unreliable messages awaiting the worker's next pass.
    unrel: Mutex<VecDeque<PMessage>>,
    wake: Notify,
    interrupt: AtomicBool,
}

/// A live session with a server. Producers enqueue through the handle;
/// all socket traffic stays on the worker task. Dropping the handle
/// leaves the worker running; call [`Connection::close`] followed by
/// [`Connection::join`] for an orderly shutdown.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<Shared>,
    worker: JoinHandle<Result<(), SessionError>>,
}

impl Connection {
    /// Establishes a session. Resolves once the server accepts the
    /// handshake, or fails with the server's rejection code
    /// (`SessionError::Connection` on timeout or I/O trouble).
    pub async fn connect(
        server: SocketAddr,
        username: &str,
        cookie: &[u8],
        args: Bytes,
        handler: Box<dyn MessageHandler>,
    ) -> Result<Connection, SessionError> {
        let request = SessRequest {
            username: username.to_string(),
            cookie: Bytes::copy_from_slice(cookie),
            args,
        };
        let mut writer = BinaryWriter::new();
        request.write(&mut writer).map_err(|err| {
            SessionError::Message(format!("Malformed connect arguments: {}", err))
        })?;
        let request = writer.freeze();

        let bind: SocketAddr = match server {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(server).await?;

        let shared = Arc::new(Shared {
            server,
            username: username.to_string(),
            sendq: Mutex::new(SendQueue::new()),
            unrel: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            interrupt: AtomicBool::new(false),
        });

        let worker = Worker {
            socket,
            shared: Arc::clone(&shared),
            handler,
            recvq: ReceiveQueue::new(),
            objacks: ObjAckTracker::new(),
            lasttx: Instant::now(),
            rbuf: vec![0; consts::MAX_PACKET_SIZE].into_boxed_slice(),
        };
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(worker.run(request, ready_tx));

        match ready_rx.await {
            Ok(Ok(())) => Ok(Connection {
                shared,
                worker: handle,
            }),
            Ok(Err(err)) => Err(err),
            // The worker died before reporting.
            Err(_) => Err(SessionError::Connection),
        }
    }

    pub fn server(&self) -> SocketAddr {
        self.shared.server
    }

    pub fn username(&self) -> &str {
        &self.shared.username
    }

    /// Enqueues a reliable message and wakes the worker. Never blocks.
    pub fn queuemsg(&self, mtype: u8, payload: Bytes) {
        self.shared.sendq.lock().unwrap().enqueue(mtype, payload);
        self.shared.wake.notify_one();
    }

    /// Hands a raw unreliable message (a map-tile request and the like) to
    /// the worker for its next pass.
    pub fn sendmsg(&self, msg: PMessage) {
        self.shared.unrel.lock().unwrap().push_back(msg);
        self.shared.wake.notify_one();
    }

    /// Requests an orderly shutdown. Returns immediately; idempotent.
    pub fn close(&self) {
        self.shared.interrupt.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Waits for the worker to finish the close handshake and release the
    /// socket.
    pub async fn join(self) -> Result<(), SessionError> {
        match self.worker.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(SessionError::Connection),
        }
    }
}

/// The session state machine: each phase steps to the next one, `None`
/// terminating the worker.
enum Phase {
    Connect,
    Main,
    Close { sawclose: bool },
}

/// Outcome of one wait at the selector.
enum Wait {
    Ready(io::Result<()>),
    Woken,
    Elapsed,
}

struct Worker {
    socket: UdpSocket,
    shared: Arc<Shared>,
    handler: Box<dyn MessageHandler>,
    recvq: ReceiveQueue,
    objacks: ObjAckTracker,
    /// Time of the last outbound datagram of any kind.
    lasttx: Instant,
    rbuf: Box<[u8]>,
}

impl Worker {
    async fn run(
        mut self,
        request: Bytes,
        ready: oneshot::Sender<Result<(), SessionError>>,
    ) -> Result<(), SessionError> {
        let mut ready = Some(ready);
        let mut phase = Some(Phase::Connect);
        while let Some(current) = phase {
            phase = match current {
                Phase::Connect => {
                    let step = self.phase_connect(&request).await;
                    let next = step.is_ok().then_some(Phase::Main);
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(step);
                    }
                    next
                }
                Phase::Main => Some(self.phase_main().await?),
                Phase::Close { sawclose } => {
                    self.phase_close(sawclose).await;
                    None
                }
            };
        }
        debug!("Session with {} terminated", self.shared.server);
        Ok(())
    }

    /// Sends the SESS request until the server answers or the attempts run
    /// out.
    async fn phase_connect(&mut self, request: &Bytes) -> Result<(), SessionError> {
        let hello = PMessage::new(consts::SESS, request.clone());
        for attempt in 0..CONNECT_ATTEMPTS {
            trace!(
                "Connecting to {} (attempt {})",
                self.shared.server,
                attempt + 1
            );
            self.transmit(&hello).await;
            let deadline = Instant::now() + CONNECT_RETRY;
            loop {
                if self.interrupted() {
                    return Err(SessionError::Connection);
                }
                match self.wait_tick(deadline).await {
                    Wait::Ready(Err(_)) => return Err(SessionError::Connection),
                    Wait::Ready(Ok(())) => {
                        if let Some(result) = self.connect_reply() {
                            return result;
                        }
                    }
                    Wait::Woken => {}
                    Wait::Elapsed => break,
                }
            }
        }
        Err(SessionError::Connection)
    }

    /// Drains readable datagrams looking for a SESS reply.
    fn connect_reply(&mut self) -> Option<Result<(), SessionError>> {
        loop {
            match self.socket.try_recv(&mut self.rbuf) {
                Ok(len) => {
                    let Some(pkt) = PMessage::decode(&self.rbuf[..len]) else {
                        continue;
                    };
                    if pkt.ptype != consts::SESS {
                        continue;
                    }
                    let mut reader = BinaryReader::new(pkt.payload);
                    let Ok(reply) = SessReply::read(&mut reader) else {
                        continue;
                    };
                    if reply.ok() {
                        info!(
                            "Connected to {} as {}",
                            self.shared.server, self.shared.username
                        );
                        return Some(Ok(()));
                    }
                    return Some(Err(SessionError::from_code(reply.code, reply.detail)));
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return None,
                Err(_) => return Some(Err(SessionError::Connection)),
            }
        }
    }

    /// Services the established session until the peer closes it or a
    /// shutdown is requested.
    async fn phase_main(&mut self) -> Result<Phase, SessionError> {
        self.lasttx = Instant::now();
        loop {
            if self.interrupted() {
                return Ok(Phase::Close { sawclose: false });
            }

            // Earliest deadline among the heartbeat, the ack hold, the
            // retransmission schedule and the object-ack schedule.
            let now = Instant::now();
            let heartbeat = self.lasttx + BEAT_INTERVAL;
            let sendq_deadline = self.shared.sendq.lock().unwrap().next_deadline(now);
            let deadline = earliest(
                earliest(self.recvq.next_deadline(), sendq_deadline),
                self.objacks.next_deadline(now),
            )
            .map_or(heartbeat, |t| t.min(heartbeat));

            // Wait for readiness, a producer wake or the deadline.
            match self.wait_tick(deadline).await {
                Wait::Ready(ready) => ready?,
                Wait::Woken | Wait::Elapsed => {}
            }

            // Drain everything readable in one burst.
            let now = Instant::now();
            loop {
                match self.socket.try_recv(&mut self.rbuf) {
                    Ok(len) => {
                        if let Some(next) = self.dispatch(len, now) {
                            return Ok(next);
                        }
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) => return Err(err.into()),
                }
            }

            // Raw messages handed over by producers.
            let raw: Vec<PMessage> = self.shared.unrel.lock().unwrap().drain(..).collect();
            for msg in raw {
                self.transmit(&msg).await;
            }

            // Due reliable (re)transmissions, one message per packet.
            let due = self.shared.sendq.lock().unwrap().collect_due(now);
            for msg in due {
                trace!("REL {} type {} ({} bytes)", msg.seq, msg.mtype, msg.payload.len());
                let pkt = PMessage::new(consts::REL, rel::encode_rel(&msg));
                self.transmit(&pkt).await;
            }

            // Due object acks.
            for payload in self.objacks.flush(now) {
                let pkt = PMessage::new(consts::OBJACK, payload);
                self.transmit(&pkt).await;
            }

            // The coalesced reliable ack once its hold has elapsed.
            if let Some(ackseq) = self.recvq.take_due_ack(now) {
                let mut buf = BytesMut::with_capacity(2);
                buf.put_u16_le(ackseq);
                self.transmit(&PMessage::new(consts::ACK, buf.freeze())).await;
            }

            // Keep the session alive through outbound silence.
            if now.duration_since(self.lasttx) >= BEAT_INTERVAL {
                self.transmit(&PMessage::empty(consts::BEAT)).await;
            }
        }
    }

    /// Routes one received datagram. Returns the next phase when the
    /// packet ends the main loop.
    fn dispatch(&mut self, len: usize, now: Instant) -> Option<Phase> {
        let Some(pkt) = PMessage::decode(&self.rbuf[..len]) else {
            return None;
        };
        match pkt.ptype {
            consts::REL => {
                let mut delivered = Vec::new();
                for msg in rel::decode_rel(pkt.payload) {
                    self.recvq.receive(msg, now, &mut delivered);
                }
                for msg in delivered {
                    trace!("Delivering rel {} type {}", msg.seq, msg.mtype);
                    self.handler.rel(msg);
                }
            }
            consts::ACK => {
                let mut reader = BinaryReader::new(pkt.payload);
                if let Ok(ackseq) = reader.read_u16() {
                    let retired = self.shared.sendq.lock().unwrap().ack(ackseq);
                    if retired > 0 {
                        trace!("ACK {} retired {} messages", ackseq, retired);
                    }
                }
            }
            consts::MAPDATA => self.handler.mapdata(pkt.payload),
            consts::OBJDATA => {
                let mut reader = BinaryReader::new(pkt.payload);
                while !reader.is_empty() {
                    let Ok(flags) = reader.read_u8() else { break };
                    let Ok(id) = reader.read_u32() else { break };
                    let Ok(frame) = reader.read_i32() else { break };
                    self.objacks.observe(id, frame, now);
                    self.handler.objdata(flags, id, frame, &mut reader);
                }
            }
            consts::CLOSE => {
                debug!("Server closed the session");
                return Some(Phase::Close { sawclose: true });
            }
            // Duplicate handshake replies; the session is already up.
            consts::SESS => {}
            other => trace!("Ignoring unknown packet type {}", other),
        }
        None
    }

    /// Repeats the CLOSE handshake until the peer echoes it or the
    /// attempts run out. Shutdown requests are already in effect here and
    /// further wakes are ignored.
    async fn phase_close(&mut self, sawclose: bool) {
        debug!("Closing session with {}", self.shared.server);
        for _ in 0..CLOSE_ATTEMPTS {
            self.transmit(&PMessage::empty(consts::CLOSE)).await;
            if sawclose {
                return;
            }
            let deadline = Instant::now() + CLOSE_RETRY;
            loop {
                match self.wait_tick(deadline).await {
                    Wait::Ready(Err(_)) => return,
                    Wait::Ready(Ok(())) => {
                        if self.close_reply() {
                            return;
                        }
                    }
                    // Shutdown is already under way; further wakes carry
                    // nothing for this phase.
                    Wait::Woken => {}
                    Wait::Elapsed => break,
                }
            }
        }
    }

    /// Drains readable datagrams looking for the peer's CLOSE. Read
    /// trouble during teardown also ends the session.
    fn close_reply(&mut self) -> bool {
        loop {
            match self.socket.try_recv(&mut self.rbuf) {
                Ok(len) => {
                    if let Some(pkt) = PMessage::decode(&self.rbuf[..len]) {
                        if pkt.ptype == consts::CLOSE {
                            return true;
                        }
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return false,
                Err(_) => return true,
            }
        }
    }

    /// One wait at the selector: socket readiness, a producer wake, or the
    /// deadline, whichever comes first.
    async fn wait_tick(&self, deadline: Instant) -> Wait {
        let wake = self.shared.wake.notified();
        tokio::select! {
            ready = self.socket.readable() => Wait::Ready(ready),
            _ = wake => Wait::Woken,
            _ = sleep_until(deadline) => Wait::Elapsed,
        }
    }

    /// Sends one packet, treating transient socket errors as loss.
    async fn transmit(&mut self, msg: &PMessage) {
        let datagram = msg.encode();
        if let Err(err) = self.socket.send(&datagram).await {
            debug!("Dropping outbound packet type {}: {}", msg.ptype, err);
        }
        self.lasttx = Instant::now();
    }

    fn interrupted(&self) -> bool {
        self.shared.interrupt.load(Ordering::SeqCst)
    }
}

/// Minimum over optional deadlines, absent ones standing aside.
fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
