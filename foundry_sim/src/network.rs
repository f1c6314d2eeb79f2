use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use bevy::prelude::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use foundry_proto::{decode_frame, encode_frame, CallFrame, EntitySync, FramePayload, ReplicatedCall};

use crate::spawn::{FactorySpawnCall, RemovalNotice};

/// Frames above this size are treated as a broken stream.
const MAX_FRAME_LEN: u32 = 64 * 1024;

/// Position of this process in the session.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkRole {
    /// Single process; authoritative with no observers.
    #[default]
    Standalone,
    /// Authoritative host replicating calls to clients.
    Server,
    /// Observer that only executes calls it receives.
    Client,
}

impl NetworkRole {
    pub fn is_authoritative(self) -> bool {
        !matches!(self, NetworkRole::Client)
    }
}

/// Calls issued this tick, encoded in issue order and waiting to be sent.
#[derive(Resource, Default)]
pub struct ReplicationOutbox {
    next_sequence: u64,
    pending: Vec<Vec<u8>>,
    sender: Option<Sender<Vec<u8>>>,
    sent_total: u64,
}

impl ReplicationOutbox {
    pub fn connect(&mut self, sender: Sender<Vec<u8>>) {
        self.sender = Some(sender);
    }

    pub fn push(&mut self, payload: impl Into<FramePayload>, tick: u64) -> bincode::Result<u64> {
        let sequence = self.next_sequence;
        let bytes = encode_frame(&CallFrame {
            sequence,
            tick,
            payload: payload.into(),
        })?;
        self.next_sequence += 1;
        self.pending.push(bytes);
        Ok(sequence)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn sent_total(&self) -> u64 {
        self.sent_total
    }

    /// Hands pending frames to the transport. Without one they are dropped.
    pub fn flush(&mut self) -> usize {
        let frames = std::mem::take(&mut self.pending);
        let count = frames.len();
        let Some(sender) = self.sender.clone() else {
            return 0;
        };
        for frame in frames {
            if let Err(err) = sender.send(frame) {
                tracing::warn!(
                    target: "foundry::network",
                    error = %err,
                    "replication.transport_closed"
                );
                self.sender = None;
                return 0;
            }
            self.sent_total += 1;
        }
        count
    }
}

/// Frames received from the authoritative node.
#[derive(Resource)]
pub struct ReplicationInbox {
    receiver: Receiver<Vec<u8>>,
    last_sequence: Option<u64>,
}

impl ReplicationInbox {
    pub fn new(receiver: Receiver<Vec<u8>>) -> Self {
        Self {
            receiver,
            last_sequence: None,
        }
    }

    /// Decodes every frame currently queued, skipping garbled frames and
    /// replays of sequences already seen.
    pub fn drain(&mut self) -> Vec<CallFrame> {
        let mut frames = Vec::new();
        while let Ok(bytes) = self.receiver.try_recv() {
            let frame = match decode_frame(&bytes) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(
                        target: "foundry::network",
                        error = %err,
                        "replication.frame_dropped"
                    );
                    continue;
                }
            };
            if let Some(last) = self.last_sequence {
                if frame.sequence <= last {
                    tracing::debug!(
                        target: "foundry::network",
                        sequence = frame.sequence,
                        last,
                        "replication.frame_replayed"
                    );
                    continue;
                }
                if frame.sequence != last + 1 {
                    tracing::warn!(
                        target: "foundry::network",
                        expected = last + 1,
                        received = frame.sequence,
                        "replication.sequence_gap"
                    );
                }
            }
            self.last_sequence = Some(frame.sequence);
            frames.push(frame);
        }
        frames
    }
}

/// In-process link between an authoritative app and an observer app.
pub fn replication_link() -> (Sender<Vec<u8>>, ReplicationInbox) {
    let (sender, receiver) = unbounded();
    (sender, ReplicationInbox::new(receiver))
}

/// Turns received frames into local spawn calls and removal notices.
pub fn receive_replicated_calls(
    role: Res<NetworkRole>,
    inbox: Option<ResMut<ReplicationInbox>>,
    mut calls: EventWriter<FactorySpawnCall>,
    mut notices: EventWriter<RemovalNotice>,
) {
    let Some(mut inbox) = inbox else {
        return;
    };
    for frame in inbox.drain() {
        if role.is_authoritative() {
            tracing::warn!(
                target: "foundry::network",
                sequence = frame.sequence,
                "replication.ignored_on_authority"
            );
            continue;
        }
        match frame.payload {
            FramePayload::Call(ReplicatedCall::UnitFactorySpawn { tile }) => {
                tracing::trace!(
                    target: "foundry::network",
                    x = tile.x,
                    y = tile.y,
                    source_tick = frame.tick,
                    "replication.spawn_received"
                );
                calls.send(FactorySpawnCall { tile });
            }
            FramePayload::Sync(EntitySync::UnitRemoved { spawner }) => {
                tracing::trace!(
                    target: "foundry::network",
                    x = spawner.x,
                    y = spawner.y,
                    source_tick = frame.tick,
                    "replication.removal_received"
                );
                notices.send(RemovalNotice { spawner });
            }
        }
    }
}

pub fn flush_replication(mut outbox: ResMut<ReplicationOutbox>) {
    if outbox.pending() == 0 {
        return;
    }
    let sent = outbox.flush();
    if sent > 0 {
        tracing::trace!(target: "foundry::network", frames = sent, "replication.flushed");
    }
}

/// Broadcasts replication frames to every connected observer over TCP.
pub struct ReplicationServer {
    sender: Sender<Vec<u8>>,
}

impl ReplicationServer {
    pub fn sender(&self) -> Sender<Vec<u8>> {
        self.sender.clone()
    }
}

pub fn start_replication_server(bind_addr: SocketAddr) -> Option<ReplicationServer> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::warn!(
                target: "foundry::network",
                bind = %bind_addr,
                error = %err,
                "replication.bind_failed"
            );
            return None;
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        tracing::warn!(
            target: "foundry::network",
            error = %err,
            "replication.nonblocking_failed"
        );
        return None;
    }

    let (sender, receiver) = unbounded::<Vec<u8>>();
    let clients: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));

    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(err) = stream.set_nodelay(true) {
                    tracing::warn!(target: "foundry::network", %addr, error = %err, "replication.nodelay_failed");
                }
                if let Err(err) = stream.set_nonblocking(false) {
                    tracing::warn!(target: "foundry::network", %addr, error = %err, "replication.blocking_failed");
                    continue;
                }
                tracing::info!(target: "foundry::network", %addr, "replication.client_connected");
                if let Ok(mut guard) = clients.lock() {
                    guard.push(stream);
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(20));
            }
            Err(err) => {
                tracing::error!(target: "foundry::network", error = %err, "replication.accept_failed");
                thread::sleep(std::time::Duration::from_millis(200));
            }
        }

        while let Ok(frame) = receiver.try_recv() {
            broadcast_frame(&clients, &frame);
        }
    });

    Some(ReplicationServer { sender })
}

/// Connects an observer to a [`ReplicationServer`].
pub fn connect_replication_client(addr: SocketAddr) -> io::Result<ReplicationInbox> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    let (sender, receiver) = unbounded::<Vec<u8>>();
    thread::spawn(move || loop {
        match read_frame(&mut stream) {
            Ok(frame) => {
                if sender.send(frame).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::info!(target: "foundry::network", error = %err, "replication.disconnected");
                break;
            }
        }
    });
    Ok(ReplicationInbox::new(receiver))
}

fn write_frame(stream: &mut impl Write, frame: &[u8]) -> io::Result<()> {
    let len = frame.len() as u32;
    let mut buffer = Vec::with_capacity(4 + frame.len());
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(frame);
    stream.write_all(&buffer)
}

fn read_frame(stream: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut frame = vec![0u8; len as usize];
    stream.read_exact(&mut frame)?;
    Ok(frame)
}

fn broadcast_frame(clients: &Arc<Mutex<Vec<TcpStream>>>, frame: &[u8]) {
    let Ok(mut guard) = clients.lock() else {
        return;
    };
    guard.retain_mut(|stream| match write_frame(stream, frame) {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(target: "foundry::network", error = %err, "replication.client_dropped");
            false
        }
    });
}
