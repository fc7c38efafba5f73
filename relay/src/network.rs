//! Relay network layer: UDP fan-out of published envelopes

use crate::peer_manager::{PeerManager, Registration};
use log::{debug, error, info, warn};
use shared::{decode_packet, encode_packet, Packet, PlayerId, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the main relay loop
#[derive(Debug)]
pub enum RelayEvent {
    PacketReceived { packet: Packet, addr: SocketAddr },
    PeerTimeout { peer_id: PlayerId },
    Shutdown,
}

/// Stops a running relay from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    event_tx: mpsc::UnboundedSender<RelayEvent>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.event_tx.send(RelayEvent::Shutdown).is_err() {
            debug!("Relay already stopped");
        }
    }
}

/// Messages sent from the relay loop to the sender task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    SendPacket { packet: Packet, addr: SocketAddr },
    /// Every registered peer, the publisher included
    BroadcastPacket { packet: Packet },
}

/// Decides what a received packet turns into.
///
/// Registration changes are applied to `peers` directly; the returned
/// messages still have to be handed to the sender.
pub fn route_packet(peers: &mut PeerManager, packet: Packet, addr: SocketAddr) -> Vec<Outbound> {
    match packet {
        Packet::Join {
            peer_id,
            protocol_version,
        } => {
            if protocol_version != PROTOCOL_VERSION {
                warn!(
                    "Peer {} at {} speaks protocol {}, expected {}",
                    peer_id, addr, protocol_version, PROTOCOL_VERSION
                );
                return vec![Outbound::SendPacket {
                    packet: Packet::Rejected {
                        reason: format!("Protocol version {} not supported", protocol_version),
                    },
                    addr,
                }];
            }

            let packet = match peers.register(peer_id, addr) {
                Registration::New | Registration::Refreshed => Packet::Joined { peer_id },
                Registration::Full => Packet::Rejected {
                    reason: "Relay full".to_string(),
                },
            };
            vec![Outbound::SendPacket { packet, addr }]
        }

        Packet::Publish { envelope } => {
            let Some(peer_id) = peers.touch_addr(addr) else {
                warn!("Publish from unregistered address {}", addr);
                return Vec::new();
            };
            if envelope.sender != peer_id {
                warn!(
                    "Peer {} published as {}, dropping {}",
                    peer_id,
                    envelope.sender,
                    envelope.message.kind()
                );
                return Vec::new();
            }

            debug!("{} from {}", envelope.message.kind(), peer_id);
            vec![Outbound::BroadcastPacket {
                packet: Packet::Deliver { envelope },
            }]
        }

        Packet::Heartbeat => {
            if peers.touch_addr(addr).is_none() {
                debug!("Heartbeat from unregistered address {}", addr);
            }
            Vec::new()
        }

        Packet::Leave => {
            if let Some(peer_id) = peers.find_peer_by_addr(addr) {
                peers.remove_peer(&peer_id);
            }
            Vec::new()
        }

        _ => {
            warn!("Unexpected packet type from {}", addr);
            Vec::new()
        }
    }
}

/// Broadcast relay: accepts joins and forwards every publish to all peers
pub struct RelayServer {
    socket: Arc<UdpSocket>,
    peers: Arc<RwLock<PeerManager>>,
    stats_interval: Duration,

    // Communication channels
    event_tx: mpsc::UnboundedSender<RelayEvent>,
    event_rx: mpsc::UnboundedReceiver<RelayEvent>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
}

impl RelayServer {
    pub async fn new(
        addr: &str,
        max_peers: usize,
        peer_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(RelayServer {
            socket,
            peers: Arc::new(RwLock::new(PeerManager::new(max_peers, peer_timeout))),
            stats_interval: Duration::from_secs(10),
            event_tx,
            event_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            event_tx: self.event_tx.clone(),
        }
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode_packet(&buffer[0..len]) {
                        Ok(packet) => {
                            let event = RelayEvent::PacketReceived { packet, addr };
                            if let Err(e) = event_tx.send(event) {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let peers = Arc::clone(&self.peers);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    Outbound::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    Outbound::BroadcastPacket { packet } => {
                        let peer_addrs = {
                            let peers_guard = peers.read().await;
                            peers_guard.peer_addrs()
                        };

                        for (peer_id, addr) in peer_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to deliver to peer {}: {}", peer_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors peer timeouts
    fn spawn_timeout_checker(&self) {
        let peers = Arc::clone(&self.peers);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut peers_guard = peers.write().await;
                    peers_guard.check_timeouts()
                };

                for peer_id in timed_out {
                    if let Err(e) = event_tx.send(RelayEvent::PeerTimeout { peer_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode_packet(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let outbound = {
            let mut peers = self.peers.write().await;
            route_packet(&mut peers, packet, addr)
        };

        for message in outbound {
            if let Err(e) = self.outbound_tx.send(message) {
                error!("Failed to queue packet for sending: {}", e);
            }
        }
    }

    /// Main relay loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut stats_interval = interval(self.stats_interval);

        info!("Relay started successfully");

        loop {
            tokio::select! {
                message = self.event_rx.recv() => {
                    match message {
                        Some(RelayEvent::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(RelayEvent::PeerTimeout { peer_id }) => {
                            info!("Peer {} timed out", peer_id);
                        },
                        Some(RelayEvent::Shutdown) | None => {
                            info!("Relay shutting down");
                            break;
                        }
                    }
                },

                _ = stats_interval.tick() => {
                    let peer_count = self.peers.read().await.len();
                    if peer_count > 0 {
                        debug!("{} peers connected", peer_count);
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Envelope, Message};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn peers() -> PeerManager {
        PeerManager::new(2, Duration::from_secs(5))
    }

    fn join(id: u32) -> Packet {
        Packet::Join {
            peer_id: PlayerId(id),
            protocol_version: PROTOCOL_VERSION,
        }
    }

    fn publish(sender: u32) -> Packet {
        Packet::Publish {
            envelope: Envelope {
                sender: PlayerId(sender),
                message: Message::StateRequest {
                    requester_id: PlayerId(sender),
                },
            },
        }
    }

    #[test]
    fn test_join_accepted() {
        let mut peers = peers();
        let out = route_packet(&mut peers, join(1), addr(9001));

        assert_eq!(
            out,
            vec![Outbound::SendPacket {
                packet: Packet::Joined {
                    peer_id: PlayerId(1),
                },
                addr: addr(9001),
            }]
        );
        assert_eq!(peers.len(), 1);
    }

    #[test]
    fn test_join_wrong_version_rejected() {
        let mut peers = peers();
        let packet = Packet::Join {
            peer_id: PlayerId(1),
            protocol_version: PROTOCOL_VERSION + 1,
        };

        match route_packet(&mut peers, packet, addr(9001)).as_slice() {
            [Outbound::SendPacket {
                packet: Packet::Rejected { .. },
                ..
            }] => {}
            other => panic!("Unexpected outbound {:?}", other),
        }
        assert!(peers.is_empty());
    }

    #[test]
    fn test_join_when_full_rejected() {
        let mut peers = peers();
        route_packet(&mut peers, join(1), addr(9001));
        route_packet(&mut peers, join(2), addr(9002));

        match route_packet(&mut peers, join(3), addr(9003)).as_slice() {
            [Outbound::SendPacket {
                packet: Packet::Rejected { reason },
                addr: a,
            }] => {
                assert_eq!(reason, "Relay full");
                assert_eq!(*a, addr(9003));
            }
            other => panic!("Unexpected outbound {:?}", other),
        }
    }

    #[test]
    fn test_publish_broadcasts_to_everyone() {
        let mut peers = peers();
        route_packet(&mut peers, join(1), addr(9001));

        let out = route_packet(&mut peers, publish(1), addr(9001));
        match out.as_slice() {
            [Outbound::BroadcastPacket {
                packet: Packet::Deliver { envelope },
            }] => assert_eq!(envelope.sender, PlayerId(1)),
            other => panic!("Unexpected outbound {:?}", other),
        }
    }

    #[test]
    fn test_publish_dropped_when_unregistered_or_spoofed() {
        let mut peers = peers();
        assert!(route_packet(&mut peers, publish(1), addr(9001)).is_empty());

        route_packet(&mut peers, join(1), addr(9001));
        assert!(route_packet(&mut peers, publish(2), addr(9001)).is_empty());
    }

    #[test]
    fn test_leave_removes_peer() {
        let mut peers = peers();
        route_packet(&mut peers, join(1), addr(9001));
        assert!(route_packet(&mut peers, Packet::Heartbeat, addr(9001)).is_empty());

        route_packet(&mut peers, Packet::Leave, addr(9001));
        assert!(peers.is_empty());
    }

    #[test]
    fn test_relay_event_creation() {
        let msg = RelayEvent::PeerTimeout {
            peer_id: PlayerId(42),
        };

        match msg {
            RelayEvent::PeerTimeout { peer_id } => assert_eq!(peer_id, PlayerId(42)),
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_relay_binds_ephemeral_port() {
        tokio_test::block_on(async {
            let relay = RelayServer::new("127.0.0.1:0", 4, Duration::from_secs(5))
                .await
                .unwrap();
            assert_ne!(relay.local_addr().unwrap().port(), 0);
        });
    }

    #[test]
    fn test_shutdown_stops_run() {
        tokio_test::block_on(async {
            let mut relay = RelayServer::new("127.0.0.1:0", 4, Duration::from_secs(5))
                .await
                .unwrap();
            relay.shutdown_handle().shutdown();
            assert!(relay.run().await.is_ok());
        });
    }
}
