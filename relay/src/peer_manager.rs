//! Peer registry for the broadcast relay
//!
//! This module tracks which participants are currently reachable:
//! - Peer registration lifecycle (join, leave, timeout)
//! - Address tracking so every published envelope can be fanned out
//! - Capacity limits
//!
//! The relay keeps no session state; a peer entry is only an address and a
//! liveness timestamp.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A registered participant
#[derive(Debug)]
pub struct Peer {
    /// Player id the participant joined with
    pub id: PlayerId,
    /// Where deliveries are sent
    pub addr: SocketAddr,
    /// Last time any packet arrived from this peer
    pub last_seen: Instant,
}

impl Peer {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing was heard from the peer within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Outcome of a Join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New,
    /// Known id, possibly from a new address
    Refreshed,
    Full,
}

/// Manages all registered peers
///
/// Peers are keyed by the player id they joined with. A participant that
/// rejoins from a new address replaces its old entry, and a new id arriving
/// from an address already in use evicts whoever held that address.
pub struct PeerManager {
    peers: HashMap<PlayerId, Peer>,
    max_peers: usize,
    timeout: Duration,
}

impl PeerManager {
    pub fn new(max_peers: usize, timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            max_peers,
            timeout,
        }
    }

    pub fn register(&mut self, id: PlayerId, addr: SocketAddr) -> Registration {
        if let Some(peer) = self.peers.get_mut(&id) {
            if peer.addr != addr {
                info!("Peer {} moved from {} to {}", id, peer.addr, addr);
                peer.addr = addr;
            }
            peer.touch();
            return Registration::Refreshed;
        }

        if let Some(previous) = self.find_peer_by_addr(addr) {
            info!("Peer {} replaced by {} at {}", previous, id, addr);
            self.remove_peer(&previous);
        }

        if self.peers.len() >= self.max_peers {
            return Registration::Full;
        }

        info!("Peer {} joined from {}", id, addr);
        self.peers.insert(id, Peer::new(id, addr));
        Registration::New
    }

    /// Returns true if the peer was registered
    pub fn remove_peer(&mut self, id: &PlayerId) -> bool {
        if let Some(peer) = self.peers.remove(id) {
            info!("Peer {} left", peer.id);
            true
        } else {
            false
        }
    }

    pub fn find_peer_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.peers
            .iter()
            .find(|(_, peer)| peer.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Marks the peer at `addr` as alive; returns its id if registered
    pub fn touch_addr(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        let peer = self.peers.values_mut().find(|peer| peer.addr == addr)?;
        peer.touch();
        Some(peer.id)
    }

    /// Removes and returns every peer silent for longer than the timeout
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        let timeout = self.timeout;
        let timed_out: Vec<PlayerId> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for id in &timed_out {
            self.remove_peer(id);
        }

        timed_out
    }

    /// Every peer address, for fan-out
    pub fn peer_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.peers
            .iter()
            .map(|(id, peer)| (*id, peer.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn manager(max_peers: usize) -> PeerManager {
        PeerManager::new(max_peers, Duration::from_secs(5))
    }

    #[test]
    fn test_peer_timeout() {
        let mut peer = Peer::new(PlayerId(1), test_addr());
        assert!(!peer.is_timed_out(Duration::from_secs(1)));

        peer.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(peer.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_register_peers() {
        let mut manager = manager(3);
        assert!(manager.is_empty());

        assert_eq!(manager.register(PlayerId(1), test_addr()), Registration::New);
        assert_eq!(manager.register(PlayerId(2), test_addr2()), Registration::New);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.find_peer_by_addr(test_addr2()), Some(PlayerId(2)));
    }

    #[test]
    fn test_rejoin_from_new_address() {
        let mut manager = manager(3);
        manager.register(PlayerId(1), test_addr());

        assert_eq!(manager.register(PlayerId(1), test_addr2()), Registration::Refreshed);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.find_peer_by_addr(test_addr()), None);
        assert_eq!(manager.find_peer_by_addr(test_addr2()), Some(PlayerId(1)));
    }

    #[test]
    fn test_new_id_at_used_address_replaces() {
        let mut manager = manager(3);
        manager.register(PlayerId(1), test_addr());

        assert_eq!(manager.register(PlayerId(5), test_addr()), Registration::New);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.find_peer_by_addr(test_addr()), Some(PlayerId(5)));
    }

    #[test]
    fn test_capacity() {
        let mut manager = manager(1);
        assert_eq!(manager.register(PlayerId(1), test_addr()), Registration::New);
        assert_eq!(manager.register(PlayerId(2), test_addr2()), Registration::Full);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_and_touch() {
        let mut manager = manager(2);
        manager.register(PlayerId(1), test_addr());

        assert_eq!(manager.touch_addr(test_addr()), Some(PlayerId(1)));
        assert_eq!(manager.touch_addr(test_addr2()), None);

        assert!(manager.remove_peer(&PlayerId(1)));
        assert!(!manager.remove_peer(&PlayerId(1)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_check_timeouts() {
        let mut manager = PeerManager::new(4, Duration::from_millis(100));
        manager.register(PlayerId(1), test_addr());
        manager.register(PlayerId(2), test_addr2());

        if let Some(peer) = manager.peers.get_mut(&PlayerId(1)) {
            peer.last_seen = Instant::now() - Duration::from_secs(1);
        }

        assert_eq!(manager.check_timeouts(), vec![PlayerId(1)]);
        assert_eq!(manager.peer_addrs(), vec![(PlayerId(2), test_addr2())]);
    }
}
