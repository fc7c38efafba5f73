//! In-process context registry and broadcast loop.
//!
//! The [`Hub`] owns every live phone in a process. Phones are added with
//! [`Hub::register`] and removed with [`Hub::unregister`]; nothing about them
//! is global. Outgoing broadcasts are collected into a pending queue and
//! delivered to every registered phone, the sender included, which is exactly
//! what the relay does over UDP. Tests reach into the queue to duplicate,
//! reorder or inject deliveries.

use crate::phone::Phone;
use crate::snapshot::{Intent, Snapshot};
use log::{debug, warn};
use shared::{Envelope, PlayerId};
use std::collections::{BTreeMap, VecDeque};

/// Granularity of [`Hub::advance`]
pub const STEP_MS: u64 = 50;

/// Delivery rounds per [`Hub::deliver_all`] before giving up on quiescence
const MAX_ROUNDS: usize = 64;

#[derive(Default)]
pub struct Hub {
    phones: BTreeMap<PlayerId, Phone>,
    pending: VecDeque<Envelope>,
    now_ms: u64,
    delivered: u64,
    duplicate_delivery: bool,
    reverse_order: bool,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a phone; replaces and returns any phone with the same id
    pub fn register(&mut self, phone: Phone) -> Option<Phone> {
        let previous = self.phones.insert(phone.id(), phone);
        if previous.is_some() {
            warn!("Replacing registered phone");
        }
        previous
    }

    pub fn unregister(&mut self, id: PlayerId) -> Option<Phone> {
        let phone = self.phones.remove(&id);
        if phone.is_some() {
            debug!("Unregistered phone {}", id);
        }
        phone
    }

    pub fn get(&self, id: PlayerId) -> Option<&Phone> {
        self.phones.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Phone> {
        self.phones.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.phones.keys().copied().collect()
    }

    pub fn phones(&self) -> impl Iterator<Item = &Phone> {
        self.phones.values()
    }

    pub fn len(&self) -> usize {
        self.phones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phones.is_empty()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Envelopes handed to phones so far, counting each recipient
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn set_duplicate_delivery(&mut self, enabled: bool) {
        self.duplicate_delivery = enabled;
    }

    pub fn set_reverse_order(&mut self, enabled: bool) {
        self.reverse_order = enabled;
    }

    pub fn start(&mut self, id: PlayerId, claim_host: bool) -> bool {
        let now_ms = self.now_ms;
        match self.phones.get_mut(&id) {
            Some(phone) => {
                phone.start(now_ms, claim_host);
                true
            }
            None => false,
        }
    }

    /// Forwards a user intent; false if no such phone is registered
    pub fn intent(&mut self, id: PlayerId, intent: Intent) -> bool {
        let now_ms = self.now_ms;
        match self.phones.get_mut(&id) {
            Some(phone) => {
                phone.handle_intent(now_ms, intent);
                true
            }
            None => {
                warn!("Intent {:?} for unknown phone {}", intent, id);
                false
            }
        }
    }

    pub fn snapshot(&self, id: PlayerId) -> Option<Snapshot> {
        self.phones.get(&id).map(|phone| phone.snapshot(self.now_ms))
    }

    /// Runs due timers on every phone
    pub fn tick(&mut self) {
        let now_ms = self.now_ms;
        for phone in self.phones.values_mut() {
            phone.tick(now_ms);
        }
    }

    /// Moves every phone's outbox into the pending queue
    pub fn collect(&mut self) -> usize {
        let before = self.pending.len();
        for phone in self.phones.values_mut() {
            self.pending.extend(phone.drain_outbox());
        }
        self.pending.len() - before
    }

    pub fn pending(&self) -> &VecDeque<Envelope> {
        &self.pending
    }

    /// Queues an envelope as if some participant had published it
    pub fn inject(&mut self, envelope: Envelope) {
        self.pending.push_back(envelope);
    }

    /// Delivers everything currently pending to every phone, once
    pub fn deliver_pending(&mut self) -> usize {
        let mut batch: Vec<Envelope> = self.pending.drain(..).collect();
        if self.reverse_order {
            batch.reverse();
        }
        let copies = if self.duplicate_delivery { 2 } else { 1 };
        let now_ms = self.now_ms;

        for envelope in &batch {
            for _ in 0..copies {
                for phone in self.phones.values_mut() {
                    phone.handle_envelope(now_ms, envelope.clone());
                    self.delivered += 1;
                }
            }
        }
        batch.len()
    }

    /// Collects and delivers until no phone has anything left to say
    pub fn deliver_all(&mut self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_ROUNDS {
            self.collect();
            if self.pending.is_empty() {
                return total;
            }
            total += self.deliver_pending();
        }
        warn!("Broadcast loop still busy after {} rounds", MAX_ROUNDS);
        total
    }

    /// Moves the clock forward in [`STEP_MS`] steps, firing timers and
    /// delivering broadcasts along the way
    pub fn advance(&mut self, ms: u64) {
        let target = self.now_ms + ms;
        self.deliver_all();
        while self.now_ms < target {
            self.now_ms = (self.now_ms + STEP_MS).min(target);
            self.tick();
            self.deliver_all();
        }
    }
}
