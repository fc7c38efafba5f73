//! Host authority tracking
//!
//! Every phone applies HostChanged unconditionally and identically, so once a
//! transfer has been observed everywhere exactly one phone reports `is_host`.
//! Privileged intents are gated here on the sending side only; receivers never
//! check who sent a GameStart or GameReset.

use log::{info, warn};
use shared::PlayerId;

/// Intents only the host may perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegedAction {
    StartGame,
    ResetGame,
    OpenSettings,
    ConfirmSettings,
    TransferHost,
}

/// What a HostChanged meant for this phone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTransition {
    Gained,
    Lost,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct HostAuthority {
    local_id: PlayerId,
    current: Option<PlayerId>,
}

impl HostAuthority {
    pub fn new(local_id: PlayerId) -> Self {
        Self {
            local_id,
            current: None,
        }
    }

    pub fn current(&self) -> Option<PlayerId> {
        self.current
    }

    pub fn is_host(&self) -> bool {
        self.current == Some(self.local_id)
    }

    pub fn apply(
        &mut self,
        new_host_id: PlayerId,
        old_host_id: Option<PlayerId>,
    ) -> HostTransition {
        let was_host = self.is_host();
        if self.current != Some(new_host_id) {
            info!(
                "Host changed: {:?} -> {} (announced previous: {:?})",
                self.current, new_host_id, old_host_id
            );
        }
        self.current = Some(new_host_id);

        match (was_host, self.is_host()) {
            (false, true) => HostTransition::Gained,
            (true, false) => HostTransition::Lost,
            _ => HostTransition::Unchanged,
        }
    }

    /// Sender-side gate; logs and refuses when this phone is not the host
    pub fn authorize(&self, action: PrivilegedAction) -> bool {
        if self.is_host() {
            return true;
        }
        warn!(
            "Player {} attempted {:?} without host authority (host is {:?})",
            self.local_id, action, self.current
        );
        false
    }
}
