//! Fire-and-forget notifications for the presentation layer.
//!
//! The claim core reports rank, permission, setting and membership changes
//! through a [`ClaimListener`]. Delivery failures never affect the change
//! that triggered them.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use uuid::Uuid;

use crate::rank::{ClaimSetting, Permission, Rank};

/// A change worth telling players about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimEvent {
    /// `claimant` set or cleared the explicit rank of `target`.
    RankChanged {
        /// Claimant whose friend map changed.
        claimant: Uuid,
        /// Identity whose rank changed.
        target: Uuid,
        /// New rank, `None` when the grant was removed.
        rank: Option<Rank>,
    },
    /// `claimant` changed the rank required for `permission`.
    PermissionChanged {
        /// Claimant whose override changed.
        claimant: Uuid,
        /// Affected permission.
        permission: Permission,
        /// New required rank.
        rank: Rank,
    },
    /// `claimant` toggled `setting`.
    SettingChanged {
        /// Claimant whose setting changed.
        claimant: Uuid,
        /// Affected setting.
        setting: ClaimSetting,
        /// New value.
        value: bool,
    },
    /// `player` was invited to `town`.
    TownInvite {
        /// Invited player.
        player: Uuid,
        /// Inviting town.
        town: Uuid,
    },
    /// `player` joined `town`.
    TownJoined {
        /// Joining player.
        player: Uuid,
        /// Joined town.
        town: Uuid,
    },
    /// `player` left or was removed from `town`.
    TownLeft {
        /// Departing player.
        player: Uuid,
        /// Town that was left.
        town: Uuid,
    },
    /// `town` was disbanded; `members` lost their membership.
    TownDisbanded {
        /// Disbanded town.
        town: Uuid,
        /// Former roster.
        members: Vec<Uuid>,
    },
    /// The set of commands available to `player` changed.
    CommandsChanged {
        /// Affected player.
        player: Uuid,
    },
}

/// Receiver of [`ClaimEvent`]s.
pub trait ClaimListener: Send + Sync {
    /// Delivers one event. Must not block.
    fn notify(&self, event: &ClaimEvent);
}

/// Listener that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl ClaimListener for NoopListener {
    fn notify(&self, _event: &ClaimEvent) {}
}

/// Listener that forwards events over a bounded channel.
///
/// When the channel is full or the receiver is gone the event is dropped
/// with a debug log.
#[derive(Clone, Debug)]
pub struct ChannelListener {
    sender: Sender<ClaimEvent>,
}

impl ChannelListener {
    /// Creates a listener and the receiver that drains it.
    pub fn new(capacity: usize) -> (Self, Receiver<ClaimEvent>) {
        let (sender, receiver) = bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl ClaimListener for ChannelListener {
    fn notify(&self, event: &ClaimEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!("claim event dropped, channel full: {event:?}");
            }
            Err(TrySendError::Disconnected(event)) => {
                tracing::debug!("claim event dropped, no receiver: {event:?}");
            }
        }
    }
}
