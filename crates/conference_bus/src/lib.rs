use serde_json::Value;
use shared::{
    domain::{CommandId, ParticipantId, Role},
    protocol::CommandDelivery,
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

mod local_bus;
mod roster;

pub use local_bus::{LocalCommandBus, LocalEndpoint};
pub use roster::{Roster, RosterView};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("command bus closed")]
    Closed,
    #[error("command bus transport error: {0}")]
    Transport(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// Named-channel broadcast as seen by one participant. Deliveries reach
/// every subscriber of the channel, the sender included, and carry the
/// sender's identity when the transport knows it.
pub trait CommandChannel: Send + Sync {
    fn subscribe(&self, channel: &str) -> mpsc::UnboundedReceiver<CommandDelivery>;
    /// Sends `payload` and keeps it pending for late subscribers, replacing
    /// any command this participant still has pending on `channel`.
    fn send_command_once(&self, channel: &str, payload: Value) -> BusResult<CommandId>;
    fn remove_command(&self, channel: &str) -> BusResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    pub participant_id: ParticipantId,
    pub role: Option<Role>,
}

pub trait ModeratorDirectory: Send + Sync {
    fn is_local_moderator(&self) -> bool;
    fn is_local_id(&self, participant_id: &ParticipantId) -> bool;
    fn is_participant_moderator(&self, participant_id: &ParticipantId) -> bool;
    fn subscribe_role_changes(&self) -> broadcast::Receiver<RoleChange>;
}
