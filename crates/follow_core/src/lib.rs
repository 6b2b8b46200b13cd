use shared::domain::EntityId;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod config;
pub mod controller;
pub mod headless;
pub mod resolver;
pub mod session;
pub mod state;

pub use self::config::{load_settings, FollowSettings};
pub use controller::{DeliveryOutcome, FollowController};
pub use headless::{HeadlessInterface, InterfaceView};
pub use resolver::{PinOutcome, PinResolver, ResolverState, RetryHandle, RetryScheduler};
pub use session::{FollowEvent, FollowSession, SessionEvent, TokioRetryScheduler};
pub use state::{FollowField, FollowState, FollowUpdate, StateChange};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("invalid follow settings: {0}")]
    InvalidSettings(String),
    #[error("follow session has stopped")]
    SessionStopped,
    #[error("follow session task failed: {0}")]
    SessionTask(#[from] tokio::task::JoinError),
}

/// Local UI actions the controller mirrors into followable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiIntent {
    PanelToggled { visible: bool },
    PinToggled { entity: EntityId, pinned: bool },
    SharedArtifactToggled { visible: bool },
}

pub trait UiIntentSource: Send + Sync {
    fn subscribe_intents(&self) -> broadcast::Receiver<UiIntent>;
}

/// The local interface as the controller sees it. `is_resolvable` returning
/// false means the entity has no live UI element yet.
pub trait InterfaceSurface: Send + Sync {
    fn is_panel_visible(&self) -> bool;
    fn toggle_panel(&self);
    fn is_shared_artifact_visible(&self) -> bool;
    fn toggle_shared_artifact(&self);
    fn pinned_entity(&self) -> Option<EntityId>;
    fn is_resolvable(&self, entity: &EntityId) -> bool;
    fn set_pinned(&self, entity: &EntityId, pinned: bool);
}

#[cfg(test)]
pub(crate) mod test_support;
