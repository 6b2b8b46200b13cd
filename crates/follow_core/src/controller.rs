use std::sync::Arc;

use conference_bus::{CommandChannel, ModeratorDirectory};
use shared::{
    domain::CommandId,
    protocol::{CommandDelivery, FollowMeCommand},
};
use tracing::{debug, info, warn};

use crate::{
    config::FollowSettings,
    resolver::{PinOutcome, PinResolver, ResolverState, RetryScheduler},
    state::{FollowState, FollowUpdate, StateChange},
    InterfaceSurface, UiIntent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    MissingSender,
    SelfOriginated,
    Unauthorized,
    Malformed,
    Applied {
        panel_toggled: bool,
        shared_artifact_toggled: bool,
        focus: PinOutcome,
    },
}

/// Owns the local followable state. Broadcasts it while the local
/// participant is moderator and reconciles snapshots received from the
/// moderator into the local interface.
pub struct FollowController {
    settings: FollowSettings,
    state: FollowState,
    resolver: PinResolver,
    enabled: bool,
    channel: Arc<dyn CommandChannel>,
    directory: Arc<dyn ModeratorDirectory>,
    surface: Arc<dyn InterfaceSurface>,
    scheduler: Arc<dyn RetryScheduler>,
}

impl FollowController {
    pub fn new(
        settings: FollowSettings,
        channel: Arc<dyn CommandChannel>,
        directory: Arc<dyn ModeratorDirectory>,
        surface: Arc<dyn InterfaceSurface>,
        scheduler: Arc<dyn RetryScheduler>,
    ) -> Self {
        let resolver = PinResolver::new(settings.retry_interval(), settings.retry_deadline_ticks);
        Self {
            settings,
            state: FollowState::default(),
            resolver,
            enabled: false,
            channel,
            directory,
            surface,
            scheduler,
        }
    }

    pub fn settings(&self) -> &FollowSettings {
        &self.settings
    }

    pub fn state(&self) -> &FollowState {
        &self.state
    }

    pub fn resolver_state(&self) -> ResolverState {
        self.resolver.state()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true when the flag actually changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if self.enabled == enabled {
            return false;
        }
        self.enabled = enabled;
        info!(enabled, "follow: mirroring local ui intents");
        if !enabled && self.directory.is_local_moderator() {
            self.withdraw_snapshot();
        }
        true
    }

    pub fn handle_intent(&mut self, intent: UiIntent) -> Option<StateChange> {
        if !self.enabled {
            return None;
        }
        let update = match intent {
            UiIntent::PanelToggled { visible } => FollowUpdate::PanelVisible(Some(visible)),
            UiIntent::SharedArtifactToggled { visible } => {
                FollowUpdate::SharedArtifactVisible(Some(visible))
            }
            UiIntent::PinToggled { entity, pinned } => {
                if !self.directory.is_local_moderator() {
                    debug!(entity = %entity, pinned, "follow: ignoring pin from non-moderator");
                    return None;
                }
                FollowUpdate::FocusedEntity(pinned.then_some(entity))
            }
        };

        let change = self.state.set(update)?;
        self.on_state_changed(&change);
        Some(change)
    }

    /// Rebroadcasts the current snapshot after the local participant gained
    /// moderator privilege.
    pub fn on_moderator_granted(&mut self) -> Option<CommandId> {
        if !self.enabled || !self.directory.is_local_moderator() {
            return None;
        }
        self.broadcast_snapshot()
    }

    pub fn handle_delivery(&mut self, delivery: &CommandDelivery) -> DeliveryOutcome {
        let Some(sender_id) = delivery.sender_id.as_ref() else {
            debug!(command_id = %delivery.command_id, "follow: dropping command without sender");
            return DeliveryOutcome::MissingSender;
        };
        if self.directory.is_local_id(sender_id) {
            return DeliveryOutcome::SelfOriginated;
        }
        if !self.directory.is_participant_moderator(sender_id) {
            warn!(
                sender_id = %sender_id,
                command_id = %delivery.command_id,
                "follow: received command from non-moderator"
            );
            return DeliveryOutcome::Unauthorized;
        }

        let command = match FollowMeCommand::from_value(&delivery.payload) {
            Ok(decoded) => {
                for rejection in &decoded.rejected {
                    warn!(sender_id = %sender_id, "follow: ignoring command field: {rejection}");
                }
                decoded.command
            }
            Err(err) => {
                warn!(sender_id = %sender_id, "follow: dropping malformed command: {err}");
                return DeliveryOutcome::Malformed;
            }
        };

        let panel_toggled = reconcile_flag(
            command.panel_visible,
            self.surface.is_panel_visible(),
            || self.surface.toggle_panel(),
        );
        let shared_artifact_toggled = reconcile_flag(
            command.shared_artifact_visible,
            self.surface.is_shared_artifact_visible(),
            || self.surface.toggle_shared_artifact(),
        );
        let focus = self.resolver.on_instruction(
            command.focused_entity_id.as_ref(),
            self.surface.as_ref(),
            self.scheduler.as_ref(),
        );

        debug!(
            sender_id = %sender_id,
            panel_toggled,
            shared_artifact_toggled,
            ?focus,
            "follow: applied moderator snapshot"
        );
        DeliveryOutcome::Applied {
            panel_toggled,
            shared_artifact_toggled,
            focus,
        }
    }

    pub fn handle_retry_tick(&mut self, generation: u64) -> PinOutcome {
        self.resolver
            .on_tick(generation, self.surface.as_ref(), self.scheduler.as_ref())
    }

    fn on_state_changed(&mut self, change: &StateChange) {
        debug!(field = ?change.field(), old = ?change.old, new = ?change.new, "follow: state changed");
        if self.directory.is_local_moderator() {
            self.broadcast_snapshot();
        }
    }

    fn broadcast_snapshot(&mut self) -> Option<CommandId> {
        self.withdraw_snapshot();
        let snapshot = self.state.snapshot();
        match self
            .channel
            .send_command_once(&self.settings.channel_name, snapshot.to_value())
        {
            Ok(command_id) => {
                debug!(command_id = %command_id, ?snapshot, "follow: broadcast snapshot");
                Some(command_id)
            }
            Err(err) => {
                warn!("follow: failed to broadcast snapshot: {err}");
                None
            }
        }
    }

    fn withdraw_snapshot(&self) {
        if let Err(err) = self.channel.remove_command(&self.settings.channel_name) {
            warn!("follow: failed to withdraw pending snapshot: {err}");
        }
    }
}

/// Toggles when the requested value is defined and differs from the
/// current one. Returns whether a toggle happened.
fn reconcile_flag(requested: Option<bool>, current: bool, toggle: impl FnOnce()) -> bool {
    match requested {
        Some(requested) if requested != current => {
            toggle();
            true
        }
        _ => false,
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
