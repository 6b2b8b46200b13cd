use std::{sync::Arc, time::Duration};

use conference_bus::{CommandChannel, ModeratorDirectory, RoleChange};
use shared::{domain::CommandId, protocol::CommandDelivery};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::FollowSettings,
    controller::{DeliveryOutcome, FollowController},
    resolver::{PinOutcome, RetryHandle, RetryScheduler},
    state::StateChange,
    FollowError, InterfaceSurface, UiIntent, UiIntentSource,
};

/// Everything the session loop reacts to. Events are handled one at a time
/// in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    Intent(UiIntent),
    Delivery(CommandDelivery),
    RetryTick(u64),
    RoleChanged(RoleChange),
    SetEnabled(bool),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowEvent {
    StateChanged(StateChange),
    SnapshotRebroadcast(CommandId),
    Delivery(DeliveryOutcome),
    Retry(PinOutcome),
}

/// Posts retry ticks back into the session loop after a tokio sleep.
#[derive(Debug, Clone)]
pub struct TokioRetryScheduler {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl TokioRetryScheduler {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }
}

impl RetryScheduler for TokioRetryScheduler {
    fn schedule(&self, delay: Duration, generation: u64) -> RetryHandle {
        let events = self.events.clone();
        RetryHandle::from_task(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::RetryTick(generation));
        }))
    }
}

/// Runs a [`FollowController`] on its own task.
pub struct FollowSession {
    events: mpsc::UnboundedSender<SessionEvent>,
    notifications: broadcast::Sender<FollowEvent>,
    task: JoinHandle<FollowController>,
}

impl FollowSession {
    pub fn start(
        settings: FollowSettings,
        channel: Arc<dyn CommandChannel>,
        directory: Arc<dyn ModeratorDirectory>,
        surface: Arc<dyn InterfaceSurface>,
        intents: Arc<dyn UiIntentSource>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(256);

        let scheduler = Arc::new(TokioRetryScheduler::new(events_tx.clone()));
        let deliveries = channel.subscribe(&settings.channel_name);
        let role_changes = directory.subscribe_role_changes();
        let controller = FollowController::new(
            settings,
            channel,
            Arc::clone(&directory),
            surface,
            scheduler,
        );

        let forwarders = vec![
            spawn_delivery_forwarder(deliveries, events_tx.clone()),
            spawn_role_forwarder(role_changes, events_tx.clone()),
        ];
        let session_loop = SessionLoop {
            controller,
            directory,
            intents,
            events_tx: events_tx.clone(),
            intent_forwarder: None,
            forwarders,
            notifications: notifications.clone(),
        };
        let task = tokio::spawn(session_loop.run(events_rx));

        Self {
            events: events_tx,
            notifications,
            task,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FollowEvent> {
        self.notifications.subscribe()
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), FollowError> {
        self.send(SessionEvent::SetEnabled(enabled))
    }

    pub fn send(&self, event: SessionEvent) -> Result<(), FollowError> {
        self.events
            .send(event)
            .map_err(|_| FollowError::SessionStopped)
    }

    /// Stops the loop and hands back the controller for inspection.
    pub async fn shutdown(self) -> Result<FollowController, FollowError> {
        let _ = self.events.send(SessionEvent::Shutdown);
        Ok(self.task.await?)
    }
}

struct SessionLoop {
    controller: FollowController,
    directory: Arc<dyn ModeratorDirectory>,
    intents: Arc<dyn UiIntentSource>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    intent_forwarder: Option<JoinHandle<()>>,
    forwarders: Vec<JoinHandle<()>>,
    notifications: broadcast::Sender<FollowEvent>,
}

impl SessionLoop {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) -> FollowController {
        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Shutdown) {
                break;
            }
            self.handle(event);
        }

        if let Some(forwarder) = self.intent_forwarder.take() {
            forwarder.abort();
        }
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        info!("follow: session stopped");
        self.controller
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Intent(intent) => {
                if let Some(change) = self.controller.handle_intent(intent) {
                    self.notify(FollowEvent::StateChanged(change));
                }
            }
            SessionEvent::Delivery(delivery) => {
                let outcome = self.controller.handle_delivery(&delivery);
                self.notify(FollowEvent::Delivery(outcome));
            }
            SessionEvent::RetryTick(generation) => {
                let outcome = self.controller.handle_retry_tick(generation);
                if outcome != PinOutcome::StaleTick {
                    self.notify(FollowEvent::Retry(outcome));
                }
            }
            SessionEvent::RoleChanged(change) => {
                let granted = self.directory.is_local_id(&change.participant_id)
                    && change.role.is_some_and(|role| role.is_moderator());
                if granted {
                    if let Some(command_id) = self.controller.on_moderator_granted() {
                        self.notify(FollowEvent::SnapshotRebroadcast(command_id));
                    }
                }
            }
            SessionEvent::SetEnabled(enabled) => self.set_enabled(enabled),
            SessionEvent::Shutdown => {}
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if !self.controller.set_enabled(enabled) {
            return;
        }
        if enabled {
            let intents = self.intents.subscribe_intents();
            self.intent_forwarder = Some(spawn_intent_forwarder(intents, self.events_tx.clone()));
        } else if let Some(forwarder) = self.intent_forwarder.take() {
            forwarder.abort();
        }
    }

    fn notify(&self, event: FollowEvent) {
        let _ = self.notifications.send(event);
    }
}

fn spawn_intent_forwarder(
    mut intents: broadcast::Receiver<UiIntent>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match intents.recv().await {
                Ok(intent) => {
                    if events.send(SessionEvent::Intent(intent)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "follow: ui intent subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_delivery_forwarder(
    mut deliveries: mpsc::UnboundedReceiver<CommandDelivery>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(delivery) = deliveries.recv().await {
            if events.send(SessionEvent::Delivery(delivery)).is_err() {
                break;
            }
        }
        debug!("follow: command channel closed");
    })
}

fn spawn_role_forwarder(
    mut role_changes: broadcast::Receiver<RoleChange>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match role_changes.recv().await {
                Ok(change) => {
                    if events.send(SessionEvent::RoleChanged(change)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "follow: role change subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
