use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use conference_bus::{BusResult, CommandChannel, ModeratorDirectory, RoleChange};
use parking_lot::Mutex;
use serde_json::Value;
use shared::{
    domain::{CommandId, EntityId, ParticipantId},
    protocol::CommandDelivery,
};
use tokio::sync::{broadcast, mpsc};

use crate::{InterfaceSurface, RetryHandle, RetryScheduler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    TogglePanel,
    ToggleSharedArtifact,
    SetPinned(EntityId, bool),
}

#[derive(Default)]
struct SurfaceState {
    panel_visible: bool,
    shared_artifact_visible: bool,
    pinned: Option<EntityId>,
    resolvable: HashSet<EntityId>,
    calls: Vec<SurfaceCall>,
}

#[derive(Default)]
pub struct FakeSurface {
    inner: Mutex<SurfaceState>,
}

impl FakeSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn materialize(&self, entity: &str) {
        self.inner.lock().resolvable.insert(EntityId::from(entity));
    }

    pub fn with_panel_visible(self: Arc<Self>, visible: bool) -> Arc<Self> {
        self.inner.lock().panel_visible = visible;
        self
    }

    pub fn with_pinned(self: Arc<Self>, entity: &str) -> Arc<Self> {
        {
            let mut guard = self.inner.lock();
            guard.resolvable.insert(EntityId::from(entity));
            guard.pinned = Some(EntityId::from(entity));
        }
        self
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.inner.lock().calls.clone()
    }
}

impl InterfaceSurface for FakeSurface {
    fn is_panel_visible(&self) -> bool {
        self.inner.lock().panel_visible
    }

    fn toggle_panel(&self) {
        let mut guard = self.inner.lock();
        guard.panel_visible = !guard.panel_visible;
        guard.calls.push(SurfaceCall::TogglePanel);
    }

    fn is_shared_artifact_visible(&self) -> bool {
        self.inner.lock().shared_artifact_visible
    }

    fn toggle_shared_artifact(&self) {
        let mut guard = self.inner.lock();
        guard.shared_artifact_visible = !guard.shared_artifact_visible;
        guard.calls.push(SurfaceCall::ToggleSharedArtifact);
    }

    fn pinned_entity(&self) -> Option<EntityId> {
        self.inner.lock().pinned.clone()
    }

    fn is_resolvable(&self, entity: &EntityId) -> bool {
        self.inner.lock().resolvable.contains(entity)
    }

    fn set_pinned(&self, entity: &EntityId, pinned: bool) {
        let mut guard = self.inner.lock();
        if pinned {
            guard.pinned = Some(entity.clone());
        } else if guard.pinned.as_ref() == Some(entity) {
            guard.pinned = None;
        }
        guard.calls.push(SurfaceCall::SetPinned(entity.clone(), pinned));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCall {
    Remove(String),
    Send(String, Value),
}

#[derive(Default)]
pub struct RecordingChannel {
    calls: Mutex<Vec<ChannelCall>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().clone()
    }

    pub fn sent_payloads(&self) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ChannelCall::Send(_, payload) => Some(payload.clone()),
                ChannelCall::Remove(_) => None,
            })
            .collect()
    }
}

impl CommandChannel for RecordingChannel {
    fn subscribe(&self, _channel: &str) -> mpsc::UnboundedReceiver<CommandDelivery> {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }

    fn send_command_once(&self, channel: &str, payload: Value) -> BusResult<CommandId> {
        self.calls
            .lock()
            .push(ChannelCall::Send(channel.to_string(), payload));
        Ok(CommandId::generate())
    }

    fn remove_command(&self, channel: &str) -> BusResult<()> {
        self.calls.lock().push(ChannelCall::Remove(channel.to_string()));
        Ok(())
    }
}

pub struct StaticDirectory {
    local_id: ParticipantId,
    moderators: Mutex<HashSet<ParticipantId>>,
    changes: broadcast::Sender<RoleChange>,
}

impl StaticDirectory {
    pub fn new(local_id: &str) -> Arc<Self> {
        let (changes, _) = broadcast::channel(16);
        Arc::new(Self {
            local_id: ParticipantId::from(local_id),
            moderators: Mutex::new(HashSet::new()),
            changes,
        })
    }

    pub fn grant(&self, participant_id: &str) {
        self.moderators.lock().insert(ParticipantId::from(participant_id));
    }

    pub fn revoke(&self, participant_id: &str) {
        self.moderators.lock().remove(&ParticipantId::from(participant_id));
    }
}

impl ModeratorDirectory for StaticDirectory {
    fn is_local_moderator(&self) -> bool {
        self.moderators.lock().contains(&self.local_id)
    }

    fn is_local_id(&self, participant_id: &ParticipantId) -> bool {
        *participant_id == self.local_id
    }

    fn is_participant_moderator(&self, participant_id: &ParticipantId) -> bool {
        self.moderators.lock().contains(participant_id)
    }

    fn subscribe_role_changes(&self) -> broadcast::Receiver<RoleChange> {
        self.changes.subscribe()
    }
}

pub struct ScheduledTick {
    pub delay: Duration,
    pub generation: u64,
    pub cancelled: Arc<AtomicBool>,
}

impl ScheduledTick {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Records scheduled ticks; tests fire them by hand.
#[derive(Default)]
pub struct ManualScheduler {
    ticks: Mutex<Vec<ScheduledTick>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scheduled_count(&self) -> usize {
        self.ticks.lock().len()
    }

    pub fn last_generation(&self) -> Option<u64> {
        self.ticks.lock().last().map(|tick| tick.generation)
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.ticks.lock().last().map(|tick| tick.delay)
    }

    pub fn is_cancelled(&self, generation: u64) -> bool {
        self.ticks
            .lock()
            .iter()
            .find(|tick| tick.generation == generation)
            .is_some_and(ScheduledTick::is_cancelled)
    }
}

impl RetryScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, generation: u64) -> RetryHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.ticks.lock().push(ScheduledTick {
            delay,
            generation,
            cancelled: Arc::clone(&cancelled),
        });
        RetryHandle::on_cancel(move || cancelled.store(true, Ordering::SeqCst))
    }
}
