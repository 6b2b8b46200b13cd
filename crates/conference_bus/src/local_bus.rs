use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use shared::{
    domain::{CommandId, ParticipantId},
    protocol::CommandDelivery,
};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{BusError, BusResult, CommandChannel};

/// In-memory command bus shared by every participant of one session.
#[derive(Debug, Default)]
pub struct LocalCommandBus {
    inner: Mutex<BusState>,
}

#[derive(Debug, Default)]
struct BusState {
    closed: bool,
    channels: HashMap<String, ChannelState>,
}

#[derive(Debug, Default)]
struct ChannelState {
    subscribers: Vec<mpsc::UnboundedSender<CommandDelivery>>,
    pending: BTreeMap<ParticipantId, CommandDelivery>,
}

impl ChannelState {
    fn fan_out(&mut self, delivery: &CommandDelivery) {
        self.subscribers
            .retain(|subscriber| subscriber.send(delivery.clone()).is_ok());
    }
}

impl LocalCommandBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn endpoint(self: &Arc<Self>, participant_id: ParticipantId) -> LocalEndpoint {
        LocalEndpoint {
            bus: Arc::clone(self),
            participant_id,
        }
    }

    /// Delivers a one-shot command that is never kept pending. Lets callers
    /// simulate transports that lose or forge sender identity.
    pub fn inject(&self, channel: &str, sender_id: Option<ParticipantId>, payload: Value) {
        let mut guard = self.inner.lock();
        if guard.closed {
            return;
        }
        let delivery = CommandDelivery {
            command_id: CommandId::generate(),
            channel: channel.to_string(),
            sender_id,
            payload,
            sent_at: Utc::now(),
        };
        guard
            .channels
            .entry(channel.to_string())
            .or_default()
            .fan_out(&delivery);
    }

    pub fn pending_command(&self, channel: &str, sender_id: &ParticipantId) -> Option<CommandDelivery> {
        let guard = self.inner.lock();
        guard
            .channels
            .get(channel)
            .and_then(|state| state.pending.get(sender_id))
            .cloned()
    }

    pub fn pending_count(&self, channel: &str) -> usize {
        let guard = self.inner.lock();
        guard
            .channels
            .get(channel)
            .map(|state| state.pending.len())
            .unwrap_or_default()
    }

    /// Drops every subscriber and pending command; later sends fail.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        guard.closed = true;
        guard.channels.clear();
    }

    fn subscribe_as(&self, channel: &str) -> mpsc::UnboundedReceiver<CommandDelivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.inner.lock();
        if guard.closed {
            return rx;
        }
        let state = guard.channels.entry(channel.to_string()).or_default();
        for delivery in state.pending.values() {
            let _ = tx.send(delivery.clone());
        }
        state.subscribers.push(tx);
        rx
    }

    fn send_once_as(
        &self,
        sender_id: &ParticipantId,
        channel: &str,
        payload: Value,
    ) -> BusResult<CommandId> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Err(BusError::Closed);
        }
        let delivery = CommandDelivery {
            command_id: CommandId::generate(),
            channel: channel.to_string(),
            sender_id: Some(sender_id.clone()),
            payload,
            sent_at: Utc::now(),
        };
        let state = guard.channels.entry(channel.to_string()).or_default();
        if let Some(replaced) = state.pending.insert(sender_id.clone(), delivery.clone()) {
            debug!(
                sender_id = %sender_id,
                channel,
                replaced = %replaced.command_id,
                "bus: replaced pending command"
            );
        }
        state.fan_out(&delivery);
        Ok(delivery.command_id)
    }

    fn remove_as(&self, sender_id: &ParticipantId, channel: &str) -> BusResult<()> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Err(BusError::Closed);
        }
        if let Some(state) = guard.channels.get_mut(channel) {
            state.pending.remove(sender_id);
        }
        Ok(())
    }
}

/// One participant's handle onto a [`LocalCommandBus`].
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    bus: Arc<LocalCommandBus>,
    participant_id: ParticipantId,
}

impl LocalEndpoint {
    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }
}

impl CommandChannel for LocalEndpoint {
    fn subscribe(&self, channel: &str) -> mpsc::UnboundedReceiver<CommandDelivery> {
        self.bus.subscribe_as(channel)
    }

    fn send_command_once(&self, channel: &str, payload: Value) -> BusResult<CommandId> {
        self.bus.send_once_as(&self.participant_id, channel, payload)
    }

    fn remove_command(&self, channel: &str) -> BusResult<()> {
        self.bus.remove_as(&self.participant_id, channel)
    }
}

#[cfg(test)]
#[path = "tests/local_bus_tests.rs"]
mod tests;
