use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use shared::domain::{ParticipantId, ParticipantSummary, Role};
use tokio::sync::broadcast;
use tracing::info;

use crate::{ModeratorDirectory, RoleChange};

/// Participant roles for one session. Role checks always read the current
/// table, so a grant or revocation is visible to the very next check.
#[derive(Debug)]
pub struct Roster {
    participants: RwLock<HashMap<ParticipantId, ParticipantSummary>>,
    changes: broadcast::Sender<RoleChange>,
}

impl Roster {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(64);
        Arc::new(Self {
            participants: RwLock::new(HashMap::new()),
            changes,
        })
    }

    pub fn join(&self, participant_id: ParticipantId, display_name: impl Into<String>, role: Role) {
        let summary = ParticipantSummary {
            participant_id: participant_id.clone(),
            display_name: display_name.into(),
            role,
        };
        self.participants.write().insert(participant_id.clone(), summary);
        let _ = self.changes.send(RoleChange {
            participant_id,
            role: Some(role),
        });
    }

    pub fn set_role(&self, participant_id: &ParticipantId, role: Role) -> bool {
        let updated = {
            let mut guard = self.participants.write();
            match guard.get_mut(participant_id) {
                Some(summary) if summary.role != role => {
                    summary.role = role;
                    true
                }
                _ => false,
            }
        };
        if updated {
            info!(participant_id = %participant_id, ?role, "roster: role changed");
            let _ = self.changes.send(RoleChange {
                participant_id: participant_id.clone(),
                role: Some(role),
            });
        }
        updated
    }

    pub fn leave(&self, participant_id: &ParticipantId) {
        if self.participants.write().remove(participant_id).is_some() {
            let _ = self.changes.send(RoleChange {
                participant_id: participant_id.clone(),
                role: None,
            });
        }
    }

    pub fn role(&self, participant_id: &ParticipantId) -> Option<Role> {
        self.participants
            .read()
            .get(participant_id)
            .map(|summary| summary.role)
    }

    pub fn participants(&self) -> Vec<ParticipantSummary> {
        let mut participants: Vec<_> = self.participants.read().values().cloned().collect();
        participants.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        participants
    }

    pub fn view_for(self: &Arc<Self>, local_id: ParticipantId) -> RosterView {
        RosterView {
            roster: Arc::clone(self),
            local_id,
        }
    }
}

/// The roster from one participant's point of view.
#[derive(Debug, Clone)]
pub struct RosterView {
    roster: Arc<Roster>,
    local_id: ParticipantId,
}

impl RosterView {
    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }
}

impl ModeratorDirectory for RosterView {
    fn is_local_moderator(&self) -> bool {
        self.is_participant_moderator(&self.local_id)
    }

    fn is_local_id(&self, participant_id: &ParticipantId) -> bool {
        *participant_id == self.local_id
    }

    fn is_participant_moderator(&self, participant_id: &ParticipantId) -> bool {
        self.roster
            .role(participant_id)
            .is_some_and(Role::is_moderator)
    }

    fn subscribe_role_changes(&self) -> broadcast::Receiver<RoleChange> {
        self.roster.changes.subscribe()
    }
}
