use shared::{domain::EntityId, protocol::FollowMeCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FollowField {
    PanelVisible,
    FocusedEntity,
    SharedArtifactVisible,
}

/// A value for one followable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUpdate {
    PanelVisible(Option<bool>),
    FocusedEntity(Option<EntityId>),
    SharedArtifactVisible(Option<bool>),
}

impl FollowUpdate {
    pub fn field(&self) -> FollowField {
        match self {
            FollowUpdate::PanelVisible(_) => FollowField::PanelVisible,
            FollowUpdate::FocusedEntity(_) => FollowField::FocusedEntity,
            FollowUpdate::SharedArtifactVisible(_) => FollowField::SharedArtifactVisible,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub old: FollowUpdate,
    pub new: FollowUpdate,
}

impl StateChange {
    pub fn field(&self) -> FollowField {
        self.new.field()
    }
}

/// The local participant's followable state. Writes that do not change a
/// value are no-ops and produce no [`StateChange`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowState {
    panel_visible: Option<bool>,
    focused_entity_id: Option<EntityId>,
    shared_artifact_visible: Option<bool>,
}

impl FollowState {
    pub fn set(&mut self, update: FollowUpdate) -> Option<StateChange> {
        match update {
            FollowUpdate::PanelVisible(value) => {
                let old = replace_if_changed(&mut self.panel_visible, value)?;
                Some(StateChange {
                    old: FollowUpdate::PanelVisible(old),
                    new: FollowUpdate::PanelVisible(self.panel_visible),
                })
            }
            FollowUpdate::FocusedEntity(value) => {
                let old = replace_if_changed(&mut self.focused_entity_id, value)?;
                Some(StateChange {
                    old: FollowUpdate::FocusedEntity(old),
                    new: FollowUpdate::FocusedEntity(self.focused_entity_id.clone()),
                })
            }
            FollowUpdate::SharedArtifactVisible(value) => {
                let old = replace_if_changed(&mut self.shared_artifact_visible, value)?;
                Some(StateChange {
                    old: FollowUpdate::SharedArtifactVisible(old),
                    new: FollowUpdate::SharedArtifactVisible(self.shared_artifact_visible),
                })
            }
        }
    }

    pub fn get(&self, field: FollowField) -> FollowUpdate {
        match field {
            FollowField::PanelVisible => FollowUpdate::PanelVisible(self.panel_visible),
            FollowField::FocusedEntity => {
                FollowUpdate::FocusedEntity(self.focused_entity_id.clone())
            }
            FollowField::SharedArtifactVisible => {
                FollowUpdate::SharedArtifactVisible(self.shared_artifact_visible)
            }
        }
    }

    pub fn panel_visible(&self) -> Option<bool> {
        self.panel_visible
    }

    pub fn focused_entity_id(&self) -> Option<&EntityId> {
        self.focused_entity_id.as_ref()
    }

    pub fn shared_artifact_visible(&self) -> Option<bool> {
        self.shared_artifact_visible
    }

    pub fn snapshot(&self) -> FollowMeCommand {
        FollowMeCommand {
            panel_visible: self.panel_visible,
            focused_entity_id: self.focused_entity_id.clone(),
            shared_artifact_visible: self.shared_artifact_visible,
        }
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut Option<T>, value: Option<T>) -> Option<Option<T>> {
    if *slot == value {
        None
    } else {
        Some(std::mem::replace(slot, value))
    }
}
