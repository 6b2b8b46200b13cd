//! A UI-less interface: keeps panel, pin and shared-artifact state in
//! memory and publishes user actions as [`UiIntent`]s.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use shared::domain::EntityId;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{InterfaceSurface, UiIntent, UiIntentSource};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceView {
    pub panel_visible: bool,
    pub shared_artifact_visible: bool,
    pub pinned: Option<EntityId>,
    pub tiles: BTreeSet<EntityId>,
}

#[derive(Debug)]
pub struct HeadlessInterface {
    label: String,
    view: Mutex<InterfaceView>,
    intents: broadcast::Sender<UiIntent>,
}

impl HeadlessInterface {
    pub fn new(label: impl Into<String>) -> Self {
        let (intents, _) = broadcast::channel(256);
        Self {
            label: label.into(),
            view: Mutex::new(InterfaceView::default()),
            intents,
        }
    }

    pub fn view(&self) -> InterfaceView {
        self.view.lock().clone()
    }

    /// Creates the UI element for `entity`, making it resolvable.
    pub fn add_tile(&self, entity: EntityId) {
        self.view.lock().tiles.insert(entity);
    }

    pub fn remove_tile(&self, entity: &EntityId) {
        let mut view = self.view.lock();
        view.tiles.remove(entity);
        if view.pinned.as_ref() == Some(entity) {
            view.pinned = None;
        }
    }

    pub fn user_set_panel_visible(&self, visible: bool) {
        self.view.lock().panel_visible = visible;
        self.publish(UiIntent::PanelToggled { visible });
    }

    pub fn user_set_shared_artifact_visible(&self, visible: bool) {
        self.view.lock().shared_artifact_visible = visible;
        self.publish(UiIntent::SharedArtifactToggled { visible });
    }

    /// Pins or unpins a tile locally. Pinning an unknown entity is ignored,
    /// as there is nothing on screen to click.
    pub fn user_set_pinned(&self, entity: EntityId, pinned: bool) {
        {
            let mut view = self.view.lock();
            if !view.tiles.contains(&entity) {
                return;
            }
            if pinned {
                view.pinned = Some(entity.clone());
            } else if view.pinned.as_ref() == Some(&entity) {
                view.pinned = None;
            } else {
                return;
            }
        }
        self.publish(UiIntent::PinToggled { entity, pinned });
    }

    fn publish(&self, intent: UiIntent) {
        debug!(interface = %self.label, ?intent, "headless: user action");
        let _ = self.intents.send(intent);
    }
}

impl UiIntentSource for HeadlessInterface {
    fn subscribe_intents(&self) -> broadcast::Receiver<UiIntent> {
        self.intents.subscribe()
    }
}

impl InterfaceSurface for HeadlessInterface {
    fn is_panel_visible(&self) -> bool {
        self.view.lock().panel_visible
    }

    fn toggle_panel(&self) {
        let mut view = self.view.lock();
        view.panel_visible = !view.panel_visible;
    }

    fn is_shared_artifact_visible(&self) -> bool {
        self.view.lock().shared_artifact_visible
    }

    fn toggle_shared_artifact(&self) {
        let mut view = self.view.lock();
        view.shared_artifact_visible = !view.shared_artifact_visible;
    }

    fn pinned_entity(&self) -> Option<EntityId> {
        self.view.lock().pinned.clone()
    }

    fn is_resolvable(&self, entity: &EntityId) -> bool {
        self.view.lock().tiles.contains(entity)
    }

    fn set_pinned(&self, entity: &EntityId, pinned: bool) {
        let mut view = self.view.lock();
        if pinned {
            view.pinned = Some(entity.clone());
        } else if view.pinned.as_ref() == Some(entity) {
            view.pinned = None;
        }
    }
}
