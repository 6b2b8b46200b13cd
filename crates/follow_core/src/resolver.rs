use std::{fmt, time::Duration};

use shared::domain::EntityId;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::InterfaceSurface;

/// Schedules a single retry tick for the resolver.
pub trait RetryScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, generation: u64) -> RetryHandle;
}

/// Owned cancellation for one scheduled retry tick. Dropping the handle
/// cancels the tick.
pub struct RetryHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl RetryHandle {
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn on_cancel(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self::on_cancel(move || task.abort())
    }

    pub fn cancel(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for RetryHandle {
    fn drop(&mut self) {
        self.fire();
    }
}

impl fmt::Debug for RetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct PendingPin {
    target_entity_id: EntityId,
    desired_pinned: bool,
    elapsed_ticks: u32,
    generation: u64,
    timer: RetryHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    Pending {
        target_entity_id: EntityId,
        desired_pinned: bool,
        elapsed_ticks: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinOutcome {
    /// The instruction already matches the local pin state.
    AlreadyConsistent,
    Applied {
        entity: EntityId,
        pinned: bool,
    },
    /// The target resolved but was already in the desired state.
    Unchanged {
        entity: EntityId,
    },
    Scheduled {
        entity: EntityId,
        elapsed_ticks: u32,
    },
    Abandoned {
        entity: EntityId,
        elapsed_ticks: u32,
    },
    StaleTick,
}

/// Applies remote focus instructions, polling for targets that have not
/// materialized locally yet. At most one retry is outstanding at a time.
#[derive(Debug)]
pub struct PinResolver {
    pending: Option<PendingPin>,
    generation: u64,
    retry_interval: Duration,
    deadline_ticks: u32,
}

impl PinResolver {
    pub fn new(retry_interval: Duration, deadline_ticks: u32) -> Self {
        Self {
            pending: None,
            generation: 0,
            retry_interval,
            deadline_ticks,
        }
    }

    pub fn state(&self) -> ResolverState {
        match &self.pending {
            Some(pending) => ResolverState::Pending {
                target_entity_id: pending.target_entity_id.clone(),
                desired_pinned: pending.desired_pinned,
                elapsed_ticks: pending.elapsed_ticks,
            },
            None => ResolverState::Idle,
        }
    }

    pub fn elapsed_ticks(&self) -> u32 {
        self.pending
            .as_ref()
            .map(|pending| pending.elapsed_ticks)
            .unwrap_or_default()
    }

    pub fn on_instruction(
        &mut self,
        requested: Option<&EntityId>,
        surface: &dyn InterfaceSurface,
        scheduler: &dyn RetryScheduler,
    ) -> PinOutcome {
        if let Some(superseded) = self.pending.take() {
            debug!(
                entity = %superseded.target_entity_id,
                elapsed_ticks = superseded.elapsed_ticks,
                "follow: focus instruction superseded pending pin"
            );
            superseded.timer.cancel();
        }

        let pinned = surface.pinned_entity();
        let (target, desired_pinned) = match (requested, pinned) {
            (Some(entity), pinned) if pinned.as_ref() != Some(entity) => (entity.clone(), true),
            (None, Some(pinned)) => (pinned, false),
            _ => return PinOutcome::AlreadyConsistent,
        };

        self.attempt(target, desired_pinned, 0, surface, scheduler)
    }

    pub fn on_tick(
        &mut self,
        generation: u64,
        surface: &dyn InterfaceSurface,
        scheduler: &dyn RetryScheduler,
    ) -> PinOutcome {
        if self.pending.as_ref().map(|pending| pending.generation) != Some(generation) {
            return PinOutcome::StaleTick;
        }
        let Some(pending) = self.pending.take() else {
            return PinOutcome::StaleTick;
        };
        pending.timer.cancel();

        let elapsed_ticks = pending.elapsed_ticks + 1;
        if elapsed_ticks > self.deadline_ticks {
            info!(
                entity = %pending.target_entity_id,
                elapsed_ticks,
                "follow: focus target never appeared, dropping instruction"
            );
            return PinOutcome::Abandoned {
                entity: pending.target_entity_id,
                elapsed_ticks,
            };
        }

        self.attempt(
            pending.target_entity_id,
            pending.desired_pinned,
            elapsed_ticks,
            surface,
            scheduler,
        )
    }

    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.cancel();
        }
    }

    fn attempt(
        &mut self,
        target: EntityId,
        desired_pinned: bool,
        elapsed_ticks: u32,
        surface: &dyn InterfaceSurface,
        scheduler: &dyn RetryScheduler,
    ) -> PinOutcome {
        if surface.is_resolvable(&target) {
            self.cancel();
            let currently_pinned = surface.pinned_entity().as_ref() == Some(&target);
            if currently_pinned == desired_pinned {
                return PinOutcome::Unchanged { entity: target };
            }
            debug!(entity = %target, pinned = desired_pinned, elapsed_ticks, "follow: applying focus");
            surface.set_pinned(&target, desired_pinned);
            return PinOutcome::Applied {
                entity: target,
                pinned: desired_pinned,
            };
        }

        self.generation += 1;
        let timer = scheduler.schedule(self.retry_interval, self.generation);
        self.pending = Some(PendingPin {
            target_entity_id: target.clone(),
            desired_pinned,
            elapsed_ticks,
            generation: self.generation,
            timer,
        });
        PinOutcome::Scheduled {
            entity: target,
            elapsed_ticks,
        }
    }
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
