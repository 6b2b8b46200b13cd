use std::{sync::Arc, time::Duration};

use conference_bus::{CommandChannel, LocalCommandBus, Roster};
use follow_core::{
    DeliveryOutcome, FollowEvent, FollowSession, FollowSettings, HeadlessInterface, PinOutcome,
    ResolverState,
};
use shared::domain::{EntityId, ParticipantId, Role};
use tokio::sync::broadcast;

struct Participant {
    ui: Arc<HeadlessInterface>,
    session: FollowSession,
    events: broadcast::Receiver<FollowEvent>,
}

fn join(bus: &Arc<LocalCommandBus>, roster: &Arc<Roster>, id: &str, role: Role) -> Participant {
    let participant_id = ParticipantId::from(id);
    roster.join(participant_id.clone(), id, role);
    let ui = Arc::new(HeadlessInterface::new(id));
    let session = FollowSession::start(
        FollowSettings::default(),
        Arc::new(bus.endpoint(participant_id.clone())),
        Arc::new(roster.view_for(participant_id)),
        ui.clone(),
        ui.clone(),
    );
    let events = session.subscribe_events();
    Participant {
        ui,
        session,
        events,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn wait_for<F>(events: &mut broadcast::Receiver<FollowEvent>, mut predicate: F) -> FollowEvent
where
    F: FnMut(&FollowEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = events.recv().await.expect("follow event");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for follow event")
}

fn applied(event: &FollowEvent) -> bool {
    matches!(event, FollowEvent::Delivery(DeliveryOutcome::Applied { .. }))
}

#[tokio::test(start_paused = true)]
async fn follower_mirrors_moderator_panel_and_artifact() {
    let bus = LocalCommandBus::new();
    let roster = Roster::new();
    let moderator = join(&bus, &roster, "mod", Role::Owner);
    let mut follower = join(&bus, &roster, "follower", Role::Member);

    moderator.session.set_enabled(true).expect("enable");
    settle().await;

    moderator.ui.user_set_panel_visible(true);
    wait_for(&mut follower.events, applied).await;
    settle().await;
    moderator.ui.user_set_shared_artifact_visible(true);
    wait_for(&mut follower.events, applied).await;

    let view = follower.ui.view();
    assert!(view.panel_visible);
    assert!(view.shared_artifact_visible);
    assert_eq!(bus.pending_count("follow-me"), 1);

    let controller = moderator.session.shutdown().await.expect("shutdown");
    assert_eq!(controller.state().panel_visible(), Some(true));
    assert_eq!(controller.state().shared_artifact_visible(), Some(true));
    follower.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn focus_waits_for_late_tile_then_pins_once() {
    let bus = LocalCommandBus::new();
    let roster = Roster::new();
    let moderator = join(&bus, &roster, "mod", Role::Mod);
    let mut follower = join(&bus, &roster, "follower", Role::Member);
    let newcomer = EntityId::from("newcomer");

    moderator.session.set_enabled(true).expect("enable");
    settle().await;

    moderator.ui.add_tile(newcomer.clone());
    moderator.ui.user_set_pinned(newcomer.clone(), true);

    let event = wait_for(&mut follower.events, applied).await;
    assert!(matches!(
        event,
        FollowEvent::Delivery(DeliveryOutcome::Applied {
            focus: PinOutcome::Scheduled { .. },
            ..
        })
    ));

    tokio::time::sleep(Duration::from_millis(4_500)).await;
    assert_eq!(follower.ui.view().pinned, None);
    follower.ui.add_tile(newcomer.clone());

    let event = wait_for(&mut follower.events, |event| {
        matches!(event, FollowEvent::Retry(PinOutcome::Applied { .. }))
    })
    .await;
    assert_eq!(
        event,
        FollowEvent::Retry(PinOutcome::Applied {
            entity: newcomer.clone(),
            pinned: true,
        })
    );
    assert_eq!(follower.ui.view().pinned, Some(newcomer));

    let controller = follower.session.shutdown().await.expect("shutdown");
    assert_eq!(controller.resolver_state(), ResolverState::Idle);
    moderator.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn unresolvable_focus_is_dropped_after_the_deadline() {
    let bus = LocalCommandBus::new();
    let roster = Roster::new();
    let moderator = join(&bus, &roster, "mod", Role::Owner);
    let mut follower = join(&bus, &roster, "follower", Role::Member);

    moderator.session.set_enabled(true).expect("enable");
    settle().await;
    moderator.ui.add_tile(EntityId::from("ghost"));
    moderator.ui.user_set_pinned(EntityId::from("ghost"), true);

    let event = wait_for(&mut follower.events, |event| {
        matches!(event, FollowEvent::Retry(PinOutcome::Abandoned { .. }))
    })
    .await;
    assert_eq!(
        event,
        FollowEvent::Retry(PinOutcome::Abandoned {
            entity: EntityId::from("ghost"),
            elapsed_ticks: 31,
        })
    );

    follower.ui.add_tile(EntityId::from("ghost"));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(follower.ui.view().pinned, None);

    follower.session.shutdown().await.expect("shutdown");
    moderator.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn late_joiner_receives_the_live_snapshot() {
    let bus = LocalCommandBus::new();
    let roster = Roster::new();
    let moderator = join(&bus, &roster, "mod", Role::Owner);

    moderator.session.set_enabled(true).expect("enable");
    settle().await;
    moderator.ui.user_set_shared_artifact_visible(true);
    settle().await;

    let mut late = join(&bus, &roster, "late", Role::Member);
    wait_for(&mut late.events, applied).await;
    assert!(late.ui.view().shared_artifact_visible);

    moderator.session.set_enabled(false).expect("disable");
    settle().await;
    assert_eq!(bus.pending_count("follow-me"), 0);

    late.session.shutdown().await.expect("shutdown");
    moderator.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn granting_moderator_rebroadcasts_tracked_state() {
    let bus = LocalCommandBus::new();
    let roster = Roster::new();
    let mut alice = join(&bus, &roster, "alice", Role::Member);
    let mut bob = join(&bus, &roster, "bob", Role::Member);

    alice.session.set_enabled(true).expect("enable");
    settle().await;
    alice.ui.user_set_panel_visible(true);
    settle().await;
    assert_eq!(bus.pending_count("follow-me"), 0);
    assert!(!bob.ui.view().panel_visible);

    roster.set_role(&ParticipantId::from("alice"), Role::Mod);
    wait_for(&mut alice.events, |event| {
        matches!(event, FollowEvent::SnapshotRebroadcast(_))
    })
    .await;
    wait_for(&mut bob.events, applied).await;
    assert!(bob.ui.view().panel_visible);

    alice.session.shutdown().await.expect("shutdown");
    bob.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn commands_from_members_and_unknown_senders_are_ignored() {
    let bus = LocalCommandBus::new();
    let roster = Roster::new();
    let mut follower = join(&bus, &roster, "follower", Role::Member);
    roster.join(ParticipantId::from("mallory"), "Mallory", Role::Member);

    bus.endpoint(ParticipantId::from("mallory"))
        .send_command_once("follow-me", serde_json::json!({ "panelVisible": "true" }))
        .expect("send");
    let event = wait_for(&mut follower.events, |event| {
        matches!(event, FollowEvent::Delivery(_))
    })
    .await;
    assert_eq!(event, FollowEvent::Delivery(DeliveryOutcome::Unauthorized));

    bus.inject("follow-me", None, serde_json::json!({ "panelVisible": true }));
    let event = wait_for(&mut follower.events, |event| {
        matches!(event, FollowEvent::Delivery(_))
    })
    .await;
    assert_eq!(event, FollowEvent::Delivery(DeliveryOutcome::MissingSender));
    assert!(!follower.ui.view().panel_visible);

    follower.session.shutdown().await.expect("shutdown");
}
