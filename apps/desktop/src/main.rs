use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use clap::Parser;
use conference_bus::{CommandChannel, LocalCommandBus, Roster};
use follow_core::{load_settings, FollowSession, FollowSettings, HeadlessInterface, InterfaceView};
use shared::domain::{EntityId, ParticipantId, Role};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs a scripted follow-me session with one moderator and several
/// followers over an in-memory command bus.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value_t = 2)]
    followers: usize,
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Seconds before the presenter's tile appears on followers.
    #[arg(long, default_value_t = 3)]
    tile_delay_secs: u64,
    #[arg(long, default_value = "info")]
    log_filter: String,
}

struct Participant {
    id: ParticipantId,
    ui: Arc<HeadlessInterface>,
    session: FollowSession,
}

fn join(
    bus: &Arc<LocalCommandBus>,
    roster: &Arc<Roster>,
    settings: &FollowSettings,
    id: &str,
    role: Role,
) -> Participant {
    let id = ParticipantId::from(id);
    roster.join(id.clone(), id.as_str(), role);
    let ui = Arc::new(HeadlessInterface::new(id.as_str()));
    let session = FollowSession::start(
        settings.clone(),
        Arc::new(bus.endpoint(id.clone())),
        Arc::new(roster.view_for(id.clone())),
        ui.clone(),
        ui.clone(),
    );
    Participant { id, ui, session }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings(args.settings.as_deref())?;
    info!(?settings, followers = args.followers, "demo: starting follow-me session");

    let bus = LocalCommandBus::new();
    let roster = Roster::new();
    let presenter = EntityId::from("presenter");

    let moderator = join(&bus, &roster, &settings, "moderator", Role::Owner);
    moderator.ui.add_tile(presenter.clone());
    let followers: Vec<Participant> = (1..=args.followers)
        .map(|n| join(&bus, &roster, &settings, &format!("follower-{n}"), Role::Member))
        .collect();

    moderator.session.set_enabled(true)?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    moderator.ui.user_set_panel_visible(true);
    moderator.ui.user_set_shared_artifact_visible(true);
    moderator.ui.user_set_pinned(presenter.clone(), true);

    // Members may not steer the session; followers log and drop this.
    if let Some(rogue) = followers.first() {
        bus.endpoint(rogue.id.clone()).send_command_once(
            &settings.channel_name,
            serde_json::json!({ "panelVisible": "false" }),
        )?;
    }

    tokio::time::sleep(Duration::from_secs(args.tile_delay_secs)).await;
    for follower in &followers {
        follower.ui.add_tile(presenter.clone());
    }
    tokio::time::sleep(settings.retry_interval() * 2).await;

    let expected = moderator.ui.view();
    println!("moderator {}: {}", moderator.id, describe(&expected));
    let mut diverged = Vec::new();
    for follower in followers {
        let view = follower.ui.view();
        println!("follower {}: {}", follower.id, describe(&view));
        if !converged(&expected, &view) {
            diverged.push(follower.id.clone());
        }
        follower.session.shutdown().await?;
    }
    moderator.session.shutdown().await?;

    if !diverged.is_empty() {
        bail!("followers did not converge: {diverged:?}");
    }
    println!("all followers converged");
    Ok(())
}

fn converged(expected: &InterfaceView, actual: &InterfaceView) -> bool {
    expected.panel_visible == actual.panel_visible
        && expected.shared_artifact_visible == actual.shared_artifact_visible
        && expected.pinned == actual.pinned
}

fn describe(view: &InterfaceView) -> String {
    format!(
        "panel={} shared_artifact={} pinned={}",
        view.panel_visible,
        view.shared_artifact_visible,
        view.pinned
            .as_ref()
            .map(EntityId::as_str)
            .unwrap_or("-")
    )
}
