use crate::bot::admin::{admin_command_specs, admin_handler, AdminBot};
use crate::bot::attach::{attach_command_specs, attach_handler, AttachBot};
use crate::config::BotSettings;
use crate::gateway::TelegramGateway;
use crate::liveness::serve_liveness;
use anyhow::{bail, Context, Result};
use chanmirror_core::admin::AdminService;
use chanmirror_core::attach::AttachService;
use chanmirror_core::gateway::{CommandSpec, MessagingGateway};
use chanmirror_core::mirror::MirrorJob;
use chanmirror_core::schedule::{run_daily, MirrorSchedule};
use chanmirror_core::session::InMemorySessionStore;
use chanmirror_core::store::{open_store, DocumentStore};
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Run both bots, the mirror schedule and the liveness endpoint.
///
/// A bot without a token is skipped. Once a dispatcher stops (Ctrl-C or a
/// fatal error) the schedule loops and the liveness server are aborted.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the schedule is invalid,
/// or no bot token is configured.
pub async fn run_bots(settings: Arc<BotSettings>) -> Result<()> {
    let store = open_store(settings.app.as_ref())
        .await
        .context("failed to open document store")?;
    info!(backend = ?settings.app.storage_backend, "Document store initialized.");

    let mut bots = JoinSet::new();
    let mut background = JoinSet::new();

    if let Some(token) = settings.telegram.admin_bot_token.clone() {
        start_admin_bot(&mut bots, &mut background, &settings, Arc::clone(&store), token).await?;
    } else {
        warn!("ADMIN_BOT_TOKEN not set, admin bot and mirror schedule disabled");
    }

    if let Some(token) = settings.telegram.attach_bot_token.clone() {
        start_attach_bot(&mut bots, &settings, Arc::clone(&store), token).await?;
    } else {
        warn!("BOT_TOKEN_ATTACH not set, attach bot disabled");
    }

    if bots.is_empty() {
        bail!("no bot token configured");
    }

    let port = settings.telegram.liveness_port;
    background.spawn(async move {
        if let Err(e) = serve_liveness(port).await {
            error!("Liveness server failed: {e:#}");
        }
    });

    supervise(bots, background).await;
    Ok(())
}

/// Wait for the first dispatcher to stop, then shut every other task down.
async fn supervise(mut bots: JoinSet<()>, mut background: JoinSet<()>) {
    if let Some(Err(e)) = bots.join_next().await {
        error!("Bot task panicked: {e}");
    }
    info!("Dispatcher stopped, shutting down");
    bots.shutdown().await;
    background.shutdown().await;
}

async fn register_commands(gateway: &dyn MessagingGateway, commands: &[CommandSpec], bot: &str) {
    match gateway.set_commands(commands).await {
        Ok(()) => info!("{bot} commands registered"),
        Err(e) => warn!("Failed to register {bot} commands: {}", e.description()),
    }
}

async fn start_admin_bot(
    bots: &mut JoinSet<()>,
    background: &mut JoinSet<()>,
    settings: &BotSettings,
    store: Arc<dyn DocumentStore>,
    token: String,
) -> Result<()> {
    let schedule =
        MirrorSchedule::from_settings(settings.app.as_ref()).context("invalid mirror schedule")?;

    let bot = Bot::new(token);
    let gateway: Arc<dyn MessagingGateway> = Arc::new(TelegramGateway::new(bot.clone()));
    register_commands(gateway.as_ref(), &admin_command_specs(), "Admin bot").await;

    let job = Arc::new(MirrorJob::new(Arc::clone(&store), Arc::clone(&gateway)));
    spawn_mirror_schedule(background, &job, schedule);

    let ctx = Arc::new(AdminBot::new(
        AdminService::new(store, gateway),
        Arc::new(InMemorySessionStore::new()),
        settings.telegram.admin_users(),
    ));
    info!("Admin bot is running...");
    bots.spawn(async move {
        Dispatcher::builder(bot, admin_handler())
            .dependencies(dptree::deps![ctx])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    });
    Ok(())
}

fn spawn_mirror_schedule(tasks: &mut JoinSet<()>, job: &Arc<MirrorJob>, schedule: MirrorSchedule) {
    let precheck = Arc::clone(job);
    tasks.spawn(run_daily("precheck", schedule.precheck, move || {
        let job = Arc::clone(&precheck);
        async move {
            let outcome = job.pre_check().await?;
            info!(?outcome, "Pre-check done");
            Ok(())
        }
    }));

    let backup = Arc::clone(job);
    tasks.spawn(run_daily("backup", schedule.backup, move || {
        let job = Arc::clone(&backup);
        async move {
            let report = job.backup().await?;
            info!(copied = report.main_ids.len(), "Backup done");
            Ok(())
        }
    }));

    let repost = Arc::clone(job);
    tasks.spawn(run_daily("repost", schedule.repost, move || {
        let job = Arc::clone(&repost);
        async move {
            let report = job.repost().await?;
            info!(
                deleted = report.deleted_main.len(),
                reposted = report.reposted.len(),
                failed = report.failed.len(),
                wiped = report.wiped.len(),
                "Repost done"
            );
            Ok(())
        }
    }));

    info!(
        precheck = %schedule.precheck.time(),
        backup = %schedule.backup.time(),
        repost = %schedule.repost.time(),
        "Mirror schedule started"
    );
}

async fn start_attach_bot(
    bots: &mut JoinSet<()>,
    settings: &BotSettings,
    store: Arc<dyn DocumentStore>,
    token: String,
) -> Result<()> {
    let Some(username) = settings.telegram.attach_bot_username.clone() else {
        bail!("BOT_USERNAME_ATTACH is required when the attach bot is enabled");
    };

    let bot = Bot::new(token);
    let gateway: Arc<dyn MessagingGateway> = Arc::new(TelegramGateway::new(bot.clone()));
    register_commands(gateway.as_ref(), &attach_command_specs(), "Attach bot").await;

    let ctx = Arc::new(AttachBot::new(
        AttachService::new(store, Arc::clone(&gateway)),
        gateway,
        Arc::new(InMemorySessionStore::new()),
        settings.telegram.attach_admin_users(),
        username,
        Duration::from_secs(settings.app.attach_session_ttl_secs),
    ));
    info!("Attach bot is running...");
    bots.spawn(async move {
        Dispatcher::builder(bot, attach_handler())
            .dependencies(dptree::deps![ctx])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    });
    Ok(())
}
