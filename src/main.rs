use charla::clock::{Clock, SystemClock};
use charla::commands::{start, timezone, vocab};
use charla::handler::{self, IncomingMessage};
use charla::maintenance::{RetentionPruner, SessionReaper};
use charla::scheduler::EngagementScheduler;
use charla::store::Store;
use charla::transport::{DiscordSender, MessageSender};
use charla::weather::{NoWeather, OpenMeteo, WeatherLookup};
use charla::{config::Config, Data};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const REAPER_PERIOD: Duration = Duration::from_secs(60);
const PRUNE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);
    let discord_token = config.discord_token.clone();

    let db = charla::db::Database::new(&config)?;
    db.execute_init()?;
    let store: Arc<dyn Store> = Arc::new(db);
    let cancel = CancellationToken::new();
    let setup_cancel = cancel.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                start::start(),
                start::help(),
                vocab::vocab(),
                vocab::progress(),
                vocab::learn(),
                timezone::timezone(),
            ],
            event_handler: |_ctx, event, _framework, data| {
                Box::pin(async move {
                    if let serenity::FullEvent::Message { new_message } = event {
                        if new_message.author.bot || new_message.guild_id.is_some() {
                            return Ok(());
                        }
                        let incoming = IncomingMessage {
                            user_id: new_message.author.id.to_string(),
                            channel_id: new_message.channel_id.get(),
                            message_id: new_message.id.get(),
                            text: new_message.content.clone(),
                        };
                        if let Err(e) = handler::handle_message(data, incoming).await {
                            error!("Failed to handle message from {}: {}", new_message.author.id, e);
                        }
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let sender: Arc<dyn MessageSender> = Arc::new(DiscordSender::new(ctx.http.clone()));
                let llm = Arc::new(charla::llm::LlmClient::new(&config));
                let clock: Arc<dyn Clock> = Arc::new(SystemClock);
                let weather: Arc<dyn WeatherLookup> = if config.weather_enabled {
                    Arc::new(OpenMeteo::new(
                        reqwest::Client::new(),
                        config.weather_latitude,
                        config.weather_longitude,
                    ))
                } else {
                    Arc::new(NoWeather)
                };

                let data = Data::new(config, store.clone(), sender.clone(), llm, clock.clone())?;

                let scheduler = Arc::new(EngagementScheduler::new(
                    store.clone(),
                    sender.clone(),
                    weather,
                    data.locks.clone(),
                    clock.clone(),
                    data.config.engagement.clone(),
                    data.default_tz,
                    data.config.scheduler_tick_interval,
                    data.store_timeout(),
                ));
                tokio::spawn(scheduler.run(setup_cancel.clone()));

                let reaper = SessionReaper::new(
                    data.reviews.clone(),
                    data.locks.clone(),
                    sender,
                    clock.clone(),
                    REAPER_PERIOD,
                );
                tokio::spawn(reaper.run(setup_cancel.clone()));

                let pruner = RetentionPruner::new(
                    store,
                    clock,
                    data.config.conversation_retention_days,
                    data.config.engagement_retention_days,
                    PRUNE_PERIOD,
                );
                tokio::spawn(pruner.run(setup_cancel));

                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::DIRECT_MESSAGES | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            cancel.cancel();
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
