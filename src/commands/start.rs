use crate::messages;
use crate::{Context, Error};
use tracing::info;

/// Start (or restart) the conversation
#[poise::command(slash_command)]
pub async fn start(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.to_string();
    let _guard = data.locks.lock(&user_id).await;

    data.engagement.ensure_record(&user_id).await?;
    info!("User {} ({}) started the bot", user_id, ctx.author().name);

    ctx.say(messages::GREETING).await?;
    data.engagement
        .record_bot_activity(&user_id, data.clock.now())
        .await?;
    Ok(())
}

/// Show the available commands
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(messages::HELP).await?;
    Ok(())
}
