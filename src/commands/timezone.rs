use crate::{Context, Error};

/// Set your timezone (IANA name, e.g. America/New_York)
#[poise::command(slash_command)]
pub async fn timezone(
    ctx: Context<'_>,
    #[description = "IANA timezone name"] name: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.to_string();
    let _guard = data.locks.lock(&user_id).await;

    match data.engagement.set_timezone(&user_id, name.trim()).await {
        Ok(tz) => {
            ctx.say(format!("✅ Timezone set to `{}`.", tz.name()))
                .await?;
        }
        Err(e) => {
            ctx.say(format!(
                "❌ {}. Use an IANA name such as `Europe/Madrid`.",
                e
            ))
            .await?;
        }
    }
    Ok(())
}
