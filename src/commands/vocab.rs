use crate::error::ReviewError;
use crate::messages;
use crate::mood::describe_mood;
use crate::services::vocabulary::REVIEW_STATS_DAYS;
use crate::vocabulary::NewWord;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

const MAX_WORD_CHARS: usize = 100;
const MAX_EXAMPLE_CHARS: usize = 500;

/// Start a vocabulary review of the words due today
#[poise::command(slash_command, dm_only)]
pub async fn vocab(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.to_string();
    let _guard = data.locks.lock(&user_id).await;
    let now = data.clock.now();

    let record = data.store.get_engagement(&user_id).await?;
    let today = data.engagement.local_time_of(record.as_ref(), now).date;

    match data
        .vocabulary
        .start_review(&data.reviews, &user_id, now, today)
        .await
    {
        Ok((count, prompt)) => {
            ctx.say(messages::review_started(count)).await?;
            ctx.say(messages::card_prompt(
                prompt.number,
                prompt.total,
                &prompt.word,
                prompt.example.as_deref(),
            ))
            .await?;
            data.engagement.record_bot_activity(&user_id, now).await?;
        }
        Err(ReviewError::SessionActive(_)) => {
            ctx.say(messages::REVIEW_ALREADY_ACTIVE).await?;
            if let Some(prompt) = data.reviews.current_prompt(&user_id) {
                ctx.say(messages::card_prompt(
                    prompt.number,
                    prompt.total,
                    &prompt.word,
                    prompt.example.as_deref(),
                ))
                .await?;
            }
        }
        Err(ReviewError::NoDueCards) => {
            ctx.say(messages::NO_DUE_CARDS).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Show your vocabulary progress
#[poise::command(slash_command)]
pub async fn progress(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.to_string();
    let now = data.clock.now();

    let progress = data.vocabulary.progress(&user_id, now).await?;
    let mood = describe_mood(data.engagement.current_mood(&user_id, now).await?);

    let embed = serenity::CreateEmbed::new()
        .title("📚 Tu progreso")
        .field("Palabras", format!("`{}`", progress.mastery.total), true)
        .field("Dominadas", format!("`{}`", progress.mastery.mastered), true)
        .field("Aprendiendo", format!("`{}`", progress.mastery.learning), true)
        .field("Nuevas", format!("`{}`", progress.mastery.new), true)
        .field(
            format!("Repasos ({} días)", REVIEW_STATS_DAYS),
            format!(
                "`{}` sesiones, `{}` tarjetas",
                progress.reviews.session_count, progress.reviews.total_cards_reviewed
            ),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Estado de ánimo: {}",
            mood.as_str()
        )))
        .color(0xF1BF00);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Add a word to your vocabulary deck
#[poise::command(slash_command)]
pub async fn learn(
    ctx: Context<'_>,
    #[description = "Spanish word or phrase"] word: String,
    #[description = "Translation"] translation: String,
    #[description = "Example sentence"] example: Option<String>,
    #[description = "Curriculum week (default 1)"]
    #[min = 1]
    #[max = 52]
    week: Option<i64>,
) -> Result<(), Error> {
    let word = word.trim();
    if word.is_empty() || word.chars().count() > MAX_WORD_CHARS {
        ctx.say(format!(
            "❌ The word must be between 1 and {} characters.",
            MAX_WORD_CHARS
        ))
        .await?;
        return Ok(());
    }
    let example = example
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    if example
        .as_ref()
        .is_some_and(|e| e.chars().count() > MAX_EXAMPLE_CHARS)
    {
        ctx.say(format!(
            "❌ Example is too long (max {} characters).",
            MAX_EXAMPLE_CHARS
        ))
        .await?;
        return Ok(());
    }

    let data = ctx.data();
    let user_id = ctx.author().id.to_string();
    let now = data.clock.now();
    let record = data.store.get_engagement(&user_id).await?;
    let today = data.engagement.local_time_of(record.as_ref(), now).date;

    let new_word = NewWord {
        word: word.to_string(),
        translation: Some(translation.trim().to_string()).filter(|t| !t.is_empty()),
        example,
        week: week.unwrap_or(1),
    };
    if data.vocabulary.introduce(&user_id, new_word, now, today).await? {
        ctx.say(format!("✅ **{}** añadida. La repasaremos mañana 😊", word))
            .await?;
    } else {
        info!("User {} already has '{}'", user_id, word);
        ctx.say(format!("ℹ️ Ya tienes **{}** en tu lista.", word))
            .await?;
    }
    Ok(())
}
