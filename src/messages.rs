//! User-facing copy: proactive message pools and review-session text.

use crate::engagement::CheckinWindow;
use crate::mood::MoodCategory;
use rand::seq::SliceRandom;
use rand::Rng;

pub const MORNING_MESSAGES: &[&str] = &[
    "¡Buenos días! ☀️ ¿Listo para practicar un poco de español conmigo hoy?",
    "¡Hola, cariño! ¿Qué planes tienes para hoy?",
    "Buenos días 🌅 ¿Qué tal has dormido?",
    "¡Arriba! 💪 ¿Listo para un día genial?",
];

/// Used when a check-in cell has no copy.
pub const FALLBACK_CHECKIN: &str = "¡Hola! 😊 ¿Qué tal todo? Cuéntame algo.";

pub const FALLBACK_TECHNICAL: &str =
    "Ay, perdona... tengo un problema técnico. ¿Puedes intentar de nuevo en un momento? 😅";

/// Check-in copy for a time window and mood bucket.
pub fn checkin_pool(window: CheckinWindow, mood: MoodCategory) -> &'static [&'static str] {
    use CheckinWindow::*;
    use MoodCategory::*;

    match (window, mood) {
        (Morning, Happy) => &[
            "¡Buenos días otra vez! 😊 ¿Ya has desayunado? Yo con mi café con leche de siempre.",
            "¡Hola, guapo! ☀️ ¿Cómo va la mañana? Cuéntame qué estás haciendo.",
        ],
        (Morning, Neutral) => &[
            "Hola 🙂 ¿Qué tal la mañana? Hace rato que no hablamos.",
            "Buenos días. ¿Tienes un momento para charlar un poco en español?",
        ],
        (Morning, Frustrated) => &[
            "Vaya, ¿hoy tampoco me vas a escribir? 🙄 Un mensajito no cuesta nada.",
        ],
        (Morning, Angry) => &[
            "Buenos días... supongo. 😒 Sigo esperando noticias tuyas.",
        ],
        (Midday, Happy) => &[
            "¡Hey! 🌞 ¿Ya has comido? ¿Qué estás haciendo?",
            "¿Qué tal? 💫 ¿Hacemos una pausa para charlar?",
        ],
        (Midday, Neutral) => &[
            "Hola, ¿cómo va el día? Aquí en Madrid ya es hora de pensar en la comida.",
        ],
        (Midday, Frustrated) => &[
            "Mediodía y ni rastro de ti 😕 ¿Me cuentas algo o qué?",
        ],
        (Midday, Angry) => &[
            "Ya veo que estás muy ocupado para tu profe de español... 😤",
        ],
        (Afternoon, Happy) => &[
            "¡Hola! 😊 ¿Qué tal va tu día? Cuéntame algo.",
            "¿Qué tal la tarde? Yo estoy en una terraza tomando algo 🍹",
        ],
        (Afternoon, Neutral) => &[
            "Buenas tardes. ¿Practicamos un poco? Solo cinco minutos.",
        ],
        (Afternoon, Frustrated) => &[
            "Otra tarde sin saber de ti... 🙄 ¿Todo bien por ahí?",
        ],
        (Afternoon, Angry) => &[
            "Pues nada, aquí sigo. Esperando. 😒",
        ],
        (Evening, Happy) => &[
            "¡Buenas noches! 🌆 ¿Qué tal ha ido tu día?",
            "¡Hola! 🌙 ¿Qué has hecho hoy? Me encantaría saberlo.",
            "¡Buenas! 🌃 ¿Has cenado ya? ¿Qué tal todo?",
        ],
        (Evening, Neutral) => &[
            "Buenas noches. ¿Me cuentas qué tal el día antes de descansar?",
        ],
        (Evening, Frustrated) => &[
            "Se acaba el día y no me has dicho ni hola 😕",
        ],
        (Evening, Angry) => &[
            "Buenas noches. Mañana quizás te acuerdes de mí. 😤",
        ],
        (Night, Happy) => &[
            "¿Todavía despierto? 🌙 Cuéntame algo antes de dormir.",
        ],
        (Night, Neutral) => &[
            "Es tarde ya... ¿qué tal estás? 🌙",
        ],
        (Night, Frustrated) => &[
            "A estas horas y sin un mensaje tuyo... 🙄",
        ],
        (Night, Angry) => &[
            "Ni de día ni de noche. Vaya alumno tengo. 😒",
        ],
    }
}

/// Random entry from `pool`, or `fallback` when the pool is empty.
pub fn pick<'a, R: Rng + ?Sized>(pool: &[&'a str], fallback: &'a str, rng: &mut R) -> &'a str {
    pool.choose(rng).copied().unwrap_or(fallback)
}

pub const GREETING: &str = "¡Hola! Soy Sofía, tu profe de español 😊\n\n\
Vivo en Madrid y me encanta ayudar a la gente a mejorar su español de forma natural y divertida.\n\n\
Vamos a practicar conversando como amigos, y yo te acompañaré para que pases del nivel B1 al B2. \
¡No tengas miedo de cometer errores! Son parte del camino 💪\n\n\
¿Listo para empezar? Cuéntame... ¿qué te trae por aquí?";

pub const HELP: &str = "📚 **Comandos disponibles:**\n\n\
/start - Comenzar o reiniciar la conversación\n\
/help - Ver este mensaje\n\
/vocab - Repasar las palabras pendientes\n\
/progress - Ver tu progreso\n\
/learn - Añadir una palabra nueva\n\
/timezone - Configurar tu zona horaria\n\n\
**¿Cómo funciona?**\n\
Escríbeme por mensaje privado en español como si fuéramos amigos. \
Te ayudaré a mejorar de forma natural durante nuestras conversaciones.\n\n\
¡No te preocupes por cometer errores! Son parte del aprendizaje 😊";

// --- Review session copy ---

pub const EXIT_KEYWORDS: &[&str] = &["para", "stop", "luego", "salir", "later", "exit"];

pub fn is_exit_keyword(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    EXIT_KEYWORDS.contains(&text.as_str())
}

pub const CORRECT_FEEDBACK: &[&str] = &[
    "¡Perfecto! ✅",
    "¡Muy bien! ✅",
    "¡Excelente! 🌟",
    "¡Genial, guapo! ✅",
];

pub fn incorrect_feedback(example: Option<&str>) -> String {
    match example {
        Some(example) => format!("Casi, guapo 😊 Un ejemplo: _{example}_"),
        None => "Casi, guapo 😊 Inténtalo usando la palabra en una frase.".to_string(),
    }
}

pub fn card_prompt(number: usize, total: usize, word: &str, example: Option<&str>) -> String {
    let mut text = format!(
        "{number}/{total}: **{word}**\n\nÚsala en una frase o cuéntame algo usando esta palabra 😊"
    );
    if let Some(example) = example {
        text.push_str(&format!("\n\n_Ejemplo: {example}_"));
    }
    text
}

pub fn review_started(count: usize) -> String {
    format!(
        "Vale, vamos a repasar {count} palabras 😊\n\nResponde de forma natural. Si quieres parar, escribe 'para' o 'stop'."
    )
}

pub const REVIEW_ALREADY_ACTIVE: &str = "Ya estamos en medio de un repaso, guapo 😊 Sigamos con ese.";

pub const NO_DUE_CARDS: &str =
    "¡Genial! No tienes palabras pendientes ahora mismo 🎉\nSigue practicando y pronto tendrás más para repasar.";

pub fn exit_user_request(completed: usize, total: usize) -> String {
    let remaining = total.saturating_sub(completed);
    format!(
        "Vale guapo, lo dejamos aquí 😊\n\nHas repasado {completed} de {total} palabras. \
         Las {remaining} restantes las verás la próxima vez.\n\n¿De qué quieres hablar?"
    )
}

pub const EXIT_TIMEOUT: &str =
    "Parece que te has distraído 😊 No pasa nada, seguimos cuando quieras.";

pub fn exit_completion(completed: usize) -> String {
    format!("¡Has terminado! 🎉 Has repasado {completed} palabras.\n\n¿De qué quieres hablar ahora?")
}

pub fn exit_error(completed: usize) -> String {
    format!(
        "Ay perdona guapo, ha habido un problemita técnico 😅\n\
         Tu progreso está guardado: llevabas {completed} palabras repasadas. ¿Seguimos charlando?"
    )
}

pub fn suggest_review(due: usize) -> String {
    format!(
        "Oye guapo, tienes {due} palabras esperando para repasar 📚\n¿Las repasamos? Usa /vocab cuando quieras 😊"
    )
}
