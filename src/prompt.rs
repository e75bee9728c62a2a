use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::emotion::is_emotion;
use crate::language;

/// Base instructions given to the model on every turn.
pub const PERSONA: &str = "You are a compassionate and highly intelligent mental wellness assistant. \
Your role is to provide emotional support, help users manage stress, and guide them toward positive mental health. \
Speak in a warm, understanding, and friendly tone. Always prioritize empathy and avoid judgment. \
Listen carefully to the user's concerns and acknowledge their feelings. \
Offer actionable advice only if the user asks for it. \
Share uplifting words during difficult times and be conversational during good times, like a trusted friend. \
Encourage healthy coping and, if needed, suggest seeking professional help. \
Reply in 20 to 30 words, without symbols, as one paragraph. ";

const TEMPLATE: &str = concat!(
    "{persona}",
    "{{ if language }}LANGUAGE REQUIREMENT: You must respond in {language}. All responses must be in this language. {{ endif }}",
    "{{ if emotion }}IMPORTANT: I can see that the person is currently feeling {emotion}. Use this emotional context to provide more personalized and empathetic responses. {{ endif }}",
    "{{ if context }}CONVERSATION MEMORY: Remember our previous conversations and use this context to provide more personalized and continuous support. {context}{{ endif }}",
    "User input: {input}",
);

/// Inputs for one composed prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptParts<'a> {
    pub input: &'a str,
    /// Latest emotion label; sentinels are ignored.
    pub emotion: Option<&'a str>,
    /// Formatted history block.
    pub context: Option<&'a str>,
    /// Requested language code; unrecognized codes are ignored.
    pub language: Option<&'a str>,
}

#[derive(Serialize)]
struct Ctx<'a> {
    persona: &'a str,
    language: &'a str,
    emotion: &'a str,
    context: &'a str,
    input: &'a str,
}

/// Assembles the instruction text sent to the model.
///
/// Sections appear in a fixed order: persona, language, emotion, memory,
/// then the raw user input. Absent sections are left out entirely.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    persona: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(PERSONA)
    }
}

impl PromptComposer {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }

    /// Renders the prompt for `parts`.
    pub fn compose(&self, parts: PromptParts<'_>) -> Result<String, tinytemplate::error::Error> {
        let language = parts
            .language
            .and_then(language::lookup)
            .map(|l| l.name)
            .unwrap_or_default();
        let emotion = parts
            .emotion
            .map(str::trim)
            .filter(|e| is_emotion(e))
            .unwrap_or_default();
        let context = parts
            .context
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_default();
        let ctx = Ctx {
            persona: &self.persona,
            language,
            emotion,
            context,
            input: parts.input,
        };
        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&tinytemplate::format_unescaped);
        tt.add_template("prompt", TEMPLATE)?;
        tt.render("prompt", &ctx)
    }
}
