//! Contracts for the remote text and image providers, plus prompt shaping.

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::joual::Tone;

/// Errors reported by provider implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider could not be reached or is not configured.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with an error status.
    #[error("provider returned status {status}: {message}")]
    Status {
        /// Status code reported by the provider.
        status: u16,
        /// Provider's error message.
        message: String,
    },

    /// The provider answered with something that could not be used.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The provider refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona and instructions.
    System,
    /// The end user.
    User,
    /// A previous model answer.
    Assistant,
}

/// One entry of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A remote chat-completion provider.
///
/// Implementations must be cancel-safe: the breaker drops the returned future
/// when the call times out.
pub trait TextGenerator: Send + Sync + 'static {
    /// Completes the ordered transcript and returns the assistant's text.
    fn generate(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<String, ProviderError>>;
}

/// An image produced by a remote provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Where the image can be fetched.
    pub url: String,
}

/// A remote image-generation provider.
pub trait ImageGenerator: Send + Sync + 'static {
    /// Renders `prompt` at the given provider size hint (e.g. `square_hd`).
    fn generate(
        &self,
        prompt: String,
        size_hint: &'static str,
    ) -> BoxFuture<'_, Result<GeneratedImage, ProviderError>>;
}

/// Persona sent as the system message on every text call.
pub const SYSTEM_PROMPT: &str = "\
You are Ti-Guy, Zyeuté's AI assistant for Quebec creators.

Your CORE IDENTITY:
- Speak in authentic JOUAL (Quebec French slang) - not standard French
- Use local references: Montreal, poutine, hockey, St-Jean celebration, Plateau-Mont-Royal
- Be friendly, casual, helpful (\"mon ami\", \"tu sais\", \"c'est vrai\")

Your ROLE:
- Help creators make engaging posts in authentic Quebec style
- Suggest captions and hashtags that resonate with a Québécois audience
- Chat conversationally in Joual

Always stay in character as Ti-Guy.";

/// Builds the transcript for a chat turn: persona, history, then the prompt.
pub fn chat_messages(prompt: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(prompt));
    messages
}

/// Prompt asking the text provider for a short caption.
pub fn caption_prompt(topic: &str, tone: Tone) -> String {
    format!(
        "Génère une caption courte (max 150 chars) en Joual québécois pour un post Zyeuté.\n\
         Topic: {topic}\n\
         Tone: {tone}\n\n\
         Caption only, no explanation."
    )
}

/// Prompt asking the text provider for hashtags.
pub fn hashtag_prompt(topic: &str, count: usize) -> String {
    format!(
        "Generate {count} hashtags in Quebec French for topic: \"{topic}\"\n\
         Format: #tag1 #tag2 etc\n\
         Only hashtags, no explanation."
    )
}

/// Extracts up to `count` `#tags` from a free-form provider answer.
pub fn parse_hashtags(response: &str, count: usize) -> Vec<String> {
    response
        .split_whitespace()
        .filter(|token| token.starts_with('#') && token.len() > 1)
        .take(count)
        .map(str::to_string)
        .collect()
}

/// Visual style appended to image prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    /// Natural lighting, photographic detail.
    #[default]
    Photorealistic,
    /// Film stills with dramatic lighting.
    Cinematic,
    /// Gold accents, premium materials.
    Luxury,
    /// Frosted glass panels over gradients.
    Glassmorphism,
    /// Saturated colour.
    Vibrant,
    /// Painterly rendering.
    Artistic,
    /// Neon glow on a dark background.
    Neon,
}

impl ImageStyle {
    fn guide(self) -> &'static str {
        match self {
            ImageStyle::Photorealistic => {
                "photorealistic, 8k, professional photography, sharp focus"
            }
            ImageStyle::Cinematic => "cinematic lighting, 4k, movie still, dramatic shadows",
            ImageStyle::Luxury => "luxury, gold accents, premium materials, elegant composition",
            ImageStyle::Glassmorphism => "glassmorphism design, frosted glass, modern, sleek",
            ImageStyle::Vibrant => "vibrant colors, saturated, dynamic, energetic",
            ImageStyle::Artistic => "artistic style, oil painting effect, expressive brushstrokes",
            ImageStyle::Neon => "neon lights, cyberpunk aesthetic, glowing edges, dark background",
        }
    }
}

/// Requested aspect ratio of a generated image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1, the default.
    #[default]
    #[serde(rename = "1:1")]
    Square,
    /// 4:3 landscape.
    #[serde(rename = "4:3")]
    Landscape4x3,
    /// 16:9 widescreen.
    #[serde(rename = "16:9")]
    Landscape16x9,
    /// 9:16 vertical, for stories.
    #[serde(rename = "9:16")]
    Portrait9x16,
    /// 3:2 landscape.
    #[serde(rename = "3:2")]
    Landscape3x2,
}

impl AspectRatio {
    /// Parses `"16:9"`-style ratios. Unknown ratios map to square.
    pub fn parse(ratio: &str) -> Self {
        match ratio.trim() {
            "4:3" => AspectRatio::Landscape4x3,
            "16:9" => AspectRatio::Landscape16x9,
            "9:16" => AspectRatio::Portrait9x16,
            "3:2" => AspectRatio::Landscape3x2,
            _ => AspectRatio::Square,
        }
    }

    /// Provider size hint for this ratio.
    pub fn size_hint(self) -> &'static str {
        match self {
            AspectRatio::Square => "square_hd",
            AspectRatio::Landscape4x3 => "landscape_4_3",
            AspectRatio::Landscape16x9 => "landscape_16_9",
            AspectRatio::Portrait9x16 => "portrait_16_9",
            AspectRatio::Landscape3x2 => "landscape_3_2",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape3x2 => "3:2",
        })
    }
}

/// Decorates a user prompt with its style guide.
pub fn image_prompt(base: &str, style: ImageStyle) -> String {
    format!("{}, {}, high quality, masterpiece", base, style.guide())
}
