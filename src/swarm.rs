//! The swarm adapter: routes prompts to specialized workers or to the text
//! provider, and degrades to the local responder when either path fails.
//!
//! Every text-facing operation has two layers of degradation. The provider
//! call runs inside its breaker with the local responder as the breaker's
//! fallback; if that still yields an error, the public method answers from the
//! local responder directly. Internally each path returns
//! `Result<_, SwarmError>`, and only the public method converts errors.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SwarmConfig;
use crate::error::SwarmError;
use crate::intent::{BeeKind, IntentClassifier};
use crate::joual::{JoualBee, LocalResponder, Tone};
use crate::provider::{
    caption_prompt, chat_messages, hashtag_prompt, image_prompt, parse_hashtags, AspectRatio,
    ChatMessage, ImageGenerator, ImageStyle, ProviderError, TextGenerator,
};
use crate::queue::{Priority, SwarmTask, TaskQueue, TaskStatus, TaskSubscription};
use crate::registry::{BreakerRegistry, SwarmHealth};

/// Confidence of a completed specialized task.
pub const TASK_CONFIDENCE: f64 = 1.0;
/// Confidence of a provider answer while the text circuit is closed.
pub const PRIMARY_CONFIDENCE: f64 = 0.95;
/// Confidence while the text circuit is not closed, or its fallback answered.
pub const DEGRADED_CONFIDENCE: f64 = 0.75;
/// Confidence of the adapter's last-resort local answer.
pub const LOCAL_CONFIDENCE: f64 = 0.5;

const TASK_DONE_DEFAULT: &str = "Tâche complétée.";

/// Lifecycle status of the bee that answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BeeStatus {
    /// A worker that finished its task.
    Idle,
    /// The main assistant answering live.
    Working,
    /// The local responder standing in for the assistant.
    Fallback,
}

/// Identity of the responder that produced an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeeProfile {
    /// Unique id of the responder instance.
    pub id: String,
    /// Category tag.
    pub kind: BeeKind,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: BeeStatus,
    /// What the responder is good at.
    pub specialty: String,
}

impl BeeProfile {
    fn worker(kind: BeeKind) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            id: format!("bee-{}-{}", kind, millis),
            kind,
            name: kind.bee_name(),
            status: BeeStatus::Idle,
            specialty: kind.as_str().to_string(),
        }
    }

    fn assistant() -> Self {
        Self {
            id: "ti-guy-main".to_string(),
            kind: BeeKind::Joual,
            name: "Ti-Guy".to_string(),
            status: BeeStatus::Working,
            specialty: "General Assistant".to_string(),
        }
    }

    fn local_fallback() -> Self {
        Self {
            id: "joual-bee-fallback".to_string(),
            kind: BeeKind::Joual,
            name: "JoualBee (Mode Local)".to_string(),
            status: BeeStatus::Fallback,
            specialty: "Local Patterns".to_string(),
        }
    }
}

/// The adapter's answer to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwarmResponse {
    /// Who answered.
    pub bee: BeeProfile,
    /// The answer.
    pub content: String,
    /// 1.0 for a finished task, 0.95 for a healthy provider, 0.75 degraded, 0.5 local.
    pub confidence: f64,
}

/// Progress notifications emitted while a message is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwarmProgress {
    /// A task is being submitted to a specialized bee.
    Dispatching(BeeKind),
    /// The specialized bee started working.
    Running(BeeKind),
    /// The text circuit is unavailable; answering locally.
    LocalMode,
}

impl fmt::Display for SwarmProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwarmProgress::Dispatching(kind) => write!(
                f,
                "🐝 Ti-Guy appelle l'agent {}...",
                kind.as_str().to_uppercase()
            ),
            SwarmProgress::Running(kind) => {
                write!(f, "🐝 L'agent {} travaille là-dessus...", kind)
            }
            SwarmProgress::LocalMode => {
                f.write_str("🔴 Circuit ouvert, j'utilise le mode local...")
            }
        }
    }
}

/// Callback receiving progress notifications.
pub type ProgressFn = dyn Fn(&SwarmProgress) + Send + Sync;

fn notify(on_progress: Option<&ProgressFn>, event: SwarmProgress) {
    if let Some(on_progress) = on_progress {
        on_progress(&event);
    }
}

/// An image generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImageRequest {
    /// What to draw.
    pub prompt: String,
    /// Style guide to append.
    pub style: ImageStyle,
    /// Requested aspect ratio.
    pub aspect_ratio: AspectRatio,
}

impl ImageRequest {
    /// A photorealistic square image of `prompt`.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Outcome of an image request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageResult {
    /// Image location; `None` for placeholders.
    pub url: Option<String>,
    /// Why no image is available, for placeholders.
    pub error: Option<String>,
    /// True when no image was generated.
    pub is_placeholder: bool,
    /// When the result was produced.
    pub generated_at: SystemTime,
}

impl ImageResult {
    fn generated(url: String) -> Self {
        Self {
            url: Some(url),
            error: None,
            is_placeholder: false,
            generated_at: SystemTime::now(),
        }
    }

    fn placeholder() -> Self {
        Self {
            url: None,
            error: Some("Image generation unavailable, circuit breaker active".to_string()),
            is_placeholder: true,
            generated_at: SystemTime::now(),
        }
    }
}

/// Builder for [`SwarmAdapter`].
pub struct SwarmAdapterBuilder {
    text: Arc<dyn TextGenerator>,
    image: Arc<dyn ImageGenerator>,
    queue: Arc<dyn TaskQueue>,
    config: SwarmConfig,
    breakers: Option<BreakerRegistry>,
    local: Option<Arc<JoualBee>>,
    responder: Option<Arc<dyn LocalResponder>>,
    classifier: IntentClassifier,
}

impl SwarmAdapterBuilder {
    /// Applies swarm configuration (breaker tunables, task wait, local seed).
    pub fn config(mut self, config: SwarmConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing breaker registry instead of building one from config.
    pub fn breakers(mut self, breakers: BreakerRegistry) -> Self {
        self.breakers = Some(breakers);
        self
    }

    /// Uses a specific local responder.
    pub fn local(mut self, local: JoualBee) -> Self {
        self.local = Some(Arc::new(local));
        self
    }

    /// Answers chat prompts through `responder` when the text circuit
    /// falls back. Defaults to the local responder.
    pub fn responder(mut self, responder: Arc<dyn LocalResponder>) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Replaces the intent routing table.
    pub fn classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Builds the adapter.
    pub fn build(self) -> SwarmAdapter {
        let breakers = self
            .breakers
            .unwrap_or_else(|| BreakerRegistry::from_config(&self.config));
        let local = self
            .local
            .unwrap_or_else(|| Arc::new(JoualBee::from_seed(self.config.local_seed)));
        let responder = self
            .responder
            .unwrap_or_else(|| Arc::clone(&local) as Arc<dyn LocalResponder>);

        SwarmAdapter {
            breakers,
            text: self.text,
            image: self.image,
            queue: self.queue,
            local,
            responder,
            classifier: self.classifier,
            task_wait: self.config.task_wait_timeout(),
        }
    }
}

/// Orchestrates the text provider, the image provider and the worker queue.
pub struct SwarmAdapter {
    breakers: BreakerRegistry,
    text: Arc<dyn TextGenerator>,
    image: Arc<dyn ImageGenerator>,
    queue: Arc<dyn TaskQueue>,
    local: Arc<JoualBee>,
    responder: Arc<dyn LocalResponder>,
    classifier: IntentClassifier,
    task_wait: Option<Duration>,
}

impl SwarmAdapter {
    /// Starts building an adapter over the three remote dependencies.
    pub fn builder(
        text: Arc<dyn TextGenerator>,
        image: Arc<dyn ImageGenerator>,
        queue: Arc<dyn TaskQueue>,
    ) -> SwarmAdapterBuilder {
        SwarmAdapterBuilder {
            text,
            image,
            queue,
            config: SwarmConfig::default(),
            breakers: None,
            local: None,
            responder: None,
            classifier: IntentClassifier::default(),
        }
    }

    /// The breakers this adapter calls through.
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// The local responder.
    pub fn local(&self) -> &JoualBee {
        &self.local
    }

    /// Answers a chat message. Always resolves with a response.
    ///
    /// Prompts matching a specialization go to the worker queue; a finished
    /// task answers with confidence 1.0. Anything else, including a failed
    /// submission or task, is answered by the text provider behind its breaker.
    pub async fn handle_message(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        on_progress: Option<&ProgressFn>,
    ) -> SwarmResponse {
        if let Some(kind) = self.classifier.classify(prompt) {
            notify(on_progress, SwarmProgress::Dispatching(kind));
            match self.run_specialized(kind, prompt, on_progress).await {
                Ok(response) => return response,
                Err(err) => {
                    warn!(%kind, error = %err, "specialized routing failed, answering directly")
                }
            }
        }

        match self.run_general(prompt, history, on_progress).await {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "text generation failed, answering locally");
                SwarmResponse {
                    bee: BeeProfile::local_fallback(),
                    content: self.local.generate_response(prompt).content,
                    confidence: LOCAL_CONFIDENCE,
                }
            }
        }
    }

    async fn run_specialized(
        &self,
        kind: BeeKind,
        prompt: &str,
        on_progress: Option<&ProgressFn>,
    ) -> Result<SwarmResponse, SwarmError> {
        let task = SwarmTask::new(prompt, kind).with_priority(Priority::High);
        let queue = &self.queue;
        let task_id = self
            .breakers
            .task_queue()
            .call(move || async move {
                queue
                    .submit(task)
                    .await
                    .ok_or_else(|| ProviderError::Rejected("task queue returned no id".into()))
            })
            .await
            .map_err(|source| SwarmError::TaskSubmissionFailed { kind, source })?;

        info!(%kind, task = %task_id, "task submitted");
        let mut subscription = self.queue.subscribe(&task_id);
        let outcome = match self.task_wait {
            Some(limit) => {
                tokio::time::timeout(limit, wait_for_result(kind, &mut subscription, on_progress))
                    .await
                    .unwrap_or_else(|_| {
                        Err(SwarmError::TaskWaitTimeout {
                            task_id: task_id.to_string(),
                            after: limit,
                        })
                    })
            }
            None => wait_for_result(kind, &mut subscription, on_progress).await,
        };
        subscription.unsubscribe();

        Ok(SwarmResponse {
            bee: BeeProfile::worker(kind),
            content: outcome?,
            confidence: TASK_CONFIDENCE,
        })
    }

    async fn run_general(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        on_progress: Option<&ProgressFn>,
    ) -> Result<SwarmResponse, SwarmError> {
        let breaker = self.breakers.text_generation();
        let used_fallback = AtomicBool::new(false);
        let messages = chat_messages(prompt, history);

        let text = &self.text;
        let responder = &self.responder;
        let used = &used_fallback;
        let content = breaker
            .call_with_fallback(
                move || async move { complete(text.as_ref(), messages).await },
                move || async move {
                    used.store(true, Ordering::Relaxed);
                    notify(on_progress, SwarmProgress::LocalMode);
                    responder.respond(prompt)
                },
            )
            .await?;

        let confidence = if breaker.is_healthy() && !used_fallback.load(Ordering::Relaxed) {
            PRIMARY_CONFIDENCE
        } else {
            DEGRADED_CONFIDENCE
        };

        Ok(SwarmResponse {
            bee: BeeProfile::assistant(),
            content,
            confidence,
        })
    }

    /// Writes a caption for a post. Always returns a caption.
    pub async fn generate_caption(&self, topic: &str, tone: Tone) -> String {
        match self.try_caption(topic, tone).await {
            Ok(caption) => caption,
            Err(err) => {
                warn!(error = %err, "caption generation failed, answering locally");
                self.local.generate_caption(topic, tone)
            }
        }
    }

    async fn try_caption(&self, topic: &str, tone: Tone) -> Result<String, SwarmError> {
        let messages = chat_messages(&caption_prompt(topic, tone), &[]);
        let text = &self.text;
        let local = &self.local;
        let caption = self
            .breakers
            .text_generation()
            .call_with_fallback(
                move || async move { complete(text.as_ref(), messages).await },
                move || async move { Ok(local.generate_caption(topic, tone)) },
            )
            .await?;
        Ok(caption)
    }

    /// Suggests up to `count` hashtags. Always returns tags when `count > 0`.
    pub async fn generate_hashtags(&self, topic: &str, count: usize) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        match self.try_hashtags(topic, count).await {
            Ok(tags) => tags,
            Err(err) => {
                warn!(error = %err, "hashtag generation failed, answering locally");
                self.local.generate_hashtags(topic, count)
            }
        }
    }

    async fn try_hashtags(&self, topic: &str, count: usize) -> Result<Vec<String>, SwarmError> {
        let messages = chat_messages(&hashtag_prompt(topic, count), &[]);
        let text = &self.text;
        let local = &self.local;
        let response = self
            .breakers
            .text_generation()
            .call_with_fallback(
                move || async move { complete(text.as_ref(), messages).await },
                move || async move { Ok(local.generate_hashtags(topic, count).join(" ")) },
            )
            .await?;

        let tags = parse_hashtags(&response, count);
        if tags.is_empty() {
            return Err(SwarmError::EmptyResponse(format!(
                "no hashtags in {:?}",
                response
            )));
        }
        Ok(tags)
    }

    /// Generates an image, or a placeholder when the provider is unavailable.
    pub async fn generate_image(&self, request: &ImageRequest) -> ImageResult {
        let prompt = image_prompt(&request.prompt, request.style);
        let size_hint = request.aspect_ratio.size_hint();
        let image = &self.image;

        let result = self
            .breakers
            .image_generation()
            .call_with_fallback(
                move || async move {
                    let generated = image.generate(prompt, size_hint).await?;
                    if generated.url.trim().is_empty() {
                        return Err(ProviderError::InvalidResponse("empty image url".into()));
                    }
                    Ok(ImageResult::generated(generated.url))
                },
                || async { Ok(ImageResult::placeholder()) },
            )
            .await;

        result.unwrap_or_else(|err| {
            error!(error = %err, "image generation failed");
            ImageResult::placeholder()
        })
    }

    /// State, health flag and metrics of every circuit.
    pub fn swarm_health(&self) -> SwarmHealth {
        self.breakers.health()
    }
}

/// Calls the text provider, treating a blank completion as a failure.
async fn complete(text: &dyn TextGenerator, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
    let content = text.generate(messages).await?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::InvalidResponse("empty completion".into()));
    }
    Ok(trimmed.to_string())
}

async fn wait_for_result(
    kind: BeeKind,
    subscription: &mut TaskSubscription,
    on_progress: Option<&ProgressFn>,
) -> Result<String, SwarmError> {
    let task_id = subscription.task_id().to_string();
    while let Some(update) = subscription.next().await {
        debug!(%kind, task = %task_id, status = ?update.status, "task status");
        match update.status {
            TaskStatus::Pending => {}
            TaskStatus::Running => notify(on_progress, SwarmProgress::Running(kind)),
            TaskStatus::Done => {
                return Ok(update
                    .result
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| TASK_DONE_DEFAULT.to_string()))
            }
            TaskStatus::Failed | TaskStatus::Cancelled => {
                return Err(SwarmError::TaskFailed {
                    task_id,
                    reason: update
                        .result
                        .unwrap_or_else(|| format!("{:?}", update.status).to_lowercase()),
                })
            }
        }
    }

    Err(SwarmError::SubscriptionClosed { task_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_messages() {
        assert_eq!(
            SwarmProgress::Dispatching(BeeKind::Finance).to_string(),
            "🐝 Ti-Guy appelle l'agent FINANCE..."
        );
        assert_eq!(
            SwarmProgress::Running(BeeKind::Hockey).to_string(),
            "🐝 L'agent hockey travaille là-dessus..."
        );
    }

    #[test]
    fn worker_profiles_are_named_after_their_kind() {
        let bee = BeeProfile::worker(BeeKind::Security);
        assert!(bee.id.starts_with("bee-security-"));
        assert_eq!(bee.name, "SecurityBee");
        assert_eq!(bee.status, BeeStatus::Idle);
    }

    #[test]
    fn placeholder_has_no_url() {
        let placeholder = ImageResult::placeholder();
        assert!(placeholder.is_placeholder);
        assert!(placeholder.url.is_none());
        assert!(placeholder.error.is_some());
    }

    #[test]
    fn confidence_levels_are_ordered() {
        assert!(TASK_CONFIDENCE > PRIMARY_CONFIDENCE);
        assert!(PRIMARY_CONFIDENCE > DEGRADED_CONFIDENCE);
        assert!(DEGRADED_CONFIDENCE > LOCAL_CONFIDENCE);
    }
}
