//! Swarm Chat Example
//!
//! This example demonstrates:
//! 1. Wiring a swarm adapter over stub providers and an in-memory queue
//! 2. Routing specialized prompts to worker bees
//! 3. Degrading to the local responder while the text provider is down
//! 4. Reading circuit health after the provider recovers

use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swarm_breaker::swarm::ProgressFn;
use swarm_breaker::telemetry::init_tracing;
use swarm_breaker::{
    ChatMessage, GeneratedImage, ImageGenerator, ImageRequest, InMemoryTaskQueue, ProviderError,
    SwarmAdapter, SwarmConfig, SwarmProgress, TextGenerator, Tone,
};

// A text provider that can be switched off to simulate an outage
struct FlakyText {
    up: AtomicBool,
}

impl TextGenerator for FlakyText {
    fn generate(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<String, ProviderError>> {
        let up = self.up.load(Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !up {
                return Err(ProviderError::Status {
                    status: 503,
                    message: "service unavailable".into(),
                });
            }
            let prompt = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            if prompt.contains("hashtags") {
                return Ok("#GoHabs #HockeyLife #Montréal #YoQuébec".to_string());
            }
            Ok(format!("Ti-Guy dit: \"{}\"? Ben oui, mon ami!", prompt))
        }
        .boxed()
    }
}

struct StaticImage;

impl ImageGenerator for StaticImage {
    fn generate(
        &self,
        _prompt: String,
        size_hint: &'static str,
    ) -> BoxFuture<'_, Result<GeneratedImage, ProviderError>> {
        async move {
            Ok(GeneratedImage {
                url: format!("https://images.example/{}.png", size_hint),
            })
        }
        .boxed()
    }
}

const CONFIG: &str = r#"
task_wait_timeout_ms = 5000
local_seed = 2024

[breakers.text_generation]
failure_threshold = 2
reset_timeout_ms = 1000
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("swarm_breaker=info");
    println!("=== Swarm Chat Example ===\n");

    let config = SwarmConfig::from_toml_str(CONFIG)?;
    let text = Arc::new(FlakyText {
        up: AtomicBool::new(true),
    });
    let queue = InMemoryTaskQueue::new(|task| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(format!("{} a regardé ça: {}", task.kind.bee_name(), task.description))
    });

    let swarm = SwarmAdapter::builder(text.clone(), Arc::new(StaticImage), Arc::new(queue))
        .config(config)
        .build();

    let on_progress = |event: &SwarmProgress| println!("   {}", event);
    let on_progress: &ProgressFn = &on_progress;

    // 1. Specialized and general prompts while everything is healthy
    for prompt in ["Le score du hockey hier?", "Salut Ti-Guy!"] {
        let response = swarm.handle_message(prompt, &[], Some(on_progress)).await;
        println!(
            "> {}\n  [{} @ {:.2}] {}\n",
            prompt, response.bee.name, response.confidence, response.content
        );
    }

    // 2. Take the provider down and watch the text circuit open
    println!("--- text provider goes down ---");
    text.up.store(false, Ordering::SeqCst);
    for prompt in ["bonjour", "merci!", "t'aimes-tu Montréal?"] {
        let response = swarm.handle_message(prompt, &[], Some(on_progress)).await;
        println!(
            "> {}\n  [{} @ {:.2}] {}  (circuit: {})\n",
            prompt,
            response.bee.name,
            response.confidence,
            response.content,
            swarm.breakers().text_generation().state()
        );
    }

    // 3. Bring it back and let the breaker probe its way closed
    println!("--- text provider recovers ---");
    text.up.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    for _ in 0..2 {
        let response = swarm.handle_message("ça va?", &[], None).await;
        println!(
            "  [{:.2}] {}  (circuit: {})",
            response.confidence,
            response.content,
            swarm.breakers().text_generation().state()
        );
    }

    // 4. Content helpers
    println!("\ncaption:  {}", swarm.generate_caption("poutine", Tone::Hype).await);
    println!("hashtags: {:?}", swarm.generate_hashtags("hockey", 4).await);
    let image = swarm.generate_image(&ImageRequest::new("le Stade olympique")).await;
    println!("image:    {:?}", image.url);

    let health = swarm.swarm_health();
    println!("\nall circuits healthy: {}", health.all_healthy());
    println!("{}", swarm.breakers().text_generation());

    Ok(())
}
