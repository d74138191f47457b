//! Vision-model layout classification.
//!
//! The page PNG is sent to a VLM through `edgequake-llm` together with
//! [`crate::prompts::LAYOUT_SYSTEM_PROMPT`]; the reply is a JSON object that
//! [`parse_layout_reply`] turns into a [`PageLayout`]. Parsing is always
//! compiled so replies can be tested without the `vision-layout` feature.
//!
//! Any provider or parse failure falls back to the rule-based classifier.

use crate::error::LayoutError;
use crate::output::{BlockKind, LayoutKind, Rect};
use crate::pipeline::layout::{
    normalize_regions, LayoutClassifier, LayoutRegion, PageLayout, RuleBasedClassifier,
};
use image::DynamicImage;
use serde::Deserialize;
use std::future::Future;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tracing::warn;

#[derive(Debug, Deserialize)]
struct LayoutReply {
    #[serde(default)]
    layout: Option<String>,
    #[serde(default)]
    blocks: Vec<ReplyBlock>,
}

#[derive(Debug, Deserialize)]
struct ReplyBlock {
    #[serde(rename = "type")]
    kind: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    bold: bool,
}

/// Parse a model reply for a `width × height` page.
///
/// Tolerates markdown fences and prose around the JSON object. Boxes are
/// clamped and normalised exactly like rule-based regions.
pub fn parse_layout_reply(reply: &str, width: u32, height: u32) -> Result<PageLayout, String> {
    let start = reply.find('{').ok_or("reply contains no JSON object")?;
    let end = reply.rfind('}').ok_or("reply contains no JSON object")?;
    if end < start {
        return Err("reply contains no JSON object".into());
    }
    let parsed: LayoutReply =
        serde_json::from_str(&reply[start..=end]).map_err(|e| format!("invalid layout JSON: {e}"))?;

    let px = |v: f64| if v.is_finite() { v.max(0.0).round() as u32 } else { 0 };
    let regions = parsed
        .blocks
        .into_iter()
        .map(|b| {
            let kind = BlockKind::from(b.kind.trim().to_ascii_lowercase());
            let mut region = LayoutRegion::new(kind, Rect::new(px(b.x), px(b.y), px(b.width), px(b.height)));
            region.formatting.insert("bold".to_string(), b.bold);
            region
        })
        .collect();

    let kind = parsed
        .layout
        .map(|l| LayoutKind::from(l.trim().to_ascii_lowercase()))
        .unwrap_or(LayoutKind::Generic);

    Ok(PageLayout {
        kind,
        regions: normalize_regions(regions, width, height),
    })
}

/// Drive `fut` to completion from synchronous code.
///
/// Layout classification is a sync trait method, but callers may already be
/// inside a tokio runtime. On a multi-thread runtime the current worker is
/// handed over with `block_in_place`; a current-thread runtime cannot block,
/// so the future runs on a scoped thread with a runtime of its own.
pub(crate) fn block_on_sync<F>(fut: F) -> Result<F::Output, String>
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
        }
        Ok(_) => std::thread::scope(|s| {
            s.spawn(|| block_on_fresh(fut))
                .join()
                .map_err(|_| "layout request thread panicked".to_string())?
        }),
        Err(_) => block_on_fresh(fut),
    }
}

fn block_on_fresh<F: Future>(fut: F) -> Result<F::Output, String> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to create tokio runtime: {e}"))?;
    Ok(runtime.block_on(fut))
}

/// Await `request` for a model reply and parse it for `image`.
///
/// A failed request or an unparsable reply falls back to `fallback`.
#[cfg_attr(not(feature = "vision-layout"), allow(dead_code))]
pub(crate) fn layout_from_request<F>(
    request: F,
    image: &DynamicImage,
    fallback: &RuleBasedClassifier,
) -> Result<PageLayout, LayoutError>
where
    F: Future<Output = Result<String, String>> + Send,
{
    let outcome = block_on_sync(request)
        .and_then(|reply| reply)
        .and_then(|reply| parse_layout_reply(&reply, image.width(), image.height()));
    match outcome {
        Ok(layout) => Ok(layout),
        Err(e) => {
            warn!("Vision layout failed ({}), using rule-based classifier", e);
            fallback.analyze(image)
        }
    }
}

#[cfg(feature = "vision-layout")]
pub use classifier::VisionLayoutClassifier;

#[cfg(feature = "vision-layout")]
mod classifier {
    use super::layout_from_request;
    use crate::error::LayoutError;
    use crate::pipeline::encode::encode_page;
    use crate::pipeline::layout::{LayoutClassifier, PageLayout, RuleBasedClassifier};
    use crate::prompts::{layout_user_prompt, LAYOUT_SYSTEM_PROMPT};
    use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
    use image::DynamicImage;
    use std::sync::Arc;
    use tracing::debug;

    const DEFAULT_MODEL: &str = "gpt-4.1-nano";

    /// [`LayoutClassifier`] backed by a vision language model.
    pub struct VisionLayoutClassifier {
        provider: Arc<dyn LLMProvider>,
        fallback: RuleBasedClassifier,
    }

    impl VisionLayoutClassifier {
        pub fn new(provider: Arc<dyn LLMProvider>, fallback: RuleBasedClassifier) -> Self {
            Self { provider, fallback }
        }

        /// Resolve a provider: explicit name (+ model), then
        /// `EDGEQUAKE_LLM_PROVIDER`/`EDGEQUAKE_MODEL`, then auto-detection.
        pub fn from_config(
            provider: Option<&str>,
            model: Option<&str>,
            fallback: RuleBasedClassifier,
        ) -> Result<Self, LayoutError> {
            let fail = |name: &str, e: String| LayoutError {
                backend: "vision".into(),
                detail: format!("provider '{name}' not configured: {e}"),
            };

            let provider = if let Some(name) = provider {
                ProviderFactory::create_llm_provider(name, model.unwrap_or(DEFAULT_MODEL))
                    .map_err(|e| fail(name, e.to_string()))?
            } else if let (Ok(name), Ok(env_model)) = (
                std::env::var("EDGEQUAKE_LLM_PROVIDER"),
                std::env::var("EDGEQUAKE_MODEL"),
            ) {
                ProviderFactory::create_llm_provider(&name, model.unwrap_or(&env_model))
                    .map_err(|e| fail(&name, e.to_string()))?
            } else {
                let (llm, _embedding) =
                    ProviderFactory::from_env().map_err(|e| fail("auto", e.to_string()))?;
                llm
            };

            Ok(Self::new(provider, fallback))
        }

        async fn ask(&self, image: &DynamicImage) -> Result<String, String> {
            let attachment = encode_page(image).map_err(|e| e.to_string())?;
            let prompt = layout_user_prompt(image.width(), image.height());
            let messages = vec![
                ChatMessage::system(LAYOUT_SYSTEM_PROMPT),
                ChatMessage::user_with_images(&prompt, vec![attachment]),
            ];
            let options = CompletionOptions {
                temperature: Some(0.0),
                max_tokens: Some(2048),
                ..Default::default()
            };
            let response = self
                .provider
                .chat(&messages, Some(&options))
                .await
                .map_err(|e| e.to_string())?;
            debug!(
                "Layout reply: {} input tokens, {} output tokens",
                response.prompt_tokens, response.completion_tokens
            );
            Ok(response.content)
        }
    }

    impl LayoutClassifier for VisionLayoutClassifier {
        fn name(&self) -> &'static str {
            "vision"
        }

        fn analyze(&self, image: &DynamicImage) -> Result<PageLayout, LayoutError> {
            layout_from_request(self.ask(image), image, &self.fallback)
        }
    }
}
