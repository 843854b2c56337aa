//! Chat summaries through an external text-generation endpoint.
//!
//! The transcript of the visible log is wrapped in a fixed instruction, sent
//! through the retry envelope, and the answer (or a failure notice) is
//! appended back to the room as a summary message.

mod gemini;

pub use gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiClient, extract_text};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::common::{Message, MessageDraft};
use crate::error::{ChatError, ChatResult};
use crate::retry::{RetryPolicy, with_retry};
use crate::room::RoomChannel;

pub const SUMMARY_AUTHOR_ID: &str = "Gemini";
pub const SUMMARY_AUTHOR_NAME: &str = "Gemini";
pub const SUMMARY_COLOR: &str = "#9F7AEA";

pub const SUMMARY_INSTRUCTION: &str = "Summarize the following chat conversation:";
pub const FALLBACK_SUMMARY: &str = "Failed to generate summary.";
pub const ERROR_SUMMARY: &str = "Error generating summary. Please try again.";

/// Something that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// False when no credential is available; the summarizer then skips.
    fn is_configured(&self) -> bool;

    /// `MalformedResponse` means the endpoint answered but not with the
    /// expected shape. That is final and is not retried.
    async fn generate(&self, prompt: &str) -> ChatResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    InFlight,
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Summary (or the fallback text) was appended.
    Posted(Message),
    /// Generation or posting failed; the error notice was attempted.
    Failed,
    Skipped(SkipReason),
}

/// `"<label>: <text>"` per message, newline separated. The requester's own
/// messages are labelled `You`.
pub fn build_transcript(messages: &[Message], requester_id: &str) -> String {
    messages
        .iter()
        .map(|msg| {
            let label = if msg.author_id == requester_id {
                "You"
            } else {
                msg.author_display_name.as_str()
            };
            format!("{label}: {}", msg.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(transcript: &str) -> String {
    format!("{SUMMARY_INSTRUCTION}\n\n{transcript}")
}

fn summary_draft(text: &str) -> MessageDraft {
    MessageDraft {
        text: text.to_string(),
        author_id: SUMMARY_AUTHOR_ID.to_string(),
        author_display_name: SUMMARY_AUTHOR_NAME.to_string(),
        author_color: SUMMARY_COLOR.to_string(),
        is_summary: true,
    }
}

/// Clears the single-flight flag on every exit path, unwinding included.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Summarizer {
    room: RoomChannel,
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    in_flight: AtomicBool,
}

impl Summarizer {
    pub fn new(room: RoomChannel, generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self {
            room,
            generator,
            policy,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_configured()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }

    /// Summarize `messages` as seen by `requester_id` and post the result.
    pub async fn summarize(&self, messages: &[Message], requester_id: &str) -> SummaryOutcome {
        if messages.is_empty() {
            return SummaryOutcome::Skipped(SkipReason::Empty);
        }
        if !self.generator.is_configured() {
            log::warn!("Summary requested but no API key is configured");
            return SummaryOutcome::Skipped(SkipReason::NotConfigured);
        }
        let Some(_guard) = self.begin() else {
            log::debug!("Summary already in flight; ignoring request");
            return SummaryOutcome::Skipped(SkipReason::InFlight);
        };

        let prompt = build_prompt(&build_transcript(messages, requester_id));
        log::info!("Summarizing {} messages", messages.len());

        let generator = &self.generator;
        let prompt = prompt.as_str();
        let generated = with_retry(self.policy, move || async move {
            match generator.generate(prompt).await {
                Err(ChatError::MalformedResponse(detail)) => {
                    log::warn!("Unexpected summary response: {detail}");
                    Ok(FALLBACK_SUMMARY.to_string())
                }
                other => other,
            }
        })
        .await;
        let text = match generated {
            Ok(text) => text,
            Err(err) => {
                log::error!("Error generating summary: {err}");
                self.post_error_notice().await;
                return SummaryOutcome::Failed;
            }
        };

        match self.room.append(&summary_draft(&text)).await {
            Ok(message) => SummaryOutcome::Posted(message),
            Err(err) => {
                log::error!("Failed to post summary: {err}");
                self.post_error_notice().await;
                SummaryOutcome::Failed
            }
        }
    }

    async fn post_error_notice(&self) {
        if let Err(err) = self.room.append(&summary_draft(ERROR_SUMMARY)).await {
            log::error!("Failed to post summary error notice: {err}");
        }
    }
}
