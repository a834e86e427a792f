// Answer generation module
// Streams chat completions from Ollama, grounded in retrieved context


use anyhow::{Context, anyhow};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::pin::Pin;
use std::task::Poll;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::retrieval::ContextSet;
use crate::{Result, SeekifyError};

/// Instruction sent ahead of every grounded question
pub const SYSTEM_PROMPT: &str = "You answer questions using only the context supplied with the question. \
If the context does not contain enough information to answer, say clearly that it is insufficient. \
Do not speculate and do not fill gaps from your own knowledge. \
When there is no context, say that you have no context and stop immediately. \
Do not apologise, do not explain how you arrived at the answer, and never mention that you were given context.\n\n\
Format the answer in clear, concise language organised into paragraphs. \
Use bullet points or numbered lists to break down complex information, \
and add headings or subheadings where they help structure a longer answer.";

/// Answer given for grounded questions when nothing was retrieved
pub const NO_CONTEXT_ANSWER: &str = "I have no context to answer this question.";

/// Fragments buffered between the reading thread and the consumer
const STREAM_BUFFER: usize = 64;

/// A finite, single-pass stream of answer fragments.
///
/// A generation failure is yielded as one `Err` item after the fragments
/// that were already produced, and the stream ends there.
#[derive(Debug)]
pub struct AnswerStream {
    receiver: mpsc::Receiver<Result<String>>,
}

impl AnswerStream {
    /// A stream that yields fixed fragments and ends
    #[inline]
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        let (sender, receiver) = mpsc::channel(fragments.len().max(1));
        for fragment in fragments {
            // Capacity covers every fragment
            let _ = sender.try_send(Ok(fragment));
        }
        Self { receiver }
    }

    /// Drain the stream into one string, stopping at the first error
    #[inline]
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.receiver.recv().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

impl Stream for AnswerStream {
    type Item = Result<String>;

    #[inline]
    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponseLine {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Streaming client for Ollama's chat endpoint
#[derive(Debug, Clone)]
pub struct Generator {
    chat_url: Url,
    model: String,
    agent: ureq::Agent,
}

impl Generator {
    /// Client for `config.chat_model`. Answers can take a long time, so no
    /// overall request timeout is set.
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let chat_url = config
            .ollama_url()?
            .join("/api/chat")
            .map_err(|e| SeekifyError::Config(format!("Failed to build chat URL: {}", e)))?;

        Ok(Self {
            chat_url,
            model: config.chat_model.clone(),
            agent: ureq::Agent::config_builder().build().into(),
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Start streaming an answer to `question`.
    ///
    /// Grounded answers are restricted to `context`; with an empty context
    /// the fixed [`NO_CONTEXT_ANSWER`] is returned without calling the model.
    /// Ungrounded answers send the bare question with no instruction.
    #[inline]
    pub fn generate(
        &self,
        question: &str,
        context: &ContextSet,
        grounded: bool,
    ) -> Result<AnswerStream> {
        if grounded && context.is_empty() {
            info!("No context available, answering without the model");
            return Ok(AnswerStream::from_fragments([NO_CONTEXT_ANSWER]));
        }

        let messages = build_messages(question, context, grounded);
        let body = serde_json::to_string(&ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
        })
        .map_err(|e| SeekifyError::Generation(format!("Failed to serialize chat request: {}", e)))?;

        info!(
            "Generating {} answer with {} ({} context chunks)",
            if grounded { "grounded" } else { "ungrounded" },
            self.model,
            context.len()
        );

        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        let generator = self.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = generator.stream_chat(&body, &sender) {
                warn!("Answer generation failed: {:#}", e);
                let _ = sender.blocking_send(Err(SeekifyError::Generation(format!("{:#}", e))));
            }
        });

        Ok(AnswerStream { receiver })
    }

    /// Send each content fragment of the NDJSON chat response until `done`
    fn stream_chat(&self, body: &str, sender: &mpsc::Sender<Result<String>>) -> anyhow::Result<()> {
        debug!("POST {}", self.chat_url);

        let response = match self
            .agent
            .post(self.chat_url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
        {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(code)) => {
                return Err(anyhow!("chat service returned HTTP {}", code));
            }
            Err(e) => {
                return Err(anyhow::Error::from(e))
                    .with_context(|| format!("Failed to reach chat service at {}", self.chat_url));
            }
        };

        let reader = BufReader::new(response.into_body().into_reader());
        for line in reader.lines() {
            let line = line.context("Failed to read chat response")?;
            if line.trim().is_empty() {
                continue;
            }

            let parsed: ChatResponseLine = serde_json::from_str(&line)
                .with_context(|| format!("Malformed chat response line: {}", line))?;

            if let Some(error) = parsed.error {
                return Err(anyhow!("model error: {}", error));
            }

            if let Some(message) = parsed.message {
                if !message.content.is_empty() && sender.blocking_send(Ok(message.content)).is_err() {
                    debug!("Answer stream dropped by the consumer");
                    return Ok(());
                }
            }

            if parsed.done {
                debug!("Chat response complete");
                return Ok(());
            }
        }

        Err(anyhow!("chat response ended before completion"))
    }
}

/// Role-tagged turns for one question
pub(crate) fn build_messages(
    question: &str,
    context: &ContextSet,
    grounded: bool,
) -> Vec<ChatMessage> {
    if !grounded {
        return vec![ChatMessage {
            role: "user",
            content: question.to_string(),
        }];
    }

    vec![
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: "user",
            content: format!("Context: {}, Question: {}", context.joined(), question),
        },
    ]
}
