//! Ollama provider over the native `/api/chat` endpoint.
//!
//! Non-streaming calls return one JSON object; streaming calls return
//! newline-delimited JSON, one object per produced fragment, with a final
//! `"done": true` object. The byte stream is parsed line-by-line in a
//! spawned task that feeds an mpsc channel.

use crate::llm::{GenOptions, ModelTier, StreamEvent, TextGenerator};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use soma_core::config::LlmConfig;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    fast_model: String,
    temperature: f32,
    fast_temperature: f32,
    context_window: u32,
}

impl OllamaClient {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .context("Failed to build HTTP client")?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            fast_model: cfg.fast_model.clone(),
            temperature: cfg.temperature,
            fast_temperature: cfg.fast_temperature,
            context_window: cfg.context_window,
        })
    }

    fn payload(&self, system: &str, user: &str, opts: &GenOptions, stream: bool) -> Value {
        let (model, default_temp) = match opts.tier {
            ModelTier::Primary => (&self.model, self.temperature),
            ModelTier::Fast => (&self.fast_model, self.fast_temperature),
        };
        json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "stream": stream,
            "options": {
                "temperature": opts.temperature.unwrap_or(default_temp),
                "num_ctx": self.context_window,
            },
        })
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let err_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama error {}: {}", status, err_text);
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, system: &str, user: &str, opts: GenOptions) -> Result<String> {
        let payload = self.payload(system, user, &opts, false);
        let response = self.post(&payload).await?;
        let body: Value = response.json().await.context("Invalid Ollama response")?;
        parse_chat_content(&body)
            .ok_or_else(|| anyhow::anyhow!("Ollama response missing message content"))
    }

    async fn stream_generate(
        &self,
        system: &str,
        user: &str,
        opts: GenOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let payload = self.payload(system, user, &opts, true);
        let response = self.post(&payload).await?;

        let (tx, rx) = mpsc::channel(64);
        let mut byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut pending = String::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                pending.push_str(&String::from_utf8_lossy(&chunk));

                // NDJSON: complete lines only; keep the remainder buffered.
                while let Some(newline) = pending.find('\n') {
                    let line: String = pending.drain(..=newline).collect();
                    match parse_chat_line(line.trim()) {
                        ChatLine::Fragment(text) => {
                            if !text.is_empty() && tx.send(StreamEvent::Fragment(text)).await.is_err()
                            {
                                // Receiver dropped: stop reading the stream.
                                return;
                            }
                        }
                        ChatLine::Done => {
                            let _ = tx.send(StreamEvent::Done).await;
                            return;
                        }
                        ChatLine::Skip => {}
                    }
                }
            }

            // Stream ended without a done marker; still terminate cleanly.
            let _ = tx.send(StreamEvent::Done).await;
        });

        Ok(rx)
    }
}

/// Outcome of parsing one NDJSON line.
#[derive(Debug, PartialEq)]
enum ChatLine {
    Fragment(String),
    Done,
    Skip,
}

fn parse_chat_line(line: &str) -> ChatLine {
    if line.is_empty() {
        return ChatLine::Skip;
    }
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("unparseable stream line ({}): {}", e, line);
            return ChatLine::Skip;
        }
    };

    if value["done"].as_bool() == Some(true) {
        // The final object may still carry a last content fragment, but
        // Ollama sends it empty in practice; treat done as terminal.
        return ChatLine::Done;
    }

    match parse_chat_content(&value) {
        Some(text) => ChatLine::Fragment(text),
        None => ChatLine::Skip,
    }
}

fn parse_chat_content(value: &Value) -> Option<String> {
    value["message"]["content"].as_str().map(|s| s.to_string())
}
