//! Scripted [`LanguageModel`] for stage tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use artmatch_gateway::LanguageModel;
use artmatch_shared::{ArtMatchError, Result};

/// How the fake answers a matching prompt.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Exhausted,
    Format,
}

/// Answers with the first rule whose needle occurs in the prompt.
#[derive(Default)]
pub struct ScriptedModel {
    rules: Vec<(String, Reply)>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, reply: Reply) -> Self {
        self.rules.push((needle.to_string(), reply));
        self
    }

    pub fn text(self, needle: &str, text: &str) -> Self {
        self.on(needle, Reply::Text(text.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or(Reply::Text("I cannot help with that.".into()));

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Exhausted => Err(ArtMatchError::UpstreamExhausted {
                attempts: 3,
                last_error: "connection refused".into(),
            }),
            Reply::Format => Err(ArtMatchError::format("response has an empty 'choices' list")),
        }
    }
}
