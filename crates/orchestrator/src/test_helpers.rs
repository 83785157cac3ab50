//! Shared test helpers for loop and service tests.

use siloed_core::error::ProviderError;
use siloed_core::provider::{GenerateRequest, GenerateResponse, Provider};
use std::sync::Mutex;

enum Script {
    Sequence(Vec<GenerateResponse>),
    Repeat(GenerateResponse),
    Fail(ProviderError),
}

/// A mock provider that returns scripted responses and records every request.
///
/// Panics if a sequence script runs out of responses.
pub struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<GenerateResponse>) -> Self {
        Self::with_script(Script::Sequence(responses))
    }

    /// Same reply on every call.
    pub fn repeating(text: &str) -> Self {
        Self::with_script(Script::Repeat(reply(text)))
    }

    /// Every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_script(Script::Fail(error))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(request);

        match &self.script {
            Script::Sequence(responses) => match responses.get(call) {
                Some(r) => Ok(r.clone()),
                None => panic!(
                    "ScriptedProvider: no more responses (call #{call}, have {})",
                    responses.len()
                ),
            },
            Script::Repeat(r) => Ok(r.clone()),
            Script::Fail(e) => Err(e.clone()),
        }
    }
}

/// A reply reporting 10 input and 5 output tokens.
pub fn reply(text: &str) -> GenerateResponse {
    GenerateResponse {
        text: text.into(),
        input_tokens: 10,
        output_tokens: 5,
        model: "scripted-model".into(),
    }
}
