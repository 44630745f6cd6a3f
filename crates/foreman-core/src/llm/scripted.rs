use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::{ChatMessage, ModelGateway, ModelResponse, ToolDefinition};

/// Gateway double that replays canned responses and records every request.
pub(crate) struct ScriptedGateway {
    script: Mutex<VecDeque<Result<ModelResponse>>>,
    /// Returned once the script runs dry; `None` makes that an error.
    repeat: Option<ModelResponse>,
    requests: Mutex<Vec<(Vec<ChatMessage>, Vec<String>)>>,
}

impl ScriptedGateway {
    pub(crate) fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with the same response.
    pub(crate) fn repeating(response: ModelResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(Vec::new())
        }
    }

    /// Fails the first call with `message`.
    pub(crate) fn failing(message: &str) -> Self {
        let gateway = Self::new(Vec::new());
        gateway
            .script
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.to_string())));
        gateway
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Messages sent on the `index`-th call.
    pub(crate) fn request(&self, index: usize) -> Vec<ChatMessage> {
        self.requests.lock().unwrap()[index].0.clone()
    }

    /// Tool names offered on the `index`-th call.
    pub(crate) fn offered_tools(&self, index: usize) -> Vec<String> {
        self.requests.lock().unwrap()[index].1.clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push((
            messages.to_vec(),
            tools.iter().map(|t| t.name.clone()).collect(),
        ));

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => match &self.repeat {
                Some(response) => Ok(response.clone()),
                None => anyhow::bail!("scripted gateway exhausted"),
            },
        }
    }
}
