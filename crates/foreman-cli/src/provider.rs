use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use foreman_config::{Config, ProviderConfig};
#[allow(deprecated)]
use rig::client::completion::CompletionModelHandle;
use rig::client::{CompletionClient, Nothing};
use rig::providers::{anthropic, deepseek, gemini, groq, mistral, ollama, openai, openrouter};

const VALID_PROVIDERS: &str =
    "anthropic, openai, ollama, openrouter, deepseek, groq, gemini, mistral";

/// Config key first, then the provider's environment variable.
pub fn resolve_api_key(provider_cfg: Option<&ProviderConfig>, env_var: &str) -> Option<String> {
    provider_cfg
        .and_then(|c| c.api_key.clone())
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|k| !k.is_empty()))
}

fn api_base(provider_cfg: Option<&ProviderConfig>) -> Option<String> {
    provider_cfg
        .and_then(|c| c.api_base.clone())
        .filter(|b| !b.is_empty())
}

fn require_key(config: &Config, provider: &str, label: &str, env_var: &str) -> Result<String> {
    resolve_api_key(config.provider(provider), env_var).ok_or_else(|| {
        anyhow!(
            "{label} provider selected but no API key found. \
             Set providers.{provider}.apiKey in config.json or {env_var} env var."
        )
    })
}

/// Create the completion model named by `agent.provider` / `agent.model`.
#[allow(deprecated)]
pub fn create_model(config: &Config) -> Result<CompletionModelHandle<'static>> {
    let provider = config.agent.provider.as_str();
    let model_name = config.agent.model.as_str();

    if provider.is_empty() {
        bail!("No provider configured.\nValid providers: {VALID_PROVIDERS}");
    }
    if model_name.is_empty() {
        bail!("No model configured for provider '{provider}'.");
    }

    let handle = match provider {
        "openai" => {
            let key = require_key(config, "openai", "OpenAI", "OPENAI_API_KEY")?;
            let mut builder = openai::CompletionsClient::builder().api_key(&key);
            if let Some(base) = api_base(config.provider("openai")) {
                tracing::info!("Using OpenAI provider with custom base: {base}");
                builder = builder.base_url(&base);
            }
            let client: openai::CompletionsClient = builder
                .build()
                .map_err(|e| anyhow!("Failed to create OpenAI client: {e}"))?;
            CompletionModelHandle::new(Arc::new(client.completion_model(model_name)))
        }

        "anthropic" => {
            let key = require_key(config, "anthropic", "Anthropic", "ANTHROPIC_API_KEY")?;
            let client: anthropic::Client = anthropic::Client::builder()
                .api_key(&key)
                .build()
                .map_err(|e| anyhow!("Failed to create Anthropic client: {e}"))?;
            let model = client.completion_model(model_name).with_prompt_caching();
            CompletionModelHandle::new(Arc::new(model))
        }

        "ollama" => {
            let mut builder = ollama::Client::builder().api_key(Nothing);
            if let Some(base) = api_base(config.provider("ollama")) {
                builder = builder.base_url(&base);
            }
            let client: ollama::Client = builder
                .build()
                .map_err(|e| anyhow!("Failed to create Ollama client: {e}"))?;
            CompletionModelHandle::new(Arc::new(client.completion_model(model_name)))
        }

        "openrouter" => {
            let key = require_key(config, "openrouter", "OpenRouter", "OPENROUTER_API_KEY")?;
            let client: openrouter::Client = openrouter::Client::new(&key)
                .map_err(|e| anyhow!("Failed to create OpenRouter client: {e}"))?;
            CompletionModelHandle::new(Arc::new(client.completion_model(model_name)))
        }

        "deepseek" => {
            let key = require_key(config, "deepseek", "DeepSeek", "DEEPSEEK_API_KEY")?;
            let client: deepseek::Client = deepseek::Client::new(&key)
                .map_err(|e| anyhow!("Failed to create DeepSeek client: {e}"))?;
            CompletionModelHandle::new(Arc::new(client.completion_model(model_name)))
        }

        "groq" => {
            let key = require_key(config, "groq", "Groq", "GROQ_API_KEY")?;
            let client: groq::Client = groq::Client::new(&key)
                .map_err(|e| anyhow!("Failed to create Groq client: {e}"))?;
            CompletionModelHandle::new(Arc::new(client.completion_model(model_name)))
        }

        "gemini" => {
            let key = require_key(config, "gemini", "Gemini", "GEMINI_API_KEY")?;
            let client: gemini::Client = gemini::Client::new(key)
                .map_err(|e| anyhow!("Failed to create Gemini client: {e}"))?;
            CompletionModelHandle::new(Arc::new(client.completion_model(model_name)))
        }

        "mistral" => {
            let key = require_key(config, "mistral", "Mistral", "MISTRAL_API_KEY")?;
            let client: mistral::Client = mistral::Client::new(&key)
                .map_err(|e| anyhow!("Failed to create Mistral client: {e}"))?;
            CompletionModelHandle::new(Arc::new(client.completion_model(model_name)))
        }

        other => bail!("Unknown provider '{other}'. Valid providers: {VALID_PROVIDERS}"),
    };

    tracing::info!("Using {provider} provider with model '{model_name}'");
    Ok(handle)
}
