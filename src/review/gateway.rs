#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Boundary to the text-generation service that writes the reviews.

use std::{future::Future, time::Duration};

use anyhow::{Context, Result};
use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
};
use reqwest::Client;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::config::{OpenAiEnv, TokenLimitField};

/// One review to perform.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ReviewRequest {
    /// System instructions for the reviewer.
    #[builder(setter(into))]
    pub system_instructions: String,
    /// Problem statement the code is meant to solve.
    #[builder(setter(into))]
    pub problem:             String,
    /// Student code.
    #[builder(setter(into))]
    pub code:                String,
    /// Rendered user message that carries `problem` and `code`.
    #[builder(setter(into))]
    pub user_message:        String,
    /// Sampling temperature.
    #[builder(default = 0.7)]
    pub temperature:         f32,
    /// Maximum number of output tokens.
    #[builder(default = 2000)]
    pub max_tokens:          u32,
}

/// Why a review could not be obtained.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Transport, API, or request construction error.
    #[error("review service error: {0}")]
    Service(#[from] OpenAIError),
    /// No answer within the configured timeout.
    #[error("review service did not answer within {0:?}")]
    Timeout(Duration),
    /// The answer carried no text.
    #[error("review service returned no content")]
    EmptyResponse,
    /// Any other failure, eg. a test double refusing a request.
    #[error("{0}")]
    Other(String),
}

/// Something that turns a [`ReviewRequest`] into review text.
///
/// Streaming is never requested: an implementation returns the whole text.
pub trait ReviewGateway: Send + Sync {
    /// Performs one review.
    fn review(
        &self,
        request: &ReviewRequest,
    ) -> impl Future<Output = Result<String, ReviewError>> + Send;
}

/// [`ReviewGateway`] backed by an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiGateway {
    /// API client.
    client:      OpenAIClient<OpenAIConfig>,
    /// Model identifier.
    model:       String,
    /// Request field the token limit is sent in.
    token_limit: TokenLimitField,
    /// Per-request timeout.
    timeout:     Duration,
}

impl OpenAiGateway {
    /// Builds a client from injected service settings.
    pub fn new(env: &OpenAiEnv) -> Result<Self> {
        let http_client = Client::builder()
            .no_proxy()
            .timeout(env.timeout())
            .build()
            .context("Failed to construct HTTP client for the review service")?;

        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(env.api_base().to_owned())
                .with_api_key(env.api_key().to_owned()),
        )
        .with_http_client(http_client);

        Ok(Self {
            client,
            model: env.model().to_owned(),
            token_limit: env.token_limit(),
            timeout: env.timeout(),
        })
    }

    /// Builds the non-streaming chat completion body for `request`.
    #[allow(deprecated)]
    fn chat_request(
        &self,
        request: &ReviewRequest,
    ) -> Result<CreateChatCompletionRequest, ReviewError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_instructions.clone())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user_message.clone())
                .build()?
                .into(),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .stream(false);
        match self.token_limit {
            TokenLimitField::MaxTokens => args.max_tokens(request.max_tokens),
            TokenLimitField::MaxCompletionTokens => args.max_completion_tokens(request.max_tokens),
        };

        Ok(args.build()?)
    }

    /// Sends the request and returns the first choice's text.
    async fn complete(&self, request: &ReviewRequest) -> Result<String, ReviewError> {
        let body = self.chat_request(request)?;
        let response = self.client.chat().create(body).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ReviewError::EmptyResponse)
    }
}

impl ReviewGateway for OpenAiGateway {
    async fn review(&self, request: &ReviewRequest) -> Result<String, ReviewError> {
        tokio::time::timeout(self.timeout, self.complete(request))
            .await
            .map_err(|_| ReviewError::Timeout(self.timeout))?
    }
}
