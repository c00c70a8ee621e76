#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt, path::Path, str::FromStr, sync::LazyLock, time::Duration};

use anyhow::{Context, Result, bail, ensure};
use regex::{Captures, Regex};

/// Default sampling temperature for reviews.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default output token limit for reviews.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Default per-request timeout for reviews, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Request field that carries the output token limit.
///
/// Chat completion endpoints disagree on the name: OpenAI reasoning models
/// only accept `max_completion_tokens`, while many compatible endpoints
/// (DashScope among them) only read `max_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenLimitField {
    /// `max_tokens`.
    #[default]
    MaxTokens,
    /// `max_completion_tokens`.
    MaxCompletionTokens,
}

impl FromStr for TokenLimitField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max_tokens" => Ok(Self::MaxTokens),
            "max_completion_tokens" => Ok(Self::MaxCompletionTokens),
            other => bail!(
                "Unknown token limit field `{other}`, expected `max_tokens` or \
                 `max_completion_tokens`"
            ),
        }
    }
}

/// Review service settings, injected into the gateway.
#[derive(Clone)]
pub struct OpenAiEnv {
    /// Base URL of the OpenAI-compatible endpoint.
    api_base:    String,
    /// API key.
    api_key:     String,
    /// Model identifier.
    model:       String,
    /// Sampling temperature.
    temperature: f32,
    /// Output token limit.
    max_tokens:  u32,
    /// Request field the limit is sent in.
    token_limit: TokenLimitField,
    /// Per-request timeout.
    timeout:     Duration,
}

impl OpenAiEnv {
    /// Creates settings with default tuning values.
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_base:    api_base.into(),
            api_key:     api_key.into(),
            model:       model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens:  DEFAULT_MAX_TOKENS,
            token_limit: TokenLimitField::default(),
            timeout:     Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Overrides the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Overrides the output token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Overrides the request field the token limit is sent in.
    pub fn with_token_limit(mut self, token_limit: TokenLimitField) -> Self {
        self.token_limit = token_limit;
        self
    }

    /// Overrides the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads settings from the environment.
    ///
    /// `OPENAI_ENDPOINT`, `OPENAI_API_KEY` and `OPENAI_MODEL` are required;
    /// `OPENAI_TEMPERATURE`, `OPENAI_MAX_TOKENS`, `OPENAI_TOKEN_LIMIT_FIELD`
    /// and `REVIEW_TIMEOUT_SECS` fall back to their defaults when unset or
    /// unparsable.
    pub fn from_env() -> Result<Self> {
        let required = ["OPENAI_ENDPOINT", "OPENAI_API_KEY", "OPENAI_MODEL"];
        let values = required.map(|name| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        });

        let missing: Vec<&str> = required
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            bail!("Missing review service settings: {}", missing.join(", "));
        }

        let [Some(api_base), Some(api_key), Some(model)] = values else {
            bail!("Missing review service settings");
        };

        Ok(Self::new(api_base, api_key, model)
            .with_temperature(read_env("OPENAI_TEMPERATURE", DEFAULT_TEMPERATURE))
            .with_max_tokens(read_env("OPENAI_MAX_TOKENS", DEFAULT_MAX_TOKENS))
            .with_token_limit(read_env("OPENAI_TOKEN_LIMIT_FIELD", TokenLimitField::default()))
            .with_timeout(Duration::from_secs(read_env(
                "REVIEW_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            ))))
    }

    /// Returns the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Returns the API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Returns the output token limit.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Returns the request field the token limit is sent in.
    pub fn token_limit(&self) -> TokenLimitField {
        self.token_limit
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for OpenAiEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEnv")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("token_limit", &self.token_limit)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Placeholders understood by the user message template.
static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{(problem|code|language)\}").ok());

/// System instructions and user message template for reviews.
#[derive(Debug, Clone)]
pub struct ReviewPrompts {
    /// System instructions.
    system_message: String,
    /// User message template with `{problem}`, `{code}` and `{language}`.
    user_template:  String,
}

impl ReviewPrompts {
    /// Loads the built-in prompts.
    pub fn load() -> Self {
        Self {
            system_message: include_str!("prompts/system_message.md").to_string(),
            user_template:  include_str!("prompts/user_message.md").to_string(),
        }
    }

    /// Replaces the user message template.
    ///
    /// The template must contain both `{problem}` and `{code}`.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in ["{problem}", "{code}"] {
            ensure!(
                template.contains(placeholder),
                "Review template is missing the `{placeholder}` placeholder"
            );
        }
        self.user_template = template;
        Ok(self)
    }

    /// Replaces the user message template with the contents of `path`.
    pub fn from_template_file(path: &Path) -> Result<Self> {
        let template = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read review template {}", path.display()))?;
        Self::load()
            .with_template(template)
            .with_context(|| format!("Invalid review template {}", path.display()))
    }

    /// Returns the system instructions.
    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    /// Returns the user message template.
    pub fn user_template(&self) -> &str {
        &self.user_template
    }

    /// Fills the user message template.
    ///
    /// Substitution is a single pass, so placeholder-like text inside the
    /// problem or the code is left alone.
    pub fn render_user_message(&self, problem: &str, code: &str, language: &str) -> String {
        let Some(placeholder) = PLACEHOLDER.as_ref() else {
            return self
                .user_template
                .replace("{problem}", problem)
                .replace("{code}", code)
                .replace("{language}", language);
        };

        placeholder
            .replace_all(&self.user_template, |caps: &Captures| match &caps[1] {
                "problem" => problem.to_string(),
                "code" => code.to_string(),
                _ => language.to_string(),
            })
            .into_owned()
    }
}

/// Parses an environment variable, falling back to `default` when it is
/// missing or unparsable.
fn read_env<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let env = OpenAiEnv::new("http://localhost", "sk-secret", "m");
        assert!(!format!("{env:?}").contains("sk-secret"));
    }

    #[test]
    fn token_limit_field_parses_both_names() {
        assert_eq!(
            "max_tokens".parse::<TokenLimitField>().ok(),
            Some(TokenLimitField::MaxTokens)
        );
        assert_eq!(
            " MAX_COMPLETION_TOKENS ".parse::<TokenLimitField>().ok(),
            Some(TokenLimitField::MaxCompletionTokens)
        );
        assert!("tokens".parse::<TokenLimitField>().is_err());

        let env = OpenAiEnv::new("http://localhost", "k", "m");
        assert_eq!(env.token_limit(), TokenLimitField::MaxTokens);
        let env = env.with_token_limit(TokenLimitField::MaxCompletionTokens);
        assert_eq!(env.token_limit(), TokenLimitField::MaxCompletionTokens);
    }

    #[test]
    fn builtin_template_has_placeholders() {
        let prompts = ReviewPrompts::load();
        for placeholder in ["{problem}", "{code}", "{language}"] {
            assert!(prompts.user_template().contains(placeholder));
        }
        let message = prompts.render_user_message("Add two numbers", "int main(){}", "c");
        assert!(message.contains("Add two numbers"));
        assert!(message.contains("```c\nint main(){}\n```"));
    }
}
