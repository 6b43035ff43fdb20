//! Tokenizer wrapper and chat template formatter
//!
//! Only the parts of a tokenizer needed for prompt formatting are loaded:
//! the chat template and the special tokens templates refer to. Templates are
//! Jinja and are rendered with `minijinja` plus the Python string methods
//! Hugging Face templates rely on.

use llm_worker_core::{ChatMessage, PromptInput};
use minijinja::{context, Environment, ErrorKind};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};

/// Tokenizer configuration file name
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

/// Standalone chat template file name
pub const CHAT_TEMPLATE_FILE: &str = "chat_template.jinja";

/// Fallback used to format a single string when the model ships no template
pub const CHATML_TEMPLATE: &str = r"{% for message in messages %}{{ '<|im_start|>' + message['role'] + '\n' + message['content'] + '<|im_end|>' + '\n' }}{% endfor %}{% if add_generation_prompt %}{{ '<|im_start|>assistant\n' }}{% endif %}";

/// Subset of `tokenizer_config.json` used for formatting
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    chat_template: Option<ChatTemplateField>,
    #[serde(default)]
    bos_token: Option<SpecialToken>,
    #[serde(default)]
    eos_token: Option<SpecialToken>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ChatTemplateField {
    Single(String),
    Named(Vec<NamedTemplate>),
}

#[derive(Debug, Clone, Deserialize)]
struct NamedTemplate {
    name: String,
    template: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SpecialToken {
    Text(String),
    Added { content: String },
}

impl SpecialToken {
    fn content(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Added { content } => content,
        }
    }
}

impl TokenizerConfig {
    /// Parse a `tokenizer_config.json` document
    pub fn from_json(json: &str) -> ServiceResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ServiceError::Tokenizer(format!("Invalid {}: {}", TOKENIZER_CONFIG_FILE, e)))
    }

    /// Replace the chat template
    pub fn with_chat_template(mut self, template: impl Into<String>) -> Self {
        self.chat_template = Some(ChatTemplateField::Single(template.into()));
        self
    }

    /// The model's chat template, if any
    ///
    /// When the config lists named templates the `default` one is used.
    pub fn chat_template(&self) -> Option<&str> {
        let template = match self.chat_template.as_ref()? {
            ChatTemplateField::Single(template) => template.as_str(),
            ChatTemplateField::Named(templates) => templates
                .iter()
                .find(|t| t.name == "default")
                .map(|t| t.template.as_str())?,
        };
        Some(template).filter(|t| !t.is_empty())
    }

    pub fn bos_token(&self) -> &str {
        self.bos_token.as_ref().map(SpecialToken::content).unwrap_or("")
    }

    pub fn eos_token(&self) -> &str {
        self.eos_token.as_ref().map(SpecialToken::content).unwrap_or("")
    }
}

/// Formats job input into a single prompt string
///
/// State is fixed at construction: whether a chat template exists never
/// changes for the lifetime of the wrapper.
#[derive(Debug, Clone)]
pub struct TokenizerWrapper {
    config: TokenizerConfig,
    custom_chat_template: Option<String>,
    has_chat_template: bool,
}

impl TokenizerWrapper {
    /// Load from a local tokenizer directory
    ///
    /// Reads `tokenizer_config.json` and, when present, `chat_template.jinja`,
    /// which takes precedence over the template embedded in the config.
    pub fn load(
        path: &Path,
        revision: Option<&str>,
        custom_chat_template: Option<String>,
    ) -> ServiceResult<Self> {
        info!(
            "tokenizer_name_or_path: {}, tokenizer_revision: {}",
            path.display(),
            revision.unwrap_or("main")
        );

        let config_path = path.join(TOKENIZER_CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(json) => TokenizerConfig::from_json(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No {} in {}", TOKENIZER_CONFIG_FILE, path.display());
                TokenizerConfig::default()
            }
            Err(e) => {
                return Err(ServiceError::Tokenizer(format!(
                    "Cannot read {}: {}",
                    config_path.display(),
                    e
                )))
            }
        };

        let template_path = path.join(CHAT_TEMPLATE_FILE);
        if template_path.is_file() {
            let template = std::fs::read_to_string(&template_path).map_err(|e| {
                ServiceError::Tokenizer(format!("Cannot read {}: {}", template_path.display(), e))
            })?;
            config = config.with_chat_template(template);
        }

        Ok(Self::from_config(config, custom_chat_template))
    }

    /// Build from an already parsed configuration
    pub fn from_config(config: TokenizerConfig, custom_chat_template: Option<String>) -> Self {
        let custom_chat_template = custom_chat_template.filter(|t| !t.is_empty());
        let has_chat_template = config.chat_template().is_some() || custom_chat_template.is_some();
        Self {
            config,
            custom_chat_template,
            has_chat_template,
        }
    }

    /// True if the tokenizer ships a template or an override was supplied
    pub fn has_chat_template(&self) -> bool {
        self.has_chat_template
    }

    /// Format raw JSON input (a string or a message list)
    pub fn apply_chat_template(&self, input: &Value) -> ServiceResult<String> {
        let input = PromptInput::parse(input).map_err(ServiceError::InvalidInput)?;
        self.apply(&input)
    }

    /// Format validated input, appending the generation prompt
    pub fn apply(&self, input: &PromptInput) -> ServiceResult<String> {
        let messages = match input {
            PromptInput::Messages(messages) => {
                if !self.has_chat_template {
                    return Err(ServiceError::NoChatTemplate);
                }
                messages.clone()
            }
            PromptInput::Text(text) => vec![ChatMessage::user(text.as_str())],
        };
        self.render(&messages)
    }

    fn template(&self) -> &str {
        self.custom_chat_template
            .as_deref()
            .or_else(|| self.config.chat_template())
            .unwrap_or(CHATML_TEMPLATE)
    }

    fn render(&self, messages: &[ChatMessage]) -> ServiceResult<String> {
        let mut env = Environment::new();
        minijinja_contrib::add_to_environment(&mut env);
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        env.add_function("raise_exception", raise_exception);

        let template = env.template_from_str(self.template())?;
        let prompt = template.render(context! {
            messages => messages,
            add_generation_prompt => true,
            bos_token => self.config.bos_token(),
            eos_token => self.config.eos_token(),
        })?;
        Ok(prompt)
    }
}

fn raise_exception(message: String) -> Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, message))
}
