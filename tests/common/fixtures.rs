//! Test fixtures

use llm_worker_service::{TokenizerConfig, TokenizerWrapper};
use serde_json::json;

/// Minimal chat template: one `role: content` line per message
pub const LINE_TEMPLATE: &str =
    "{% for m in messages %}{{ m.role }}: {{ m.content }}\n{% endfor %}{% if add_generation_prompt %}assistant:{% endif %}";

/// Contents served for a repository file
pub fn file_body(file: &str) -> String {
    match file {
        "tokenizer_config.json" => json!({
            "chat_template": LINE_TEMPLATE,
            "bos_token": "<s>",
            "eos_token": "</s>",
        })
        .to_string(),
        f if f.ends_with(".json") => "{}".to_string(),
        f => format!("weights of {}", f),
    }
}

/// Server-sent event body of a streamed completion
pub fn completion_sse(deltas: &[&str], usage: (u64, u64)) -> String {
    let mut body = String::new();
    for delta in deltas {
        let chunk = json!({"choices": [{"index": 0, "text": delta}]});
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    let usage = json!({
        "choices": [],
        "usage": {"prompt_tokens": usage.0, "completion_tokens": usage.1},
    });
    body.push_str(&format!("data: {}\n\ndata: [DONE]\n\n", usage));
    body
}

/// Tokenizer with [`LINE_TEMPLATE`]
pub fn templated_tokenizer() -> TokenizerWrapper {
    TokenizerWrapper::from_config(
        TokenizerConfig::default().with_chat_template(LINE_TEMPLATE),
        None,
    )
}

/// Tokenizer without any chat template
pub fn plain_tokenizer() -> TokenizerWrapper {
    TokenizerWrapper::from_config(TokenizerConfig::default(), None)
}
