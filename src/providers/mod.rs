//! Provider subsystem for model inference backends.
//!
//! Each backend implements the [`Provider`] trait defined in [`traits`] and is
//! registered in [`create_provider`] by its canonical string key.

pub mod compatible;
pub mod echo;
pub mod traits;

pub use compatible::OpenAiCompatibleProvider;
pub use echo::EchoProvider;
pub use traits::{ChatMessage, CompletionRequest, ModelOptions, Provider, ServiceError};

const MAX_API_ERROR_CHARS: usize = 200;
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts tokens with prefixes like `sk-`, `ghp_`, and `github_pat_`.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 4] = ["sk-", "ghp_", "github_pat_", "Bearer "];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        while let Some(rel) = scrubbed[search_from..].find(prefix) {
            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized [`ServiceError`] from a failed HTTP response.
pub async fn api_error(response: reqwest::Response) -> ServiceError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let message = sanitize_api_error(body.trim());

    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => ServiceError::Auth {
            status: status.as_u16(),
            message,
        },
        _ => ServiceError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Resolve API key for a provider from config and environment variables.
fn resolve_provider_credential(name: &str, credential_override: Option<&str>) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    let provider_env_candidates: &[&str] = match name {
        "openai" => &["OPENAI_API_KEY"],
        _ => &[],
    };

    for env_var in provider_env_candidates
        .iter()
        .chain(["PERSONACHAT_API_KEY", "API_KEY"].iter())
    {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Factory: create the right provider from config.
///
/// `api_url` overrides the base URL of HTTP providers.
pub fn create_provider(
    name: &str,
    api_key: Option<&str>,
    api_url: Option<&str>,
) -> anyhow::Result<Box<dyn Provider>> {
    let name = name.trim();

    if let Some(url) = name.strip_prefix("custom:") {
        if url.trim().is_empty() {
            anyhow::bail!("custom provider requires a base URL, e.g. custom:http://localhost:8000/v1");
        }
        let key = resolve_provider_credential("custom", api_key);
        return Ok(Box::new(OpenAiCompatibleProvider::new(
            "Custom",
            url.trim(),
            key.as_deref(),
        )));
    }

    match name.to_ascii_lowercase().as_str() {
        "openai" => {
            let key = resolve_provider_credential("openai", api_key);
            Ok(Box::new(OpenAiCompatibleProvider::new(
                "OpenAI",
                api_url.unwrap_or(OPENAI_BASE_URL),
                key.as_deref(),
            )))
        }
        "echo" | "offline" => Ok(Box::new(EchoProvider)),
        _ => anyhow::bail!(
            "Unknown provider: {name}. Supported: openai, echo, custom:<URL>."
        ),
    }
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"openai"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Alternative names accepted in config
    pub aliases: &'static [&'static str],
    /// Whether the provider runs locally (no API key required)
    pub local: bool,
}

/// Return the list of all known providers for display.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI",
            aliases: &[],
            local: false,
        },
        ProviderInfo {
            name: "echo",
            display_name: "Offline echo (no model calls)",
            aliases: &["offline"],
            local: true,
        },
    ]
}
