use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Base URL for the OpenAI-compatible chat completion API (e.g., https://api.openai.com/v1)
    #[arg(long, env = "CHAT_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub chat_base_url: String,

    /// API Key for the chat completion provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Timeout in seconds for upstream completion calls. Also caps the total
    /// duration of a streamed response.
    #[arg(long, env = "CHAT_TIMEOUT_SECS", default_value = "120")]
    pub chat_timeout_secs: u64,

    /// System prompt prepended on the first turn of a new conversation.
    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    // --- History Store Args ---
    /// Maximum number of conversations kept in the in-memory history store
    /// before the least recently used one is evicted.
    #[arg(long, env = "HISTORY_MAX_CONVERSATIONS", default_value = "1024")]
    pub history_max_conversations: usize,

    /// Maximum number of stored messages sent to the model as conversation context.
    #[arg(long, env = "HISTORY_CONTEXT_LIMIT", default_value = "50")]
    pub history_context_limit: usize,

    // --- General App Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:8000")]
    pub server_addr: String,

    /// Comma-separated list of allowed CORS origins, or "*" to allow any origin.
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "http://localhost:3000")]
    pub allowed_origins: String,

    /// Enable debug output (error responses include upstream failure detail)
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
