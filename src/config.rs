use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for a single inbound request (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Retry policy for transient gateway failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub attempts: usize,
    #[serde(default = "default_retry_min_delay")]
    pub min_delay_ms: u64,
    #[serde(default = "default_retry_max_delay")]
    pub max_delay_ms: u64,
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_min_delay() -> u64 {
    100
}

fn default_retry_max_delay() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            min_delay_ms: default_retry_min_delay(),
            max_delay_ms: default_retry_max_delay(),
        }
    }
}

/// Connection settings shared by every HTTP gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL; empty means the gateway is not configured
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
    /// Environment variable holding a bearer token
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_gateway_timeout() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_gateway_timeout(),
            token_env: None,
            retry: RetryConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Resolve the bearer token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        let name = self.token_env.as_deref()?;
        match std::env::var(name) {
            Ok(token) if !token.is_empty() => Some(token),
            _ => {
                tracing::warn!(
                    env_var = name,
                    "Gateway token environment variable is not set or empty"
                );
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    #[serde(default = "default_generate_questions_endpoint")]
    pub generate_questions_endpoint: String,
    #[serde(default = "default_validate_answers_endpoint")]
    pub validate_answers_endpoint: String,
    #[serde(default = "default_generate_summary_endpoint")]
    pub generate_summary_endpoint: String,
    #[serde(default = "default_validate_draft_endpoint")]
    pub validate_draft_endpoint: String,
    #[serde(default = "default_generate_draft_summary_endpoint")]
    pub generate_draft_summary_endpoint: String,
}

fn default_generate_questions_endpoint() -> String {
    "/generate-questions".to_string()
}

fn default_validate_answers_endpoint() -> String {
    "/validate-answers".to_string()
}

fn default_generate_summary_endpoint() -> String {
    "/generate-summary".to_string()
}

fn default_validate_draft_endpoint() -> String {
    "/validate-draft".to_string()
}

fn default_generate_draft_summary_endpoint() -> String {
    "/generate-draft-summary".to_string()
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            generate_questions_endpoint: default_generate_questions_endpoint(),
            validate_answers_endpoint: default_validate_answers_endpoint(),
            generate_summary_endpoint: default_generate_summary_endpoint(),
            validate_draft_endpoint: default_validate_draft_endpoint(),
            generate_draft_summary_endpoint: default_generate_draft_summary_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    #[serde(default = "default_context_endpoint")]
    pub context_endpoint: String,
}

fn default_context_endpoint() -> String {
    "/context".to_string()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            context_endpoint: default_context_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    #[serde(default = "default_transcribe_endpoint")]
    pub transcribe_endpoint: String,
}

fn default_transcribe_endpoint() -> String {
    "/transcribe".to_string()
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            transcribe_endpoint: default_transcribe_endpoint(),
        }
    }
}

/// Outbound callback delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_callback_timeout")]
    pub timeout_secs: u64,
    /// Environment variable holding a bearer token sent with callbacks
    #[serde(default)]
    pub token_env: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_callback_timeout() -> u64 {
    10
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_callback_timeout(),
            token_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Draft messages accepted per session (1..=50)
    #[serde(default = "default_max_draft_messages")]
    pub max_draft_messages: usize,
    #[serde(default = "default_context_top_k")]
    pub context_top_k: u32,
    #[serde(default = "default_context_max_questions")]
    pub context_max_questions: u32,
    /// Setup questions asked when no project is linked
    #[serde(default = "default_context_questions")]
    pub default_context_questions: Vec<String>,
}

fn default_max_draft_messages() -> usize {
    10
}

fn default_context_top_k() -> u32 {
    5
}

fn default_context_max_questions() -> u32 {
    10
}

fn default_context_questions() -> Vec<String> {
    vec![
        "What does your company or team do?".to_string(),
        "Who are the end users of the system?".to_string(),
        "Which systems or tools do you use today?".to_string(),
        "What constraints apply (budget, deadlines, regulations)?".to_string(),
        "How will you measure that the project succeeded?".to_string(),
    ]
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_draft_messages: default_max_draft_messages(),
            context_top_k: default_context_top_k(),
            context_max_questions: default_context_max_questions(),
            default_context_questions: default_context_questions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Actions per minute per user (1..=60)
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
    /// Bucket capacity (1..=20)
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_warning_interval")]
    pub warning_interval_secs: u64,
}

fn default_per_minute() -> u32 {
    20
}

fn default_burst() -> u32 {
    5
}

fn default_cleanup_interval() -> u64 {
    600 // 10 minutes
}

fn default_idle_ttl() -> u64 {
    3600 // 1 hour
}

fn default_warning_interval() -> u64 {
    30
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            burst: default_burst(),
            cleanup_interval_secs: default_cleanup_interval(),
            idle_ttl_secs: default_idle_ttl(),
            warning_interval_secs: default_warning_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Ceiling after which a stuck generation guard is force-reset (default: 300 = 5 min)
    #[serde(default = "default_processing_timeout")]
    pub processing_timeout_secs: u64,
    #[serde(default = "default_project_page_size")]
    pub project_page_size: usize,
}

fn default_processing_timeout() -> u64 {
    300
}

fn default_project_page_size() -> usize {
    5
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            processing_timeout_secs: default_processing_timeout(),
            project_page_size: default_project_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write logs to `<paths.state>/logs` instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_state_path")]
    pub state: String,
}

fn default_state_path() -> String {
    ".reqflow".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: default_state_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            reasoning: ReasoningConfig::default(),
            context: ContextConfig::default(),
            transcription: TranscriptionConfig::default(),
            callback: CallbackConfig::default(),
            workflow: WorkflowConfig::default(),
            rate_limit: RateLimitConfig::default(),
            navigation: NavigationConfig::default(),
            logging: LoggingConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    /// Project-local config file
    pub fn local_config_path() -> PathBuf {
        PathBuf::from("reqflow.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the service runs without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        // User config in ~/.config/reqflow/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("reqflow").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with REQFLOW_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("REQFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        let config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges, reporting every violation at once
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if !(1..=50).contains(&self.workflow.max_draft_messages) {
            errors.push(format!(
                "workflow.max_draft_messages must be between 1 and 50, got {}",
                self.workflow.max_draft_messages
            ));
        }
        if !(1..=60).contains(&self.rate_limit.per_minute) {
            errors.push(format!(
                "rate_limit.per_minute must be between 1 and 60, got {}",
                self.rate_limit.per_minute
            ));
        }
        if !(1..=20).contains(&self.rate_limit.burst) {
            errors.push(format!(
                "rate_limit.burst must be between 1 and 20, got {}",
                self.rate_limit.burst
            ));
        }
        if self.workflow.default_context_questions.is_empty() {
            errors.push("workflow.default_context_questions must not be empty".to_string());
        }
        if self.navigation.project_page_size == 0 {
            errors.push("navigation.project_page_size must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!("Invalid configuration:\n  {}", errors.join("\n  "))
        }
    }

    /// Save config to `reqflow.toml`
    pub fn save(&self) -> Result<()> {
        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(Self::local_config_path(), toml_str)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Absolute path of the state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    pub fn sessions_snapshot_path(&self) -> PathBuf {
        self.state_path().join("sessions.json")
    }

    pub fn conversations_path(&self) -> PathBuf {
        self.state_path().join("conversations.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.workflow.max_draft_messages, 10);
        assert_eq!(config.workflow.context_top_k, 5);
        assert_eq!(config.workflow.context_max_questions, 10);
        assert_eq!(config.workflow.default_context_questions.len(), 5);
        assert_eq!(config.navigation.processing_timeout_secs, 300);
    }

    #[test]
    fn test_validate_reports_all_violations() {
        let mut config = Config::default();
        config.workflow.max_draft_messages = 51;
        config.rate_limit.per_minute = 0;
        config.rate_limit.burst = 21;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("max_draft_messages"));
        assert!(message.contains("per_minute"));
        assert!(message.contains("burst"));
    }

    #[test]
    fn test_defaults_survive_json_round_trip() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.reasoning.generate_questions_endpoint,
            "/generate-questions"
        );
        assert_eq!(parsed.reasoning.gateway.retry.attempts, 3);
        assert!(parsed.context.gateway.url.is_empty());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [reasoning]
            url = "http://llm.internal"
            timeout_secs = 120

            [workflow]
            max_draft_messages = 20
            "#,
        )
        .unwrap();

        assert_eq!(parsed.reasoning.gateway.url, "http://llm.internal");
        assert_eq!(parsed.reasoning.gateway.timeout_secs, 120);
        assert_eq!(parsed.reasoning.validate_answers_endpoint, "/validate-answers");
        assert_eq!(parsed.workflow.max_draft_messages, 20);
        assert_eq!(parsed.workflow.context_top_k, 5);
        assert_eq!(parsed.server.port, 8080);
    }

    #[test]
    fn test_state_paths() {
        let mut config = Config::default();
        config.paths.state = "/var/lib/reqflow".to_string();
        assert_eq!(config.logs_path(), PathBuf::from("/var/lib/reqflow/logs"));
        assert_eq!(
            config.sessions_snapshot_path(),
            PathBuf::from("/var/lib/reqflow/sessions.json")
        );
    }
}
