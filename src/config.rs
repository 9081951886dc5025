#[cfg(feature = "cli")]
use clap::Parser;
use std::env;
use url::Url;

/// # Gateway Configuration
///
/// Comprehensive configuration system supporting command-line arguments,
/// environment variables, and .env file loading for secure configuration management.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", command(name = "knowledge-gateway"))]
#[cfg_attr(feature = "cli", command(about = "A federated query gateway that fans out natural-language questions across organizational knowledge services"))]
#[cfg_attr(feature = "cli", command(version))]
pub struct Config {
    // =============================================================================
    // CORE SERVER CONFIGURATION
    // =============================================================================

    /// Server port to listen on
    #[cfg_attr(feature = "cli", arg(short, long, env = "PORT", default_value = "8080"))]
    pub port: u16,

    /// Server host to bind to
    #[cfg_attr(feature = "cli", arg(long, env = "HOST", default_value = "0.0.0.0"))]
    pub host: String,

    // =============================================================================
    // LLM BACKEND CONFIGURATION (consumed by the RAG Assembler's LlmClient)
    // =============================================================================

    /// LLM backend URL (OpenAI-compatible completion endpoint)
    #[cfg_attr(feature = "cli", arg(long, env = "LLM_URL", default_value = "direct"))]
    pub llm_url: String,

    /// Default model ID to use
    #[cfg_attr(feature = "cli", arg(long, env = "LLM_MODEL", default_value = "gpt-3.5-turbo"))]
    pub llm_model: String,

    /// Authentication token for the LLM backend
    #[cfg_attr(feature = "cli", arg(long, env = "LLM_TOKEN"))]
    pub llm_token: Option<String>,

    // =============================================================================
    // PERFORMANCE AND OPTIMIZATION
    // =============================================================================

    /// HTTP client timeout in seconds
    #[cfg_attr(feature = "cli", arg(long, env = "HTTP_CLIENT_TIMEOUT", default_value = "30"))]
    pub http_client_timeout: u64,

    /// Maximum connections per host
    #[cfg_attr(feature = "cli", arg(long, env = "HTTP_CLIENT_MAX_CONNECTIONS_PER_HOST", default_value = "10"))]
    pub http_client_max_connections_per_host: usize,

    // =============================================================================
    // FEATURE FLAGS
    // =============================================================================

    /// Enable streaming chat responses
    #[cfg_attr(feature = "cli", arg(long, env = "ENABLE_STREAMING", default_value = "true"))]
    pub enable_streaming: bool,

    /// Enable rate limiting on outbound service calls
    #[cfg_attr(feature = "cli", arg(long, env = "ENABLE_RATE_LIMITING", default_value = "true"))]
    pub enable_rate_limiting: bool,

    /// Enable the multi-layer cache on outbound service calls
    #[cfg_attr(feature = "cli", arg(long, env = "ENABLE_CACHING", default_value = "true"))]
    pub enable_caching: bool,

    /// Enable metrics collection
    #[cfg_attr(feature = "cli", arg(long, env = "ENABLE_METRICS", default_value = "true"))]
    pub enable_metrics: bool,

    // =============================================================================
    // LOGGING AND MONITORING
    // =============================================================================

    /// Log level (error, warn, info, debug, trace)
    #[cfg_attr(feature = "cli", arg(long, env = "RUST_LOG", default_value = "info"))]
    pub log_level: String,

    /// Enable backtrace on panic
    #[cfg_attr(feature = "cli", arg(long, env = "RUST_BACKTRACE"))]
    pub rust_backtrace: Option<String>,

    /// Environment (development, staging, production)
    #[cfg_attr(feature = "cli", arg(long, env = "ENVIRONMENT", default_value = "development"))]
    pub environment: String,

    // =============================================================================
    // SECURITY CONFIGURATION
    // =============================================================================

    /// CORS origin (use * for development only)
    #[cfg_attr(feature = "cli", arg(long, env = "CORS_ORIGIN", default_value = "*"))]
    pub cors_origin: String,

    // =============================================================================
    // RATE LIMITER DEFAULTS (per outbound service, see rate_limiter.rs)
    // =============================================================================

    /// Requests permitted per sliding window
    #[cfg_attr(feature = "cli", arg(long, env = "RATE_LIMIT_REQUESTS_PER_WINDOW", default_value = "100"))]
    pub rate_limit_requests_per_window: u32,

    /// Sliding window width in seconds
    #[cfg_attr(feature = "cli", arg(long, env = "RATE_LIMIT_WINDOW_SECONDS", default_value = "60"))]
    pub rate_limit_window_seconds: u64,

    /// Token bucket burst capacity
    #[cfg_attr(feature = "cli", arg(long, env = "RATE_LIMIT_BURST_SIZE", default_value = "10"))]
    pub rate_limit_burst_size: u32,

    // =============================================================================
    // CIRCUIT BREAKER DEFAULTS (per outbound service, see circuit_breaker.rs)
    // =============================================================================

    /// Consecutive failures in CLOSED before opening
    #[cfg_attr(feature = "cli", arg(long, env = "CIRCUIT_FAILURE_THRESHOLD", default_value = "5"))]
    pub circuit_failure_threshold: u32,

    /// Consecutive successes in HALF_OPEN before closing
    #[cfg_attr(feature = "cli", arg(long, env = "CIRCUIT_SUCCESS_THRESHOLD", default_value = "3"))]
    pub circuit_success_threshold: u32,

    /// Seconds OPEN must elapse before a HALF_OPEN probe is allowed
    #[cfg_attr(feature = "cli", arg(long, env = "CIRCUIT_TIMEOUT_SECONDS", default_value = "30"))]
    pub circuit_timeout_seconds: u64,

    // =============================================================================
    // CACHE DEFAULTS (see cache.rs)
    // =============================================================================

    /// L1 in-process LRU capacity, entries
    #[cfg_attr(feature = "cli", arg(long, env = "CACHE_L1_MAX_ENTRIES", default_value = "500"))]
    pub cache_l1_max_entries: usize,

    /// L1 TTL in seconds
    #[cfg_attr(feature = "cli", arg(long, env = "CACHE_L1_TTL_SECONDS", default_value = "300"))]
    pub cache_l1_ttl_seconds: u64,

    /// L2 TTL in seconds
    #[cfg_attr(feature = "cli", arg(long, env = "CACHE_L2_TTL_SECONDS", default_value = "3600"))]
    pub cache_l2_ttl_seconds: u64,

    // =============================================================================
    // CHUNKER DEFAULTS (see chunker.rs)
    // =============================================================================

    /// Maximum estimated tokens per chunk
    #[cfg_attr(feature = "cli", arg(long, env = "CHUNK_MAX_SIZE", default_value = "512"))]
    pub chunk_max_size: usize,

    /// Minimum estimated tokens per chunk
    #[cfg_attr(feature = "cli", arg(long, env = "CHUNK_MIN_SIZE", default_value = "100"))]
    pub chunk_min_size: usize,

    /// Overlap (estimated tokens) carried across chunk boundaries
    #[cfg_attr(feature = "cli", arg(long, env = "CHUNK_OVERLAP", default_value = "50"))]
    pub chunk_overlap: usize,

    /// Maximum chunks produced per document
    #[cfg_attr(feature = "cli", arg(long, env = "CHUNK_MAX_PER_DOC", default_value = "20"))]
    pub chunk_max_per_doc: usize,

    // =============================================================================
    // ORCHESTRATOR DEFAULTS (see orchestrator.rs)
    // =============================================================================

    /// Maximum services dispatched concurrently
    #[cfg_attr(feature = "cli", arg(long, env = "ORCHESTRATOR_MAX_PARALLEL", default_value = "10"))]
    pub orchestrator_max_parallel: usize,

    /// Per-service timeout in seconds
    #[cfg_attr(feature = "cli", arg(long, env = "ORCHESTRATOR_SERVICE_TIMEOUT_SECONDS", default_value = "10"))]
    pub orchestrator_service_timeout_seconds: u64,

    // =============================================================================
    // RAG ASSEMBLER DEFAULTS (see rag/assembler.rs, rag/security.rs)
    // =============================================================================

    /// Chat turns of history included in prompt assembly
    #[cfg_attr(feature = "cli", arg(long, env = "RAG_HISTORY_TURNS", default_value = "5"))]
    pub rag_history_turns: usize,

    /// Top-K ranked records included as evidence
    #[cfg_attr(feature = "cli", arg(long, env = "RAG_EVIDENCE_TOP_K", default_value = "5"))]
    pub rag_evidence_top_k: usize,

    /// Maximum characters of a query accepted before the security preflight rejects it
    #[cfg_attr(feature = "cli", arg(long, env = "RAG_QUERY_MAX_LENGTH", default_value = "10000"))]
    pub rag_query_max_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_test()
    }
}

impl Config {
    /// Parse configuration from command line arguments and environment variables.
    ///
    /// Loads a `.env` file if present, parses CLI args, sets up logging, then
    /// validates — exiting the process on a hard validation failure.
    #[cfg(feature = "cli")]
    pub fn parse_args() -> Self {
        let _ = dotenv::dotenv();

        let config = Self::parse();
        config.setup_logging();

        if let Err(err) = config.validate() {
            eprintln!("Configuration validation failed: {}", err);
            std::process::exit(1);
        }

        config
    }

    /// Create a test configuration with minimal required fields.
    /// This is used for testing purposes only.
    pub fn for_test() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            llm_url: "direct".to_string(),
            llm_model: "gpt-3.5-turbo".to_string(),
            llm_token: None,
            http_client_timeout: 30,
            http_client_max_connections_per_host: 10,
            enable_streaming: true,
            enable_rate_limiting: true,
            enable_caching: true,
            enable_metrics: true,
            log_level: "info".to_string(),
            rust_backtrace: None,
            environment: "development".to_string(),
            cors_origin: "*".to_string(),
            rate_limit_requests_per_window: 100,
            rate_limit_window_seconds: 60,
            rate_limit_burst_size: 10,
            circuit_failure_threshold: 5,
            circuit_success_threshold: 3,
            circuit_timeout_seconds: 30,
            cache_l1_max_entries: 500,
            cache_l1_ttl_seconds: 300,
            cache_l2_ttl_seconds: 3600,
            chunk_max_size: 512,
            chunk_min_size: 100,
            chunk_overlap: 50,
            chunk_max_per_doc: 20,
            orchestrator_max_parallel: 10,
            orchestrator_service_timeout_seconds: 10,
            rag_history_turns: 5,
            rag_evidence_top_k: 5,
            rag_query_max_length: 10_000,
        }
    }

    /// Set up logging configuration based on environment variables.
    pub fn setup_logging(&self) {
        if let Some(backtrace) = &self.rust_backtrace {
            env::set_var("RUST_BACKTRACE", backtrace);
        }

        #[cfg(feature = "cli")]
        let _ = tracing_subscriber::fmt()
            .with_env_filter(&self.log_level)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .try_init();
    }

    /// Validate configuration values and provide helpful error messages.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0. Please specify a valid port number (1-65535).".to_string());
        }

        if self.port < 1024 && cfg!(not(debug_assertions)) {
            eprintln!(
                "Warning: using privileged port {} may require root access. \
                Consider using a port >= 1024.",
                self.port
            );
        }

        if self.host.is_empty() {
            return Err("Host cannot be empty.".to_string());
        }

        if self.llm_url != "direct" {
            match Url::parse(&self.llm_url) {
                Ok(url) => {
                    if !["http", "https"].contains(&url.scheme()) {
                        return Err(format!(
                            "Invalid LLM URL scheme '{}'. Only 'http' and 'https' are supported.",
                            url.scheme()
                        ));
                    }
                    if self.environment == "production" && url.scheme() == "http" {
                        eprintln!("Warning: using HTTP for the LLM backend in production is not recommended.");
                    }
                }
                Err(err) => {
                    return Err(format!("Invalid LLM URL '{}': {}", self.llm_url, err));
                }
            }
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.environment.as_str()) {
            return Err(format!(
                "Invalid environment '{}'. Valid options are: {}",
                self.environment,
                valid_environments.join(", ")
            ));
        }

        if self.http_client_timeout == 0 {
            return Err("HTTP client timeout must be greater than 0 seconds.".to_string());
        }

        if self.rate_limit_burst_size == 0 {
            return Err("Rate limit burst size must be greater than 0.".to_string());
        }
        if self.rate_limit_requests_per_window == 0 {
            eprintln!("Warning: rate_limit_requests_per_window of 0 will block all requests.");
        }

        if self.circuit_failure_threshold == 0 {
            return Err("Circuit breaker failure threshold must be greater than 0.".to_string());
        }
        if self.circuit_success_threshold == 0 {
            return Err("Circuit breaker success threshold must be greater than 0.".to_string());
        }

        if self.cache_l1_max_entries == 0 {
            eprintln!("Warning: cache_l1_max_entries of 0 effectively disables the L1 cache.");
        }

        if self.chunk_min_size >= self.chunk_max_size {
            return Err(format!(
                "chunk_min_size ({}) must be less than chunk_max_size ({}).",
                self.chunk_min_size, self.chunk_max_size
            ));
        }

        if self.orchestrator_max_parallel == 0 {
            return Err("orchestrator_max_parallel must be greater than 0.".to_string());
        }

        if self.environment == "production" && self.cors_origin == "*" {
            eprintln!("Warning: using CORS origin '*' in production is not recommended.");
        }

        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Valid options are: {}",
                self.log_level,
                valid_log_levels.join(", ")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::for_test();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::for_test();
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_environment_rejected() {
        let mut config = Config::for_test();
        config.environment = "sandbox".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_bounds_validated() {
        let mut config = Config::for_test();
        config.chunk_min_size = config.chunk_max_size;
        assert!(config.validate().is_err());
    }
}
