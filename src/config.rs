use clap::{Parser, Subcommand};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::db::ConnectionDescriptor;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "gemini", "remote", or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchemaConfig {
    /// Sample rows per table appended to the prompt schema. 0 disables sampling.
    pub sample_rows: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutorConfig {
    pub allow_mutations: bool,
    pub enforce_table_allow_list: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ComposerConfig {
    pub max_prompt_rows: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub database: ConnectionDescriptor,
    pub connect_on_start: bool,
    pub schema: SchemaConfig,
    pub executor: ExecutorConfig,
    pub composer: ComposerConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the JSON API (default)
    Serve,
    /// Chat with the configured database from the terminal
    Chat,
    /// Print the SQL for a single question without running it
    Translate {
        question: String,
    },
    /// Create a SQLite demo database with a STUDENT table
    SeedDemo {
        path: PathBuf,
    },
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/askdb/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // ASKDB__LLM__API_KEY=... overrides llm.api_key
        config_builder = config_builder.add_source(
            Environment::with_prefix("ASKDB")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }

        if config.llm.api_key.is_none() && config.llm.backend == "gemini" {
            config.llm.api_key = std::env::var("GOOGLE_API_KEY").ok();
        }

        Ok(config)
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "gemini".to_string(),
            model: "gemini-pro".to_string(),
            api_key: None,
            api_url: None,
            temperature: 0.7,
            top_p: 0.85,
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self { sample_rows: 3 }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            allow_mutations: false,
            enforce_table_allow_list: true,
        }
    }
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self { max_prompt_rows: 50 }
    }
}
