use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use askdb::config::{AppConfig, CliArgs, Command};
use askdb::db::connection::SqlxDatabase;
use askdb::db::seed::seed_student_demo;
use askdb::db::SqlDatabase;
use askdb::llm::LlmManager;
use askdb::pipeline::Pipeline;
use askdb::pipeline::conversation::GREETING;
use askdb::pipeline::session::Session;
use askdb::util::logging::init_tracing;
use askdb::web;
use askdb::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.log_json);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match args.command.clone().unwrap_or(Command::Serve) {
        Command::SeedDemo { path } => {
            let count = match seed_student_demo(&path).await {
                Ok(count) => count,
                Err(e) => {
                    error!("Failed to seed demo database: {}", e);
                    return Err(e.to_string().into());
                }
            };
            println!("Created {} with {} students", path.display(), count);
        }
        Command::Translate { question } => {
            let pipeline = build_pipeline(&config)?;

            let schema = match SqlxDatabase::connect(&config.database, config.schema.sample_rows).await {
                Ok(db) => {
                    let snapshot = db.describe_schema().await?;
                    Some((snapshot, db.kind()))
                }
                Err(e) => {
                    warn!("Translating without a schema: {}", e);
                    None
                }
            };

            let query = pipeline.translate(&question, schema).await?;
            println!("{}", query.sql);
        }
        Command::Chat => {
            let pipeline = build_pipeline(&config)?;
            let (mut session, _) = Session::open(config.database.clone(), config.schema.sample_rows).await?;
            run_chat(&pipeline, &mut session).await?;
        }
        Command::Serve => {
            let pipeline = build_pipeline(&config)?;

            let session = if config.connect_on_start {
                match Session::open(config.database.clone(), config.schema.sample_rows).await {
                    Ok((session, _)) => Some(session),
                    Err(e) => {
                        // Continue anyway, clients can POST /api/connect
                        error!("Failed to connect on start: {}", e);
                        None
                    }
                }
            } else {
                None
            };

            let web_config = config.web.clone();
            let app_state = Arc::new(AppState::new(config, pipeline, session));

            // Start the web server
            info!("Starting askdb server on {}:{}", web_config.host, web_config.port);
            match web::run_server(web_config, app_state).await {
                Ok(_) => info!("Server stopped gracefully"),
                Err(e) => {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

fn build_pipeline(config: &AppConfig) -> Result<Pipeline, Box<dyn std::error::Error>> {
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm)?;

    Ok(Pipeline::new(
        Arc::new(llm_manager),
        config.executor.clone(),
        config.composer.clone(),
    ))
}

async fn run_chat(pipeline: &Pipeline, session: &mut Session) -> std::io::Result<()> {
    println!("{}", GREETING);
    println!("(type 'exit' to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let report = session.ask(pipeline, question).await;
        if let Some(sql) = &report.sql {
            println!("SQL: {}", sql);
        }
        println!("{}\n", report.answer);
    }

    Ok(())
}
