//! storesql binary - composition root.
//!
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Open the SQLite database, optionally loading a CSV export into it
//! 3. Build the guarded accessor and capture the schema snapshot
//! 4. Render the generator instruction and connect the language model
//! 5. Run the terminal chat loop

mod cli;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use storesql_chat::{ConversationWorkflow, SqlTool};
use storesql_core::config::StoreSqlConfig;
use storesql_core::types::expand_home;
use storesql_llm::{
    load_template, render_instruction, AnthropicModel, InstructionParams, LanguageModel,
    QueryGenerator,
};
use storesql_storage::{load_csv, Database, DatabaseAccessor, QueryGuard, SqliteAccessor};

use cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = if config_file.exists() {
        StoreSqlConfig::load(&config_file)?
    } else {
        StoreSqlConfig::default()
    };
    args.apply_overrides(&mut config);
    config.validate()?;

    // Tracing. Logs go to stderr so they never mix with answers.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting storesql v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    if args.init_config {
        config.save(&config_file)?;
        println!("Wrote {}", config_file.display());
        return Ok(());
    }

    // Storage.
    let db_path = PathBuf::from(expand_home(&config.database.path));
    let db = Arc::new(Database::open(&db_path)?);

    if let Some(ref csv) = config.database.source_csv {
        let csv_path = PathBuf::from(expand_home(csv));
        let report = load_csv(&db, &csv_path, &config.database.table)?;
        tracing::info!(
            table = %report.table,
            rows = report.rows,
            columns = report.columns.len(),
            "Table replaced from CSV"
        );
    }

    let guard = QueryGuard::new(
        config.allowed_tables(),
        config.store_scope(),
        config.guard.max_rows,
    );
    let accessor = Arc::new(SqliteAccessor::new(db, guard, config.chat.sample_rows)?);

    // Query generator.
    let instruction_path = config
        .llm
        .instruction_path
        .as_deref()
        .map(|p| PathBuf::from(expand_home(p)));
    let template = load_template(instruction_path.as_deref())?;
    let table_info = accessor.schema().to_string();
    let scope = config.store_scope();
    let instruction = render_instruction(
        &template,
        &InstructionParams {
            dialect: accessor.dialect(),
            table_info: &table_info,
            scope: &scope,
            sentinel: &config.llm.sentinel,
        },
    );

    let model: Arc<dyn LanguageModel> = Arc::new(AnthropicModel::from_config(&config.llm)?);
    tracing::info!(model = %config.llm.model, "Language model configured");
    let generator = Arc::new(QueryGenerator::new(
        Arc::clone(&model),
        instruction,
        config.llm.sentinel.clone(),
    ));

    // Workflow.
    let tool = Arc::new(SqlTool::new(generator, accessor));
    let workflow = ConversationWorkflow::new(config.chat.strategy, &config.chat, model, tool);

    chat_loop(&workflow, &db_path).await
}

/// Read questions from stdin until `/quit` or end of input.
async fn chat_loop(
    workflow: &ConversationWorkflow,
    db_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "storesql ({} strategy, {}). Commands: /history, /new, /quit",
        workflow.strategy(),
        db_path.display()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session: Option<Uuid> = None;

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Command::parse(&line) {
            Command::Empty => continue,
            Command::Quit => break,
            Command::NewSession => {
                session = None;
                println!("Started a new conversation.");
            }
            Command::History => print_history(workflow, session),
            Command::Question(question) => {
                eprintln!("Thinking...");
                match workflow.handle_message(question, session).await {
                    Ok((result, sid)) => {
                        session = Some(sid);
                        println!("{}\n", result.display);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Turn failed");
                        println!("Error: {}\n", e);
                    }
                }
            }
        }
    }

    tracing::info!(sessions = workflow.list_sessions().len(), "Chat loop finished");
    Ok(())
}

fn print_history(workflow: &ConversationWorkflow, session: Option<Uuid>) {
    let Some(sid) = session else {
        println!("No messages yet.");
        return;
    };
    match workflow.get_history(sid) {
        Ok(messages) => {
            for message in messages {
                println!("[{}] {}\n", message.role(), message.content());
            }
        }
        Err(e) => println!("Error: {}", e),
    }
}
