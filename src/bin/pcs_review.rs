//! Command-line front end for reviewing and live-testing conversations
//!
//! Usage:
//!   pcs-review ping                              # Check the backend is reachable
//!   pcs-review recent --for-user 1804860         # Recent conversations for a user
//!   pcs-review show conv-123                     # Messages, trace and evaluation
//!   pcs-review eval conv-123                     # Run (or fetch cached) evaluation
//!   pcs-review chat "tacos near union square"    # Send a turn and follow it live
//!   pcs-review note conv-123 "ranking looks off" # Save a reviewer note
//!   pcs-review users                             # Known user directory

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use pcs_review::model::{Conversation, EvaluationData, Message, Role, TraceMessage};
use pcs_review::poll::PollState;
use pcs_review::store::{ChatStateStore, JsonFileStore, KeyValueStore, ReviewStateStore};
use pcs_review::transform::score_conversation;
use pcs_review::users::{build_user_map, display_name};
use pcs_review::{ApiConfig, ChatApi, ChatConfig, ChatSession, HttpChatApi, PollOptions, ReviewBoard};

#[derive(Parser)]
#[command(name = "pcs-review")]
#[command(version)]
#[command(about = "Review, annotate and live-test Places Conversational Search conversations")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL
    #[arg(long, global = true, env = "PCS_API_BASE_URL")]
    base_url: Option<String>,

    /// User id for chat and list requests
    #[arg(long, global = true, env = "PCS_USER_ID")]
    user_id: Option<String>,

    /// File holding saved chat state, selection and notes
    #[arg(long, global = true, env = "PCS_STATE_FILE", default_value = ".pcs-review/state.json")]
    state_file: PathBuf,

    /// Print the view model as JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the backend answers a chat request
    Ping,

    /// List recent conversations
    Recent {
        /// Only conversations of this user
        #[arg(long)]
        for_user: Option<String>,

        /// Only this conversation
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Show one conversation with trace and evaluation
    Show {
        conversation_id: String,

        /// Include the full trace
        #[arg(long)]
        trace: bool,
    },

    /// Run the evaluation of a conversation
    Eval { conversation_id: String },

    /// Send a message and follow the reply until it completes
    Chat {
        message: String,

        /// Continue this conversation instead of the saved one
        #[arg(long)]
        conversation: Option<String>,

        /// Start a new conversation
        #[arg(long, conflicts_with = "conversation")]
        new: bool,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Maximum poll requests
        #[arg(long, default_value = "60")]
        max_attempts: u32,
    },

    /// Save a reviewer note (empty text removes it)
    Note { conversation_id: String, text: String },

    /// List known users, plus users found in a conversation's place lists
    Users {
        #[arg(long)]
        conversation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pcs_review=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = ApiConfig::from_env();
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(user_id) = &cli.user_id {
        config = config.with_user_id(user_id.clone());
    }

    let http = HttpChatApi::new(config.clone()).context("invalid backend configuration")?;
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(&cli.state_file));

    match cli.command {
        Commands::Ping => cmd_ping(&http).await,
        Commands::Recent {
            for_user,
            conversation,
        } => {
            let board = review_board(http, config, store);
            cmd_recent(board, for_user, conversation, cli.json).await
        }
        Commands::Show {
            conversation_id,
            trace,
        } => {
            let board = review_board(http, config, store);
            cmd_show(board, &conversation_id, trace, cli.json).await
        }
        Commands::Eval { conversation_id } => {
            let board = review_board(http, config, store);
            cmd_eval(board, &conversation_id, cli.json).await
        }
        Commands::Chat {
            message,
            conversation,
            new,
            interval_ms,
            max_attempts,
        } => {
            let options = PollOptions {
                poll_interval: Duration::from_millis(interval_ms),
                max_attempts,
            };
            cmd_chat(http, config, store, options, &message, conversation, new, cli.json).await
        }
        Commands::Note {
            conversation_id,
            text,
        } => {
            ReviewStateStore::new(store).save_note(&conversation_id, &text);
            println!("Saved note for {}", conversation_id);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Users { conversation } => cmd_users(&http, &config, conversation, cli.json).await,
    }
}

fn review_board(http: HttpChatApi, config: ApiConfig, store: Arc<dyn KeyValueStore>) -> ReviewBoard {
    ReviewBoard::new(Arc::new(http), config).with_state_store(ReviewStateStore::new(store))
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

async fn cmd_ping(http: &HttpChatApi) -> Result<ExitCode> {
    if http.test_connection().await {
        println!("OK {}", http.config().base_url);
        Ok(ExitCode::SUCCESS)
    } else {
        println!("FAILED {}", http.config().base_url);
        Ok(ExitCode::FAILURE)
    }
}

async fn cmd_recent(
    mut board: ReviewBoard,
    for_user: Option<String>,
    conversation: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    board
        .load_recent(for_user.as_deref(), conversation.as_deref())
        .await
        .context("failed to load recent conversations")?;

    if json {
        print_json(board.conversations())?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} conversations", board.conversations().len());
    for conversation in board.conversations() {
        println!("{}", summary_row(conversation));
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_show(mut board: ReviewBoard, conversation_id: &str, trace: bool, json: bool) -> Result<ExitCode> {
    board
        .select(conversation_id)
        .await
        .with_context(|| format!("failed to load conversation {}", conversation_id))?;
    let conversation = board
        .conversation(conversation_id)
        .context("conversation missing after load")?;

    if json {
        print_json(conversation)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}  [{}]", conversation.title, conversation.id);
    if !conversation.note.is_empty() {
        println!("Note: {}", conversation.note);
    }
    println!();
    for message in &conversation.messages {
        print_message(message);
    }
    if let Some(evaluation) = &conversation.evaluation {
        println!();
        print_evaluation(evaluation);
    }
    if trace {
        if let Some(messages) = conversation.trace.as_deref() {
            println!();
            print_trace(messages);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_eval(mut board: ReviewBoard, conversation_id: &str, json: bool) -> Result<ExitCode> {
    // Load first so the result merges onto the fetched trace.
    board
        .select(conversation_id)
        .await
        .with_context(|| format!("failed to load conversation {}", conversation_id))?;
    let result = board
        .run_evaluation(conversation_id)
        .await
        .with_context(|| format!("failed to run evaluation for {}", conversation_id))?;
    let evaluation = board
        .conversation(conversation_id)
        .and_then(|c| c.evaluation.as_ref())
        .context("no evaluation returned")?;

    if json {
        print_json(evaluation)?;
    } else {
        if result.cached {
            println!("(cached{})", result.cache_age.map(|a| format!(", {}s old", a)).unwrap_or_default());
        }
        print_evaluation(evaluation);
    }

    Ok(if evaluation.pass {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[allow(clippy::too_many_arguments)]
async fn cmd_chat(
    http: HttpChatApi,
    config: ApiConfig,
    store: Arc<dyn KeyValueStore>,
    options: PollOptions,
    message: &str,
    conversation: Option<String>,
    new: bool,
    json: bool,
) -> Result<ExitCode> {
    let api: Arc<dyn ChatApi> = Arc::new(http);
    let states = ChatStateStore::new(store);
    let fallback = ChatConfig::from_api_config(&config);

    let session = if new {
        let session = ChatSession::new(api, fallback, options).with_state_store(states);
        session.new_conversation();
        session
    } else {
        ChatSession::restore(api, states, fallback, options).await
    };

    if let Some(conversation_id) = conversation {
        session
            .load_conversation(&conversation_id)
            .await
            .with_context(|| format!("failed to load conversation {}", conversation_id))?;
    }

    let already_shown = session.messages().len();
    let mut status_rx = session.subscribe_poll();
    let progress = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            if status.state == PollState::Polling {
                tracing::debug!(attempt = status.attempts, "Waiting for reply");
            }
        }
    });

    session.send_message(message).await.context("failed to send message")?;
    let status = session.finish_turn().await;
    progress.abort();

    let view = session.view();
    if json {
        print_json(&view.messages)?;
    } else {
        for message in view.messages.iter().skip(already_shown) {
            print_message(message);
        }
        eprintln!("{}", view.status_line);
        if let Some(evaluation) = view.loaded_conversation.as_ref().and_then(|c| c.evaluation.as_ref()) {
            println!();
            print_evaluation(evaluation);
        }
    }

    Ok(match status.state {
        PollState::Complete => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn cmd_users(
    http: &HttpChatApi,
    config: &ApiConfig,
    conversation: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let messages = match conversation {
        Some(conversation_id) => {
            http.conversation(&conversation_id, &config.default_user_id, &config.default_cic_hash)
                .await
                .with_context(|| format!("failed to load conversation {}", conversation_id))?
                .messages
        }
        None => Vec::new(),
    };
    let users = build_user_map(&messages);

    if json {
        print_json(&users)?;
    } else {
        for (id, name) in &users {
            println!("{:<16} {}", id, name);
        }
    }
    Ok(ExitCode::SUCCESS)
}

// =============================================================================
// RENDERING
// =============================================================================

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn summary_row(conversation: &Conversation) -> String {
    let user = conversation
        .user_id
        .as_deref()
        .map(display_name)
        .unwrap_or_default();
    let count = conversation
        .message_count
        .map(|n| format!("{} msgs", n))
        .unwrap_or_default();
    let note = if conversation.note.is_empty() { "" } else { " *" };

    format!(
        "{}  {}  {:<40}  {:<10}  {:>8}  score {}{}",
        conversation.date.format("%Y-%m-%d %H:%M"),
        conversation.id,
        conversation.title,
        user,
        count,
        conversation.score.unwrap_or_else(|| score_conversation(conversation)),
        note
    )
}

fn print_message(message: &Message) {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    let status = if message.is_status_message { " (working)" } else { "" };
    println!("[{}]{} {}", who, status, message.content);

    if let Some(list) = &message.place_list {
        if let Some(heading) = &list.heading {
            println!("    {}", heading);
        }
        for place in &list.places {
            println!("    - {}", place.summary_line());
        }
    }
    if let Some(quick) = &message.quick_responses {
        let labels: Vec<&str> = quick.iter().map(|q| q.display_text.as_str()).collect();
        println!("    > {}", labels.join(" | "));
    }
}

fn print_evaluation(evaluation: &EvaluationData) {
    println!(
        "Evaluation: {}  latency {} ms  tokens {}/{} ({} total)  model {}",
        if evaluation.pass { "PASS" } else { "FAIL" },
        evaluation.latency_ms,
        evaluation.meta.tokens_in,
        evaluation.meta.tokens_out,
        evaluation.meta.total_tokens(),
        evaluation.meta.model
    );
    let failed = evaluation.failed_validations().count() + evaluation.failed_judges().count();
    if failed > 0 {
        println!("  {} failing check(s)", failed);
    }
    for validation in &evaluation.validation_results {
        println!(
            "  [{}] {}{}",
            if validation.pass { "ok" } else { "x" },
            validation.name,
            if validation.errors.is_empty() {
                String::new()
            } else {
                format!(": {}", validation.errors.join("; "))
            }
        );
    }
    for judge in &evaluation.judge_results {
        println!(
            "  judge {} {:.2} {} {}",
            judge.judge_id,
            judge.score,
            if judge.pass { "pass" } else { "fail" },
            judge.rationale
        );
    }
    for tool in &evaluation.tool_trace {
        println!(
            "  tool {} {} -> {}",
            tool.tool_name,
            tool.arguments,
            tool.result
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "(no result)".to_string())
        );
    }
}

fn print_trace(messages: &[TraceMessage]) {
    println!("Trace ({} messages)", messages.len());
    for message in messages {
        let content = match message.content.as_text() {
            Some(text) => text.to_string(),
            None => serde_json::to_string(&message.content).unwrap_or_default(),
        };
        println!("  {}: {}", message.role, content);
        for call in &message.tool_calls {
            println!("    -> {}({})", call.name, call.arguments);
        }
    }
}
