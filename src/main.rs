use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{error, warn};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use vikal::backend::{BackendError, Exam, StudyClient, StudyQuery, StudyResponse, Style, VideoClient};
use vikal::logging::{self, LogTarget};
use vikal::session::{Persistence, TrialSessionStore};
use vikal::Config;

#[derive(Parser)]
#[command(name = "vikal", version)]
#[command(about = "AI study notes for UPSC, GATE and RRB from your terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question (uses one free chat)
    Ask {
        /// Topic to explain, or problem to solve with --solve
        question: String,
        /// Solve a problem instead of explaining a topic
        #[arg(long)]
        solve: bool,
        /// Target exam (UPSC, GATE, RRB), solve mode only
        #[arg(short, long, requires = "solve")]
        exam: Option<String>,
        /// Explanation style, solve mode only
        #[arg(short, long, requires = "solve")]
        style: Option<String>,
    },
    /// Show trial and account status
    Status,
    /// Read and accept the terms and conditions
    AcceptTerms,
    /// Upgrade to Pro for unlimited chats
    Upgrade,
    /// Sign out and clear local chat history
    SignOut,
    /// Show live platform stats
    Stats,
    /// Send feedback to the team
    Feedback {
        text: String,
    },
    /// Summarize a YouTube video
    Summarize {
        url: String,
        /// Follow-up question about the video
        #[arg(short, long)]
        ask: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let target = if cli.command.is_some() { LogTarget::Stderr } else { LogTarget::File };
    if let Err(e) = logging::init(target) {
        eprintln!("warning: logging disabled: {}", e);
    }

    let config = Config::load()
        .unwrap_or_else(|e| {
            warn!(error = %e, "could not read config, using defaults");
            Config::new()
        })
        .with_env_overrides();

    match cli.command {
        None => run_tui(config).await,
        Some(Commands::Ask { question, solve, exam, style }) => {
            ask(&config, question, solve, exam.as_deref(), style.as_deref()).await
        }
        Some(Commands::Status) => status(&config),
        Some(Commands::AcceptTerms) => accept_terms(&config),
        Some(Commands::Upgrade) => upgrade(&config),
        Some(Commands::SignOut) => sign_out(&config),
        Some(Commands::Stats) => stats(&config).await,
        Some(Commands::Feedback { text }) => feedback(&config, &text).await,
        Some(Commands::Summarize { url, ask }) => summarize(&config, &url, ask.as_deref()).await,
    }
}

async fn run_tui(config: Config) -> Result<()> {
    let session = config.open_session_store();
    let mut app = App::new(config, session);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    if let Err(ref e) = result {
        error!(error = %e, "tui exited with error");
    }
    result
}

fn open_session(config: &Config) -> TrialSessionStore {
    let store = config.open_session_store();
    if let Persistence::MemoryOnly { reason } = store.persistence() {
        eprintln!("warning: chats will not be saved ({})", reason);
    }
    store
}

fn print_upgrade(config: &Config) {
    println!("You've hit your free chats. Go Pro for unlimited learning!");
    println!("Upgrade with: vikal upgrade  ({})", config.payment_link);
}

fn print_answer(answer: &StudyResponse, show_flashcards: bool) {
    println!("{}", answer.notes);

    if show_flashcards && !answer.flashcards.is_empty() {
        println!("\nFlashcards:");
        for (question, reply) in answer.flashcard_pairs() {
            println!("  Q: {}\n  A: {}", question, reply);
        }
    }

    if !answer.resources.is_empty() {
        println!("\nResources:");
        for resource in &answer.resources {
            println!("  • {} - {}", resource.title, resource.url);
        }
    }
}

async fn ask(
    config: &Config,
    question: String,
    solve: bool,
    exam: Option<&str>,
    style: Option<&str>,
) -> Result<()> {
    let mut store = open_session(config);

    if !store.state().terms_accepted {
        bail!("Please accept the terms first: vikal accept-terms");
    }
    if !store.can_submit() {
        print_upgrade(config);
        return Ok(());
    }

    let query = if solve {
        let exam = match exam {
            Some(name) => match Exam::from_str(name) {
                Some(exam) => Some(exam),
                None => bail!("Unknown exam '{}'. Choose UPSC, GATE or RRB", name),
            },
            None => None,
        };
        let style = match style {
            Some(name) => match Style::from_str(name) {
                Some(style) => Some(style),
                None => {
                    let names: Vec<&str> = Style::all().iter().map(|s| s.display_name()).collect();
                    bail!("Unknown style '{}'. Choose one of: {}", name, names.join(", "))
                }
            },
            None => None,
        };
        StudyQuery::solve(question, exam, style)
    } else {
        StudyQuery::explain(question)
    };

    let client = StudyClient::new(&config.api_url);
    match client.submit(config.user_id_or_anonymous(), &query).await {
        Ok(answer) => {
            let state = store.record_interaction(query.text.clone(), answer.notes.clone(), query.mode());
            print_answer(&answer, !query.solve);
            match state.chats_left() {
                Some(left) => println!("\nChats left: {}", left),
                None => println!("\nUnlimited Chats (Pro)"),
            }
            Ok(())
        }
        Err(BackendError::ChatLimitReached) => {
            print_upgrade(config);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn status(config: &Config) -> Result<()> {
    let mut store = open_session(config);
    let state = store.state().clone();

    println!("User: {}", config.user_id.as_deref().unwrap_or("(signed out)"));
    println!("Terms accepted: {}", if state.terms_accepted { "yes" } else { "no" });
    match state.chats_left() {
        Some(left) => println!("Chats left: {}/{}", left, vikal::session::TRIAL_QUOTA),
        None => println!("Unlimited Chats (Pro)"),
    }
    if store.take_trial_notice() {
        print_upgrade(config);
    }

    if !state.history.is_empty() {
        println!("\nRecent chats:");
        for record in &state.history {
            println!("  [{}] {}", record.mode.label(), record.question);
        }
    }
    Ok(())
}

fn accept_terms(config: &Config) -> Result<()> {
    for line in ui::TERMS {
        println!("{}", line);
    }
    let mut store = open_session(config);
    store.accept_terms();
    println!("\nTerms accepted.");
    Ok(())
}

fn upgrade(config: &Config) -> Result<()> {
    let mut store = open_session(config);
    store.upgrade_to_pro();
    println!("Complete your payment at: {}", config.payment_link);
    println!("Unlimited chats enabled on this device.");
    Ok(())
}

fn sign_out(config: &Config) -> Result<()> {
    let mut store = open_session(config);
    store.clear();
    Config::save_user_id(None)?;
    println!("Signed out! Local chat history cleared.");
    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let stats = StudyClient::new(&config.api_url).stats().await?;
    println!("Active users: {}", stats.active_users);
    println!("Questions solved: {}", stats.questions_solved);
    println!("Explanations given: {}", stats.explanations_given);
    Ok(())
}

async fn feedback(config: &Config, text: &str) -> Result<()> {
    StudyClient::new(&config.api_url)
        .feedback(config.user_id_or_anonymous(), text)
        .await?;
    println!("Thanks for your feedback!");
    Ok(())
}

async fn summarize(config: &Config, url: &str, question: Option<&str>) -> Result<()> {
    let client = VideoClient::new(&config.video_api_url);
    let summary = client.summarize(url).await?;

    println!("{}", summary.summary);
    if !summary.resources.is_empty() {
        println!("\nResources:");
        for resource in &summary.resources {
            println!("  • {} - {}", resource.title, resource.url);
        }
    }

    if let Some(question) = question {
        let response = client.chat(&summary.video_id, question).await?;
        println!("\n{}", response);
    }
    Ok(())
}
