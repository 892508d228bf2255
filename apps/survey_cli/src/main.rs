use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::{AnswerValue, SessionId};
use storage::{KeyValueStore, MemoryStore, SqliteStore};
use survey_core::{
    config::{load_settings_from, DEFAULT_CONFIG_PATH},
    BackOutcome, ClientSettings, ControllerSnapshot, HttpSessionService, QuestionKind,
    QuestionSet, ReconcilePolicy, StepOutcome, SubmitOutcome, SurveyController, SurveyPhase,
    TaskProgress,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

type Controller = SurveyController<HttpSessionService, dyn KeyValueStore>;

#[derive(Parser, Debug)]
#[command(about = "Terminal client for the Afterversed survey")]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long)]
    api_base_url: Option<String>,
    #[arg(long)]
    cache_database_url: Option<String>,
    /// Keep the cache in memory instead of sqlite.
    #[arg(long)]
    memory_cache: bool,
    /// `larger_wins` or `newest_wins`.
    #[arg(long)]
    policy: Option<ReconcilePolicy>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk through the survey interactively (default).
    Run,
    /// Check that the session service is reachable.
    Health,
    /// Print the email drafts prepared for a session.
    Drafts { session_id: i64 },
    /// Show or set the checklist progress counter.
    Progress { set: Option<i64> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let settings = resolve_settings(&cli);

    let service = Arc::new(HttpSessionService::new(&settings.api_base_url)?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let store = open_store(&settings, cli.memory_cache).await;
            run_survey(service, store, settings.reconcile_policy).await
        }
        Command::Health => {
            let health = service
                .health_check()
                .await
                .with_context(|| format!("service at {} is unreachable", service.base_url()))?;
            println!("{} is {}", service.base_url(), health.status);
            Ok(())
        }
        Command::Drafts { session_id } => {
            let drafts = service
                .draft_emails(SessionId(session_id))
                .await
                .context("failed to load email drafts")?;
            println!("{}", serde_json::to_string_pretty(&drafts.drafts)?);
            Ok(())
        }
        Command::Progress { set } => {
            let store = open_store(&settings, cli.memory_cache).await;
            let progress = TaskProgress::new(store);
            let count = match set {
                Some(count) => progress.set(count).await,
                None => progress.get().await,
            };
            println!("checklist segments completed: {count}");
            Ok(())
        }
    }
}

fn resolve_settings(cli: &Cli) -> ClientSettings {
    let mut settings = load_settings_from(&cli.config, |name| std::env::var(name).ok());
    if let Some(v) = &cli.api_base_url {
        settings.api_base_url = v.clone();
    }
    if let Some(v) = &cli.cache_database_url {
        settings.cache_database_url = survey_core::config::normalize_cache_url(v);
    }
    if let Some(policy) = cli.policy {
        settings.reconcile_policy = policy;
    }
    settings
}

async fn open_store(settings: &ClientSettings, memory_only: bool) -> Arc<dyn KeyValueStore> {
    if memory_only {
        return Arc::new(MemoryStore::new());
    }
    match SqliteStore::new(&settings.cache_database_url).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            warn!(
                database_url = %settings.cache_database_url,
                error = %err,
                "cli: cache unavailable, answers will not outlive this run"
            );
            Arc::new(MemoryStore::new())
        }
    }
}

async fn run_survey(
    service: Arc<HttpSessionService>,
    store: Arc<dyn KeyValueStore>,
    policy: ReconcilePolicy,
) -> Result<()> {
    let controller: Arc<Controller> =
        SurveyController::new_with_policy(service, store, QuestionSet::afterversed(), policy);

    let mut events = controller.subscribe();
    let notices = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Some(message) = event.toast_message() {
                let marker = if event.is_error() { "!" } else { "*" };
                println!("{marker} {message}");
            }
        }
    });

    let mut snapshot = controller.bootstrap().await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        render(&controller, &snapshot);
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input == "q" {
            break;
        }
        if let Err(err) = handle_input(&controller, &snapshot, input).await {
            println!("! {err}");
        }
        snapshot = controller.snapshot().await;
    }

    controller.detach();
    notices.abort();
    Ok(())
}

async fn handle_input(
    controller: &Controller,
    snapshot: &ControllerSnapshot,
    input: &str,
) -> Result<()> {
    if snapshot.phase == SurveyPhase::Completed {
        if input == "r" {
            controller.reopen().await;
        }
        return Ok(());
    }

    match input {
        "b" => {
            if controller.back().await == BackOutcome::ExitSurvey {
                println!("(already at the first question, q to leave)");
            }
            return Ok(());
        }
        "n" => return report(controller.advance().await),
        "s" => return report(controller.skip().await),
        "c" => return report(controller.confirm_selection().await?),
        "" => return Ok(()),
        _ => {}
    }

    let Some(question) = controller.questions().get(snapshot.current_step) else {
        return Ok(());
    };
    let choice = input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| question.options.get(i));

    match (question.kind, choice) {
        (QuestionKind::SingleChoice, Some(option)) => report(controller.select_option(option).await?),
        (QuestionKind::MultiChoice, Some(option)) => {
            controller.toggle_option(option).await?;
            Ok(())
        }
        (QuestionKind::Date | QuestionKind::FreeText, _) => {
            report(controller.answer_current(AnswerValue::from(input)).await?)
        }
        _ => {
            println!("(pick one of the numbered options)");
            Ok(())
        }
    }
}

fn report(outcome: StepOutcome) -> Result<()> {
    match outcome {
        StepOutcome::Submitted(SubmitOutcome::Failed { message }) => {
            println!("! submission failed: {message}");
        }
        StepOutcome::Ignored(reason) => println!("(nothing to do: {reason:?})"),
        _ => {}
    }
    Ok(())
}

fn render(controller: &Controller, snapshot: &ControllerSnapshot) {
    let questions = controller.questions();
    println!();

    if snapshot.phase == SurveyPhase::Completed {
        let when = snapshot
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        println!("Survey complete {when}. Your answers:");
        for question in questions.iter() {
            if let Some(answer) = snapshot.answers.get(&question.id) {
                println!("  {}: {}", question.id, describe(answer));
            }
        }
        println!("[r] edit answers  [q] quit");
        return;
    }

    let Some(question) = questions.get(snapshot.current_step) else {
        return;
    };
    println!(
        "Question {} of {} ({:.0}%)",
        snapshot.current_step + 1,
        questions.len(),
        questions.progress_percent(snapshot.current_step)
    );
    println!("{}", question.prompt);

    let current = snapshot.answers.get(&question.id);
    for (i, option) in question.options.iter().enumerate() {
        let selected = match question.kind {
            QuestionKind::MultiChoice => snapshot.pending_selection.contains(option),
            _ => current.and_then(AnswerValue::as_single) == Some(option.as_str()),
        };
        let mark = if selected { "x" } else { " " };
        println!("  [{mark}] {}. {option}", i + 1);
    }

    match question.kind {
        QuestionKind::Date => println!("Enter a date as YYYY-MM-DD."),
        QuestionKind::FreeText => println!("Type your answer."),
        QuestionKind::MultiChoice => println!("Toggle with numbers, [c] to confirm."),
        QuestionKind::SingleChoice => {}
    }
    if let Some(answer) = current {
        println!("Current answer: {}", describe(answer));
    }

    let mut keys = vec!["[b] back", "[n] next"];
    if !question.required {
        keys.push("[s] skip");
    }
    keys.push("[q] quit");
    println!("{}", keys.join("  "));
}

fn describe(answer: &AnswerValue) -> String {
    match answer {
        AnswerValue::Single(value) => value.clone(),
        AnswerValue::Multi(values) if values.is_empty() => "(none)".to_string(),
        AnswerValue::Multi(values) => values.join("; "),
    }
}
