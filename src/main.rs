use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use kindermath_sync::config::CoreConfig;
use kindermath_sync::domain::{Progress, UserIdentity};
use kindermath_sync::remote::{InMemoryRemote, NoBackend, RemoteApi};
use kindermath_sync::stats::Attempt;
use kindermath_sync::{setup_core, LearningCore, DB_PATH};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// File-backed key-value store.
    #[arg(long, default_value = DB_PATH)]
    db: PathBuf,

    /// JSON config; defaults apply to missing keys.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without any backend (sync stays disabled).
    #[arg(long)]
    no_backend: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play one session as the active identity.
    Play {
        #[arg(long, default_value = "arithmetic")]
        game: String,

        /// Answers in order, e.g. `11011` (1 = correct).
        #[arg(long, default_value = "11011")]
        answers: String,

        #[arg(long, default_value_t = 2000)]
        response_ms: u64,

        #[arg(long, default_value_t = 1)]
        difficulty: u8,

        /// Report the network as down; changes get queued.
        #[arg(long)]
        offline: bool,
    },
    /// Show the active identity, its progress and the queue size.
    Status,
    /// Sign in to a throwaway in-process account and sync.
    Sync {
        #[arg(long, default_value = "demo@example.com")]
        email: String,

        #[arg(long, default_value = "demo")]
        password: String,
    },
    /// List queued and dead-lettered actions.
    Queue,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CoreConfig::from_path(path)?,
        None => CoreConfig::default(),
    };

    let memory = Arc::new(InMemoryRemote::new());
    let remote: Arc<dyn RemoteApi> = if args.no_backend {
        Arc::new(NoBackend::new())
    } else {
        memory.clone()
    };

    let core = setup_core(&args.db, config, remote)?;
    let identity = core.start().await;
    println!("[MAIN] Active identity: {}", identity.identity_key());

    match args.command {
        Command::Play {
            game,
            answers,
            response_ms,
            difficulty,
            offline,
        } => {
            if offline {
                core.session().set_online(false).await;
            }
            run_play(&core, &game, &answers, response_ms, difficulty)?;
        }
        Command::Status => print_status(&core, &identity),
        Command::Sync { email, password } => {
            anyhow::ensure!(!args.no_backend, "sync needs a backend; drop --no-backend");
            memory.register(&email, &password);
            let account = core
                .session()
                .sign_in(&email, &password)
                .await
                .context("signing in")?;
            println!("[MAIN] Signed in as {}", account.identity_key());

            let report = core.sync_now().await?;
            println!("[MAIN] Sync finished");
            println!("-----------------------------------");
            println!("Queued:           {}", report.queued);
            println!("Replayed:         {}", report.replayed);
            println!("Dead-lettered:    {}", report.poisoned);
            println!("Pulled:           {}", report.pulled);
            println!("State:            {}", core.sync().state());
            println!("-----------------------------------");
        }
        Command::Queue => print_queue(&core),
    }

    core.stop();
    Ok(())
}

fn run_play(core: &LearningCore, game: &str, answers: &str, response_ms: u64, difficulty: u8) -> Result<()> {
    let mut difficulty = difficulty;
    for c in answers.chars() {
        let is_correct = match c {
            '1' => true,
            '0' => false,
            other => anyhow::bail!("unexpected answer `{other}`, use 0 or 1"),
        };
        let signal = core.on_attempt(Attempt::new(game, is_correct, response_ms).with_difficulty(difficulty))?;
        if signal.delta != 0 {
            difficulty = difficulty.saturating_add_signed(signal.delta);
            println!("[MAIN] Difficulty -> {}", difficulty);
        }
    }

    let outcome = core.end_session()?;
    println!("[MAIN] Session recorded");
    println!("-----------------------------------");
    println!("Game:             {}", outcome.record.game_type);
    println!(
        "Correct:          {}/{}",
        outcome.record.correct_answers, outcome.record.questions_answered
    );
    println!("Longest streak:   {}", outcome.record.longest_streak);
    println!("Score:            {}", outcome.record.score);
    for a in &outcome.unlocked {
        println!("Unlocked:         {}", a.name);
    }
    println!("-----------------------------------");
    print_progress(&outcome.progress);
    Ok(())
}

fn print_status(core: &LearningCore, identity: &UserIdentity) {
    let progress = core.repo().load_progress(identity);
    print_progress(&progress);
    println!("Sessions:         {}", core.repo().list_sessions(identity).len());
    println!("Unsynced:         {}", core.repo().list_unsynced_sessions(identity).len());
    println!("Pending actions:  {}", core.sync().pending().len());
    println!("Sync state:       {}", core.sync().state());
}

fn print_progress(p: &Progress) {
    println!("Games played:     {}", p.games_played);
    println!("Questions:        {}", p.questions_answered);
    println!("Accuracy:         {:.1}%", p.accuracy * 100.0);
    println!("Best streak:      {}", p.best_streak);
    println!("Level / XP:       {} / {}", p.level, p.xp);
}

fn print_queue(core: &LearningCore) {
    let pending = core.sync().pending();
    println!("{:<38} | {:<7} | {:<15} | {:<8}", "Action", "Op", "Collection", "Attempts");
    println!("--------------------------------------------------------------------------");
    for a in &pending {
        println!(
            "{:<38} | {:<7} | {:<15} | {:<8}",
            a.id,
            format!("{:?}", a.op),
            a.collection,
            a.attempts
        );
    }

    let dead = core.sync().dead_letters();
    if !dead.is_empty() {
        println!();
        println!("Dead letters:");
        for d in &dead {
            println!("  {} {} ({})", d.action.collection, d.action.id, d.reason);
        }
    }
}
