//! Board watcher
//!
//! Opens one board, prints it after every change and every notification,
//! and closes the session cleanly on Ctrl-C.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;

use kanban_sync::models::{BoardId, Visibility};
use kanban_sync::{BoardSession, HttpGateway, SyncConfig, SyncResult};

const APP_NAME: &str = "kanban-sync";

#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about = "Watch a board and print every change")]
struct Cli {
    /// JSON settings file
    #[arg(long)]
    config: PathBuf,

    /// Board to open
    #[arg(long)]
    board: BoardId,

    /// Look the board up among private boards
    #[arg(long)]
    private: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match SyncConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME));
    if let Err(e) = rolling_logger::init_logger(&log_dir, APP_NAME) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = rolling_logger::error(&format!("Watcher stopped: {}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: SyncConfig) -> SyncResult<()> {
    let gateway = Arc::new(HttpGateway::new(&config)?);
    let visibility = if cli.private { Visibility::Private } else { Visibility::Public };

    let session = BoardSession::open(config, gateway, cli.board, visibility).await?;
    let _ = rolling_logger::info(&format!("Watching board {}", cli.board));
    print_board(&session);

    let mut changes = session.changes();
    let mut notices = session.notices();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                print_board(&session);
            }
            notice = notices.recv() => match notice {
                Ok(notice) => println!("[{:?}] {}", notice.level, notice.message),
                Err(RecvError::Lagged(skipped)) => println!("({} notifications skipped)", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let _ = rolling_logger::info("Closing board");
    session.close().await
}

fn print_board(session: &BoardSession) {
    session.view(|store| {
        println!("# {} (v{})", store.board().title, store.version());
        for lane in store.lanes() {
            println!("== {} ({})", lane.column.title, lane.cards.len());
            for card in &lane.cards {
                let assignee = card.assigned_to.as_deref().unwrap_or("-");
                println!("  {}. #{} {} [{:?}, {}]", card.position, card.id, card.title, card.priority, assignee);
            }
        }
    });
}
