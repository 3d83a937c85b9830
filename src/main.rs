//! Strictly Match - unified CLI
//!
//! Offline hot-seat play, online play against a match host, and the
//! reference host itself.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::path::PathBuf;
use std::sync::Arc;
use strictly_match::{
    ClientConfig, Credential, HostConfig, LocalMatch, MatchError, MatchHost, MatchMode,
    MatchSession, MatchSnapshot, Position, TcpConnector, list_rooms,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Local => run_local().await,
        Command::Play {
            config,
            host,
            token,
            bot,
            join,
        } => {
            let mode = match (bot, join) {
                (Some(difficulty), _) => MatchMode::CreateVsBot(difficulty),
                (None, Some(match_id)) => MatchMode::JoinRoom(match_id),
                (None, None) => MatchMode::CreateVsPlayer,
            };
            run_play(config, host, token, mode).await
        }
        Command::Serve { bind } => run_host(bind).await,
        Command::Rooms {
            config,
            host,
            token,
        } => run_rooms(config, host, token).await,
    }
}

fn client_config(path: Option<PathBuf>, host: Option<String>) -> Result<ClientConfig> {
    let config = ClientConfig::load(path.as_deref())?;
    let config = match host {
        Some(host) => config.with_host(host),
        None => config,
    };
    config.validate()?;
    Ok(config)
}

fn credential(token: Option<String>) -> Result<Credential> {
    token
        .map(Credential::new)
        .or_else(Credential::from_env)
        .with_context(|| format!("Pass --token or set {}", Credential::ENV_VAR))
}

/// Hot-seat match on this terminal.
async fn run_local() -> Result<()> {
    let mut game = LocalMatch::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", game.board().display());
    while let Some(mark) = game.turn() {
        println!("{} to move (1-9, r to reset, q to quit):", mark);
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "q" => break,
            "r" => {
                game.reset();
                println!("{}", game.board().display());
                continue;
            }
            input => match Position::from_cell_number(input) {
                Some(position) => {
                    if game.submit_move(position.to_index()).is_ok() {
                        println!("{}", game.board().display());
                    }
                }
                None => println!("Enter a cell number 1-9"),
            },
        }
    }

    if game.status().is_terminal() {
        println!("{}", game.status());
    }
    Ok(())
}

/// Online match against a host.
#[instrument(skip(config, token))]
async fn run_play(
    config: Option<PathBuf>,
    host: Option<String>,
    token: Option<String>,
    mode: MatchMode,
) -> Result<()> {
    let config = client_config(config, host)?;
    let credential = credential(token)?;
    let connector = Arc::new(TcpConnector::new(config.host().clone()));
    let session = MatchSession::new(connector, credential, config.timings());

    let seat = session.create_or_join(mode).await?;
    println!("Match {}: you play {}", seat.match_id(), seat.local_mark());

    let mut view = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    render(&view.borrow_and_update());

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                render(&snapshot);
                if snapshot.phase.is_terminal() {
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let input = line.trim();
                if input == "q" {
                    break;
                }
                match Position::from_cell_number(input) {
                    Some(position) => {
                        let session = session.clone();
                        tokio::spawn(async move {
                            match session.submit_move(position.to_index()).await {
                                Ok(_) | Err(MatchError::RuleViolation(_)) => {}
                                Err(e) => eprintln!("{}", e),
                            }
                        });
                    }
                    None => println!("Enter a cell number 1-9, or q to quit"),
                }
            }
        }
    }

    session.teardown().await;
    Ok(())
}

fn render(snapshot: &MatchSnapshot) {
    println!();
    println!("{}", snapshot.displayed_board.display());
    match (snapshot.turn, snapshot.local_mark) {
        (Some(turn), Some(mine)) if turn == mine && snapshot.pending_cell.is_none() => {
            println!("Your move ({})", mine);
        }
        (Some(turn), _) if snapshot.pending_cell.is_some() => {
            println!("Waiting for the host to confirm ({} to move)", turn);
        }
        (Some(turn), _) => println!("Waiting for {}", turn),
        (None, _) => println!("[{}]", snapshot.phase),
    }
    if snapshot.opponent_away {
        println!("Opponent disconnected; waiting for them to return");
    }
    if let Some(reason) = &snapshot.reason {
        println!("{}", reason);
    }
}

/// Reference host.
async fn run_host(bind: String) -> Result<()> {
    let config = HostConfig::default().with_bind(bind);
    let host = MatchHost::bind(&config)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind()))?;
    info!("Host ready");
    host.run().await?;
    Ok(())
}

/// Room listing.
async fn run_rooms(
    config: Option<PathBuf>,
    host: Option<String>,
    token: Option<String>,
) -> Result<()> {
    let config = client_config(config, host)?;
    let credential = credential(token)?;
    let connector = Arc::new(TcpConnector::new(config.host().clone()));

    let rooms = list_rooms(connector, credential, config.link_options()).await?;
    if rooms.is_empty() {
        println!("No open rooms");
    }
    for room in rooms {
        println!("{}  ({}/2)", room.match_id, room.occupancy);
    }
    Ok(())
}
