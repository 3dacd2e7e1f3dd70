use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use sweeper_core::{CellCount, Coord, GameConfig, GameState};
use sweeper_protocol::GameResponse;
use sweeper_worker::cli::{self, LineCommand};
use sweeper_worker::{
    Gateway, LocalExecutor, SessionHistory, SessionRegistry, Settings, SystemClock,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Preset {
    Beginner,
    Intermediate,
    Expert,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// What log level to use
    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity,

    /// Board preset, overrides width/height/mines
    #[arg(short, long, value_enum)]
    preset: Option<Preset>,

    #[arg(long, default_value_t = 9)]
    width: Coord,

    #[arg(long, default_value_t = 9)]
    height: Coord,

    #[arg(short, long, default_value_t = 10)]
    mines: CellCount,

    /// Force a seed instead of random
    #[arg(short, long)]
    seed: Option<u64>,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session history (JSON Lines); resumed from if it exists, written on exit
    #[arg(long)]
    history: Option<PathBuf>,
}

impl Args {
    fn game_config(&self) -> GameConfig {
        match self.preset {
            Some(Preset::Beginner) => GameConfig::beginner(),
            Some(Preset::Intermediate) => GameConfig::intermediate(),
            Some(Preset::Expert) => GameConfig::expert(),
            None => GameConfig::new(self.width, self.height, self.mines),
        }
    }
}

fn load_history(path: &Path) -> anyhow::Result<Option<SessionHistory>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading history from {}", path.display()))?;
    let history = SessionHistory::from_jsonl(&text)
        .with_context(|| format!("parsing history in {}", path.display()))?;
    Ok(Some(history))
}

fn print_json(state: &GameState) -> anyhow::Result<()> {
    println!("{}", GameResponse::new(state).to_json_string()?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .parse_default_env()
        .init();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if args.seed.is_some() {
        settings.work.seed = args.seed;
    }
    log::debug!("settings: {settings:?}");

    let registry = SessionRegistry::new(
        Arc::new(LocalExecutor::new(&settings.work)),
        Arc::new(SystemClock),
        settings.session.clone(),
    );
    let gateway = Gateway::new(registry.clone(), settings.gateway.clone());

    let mut config = args.game_config();
    let resumed = match &args.history {
        Some(path) => load_history(path)?,
        None => None,
    };
    let id = match resumed {
        Some(history) => {
            let handle = registry.resume(history).await?;
            handle.id().to_owned()
        }
        None => gateway.create_game(config).await?.id,
    };
    let handle = registry
        .get(&id)
        .await
        .with_context(|| format!("session {id} is not registered"))?;

    print!("{}", cli::render(&gateway.query(&id).await?));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<LineCommand>() {
            Ok(command) => command,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };

        let result = match command {
            LineCommand::Move(request) => gateway.make_move(&id, request).await,
            LineCommand::Restart(next) => {
                if let Some(next) = next {
                    config = next;
                }
                gateway.restart(&id, config).await
            }
            LineCommand::Close => {
                gateway.close(&id).await?;
                Ok(handle.closed().await?)
            }
            LineCommand::Show => gateway.query(&id).await,
            LineCommand::Json => {
                print_json(&gateway.query(&id).await?)?;
                continue;
            }
            LineCommand::Quit => break,
        };

        match result {
            Ok(state) => print!("{}", cli::render(&state)),
            Err(err) => eprintln!("{err}"),
        }
    }

    if let Some(path) = &args.history {
        let history = handle.history().await?;
        std::fs::write(path, history.to_jsonl()?)
            .with_context(|| format!("writing history to {}", path.display()))?;
        log::info!("saved {} history records to {}", history.len(), path.display());
    }

    Ok(())
}
