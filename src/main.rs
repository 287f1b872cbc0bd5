// osspilot command line

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use osspilot_lib::config::{app_data_dir, default_config_path};
use osspilot_lib::lcu::locator::is_league_install;
use osspilot_lib::lcu::{check_connectivity, ClientLocator, ConnectionManager};
use osspilot_lib::watcher::AcquisitionStrategyKind;
use osspilot_lib::{logging, Engine, PilotConfig, Result};

#[derive(Parser, Debug)]
#[command(name = "osspilot", version, about = "League client companion and automation engine")]
struct Cli {
  /// Path to config.json
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// League install directory (or a parent folder such as "Riot Games")
  #[arg(long, global = true)]
  league_path: Option<PathBuf>,

  /// push, polling, ui-automation or auto
  #[arg(long, global = true)]
  method: Option<AcquisitionStrategyKind>,

  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Watch the client and run the automation until Ctrl+C ("reset" on stdin clears an error)
  Run,
  /// Print a connectivity snapshot as JSON
  Status,
  /// Find the client's lockfile and print the endpoint
  Locate,
  /// Write the current log to a timestamped file
  ExportLogs,
}

fn load_config(cli: &Cli) -> Result<PilotConfig> {
  let path = cli.config.clone().unwrap_or_else(default_config_path);
  let mut config = PilotConfig::load(&path)?;
  if let Some(path) = &cli.league_path {
    config.league_path = Some(path.clone());
  }
  if let Some(method) = cli.method {
    config.acquisition_method = method;
  }
  if cli.verbose {
    config.verbose_logging = true;
  }
  Ok(config)
}

async fn run(config: PilotConfig) -> Result<()> {
  let _guard = logging::init(&app_data_dir(), config.verbose_logging)?;
  let engine = Engine::new(config)?;
  let mut status = engine.subscribe_status();
  let reset = engine.reset_handle();
  let cancel = CancellationToken::new();

  // Typing "reset" on the console clears an automation error
  let console = cancel.clone();
  tokio::spawn(async move {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
      let line = tokio::select! {
        _ = console.cancelled() => break,
        line = lines.next_line() => line,
      };
      match line {
        Ok(Some(line)) if line.trim().eq_ignore_ascii_case("reset") => {
          tracing::info!("[Engine] Reset requested from the console");
          if !reset.reset().await {
            break;
          }
        }
        Ok(Some(_)) => {}
        Ok(None) | Err(_) => break,
      }
    }
  });

  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::info!("[Engine] Ctrl+C received, shutting down");
    }
    on_signal.cancel();
  });

  let report = cancel.clone();
  tokio::spawn(async move {
    loop {
      tokio::select! {
        _ = report.cancelled() => break,
        changed = status.changed() => {
          if changed.is_err() {
            break;
          }
          let s = status.borrow_and_update().clone();
          tracing::info!(
            "[Status] client: {}, strategy: {:?}{}, automation: {}",
            if s.connectivity.api_reachable { "connected" } else { "waiting" },
            s.active_strategy,
            if s.strategy_degraded { " (degraded)" } else { "" },
            s.automation_state
          );
          if let Some(failure) = &s.last_failure {
            tracing::warn!("[Status] Last failure: {}", failure);
          }
        }
      }
    }
  });

  engine.run(cancel).await
}

async fn status(config: PilotConfig) -> Result<()> {
  let locator = ClientLocator::new(config.league_path.clone());
  let connection = ConnectionManager::new(config.connection_options())?;
  let probe = locator.clone();
  let endpoint = tokio::task::spawn_blocking(move || probe.locate())
    .await
    .unwrap_or(None);
  connection.set_endpoint(endpoint);
  let snapshot = check_connectivity(&locator, &connection).await;
  println!("{}", serde_json::to_string_pretty(&snapshot)?);
  Ok(())
}

fn locate(config: &PilotConfig) -> ExitCode {
  let locator = ClientLocator::new(config.league_path.clone());
  match locator.locate() {
    Some(endpoint) => {
      println!("install dir : {}", endpoint.install_dir.display());
      println!("lockfile    : {}", endpoint.lockfile_path.display());
      println!("process     : {} (pid {})", endpoint.process_name, endpoint.pid);
      println!("api         : {}", endpoint.base_url());
      if !is_league_install(&endpoint.install_dir) {
        println!("note        : no League executable next to the lockfile");
      }
      ExitCode::SUCCESS
    }
    None => {
      println!("No running client found. Searched:");
      for dir in locator.search_dirs() {
        println!("  {}", dir.display());
      }
      ExitCode::from(2)
    }
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  let config = match load_config(&cli) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("osspilot: {}", e);
      return ExitCode::FAILURE;
    }
  };

  let result = match cli.command.unwrap_or(Command::Run) {
    Command::Run => run(config).await,
    Command::Status => status(config).await,
    Command::Locate => return locate(&config),
    Command::ExportLogs => logging::export_logs(&app_data_dir()).map(|path| println!("{}", path.display())),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("osspilot: {}", e);
      ExitCode::FAILURE
    }
  }
}
