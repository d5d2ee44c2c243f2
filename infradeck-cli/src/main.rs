#![allow(clippy::collapsible_if)]
#![allow(clippy::type_complexity)]

mod bootstrap;
mod commands;
mod engines;
mod environment;
mod inventory;
mod keymap;
mod logging;
mod runner;
mod ui;

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;

use infradeck_core::app::{App, Settings};
use infradeck_core::lookup::{FetchBridge, InventoryLookup};
use infradeck_core::pipeline::Provisioner;
use infradeck_core::reducer::{AppEvent, Effect, reduce};

use engines::{FakeInventory, FakeProvisioner, TerraformProvisioner};
use environment::EnvStatus;
use inventory::VaultProxmoxLookup;
use runner::EffectRunner;

#[derive(Parser)]
#[command(name = "infradeck")]
#[command(about = "Terminal dashboard for Terraform-managed VM deployments", long_about = None)]
struct Cli {
    /// Config file (default: $INFRADECK_CONFIG, then ./infradeck.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use in-process fakes instead of terraform and Vault/Proxmox
    #[arg(long, global = true, env = "INFRADECK_SIMULATE")]
    simulate: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard (default)
    Tui,
    /// Print the deployment summary
    List {
        #[arg(long)]
        json: bool,
    },
    /// Check configuration, tooling and credentials
    Doctor,
}

fn main() {
    let cli = Cli::parse();
    let tui = matches!(cli.command, None | Some(Commands::Tui));
    let _log_guard = logging::init(tui);

    let result = match cli.command {
        Some(Commands::List { json }) => commands::run_list(cli.config.as_deref(), json),
        Some(Commands::Doctor) => commands::run_doctor(cli.config.as_deref()),
        Some(Commands::Tui) | None => {
            run_detached(run_tui(cli.config.as_deref(), cli.simulate)).and_then(|r| r)
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %format!("{:#}", e), "exiting with error");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Drive `fut` on a fresh multi-thread runtime and return as soon as it
/// completes. Blocking tasks still running (an abandoned init or apply) are
/// not waited for.
fn run_detached<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    let output = runtime.block_on(fut);
    runtime.shutdown_background();
    Ok(output)
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_tui(config_path: Option<&Path>, simulate: bool) -> anyhow::Result<()> {
    let loaded = bootstrap::load(config_path)?;
    let config = loaded.config;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();

    let filter = config.lookup.filter()?;
    let (provisioner, lookup): (Arc<dyn Provisioner>, Arc<dyn InventoryLookup>) = if simulate {
        tracing::info!("simulation mode: no external tools will run");
        (Arc::new(FakeProvisioner::new()), Arc::new(FakeInventory::new(filter)))
    } else {
        let lookup = VaultProxmoxLookup::new(&config.lookup, filter).context("failed to build HTTP client")?;
        (Arc::new(TerraformProvisioner::new(config.provisioner.clone())), Arc::new(lookup))
    };

    let bridge = FetchBridge::new(lookup, event_tx.clone()).with_timeout(config.lookup.timeout());
    let runner = EffectRunner::new(
        provisioner,
        bridge,
        event_tx.clone(),
        config.apps_dir(),
        config.description_field.clone(),
    );

    let settings = Settings::from_config(&config, loaded.catalog, loaded.presets);
    let mut app = App::new(settings);
    let mut env = EnvStatus::probe(&config);
    runner.run(Effect::RefreshListing);

    let mut terminal = setup_terminal().context("failed to initialise the terminal")?;
    let result = event_loop(&mut terminal, &mut app, &mut env, &config, &runner, &event_tx, &mut event_rx).await;
    restore_terminal(terminal).context("failed to restore the terminal")?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    env: &mut EnvStatus,
    config: &infradeck_core::config::Config,
    runner: &EffectRunner,
    event_tx: &mpsc::UnboundedSender<AppEvent>,
    event_rx: &mut mpsc::UnboundedReceiver<AppEvent>,
) -> anyhow::Result<()> {
    loop {
        // results from background work
        while let Ok(ev) = event_rx.try_recv() {
            let effects = reduce(app, ev);
            dispatch(effects, runner, env, config);
        }
        if app.should_quit {
            match &app.busy {
                Some(busy) => tracing::warn!(
                    deployment = %busy.deployment,
                    kind = ?busy.kind,
                    "quitting with a pipeline still running; it is abandoned"
                ),
                None => tracing::info!("quitting"),
            }
            return Ok(());
        }

        terminal.draw(|f| ui::draw(f, app, env))?;

        // crossterm polling blocks; keep it off the runtime's workers
        let next = tokio::task::block_in_place(|| -> io::Result<Option<CEvent>> {
            if !event::poll(Duration::from_millis(50))? {
                return Ok(None);
            }
            event::read().map(Some)
        })?;

        let Some(CEvent::Key(key_event)) = next else {
            continue;
        };
        if let Some(key) = keymap::translate(key_event) {
            // routed through the channel so key and result ordering is preserved
            let _ = event_tx.send(AppEvent::Key(key));
        }
    }
}

fn dispatch(effects: Vec<Effect>, runner: &EffectRunner, env: &mut EnvStatus, config: &infradeck_core::config::Config) {
    for effect in effects {
        if effect == Effect::RefreshListing {
            *env = EnvStatus::probe(config);
        }
        runner.run(effect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_run_detached_does_not_wait_for_blocking_work() {
        let started = Instant::now();
        let value = run_detached(async {
            tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(3)));
            7
        })
        .unwrap();
        assert_eq!(value, 7);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["infradeck", "list", "--json", "--config", "x.yaml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::List { json: true })));
        assert_eq!(cli.config, Some(PathBuf::from("x.yaml")));
    }
}
