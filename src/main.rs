mod app;
mod breadcrumb;
mod cli;
mod config;
mod input;
mod install;
mod k8s;
mod kubeconfig;
mod model;
mod nav;
mod pool;
#[cfg(test)]
mod testing;
mod ui;
mod upbound;

use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use app::{App, AppCommand};
use clap::Parser;
use cli::{CliArgs, CliCommand, PrerequisiteAction};
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use install::{CloudNativePg, HelmCli, KubeOperatorCluster, Prerequisite};
use k8s::{CloudSpaceCatalog, KubeContextProber, KubeSpaceApi};
use kubeconfig::{ConfigStore, FileConfigStore};
use nav::NavContext;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use upbound::{PublicIngressReader, UpboundOrganizations};

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(
        &args.log_filter,
        args.log_file.as_deref(),
        args.command.is_none(),
    )?;

    let store = FileConfigStore::discover(args.kubeconfig.clone())?;
    debug!(kubeconfig = %store.path().display(), "using kubeconfig");

    match args.command.clone() {
        Some(CliCommand::Cnpg { context, action }) => {
            run_prerequisite(&store, context, action).await
        }
        None => navigate(&args, store).await,
    }
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>, interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    // The terminal UI owns the screen; without a log file output is dropped.
    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None if interactive => BoxMakeWriter::new(io::sink),
        None => BoxMakeWriter::new(io::stderr),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(log_file.is_none() && !interactive)
        .compact()
        .with_writer(writer)
        .try_init();

    Ok(())
}

async fn navigate(args: &CliArgs, store: FileConfigStore) -> Result<()> {
    let profile = config::load_profile(args.profile.as_deref())?;
    info!(profile = %profile.name, account = ?profile.account, "starting navigation");

    let ingress_timeout = Duration::from_millis(args.ingress_timeout_ms.max(1));
    let ctx = NavContext {
        profile: profile.name.clone(),
        organizations: Arc::new(UpboundOrganizations::new(&profile)?),
        spaces: Arc::new(CloudSpaceCatalog::new(&profile)),
        ingress: Arc::new(PublicIngressReader::new(ingress_timeout)),
        prober: Arc::new(KubeContextProber),
        space_api: Arc::new(KubeSpaceApi),
        store: Arc::new(store),
        ingress_timeout,
    };

    let mut app = App::default();
    run(&mut app, &ctx).await?;

    if let Some(message) = app.termination() {
        println!("{message}");
    }
    Ok(())
}

async fn run(app: &mut App, ctx: &NavContext) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, ctx).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(terminal: &mut TuiTerminal, app: &mut App, ctx: &NavContext) -> Result<()> {
    app.set_loading();
    draw(terminal, app)?;
    refresh_items(app, ctx).await;

    let mut reader = EventStream::new();
    loop {
        draw(terminal, app)?;
        if !app.running() {
            break;
        }

        match reader.next().await {
            Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                let Some(action) = input::map_key(app.mode(), key) else {
                    continue;
                };
                debug!("action={action:?}");
                if let AppCommand::Apply(item_action) = app.apply_action(action) {
                    app.set_loading();
                    draw(terminal, app)?;
                    let step = app.session().apply(&item_action, ctx).await;
                    if app.finish_step(step) {
                        refresh_items(app, ctx).await;
                    }
                }
            }
            Some(Ok(_)) => {}
            Some(Err(error)) => {
                app.set_status(format!("terminal event error: {error}"));
            }
            None => {
                warn!("terminal event stream closed");
                break;
            }
        }
    }

    Ok(())
}

fn draw(terminal: &mut TuiTerminal, app: &App) -> Result<()> {
    terminal
        .draw(|frame| ui::render(frame, app))
        .context("failed to render terminal frame")?;
    Ok(())
}

async fn refresh_items(app: &mut App, ctx: &NavContext) {
    app.set_loading();
    let listing = app.session().items(ctx).await;
    if let Err(error) = &listing {
        warn!("listing failed: {error:#}");
    }
    app.set_items(listing);
}

async fn run_prerequisite(
    store: &FileConfigStore,
    context: Option<String>,
    action: PrerequisiteAction,
) -> Result<()> {
    let client = k8s::client_from_kubeconfig(store.load()?, context.as_deref()).await?;
    let helm = HelmCli::new(Some(store.location()), context);
    let prerequisite =
        CloudNativePg::new(Box::new(KubeOperatorCluster::new(client)), Box::new(helm));

    match action {
        PrerequisiteAction::Install => {
            prerequisite
                .install()
                .await
                .with_context(|| format!("failed to install {}", prerequisite.name()))?;
            println!("{} is installed", prerequisite.name());
        }
        PrerequisiteAction::Status => {
            let state = if prerequisite.is_installed().await? {
                "installed"
            } else {
                "not installed"
            };
            println!("{}: {state}", prerequisite.name());
        }
    }
    Ok(())
}
