use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use rl_core::{Config, Redline, RedlineError};
use rl_events::ConnectionRegistry;
use rl_vcs::{GitBackend, VcsBackend};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ulid::Ulid;

#[derive(Parser)]
#[command(name = "rl", about = "Shared code review between you and your coding agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the review API for the current repository
    Serve(ServeArgs),
    /// Print the current review document
    Show(RepoArgs),
    /// Print the OpenAPI document
    Openapi,
}

#[derive(Args)]
struct RepoArgs {
    /// Any path inside the repository
    #[arg(long, default_value = ".")]
    repo: PathBuf,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    repo: RepoArgs,
    #[arg(long)]
    host: Option<IpAddr>,
    #[arg(long)]
    port: Option<u16>,
    /// Diff base; defaults to the merge-base with the remote default branch
    #[arg(long = "ref")]
    base_ref: Option<String>,
    /// Shared capability token; generated when omitted
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Show(args) => show(&args),
        Command::Openapi => {
            println!("{}", rl_serve::openapi::generate_spec());
            Ok(())
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn open_core(
    repo: &RepoArgs,
    overrides: impl FnOnce(&mut Config),
) -> Result<Redline<GitBackend>, RedlineError> {
    let vcs = GitBackend::open(&repo.repo)?;
    let mut config = Config::load(vcs.root())?;
    overrides(&mut config);
    Redline::open(vcs, config, ConnectionRegistry::new())
}

fn show(args: &RepoArgs) -> Result<(), RedlineError> {
    let mut core = open_core(args, |_| {})?;
    let document = core.review().get()?;
    let json = serde_json::to_string_pretty(&document).map_err(|err| RedlineError::Internal {
        message: err.to_string(),
    })?;
    println!("{json}");
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), RedlineError> {
    let ServeArgs {
        repo,
        host,
        port,
        base_ref,
        token,
    } = args;
    let mut core = tokio::task::spawn_blocking(move || {
        open_core(&repo, |config| {
            if let Some(host) = host {
                config.host = host.to_string();
            }
            if let Some(port) = port {
                config.port = port;
            }
            if base_ref.is_some() {
                config.diff_ref = base_ref;
            }
            if token.is_some() {
                config.token = token;
            }
        })
    })
    .await
    .map_err(|err| RedlineError::Internal {
        message: err.to_string(),
    })??;
    core.start_watching()?;

    let config = core.config().clone();
    let host: IpAddr = config.host.parse().map_err(|_| {
        RedlineError::Config(rl_core::error::ConfigError::InvalidValue {
            name: "host",
            value: config.host.clone(),
        })
    })?;
    let addr = SocketAddr::new(host, config.port);
    let token = config
        .token
        .clone()
        .unwrap_or_else(|| Ulid::new().to_string().to_ascii_lowercase());

    println!(
        "{} reviewing {} against {}",
        "redline".bold().magenta(),
        core.store().branch().cyan(),
        core.default_ref().cyan()
    );
    println!("  {} http://{addr}/?token={token}", "open".green().bold());

    let state = rl_serve::AppState::new(core, token);
    let shutdown_state = state.clone();
    let shutdown = async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
        shutdown_state.shutdown().await;
    };

    rl_serve::serve(state, addr, shutdown)
        .await
        .map_err(|err| RedlineError::Internal {
            message: format!("server error: {err}"),
        })
}
