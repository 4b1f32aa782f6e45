//! airlockctl - drive a channel from the command line.
//!
//! Pokes an agent or follows a subscription using the connection settings
//! from the airlock config file and `AIRLOCK__*` environment variables.

use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use airlock::{AirlockConfig, Cage, Channel, SubscriptionEvent};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde_json::Value;
use tracing::{debug, info, warn};

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config_path = AirlockConfig::resolve_path(cli.config.as_deref());
    debug!(config = ?config_path, "resolved config path");

    match cli.command {
        Command::Poke { app, mark, json } => {
            let config = load_config(config_path.as_deref())?;
            handle_poke(&config, &app, &mark, &json, cli.json).await
        }
        Command::Subscribe {
            app,
            path,
            mark,
            max_events,
        } => {
            let config = load_config(config_path.as_deref())?;
            handle_subscribe(&config, &app, &path, &mark, max_events, cli.json).await
        }
        Command::Config { command } => handle_config(command, config_path.as_deref(), cli.json),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "airlockctl",
    author,
    version,
    about = "Poke agents and follow subscriptions over a channel."
)]
struct Cli {
    /// Path to the config file (defaults to <config dir>/airlock/config.toml)
    #[arg(long, short = 'c', env = "AIRLOCK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Reduce output to only errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,

    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poke an agent and wait for the answer
    Poke {
        /// Agent to poke
        app: String,

        /// Mark of the payload
        mark: String,

        /// Payload as JSON
        json: String,
    },

    /// Subscribe to a path and print events until the server quits
    Subscribe {
        /// Agent to subscribe to
        app: String,

        /// Subscription path (e.g. "/updates")
        path: String,

        /// Mark the diffs are expected to carry
        #[arg(long, short = 'm', default_value = "json")]
        mark: String,

        /// Unsubscribe after this many events
        #[arg(long, short = 'n')]
        max_events: Option<usize>,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

fn effective_log_level(cli: &Cli) -> LevelFilter {
    if cli.trace {
        LevelFilter::Trace
    } else if cli.debug {
        LevelFilter::Debug
    } else {
        match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn init_logging(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    if cli.quiet {
        log::set_max_level(LevelFilter::Off);
        return;
    }

    let level = effective_log_level(cli);
    let name = level.to_string().to_lowercase();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("airlock={name},airlockctl={name}"))
    });

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .ok();
    } else {
        let disable_color = env::var_os("NO_COLOR").is_some() || !io::stderr().is_terminal();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(!disable_color)
                    .with_writer(io::stderr),
            )
            .try_init()
            .ok();
    }

    // Also init env_logger for compatibility with log crate users
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    builder.filter_level(level);
    builder.try_init().ok();
}

fn load_config(path: Option<&Path>) -> Result<AirlockConfig> {
    let config = AirlockConfig::load(path).context("loading configuration")?;
    if config.connection.ship.is_empty() {
        anyhow::bail!("no ship configured; set connection.ship or AIRLOCK__CONNECTION__SHIP");
    }
    Ok(config)
}

async fn handle_poke(
    config: &AirlockConfig,
    app: &str,
    mark: &str,
    json: &str,
    json_output: bool,
) -> Result<()> {
    let data: Value = serde_json::from_str(json).context("parsing poke payload as JSON")?;
    let channel = Channel::over_http(config.connection.clone(), &config.client)
        .context("creating channel")?;

    let poke = channel
        .start_poke(app, Cage::new(mark, data))
        .await
        .context("sending poke")?;
    info!(id = poke.id(), app, "poke sent");

    poke.outcome()
        .await
        .with_context(|| format!("poke to {app}"))?;

    if json_output {
        println!("{}", serde_json::json!({"ok": true}));
    } else {
        println!("ok");
    }
    Ok(())
}

async fn handle_subscribe(
    config: &AirlockConfig,
    app: &str,
    path: &str,
    mark: &str,
    max_events: Option<usize>,
    json_output: bool,
) -> Result<()> {
    let channel = Channel::over_http(config.connection.clone(), &config.client)
        .context("creating channel")?;

    let (id, mut events) = channel
        .subscribe_events(app, path, mark)
        .await
        .context("sending subscribe")?;
    info!(id, app, path, "subscribed");

    let mut seen = 0usize;
    let mut unsubscribed = false;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c(), if !unsubscribed => {
                info!(id, "interrupted, unsubscribing");
                channel.unsubscribe(id).await.context("sending unsubscribe")?;
                unsubscribed = true;
                continue;
            }
        };

        let Some(event) = event else {
            warn!(id, "subscription queue closed");
            break;
        };

        match event {
            SubscriptionEvent::Event(cage) => {
                print_cage(&cage, json_output)?;
                seen += 1;
                if !unsubscribed && max_events.is_some_and(|max| seen >= max) {
                    channel.unsubscribe(id).await.context("sending unsubscribe")?;
                    unsubscribed = true;
                }
            }
            SubscriptionEvent::Error(err) => {
                anyhow::bail!("subscription to {app}{path} refused: {err}");
            }
            SubscriptionEvent::Quit(_) => {
                info!(id, seen, "subscription ended by server");
                break;
            }
        }
    }

    Ok(())
}

fn print_cage(cage: &Cage, json_output: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if json_output {
        writeln!(stdout, "{}", serde_json::to_string(cage)?)?;
    } else {
        writeln!(
            stdout,
            "[{}] {}",
            cage.mark,
            serde_json::to_string_pretty(&cage.data)?
        )?;
    }
    stdout.flush()?;
    Ok(())
}

fn handle_config(command: ConfigCommand, path: Option<&Path>, json_output: bool) -> Result<()> {
    match command {
        ConfigCommand::Init { force } => {
            let path = path.context("could not determine a config directory; pass --config")?;
            if path.exists() && !force {
                anyhow::bail!(
                    "config file {} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            AirlockConfig::write_default(path)
                .with_context(|| format!("writing config file to {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        ConfigCommand::Show => {
            let config = AirlockConfig::load(path)
                .context("loading configuration")?
                .redacted();
            if json_output {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&config).context("rendering configuration")?
                );
            }
        }
    }
    Ok(())
}
