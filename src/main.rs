use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use breath_lamp::config::{load_config, save_config, Config};
use breath_lamp::error::Error;
use breath_lamp::keys;
use breath_lamp::lamp::TerminalLamp;
use breath_lamp::local::server;
use breath_lamp::local::session::{
    announce_ready, run_session, ChildService, RemoteService, ServiceHandle, ThreadService,
};
use breath_lamp::utils::log::init_logging;

// --- CLI Arguments ---
#[derive(Parser, Debug)]
#[command(version, about = "Radar breathing monitor driving a smart lamp", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// YAML configuration file (`-` reads it from stdin)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch the acquisition service and run the lamp control loop (default)
    Run {
        /// Run the acquisition service on a thread instead of a child process
        #[arg(long)]
        in_process: bool,

        /// Stop after this many control iterations
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Run only the acquisition service
    Serve {
        /// Address to bind, overrides the configuration
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Run only the control loop against a running acquisition service
    Control {
        /// Address of the acquisition service, overrides the configuration
        #[arg(short, long)]
        address: Option<String>,

        /// Stop after this many control iterations
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Write the default configuration to a file
    InitConfig { path: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> anyhow::Result<u8> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let command = args.command.unwrap_or(Commands::Run {
        in_process: false,
        max_ticks: None,
    });

    match command {
        Commands::Run {
            in_process,
            max_ticks,
        } => {
            init_logging(&config.logging, "control")?;
            if max_ticks.is_some() {
                config.control.max_iterations = max_ticks;
            }

            println!("{}", "Starting capture".cyan());
            if in_process {
                session(&config, ThreadService::spawn(&config))
            } else {
                let service =
                    ChildService::spawn(&config).context("launching acquisition service")?;
                session(&config, service)
            }
        }
        Commands::Serve { address } => {
            init_logging(&config.logging, "service")?;
            if let Some(address) = address {
                config.service.address = address;
            }

            match server::run(&config, announce_ready) {
                Ok(_) => Ok(0),
                Err(Error::DeviceConnection(reason)) => {
                    error!(%reason, "acquisition service not started");
                    Ok(1)
                }
                Err(e) => Err(e).context("acquisition service failed"),
            }
        }
        Commands::Control { address, max_ticks } => {
            init_logging(&config.logging, "control")?;
            if let Some(address) = address {
                config.service.address = address;
            }
            if max_ticks.is_some() {
                config.control.max_iterations = max_ticks;
            }

            let address = resolve(&config.service.address)?;
            session(&config, RemoteService::new(address))
        }
        Commands::InitConfig { path } => {
            save_config(&Config::default(), &path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(0)
        }
    }
}

fn session<S: ServiceHandle>(config: &Config, mut service: S) -> anyhow::Result<u8> {
    let lamp = TerminalLamp::new(config.lamp.bridge_address.clone());
    let keys = keys::platform_default();

    let outcome = run_session(config, &mut service, lamp, keys)?;
    info!(?outcome, "exiting");
    Ok(outcome.exit_code())
}

fn resolve(address: &str) -> anyhow::Result<SocketAddr> {
    address
        .to_socket_addrs()
        .with_context(|| format!("resolving {}", address))?
        .next()
        .with_context(|| format!("{} resolved to no address", address))
}
