//! autologin - launch a game and type the login
//!
//! Starts the game detached, then clicks the calibrated username and
//! password fields and types the credentials. The `calibrate` command
//! records those field positions from the live pointer.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use autologin::{
    load_coordinates, save_coordinates, AutoLogin, AutoLoginError, Config, CoordinateField,
    Credential, InputBackend, LaunchRequest,
};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "autologin", version, about = "Launch a game and type its login")]
struct Cli {
    /// Directory holding login_coords_* files
    #[arg(long, global = true, env = "AUTOLOGIN_COORDS_DIR", default_value = ".")]
    coords_dir: PathBuf,

    /// Input backend: x11 or rdev
    #[arg(long, global = true)]
    backend: Option<InputBackend>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch the game, then type the login if coordinates are given
    Launch {
        /// Path to the game executable
        #[arg(long)]
        exe: PathBuf,

        #[arg(long)]
        username: String,

        #[arg(long, env = "AUTOLOGIN_PASSWORD", hide_env_values = true)]
        password: String,

        /// Display name used in log lines
        #[arg(long)]
        alias: Option<String>,

        /// Coordinate file name; without it the game is only launched
        #[arg(long)]
        coords: Option<String>,

        /// Arguments passed to the game
        #[arg(last = true)]
        args: Vec<OsString>,
    },

    /// Record field positions from the pointer after a countdown
    Calibrate {
        /// Coordinate file name
        #[arg(long)]
        coords: String,

        /// Fields to capture, in order (default: username then password)
        #[arg(long = "field")]
        fields: Vec<CoordinateField>,

        /// Print the result instead of saving it
        #[arg(long)]
        no_save: bool,
    },

    /// Print a stored coordinate record
    ShowCoords {
        #[arg(long)]
        coords: String,
    },

    /// Move the pointer over both stored positions
    TestCoords {
        #[arg(long)]
        coords: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging; stdout is kept for command output
    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = Config::default()
        .with_coords_dir(cli.coords_dir)
        .with_verbose(cli.verbose);
    if let Some(backend) = cli.backend {
        config = config.with_backend(backend);
    }

    match run(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &Config) -> Result<ExitCode, AutoLoginError> {
    match command {
        Command::Launch {
            exe,
            username,
            password,
            alias,
            coords,
            args,
        } => {
            let mut credential = Credential::new(username, password);
            if let Some(alias) = alias {
                credential = credential.with_alias(alias);
            }
            let mut request = LaunchRequest::new(exe, credential).with_args(args);
            if let Some(name) = coords {
                request = request.with_coordinates(load_coordinates(&config.coords_dir, &name)?);
            }
            launch(request, config)
        }
        Command::Calibrate {
            coords,
            fields,
            no_save,
        } => calibrate(&coords, &fields, no_save, config),
        Command::ShowCoords { coords } => {
            let set = load_coordinates(&config.coords_dir, &coords)?;
            println!("{}", serde_json::to_string_pretty(&set.to_record())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::TestCoords { coords } => {
            let set = load_coordinates(&config.coords_dir, &coords)?;
            let app = AutoLogin::from_config(config);
            let report = app.sequencer()?.preview(&set)?;
            if report.completed() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn launch(request: LaunchRequest, config: &Config) -> Result<ExitCode, AutoLoginError> {
    let app = AutoLogin::from_config(config);
    let outcome = app.launch_game(request);
    println!("{}", serde_json::to_string(&outcome.result)?);

    if !outcome.result.success {
        return Ok(ExitCode::FAILURE);
    }

    if let Some(replay) = outcome.replay {
        let report = replay.join();
        match report.aborted {
            None => info!("Login typed ({} events)", report.events_injected),
            Some(reason) => warn!(
                "Login replay stopped after {} events: {}",
                report.events_injected, reason
            ),
        }
    }

    // The game keeps running after we exit; report a fault only if one is already known
    if let Some(fault) = outcome.faults.and_then(|faults| faults.try_recv().ok()) {
        warn!("Game process reported a fault: {:?}", fault);
    }

    Ok(ExitCode::SUCCESS)
}

fn calibrate(
    name: &str,
    fields: &[CoordinateField],
    no_save: bool,
    config: &Config,
) -> Result<ExitCode, AutoLoginError> {
    let fields = if fields.is_empty() {
        &CoordinateField::ALL[..]
    } else {
        fields
    };

    // Ctrl+C cannot stop a countdown, it only drops the result
    let abandoned = Arc::new(AtomicBool::new(false));
    let abandoned_clone = abandoned.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Calibration abandoned, finishing the current countdown without saving");
        abandoned_clone.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl+C handler: {}", e);
    }

    let app = AutoLogin::from_config(config).with_pointer_from_config(config)?;
    let mut session = app.calibration_session(load_coordinates(&config.coords_dir, name)?);

    for &field in fields {
        if abandoned.load(Ordering::SeqCst) {
            break;
        }
        info!("Hover over the {} of the game's login screen", field.label());
        app.calibrate_field(&mut session, field, |n| {
            info!("Capturing {} position in {}...", field, n)
        })?;
    }

    if abandoned.load(Ordering::SeqCst) {
        info!("Unsaved coordinates discarded");
        return Ok(ExitCode::from(130));
    }

    let coords = session.into_coordinates();
    info!("{}", coords.username);
    info!("{}", coords.password);

    if no_save {
        println!("{}", serde_json::to_string_pretty(&coords.to_record())?);
    } else {
        save_coordinates(&config.coords_dir, name, &coords)?;
    }
    Ok(ExitCode::SUCCESS)
}
