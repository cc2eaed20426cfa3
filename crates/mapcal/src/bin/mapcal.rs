use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use mapcal::{
    delivery::{serialize_transform, DeliveryError, ResultChannel},
    project::{ProjectError, ProjectFile},
    terminal::{TerminalAdapter, TerminalError},
    PoseQueryError, SessionError,
};

#[derive(Parser, Debug)]
#[command(
    name = "mapcal",
    version,
    about = "Calibrate the transform from floor-plan map coordinates to the robot localization frame"
)]
struct Cli {
    /// Project file listing the calibration points and the pose source.
    project: PathBuf,
    /// Send the transform as one UDP datagram to this port instead of printing it.
    port: Option<u16>,
    /// Host receiving the datagram.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// More log output (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("invalid result destination: {0}")]
    Destination(#[source] DeliveryError),
    #[error("cannot open pose source: {0}")]
    PoseSource(#[source] PoseQueryError),
    #[error(transparent)]
    Terminal(#[from] TerminalError),
    #[error("transform computed but not delivered: {0}")]
    Delivery(#[source] DeliveryError),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Project(ProjectError::Read { .. }) | CliError::Destination(_) => 2,
            CliError::Project(ProjectError::NotCalibrationConfig { .. }) => 3,
            CliError::Project(_) => 4,
            CliError::Terminal(TerminalError::Session(SessionError::Estimation(_))) => 5,
            CliError::Delivery(_) => 6,
            CliError::PoseSource(_) | CliError::Terminal(_) => 1,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::debug!("{err:?}");
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let channel = match cli.port {
        Some(port) => ResultChannel::udp(&cli.host, port).map_err(CliError::Destination)?,
        None => ResultChannel::Stdout,
    };

    let project = ProjectFile::load_json(&cli.project)?;
    project.ensure_calibration_config()?;
    let mut session = project.build_session()?;
    log::info!(
        "loaded {} calibration points from {}",
        session.points().len(),
        cli.project.display()
    );

    let mut poses = project.pose_source.connect().map_err(CliError::PoseSource)?;

    let mut terminal = TerminalAdapter::new(io::stdin().lock(), io::stderr());
    let fit = terminal.run(&mut session, &mut *poses)?;

    let mut stdout = io::stdout().lock();
    if let Err(err) = channel.deliver(&fit.transform, &mut stdout) {
        if channel != ResultChannel::Stdout {
            let text = serialize_transform(&fit.transform)
                .unwrap_or_else(|_| fit.transform.to_string());
            // Best effort; the delivery error is what gets reported.
            let _ = writeln!(stdout, "{text}");
        }
        return Err(CliError::Delivery(err));
    }
    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = mapcal::core::level_from_verbosity(cli.verbose, cli.quiet);

    #[cfg(feature = "tracing")]
    {
        if let Err(e) = tracing_log::LogTracer::init_with_filter(level) {
            eprintln!("warning: cannot forward log records to tracing: {e}");
        }
        mapcal::core::init_tracing(false, level);
    }

    #[cfg(not(feature = "tracing"))]
    {
        if let Err(e) = mapcal::core::init_with_level(level) {
            eprintln!("warning: cannot install logger: {e}");
        }
    }
}
