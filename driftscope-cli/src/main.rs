use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Error,
    bail,
};
use driftscope_engine::{
    Capture,
    LogDirectory,
    Session,
    Transport,
    export_csv,
    reconcile,
};
use driftscope_types::Channel;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let log_dir = LogDirectory::new(args.log_dir);

    match args.command {
        Command::Capture {
            tcp,
            udp,
            file,
            duration,
            label,
        } => {
            let transport = match (tcp, udp, file) {
                (_, Some(_), Some(_)) => {
                    bail!("Both --udp and --file set. Either one must be used.")
                }
                (_, Some(bind), None) => Transport::Udp { bind },
                (_, None, Some(path)) => Transport::File { path },
                (Some(address), None, None) => Transport::Tcp { address },
                (None, None, None) => bail!("One of --tcp, --udp or --file is required."),
            };

            let session = Arc::new(Session::new());
            let capture = Capture::spawn(session.clone(), transport);

            tokio::spawn({
                let shutdown = capture.shutdown_token();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("interrupted");
                        shutdown.cancel();
                    }
                }
            });

            let capture = async move {
                if let Some(duration) = duration {
                    tracing::info!(duration = %humantime::format_duration(duration), "capturing");
                    capture.run_for(duration).await
                }
                else {
                    capture.join().await
                }
            };

            let recorded = log_dir.record(&session, capture, label.as_deref()).await?;
            println!("saved to {}", recorded.path.display());

            match recorded.result {
                Ok(stats) => {
                    println!(
                        "{} frames: {} decoded, {} dropped, {} samples",
                        stats.frames, stats.decoded, stats.dropped, stats.samples
                    );
                }
                // the session is saved, now report what ended the capture
                Err(error) => return Err(error.into()),
            }
        }
        Command::Summary { name } => {
            let (_, session) = open(&log_dir, name.as_deref()).await?;
            for (channel, summary) in reconcile::summary(&session) {
                println!(
                    "{} ({} sec): ({} inhibited, {} uninhibited, {} GPS)",
                    pad_title(channel),
                    summary.span_secs,
                    summary.inhibited,
                    summary.uninhibited,
                    summary.ground_truth,
                );
            }
        }
        Command::Thresholds { name } => {
            let (_, session) = open(&log_dir, name.as_deref()).await?;
            for (channel, threshold) in reconcile::thresholds(&session) {
                println!("{}: {threshold} ({})", pad_title(channel), channel.unit_label());
            }
        }
        Command::Export { name, out } => {
            let (path, session) = open(&log_dir, name.as_deref()).await?;
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("export");

            let tables = reconcile::diff_tables(&session);
            if tables.is_empty() {
                bail!("No matching timestamps in {}", path.display());
            }

            let tables = tokio::task::spawn_blocking({
                let out = out.clone();
                let stem = stem.to_owned();
                move || {
                    export_csv(&tables, &out, &stem)?;
                    Ok::<_, driftscope_engine::Error>(tables)
                }
            })
            .await??;

            for (channel, table) in &tables {
                println!(
                    "{}: {} rows, mean {}, rms {}",
                    pad_title(*channel),
                    table.rows.len(),
                    table.mean_abs_diff,
                    table.rms_diff,
                );
            }
            println!("written to {}", out.display());
        }
    }

    Ok(())
}

/// Loads the named recording, or the most recent one.
async fn open(log_dir: &LogDirectory, name: Option<&str>) -> Result<(PathBuf, Session), Error> {
    match log_dir.open(name).await? {
        Some(opened) => Ok(opened),
        None => {
            match name {
                Some(name) => bail!("Recording not found: {name}"),
                None => bail!("No recordings in {}", log_dir.path().display()),
            }
        }
    }
}

fn pad_title(channel: Channel) -> String {
    format!("{:<13}", channel.title())
}

#[derive(Debug, Parser)]
struct Args {
    /// Directory recordings are saved to and loaded from.
    #[clap(long, env = "DRIFTSCOPE_LOG_DIR", default_value = "logs", global = true)]
    log_dir: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record status text frames and save them as a new recording.
    Capture {
        /// Connect to a TCP server sending newline delimited frames.
        ///
        /// Ignored if --udp or --file is set.
        #[clap(short, long, env = "DRIFTSCOPE_ADDRESS")]
        tcp: Option<String>,

        /// Receive one frame per UDP datagram on this address.
        #[clap(short, long)]
        udp: Option<String>,

        /// Replay frames from a file.
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Stop after this long, e.g. `90s` or `5m`.
        ///
        /// Without it, the capture runs until the transport closes or Ctrl-C
        /// is pressed.
        #[clap(short, long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,

        /// Appended to the file name of the recording.
        #[clap(short, long)]
        label: Option<String>,
    },
    /// Sample counts and capture span per channel.
    Summary {
        /// File name of the recording. Defaults to the most recent one.
        name: Option<String>,
    },
    /// Difference between inhibited estimate and GPS at the last matching
    /// timestamp, per channel.
    Thresholds {
        /// File name of the recording. Defaults to the most recent one.
        name: Option<String>,
    },
    /// Write a CSV file of matched samples per channel.
    Export {
        /// File name of the recording. Defaults to the most recent one.
        name: Option<String>,

        /// Output directory.
        #[clap(short, long)]
        out: PathBuf,
    },
}
