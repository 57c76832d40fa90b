mod command;
mod event;
mod ui;

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use crate::command::Args;
use crate::event::{Output, spawn_event_printer};
use crate::ui::{print_banner, print_failure, print_success};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Tracing goes to stderr so it doesn't mix with the upload log on
    // stdout.
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())),
        )
        .init();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_failure(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let request = args.to_request();
    let config = args.to_config();
    debug!(
        device = %request.device_address(),
        port = request.device_port(),
        bind = %request.bind_endpoint(),
        target = %request.target(),
        ?config,
        "Parsed arguments"
    );

    let output = if args.json {
        Output::Json
    } else {
        let image_size = tokio::fs::metadata(request.image_path())
            .await
            .ok()
            .map(|m| m.len());
        print_banner(&request, image_size);
        if args.progress { Output::Bar } else { Output::Dots }
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = spawn_event_printer(events_rx, output);

    let started = Instant::now();
    let outcome = espota_engine::upload(&request, config, &events_tx).await;

    // Closing the channel lets the printer drain and exit.
    drop(events_tx);
    printer.await?;

    outcome?;
    if output != Output::Json {
        print_success(started.elapsed());
    }
    Ok(())
}
