use std::io::Write;

use chrono::{NaiveTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use espota_engine::session::UploadEvent;

/// Resolution of the progress bar; engine progress is a fraction.
const BAR_STEPS: u64 = 1000;

/// How upload events reach the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Log lines plus an indicatif bar.
    Bar,
    /// Log lines plus one dot per chunk.
    Dots,
    /// One JSON object per event on stdout.
    Json,
}

/// Spawns a task that prints engine events until the sender is dropped.
pub fn spawn_event_printer(
    mut events_rx: mpsc::UnboundedReceiver<UploadEvent>,
    output: Output,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printer = Printer::new(output);
        while let Some(event) = events_rx.recv().await {
            printer.handle(event);
        }
        printer.finish();
    })
}

struct Printer {
    output: Output,
    bar: Option<ProgressBar>,
    // A line of dots is open and must be ended before the next log line.
    dots_open: bool,
}

impl Printer {
    fn new(output: Output) -> Self {
        Self {
            output,
            bar: None,
            dots_open: false,
        }
    }

    fn handle(&mut self, event: UploadEvent) {
        if self.output == Output::Json {
            if let Some(line) = render_json(&event) {
                println!("{line}");
            }
            return;
        }

        match event {
            UploadEvent::Started | UploadEvent::Done => {}
            UploadEvent::Log(line) => self.line(&line),
            UploadEvent::Progress(fraction) => self.progress(fraction),
            UploadEvent::Chunk => {
                print!(".");
                let _ = std::io::stdout().flush();
                self.dots_open = true;
            }
            UploadEvent::Halted(error) => {
                if let Some(bar) = self.bar.take() {
                    bar.abandon();
                }
                self.end_dots();
                println!("  {}", stamp(Utc::now().time(), "ERROR", &error));
            }
        }
    }

    fn line(&mut self, line: &str) {
        self.end_dots();
        let line = stamp(Utc::now().time(), "INFO", line);
        match &self.bar {
            Some(bar) => bar.suspend(|| println!("  {line}")),
            None => println!("  {line}"),
        }
    }

    fn progress(&mut self, fraction: f64) {
        let bar = self.bar.get_or_insert_with(new_bar);
        bar.set_position(bar_position(fraction));
        if bar.position() >= BAR_STEPS {
            bar.finish();
        }
    }

    fn end_dots(&mut self) {
        if self.dots_open {
            println!();
            self.dots_open = false;
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
        self.end_dots();
    }
}

fn new_bar() -> ProgressBar {
    let bar = ProgressBar::new(BAR_STEPS);
    match ProgressStyle::default_bar()
        .template("  [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}%")
    {
        Ok(style) => bar.set_style(style.progress_chars("#>-")),
        Err(e) => warn!(error = %e, "Invalid progress bar template"),
    }
    bar
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bar_position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64
}

/// `HH:MM:SS[LEVEL]: text`, with the time in UTC.
fn stamp(at: NaiveTime, level: &str, text: &str) -> String {
    format!("{}[{level}]: {text}", at.format("%H:%M:%S"))
}

fn render_json(event: &UploadEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(line) => Some(line),
        Err(e) => {
            warn!(error = %e, "Cannot encode event");
            None
        }
    }
}
