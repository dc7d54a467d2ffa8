// Screen Recorder demo
// Runs one recording session against the simulated capture platform and
// saves the artifact next to the working directory.

use anyhow::Context;
use screen_recorder_lib::capture::simulated::{SimulatedPlatform, SimulatedPreview};
use screen_recorder_lib::commands::recording::{
    get_microphones, get_recording_state, select_microphone, start_recording, stop_recording,
    RecorderState, RecordingSummary,
};
use screen_recorder_lib::recorder::{RecorderConfig, RecordingEvent, RecordingSession};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

struct Args {
    config: Option<PathBuf>,
    output: PathBuf,
    seconds: u64,
    no_mic: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        output: PathBuf::from("recording.webm"),
        seconds: 2,
        no_mic: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
            "--output" => args.output = iter.next().context("--output needs a path")?.into(),
            "--seconds" => {
                args.seconds = iter
                    .next()
                    .context("--seconds needs a value")?
                    .parse()
                    .context("--seconds must be a whole number")?
            }
            "--no-mic" => args.no_mic = true,
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    screen_recorder_lib::init_tracing();
    tracing::info!("Starting Screen Recorder v{}", env!("CARGO_PKG_VERSION"));

    let args = parse_args()?;
    let mut config = match &args.config {
        Some(path) => RecorderConfig::load(path)?,
        None => RecorderConfig::default(),
    };
    if config.timeslice_ms.is_none() {
        config.timeslice_ms = Some(250);
    }

    let platform = SimulatedPlatform::new()
        .with_microphone("default", "Built-in Microphone")
        .with_microphone("usb-1", "USB Audio Interface")
        .with_auto_chunks(16 * 1024);
    let preview = Arc::new(SimulatedPreview::default());
    let session = RecordingSession::new(Arc::new(platform), config).with_preview(preview);
    let state = RecorderState::new(session);

    let mut events = state.subscribe().await;
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RecordingEvent::Started) => println!("● recording"),
                Ok(RecordingEvent::DataAvailable { sequence, size }) => {
                    println!("  chunk #{} ({} bytes)", sequence, size)
                }
                Ok(RecordingEvent::Stopped(artifact)) => {
                    println!("■ stopped ({} bytes)", artifact.size());
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event listener lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mics = get_microphones(&state).await?;
    for (i, mic) in mics.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, mic.label, mic.id);
    }
    let mic = if args.no_mic { None } else { mics.first().map(|m| m.id.clone()) };
    select_microphone(&state, mic).await?;

    start_recording(&state).await?;
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;
    let artifact = stop_recording(&state).await?;
    listener.await?;

    let output = if args.output.extension().is_some() {
        args.output
    } else {
        args.output.with_extension(artifact.file_extension())
    };
    tokio::fs::write(&output, &artifact.data)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&RecordingSummary::from(&artifact))?
    );
    println!("saved to {} (state: {})", output.display(), get_recording_state(&state).as_str());
    Ok(())
}
