// src/main.rs - Replays a recorded landmark stream through a prayer session
use rakaat_tracker::landmarks::load_frames;
use rakaat_tracker::{PrayerSession, SessionRecorder, TrackerConfig};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let Some(frames_path) = args.next() else {
        eprintln!("Usage: rakaat_tracker <frames.jsonl> [config.json]");
        std::process::exit(2);
    };

    let config = match args.next() {
        Some(path) => TrackerConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => TrackerConfig::default(),
    };

    let frames = load_frames(&frames_path)?;
    info!(frames = frames.len(), path = %frames_path, "Loaded recording");

    let mut session = PrayerSession::new(config.clone())?;
    let mut updates = session.subscribe();

    // Stand-in for the lock-screen controller: reacts to snapshot changes only.
    let controller = tokio::spawn(async move {
        let mut last_rakaat = 0;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if let Some(message) = &state.error_message {
                warn!("Tracker reported: {}", message);
            }
            if state.current_rakaat != last_rakaat {
                info!(rakaat = state.current_rakaat, total = state.total_rakaats, "Progress");
                last_rakaat = state.current_rakaat;
            }
            if state.should_auto_unlock {
                info!("Prayer complete, unlocking");
                break;
            }
        }
    });

    // Frames are processed sequentially on one dedicated worker.
    let worker = tokio::task::spawn_blocking(move || {
        let mut recorder = SessionRecorder::new(&config.output_dir, session.session_id(), None);
        let mut last_ms = 0;
        for frame in &frames {
            last_ms = frame.timestamp_ms;
            recorder.add_frame(session.process_frame(frame));
        }
        // Let the grace period run out if the recording stops early.
        let final_state = session.poll(last_ms + config.final_unlock_delay_ms);
        (recorder, final_state)
    });

    let (recorder, final_state) = worker.await.context("Frame worker panicked")?;
    // Dropping the session closed the channel; the controller exits either way.
    controller.await.context("Controller task panicked")?;

    let csv_path = recorder.export_csv()?;
    let summary_path = recorder.export_summary()?;
    info!(
        complete = final_state.is_complete,
        rakaat = final_state.current_rakaat,
        csv = %csv_path.display(),
        summary = %summary_path.display(),
        "Session exported"
    );

    Ok(())
}
