use std::io::{self, BufRead};

use anyhow::Result;
use log::{error, info, warn};

use igeb_rs::ble::BleTransport;
use igeb_rs::engine::{AcquisitionEngine, EngineConfig};
use igeb_rs::parse::parse_duration;
use igeb_rs::recording::RecordingStatus;
use igeb_rs::session::{DeviceSession, SessionConfig};
use igeb_rs::types::{Role, SensorEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug for verbose output, e.g.:
    //   RUST_LOG=igeb_rs=debug cargo run
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Session and engine ────────────────────────────────────────────────────
    let (mut session, mut events) =
        DeviceSession::new(BleTransport::new(), SessionConfig::default());
    let mut engine = AcquisitionEngine::new(EngineConfig::default());

    info!("Connecting to IGEB headset …");
    session.connect().await?;
    session.subscribe_all().await?;

    info!("Streaming started. Commands (type + Enter):");
    info!("  r <duration>  – start a timed recording (e.g. 'r 30s', 'r 2m'; bare 'r' records until 's')");
    info!("  s             – stop the recording and save it as CSV");
    info!("  p             – poll the impedance characteristic once");
    info!("  i             – show session status");
    info!("  u             – dump the device's GATT services");
    info!("  c             – reconnect");
    info!("  q             – quit\n");

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on a dedicated OS thread (to avoid holding a non-Send
    // StdinLock across await points) and relayed over a channel.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut signal_count: u64 = 0;

    // ── Main event loop ───────────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let display = event.clone();
                engine.handle(event).await;

                match display {
                    SensorEvent::Connected(name) => println!("✅  Connected to: {name}"),
                    SensorEvent::Battery(percent) => println!("🔋  Battery: {percent}%"),
                    SensorEvent::Disconnected => println!("❌  Disconnected from device."),
                    SensorEvent::Sample(sample) if sample.role == Role::Impedance => {
                        println!(
                            "[IMPEDANCE] {:8.2}  quality={}  window={}",
                            sample.value,
                            engine.quality(),
                            engine.window().len()
                        );
                    }
                    SensorEvent::Sample(sample) => {
                        signal_count += 1;
                        if signal_count % 50 == 0 {
                            println!(
                                "[SIGNAL] #{signal_count}  value={:8.2}  recorded={}",
                                sample.value,
                                engine.recorded_count().await
                            );
                        }
                    }
                }

                // A deadline may have completed the capture between events.
                if engine.recording_status().await == RecordingStatus::Completed {
                    save_recording(&mut engine).await?;
                }
            }

            line = line_rx.recv() => {
                let Some(line) = line else { break };
                if line.is_empty() {
                    continue;
                }
                let (cmd, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
                match cmd {
                    "q" => {
                        info!("Quit requested.");
                        session.disconnect().await.ok();
                        break;
                    }
                    "c" => {
                        if let Err(e) = session.reconnect().await {
                            error!("Reconnect failed: {e}");
                        } else if let Err(e) = session.subscribe_all().await {
                            error!("Re-subscribe failed: {e}");
                        }
                    }
                    "r" => {
                        let deadline = if arg.is_empty() {
                            None
                        } else {
                            match parse_duration(arg) {
                                Ok(secs) => Some(secs),
                                Err(e) => {
                                    error!("{e}");
                                    continue;
                                }
                            }
                        };
                        match engine.start_recording(deadline).await {
                            Ok(()) => match deadline {
                                Some(secs) => info!("Recording for {secs} s …"),
                                None => info!("Recording until stopped …"),
                            },
                            Err(e) => error!("Cannot start recording: {e}"),
                        }
                    }
                    "s" => {
                        engine.stop_recording().await;
                        if engine.recording_status().await == RecordingStatus::Completed {
                            save_recording(&mut engine).await?;
                        }
                    }
                    "p" => match session.poll_once(Role::Impedance).await {
                        Ok(Some(sample)) => info!("Polled impedance: {:.2}", sample.value),
                        Ok(None) => warn!("Polled payload was malformed."),
                        Err(e) => error!("Poll failed: {e}"),
                    },
                    "i" => {
                        println!(
                            "state={:?}  device={}  battery={}  quality={}  recording={:?} ({} samples)",
                            session.state(),
                            engine.device_name().unwrap_or("-"),
                            engine
                                .battery_percent()
                                .map(|p| format!("{p}%"))
                                .unwrap_or_else(|| "-".into()),
                            engine.quality(),
                            engine.recording_status().await,
                            engine.recorded_count().await,
                        );
                    }
                    "u" => match session.describe_gatt().await {
                        Ok(services) => {
                            for service in services {
                                println!("🟢 Service: {}", service.uuid);
                                for c in service.characteristics {
                                    println!("  ↳ Characteristic: {c}");
                                }
                            }
                        }
                        Err(e) => error!("GATT dump failed: {e}"),
                    },
                    other => warn!("Unknown command: '{other}'"),
                }
            }
        }
    }

    info!("Event loop finished – exiting.");
    Ok(())
}

/// Persist a completed capture next to the binary and reset for the next one.
///
/// Naming and storage are deliberately this binary's policy, not the
/// library's. Empty captures are skipped.
async fn save_recording(engine: &mut AcquisitionEngine) -> Result<()> {
    if engine.recorded_count().await == 0 {
        warn!("Recording completed with no samples, nothing to save.");
    } else {
        let filename = format!(
            "igeb_recording_{}.csv",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        std::fs::write(&filename, engine.export().await)?;
        info!("Saved recording to {filename}");
    }
    engine.reset_recording().await;
    Ok(())
}
