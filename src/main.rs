use anyhow::{Context, Result};
use clap::Parser;
use groupshot::capture::WebcamCapture;
use groupshot::config::{ExtractorSettings, DEFAULT_BLUR_RADIUS};
use groupshot::error::ErrorKind;
use groupshot::export::{self, DEFAULT_EXPORT_NAME};
use groupshot::output::{LoopbackPreview, PreviewSink};
use groupshot::segmentation::{self, ModelKind};
use groupshot::{LayerExtractor, Phase, Session, SessionEvent};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Second webcam to toggle to with `switch` (e.g. the rear camera)
    #[arg(long)]
    alt_device: Option<u32>,

    /// Path to segmentation model (ONNX file)
    #[arg(long)]
    model: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1920)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 1080)]
    capture_height: u32,

    /// Which segmentation backend the model file is for
    #[arg(long, value_enum, default_value_t = ModelKind::Selfie)]
    model_kind: ModelKind,

    /// Where `export` writes the group photo (.png or .jpg)
    #[arg(short, long, default_value = DEFAULT_EXPORT_NAME)]
    output: PathBuf,

    /// Seconds to count down before each capture
    #[arg(long, default_value_t = 3)]
    countdown: u32,

    /// v4l2loopback device to write a live preview to
    #[arg(long)]
    preview_device: Option<String>,

    /// Preview resolution width
    #[arg(long, default_value_t = 1280)]
    preview_width: u32,

    /// Preview resolution height
    #[arg(long, default_value_t = 720)]
    preview_height: u32,

    /// Mask edge softening radius in pixels (0 disables)
    #[arg(long, default_value_t = DEFAULT_BLUR_RADIUS)]
    blur_radius: u32,

    /// Brightness multiplier applied to people
    #[arg(long, default_value_t = 1.0)]
    brightness: f32,

    /// Contrast multiplier applied to people
    #[arg(long, default_value_t = 1.0)]
    contrast: f32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

enum Input {
    Command(String),
    Event(SessionEvent),
    Closed,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("GroupShot starting");

    let settings = ExtractorSettings {
        blur_radius: args.blur_radius,
        blur_sigma: None,
        brightness: args.brightness,
        contrast: args.contrast,
    };
    let extractor = LayerExtractor::new(settings).context("Invalid extractor settings")?;

    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    let capture = WebcamCapture::new(args.input_device, args.capture_width, args.capture_height)
        .context("Failed to initialize webcam capture")?;

    tracing::info!("Loading {:?} segmentation model from {}", args.model_kind, args.model);
    let model = segmentation::create_model(args.model_kind, &args.model)
        .context("Failed to load segmentation model")?;

    let mut preview: Option<Box<dyn PreviewSink>> = match &args.preview_device {
        Some(device) => Some(Box::new(
            LoopbackPreview::new(device, args.preview_width, args.preview_height)
                .context("Failed to initialize preview output")?,
        )),
        None => None,
    };

    let (mut session, events) = Session::new(Box::new(capture), model, extractor)?;

    let (tx, inputs) = mpsc::channel();
    spawn_stdin_reader(tx.clone());
    spawn_event_forwarder(events, tx);

    print_help();
    let mut device = args.input_device;

    for input in inputs {
        match input {
            Input::Event(event) => {
                on_event(&event);
                if matches!(event, SessionEvent::PhaseChanged(_) | SessionEvent::PersonAdded { .. }) {
                    if let Some(sink) = preview.as_deref_mut() {
                        refresh_preview(&session, sink);
                    }
                }
            }
            Input::Command(line) => match line.trim() {
                "lock" | "l" => {
                    countdown(args.countdown);
                    // errors are reported through events
                    let _ = session.lock_background();
                }
                "relock" => {
                    countdown(args.countdown);
                    let _ = session.relock_background();
                }
                "add" | "a" => {
                    if session.phase() == Phase::NoBackground {
                        println!("Lock a background first.");
                        continue;
                    }
                    countdown(args.countdown);
                    if session.request_add_person().is_ok() {
                        println!("Processing...");
                    }
                }
                "reset" | "r" => session.reset(),
                "switch" | "s" => match args.alt_device {
                    Some(alt) => {
                        let next = if device == alt { args.input_device } else { alt };
                        match WebcamCapture::new(next, args.capture_width, args.capture_height) {
                            Ok(capture) => {
                                session.replace_source(Box::new(capture));
                                device = next;
                            }
                            Err(err) => tracing::error!("Failed to switch camera: {:#}", err),
                        }
                    }
                    None => println!("No --alt-device configured."),
                },
                "export" | "e" => export_to(&session, &args.output),
                "status" => println!(
                    "phase={:?} busy={} people={} canvas={:?}",
                    session.phase(),
                    session.is_busy(),
                    session.layer_count(),
                    session.canvas_size()
                ),
                "help" | "h" => print_help(),
                "quit" | "q" => break,
                "" => {}
                other => println!("Unknown command `{other}`, try `help`."),
            },
            Input::Closed => break,
        }
    }

    tracing::info!("Shutting down");
    drop(session);
    Ok(())
}

fn spawn_stdin_reader(tx: mpsc::Sender<Input>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(Input::Command(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Input::Closed);
    });
}

fn spawn_event_forwarder(events: mpsc::Receiver<SessionEvent>, tx: mpsc::Sender<Input>) {
    thread::spawn(move || {
        for event in events {
            if tx.send(Input::Event(event)).is_err() {
                return;
            }
        }
    });
}

fn on_event(event: &SessionEvent) {
    tracing::debug!("{:?}", event);
    match event {
        SessionEvent::PhaseChanged(Phase::ReadyForPeople) => {
            println!("Background locked. Now add people.")
        }
        SessionEvent::PhaseChanged(Phase::NoBackground) => println!("Reset. Lock a new background."),
        SessionEvent::PersonAdded { count } => println!("Person added successfully! ({count} so far)"),
        SessionEvent::Failed(kind) => println!("{}", kind.user_message()),
        SessionEvent::PhaseChanged(Phase::HasPeople) | SessionEvent::BusyChanged(_) => {}
    }
}

fn refresh_preview(session: &Session, sink: &mut dyn PreviewSink) {
    let shown = match session.render() {
        Ok(Some(image)) => sink.show(&image),
        Ok(None) => sink.clear(),
        Err(err) => {
            tracing::warn!("Failed to render preview: {}", err);
            return;
        }
    };
    if let Err(err) = shown {
        tracing::warn!("Failed to update preview: {:#}", err);
    }
}

fn export_to(session: &Session, path: &Path) {
    if !session.phase().can_export() {
        println!("Nothing to download.");
        return;
    }
    let exporter = export::exporter_for_path(path);
    match session.export(exporter.as_ref()) {
        Ok(bytes) => match export::save(path, &bytes) {
            Ok(()) => println!("Saved {}", path.display()),
            Err(err) => tracing::error!("{:#}", err),
        },
        Err(err) if err.kind() == ErrorKind::Other => tracing::error!("Export failed: {}", err),
        Err(_) => {}
    }
}

fn countdown(seconds: u32) {
    for n in (1..=seconds).rev() {
        println!("{n}");
        thread::sleep(Duration::from_secs(1));
    }
}

fn print_help() {
    println!("Commands: lock, add, relock, reset, switch, export, status, help, quit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupshot::capture::StillFrames;
    use groupshot::{ExtractorSettings, Mask, SegmentationModel};
    use image::RgbImage;

    struct Everyone;

    impl SegmentationModel for Everyone {
        fn segment(&mut self, frame: &RgbImage) -> anyhow::Result<Mask> {
            let (w, h) = frame.dimensions();
            Mask::filled(w, h, 1.0)
        }

        fn input_size(&self) -> (u32, u32) {
            (0, 0)
        }
    }

    #[test]
    fn export_before_lock_reports_once_and_writes_nothing() {
        let extractor = LayerExtractor::new(ExtractorSettings::passthrough()).unwrap();
        let source = StillFrames::new([RgbImage::new(2, 2)]);
        let (session, events) =
            Session::new(Box::new(source), Box::new(Everyone), extractor).unwrap();

        let path = std::env::temp_dir().join(format!("groupshot-empty-{}.png", std::process::id()));
        export_to(&session, &path);

        assert!(!path.exists());
        // The CLI message is the only report; no Failed event doubles it.
        assert!(events.try_recv().is_err());
        session.shutdown().unwrap();
    }

    #[test]
    fn capture_size_defaults_to_full_hd() {
        let args = Args::try_parse_from(["groupshot", "--model", "selfie.onnx"]).unwrap();
        assert_eq!((args.capture_width, args.capture_height), (1920, 1080));
    }

    #[test]
    fn capture_size_can_be_overridden() {
        let args = Args::try_parse_from([
            "groupshot",
            "--model",
            "selfie.onnx",
            "--capture-width",
            "640",
            "--capture-height",
            "480",
        ])
        .unwrap();
        assert_eq!((args.capture_width, args.capture_height), (640, 480));
    }
}
