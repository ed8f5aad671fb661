use std::fs::{self, File};
use std::process;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use scene_replay::{
    config::PlayerConfig,
    engine::{Recorder, Scene, source::SourceRecording, verify::verify},
    player::Player,
};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

const COMPILE_USAGE: &str = "scene-replay compile <source.json> <recording.json>";
const PLAY_USAGE: &str = "scene-replay play <recording.json>";
const CHECK_USAGE: &str = "scene-replay check <recording.json>";

const LOG_ENV: &str = "SCENE_REPLAY_LOG";
const LOG_FILE_ENV: &str = "SCENE_REPLAY_LOG_FILE";

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);

    match args.next().as_deref() {
        Some("compile") => {
            init_logging(true)?;
            let source_path = args.next().context(COMPILE_USAGE)?;
            let output_path = args.next().context(COMPILE_USAGE)?;
            compile(&source_path, &output_path)
        }
        Some("play") => {
            // stderr output would tear the alternate screen
            init_logging(false)?;
            let path = args.next().context(PLAY_USAGE)?;
            play(&path)
        }
        Some("check") => {
            init_logging(true)?;
            let path = args.next().context(CHECK_USAGE)?;
            check(&path)
        }
        _ => bail!(
            "scene-replay: scrub recorded scene animations\n\nUsage:\n  {COMPILE_USAGE}\n  {PLAY_USAGE}\n  {CHECK_USAGE}"
        ),
    }
}

/// Log filter from `SCENE_REPLAY_LOG` (default `warn`). Output goes to the
/// file named by `SCENE_REPLAY_LOG_FILE` when set, else to stderr if
/// `allow_stderr`, else nowhere.
fn init_logging(allow_stderr: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Ok(path) = std::env::var(LOG_FILE_ENV) {
        let file = File::create(&path).with_context(|| format!("Failed to create log file {path}"))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else if allow_stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

fn compile(source_path: &str, output_path: &str) -> Result<()> {
    let source_json =
        fs::read_to_string(source_path).with_context(|| format!("Failed to read {source_path}"))?;
    let source: SourceRecording = serde_json::from_str(&source_json)
        .with_context(|| format!("Failed to parse {source_path}"))?;

    let groups = Recorder::from_source(source)
        .compile()
        .with_context(|| format!("Failed to compile {source_path}"))?;

    let output_json = serde_json::to_string_pretty(&groups)?;
    fs::write(output_path, &output_json)
        .with_context(|| format!("Failed to write {output_path}"))?;

    let steps: usize = groups
        .iter()
        .filter_map(|g| g.graphic.as_ref())
        .map(|g| g.transitions.len())
        .sum();
    eprintln!(
        "Compiled {} scene(s), {} steps from {} -> {}",
        groups.len(),
        steps,
        source_path,
        output_path,
    );

    Ok(())
}

fn load(path: &str) -> Result<Vec<std::sync::Arc<Scene>>> {
    let json = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    Scene::load_all(&json).with_context(|| format!("Failed to load {path}"))
}

fn play(path: &str) -> Result<()> {
    let scenes = load(path)?;
    let mut player = Player::new(scenes, PlayerConfig::load())?;
    player.play()
}

fn check(path: &str) -> Result<()> {
    let scenes = load(path)?;
    let mut failed = 0;
    for scene in &scenes {
        let report = verify(scene);
        if report.is_ok() {
            println!("{}: ok ({} steps)", scene.group_id(), report.steps);
        } else {
            failed += 1;
            println!("{}: {} problem(s)", scene.group_id(), report.problems.len());
            for problem in &report.problems {
                println!("  {problem}");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} scene(s) failed verification", scenes.len());
    }
    Ok(())
}
