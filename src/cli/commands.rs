//! CLI Command Implementations

use std::path::Path;

use anyhow::Context;
use log::info;

use crate::config::EngineConfig;
use crate::engine::{
    AudioEngine, ManualClock, OfflineRenderEngine, RegionScheduler, SourceLoader, WavSourceLoader,
};
use crate::graph::SourcePlayer;
use crate::model::ProjectSnapshot;

fn load_snapshot(path: &Path) -> anyhow::Result<ProjectSnapshot> {
    ProjectSnapshot::from_file(path)
        .with_context(|| format!("failed to load project {}", path.display()))
}

/// Sources are resolved relative to the project file
fn loader_for(path: &Path) -> WavSourceLoader {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => WavSourceLoader::with_base_dir(dir),
        _ => WavSourceLoader::new(),
    }
}

/// Play a project against a simulated clock and report the position
pub fn simulate(
    path: &Path,
    from: f64,
    seconds: f64,
    cycle: Option<(f64, f64)>,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let config = match config {
        Some(file) => EngineConfig::from_file(file)
            .with_context(|| format!("failed to load config {}", file.display()))?,
        None => EngineConfig::default(),
    };
    let snapshot = load_snapshot(path)?;
    info!("Simulating {} for {:.1}s", path.display(), seconds);

    let clock = ManualClock::new();
    let step = config.tick_interval();
    let tolerance = config.cycle_tolerance;
    let mut engine = AudioEngine::new(
        config,
        clock.clone(),
        OfflineRenderEngine::new(),
        loader_for(path),
    )?;
    engine.load_project(snapshot)?;

    if let Some((start, end)) = cycle {
        engine.set_cycle_region(start, end)?;
        engine.toggle_cycle();
    }
    engine.seek(from);
    engine.play()?;
    engine.check_engine()?;

    for track in &engine.state().project().tracks {
        if let Some(report) = engine.schedule_report(track.id) {
            println!(
                "Track '{}': {} segment(s), {} skipped",
                track.name,
                report.segments.len(),
                report.skipped.len()
            );
        }
    }

    let mut elapsed = 0.0;
    let mut previous = engine.tick().time;
    let mut next_report = 0.0;
    while elapsed < seconds {
        clock.advance(step);
        elapsed += step;
        let position = engine.tick();
        if position.time + tolerance < previous {
            println!("  loop: {:.3}s -> {:.3}s", previous, position.time);
        }
        if elapsed >= next_report {
            println!(
                "{:>7.3}s  {:>8.3}s  {}  [{}]",
                elapsed,
                position.time,
                position.musical,
                engine.transport_state()
            );
            next_report += 1.0;
        }
        previous = position.time;
    }

    engine.shutdown();
    println!("Final position: {:.3}s", engine.playback_position().time);
    Ok(())
}

/// Print the routing graph of a project and its schedule from zero
pub fn inspect(path: &Path) -> anyhow::Result<()> {
    let snapshot = load_snapshot(path)?;
    let loader = loader_for(path);
    let mut engine = AudioEngine::new(
        EngineConfig::default(),
        ManualClock::new(),
        OfflineRenderEngine::new(),
        loader_for(path),
    )?;
    engine.load_project(snapshot)?;

    let graph = engine.graph();
    println!("Nodes ({}):", graph.node_count());
    for (id, node) in graph.nodes() {
        println!("  {:<5} {}", id.to_string(), node);
    }
    println!("Connections ({}):", graph.edge_count());
    for (from, to, gain) in graph.edges() {
        println!("  {} -> {}  gain {:.2}", from, to, gain);
    }

    println!("Schedule from 0.000s:");
    print_schedule(engine.state().project(), &loader);
    Ok(())
}

fn print_schedule(project: &ProjectSnapshot, loader: &dyn SourceLoader) {
    let scheduler = RegionScheduler::new(loader);
    for track in &project.tracks {
        let mut player = SourcePlayer::new();
        let report = scheduler.schedule_from_position(track, 0.0, &mut player);
        println!("  Track '{}':", track.name);
        for segment in &report.segments {
            println!(
                "    {} at +{:.3}s: offset {:.3}s, {} frame(s) @ {} Hz",
                segment.source.display(),
                segment.delay,
                segment.source_offset,
                segment.frame_count,
                segment.sample_rate
            );
        }
        for skipped in &report.skipped {
            println!("    skipped {}: {}", skipped.region, skipped.reason);
        }
    }
}
