//! Run command - drive the demo scene through the scheduler

use crate::commands::config;
use crate::demo::Demo;
use anyhow::{bail, Result};
use std::path::PathBuf;

pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub frames: u64,
    pub fps: f64,
    pub workers: Option<usize>,
    pub rigs: usize,
}

pub fn run(args: RunArgs) -> Result<()> {
    if !args.fps.is_finite() || args.fps <= 0.0 {
        bail!("--fps must be a positive number, got {}", args.fps);
    }

    let mut config = config::load(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.worker_threads = Some(workers);
    }

    let mut demo = Demo::build(config, args.rigs)?;
    let config = demo.scheduler.config().clone();
    println!(
        "Running {} frame(s) at {} fps: fixed {} Hz, max {} catch-up tick(s), {} worker(s)",
        args.frames,
        args.fps,
        config.fixed_frequency,
        config.max_fixed_steps,
        demo.scheduler.world().dispatcher().threads()
    );

    let mut fixed_ticks = 0u64;
    let mut transform_changes = 0usize;
    for frame in 1..=args.frames {
        let report = demo.scheduler.frame(frame as f64 / args.fps);
        fixed_ticks += report.fixed_ticks as u64;
        transform_changes += demo.scheduler.world_mut().scene.take_transform_changes().len();
    }

    let world = demo.scheduler.world();
    println!();
    println!("Frames:             {}", args.frames);
    println!("Fixed ticks:        {}", fixed_ticks);
    println!("Transform changes:  {}", transform_changes);
    println!("Nodes alive:        {}", world.scene.entity_count());
    println!("Components:         {}", world.components.len());

    let stats = demo.stats.borrow().clone();
    println!("Spinner updates:    {} variable, {} fixed", stats.updates, stats.fixed_updates);
    println!("Clips finished:     {}", stats.clips_finished);
    println!(
        "Intersections:      {} started, {} ended",
        stats.intersections_started, stats.intersections_ended
    );
    println!("Out of bounds:      {}", stats.out_of_bounds);
    println!("Timers fired:       {}", stats.timers_fired);

    let last = demo.animation.borrow().last_report();
    println!(
        "Last animation pass: {} root(s), {} merge group(s), {} failed",
        last.roots.processed,
        last.merges.processed,
        last.roots.failed + last.merges.failed
    );

    println!();
    println!(
        "{:<16} {:<24} {:>8} {:>8} {:>7} {:>12}",
        "Stage", "Callback", "Priority", "Calls", "Faults", "Avg (us)"
    );
    println!("{}", "-".repeat(80));
    for m in demo.scheduler.metrics() {
        println!(
            "{:<16} {:<24} {:>8} {:>8} {:>7} {:>12.2}",
            m.stage.name(),
            m.label,
            m.priority,
            m.call_count,
            m.fault_count,
            m.average_time().as_secs_f64() * 1e6
        );
    }

    demo.scheduler.shutdown();
    Ok(())
}
