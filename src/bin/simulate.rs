use clap::Parser;
use hdrhistogram::Histogram;
use match_engine::sim::World;
use match_engine::MatchConfig;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, about = "Simulates a world of users answering and matching", long_about = None)]
struct Args {
    /// Number of simulated users
    #[arg(short, long, default_value_t = 40)]
    users: usize,

    /// Simulated seconds to run
    #[arg(short, long, default_value_t = 30.0)]
    seconds: f32,

    /// Simulated frame rate
    #[arg(short, long, default_value_t = 72.0)]
    fps: f32,

    /// Seconds between answers per user (0 answers everything up front)
    #[arg(short, long, default_value_t = 0.2)]
    answer_interval: f32,

    /// Per-frame unit budget override
    #[arg(short, long)]
    budget: Option<usize>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// JSON table file; generated tables are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match_engine::init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MatchConfig::load(path)?,
        None => MatchConfig::generated(args.seed),
    };
    if let Some(budget) = args.budget {
        config.performance.max_units_per_frame = budget;
    }
    config.performance.target_fps = args.fps;

    println!("=== Simulation: users={}, seconds={}, fps={} ===", args.users, args.seconds, args.fps);

    println!("Generating population...");
    let start = Instant::now();
    let mut world = World::new(config, args.users, args.seed)?;
    println!("Setup time: {:.2?}", start.elapsed());

    if args.answer_interval <= 0.0 {
        world.answer_all();
    }

    let dt = 1.0 / args.fps;
    let frames = (args.seconds * args.fps).ceil() as u64;
    let mut histogram = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)?;

    println!("Running {} frames...", frames);
    let run_start = Instant::now();
    for _ in 0..frames {
        let tick_start = Instant::now();
        world.tick(dt, args.answer_interval);
        histogram.record(tick_start.elapsed().as_micros().max(1) as u64)?;
    }
    let duration = run_start.elapsed();

    println!("\n--- World tick latency (all users) ---");
    println!("Total: {:.2?} ({:.1} frames/s)", duration, frames as f64 / duration.as_secs_f64());
    println!("P50:   {} us", histogram.value_at_quantile(0.50));
    println!("P99:   {} us", histogram.value_at_quantile(0.99));
    println!("P99.9: {} us", histogram.value_at_quantile(0.999));
    println!("Max:   {} us", histogram.max());

    let finalized = world.engines().filter(|e| e.session().is_finalized()).count();
    let scans: u64 = world.engines().map(|e| e.ranker().scans_completed()).sum();
    println!("\n--- Matching ---");
    println!("Finalized users: {}/{}", finalized, world.len());
    println!("Completed scans: {}", scans);

    if let Some(engine) = world.engine(0) {
        println!("\n{} ({})", engine.display_name(), engine.performance());
        let reference = world.reference_top_k(0);
        for (rank, result) in engine.recommendations().iter().enumerate() {
            println!(
                "  #{} {} similarity {:.3} confidence {:.3}",
                rank + 1,
                result.display_name,
                result.similarity,
                result.confidence
            );
        }
        let scanned: Vec<_> = engine.recommendations().iter().map(|r| r.peer_id).collect();
        let exhaustive: Vec<_> = reference.iter().map(|(id, _)| *id).collect();
        println!(
            "Matches exhaustive ranking: {}",
            if scanned == exhaustive { "YES" } else { "NO (scan may be stale)" }
        );
    }

    Ok(())
}
