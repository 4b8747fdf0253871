use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use clap::Parser;
use match_engine::core::ranking::CompatibilityResult;
use match_engine::core::scheduler::PerformanceState;
use match_engine::peers::{PeerId, Profile};
use match_engine::sim::World;
use match_engine::MatchConfig;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, about = "Read-only inspection API over a simulated world", long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 24)]
    users: usize,

    #[arg(short, long, default_value_t = 72.0)]
    fps: f32,

    /// Seconds between answers per user
    #[arg(short, long, default_value_t = 0.5)]
    answer_interval: f32,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

// --- Shared snapshot ---
#[derive(Serialize, Clone)]
struct UserSnapshot {
    id: PeerId,
    display_name: String,
    completion_ratio: f32,
    finalized: bool,
    scanning: bool,
    performance: PerformanceState,
    recommendations: Vec<CompatibilityResult>,
}

#[derive(Serialize, Clone, Default)]
struct WorldSnapshot {
    clock: f32,
    frames: u64,
    users: Vec<UserSnapshot>,
    peers: Vec<Profile>,
}

type AppState = Arc<RwLock<WorldSnapshot>>;

// --- DTOs ---
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    details: String,
}

#[derive(Serialize)]
struct PerformanceEntry {
    id: PeerId,
    performance: PerformanceState,
}

// --- Handlers ---
fn read(state: &AppState) -> Result<WorldSnapshot, StatusCode> {
    state
        .read()
        .map(|s| s.clone())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, StatusCode> {
    let snapshot = read(&state)?;
    let (status, details) = if snapshot.frames == 0 {
        ("starting", "World not ticked yet".to_string())
    } else {
        (
            "healthy",
            format!(
                "{} users, {} frames, {:.1}s simulated",
                snapshot.users.len(),
                snapshot.frames,
                snapshot.clock
            ),
        )
    };
    Ok(Json(HealthResponse {
        status: status.to_string(),
        details,
    }))
}

async fn all_recommendations(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSnapshot>>, StatusCode> {
    Ok(Json(read(&state)?.users))
}

async fn user_recommendations(
    State(state): State<AppState>,
    Path(id): Path<PeerId>,
) -> Result<Json<UserSnapshot>, StatusCode> {
    read(&state)?
        .users
        .into_iter()
        .find(|u| u.id == id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn performance(
    State(state): State<AppState>,
) -> Result<Json<Vec<PerformanceEntry>>, StatusCode> {
    let entries = read(&state)?
        .users
        .into_iter()
        .map(|u| PerformanceEntry {
            id: u.id,
            performance: u.performance,
        })
        .collect();
    Ok(Json(entries))
}

async fn peers(State(state): State<AppState>) -> Result<Json<Vec<Profile>>, StatusCode> {
    Ok(Json(read(&state)?.peers))
}

fn capture(world: &World, frames: u64) -> WorldSnapshot {
    WorldSnapshot {
        clock: world.clock(),
        frames,
        users: world
            .engines()
            .map(|e| UserSnapshot {
                id: e.id(),
                display_name: e.display_name().to_string(),
                completion_ratio: e.local_vector().completion_ratio,
                finalized: e.session().is_finalized(),
                scanning: e.is_scanning(),
                performance: e.performance(),
                recommendations: e.recommendations(),
            })
            .collect(),
        peers: world.peers(),
    }
}

/// Runs the frame loop on its own thread; the world never leaves it.
fn spawn_world(args: &Args, state: AppState) {
    let users = args.users;
    let seed = args.seed;
    let fps = args.fps.max(1.0);
    let answer_interval = args.answer_interval;

    thread::spawn(move || {
        let mut config = MatchConfig::generated(seed);
        config.performance.target_fps = fps;
        let mut world = match World::new(config, users, seed) {
            Ok(world) => world,
            Err(e) => {
                error!("Failed to build world: {}", e);
                return;
            }
        };

        let frame = Duration::from_secs_f32(1.0 / fps);
        let mut last = Instant::now();
        let mut frames = 0u64;
        loop {
            let now = Instant::now();
            let dt = now.duration_since(last).as_secs_f32();
            last = now;

            world.tick(dt, answer_interval);
            frames += 1;

            if frames % 10 == 0 {
                let snapshot = capture(&world, frames);
                match state.write() {
                    Ok(mut guard) => *guard = snapshot,
                    Err(_) => {
                        error!("Snapshot lock poisoned, stopping world");
                        return;
                    }
                }
            }

            let spent = now.elapsed();
            if spent < frame {
                thread::sleep(frame - spent);
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    match_engine::init_tracing();
    let args = Args::parse();

    let state: AppState = Arc::new(RwLock::new(WorldSnapshot::default()));
    spawn_world(&args, state.clone());

    // Build Router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/recommendations", get(all_recommendations))
        .route("/recommendations/:id", get(user_recommendations))
        .route("/performance", get(performance))
        .route("/peers", get(peers))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Run Server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Inspection server running on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
