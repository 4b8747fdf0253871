use match_engine::core::diagnostics::{Diagnostics, HealthStatus};
use match_engine::storage::{FileStore, PlayerData};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
struct RecordExport {
    version: u32,
    progress: u32,
    health: String,
    data: PlayerData,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <record_path> [output.json]", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);
    let record = FileStore::read_record(path)?;

    println!("Loading record from {:?}", path);
    println!("Version: {}", record.version);
    println!("Progress: {}/112", record.progress);

    let health = match Diagnostics::check_record(&record) {
        HealthStatus::Healthy => "healthy".to_string(),
        HealthStatus::Corrupted(msg) => format!("corrupted: {}", msg),
        HealthStatus::Suspicious(msg) => format!("suspicious: {}", msg),
    };
    println!("Health: {}", health);

    let export = RecordExport {
        version: record.version,
        progress: record.progress,
        health,
        data: record.to_data(),
    };

    let out = args.get(2).map(String::as_str).unwrap_or("record.json");
    let json = serde_json::to_string_pretty(&export)?;
    let mut file = File::create(out)?;
    file.write_all(json.as_bytes())?;
    println!("Exported to {}", out);

    Ok(())
}
