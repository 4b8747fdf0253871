use match_engine::core::ranking::CompatibilityResult;
use match_engine::peers::{DirectoryPublisher, PeerDirectory};
use match_engine::sim::synthetic_answers;
use match_engine::storage::{FileStore, MemoryStore};
use match_engine::{MatchConfig, MatchEngine, QUESTION_COUNT};
use std::path::Path;
use std::sync::Arc;

fn print_recommendations(results: &[Option<CompatibilityResult>]) {
    for (rank, slot) in results.iter().enumerate() {
        match slot {
            Some(r) => println!(
                "    #{} {:<8} similarity {:.3}  confidence {:.3}  {:.0}% complete{}",
                rank + 1,
                r.display_name,
                r.similarity,
                r.confidence,
                r.completion_percentage,
                if r.is_provisional { " (provisional)" } else { "" }
            ),
            None => println!("    #{} -", rank + 1),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match_engine::init_tracing();
    println!("=== Match Engine Demo ===");

    // 1. Tables
    println!("\n[1] Building question tables...");
    let config = MatchConfig::generated(42);
    let tables = Arc::new(config.validate()?);
    println!("    {} questions, projection: {}", QUESTION_COUNT, tables.projection().is_some());

    // 2. World with three peers who finished the assessment
    println!("\n[2] Three peers answer every question...");
    let directory = PeerDirectory::shared();
    let mut peers = Vec::new();
    for (id, name) in [(1u64, "aki"), (2, "ren"), (3, "sora")] {
        directory.borrow_mut().join(id, name);
        let mut peer = MatchEngine::with_tables(
            id,
            name,
            &config,
            tables.clone(),
            MemoryStore::new(),
            directory.clone(),
            DirectoryPublisher::new(directory.clone(), id),
        );
        peer.start();
        peer.enable_public_sharing();
        let sheet = synthetic_answers(&tables, id * 7, 0.2);
        for (q, &r) in sheet.iter().enumerate() {
            peer.answer(q, r);
        }
        println!("    {} -> \"{}\"", name, peer.summary().headline);
        peers.push(peer);
    }

    // 3. Local user, persisted to disk
    let path = Path::new("demo_player.rec");
    println!("\n[3] Local user answers a third of the questions (record: {:?})...", path);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    directory.borrow_mut().join(0, "you");
    let mut me = MatchEngine::with_tables(
        0,
        "you",
        &config,
        tables.clone(),
        FileStore::new(path),
        directory.clone(),
        DirectoryPublisher::new(directory.clone(), 0),
    );
    me.start();
    me.enable_public_sharing();
    let sheet = synthetic_answers(&tables, 14, 0.2);
    for (q, &r) in sheet.iter().enumerate().take(QUESTION_COUNT / 3) {
        me.answer(q, r);
    }
    let local = me.local_vector();
    println!(
        "    Progress {:.0}%, reduced vector {:?}",
        local.completion_ratio * 100.0,
        local.reduced
    );

    // 4. Run frames until a scan completes
    println!("\n[4] Running frames at 72 FPS...");
    for _ in 0..240 {
        me.tick(1.0 / 72.0);
        for peer in &mut peers {
            peer.tick(1.0 / 72.0);
        }
    }
    println!("    {}", me.performance());
    println!("    Provisional recommendations:");
    print_recommendations(&me.top_k());

    // 5. Finish the assessment
    println!("\n[5] Finishing the assessment...");
    for (q, &r) in sheet.iter().enumerate().skip(QUESTION_COUNT / 3) {
        me.answer(q, r);
    }
    for _ in 0..240 {
        me.tick(1.0 / 72.0);
    }
    let summary = me.summary();
    println!("    Finalized: {}", me.session().is_finalized());
    println!("    Tags: {:?}", summary.tags);
    println!("    Headline: {}", summary.headline);
    println!("    {}", summary.summary_text);
    println!("    Final recommendations:");
    print_recommendations(&me.top_k());

    println!("\n=== Demo Complete ===");
    Ok(())
}
