//! Knowledge base commands: `ingest`, `search`, `kb-stats`, `kb-clear`.

use std::io::Write;
use std::path::Path;

use carwise_core::store::DocumentStore;
use carwise_store::Ingestor;

use super::runtime::Runtime;

pub async fn ingest(path: &Path, description: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    runtime.require_provider()?;

    let ingestor = Ingestor::new(runtime.store.clone(), runtime.chunking());
    let report = ingestor.ingest_path(path, description).await?;

    for (name, chunks) in &report.files {
        println!("✅ {name}: {chunks} chunks");
    }
    for (skipped, reason) in &report.skipped {
        println!("⚠️  {}: {reason}", skipped.display());
    }
    println!(
        "\n{} files, {} chunks added to {}",
        report.files.len(),
        report.total_chunks(),
        runtime.config.store.resolved_path().display()
    );
    Ok(())
}

pub async fn search(query: &str, k: usize) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let results = runtime.store.search(query, k).await?;

    if results.is_empty() {
        println!("No documents found.");
        return Ok(());
    }
    for (i, chunk) in results.iter().enumerate() {
        println!("{}. [{}] score {:.3}", i + 1, chunk.source, chunk.score);
        let preview: String = chunk.text.chars().take(200).collect();
        println!("   {}\n", preview.replace('\n', " "));
    }
    Ok(())
}

pub async fn stats() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let stats = runtime.store.stats().await?;

    println!("Knowledge base: {}", runtime.config.store.resolved_path().display());
    println!("  Chunks:  {}", stats.chunk_count);
    println!("  Sources: {}", stats.sources.len());
    for source in &stats.sources {
        println!("    - {source}");
    }
    Ok(())
}

pub async fn clear(yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    let count = runtime.store.count().await?;
    if count == 0 {
        println!("Knowledge base is already empty.");
        return Ok(());
    }

    if !yes {
        print!("Delete {count} chunks? [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    runtime.store.clear().await?;
    println!("🗑️  Removed {count} chunks.");
    Ok(())
}
