use data_loader::AnimeCatalog;
use std::path::Path;
use std::time::Instant;

fn main() {
    let path = Path::new("data/anime_index.json");

    println!("Loading anime catalog...\n");

    let start = Instant::now();
    let catalog = AnimeCatalog::load_from_file(path)
        .expect("Failed to load catalog");
    let elapsed = start.elapsed();

    println!("\n=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Model: {}", catalog.model());
    println!("Records: {}", catalog.len());
    println!("Dimension: {:?}", catalog.dimension());
    println!("\nPerformance: {:.0} records/second",
             catalog.len() as f64 / elapsed.as_secs_f64());
}
