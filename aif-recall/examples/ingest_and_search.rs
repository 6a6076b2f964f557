use aif_embedder::DeterministicStubEmbedder;
use aif_recall::{Config, Facade, IndexDirectoryRequest, SearchRequest};
use aif_store::Store;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: cargo run -p aif-recall --example ingest_and_search -- <DIR> <QUERY>");
        std::process::exit(1);
    }
    let dir = &args[1];
    let query = &args[2];

    let cfg = Config::default();
    let mut store = Store::open(&cfg.db_path)?;
    let embedder = DeterministicStubEmbedder::new(&cfg.model, 384)?;
    let mut facade = Facade::new(&mut store, &embedder);

    let (files, chunks) = facade.index_directory(IndexDirectoryRequest {
        directory: dir.into(),
        collection: "default".to_string(),
        recursive: true,
    })?;
    println!("indexed {files} files, {chunks} chunks");

    let hits = facade.search(SearchRequest {
        query_text: query.clone(),
        embedding: None,
        collection: Some("default".to_string()),
        threshold: 0.0,
        limit: 10,
        hybrid_weight: Some(cfg.hybrid_weight),
    })?;
    println!("Results: {}", hits.len());
    for (i, h) in hits.iter().enumerate() {
        let preview: String = h.chunk.text.chars().take(80).collect();
        println!("{:>2}. [{}] {:.4} {}", i + 1, h.chunk.id, h.score, preview);
    }
    Ok(())
}
