use ragdb_core::config::Config;
use ragdb_core::traits::Embedder;
use ragdb_embed::get_default_embedder;

fn main() -> anyhow::Result<()> {
    let settings = Config::load()?.settings()?;
    let embedder = get_default_embedder(&settings.embedding);
    let texts = vec!["CRISPR gene editing trial results".to_string(), "Quarterly budget meeting notes".to_string()];
    match embedder.embed_batch(&texts) {
        Ok(embs) => println!("{}: B={} dim={}", embedder.id(), embs.len(), embs.first().map_or(0, Vec::len)),
        Err(e) => println!("{}: {e}", embedder.id()),
    }
    Ok(())
}
