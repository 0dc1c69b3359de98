use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use ragdb_core::config::{Config, Settings};
use ragdb_core::traits::VectorBackend;
use ragdb_core::types::{Chunk, CollectionInfo, HybridHit};
use ragdb_hybrid::{FusionWeights, HybridEngine, QueryIntent};
use ragdb_vector::LanceBackend;

const USAGE: &str = "Usage:
  ragdb ingest <file.jsonl|dir> [--query Q]... [--top-k N] [--weights V,L]
               [--doc-type T | --tags a,b | --intent I] [--save-state PATH]
  ragdb clear
  ragdb stats";

#[derive(Debug, Default)]
struct QueryOpts {
    queries: Vec<String>,
    top_k: Option<usize>,
    weights: Option<FusionWeights>,
    doc_type: Option<String>,
    tags: Vec<String>,
    intent: Option<QueryIntent>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn usage_exit() -> ! {
    eprintln!("{USAGE}");
    std::process::exit(1)
}

fn parse_weights(s: &str) -> anyhow::Result<FusionWeights> {
    let (v, l) = s.split_once(',').ok_or_else(|| anyhow!("--weights expects V,L (e.g. 0.3,0.7)"))?;
    let weights = FusionWeights::new(v.trim().parse()?, l.trim().parse()?);
    weights.validate()?;
    Ok(weights)
}

fn parse_ingest_args(args: &[String]) -> anyhow::Result<(PathBuf, QueryOpts, Option<PathBuf>)> {
    let mut input = None; let mut opts = QueryOpts::default(); let mut save_state = None;
    let mut i = 0;
    while i < args.len() {
        let value = |i: usize| args.get(i + 1).cloned().ok_or_else(|| anyhow!("{} requires a value", args[i]));
        match args[i].as_str() {
            "--query" | "-q" => { opts.queries.push(value(i)?); i += 1; }
            "--top-k" | "-k" => { opts.top_k = Some(value(i)?.parse().context("--top-k must be a number")?); i += 1; }
            "--weights" => { opts.weights = Some(parse_weights(&value(i)?)?); i += 1; }
            "--doc-type" => { opts.doc_type = Some(value(i)?); i += 1; }
            "--tags" => { opts.tags = value(i)?.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect(); i += 1; }
            "--intent" => { opts.intent = Some(value(i)?.parse()?); i += 1; }
            "--save-state" => { save_state = Some(PathBuf::from(value(i)?)); i += 1; }
            a if !a.starts_with('-') => input = Some(PathBuf::from(a)),
            other => bail!("unknown flag: {other}"),
        }
        i += 1;
    }
    let input = input.ok_or_else(|| anyhow!("missing input file or directory"))?;
    Ok((input, opts, save_state))
}

/// `*.jsonl` files under `input` in path order, or `input` itself.
fn chunk_files(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if input.is_file() { return Ok(vec![input.to_path_buf()]); }
    if !input.is_dir() { bail!("{} does not exist", input.display()); }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "jsonl"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn read_chunks(path: &Path) -> anyhow::Result<Vec<Chunk>> {
    let reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
    let mut chunks = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let chunk: Chunk = serde_json::from_str(&line).with_context(|| format!("{}:{}: invalid chunk", path.display(), n + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn snippet(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max { flat } else { format!("{}…", flat.chars().take(max).collect::<String>()) }
}

fn print_hits(query: &str, hits: &[HybridHit]) {
    println!("\n🔍 {} results for \"{}\"", hits.len(), query);
    for (i, h) in hits.iter().enumerate() {
        let doc_type = h.metadata.get("doc_type").and_then(|v| v.as_str()).unwrap_or("-");
        println!("  {}. combined={:.4} vector={:.4} bm25={:.4} type={}", i + 1, h.combined_score, h.vector_score, h.bm25_score, doc_type);
        println!("     {}", snippet(&h.content, 160));
    }
}

fn describe_collection(name: &str, info: Option<CollectionInfo>) -> String {
    match info {
        Some(info) => format!("collection '{}': {} points, dim {}", name, info.points, info.dim),
        None => format!("collection '{}' does not exist", name),
    }
}

async fn ingest(engine: &HybridEngine<LanceBackend>, settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let (input, opts, save_state) = parse_ingest_args(args)?;
    let mut chunks = Vec::new();
    for file in chunk_files(&input)? { chunks.extend(read_chunks(&file)?); }
    if chunks.is_empty() { bail!("no chunks found in {}", input.display()); }
    info!(chunks = chunks.len(), input = %input.display(), "ingesting");

    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?.progress_chars("#>-"));
    for batch in chunks.chunks(settings.engine.batch_size) {
        engine.add_documents(batch).await?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("done");

    let top_k = opts.top_k.unwrap_or(settings.engine.top_k);
    let weights = opts.weights.unwrap_or_else(|| engine.default_weights());
    for query in &opts.queries {
        let hits = if let Some(intent) = opts.intent {
            engine.search_with_intent(query, intent, top_k).await?
        } else if let Some(doc_type) = &opts.doc_type {
            engine.search_by_type(query, doc_type, top_k).await?
        } else if !opts.tags.is_empty() {
            engine.search_by_tags(query, &opts.tags, top_k).await?
        } else {
            engine.hybrid_search(query, top_k, weights).await?
        };
        print_hits(query, &hits);
    }

    let stats = engine.stats().await;
    println!("\n📊 {} chunks in {} batches, {} unique points", stats.chunks, stats.batches, stats.unique_points);
    if let Some(path) = save_state { engine.save_state(&path).await?; }
    Ok(())
}

async fn run(cmd: &str, args: &[String]) -> anyhow::Result<()> {
    let config = Config::load()?;
    let settings = config.settings()?;
    let engine = HybridEngine::open(&settings).await?;
    match cmd {
        "ingest" => ingest(&engine, &settings, args).await,
        "clear" => {
            engine.clear().await?;
            println!("✅ Cleared collection '{}'", settings.engine.collection_name);
            Ok(())
        }
        "stats" => {
            let name = &settings.engine.collection_name;
            // The ingestion ledger lives in the ingesting process; only the store is shared.
            println!("{}", describe_collection(name, engine.backend().collection_info(name).await?));
            Ok(())
        }
        _ => usage_exit(),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { usage_exit(); }
    let cmd = args.remove(0);
    if !matches!(cmd.as_str(), "ingest" | "clear" | "stats") { usage_exit(); }
    tokio::runtime::Runtime::new()?.block_on(run(&cmd, &args))
}
