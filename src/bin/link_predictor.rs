use link_predictor::persistence::load_document;
use link_predictor::{
    load_csv_dir, CancellationToken, Dataset, FrameAnalyzer, FrameIntersection, LinkError, LlmValidator,
    PgIntersection, PredictedLink, Predictor, PredictorConfig,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "link-predictor")]
#[command(about = "Discover primary/foreign key relationships between datasets")]
#[command(version)]
struct Args {
    /// JSON config file (LINK_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile every CSV in a directory and predict links between them
    Predict {
        /// Directory of CSV files; each file is one dataset named after its stem
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Where to write the links (reused on the next run unless --force)
        #[arg(short, long, default_value = "links.json")]
        output: PathBuf,

        /// Recompute every pair even if results exist
        #[arg(long)]
        force: bool,

        /// Ignore date & time columns
        #[arg(long)]
        remove_datetime: bool,

        /// Confirm candidates with an OpenAI-compatible model (OPENAI_API_KEY)
        #[arg(long)]
        validate_with_llm: bool,
    },
    /// Predict links over PostgreSQL tables from precomputed dataset profiles
    PredictPostgres {
        /// JSON array of profiled datasets
        #[arg(short, long)]
        profiles: PathBuf,

        /// Connection string (or set DATABASE_URL)
        #[arg(long)]
        database_url: Option<String>,

        /// Map a dataset to a table, as dataset=schema.table (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,

        #[arg(short, long, default_value = "links.json")]
        output: PathBuf,

        #[arg(long)]
        force: bool,

        #[arg(long)]
        validate_with_llm: bool,
    },
    /// Print links saved by a previous run
    Show {
        #[arg(short, long, default_value = "links.json")]
        input: PathBuf,

        /// Only links touching this dataset
        #[arg(long)]
        dataset: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Predict {
            data_dir,
            output,
            force,
            remove_datetime,
            validate_with_llm,
        } => {
            let config = PredictorConfig {
                remove_datetime_candidates: config.remove_datetime_candidates || remove_datetime,
                ..config
            };
            run_predict(data_dir, output, force, validate_with_llm, config).await
        }
        Commands::PredictPostgres {
            profiles,
            database_url,
            tables,
            output,
            force,
            validate_with_llm,
        } => {
            run_predict_postgres(profiles, database_url, tables, output, force, validate_with_llm, config).await
        }
        Commands::Show { input, dataset } => show_links(&input, dataset.as_deref(), config.cardinality_threshold),
    }
}

fn load_config(path: Option<&Path>) -> Result<PredictorConfig> {
    let config = match path {
        Some(path) => PredictorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PredictorConfig::default(),
    };
    let config = config
        .with_env_overrides()
        .map_err(|e| anyhow::anyhow!("Invalid LINK_* environment: {}", e))?;
    Ok(config)
}

async fn run_predict(
    data_dir: PathBuf,
    output: PathBuf,
    force: bool,
    validate_with_llm: bool,
    config: PredictorConfig,
) -> Result<()> {
    info!("Loading CSV files from {:?}", data_dir);
    let frames = load_csv_dir(&data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", data_dir.display(), e))?;

    let datasets: Vec<Dataset> = frames.iter().map(|(name, _)| Dataset::unanalyzed(name.clone())).collect();
    let analyzer = FrameAnalyzer::from_frames(frames.iter().map(|(n, df)| (n.clone(), df.clone())));
    let provider = FrameIntersection::from_frames(frames);

    let predictor = Predictor::new(datasets, Arc::new(provider), config)?.with_analyzer(Arc::new(analyzer));
    run_and_save(predictor, &output, force, validate_with_llm).await
}

async fn run_predict_postgres(
    profiles: PathBuf,
    database_url: Option<String>,
    tables: Vec<String>,
    output: PathBuf,
    force: bool,
    validate_with_llm: bool,
    config: PredictorConfig,
) -> Result<()> {
    let content = std::fs::read_to_string(&profiles)
        .with_context(|| format!("Failed to read {}", profiles.display()))?;
    let datasets: Vec<Dataset> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dataset profiles in {}", profiles.display()))?;

    let database_url = database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("No database URL: pass --database-url or set DATABASE_URL"))?;

    let max_connections = u32::try_from(config.max_concurrency).unwrap_or(u32::MAX).max(1);
    let mut provider = PgIntersection::connect(&database_url, max_connections)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    for mapping in &tables {
        let (dataset, table) = mapping
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("--table expects dataset=table, got {:?}", mapping))?;
        provider = provider.with_table(dataset.trim(), table.trim());
    }

    let predictor = Predictor::new(datasets, Arc::new(provider), config)?;
    run_and_save(predictor, &output, force, validate_with_llm).await
}

async fn run_and_save(mut predictor: Predictor, output: &Path, force: bool, validate_with_llm: bool) -> Result<()> {
    if validate_with_llm {
        let validator = LlmValidator::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;
        predictor = predictor.with_validator(Arc::new(validator));
    }

    if !force && output.exists() {
        let reused = predictor
            .load(output)
            .with_context(|| format!("Failed to read previous links from {}", output.display()))?;
        info!("Reusing {} previously computed link(s) from {:?}", reused, output);
    }

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with the pairs completed so far");
            ctrl_c.cancel();
        }
    });

    let outcome = predictor.predict_with_cancel(force, token).await;
    match &outcome {
        Ok(_) => {}
        Err(e @ LinkError::Cancelled { .. }) | Err(e @ LinkError::PrerequisiteMissing { .. }) => {
            warn!("{}; saving partial results", e);
        }
        Err(e) => return Err(anyhow::anyhow!("Link prediction failed: {}", e)),
    }

    predictor.save(output)?;
    print_links(&predictor.links(), predictor.config().cardinality_threshold);
    println!("\n Saved to {}", output.display());

    outcome.map(|_| ()).map_err(|e| anyhow::anyhow!("{}", e))
}

fn show_links(input: &Path, dataset: Option<&str>, cardinality_threshold: f64) -> Result<()> {
    let document = load_document(input).with_context(|| format!("Failed to read {}", input.display()))?;
    println!(" Generated at: {}", document.generated_at);

    let links: Vec<PredictedLink> = document
        .into_links()
        .into_iter()
        .filter(|l| dataset.map(|d| l.involves(d)).unwrap_or(true))
        .collect();
    print_links(&links, cardinality_threshold);
    Ok(())
}

fn print_links(links: &[PredictedLink], cardinality_threshold: f64) {
    println!("\n{}", "=".repeat(80));
    println!(" {} RELATIONSHIP(S)", links.len());
    println!("{}", "=".repeat(80));
    for link in links {
        let rel = link.relationship_with(cardinality_threshold);
        println!(
            " {:<40} {:<14} -> {:<40} accuracy {:.2}{}{}",
            rel.source.field_id(),
            rel.kind.to_string(),
            rel.target.field_id(),
            link.accuracy,
            if link.is_composite() { " (composite key)" } else { "" },
            if link.low_confidence { " (low confidence)" } else { "" }
        );
    }
}
