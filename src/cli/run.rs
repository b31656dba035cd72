use crate::cli::RunArgs;
use crate::config::Config;
use crate::discovery::{load_documents, resolve_documents};
use crate::output::{write_summary, RunInfo};
use crate::pipeline::{PipelineBuilder, ResponseCache};
use crate::provider::create_transport;
use crate::runner::Orchestrator;
use anyhow::{bail, Context};
use chrono::Local;
use std::sync::Arc;
use tracing::{error, info, warn};

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    // Load and validate config
    info!("Loading config from {:?}", args.config);
    let mut config = Config::load(&args.config)?;

    // Apply CLI overrides
    if let Some(repeats) = args.repeats {
        config.repeats = repeats;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(api_url) = args.api_url {
        config.provider.api_url = api_url;
    }
    if let Some(model) = args.model {
        config.provider.model = model;
    }
    if let Some(report_dir) = args.report_dir {
        config.report_dir = report_dir;
    }
    if let Some(views) = &args.views {
        config.retain_views(views)?;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    if args.dry_run {
        config.dry_run = true;
    }

    config.validate()?;

    if config.dry_run {
        info!("DRY RUN - no LLM calls will be made");
        print_execution_plan(&config)?;
        return Ok(());
    }

    let api_key = match args.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => bail!("No API key: pass --api-key or set OPENAI_API_KEY"),
    };

    let documents = load_documents(&config)?;
    if documents.is_empty() {
        warn!("No documents found under {:?}", config.target);
    }

    let transport = create_transport(&config.provider, &api_key)?;
    let model_id = format!("{}@{}", config.provider.model, config.provider.temperature);
    let mut pipelines = PipelineBuilder::new(
        transport,
        config.concurrency,
        config.retry.clone(),
        model_id,
    );
    if config.cache.enabled {
        let cache = ResponseCache::open(&config.cache.path)
            .with_context(|| format!("opening cache {:?}", config.cache.path))?;
        pipelines = pipelines.with_cache(Arc::new(cache));
    }
    let cache = pipelines.cache().cloned();

    // Create dated report directory (result/YYYY-MM-DD/)
    let date_str = Local::now().format("%Y-%m-%d").to_string();
    let report_dir = config.report_dir.join(&date_str);
    info!("Reports will be written to {:?}", report_dir);

    let info = RunInfo {
        target: &config.target,
        model: &config.provider.model,
        repeats: config.repeats,
    };
    let orchestrator = Orchestrator::new(config.clone(), pipelines);
    let report = orchestrator.run(&documents, &report_dir).await;

    let summary = write_summary(&report_dir, &report, &info)?;

    if let Some(cache) = cache {
        if let Err(e) = cache.flush() {
            warn!("Failed to flush cache {}: {}", cache.path().display(), e);
        }
    }

    info!(
        "Completed in {:.1}s: {} views over {} documents, {} LLM calls ({} failed), {} in / {} out tokens",
        report.total_duration.as_secs_f64(),
        report.view_results.len(),
        report.documents,
        report.usage.remote_calls,
        report.usage.failed_calls,
        report.usage.input_tokens,
        report.usage.output_tokens
    );
    if let Some(stats) = report.cache {
        info!("Cache: {} hits, {} misses, {} entries", stats.hits, stats.misses, stats.entries);
    }

    if report.has_failures() {
        error!("Failed: {:?}", summary.failed);
        bail!(
            "{} failures; see {}",
            report.failure_count(),
            report_dir.join("summary.md").display()
        );
    }

    Ok(())
}

fn print_execution_plan(config: &Config) -> anyhow::Result<()> {
    let documents = resolve_documents(&config.target, &config.documents)?;
    let estimated_calls = estimated_calls(config, documents.len());

    println!("\n=== Execution Plan ===\n");
    println!("Target: {:?}", config.target);
    println!("Model: {} @ {}", config.provider.model, config.provider.temperature);
    println!("Repeats: {}", config.repeats);
    println!("Concurrency: {}", config.concurrency);
    println!("Report dir: {:?}", config.report_dir);
    if config.cache.enabled {
        println!("Cache: {:?}", config.cache.path);
    } else {
        println!("Cache: disabled");
    }

    println!("\nDocuments ({}):", documents.len());
    for path in &documents {
        println!("  - {}", path.display());
    }

    println!("\nViews to run:");
    for (id, view) in &config.views {
        println!(
            "  - {} ({}) -> {} checklist items",
            id,
            view.pretty_name,
            view.score_checklist.len()
        );
    }
    if !config.questions.is_empty() {
        println!("  - questions -> {} free-text questions", config.questions.len());
    }

    println!(
        "\nEstimated LLM calls (before cache hits and retries): {}",
        estimated_calls
    );
    println!();
    Ok(())
}

/// Remote calls a cold run makes; views with an empty checklist make none
fn estimated_calls(config: &Config, documents: usize) -> usize {
    let reviewed_views = config
        .views
        .values()
        .filter(|view| !view.score_checklist.is_empty())
        .count();
    let question_calls = if config.questions.is_empty() {
        0
    } else {
        documents
    };
    reviewed_views * documents * config.repeats as usize + question_calls
}
