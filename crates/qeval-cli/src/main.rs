mod client;
mod config;
mod controller;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand, ValueEnum};

use qeval_cache::{CacheStore, Namespace, SqliteSlot};
use qeval_core::{
    failure_tag_counts, frac_to_pct, latency_comparison, ms_to_secs, partition_scores,
    score_histogram, CachePayload, FilterSet, ReportRow, ScoreScale,
};

use client::{HttpQueryService, LeaderboardParams, QueryService};
use config::Config;
use controller::{fetch_evaluations, fetch_report, PageController};

#[derive(Parser)]
#[command(
    name = "qeval",
    version,
    about = "Browse and compare LLM question-evaluation results"
)]
struct Cli {
    /// Dashboard API base URL (overrides config)
    #[arg(long, global = true)]
    api: Option<String>,

    /// Path to the cache database (overrides config)
    #[arg(long, global = true)]
    cache_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank experiments across subjects
    Leaderboard {
        /// Filter by subject
        #[arg(short, long)]
        subject: Option<String>,

        /// Hide experiments with fewer total questions
        #[arg(short, long)]
        min_questions: Option<u64>,

        /// Filter by evaluator version
        #[arg(short, long)]
        evaluator_version: Option<String>,

        /// View mode passed through to the API
        #[arg(long)]
        view_mode: Option<String>,
    },

    /// Per-experiment report: partition, histogram, latency percentiles
    Report {
        /// Experiment tracker id
        #[arg(short = 'x', long)]
        experiment: String,

        /// Subject
        #[arg(short, long)]
        subject: String,

        /// Grade level
        #[arg(short, long)]
        grade: Option<String>,

        /// Question type
        #[arg(short = 't', long)]
        question_type: Option<String>,

        /// Use the benchmark cache namespace
        #[arg(short, long)]
        benchmark: bool,

        /// Bypass the cache and refetch
        #[arg(short, long)]
        refresh: bool,
    },

    /// Drill into individual evaluations and their failing metrics
    Evaluations {
        /// Experiment tracker id
        #[arg(short = 'x', long)]
        experiment: String,

        /// Subject
        #[arg(short, long)]
        subject: String,

        /// Grade level
        #[arg(short, long)]
        grade: Option<String>,

        /// Question type
        #[arg(short = 't', long)]
        question_type: Option<String>,

        /// Filter by difficulty
        #[arg(short, long)]
        difficulty: Option<String>,

        /// Only evaluations at or below this score
        #[arg(short = 'M', long)]
        max_score: Option<f64>,

        /// Look up recipe descriptions for failing evaluations
        #[arg(long)]
        show_recipes: bool,

        /// Bypass the cache and refetch
        #[arg(short, long)]
        refresh: bool,
    },

    /// Compare latency percentiles across cached reports
    Compare {
        /// Compare the benchmark cache instead of the report cache
        #[arg(short, long)]
        benchmark: bool,
    },

    /// Inspect or prune the cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List cached entries per namespace
    List {
        /// Namespace to list
        #[arg(short, long, default_value = "reports")]
        namespace: CliNamespace,
    },

    /// Delete one cached entry by its filter key
    Delete {
        /// Namespace to delete from
        #[arg(short, long, default_value = "reports")]
        namespace: CliNamespace,

        /// Filter key, e.g. "exp1|math|3|mcq||"
        key: String,
    },

    /// Drop every entry in a namespace
    Clear {
        /// Namespace to clear
        #[arg(short, long, default_value = "reports")]
        namespace: CliNamespace,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliNamespace {
    Reports,
    Benchmarks,
    Evaluations,
}

impl From<CliNamespace> for Namespace {
    fn from(val: CliNamespace) -> Self {
        match val {
            CliNamespace::Reports => Namespace::Reports,
            CliNamespace::Benchmarks => Namespace::Benchmarks,
            CliNamespace::Evaluations => Namespace::Evaluations,
        }
    }
}

fn open_cache(config: &Config, override_path: Option<PathBuf>) -> Result<CacheStore<SqliteSlot>> {
    let path = override_path.unwrap_or_else(|| config::cache_db_path(config));
    let slot = SqliteSlot::new(&path, Some(config.cache.quota_bytes))
        .with_context(|| format!("opening cache at {}", path.display()))?;
    Ok(CacheStore::new(slot))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config()?;
    let base_url = cli.api.unwrap_or_else(|| config.api.base_url.clone());
    let service = HttpQueryService::new(base_url);
    let cache = open_cache(&config, cli.cache_db)?;
    let threshold = config.scoring.pass_threshold;

    match cli.command {
        Commands::Leaderboard {
            subject,
            min_questions,
            evaluator_version,
            view_mode,
        } => cmd_leaderboard(
            &service,
            LeaderboardParams {
                subject,
                min_total_questions: min_questions,
                evaluator_version,
                view_mode,
            },
        ),
        Commands::Report {
            experiment,
            subject,
            grade,
            question_type,
            benchmark,
            refresh,
        } => {
            let mut filters = FilterSet::new(experiment, subject);
            filters.grade_level = grade;
            filters.question_type = question_type;
            let ns = if benchmark {
                Namespace::Benchmarks
            } else {
                Namespace::Reports
            };
            cmd_report(&service, &cache, ns, filters, threshold, refresh)
        }
        Commands::Evaluations {
            experiment,
            subject,
            grade,
            question_type,
            difficulty,
            max_score,
            show_recipes,
            refresh,
        } => {
            let mut filters = FilterSet::new(experiment, subject);
            filters.grade_level = grade;
            filters.question_type = question_type;
            filters.difficulty = difficulty;
            filters.max_score = max_score;
            cmd_evaluations(&service, &cache, filters, threshold, show_recipes, refresh)
        }
        Commands::Compare { benchmark } => {
            let ns = if benchmark {
                Namespace::Benchmarks
            } else {
                Namespace::Reports
            };
            cmd_compare(&cache, ns)
        }
        Commands::Cache { command } => match command {
            CacheCommands::List { namespace } => cmd_cache_list(&cache, namespace.into()),
            CacheCommands::Delete { namespace, key } => {
                cache.delete(namespace.into(), &key);
                println!("Deleted: {key}");
                Ok(())
            }
            CacheCommands::Clear { namespace } => {
                let ns: Namespace = namespace.into();
                cache.clear(ns);
                println!("Cleared namespace: {ns}");
                Ok(())
            }
        },
        Commands::Config => cmd_config(&config),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_leaderboard(service: &impl QueryService, params: LeaderboardParams) -> Result<()> {
    let rows = service.leaderboard(&params)?;
    if rows.is_empty() {
        println!("No experiments found.");
        return Ok(());
    }

    println!(
        "{:<28} {:<14} {:>9} {:>8} {:>8}",
        "Experiment", "Subject", "Questions", "Mean", "Pass"
    );
    println!("{}", "-".repeat(72));
    for row in &rows {
        println!(
            "{:<28} {:<14} {:>9} {:>7.1}% {:>7.1}%",
            row.experiment_tracker,
            row.subject,
            row.total_questions,
            frac_to_pct(row.mean_score),
            frac_to_pct(row.pass_rate),
        );
    }
    Ok(())
}

fn cmd_report(
    service: &impl QueryService,
    cache: &CacheStore<SqliteSlot>,
    ns: Namespace,
    filters: FilterSet,
    threshold: f64,
    refresh: bool,
) -> Result<()> {
    let mut ctl = PageController::new(ns);
    let key = filters.cache_key();

    if !refresh {
        if let Some(entry) = cache.find(ns, &key) {
            println!("(cached at {})", format_timestamp(entry.timestamp));
            ctl.load_cached(entry);
        }
    }

    if ctl.payload().is_none() {
        let Some(pending) = ctl.set_filters(filters) else {
            bail!("experiment tracker and subject are required");
        };
        let result = fetch_report(service, &pending.filters);
        ctl.apply_fetch(pending, result, cache);
    }

    if let Some(err) = ctl.error() {
        bail!("fetch failed: {err}");
    }

    let Some(CachePayload::Report {
        rows,
        summary,
        scores,
    }) = ctl.payload()
    else {
        println!("No report rows.");
        return Ok(());
    };

    if let Some(summary) = summary {
        println!(
            "{}: {} questions, {} passed, mean {:.1}%",
            summary.experiment_tracker,
            summary.total_questions,
            summary.passed_questions,
            frac_to_pct(summary.mean_score),
        );
        println!();
    }

    print_report_rows(rows);

    if !scores.is_empty() {
        println!();
        print_partition(scores, threshold);
        println!();
        print_histogram(scores);
    }

    Ok(())
}

fn cmd_evaluations(
    service: &impl QueryService,
    cache: &CacheStore<SqliteSlot>,
    filters: FilterSet,
    threshold: f64,
    show_recipes: bool,
    refresh: bool,
) -> Result<()> {
    let ns = Namespace::Evaluations;
    let mut ctl = PageController::new(ns);
    let key = filters.cache_key();

    if !refresh {
        if let Some(entry) = cache.find(ns, &key) {
            println!("(cached at {})", format_timestamp(entry.timestamp));
            ctl.load_cached(entry);
        }
    }

    if ctl.payload().is_none() {
        let Some(pending) = ctl.set_filters(filters) else {
            bail!("experiment tracker and subject are required");
        };
        let result = fetch_evaluations(service, &pending.filters);
        ctl.apply_fetch(pending, result, cache);
    }

    if let Some(err) = ctl.error() {
        bail!("fetch failed: {err}");
    }

    let Some(CachePayload::Evaluations { rows }) = ctl.payload() else {
        println!("No evaluations.");
        return Ok(());
    };

    if rows.is_empty() {
        println!("No evaluations.");
        return Ok(());
    }

    println!("{} evaluations", rows.len());

    let tags = failure_tag_counts(rows, threshold);
    if tags.is_empty() {
        println!("No failing metrics below {:.0}%.", frac_to_pct(threshold));
    } else {
        println!();
        println!("{:<28} Failures", "Metric");
        println!("{}", "-".repeat(40));
        for tag in &tags {
            println!("{:<28} {}", tag.tag, tag.count);
        }
    }

    println!();
    println!(
        "{:<20} {:<16} {:>7} {:<10}",
        "Question", "Recipe", "Score", "Difficulty"
    );
    println!("{}", "-".repeat(58));
    for row in rows {
        println!(
            "{:<20} {:<16} {:>6.1}% {:<10}",
            row.question_id,
            row.recipe_id,
            frac_to_pct(row.evaluator_score),
            row.difficulty,
        );
    }

    if show_recipes {
        let mut recipe_ids: Vec<String> = rows
            .iter()
            .filter(|r| r.evaluator_score < threshold)
            .map(|r| r.recipe_id.clone())
            .collect();
        recipe_ids.sort();
        recipe_ids.dedup();

        if !recipe_ids.is_empty() {
            let recipes = service.recipes(&recipe_ids)?;
            println!();
            println!("Recipes behind failing evaluations:");
            for recipe in &recipes {
                println!("  {}: {}", recipe.recipe_id, recipe.description);
            }
        }
    }

    Ok(())
}

fn cmd_compare(cache: &CacheStore<SqliteSlot>, ns: Namespace) -> Result<()> {
    let entries = cache.load(ns);
    if entries.is_empty() {
        println!("No cached reports to compare. Run `qeval report` first.");
        return Ok(());
    }

    let reports: Vec<(String, Vec<ReportRow>)> = entries
        .iter()
        .filter_map(|e| match &e.payload {
            CachePayload::Report { rows, .. } => {
                Some((e.filters.experiment_tracker.clone(), rows.clone()))
            }
            CachePayload::Evaluations { .. } => None,
        })
        .collect();

    let table = latency_comparison(&reports);

    println!("TTFT median / p95 (seconds)");
    print!("{:<12}", "Difficulty");
    for label in &table.reports {
        print!(" {label:>20}");
    }
    println!();
    println!("{}", "-".repeat(12 + 21 * table.reports.len()));

    for (difficulty_idx, difficulty) in table.difficulties.iter().enumerate() {
        print!("{difficulty:<12}");
        for report_idx in 0..table.reports.len() {
            match table.cell(difficulty_idx, report_idx) {
                Some(stats) => print!(
                    " {:>20}",
                    format!(
                        "{:.2}s / {:.2}s",
                        ms_to_secs(stats.ttft_median_ms),
                        ms_to_secs(stats.ttft_p95_ms)
                    )
                ),
                None => print!(" {:>20}", "n/a"),
            }
        }
        println!();
    }

    println!();
    println!("Generation median / p95 (seconds)");
    for (difficulty_idx, difficulty) in table.difficulties.iter().enumerate() {
        print!("{difficulty:<12}");
        for report_idx in 0..table.reports.len() {
            match table.cell(difficulty_idx, report_idx) {
                Some(stats) => print!(
                    " {:>20}",
                    format!(
                        "{:.2}s / {:.2}s",
                        ms_to_secs(stats.gen_median_ms),
                        ms_to_secs(stats.gen_p95_ms)
                    )
                ),
                None => print!(" {:>20}", "n/a"),
            }
        }
        println!();
    }

    Ok(())
}

fn cmd_cache_list(cache: &CacheStore<SqliteSlot>, ns: Namespace) -> Result<()> {
    let entries = cache.load(ns);
    if entries.is_empty() {
        println!("Namespace '{ns}' is empty.");
        return Ok(());
    }

    println!("{:<36} {:<22} Rows", "Key", "Cached at");
    println!("{}", "-".repeat(66));
    for entry in &entries {
        println!(
            "{:<36} {:<22} {}",
            entry.key(),
            format_timestamp(entry.timestamp),
            entry.payload.primary_len(),
        );
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("Config file: {}", config::show_config_path());
    println!("API base URL: {}", config.api.base_url);
    println!("Cache db: {}", config::cache_db_path(config).display());
    println!("Cache quota: {} bytes", config.cache.quota_bytes);
    println!("Pass threshold: {}", config.scoring.pass_threshold);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_report_rows(rows: &[ReportRow]) {
    println!(
        "{:<12} {:>9} {:>8} {:>7} {:>12} {:>12}",
        "Difficulty", "Questions", "Passed", "Mean", "TTFT p50/p95", "Gen p50/p95"
    );
    println!("{}", "-".repeat(66));
    for row in rows {
        println!(
            "{:<12} {:>9} {:>8} {:>6.1}% {:>5.2}s/{:>5.2}s {:>5.2}s/{:>5.2}s",
            row.difficulty,
            row.total_questions,
            row.passed_questions,
            frac_to_pct(row.mean_score),
            ms_to_secs(row.ttft_median_ms),
            ms_to_secs(row.ttft_p95_ms),
            ms_to_secs(row.gen_median_ms),
            ms_to_secs(row.gen_p95_ms),
        );
    }
}

fn print_partition(scores: &[qeval_core::ScoreRow], threshold: f64) {
    let partition = partition_scores(scores, threshold);
    let total = scores.len().max(1) as f64;
    println!(
        "Scores: {} zero ({:.1}%), {} below threshold ({:.1}%), {} passed ({:.1}%)",
        partition.zero.len(),
        frac_to_pct(partition.zero.len() as f64 / total),
        partition.below.len(),
        frac_to_pct(partition.below.len() as f64 / total),
        partition.passed.len(),
        frac_to_pct(partition.passed.len() as f64 / total),
    );
}

fn print_histogram(scores: &[qeval_core::ScoreRow]) {
    let raw: Vec<f64> = scores.iter().map(|r| r.evaluator_score).collect();
    let histogram = score_histogram(&raw, ScoreScale::Fraction);
    let peak = histogram.buckets.iter().copied().max().unwrap_or(0).max(1);

    println!(
        "Score distribution (mean {:.1}%):",
        frac_to_pct(histogram.mean)
    );
    for (bucket, &count) in histogram.buckets.iter().enumerate() {
        let bar = "#".repeat(count * 40 / peak);
        println!("{bucket:>3}  {count:>5}  {bar}");
    }
}

fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}
