use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod analytics;
mod config;
mod correlation;
mod db;
mod error;
mod export;
mod history;
mod intervention;
mod logging;
mod models;
mod report;
mod risk;
mod trend;

use analytics::AttendanceAnalytics;
use config::AppConfig;
use db::{AggregateStore, MemoryAggregateStore, PgAggregateStore};
use models::Period;

#[derive(Parser)]
#[command(name = "attendance-evasion-risk")]
#[command(about = "Attendance-based evasion risk analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo cohort for the last six months
    Seed,
    /// Import period attendance aggregates from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank students by evasion risk
    Risk {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        class_id: Option<Uuid>,
        #[arg(long)]
        limit: Option<usize>,
        /// Last period of the analysis window, as YYYY-MM
        #[arg(long)]
        anchor: Option<Period>,
        #[command(flatten)]
        output: Output,
    },
    /// Bucket at-risk students into intervention tiers
    Plan {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        class_id: Option<Uuid>,
        #[arg(long)]
        anchor: Option<Period>,
        #[command(flatten)]
        output: Output,
    },
    /// Correlate attendance with estimated performance
    Correlation {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        class_id: Option<Uuid>,
        /// Restrict to a single period, as YYYY-MM
        #[arg(long)]
        period: Option<Period>,
        #[command(flatten)]
        output: Output,
    },
}

#[derive(clap::Args)]
struct Source {
    /// Read aggregates from a CSV export instead of Postgres
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(clap::Args)]
struct Output {
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// Field delimiter for csv output
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    /// Write to a file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Csv,
}

enum Analysis {
    Risk {
        class_id: Option<Uuid>,
        limit: Option<usize>,
        anchor: Option<Period>,
    },
    Plan {
        class_id: Option<Uuid>,
        anchor: Option<Period>,
    },
    Correlation {
        class_id: Option<Uuid>,
        period: Option<Period>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::from_env();
    logging::init_tracing(&app_config.log_level);

    let (source, analysis, output) = match cli.command {
        Commands::InitDb => {
            db::init_db(&connect(&app_config).await?).await?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Seed => {
            let written = db::seed(&connect(&app_config).await?).await?;
            println!("Seeded {written} aggregate rows.");
            return Ok(());
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&connect(&app_config).await?, &csv).await?;
            println!("Imported {imported} aggregates from {}.", csv.display());
            return Ok(());
        }
        Commands::Risk {
            source,
            class_id,
            limit,
            anchor,
            output,
        } => (
            source,
            Analysis::Risk {
                class_id,
                limit,
                anchor,
            },
            output,
        ),
        Commands::Plan {
            source,
            class_id,
            anchor,
            output,
        } => (source, Analysis::Plan { class_id, anchor }, output),
        Commands::Correlation {
            source,
            class_id,
            period,
            output,
        } => (source, Analysis::Correlation { class_id, period }, output),
    };

    let heuristics = app_config.heuristics()?;
    let rendered = match source.input {
        Some(path) => {
            let store = MemoryAggregateStore::from_csv_path(&path)
                .with_context(|| format!("failed to load aggregates from {}", path.display()))?;
            run(AttendanceAnalytics::new(store, heuristics), analysis, &output).await?
        }
        None => {
            let store = PgAggregateStore::new(connect(&app_config).await?);
            run(AttendanceAnalytics::new(store, heuristics), analysis, &output).await?
        }
    };

    match &output.out {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!("Report written to {}.", path.display());
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

async fn connect(app_config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(app_config.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

async fn run<S: AggregateStore>(
    analytics: AttendanceAnalytics<S>,
    analysis: Analysis,
    output: &Output,
) -> anyhow::Result<String> {
    let delimiter = u8::try_from(output.delimiter).context("delimiter must be a single ASCII character")?;

    let rendered = match analysis {
        Analysis::Risk {
            class_id,
            limit,
            anchor,
        } => {
            let limit = limit.unwrap_or(analytics.config().report.default_limit);
            let report = analytics.get_evasion_risk(class_id, limit, anchor).await?;
            match output.format {
                Format::Json => serde_json::to_string_pretty(&report)?,
                Format::Csv => export::export_risk_report(&report, delimiter)?,
                Format::Text => render_risk(&report),
            }
        }
        Analysis::Plan { class_id, anchor } => {
            let plan = analytics.get_intervention_plan(class_id, anchor).await?;
            match output.format {
                Format::Json => serde_json::to_string_pretty(&plan)?,
                Format::Csv => export::export_intervention_plan(&plan, delimiter)?,
                Format::Text => render_plan(&plan),
            }
        }
        Analysis::Correlation { class_id, period } => {
            let study = analytics
                .get_attendance_performance_correlation(class_id, period)
                .await?;
            match output.format {
                Format::Json => serde_json::to_string_pretty(&study)?,
                Format::Csv => export::export_correlation(&study, delimiter)?,
                Format::Text => render_correlation(&study),
            }
        }
    };

    Ok(rendered)
}

fn render_risk(report: &models::CohortRiskReport) -> String {
    let stats = &report.stats;
    let mut lines = vec![format!(
        "Window {}: {} analyzed, {} at risk ({:.1}%)",
        stats.window, stats.analyzed, stats.at_risk, stats.risk_rate
    )];

    if report.students.is_empty() {
        lines.push("No students at risk for this window.".to_string());
    }
    for profile in &report.students {
        lines.push(format!(
            "- {} ({}) score {:.2} [{}] attendance {:.1}% trend {:+.2}: {}",
            profile.student_name,
            profile.class_name,
            profile.score,
            profile.tier,
            profile.mean_pct,
            profile.trend,
            profile
                .recommendations
                .iter()
                .map(|item| item.description())
                .collect::<Vec<_>>()
                .join("; ")
        ));
    }

    lines.join("\n") + "\n"
}

fn render_plan(plan: &intervention::InterventionPlan) -> String {
    let mut lines = vec![format!("Intervention plan for {}", plan.window)];

    for bucket in plan.buckets() {
        lines.push(format!(
            "## {} ({} students): {} within {}, owner {}",
            bucket.urgency.as_str(),
            bucket.students.len(),
            bucket.action,
            bucket.response_window,
            bucket.responsible
        ));
        for student in &bucket.students {
            lines.push(format!(
                "- {} ({}) score {:.2}",
                student.student_name, student.class_name, student.score
            ));
        }
    }
    lines.push("Guidance:".to_string());
    lines.extend(plan.guidance.iter().map(|line| format!("- {line}")));

    lines.join("\n") + "\n"
}

fn render_correlation(study: &correlation::CorrelationStudy) -> String {
    let mut lines = vec![format!(
        "r = {:.3} ({}) over {} students, mean attendance {:.1}%, mean estimated performance {:.1}",
        study.coefficient,
        study.strength.as_str(),
        study.records.len(),
        study.mean_attendance,
        study.mean_performance
    )];
    for record in &study.records {
        lines.push(format!(
            "- {} ({}) attendance {:.1}% performance {:.1}: {}",
            record.student_name,
            record.class_name,
            record.attendance_pct,
            record.estimated_performance,
            record.classification.as_str()
        ));
    }
    lines.extend(study.recommendations.iter().map(|line| format!("* {line}")));

    lines.join("\n") + "\n"
}
