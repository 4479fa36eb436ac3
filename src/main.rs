//! medrec: symptom-to-diagnosis command line.
//!
//! ```bash
//! medrec diagnose <symptom>...
//! medrec interactive
//! medrec info <disease>
//! medrec import-reference <profiles.json>
//! medrec history [limit] [--delete <id> | --clear]
//! ```

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use medrec::adapters::linear::LinearClassifier;
use medrec::adapters::sanitize::SanitizingMakeWriter;
use medrec::adapters::sqlite::SqliteStorage;
use medrec::application::{DiagnosisContext, DiagnosisService, RecommendationService};
use medrec::config::AppConfig;
use medrec::domain::{DiseaseCodeTable, DiseaseProfile};
use medrec::ports::Storage;
use medrec::Diagnosis;

const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Parser)]
#[command(name = "medrec")]
#[command(about = "Predict a disease from a list of symptoms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose the given symptom names and print the prediction as JSON
    Diagnose {
        /// Symptom names, e.g. itching skin_rash
        symptoms: Vec<String>,
    },
    /// Enter symptoms one per line, then print the prediction and its reference profile
    Interactive,
    /// Print the stored reference profile of a disease
    Info {
        /// Exact disease name
        disease: String,
    },
    /// Import disease profiles from a JSON array
    ImportReference {
        /// Path to the profiles JSON file
        path: PathBuf,
    },
    /// Show, delete or clear recorded diagnoses
    History(HistoryArgs),
}

#[derive(Args, Debug, PartialEq, Eq)]
struct HistoryArgs {
    /// Number of recent diagnoses to show
    limit: Option<usize>,

    /// Delete one diagnosis by id
    #[arg(long, value_name = "ID", conflicts_with_all = ["limit", "clear"])]
    delete: Option<String>,

    /// Delete every recorded diagnosis
    #[arg(long, conflicts_with = "limit")]
    clear: bool,
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Results go to stdout, so logs never do unless asked:
    // - interactive TTY: log to a file
    // - otherwise: log to stderr
    let log_mode = std::env::var("MEDREC_LOG_MODE").unwrap_or_else(|_| "auto".to_string());

    let (writer, guard) = match log_mode.as_str() {
        "file" => tracing_appender::non_blocking(open_log_file()?),
        "stdout" => tracing_appender::non_blocking(std::io::stdout()),
        "stderr" => tracing_appender::non_blocking(std::io::stderr()),
        _ if std::io::stdout().is_terminal() => tracing_appender::non_blocking(open_log_file()?),
        _ => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SanitizingMakeWriter::new(writer)),
        )
        .init();

    Ok(guard)
}

fn open_log_file() -> Result<std::fs::File> {
    let log_file = std::env::var("MEDREC_LOG_FILE").unwrap_or_else(|_| "medrec.log".to_string());

    if let Some(parent) = std::path::Path::new(&log_file).parent() {
        // Best-effort: a missing directory surfaces as the open error below.
        let _ = std::fs::create_dir_all(parent);
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("Failed to open log file {log_file:?}"))
}

fn open_storage(config: &AppConfig) -> Result<Arc<SqliteStorage>> {
    let storage = SqliteStorage::new(config.db_path())
        .with_context(|| format!("Failed to open database {:?}", config.db_path()))?;
    Ok(Arc::new(storage))
}

fn diagnosis_service(
    config: &AppConfig,
    storage: &Arc<SqliteStorage>,
) -> Result<DiagnosisService<SqliteStorage>> {
    let model_dir = config.model_path();
    if !model_dir.exists() {
        bail!(
            "Model path not found at {:?}. Set MEDREC_MODEL_PATH to a directory containing model.json.",
            model_dir
        );
    }

    // Refuse to start if the model cannot be loaded and verified.
    let classifier = LinearClassifier::load(model_dir, &config.model_trust()?)
        .map_err(|e| anyhow!("Failed to load model from {:?}: {}", model_dir, e))?;
    let context = DiagnosisContext::reference(Arc::new(classifier))?;

    let history = config.record_history().then(|| Arc::clone(storage));
    Ok(DiagnosisService::new(Arc::new(context), history))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_profile(profile: &DiseaseProfile) {
    if let Some(description) = &profile.description {
        println!("\nDescription: {description}");
    }
    for (title, items) in [
        ("Symptoms", &profile.symptoms),
        ("Precautions", &profile.precautions),
        ("Medications", &profile.medications),
        ("Diets", &profile.diets),
        ("Workouts", &profile.workouts),
    ] {
        if items.is_empty() {
            continue;
        }
        println!("\n{title}:");
        for (i, item) in items.iter().enumerate() {
            println!("  {}. {item}", i + 1);
        }
    }
}

fn cmd_diagnose(config: &AppConfig, symptoms: Vec<String>) -> Result<()> {
    let storage = open_storage(config)?;
    let service = diagnosis_service(config, &storage)?;
    let outcome = service.diagnose(symptoms.as_slice())?;
    print_json(&outcome)
}

/// Read one symptom per line until `done` or end of input.
fn collect_symptoms<R: BufRead>(input: R) -> Result<Vec<String>> {
    let mut symptoms = Vec::new();
    for line in input.lines() {
        let symptom = line?.trim().to_lowercase();
        if symptom == "done" {
            break;
        }
        if !symptom.is_empty() {
            symptoms.push(symptom);
        }
        print!("> ");
        std::io::stdout().flush()?;
    }
    Ok(symptoms)
}

fn cmd_interactive(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config)?;
    let service = diagnosis_service(config, &storage)?;
    let recommendations = RecommendationService::new(Arc::clone(&storage));

    println!("Enter your symptoms one at a time. Type 'done' when finished.");
    print!("> ");
    std::io::stdout().flush()?;
    let symptoms = collect_symptoms(std::io::stdin().lock())?;

    let outcome = service.diagnose(symptoms.as_slice())?;
    if !outcome.unrecognized.is_empty() {
        println!("\nNot recognized: {}", outcome.unrecognized.join(", "));
    }
    println!(
        "\nPredicted Disease: {}",
        outcome.prediction.disease.trim_end()
    );

    match recommendations.profile_for(&outcome.prediction.disease)? {
        Some(profile) => print_profile(&profile),
        None => println!("\nNo reference information stored for this disease."),
    }
    Ok(())
}

fn cmd_info(config: &AppConfig, disease: &str) -> Result<()> {
    let storage = open_storage(config)?;
    let recommendations = RecommendationService::new(storage);
    let profile = recommendations
        .profile_for(disease)?
        .ok_or_else(|| anyhow!("No reference information stored for {disease:?}"))?;
    print_json(&profile)
}

fn cmd_import_reference(config: &AppConfig, path: &Path) -> Result<()> {
    let storage = open_storage(config)?;
    let recommendations = RecommendationService::new(storage);

    let profiles = RecommendationService::<SqliteStorage>::load_profiles_json(path)
        .with_context(|| format!("Failed to read profiles from {path:?}"))?;
    let count = recommendations.import_profiles(profiles)?;

    let unmatched = recommendations.unmatched_profiles(&DiseaseCodeTable::reference())?;
    if !unmatched.is_empty() {
        tracing::warn!(
            "{} stored profile(s) match no disease name: {}",
            unmatched.len(),
            unmatched.join(", ")
        );
    }

    println!("Imported {count} disease profile(s) into {:?}", config.db_path());
    Ok(())
}

/// What a `history` invocation did.
#[derive(Debug)]
enum HistoryReport {
    Listed(Vec<Diagnosis>),
    Deleted(String),
    Cleared(usize),
}

fn run_history<S: Storage>(storage: &S, args: &HistoryArgs) -> Result<HistoryReport> {
    if let Some(id) = &args.delete {
        storage.delete_diagnosis(id)?;
        return Ok(HistoryReport::Deleted(id.clone()));
    }
    if args.clear {
        let removed = storage.count_diagnoses()?;
        storage.clear_history()?;
        return Ok(HistoryReport::Cleared(removed));
    }
    let limit = args.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(HistoryReport::Listed(storage.load_recent_diagnoses(limit)?))
}

fn cmd_history(config: &AppConfig, args: &HistoryArgs) -> Result<()> {
    let storage = open_storage(config)?;
    match run_history(storage.as_ref(), args)? {
        HistoryReport::Listed(diagnoses) => print_json(&diagnoses)?,
        HistoryReport::Deleted(id) => println!("Deleted diagnosis {id}"),
        HistoryReport::Cleared(n) => println!("Cleared {n} diagnosis record(s)"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Diagnose { symptoms } => cmd_diagnose(&config, symptoms),
        Commands::Interactive => cmd_interactive(&config),
        Commands::Info { disease } => cmd_info(&config, &disease),
        Commands::ImportReference { path } => cmd_import_reference(&config, &path),
        Commands::History(args) => cmd_history(&config, &args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_symptoms_stops_at_done() {
        let input = b"  Itching\nSKIN_RASH \n\ndone\ncough\n";
        let symptoms = collect_symptoms(&input[..]).expect("Should read");
        assert_eq!(symptoms, vec!["itching", "skin_rash"]);
    }

    #[test]
    fn test_collect_symptoms_until_eof() {
        let symptoms = collect_symptoms(&b"cough\n"[..]).expect("Should read");
        assert_eq!(symptoms, vec!["cough"]);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["medrec", "diagnose", "itching", "skin_rash"])
            .expect("Should parse");
        assert!(matches!(
            cli.command,
            Commands::Diagnose { ref symptoms } if symptoms == &["itching", "skin_rash"]
        ));

        let cli = Cli::try_parse_from(["medrec", "diagnose"]).expect("Should parse");
        assert!(matches!(cli.command, Commands::Diagnose { ref symptoms } if symptoms.is_empty()));

        let cli = Cli::try_parse_from(["medrec", "import-reference", "profiles.json"])
            .expect("Should parse");
        assert!(matches!(cli.command, Commands::ImportReference { .. }));

        assert!(Cli::try_parse_from(["medrec", "info"]).is_err());
        assert!(Cli::try_parse_from(["medrec", "unknown"]).is_err());
    }

    #[test]
    fn test_parse_history_args() {
        let parse = |args: &[&str]| {
            Cli::try_parse_from(args).map(|cli| match cli.command {
                Commands::History(h) => h,
                _ => panic!("expected history"),
            })
        };

        assert_eq!(
            parse(&["medrec", "history", "5"]).expect("Should parse").limit,
            Some(5)
        );
        assert!(parse(&["medrec", "history", "--clear"]).expect("Should parse").clear);
        assert!(parse(&["medrec", "history", "-3"]).is_err());
        assert!(parse(&["medrec", "history", "5", "--clear"]).is_err());
        assert!(parse(&["medrec", "history", "--delete", "abc", "--clear"]).is_err());
    }

    fn record(storage: &SqliteStorage, disease: &str) -> String {
        let outcome = medrec::DiagnosisOutcome {
            prediction: medrec::Prediction {
                disease: disease.into(),
                class_index: medrec::domain::ClassIndex(1),
            },
            unrecognized: Vec::new(),
        };
        let diagnosis = Diagnosis::new(vec!["itching".into()], &outcome);
        storage.save_diagnosis(&diagnosis).expect("Should save");
        diagnosis.id
    }

    fn history(limit: Option<usize>, delete: Option<&str>, clear: bool) -> HistoryArgs {
        HistoryArgs {
            limit,
            delete: delete.map(String::from),
            clear,
        }
    }

    #[test]
    fn test_history_list_delete_clear() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        let first = record(&storage, "Malaria");
        record(&storage, "Allergy");
        record(&storage, "Jaundice");

        match run_history(&storage, &history(Some(2), None, false)).expect("Should list") {
            HistoryReport::Listed(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {other:?}"),
        }

        match run_history(&storage, &history(None, Some(&first), false)).expect("Should delete") {
            HistoryReport::Deleted(id) => assert_eq!(id, first),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(storage.count_diagnoses().expect("Should count"), 2);
        assert!(run_history(&storage, &history(None, Some(&first), false)).is_err());

        match run_history(&storage, &history(None, None, true)).expect("Should clear") {
            HistoryReport::Cleared(n) => assert_eq!(n, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(storage.count_diagnoses().expect("Should count"), 0);
    }

    #[test]
    fn test_history_rejects_huge_limit() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        assert!(run_history(&storage, &history(Some(usize::MAX), None, false)).is_err());
    }
}
