//! elenchus CLI - run mystery-shopper evaluations from the command line

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use elenchus_core::config::RunConfig;
use elenchus_core::scenario::Scenario;

#[derive(Parser)]
#[command(name = "elenchus")]
#[command(about = "SHIP mystery-shopper evaluation harness for AI Medicare guidance", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an evaluation trial
    Run {
        /// Path to the scenario JSON file
        #[arg(long)]
        scenario: PathBuf,

        /// Target model specification (e.g. 'fake:perfect', 'openrouter:openai/gpt-4-turbo')
        #[arg(long)]
        target: String,

        /// Model for the evaluation agents (default: the offline mock agent)
        #[arg(long, default_value = "mock:agent")]
        agent_model: String,

        /// Number of independent verifiers
        #[arg(long, default_value_t = 2)]
        judges: usize,

        /// Seed for seed-capable providers
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output directory for run artifacts
        #[arg(long, default_value = "runs")]
        output_dir: PathBuf,

        /// Custom run id (default: UTC timestamp)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Validate a scenario file without running it
    Validate {
        /// Path to the scenario JSON file
        scenario: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            scenario,
            target,
            agent_model,
            judges,
            seed,
            output_dir,
            run_id,
        } => {
            let mut config = RunConfig::new(scenario, target);
            config.agent_model = agent_model;
            config.judges = judges;
            config.seed = seed;
            config.output_dir = output_dir;
            config.run_id = run_id;
            run_evaluation(&config).await
        }
        Commands::Validate { scenario } => validate_scenario(&scenario),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_evaluation(config: &RunConfig) -> Result<()> {
    let outcome = elenchus_core::orchestrator::run(config).await?;
    let trial = &outcome.trial;

    println!("\n{}", "=".repeat(70));
    println!("EVALUATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("Trial ID:          {}", trial.trial_id);
    println!("Scenario:          {}", trial.scenario_id);
    println!(
        "Target Model:      {}",
        trial.target.model_version.as_deref().unwrap_or(&trial.target.model_name)
    );

    match (&trial.final_scores, &trial.error) {
        (Some(scores), _) => {
            if let (Some(score), Some(label)) = (scores.rubric_score, &scores.rubric_label) {
                println!("Classification:    {label} (Score {score})");
            }
            println!(
                "Completeness:      {:.1}%",
                scores.completeness_percentage * 100.0
            );
            println!(
                "Accuracy:          {:.1}%",
                scores.accuracy_percentage * 100.0
            );
            println!("Claims Extracted:  {}", trial.claims.len());
            println!("Verifiers:         {}", trial.verifications.len());
            println!("Flags:");
            println!("  - Refusal:       {}", trial.flags.refusal);
            println!("  - Hallucinated:  {}", trial.flags.hallucinated_specifics);
            println!(
                "  - References:    {}",
                trial.flags.referenced_external_resources
            );
            println!("\nJustification:\n  {}", scores.justification);
        }
        (None, Some(error)) => {
            println!("Status:            ABORTED");
            println!("Error:             {error}");
            println!(
                "Artifacts:         {}",
                outcome.run_dir.display()
            );
        }
        (None, None) => {}
    }
    println!("{}\n", "=".repeat(70));

    // Aborted trials are persisted and do not fail the process; only
    // startup validation errors exit non-zero.
    Ok(())
}

fn validate_scenario(path: &PathBuf) -> Result<()> {
    let scenario = Scenario::load(path)?;
    scenario.validate()?;

    let facts = scenario
        .answer_key
        .as_ref()
        .map(|k| k.canonical_facts.len())
        .unwrap_or(0);
    println!(
        "OK: {} ({} turns, {} canonical facts, rubric: {})",
        scenario.scenario_id,
        scenario.scripted_turns.len(),
        facts,
        if scenario.scoring_rubric.is_some() { "yes" } else { "no" },
    );
    Ok(())
}
