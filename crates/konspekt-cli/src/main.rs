use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use konspekt_core::{
    HttpCompletionClient, Provider, UsageSummary, generate_notes, generate_quiz_file,
};

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Default, ValueEnum)]
enum CliProvider {
    #[default]
    Grok,
    Openai,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Grok => Provider::Grok,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Parser)]
#[command(name = "konspekt")]
#[command(about = "Turn recorded lectures into enriched study notes or multiple-choice quizzes")]
struct Cli {
    /// AI provider for content generation
    #[arg(short, long, default_value = "grok")]
    provider: CliProvider,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate markdown lecture notes with diagrams from the video
    Notes {
        /// Subtitle-style transcript file
        transcript: PathBuf,

        /// Lecture video file
        video: PathBuf,

        /// Output markdown path
        #[arg(short, long, default_value = "output/lecture_notes.md")]
        output: PathBuf,
    },
    /// Generate a 10-question multiple-choice quiz
    Quiz {
        /// Subtitle-style transcript file
        transcript: PathBuf,

        /// Output JSON path
        #[arg(short, long, default_value = "output/lecture_quiz.json")]
        output: PathBuf,
    },
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn print_usage_summary(usage: &UsageSummary) {
    println!("\n{}", style("=== Token Usage Summary ===").cyan().bold());
    println!(
        "{} {}",
        style("Total Input Tokens:").dim(),
        usage.total_input_tokens
    );
    println!(
        "{} {}",
        style("Total Output Tokens:").dim(),
        usage.total_output_tokens
    );
    for (step, record) in &usage.steps {
        println!(
            "  {} {} in, {} out",
            style(format!("{step}:")).yellow(),
            record.input_tokens,
            record.output_tokens
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let provider: Provider = cli.provider.into();
    let provider_name = provider.name();

    // Validate API key early
    let client = match HttpCompletionClient::new(provider) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "\n{}  {}\n",
        style("konspekt").cyan().bold(),
        style(format!("Lecture Study Artifacts · {}", provider_name)).dim()
    );

    match cli.command {
        Command::Notes {
            transcript,
            video,
            output,
        } => {
            let spinner = create_spinner("Generating lecture notes...");
            let outcome = generate_notes(&client, &transcript, &video, &output).await?;
            spinner.finish_with_message(format!(
                "{} Notes saved: {}",
                style("✓").green().bold(),
                style(outcome.output_path.display()).cyan()
            ));

            for degradation in &outcome.degradations {
                println!(
                    "{} {}",
                    style("degraded:").yellow().bold(),
                    style(degradation).dim()
                );
            }
            print_usage_summary(&outcome.usage);
        }
        Command::Quiz { transcript, output } => {
            let spinner = create_spinner("Generating quiz...");
            let outcome = generate_quiz_file(&client, &transcript, &output).await?;
            spinner.finish_with_message(format!(
                "{} Quiz saved: {} ({} questions)",
                style("✓").green().bold(),
                style(outcome.output_path.display()).cyan(),
                outcome.quiz.questions.len()
            ));
            print_usage_summary(&outcome.usage);
        }
    }

    Ok(())
}
