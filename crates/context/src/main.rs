//! ReviewLens one-shot CLI
//!
//! Answers a single question and prints the report as JSON:
//!
//! ```text
//! context [--path auto|analytic|semantic] [--trace] [--config FILE] [--channel NAME] <question...>
//! ```

use clap::Parser;
use reviewlens_common::{config::AppConfig, VERSION};
use reviewlens_context::{build_orchestrator, AnswerPath, Question};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "context")]
#[command(version = VERSION)]
#[command(about = "Answer one review-analytics question and print the report as JSON")]
struct Cli {
    /// Which pipeline answers the question
    #[arg(long, value_enum, default_value = "auto")]
    path: AnswerPath,

    /// Print the full run context alongside the report
    #[arg(long)]
    trace: bool,

    /// Config file to load instead of the layered config/ directory
    #[arg(long)]
    config: Option<String>,

    /// Channel the question arrived on
    #[arg(long)]
    channel: Option<String>,

    #[arg(required = true, num_args = 1..)]
    question: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };

    // Logs go to stderr so stdout stays valid JSON
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("ReviewLens context v{}", VERSION);

    let orchestrator = build_orchestrator(&config).await?;
    let mut question = Question::new(cli.question.join(" "))?;
    if let Some(channel) = cli.channel {
        question = question.with_channel(channel);
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let output = if cli.trace {
        let outcome = orchestrator.answer_traced(question, cli.path, cancel).await;
        serde_json::to_string_pretty(&outcome)?
    } else {
        let report = orchestrator.answer(question, cli.path, cancel).await;
        serde_json::to_string_pretty(&report)?
    };

    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_path_and_question_words() {
        let cli = Cli::try_parse_from([
            "context",
            "--path",
            "semantic",
            "--trace",
            "why",
            "do",
            "buyers",
            "return",
            "it",
        ])
        .unwrap();

        assert_eq!(cli.path, AnswerPath::Semantic);
        assert!(cli.trace);
        assert!(cli.config.is_none());
        assert_eq!(cli.question.join(" "), "why do buyers return it");
    }

    #[test]
    fn test_cli_defaults_to_auto_path() {
        let cli = Cli::try_parse_from(["context", "average", "rating"]).unwrap();
        assert_eq!(cli.path, AnswerPath::Auto);
        assert!(!cli.trace);
    }

    #[test]
    fn test_cli_rejects_unknown_path_and_missing_question() {
        assert!(Cli::try_parse_from(["context", "--path", "fuzzy", "rating"]).is_err());
        assert!(Cli::try_parse_from(["context", "--trace"]).is_err());
    }
}
