use std::io::Write;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use seekify::Result;
use seekify::config::{Config, show_config};
use seekify::embeddings::OllamaClient;
use seekify::generation::AnswerStream;
use seekify::pipeline::Pipeline;
use tracing::info;

#[derive(Parser)]
#[command(name = "seekify")]
#[command(about = "Answer questions from fresh web results with a local language model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question and stream the answer
    Ask {
        /// The question to answer
        question: String,
        /// Search the web and answer from the pages found
        #[arg(long)]
        web: bool,
        /// Ask the model directly, without retrieved context
        #[arg(long, conflicts_with = "web")]
        ungrounded: bool,
    },
    /// Show or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Write a configuration file with default settings
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
    /// Remove everything from the vector index
    Clear,
    /// Check the Ollama server, the configured models and the index
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(Config::config_dir()?)?;

    match cli.command {
        Commands::Ask {
            question,
            web,
            ungrounded,
        } => {
            let mut pipeline = Pipeline::from_config(&config).await?;
            let answer = if ungrounded {
                pipeline.answer_ungrounded(&question)?
            } else {
                pipeline.answer(&question, web).await?
            };
            print_answer(answer).await?;
        }
        Commands::Config { show, init } => {
            if init {
                config.save()?;
                println!("Wrote {}", config.config_file_path().display());
            } else {
                if !show && !config.config_file_path().exists() {
                    println!("No configuration file yet, showing defaults (use --init to write one)");
                }
                show_config(&config)?;
            }
        }
        Commands::Clear => {
            let mut pipeline = Pipeline::from_config(&config).await?;
            pipeline.clear().await?;
            println!("Cleared collection '{}'", config.index.collection);
        }
        Commands::Status => {
            show_status(&config).await?;
        }
    }

    Ok(())
}

/// Write fragments to stdout as they arrive
async fn print_answer(mut answer: AnswerStream) -> Result<()> {
    let mut stdout = std::io::stdout();
    while let Some(fragment) = answer.next().await {
        match fragment {
            Ok(text) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            Err(e) => {
                writeln!(stdout)?;
                return Err(e);
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}

async fn show_status(config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.ollama)?;
    let models = [
        config.ollama.embedding_model.clone(),
        config.ollama.chat_model.clone(),
    ];

    let health = tokio::task::spawn_blocking(move || {
        let models: Vec<&str> = models.iter().map(String::as_str).collect();
        client.health_check(&models)
    })
    .await
    .map_err(|e| anyhow::anyhow!("health check task failed: {}", e))?;

    match health {
        Ok(()) => println!("Ollama: ok ({})", config.ollama.ollama_url()?),
        Err(e) => println!("Ollama: unavailable ({:#})", e),
    }

    let pipeline = Pipeline::from_config(config).await?;
    let count = pipeline.index().count().await?;
    info!("Index at {}", config.vector_database_path().display());
    println!(
        "Index: {} chunks in collection '{}'",
        count, config.index.collection
    );

    Ok(())
}
