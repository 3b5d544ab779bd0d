//! Prepwise CLI entry point.
//!
//! Commands:
//! - `init`: Write the default config, optionally seed tier settings
//! - `resolve`: Show the effective model configuration for a task
//! - `pricing`: List model prices, estimate a call, or summarize usage
//! - `quota`: Show a user's crawl quota
//! - `generate`: Generate a learning activity, streaming partial results
//! - `ask`: Answer a question with tool orchestration

use clap::{Parser, Subcommand};
use prepwise_core::activity::ActivityKind;
use prepwise_core::plan::Plan;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod app;
mod commands;

use app::{App, load_config};

#[derive(Parser)]
#[command(
    name = "prepwise",
    about = "Prepwise: tier-routed LLM generation for learning and interview prep",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file to use instead of ~/.prepwise/config.toml
    #[arg(long, global = true, env = "PREPWISE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init {
        /// Also write the configured tier seeds to the settings store
        #[arg(long)]
        seed: bool,
    },

    /// Show which provider and model a task resolves to
    Resolve {
        #[arg(long)]
        task: String,

        /// Caller plan (free, pro, max)
        #[arg(long)]
        plan: Option<Plan>,

        /// Model the caller picked in the UI
        #[arg(long)]
        selected_model: Option<String>,
    },

    /// List model pricing or estimate the cost of a call
    Pricing {
        #[arg(long)]
        model: Option<String>,

        #[arg(long, default_value_t = 1000)]
        input: u32,

        #[arg(long, default_value_t = 1000)]
        output: u32,

        /// Summarize logged usage instead
        #[arg(long)]
        usage: bool,

        /// Log entries to include in the usage summary
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },

    /// Show a user's crawl quota for the current period
    Quota {
        #[arg(long)]
        user: String,

        #[arg(long)]
        plan: Plan,
    },

    /// Generate a learning activity
    Generate {
        /// Activity kind (mcq, flashcards, coding_challenge, system_design, concept_explanation)
        #[arg(long)]
        activity: ActivityKind,

        #[arg(long)]
        topic: String,

        /// Route as this task instead of the activity's own
        #[arg(long)]
        task: Option<String>,

        #[arg(long, default_value = "cli")]
        user: String,

        #[arg(long, default_value = "pro")]
        plan: Plan,

        /// Wait for the whole activity instead of streaming
        #[arg(long)]
        no_stream: bool,
    },

    /// Ask a question; the model may call tools
    Ask {
        #[arg(long, default_value = "generate_topics")]
        task: String,

        #[arg(long)]
        prompt: String,

        #[arg(long, default_value = "cli")]
        user: String,

        #[arg(long, default_value = "pro")]
        plan: Plan,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if let Commands::Init { seed } = cli.command {
        return commands::init::run(cli.config.as_deref(), seed).await;
    }

    let config = load_config(cli.config.as_ref())?;
    let app = App::build(config).await?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Resolve {
            task,
            plan,
            selected_model,
        } => commands::resolve::run(&app, &task, plan, selected_model).await?,
        Commands::Pricing {
            model,
            input,
            output,
            usage,
            limit,
        } => {
            if usage {
                commands::pricing::usage(&app, limit).await?
            } else if let Some(model) = model {
                commands::pricing::estimate(&app, &model, input, output).await?
            } else {
                commands::pricing::list(&app).await?
            }
        }
        Commands::Quota { user, plan } => commands::quota::run(&app, &user, plan).await?,
        Commands::Generate {
            activity,
            topic,
            task,
            user,
            plan,
            no_stream,
        } => {
            commands::generate::run(
                &app,
                commands::generate::GenerateArgs {
                    kind: activity,
                    topic,
                    task,
                    user_id: user,
                    plan,
                    stream: !no_stream,
                },
            )
            .await?
        }
        Commands::Ask {
            task,
            prompt,
            user,
            plan,
        } => commands::ask::run(&app, &task, &prompt, &user, plan).await?,
    }

    Ok(())
}
