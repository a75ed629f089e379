mod cli;
mod commands;
mod error;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use commands::queue::MakeQueueArgs;
use conflux_stack::StackOptions;
use error::exit_with_error;

fn init_tracing(cli: &Cli) {
    // -v flags win over RUST_LOG; without them RUST_LOG is honoured and
    // only warnings are shown by default.
    let filter = match cli.verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into()),
        1 => "info".into(),
        2 => "debug".into(),
        _ => "trace".into(),
    };

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        exit_with_error(e);
    }
}

async fn run(cli: Cli) -> error::CliResult<()> {
    let endpoint = cli.sqs_endpoint.as_deref();

    match cli.command {
        Commands::MakeQueue {
            name,
            visibility_timeout,
            retention_days,
            max_receive_count,
        } => {
            let args = MakeQueueArgs {
                visibility_timeout: Duration::from_secs(visibility_timeout),
                retention_period: Duration::from_secs(retention_days * 24 * 3600),
                max_receive_count,
            };
            commands::queue::make(endpoint, &name, args).await
        }

        Commands::DeleteQueue {
            name,
            keep_dead_letter,
        } => commands::queue::delete(endpoint, &name, keep_dead_letter).await,

        Commands::PushToQueue {
            txt,
            queue,
            retries,
        } => commands::queue::push(endpoint, &queue, &txt, retries).await,

        Commands::Stack {
            input,
            pattern,
            output,
            keep_duplicates,
            invalid_field,
        } => {
            let options = StackOptions {
                invalid_field,
                remove_duplicates: !keep_duplicates,
            };
            commands::stack::from_artifacts(&input, &pattern, &output, &options).await
        }

        Commands::DbToCsv {
            db,
            output,
            workers,
            keep_duplicates,
        } => {
            let options = StackOptions {
                remove_duplicates: !keep_duplicates,
                ..StackOptions::default()
            };
            commands::stack::from_database(&db, &output, workers, &options).await
        }
    }
}
