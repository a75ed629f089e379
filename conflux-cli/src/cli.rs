use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conflux", about = "Polygon drill queue and stacking tools", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// SQS endpoint override, e.g. a LocalStack URL
    #[arg(long, global = true, env = "CONFLUX_SQS_ENDPOINT")]
    pub sqs_endpoint: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a queue and its dead-letter queue
    MakeQueue {
        /// Queue name
        name: String,

        /// Seconds a received message stays hidden
        #[arg(long, default_value_t = 18 * 60)]
        visibility_timeout: u64,

        /// Days a message is retained
        #[arg(long, default_value_t = 7)]
        retention_days: u64,

        /// Receives before a message is moved to the dead-letter queue
        #[arg(long, default_value_t = 5)]
        max_receive_count: u32,
    },

    /// Delete a queue and its dead-letter queue
    DeleteQueue {
        /// Queue name
        name: String,

        /// Leave the dead-letter queue in place
        #[arg(long)]
        keep_dead_letter: bool,
    },

    /// Push scene ids from a text file, one per line
    PushToQueue {
        /// File of scene ids
        #[arg(long, short = 't')]
        txt: PathBuf,

        /// Queue name
        #[arg(long, short = 'q', env = "CONFLUX_QUEUE")]
        queue: String,

        /// Attempts per batch before giving up
        #[arg(long, default_value_t = 3)]
        retries: u32,
    },

    /// Stack drill artifacts into one CSV per polygon
    Stack {
        /// Root the drill artifacts were written under
        #[arg(long, short = 'i', env = "CONFLUX_OUTPUT")]
        input: String,

        /// Regex matched against artifact file names
        #[arg(long, short = 'p', default_value = ".*")]
        pattern: String,

        /// Root of the CSV tree
        #[arg(long, short = 'o')]
        output: String,

        /// Keep every observation instead of one per day
        #[arg(long)]
        keep_duplicates: bool,

        /// Column ranking same-day observations
        #[arg(long, default_value = "pc_invalid")]
        invalid_field: String,
    },

    /// Export the observation database to one CSV per polygon
    DbToCsv {
        /// SQLite database file
        #[arg(long, env = "CONFLUX_DB")]
        db: PathBuf,

        /// Root of the CSV tree
        #[arg(long, short = 'o')]
        output: String,

        /// Concurrent export tasks
        #[arg(long, short = 'j', default_value_t = 4)]
        workers: usize,

        /// Keep every observation instead of one per day
        #[arg(long)]
        keep_duplicates: bool,
    },
}
