//! Queue administration. Needs the `aws` feature.

use std::path::Path;
use std::time::Duration;

use crate::error::{CliError, CliResult};

/// Settings for `make-queue`.
pub struct MakeQueueArgs {
    pub visibility_timeout: Duration,
    pub retention_period: Duration,
    pub max_receive_count: u32,
}

/// Read non-blank ids from a text file, one per line.
pub async fn read_ids(path: &Path) -> CliResult<Vec<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::Input(format!("cannot read {}: {e}", path.display())))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(feature = "aws")]
async fn connect(endpoint: Option<&str>) -> CliResult<aws_sdk_sqs::Client> {
    use conflux_worker::SqsConfig;

    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let config = SqsConfig {
        endpoint: endpoint.map(str::to_string),
        ..SqsConfig::default()
    };
    Ok(conflux_worker::sqs::client(&sdk_config, &config)?)
}

#[cfg(feature = "aws")]
pub async fn make(endpoint: Option<&str>, name: &str, args: MakeQueueArgs) -> CliResult<()> {
    use conflux_worker::{QueueSettings, SqsQueue};

    let settings = QueueSettings {
        visibility_timeout: args.visibility_timeout,
        retention_period: args.retention_period,
        max_receive_count: args.max_receive_count,
    };
    let queue = SqsQueue::create_with_dead_letter(connect(endpoint).await?, name, &settings).await?;
    println!("{}", queue.url());
    Ok(())
}

#[cfg(feature = "aws")]
pub async fn delete(endpoint: Option<&str>, name: &str, keep_dead_letter: bool) -> CliResult<()> {
    use conflux_worker::SqsQueue;

    let queue = SqsQueue::open(connect(endpoint).await?, name).await?;
    let dead_letter = if keep_dead_letter {
        None
    } else {
        Some(queue.open_dead_letter().await?)
    };
    queue.delete().await?;
    if let Some(dlq) = dead_letter {
        dlq.delete().await?;
    }
    Ok(())
}

#[cfg(feature = "aws")]
pub async fn push(endpoint: Option<&str>, name: &str, path: &Path, retries: u32) -> CliResult<()> {
    use conflux_worker::{push_ids, SqsQueue};

    let ids = read_ids(path).await?;
    let queue = SqsQueue::open(connect(endpoint).await?, name).await?;
    let sent = push_ids(&queue, &ids, retries).await?;
    println!("pushed {sent} ids to {name}");
    Ok(())
}

#[cfg(not(feature = "aws"))]
fn unavailable() -> CliError {
    CliError::Usage("queue commands need a build with the `aws` feature".to_string())
}

#[cfg(not(feature = "aws"))]
pub async fn make(_endpoint: Option<&str>, _name: &str, _args: MakeQueueArgs) -> CliResult<()> {
    Err(unavailable())
}

#[cfg(not(feature = "aws"))]
pub async fn delete(_endpoint: Option<&str>, _name: &str, _keep: bool) -> CliResult<()> {
    Err(unavailable())
}

#[cfg(not(feature = "aws"))]
pub async fn push(_endpoint: Option<&str>, _name: &str, path: &Path, _retries: u32) -> CliResult<()> {
    read_ids(path).await?;
    Err(unavailable())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_ids_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "a1\n\n  b2  \n\t\nc3").unwrap();
        assert_eq!(read_ids(&path).await.unwrap(), vec!["a1", "b2", "c3"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_input_error() {
        let err = read_ids(Path::new("/no/such/ids.txt")).await.unwrap_err();
        assert!(matches!(err, CliError::Input(_)));
    }
}
