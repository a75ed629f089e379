use std::path::Path;

use conflux_stack::{stack_from_store, ObservationDb, StackOptions};
use conflux_storage::{open_store, OutputStore};

use crate::error::{CliError, CliResult};

pub async fn from_artifacts(
    input: &str,
    pattern: &str,
    output: &str,
    options: &StackOptions,
) -> CliResult<()> {
    let source = OutputStore::new(open_store(input).await?, input);
    let target = open_store(output).await?;
    let written = stack_from_store(&source, pattern, target.as_ref(), output, options).await?;
    println!("wrote {} series under {output}", written.len());
    Ok(())
}

pub async fn from_database(
    db: &Path,
    output: &str,
    workers: usize,
    options: &StackOptions,
) -> CliResult<()> {
    if !db.exists() {
        return Err(CliError::Input(format!("no database at {}", db.display())));
    }
    if workers == 0 {
        return Err(CliError::Usage("--workers must be at least 1".to_string()));
    }
    let db = ObservationDb::open(db, workers).await?;
    let target = open_store(output).await?;
    let written = db.export_csv(target, output, workers, options).await?;
    println!("wrote {written} series under {output}");
    Ok(())
}
