//! Artifact path layout.
//!
//! One artifact per `(drill, scene, date)`:
//! `<root>/<YYYYMMDD>/<drill>_<scene>_<YYYYMMDD-HHMMSS-ffffff>.pq`.

use chrono::{DateTime, Utc};
use conflux_core::table::{format_date, parse_date};

/// Extension of written tables.
pub const ARTIFACT_EXTENSION: &str = "pq";

/// Extensions recognised when searching for tables.
pub const TABLE_EXTENSIONS: [&str; 2] = ["pq", "parquet"];

/// Join a root and a relative path with exactly one `/`.
pub fn join(root: &str, rel: &str) -> String {
    if root.is_empty() {
        return rel.trim_start_matches('/').to_string();
    }
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        rel.trim_start_matches('/')
    )
}

/// Path of the artifact for one drill of one scene.
pub fn artifact_path(root: &str, drill: &str, scene_id: &str, date: &DateTime<Utc>) -> String {
    let day = date.format("%Y%m%d");
    let name = format!(
        "{drill}_{scene_id}_{}.{ARTIFACT_EXTENSION}",
        format_date(date)
    );
    join(root, &format!("{day}/{name}"))
}

/// Final component of a `/`-separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn is_table_file(path: &str) -> bool {
    file_name(path)
        .rsplit_once('.')
        .is_some_and(|(_, ext)| TABLE_EXTENSIONS.contains(&ext))
}

/// Parts of an artifact file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub drill: String,
    pub scene_id: String,
    pub date: DateTime<Utc>,
}

/// Split `<drill>_<scene>_<date>.<ext>` back into its parts.
///
/// Parsed from the right, so drill names may contain underscores; scene ids
/// may not.
pub fn parse_artifact_name(path: &str) -> Option<ArtifactName> {
    let (stem, _) = file_name(path).rsplit_once('.')?;
    let (rest, date) = stem.rsplit_once('_')?;
    let (drill, scene_id) = rest.rsplit_once('_')?;
    if drill.is_empty() || scene_id.is_empty() {
        return None;
    }
    Some(ArtifactName {
        drill: drill.to_string(),
        scene_id: scene_id.to_string(),
        date: parse_date(date).ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::microseconds(67)
    }

    #[test]
    fn test_artifact_path_layout() {
        let path = artifact_path("s3://bucket/out/", "waterbodies", "abc-123", &date());
        assert_eq!(
            path,
            "s3://bucket/out/20200102/waterbodies_abc-123_20200102-030405-000067.pq"
        );
    }

    #[test]
    fn test_parse_artifact_name() {
        let path = artifact_path("/tmp/out", "waterbodies_c3", "abc-123", &date());
        let parsed = parse_artifact_name(&path).unwrap();
        assert_eq!(parsed.drill, "waterbodies_c3");
        assert_eq!(parsed.scene_id, "abc-123");
        assert_eq!(parsed.date, date());

        assert!(parse_artifact_name("/tmp/out/readme.txt").is_none());
    }

    #[test]
    fn test_is_table_file() {
        assert!(is_table_file("a/b/c.pq"));
        assert!(is_table_file("a/b/c.parquet"));
        assert!(!is_table_file("a/b/c.csv"));
        assert!(!is_table_file("a/b.pq/c"));
    }
}
