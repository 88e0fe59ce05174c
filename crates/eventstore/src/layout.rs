//! Partition path derivation.
//!
//! Hive-style partitioning:
//!
//! ```text
//! organization_id={org}/project_id={proj}/event_type={type}/dt={YYYY-MM-DD}/{ulid}.parquet
//! ```
//!
//! Id components are percent-encoded so the mapping from partition tuple
//! to path is injective: no two distinct tuples share a prefix, and ids
//! containing `/` or `=` cannot forge partition boundaries. The scheme is
//! stable; older data stays addressable.

use chrono::NaiveDate;
use object_store::path::Path;
use ulid::Ulid;

use pipeline_core::{EventRecord, EventType};

/// File extension for columnar blocks.
pub const BLOCK_EXT: &str = "parquet";

/// Name prefix for in-flight compaction output, excluded from listings.
pub const TMP_PREFIX: &str = ".tmp-";

/// Logical partition identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub organization_id: String,
    pub project_id: String,
    pub event_type: EventType,
    pub date: NaiveDate,
}

impl PartitionKey {
    /// Derive the partition an event belongs to.
    pub fn from_event(event: &EventRecord) -> Self {
        Self {
            organization_id: event.organization_id.clone(),
            project_id: event.project_id.clone(),
            event_type: event.event_type,
            date: event.partition_date(),
        }
    }

    /// The partition directory prefix.
    pub fn prefix(&self) -> Path {
        Path::from(format!(
            "organization_id={}/project_id={}/event_type={}/dt={}",
            urlencoding::encode(&self.organization_id),
            urlencoding::encode(&self.project_id),
            self.event_type.as_str(),
            self.date.format("%Y-%m-%d"),
        ))
    }

    /// A fresh collision-free block file name.
    pub fn new_block_name() -> String {
        format!("{}.{}", Ulid::new(), BLOCK_EXT)
    }

    /// Full path for a named block in this partition.
    pub fn block_path(&self, name: &str) -> Path {
        self.prefix().child(name)
    }

    /// Temporary path for a block being compacted.
    pub fn tmp_block_path(&self, name: &str) -> Path {
        self.prefix().child(format!("{}{}", TMP_PREFIX, name))
    }

    /// Parse a block location back into its partition key and file name.
    ///
    /// Returns None for paths that do not follow the layout (foreign
    /// files in the store are left alone rather than misfiled).
    pub fn parse_block_path(location: &Path) -> Option<(Self, String)> {
        let parts: Vec<&str> = location.as_ref().split('/').collect();
        if parts.len() != 5 {
            return None;
        }

        let organization_id = decode_segment(parts[0], "organization_id")?;
        let project_id = decode_segment(parts[1], "project_id")?;
        let event_type = EventType::parse(&decode_segment(parts[2], "event_type")?)?;
        let date_str = decode_segment(parts[3], "dt")?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").ok()?;

        let file_name = parts[4].to_string();
        if file_name.is_empty() {
            return None;
        }

        Some((
            Self {
                organization_id,
                project_id,
                event_type,
                date,
            },
            file_name,
        ))
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

fn decode_segment(segment: &str, expected_key: &str) -> Option<String> {
    let (key, value) = segment.split_once('=')?;
    if key != expected_key {
        return None;
    }
    urlencoding::decode(value).ok().map(|v| v.into_owned())
}

/// Whether a file name is an in-flight temporary block.
pub fn is_tmp_block(file_name: &str) -> bool {
    file_name.starts_with(TMP_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PartitionKey {
        PartitionKey {
            organization_id: "org-42".into(),
            project_id: "proj-7".into(),
            event_type: EventType::Error,
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        }
    }

    #[test]
    fn test_prefix_format() {
        assert_eq!(
            key().prefix().as_ref(),
            "organization_id=org-42/project_id=proj-7/event_type=error/dt=2024-03-15"
        );
    }

    #[test]
    fn test_block_path_round_trip() {
        let key = key();
        let name = PartitionKey::new_block_name();
        let path = key.block_path(&name);

        let (parsed, file_name) = PartitionKey::parse_block_path(&path).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(file_name, name);
    }

    #[test]
    fn test_hostile_ids_cannot_forge_partitions() {
        let mut tricky = key();
        tricky.organization_id = "a/project_id=b".into();

        let path = tricky.block_path("x.parquet");
        let (parsed, _) = PartitionKey::parse_block_path(&path).unwrap();
        // The slash is encoded, so the round trip preserves the raw id.
        assert_eq!(parsed.organization_id, "a/project_id=b");
        assert_eq!(parsed, tricky);
    }

    #[test]
    fn test_distinct_tuples_distinct_prefixes() {
        let a = key();
        let mut b = key();
        b.event_type = EventType::Crash;
        let mut c = key();
        c.date = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();

        assert_ne!(a.prefix(), b.prefix());
        assert_ne!(a.prefix(), c.prefix());
    }

    #[test]
    fn test_parse_rejects_foreign_paths() {
        assert!(PartitionKey::parse_block_path(&Path::from("random/file.txt")).is_none());
        assert!(PartitionKey::parse_block_path(&Path::from(
            "organization_id=a/project_id=b/event_type=pageview/dt=2024-01-01/x.parquet"
        ))
        .is_none());
        assert!(PartitionKey::parse_block_path(&Path::from(
            "organization_id=a/project_id=b/event_type=error/dt=not-a-date/x.parquet"
        ))
        .is_none());
    }

    #[test]
    fn test_tmp_names() {
        let key = key();
        let name = PartitionKey::new_block_name();
        let tmp = key.tmp_block_path(&name);
        let file = tmp.as_ref().rsplit('/').next().unwrap();
        assert!(is_tmp_block(file));
        assert!(!is_tmp_block(&name));
    }

    #[test]
    fn test_from_event() {
        let mut event = EventRecord::new(EventType::Log, "org-9", "proj-3");
        event.received_at = "2024-07-01T08:30:00Z".parse().unwrap();

        let key = PartitionKey::from_event(&event);
        assert_eq!(key.organization_id, "org-9");
        assert_eq!(key.event_type, EventType::Log);
        assert_eq!(key.date.to_string(), "2024-07-01");
    }
}
