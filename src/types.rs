//! Core data types shared across the shipping pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Durable byte offset in a file past which no record is at risk of being
/// re-sent after a restart.
///
/// `position` is the offset after a line's terminator; seeking to it reads
/// the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighWaterMark {
    pub path: PathBuf,
    pub position: u64,
}

impl HighWaterMark {
    pub fn new(path: impl Into<PathBuf>, position: u64) -> Self {
        Self {
            path: path.into(),
            position,
        }
    }
}

/// A single log line, rendered as key/value fields, tagged with the high
/// water mark a successful delivery allows us to checkpoint.
///
/// `fields` always contains `line` (the terminator-stripped line) and
/// `host`, plus whatever static fields the input group configures.
#[derive(Debug, Clone)]
pub struct Record {
    pub fields: HashMap<String, String>,
    pub mark: HighWaterMark,
}

impl Record {
    /// Build a record for one line of a file.
    pub fn from_line(
        line: &str,
        path: &Path,
        position: u64,
        hostname: &str,
        extra_fields: &HashMap<String, String>,
    ) -> Self {
        let mut fields = HashMap::with_capacity(extra_fields.len() + 2);
        for (k, v) in extra_fields {
            fields.insert(k.clone(), v.clone());
        }
        fields.insert("line".to_string(), line.to_string());
        fields.insert("host".to_string(), hostname.to_string());

        Self {
            fields,
            mark: HighWaterMark::new(path, position),
        }
    }
}

/// A reader's unit of hand-off to the dispatcher: an ordered run of records
/// from a single file. A chunk is never split across batches.
pub type Chunk = Vec<Record>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_merges_static_fields() {
        let mut extra = HashMap::new();
        extra.insert("field1".to_string(), "value1".to_string());

        let record = Record::from_line("line1", Path::new("/var/log/app.log"), 6, "web-1", &extra);

        assert_eq!(record.fields["line"], "line1");
        assert_eq!(record.fields["host"], "web-1");
        assert_eq!(record.fields["field1"], "value1");
        assert_eq!(record.mark.position, 6);
        assert_eq!(record.mark.path, Path::new("/var/log/app.log"));
    }

    #[test]
    fn line_and_host_override_static_fields() {
        let mut extra = HashMap::new();
        extra.insert("line".to_string(), "shadowed".to_string());

        let record = Record::from_line("actual", Path::new("/tmp/a.log"), 7, "web-1", &extra);
        assert_eq!(record.fields["line"], "actual");
    }
}
