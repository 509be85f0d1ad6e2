//! Persisted record schema and validation

use super::types::{FileMetadata, VersionInfo};
use crate::layout::StorageLayout;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use verfs_common::{
    Error, FileAttributes, Result, S_IFMT, S_IFREG, VersionId, VirtualPath,
};

/// On-disk form of [`FileMetadata`]
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MetadataRecord {
    filename: String,
    version_count: u64,
    attributes: RecordAttributes,
    version_list: Vec<RecordVersion>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordAttributes {
    st_mode: u32,
    st_size: u64,
    st_mtime: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordVersion {
    version_id: u64,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    timestamp: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    data_pointer: Option<String>,
}

/// Accept integer or floating-point timestamps; anything else is dropped
#[allow(clippy::cast_possible_truncation)]
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)))
}

/// Accept a string; anything else is dropped
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string))
}

impl MetadataRecord {
    /// Snapshot an in-memory record for persistence
    pub(crate) fn from_metadata(metadata: &FileMetadata) -> Self {
        let attributes = metadata.attributes();
        Self {
            filename: metadata.path().relative().to_string(),
            version_count: metadata.version_count() as u64,
            attributes: RecordAttributes {
                st_mode: attributes.mode,
                st_size: attributes.size,
                st_mtime: attributes.mtime,
            },
            version_list: metadata
                .versions()
                .iter()
                .map(|v| RecordVersion {
                    version_id: v.version_id.get(),
                    timestamp: Some(v.timestamp),
                    data_pointer: Some(v.blob_ref.to_string_lossy().into_owned()),
                })
                .collect(),
        }
    }

    /// Validate the record and build the in-memory model
    ///
    /// Every structural rule is checked here, once: the stored count must
    /// match the list, ids must run 1..=n, the type bits must describe a
    /// regular file, and an empty file must have size 0.
    pub(crate) fn into_metadata(
        self,
        path: &VirtualPath,
        layout: &StorageLayout,
    ) -> Result<FileMetadata> {
        let corrupt = |reason: String| Error::corrupt(path.as_str(), reason);

        if self.filename != path.relative() {
            return Err(corrupt(format!(
                "record names {:?}, expected {:?}",
                self.filename,
                path.relative()
            )));
        }

        if self.version_count != self.version_list.len() as u64 {
            return Err(corrupt(format!(
                "version_count is {} but version_list holds {} entries",
                self.version_count,
                self.version_list.len()
            )));
        }

        if self.attributes.st_mode & S_IFMT != S_IFREG {
            return Err(corrupt(format!(
                "st_mode {:o} is not a regular file",
                self.attributes.st_mode
            )));
        }

        if self.version_list.is_empty() && self.attributes.st_size != 0 {
            return Err(corrupt(format!(
                "st_size is {} but the file has no versions",
                self.attributes.st_size
            )));
        }

        let mut versions = Vec::with_capacity(self.version_list.len());
        for (index, entry) in self.version_list.into_iter().enumerate() {
            let version_id = VersionId::from_index(index);
            if entry.version_id != version_id.get() {
                return Err(corrupt(format!(
                    "version_list[{index}] has id {}, expected {version_id}",
                    entry.version_id
                )));
            }
            versions.push(VersionInfo {
                version_id,
                timestamp: entry.timestamp.unwrap_or(0),
                blob_ref: entry
                    .data_pointer
                    .map_or_else(|| layout.blob_path(path, version_id), PathBuf::from),
            });
        }

        let attributes = FileAttributes {
            mode: self.attributes.st_mode,
            size: self.attributes.st_size,
            mtime: self.attributes.st_mtime,
            nlink: 1,
        };
        Ok(FileMetadata::from_parts(path.clone(), attributes, versions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verfs_common::StorageConfig;

    fn layout() -> StorageLayout {
        StorageLayout::new(&StorageConfig::with_data_dir("/data"))
    }

    fn parse(json: &str) -> Result<FileMetadata> {
        let path = VirtualPath::new("/d/f").unwrap();
        let record: MetadataRecord =
            serde_json::from_str(json).map_err(|e| Error::corrupt("/d/f", e.to_string()))?;
        record.into_metadata(&path, &layout())
    }

    #[test]
    fn test_record_round_trip() {
        let path = VirtualPath::new("/d/f").unwrap();
        let mut meta = FileMetadata::new(path.clone(), 0o640, 5);
        meta.push_version(&layout().blob_path(&path, VersionId::FIRST), 3, 10);

        let json = serde_json::to_string(&MetadataRecord::from_metadata(&meta)).unwrap();
        assert!(json.contains("\"filename\":\"d/f\""));
        assert!(json.contains("\"version_count\":1"));
        assert!(json.contains("\"data_pointer\":\"/data/.versions/d/f/version_1\""));

        assert_eq!(parse(&json).unwrap(), meta);
    }

    #[test]
    fn test_lenient_version_fields() {
        let meta = parse(
            r#"{
                "filename": "d/f",
                "version_count": 2,
                "attributes": { "st_mode": 33188, "st_size": 4, "st_mtime": 7 },
                "version_list": [
                    { "version_id": 1, "timestamp": "yesterday", "data_pointer": 12 },
                    { "version_id": 2, "timestamp": 1700000000.0 }
                ]
            }"#,
        )
        .unwrap();

        let versions = meta.versions();
        assert_eq!(versions[0].timestamp, 0);
        assert_eq!(
            versions[0].blob_ref,
            PathBuf::from("/data/.versions/d/f/version_1")
        );
        assert_eq!(versions[1].timestamp, 1_700_000_000);
        assert_eq!(meta.attributes().nlink, 1);
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let err = parse(
            r#"{
                "filename": "d/f",
                "version_count": 1000000,
                "attributes": { "st_mode": 33188, "st_size": 0, "st_mtime": 0 },
                "version_list": [ { "version_id": 1 } ]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_structural_violations_are_corrupt() {
        let cases = [
            // version_count missing
            r#"{"filename":"d/f","attributes":{"st_mode":33188,"st_size":0,"st_mtime":0},"version_list":[]}"#,
            // version_count not numeric
            r#"{"filename":"d/f","version_count":"1","attributes":{"st_mode":33188,"st_size":0,"st_mtime":0},"version_list":[]}"#,
            // id gap
            r#"{"filename":"d/f","version_count":1,"attributes":{"st_mode":33188,"st_size":1,"st_mtime":0},"version_list":[{"version_id":2}]}"#,
            // not a regular file
            r#"{"filename":"d/f","version_count":0,"attributes":{"st_mode":16877,"st_size":0,"st_mtime":0},"version_list":[]}"#,
            // size without versions
            r#"{"filename":"d/f","version_count":0,"attributes":{"st_mode":33188,"st_size":9,"st_mtime":0},"version_list":[]}"#,
            // wrong file
            r#"{"filename":"other","version_count":0,"attributes":{"st_mode":33188,"st_size":0,"st_mtime":0},"version_list":[]}"#,
            // not JSON
            "{ truncated",
        ];
        for json in cases {
            let err = parse(json).unwrap_err();
            assert!(matches!(err, Error::Corrupt { .. }), "accepted: {json}");
        }
    }
}
