use crate::error::StoreError;
use crate::types::ReviewDocument;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const MAX_LABEL_LEN: usize = 50;

/// Identifies one on-disk revision of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionStamp {
    pub modified: SystemTime,
    pub len: u64,
}

impl VersionStamp {
    fn of(metadata: &fs::Metadata) -> io::Result<Self> {
        Ok(Self {
            modified: metadata.modified()?,
            len: metadata.len(),
        })
    }
}

/// The document file plus the atomic write and backup primitives around it.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    path: PathBuf,
}

fn io_error(action: &'static str, path: &Path, err: &io::Error) -> StoreError {
    StoreError::Io {
        action,
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

impl DocumentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| "review.json".to_string(), |n| n.to_string_lossy().into_owned())
    }

    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        let dir = self.dir();
        fs::create_dir_all(dir).map_err(|err| io_error("create", dir, &err))
    }

    pub fn stamp(&self) -> Result<Option<VersionStamp>, StoreError> {
        match fs::metadata(&self.path) {
            Ok(metadata) => VersionStamp::of(&metadata)
                .map(Some)
                .map_err(|err| io_error("stat", &self.path, &err)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error("stat", &self.path, &err)),
        }
    }

    /// Read the raw bytes together with the stamp of the revision they came from.
    pub fn read(&self) -> Result<Option<(Vec<u8>, VersionStamp)>, StoreError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error("open", &self.path, &err)),
        };
        let stamp = file
            .metadata()
            .and_then(|metadata| VersionStamp::of(&metadata))
            .map_err(|err| io_error("stat", &self.path, &err))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|err| io_error("read", &self.path, &err))?;
        Ok(Some((bytes, stamp)))
    }

    /// Replace the document atomically: write a sibling temp file, then rename it over.
    ///
    /// The temp file is removed if anything fails before the rename.
    pub fn write(&self, document: &ReviewDocument) -> Result<VersionStamp, StoreError> {
        let mut bytes = serde_json::to_vec_pretty(document).map_err(|err| StoreError::Encode {
            message: err.to_string(),
        })?;
        bytes.push(b'\n');

        let dir = self.dir();
        let prefix = format!(".{}.", self.file_name());
        let mut temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|err| io_error("create temp file in", dir, &err))?;
        temp.write_all(&bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|err| io_error("write", temp.path(), &err))?;
        let file = temp
            .persist(&self.path)
            .map_err(|err| io_error("rename onto", &self.path, &err.error))?;
        let stamp = file
            .metadata()
            .and_then(|metadata| VersionStamp::of(&metadata))
            .map_err(|err| io_error("stat", &self.path, &err))?;
        Ok(stamp)
    }

    /// Rename the current file aside as `<name>.backup[.<label>].<epoch-ms>`.
    pub fn backup(&self, label: Option<&str>) -> Result<PathBuf, StoreError> {
        let name = self.file_name();
        let mut millis = Utc::now().timestamp_millis();
        let target = loop {
            let candidate = match label {
                Some(label) => format!("{name}.backup.{}.{millis}", sanitize_label(label)),
                None => format!("{name}.backup.{millis}"),
            };
            let candidate = self.dir().join(candidate);
            if !candidate.exists() {
                break candidate;
            }
            millis += 1;
        };
        fs::rename(&self.path, &target).map_err(|err| io_error("back up", &self.path, &err))?;
        Ok(target)
    }
}

/// Make a branch name safe to embed in a file name.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_LABEL_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::decode;
    use crate::types::document::populated_document;
    use tempfile::TempDir;

    fn temp_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".review.json.") && name.ends_with(".tmp"))
            .collect()
    }

    fn backups(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".backup."))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let file = DocumentFile::new(dir.path().join("nested/review.json"));
        file.ensure_dir().unwrap();
        assert!(file.read().unwrap().is_none());
        assert!(file.stamp().unwrap().is_none());

        let doc = ReviewDocument::empty("HEAD", "main");
        let stamp = file.write(&doc).unwrap();
        let (bytes, read_stamp) = file.read().unwrap().unwrap();

        assert_eq!(stamp, read_stamp);
        assert_eq!(file.stamp().unwrap(), Some(stamp));
        assert!(bytes.ends_with(b"}\n"));
        let back: ReviewDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let file = DocumentFile::new(dir.path().join("review.json"));
        file.write(&ReviewDocument::empty("HEAD", "main")).unwrap();
        file.write(&ReviewDocument::empty("HEAD", "dev")).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("review.json")]);
    }

    #[test]
    fn test_failed_write_keeps_previous_document() {
        let dir = TempDir::new().unwrap();
        let file = DocumentFile::new(dir.path().join("review.json"));
        let doc = ReviewDocument::empty("HEAD", "main");
        file.write(&doc).unwrap();

        let missing = DocumentFile::new(dir.path().join("gone/review.json"));
        assert!(matches!(
            missing.write(&doc),
            Err(StoreError::Io { .. })
        ));
        let (bytes, _) = file.read().unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<ReviewDocument>(&bytes).unwrap(), doc);
    }

    #[test]
    fn test_populated_document_survives_write_and_decode() {
        let dir = TempDir::new().unwrap();
        let file = DocumentFile::new(dir.path().join("review.json"));
        let doc = populated_document("main");
        file.write(&doc).unwrap();

        let (bytes, _) = file.read().unwrap().unwrap();
        let decoded = decode(&bytes, "main").unwrap();
        assert!(!decoded.changed);
        assert!(!decoded.adopted_branch);
        assert_eq!(decoded.document, doc);
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("review.json");
        // A non-empty directory cannot be replaced by a rename.
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"x").unwrap();

        let file = DocumentFile::new(&target);
        let err = file.write(&ReviewDocument::empty("HEAD", "main")).unwrap_err();
        assert!(matches!(err, StoreError::Io { action: "rename onto", .. }));
        assert!(temp_files(dir.path()).is_empty());
        assert!(target.join("keep").exists());
    }

    #[test]
    fn test_backup_names() {
        let dir = TempDir::new().unwrap();
        let file = DocumentFile::new(dir.path().join("review.json"));

        file.write(&ReviewDocument::empty("HEAD", "main")).unwrap();
        let first = file.backup(Some("feature/login")).unwrap();
        file.write(&ReviewDocument::empty("HEAD", "main")).unwrap();
        let second = file.backup(None).unwrap();

        assert!(!file.path().exists());
        let names = backups(dir.path());
        assert_eq!(names.len(), 2);
        let first = first.file_name().unwrap().to_string_lossy().into_owned();
        let second = second.file_name().unwrap().to_string_lossy().into_owned();
        assert!(first.starts_with("review.json.backup.feature_login."));
        let suffix = second.strip_prefix("review.json.backup.").unwrap();
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_backup_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let file = DocumentFile::new(dir.path().join("review.json"));
        for _ in 0..3 {
            file.write(&ReviewDocument::empty("HEAD", "main")).unwrap();
            file.backup(Some("main")).unwrap();
        }
        assert_eq!(backups(dir.path()).len(), 3);
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("main"), "main");
        assert_eq!(sanitize_label("feat/a b:c"), "feat_a_b_c");
        assert_eq!(sanitize_label(&"x".repeat(80)).len(), MAX_LABEL_LEN);
    }
}
