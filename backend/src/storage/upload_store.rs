use lazy_static::lazy_static;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const ALLOWED_EXTENSION_LIST: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

lazy_static! {
    pub static ref ALLOWED_EXTENSIONS: HashSet<&'static str> =
        ALLOWED_EXTENSION_LIST.into_iter().collect();
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("file name {0:?} has no extension")]
    MissingExtension(String),
    #[error("extension {0:?} is not allowed")]
    InvalidExtension(String),
    #[error("upload exceeds {limit} bytes")]
    FileTooLarge { limit: usize },
    #[error("failed to write upload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    /// Server-generated name inside the uploads directory.
    pub stored_name: String,
    pub path: PathBuf,
}

impl StoredUpload {
    pub fn public_url(&self) -> String {
        format!("/static/uploads/{}", self.stored_name)
    }
}

/// Uploaded images on local disk, named by content hash so client-supplied
/// names never reach the filesystem.
#[derive(Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(root: PathBuf, max_bytes: usize) -> Self {
        Self { root, max_bytes }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn ensure_root(&self) -> Result<(), UploadError> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    pub fn generate_stored_name(image_hash: &str, file_extension: &str) -> String {
        format!("{}.{}", image_hash, file_extension)
    }

    /// Returns the lowercased extension when it is on the allow-list.
    pub fn validate_file_name(file_name: &str) -> Result<String, UploadError> {
        let extension = match file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => return Err(UploadError::MissingExtension(file_name.to_string())),
        };
        if !ALLOWED_EXTENSIONS.contains(extension.as_str()) {
            return Err(UploadError::InvalidExtension(extension));
        }
        Ok(extension)
    }

    pub fn validate_image_size(&self, size: usize) -> Result<(), UploadError> {
        if size > self.max_bytes {
            return Err(UploadError::FileTooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    pub fn save(&self, image_data: &[u8], file_extension: &str) -> Result<StoredUpload, UploadError> {
        self.validate_image_size(image_data.len())?;

        let image_hash = Self::calculate_image_hash(image_data);
        let stored_name = Self::generate_stored_name(&image_hash, file_extension);
        let path = self.root.join(&stored_name);
        std::fs::write(&path, image_data)?;

        log::debug!("Stored upload {} ({} bytes)", path.display(), image_data.len());
        Ok(StoredUpload { stored_name, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_is_case_insensitive() {
        assert_eq!(UploadStore::validate_file_name("scan.PNG").unwrap(), "png");
        assert_eq!(UploadStore::validate_file_name("chest.x-ray.JpEg").unwrap(), "jpeg");
        for name in ["a.jpg", "a.gif", "a.bmp"] {
            assert!(UploadStore::validate_file_name(name).is_ok());
        }
    }

    #[test]
    fn rejects_other_extensions() {
        assert!(matches!(
            UploadStore::validate_file_name("scan.txt"),
            Err(UploadError::InvalidExtension(ext)) if ext == "txt"
        ));
        assert!(matches!(
            UploadStore::validate_file_name("scan.DAT"),
            Err(UploadError::InvalidExtension(_))
        ));
        assert!(matches!(
            UploadStore::validate_file_name("scan"),
            Err(UploadError::MissingExtension(_))
        ));
        assert!(matches!(
            UploadStore::validate_file_name("scan."),
            Err(UploadError::MissingExtension(_))
        ));
    }

    #[test]
    fn saves_under_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf(), 1024);

        let stored = store.save(b"fake image bytes", "png").unwrap();
        assert_eq!(stored.stored_name.len(), 64 + 4);
        assert!(stored.stored_name.ends_with(".png"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"fake image bytes");
        assert_eq!(stored.public_url(), format!("/static/uploads/{}", stored.stored_name));
    }

    #[test]
    fn refuses_oversized_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf(), 4);

        let err = store.save(b"too many bytes", "png").unwrap_err();
        assert!(matches!(err, UploadError::FileTooLarge { limit: 4 }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
