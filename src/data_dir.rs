use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The FOLIOQA_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/folioqa/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("FOLIOQA_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("folioqa")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The questions table (canonical questions per topic).
    pub fn questions_csv(&self) -> PathBuf {
        self.root.join("questions.csv")
    }

    /// The passages table (ground-truth passages per topic).
    pub fn passages_csv(&self) -> PathBuf {
        self.root.join("passages.csv")
    }

    /// The cached question embedding vectors.
    pub fn vector_cache_db(&self) -> PathBuf {
        self.root.join("vectors.redb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.questions_csv(), tmp.path().join("questions.csv"));
        assert_eq!(dir.passages_csv(), tmp.path().join("passages.csv"));
        assert_eq!(dir.vector_cache_db(), tmp.path().join("vectors.redb"));
    }

    #[test]
    fn resolve_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested/data");
        let dir = DataDir::resolve(Some(&nested)).unwrap();

        assert!(dir.root().exists());
        assert_eq!(dir.root(), nested);
    }
}
