use super::DocumentTarget;
use crate::{Error, Result};
use rules_controller_k8s_api::Rule;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::io::AsyncWriteExt;

static NEXT_TEMP: AtomicU64 = AtomicU64::new(0);

/// Writes the rules document to a local file, typically on a volume shared with the gateway.
///
/// Each document is written to a sibling file and renamed over the destination, so readers and
/// concurrent writers only ever see a complete document.
#[derive(Clone, Debug)]
pub struct FileTarget {
    path: PathBuf,
}

impl FileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A path next to the destination that no other write is using.
    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(self.path.file_name().unwrap_or_default());
        name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            NEXT_TEMP.fetch_add(1, Ordering::Relaxed)
        ));
        self.path.with_file_name(name)
    }
}

async fn write_file(path: &Path, document: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(document).await?;
    file.sync_all().await
}

#[async_trait::async_trait]
impl DocumentTarget for FileTarget {
    async fn create_or_update(&self, document: &[u8], triggered_by: Option<&Rule>) -> Result<()> {
        if let Some(key) = triggered_by.and_then(Rule::target_document_key) {
            tracing::info!(configmap = %key, "Ignoring configMapName; rules are written to a file");
        }

        let temp = self.temp_path();
        let res = match write_file(&temp, document).await {
            Ok(()) => tokio::fs::rename(&temp, &self.path).await,
            Err(error) => Err(error),
        };
        if let Err(source) = res {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(Error::Io {
                path: self.path.clone(),
                source,
            });
        }
        tracing::info!(bytes = document.len(), path = %self.path.display(), "Wrote rules file");
        Ok(())
    }

    fn honors_target_key(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overwrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access-rules.json");
        std::fs::write(&path, "[\n  {\"id\": \"stale.default\"},\n  {}\n]").unwrap();

        let target = FileTarget::new(&path);
        target.create_or_update(b"[]", None).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
        assert!(!target.honors_target_key());
    }

    #[tokio::test]
    async fn reports_write_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("access-rules.json");

        let error = FileTarget::new(&path)
            .create_or_update(b"[]", None)
            .await
            .unwrap_err();
        match error {
            Error::Io { path: p, .. } => assert_eq!(p, path),
            error => panic!("unexpected error: {error}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_leave_one_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access-rules.json");
        let target = std::sync::Arc::new(FileTarget::new(&path));

        let large = format!(
            "[{}]",
            (0..2000)
                .map(|i| format!("{{\"id\":\"rule{i}.default\"}}"))
                .collect::<Vec<_>>()
                .join(",")
        );

        for _ in 0..50 {
            let writes = [large.clone(), "[]".to_string()].map(|document| {
                let target = target.clone();
                tokio::spawn(async move { target.create_or_update(document.as_bytes(), None).await })
            });
            for write in writes {
                write.await.unwrap().unwrap();
            }

            let written = std::fs::read_to_string(&path).unwrap();
            assert!(
                written == large || written == "[]",
                "file must hold exactly one document, got {} bytes",
                written.len()
            );
        }

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temporary files must not be left behind");
    }
}
