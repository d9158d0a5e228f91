use anyhow::{Context, anyhow};
use bytes::Bytes;
use futures::StreamExt;
use hotpin_core::ContentId;
use hotpin_core::node::{ByteStream, NodeResult, PinNode};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

const BLOBS_DIR: &str = "blobs";
const PINS_DIR: &str = "pins";
const TMP_DIR: &str = "tmp";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalNodeConfig {
    pub base_path: String,
}

/// Storage node on the local filesystem.
///
/// Layout below `base_path`:
///
/// - `blobs/<cid>`: blob bytes, written once via a temp file + rename
/// - `pins/<cid>`: empty marker, present while the blob is pinned
/// - `tmp/`: in-flight uploads
///
/// Blobs are raw (no DAG), so "recursive" pinning is pinning the blob.
#[derive(Debug, Clone)]
pub struct LocalNode {
    base_path: PathBuf,
}

impl LocalNode {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        LocalNode {
            base_path: base_path.into(),
        }
    }

    pub fn create(config: LocalNodeConfig) -> Self {
        Self::new(config.base_path)
    }

    fn blob_path(&self, cid: &ContentId) -> PathBuf {
        self.base_path.join(BLOBS_DIR).join(cid.to_string())
    }

    fn pin_path(&self, cid: &ContentId) -> PathBuf {
        self.base_path.join(PINS_DIR).join(cid.to_string())
    }

    async fn require_blob(&self, cid: &ContentId) -> NodeResult<PathBuf> {
        let path = self.blob_path(cid);
        if !tokio::fs::try_exists(&path).await? {
            return Err(anyhow!("local node: {cid} not found"));
        }
        Ok(path)
    }

    async fn write_pin_marker(&self, cid: &ContentId) -> NodeResult<()> {
        let path = self.pin_path(cid);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, b"").await?;
        Ok(())
    }

    async fn remove_pin_marker(&self, cid: &ContentId) -> NodeResult<()> {
        match tokio::fs::remove_file(self.pin_path(cid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Streams the upload into `tmp_path` and moves it to its blob path.
    async fn store_upload(
        &self,
        tmp_path: &Path,
        mut stream: ByteStream,
    ) -> NodeResult<ContentId> {
        let mut hasher = blake3::Hasher::new();
        let mut file = File::create(tmp_path).await?;
        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;
        drop(file);

        let cid = ContentId::raw(hasher.finalize().into());
        let final_path = self.blob_path(&cid);
        if tokio::fs::try_exists(&final_path).await? {
            tokio::fs::remove_file(tmp_path).await?;
        } else {
            if let Some(parent) = final_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(tmp_path, &final_path)
                .await
                .with_context(|| format!("failed to finalize blob {cid}"))?;
        }
        Ok(cid)
    }

    pub async fn is_pinned(&self, cid: &ContentId) -> NodeResult<bool> {
        Ok(tokio::fs::try_exists(self.pin_path(cid)).await?)
    }
}

#[async_trait::async_trait]
impl PinNode for LocalNode {
    async fn add(&self, stream: ByteStream, pin: bool) -> NodeResult<ContentId> {
        let tmp_dir = self.base_path.join(TMP_DIR);
        tokio::fs::create_dir_all(&tmp_dir).await?;
        let tmp_path = tmp_dir.join(uuid::Uuid::new_v4().to_string());

        let cid = match self.store_upload(&tmp_path, stream).await {
            Ok(cid) => cid,
            Err(e) => {
                match tokio::fs::remove_file(&tmp_path).await {
                    Err(rm) if rm.kind() != std::io::ErrorKind::NotFound => {
                        warn!("local node: failed to remove {}: {rm}", tmp_path.display());
                    }
                    _ => {}
                }
                return Err(e);
            }
        };
        debug!("local node: added {}", cid.fmt_short());

        if pin {
            self.write_pin_marker(&cid).await?;
        }
        Ok(cid)
    }

    async fn get(&self, cid: &ContentId) -> NodeResult<ByteStream> {
        let path = self.require_blob(cid).await?;
        let file = File::open(&path).await?;
        Ok(Box::new(ReaderStream::new(file)))
    }

    async fn pin_add(&self, cid: &ContentId) -> NodeResult<()> {
        self.require_blob(cid).await?;
        self.write_pin_marker(cid).await
    }

    async fn pin_rm(&self, cid: &ContentId) -> NodeResult<()> {
        self.remove_pin_marker(cid).await
    }

    async fn pin_update(&self, from: &ContentId, to: &ContentId) -> NodeResult<()> {
        self.require_blob(to).await?;
        // Pin the new root before dropping the old one.
        self.write_pin_marker(to).await?;
        self.remove_pin_marker(from).await
    }

    async fn stat(&self, cid: &ContentId) -> NodeResult<u64> {
        let path = self.require_blob(cid).await?;
        Ok(tokio::fs::metadata(&path).await?.len())
    }

    async fn pins(&self) -> NodeResult<Vec<ContentId>> {
        let dir = self.base_path.join(PINS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let cid = ContentId::parse(&name)
                .with_context(|| format!("unexpected file in pin directory: {name}"))?;
            out.push(cid);
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn once(data: &'static [u8]) -> ByteStream {
        Box::new(futures::stream::iter(vec![Ok(Bytes::from_static(data))]))
    }

    #[tokio::test]
    async fn add_get_stat() {
        let temp_dir = tempfile::tempdir().unwrap();
        let node = LocalNode::new(temp_dir.path());

        let cid = node.add(once(b"local bytes"), false).await.unwrap();
        assert_eq!(cid, ContentId::for_raw_bytes(b"local bytes"));
        assert!(!node.is_pinned(&cid).await.unwrap());
        assert_eq!(node.stat(&cid).await.unwrap(), 11);

        let chunks: Vec<Bytes> = node.get(&cid).await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"local bytes");
    }

    #[tokio::test]
    async fn adding_twice_keeps_one_blob() {
        let temp_dir = tempfile::tempdir().unwrap();
        let node = LocalNode::new(temp_dir.path());
        let a = node.add(once(b"dup"), true).await.unwrap();
        let b = node.add(once(b"dup"), true).await.unwrap();
        assert_eq!(a, b);

        let tmp_left = std::fs::read_dir(temp_dir.path().join(TMP_DIR))
            .unwrap()
            .count();
        assert_eq!(tmp_left, 0);
    }

    #[tokio::test]
    async fn failed_upload_leaves_no_temp_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let node = LocalNode::new(temp_dir.path());
        let stream: ByteStream = Box::new(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ]));

        assert!(node.add(stream, true).await.is_err());
        let tmp_left = std::fs::read_dir(temp_dir.path().join(TMP_DIR))
            .unwrap()
            .count();
        assert_eq!(tmp_left, 0);
        assert!(node.pins().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pin_lifecycle() {
        let temp_dir = tempfile::tempdir().unwrap();
        let node = LocalNode::create(LocalNodeConfig {
            base_path: temp_dir.path().to_string_lossy().into(),
        });

        let v1 = node.add(once(b"v1"), true).await.unwrap();
        let v2 = node.add(once(b"v2"), false).await.unwrap();
        assert_eq!(node.pins().await.unwrap(), vec![v1]);

        node.pin_update(&v1, &v2).await.unwrap();
        assert_eq!(node.pins().await.unwrap(), vec![v2]);

        node.pin_rm(&v2).await.unwrap();
        node.pin_rm(&v2).await.unwrap();
        assert!(node.pins().await.unwrap().is_empty());

        node.pin_add(&v1).await.unwrap();
        assert!(node.is_pinned(&v1).await.unwrap());
    }

    #[tokio::test]
    async fn missing_blob_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let node = LocalNode::new(temp_dir.path());
        let cid = ContentId::for_raw_bytes(b"absent");
        assert!(node.pin_add(&cid).await.is_err());
        assert!(node.stat(&cid).await.is_err());
        assert!(node.get(&cid).await.is_err());
    }
}
