//! OTA update session state machine
//!
//! Receives a replacement file in chunks, verifies it, and installs it
//! atomically: chunks accumulate in `<filename>.tmp`, the previous image is
//! kept as `<filename>.bak`, and the rename of the temp artifact onto the
//! target is the single irreversible step. At most one session exists at a
//! time, and a failed finish always deletes the temp artifact and resets the
//! manager to idle.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Fraction of reported free memory an incoming image may occupy
const FREE_MEMORY_HEADROOM: f64 = 0.8;

/// Read granularity for the incremental checksum pass
const DIGEST_CHUNK_SIZE: usize = 256;

/// Files that only take effect after a reboot
const BOOT_FILES: &[&str] = &["main.py", "boot.py"];

/// Acknowledgement for a started session
#[derive(Debug, Clone, PartialEq)]
pub struct OtaStarted {
    pub filename: String,
    pub expected_size: u64,
    pub temp_file: String,
}

/// Progress report for one received chunk
#[derive(Debug, Clone, PartialEq)]
pub struct OtaProgress {
    pub received: u64,
    pub total: u64,
    /// Percentage, rounded to one decimal
    pub progress: f64,
}

/// Result of a successful install
#[derive(Debug, Clone, PartialEq)]
pub struct OtaInstalled {
    pub filename: String,
    pub size: u64,
    pub backup: String,
    pub reboot_required: bool,
}

/// Live state of an in-progress transfer
#[derive(Debug)]
struct OtaSession {
    filename: String,
    target_path: PathBuf,
    temp_path: PathBuf,
    backup_path: PathBuf,
    expected_size: u64,
    received_size: u64,
    checksum: Option<String>,
    temp_file: File,
}

/// Manages the OTA session lifecycle
#[derive(Debug)]
pub struct OtaManager {
    root: PathBuf,
    session: Option<OtaSession>,
}

impl OtaManager {
    /// Create an idle manager installing files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            session: None,
        }
    }

    /// Whether a session is currently receiving chunks
    pub fn in_progress(&self) -> bool {
        self.session.is_some()
    }

    /// Begin a session for `filename` of `size` bytes.
    ///
    /// `free_memory` is the collaborator-reported free byte count; the image
    /// must leave 20% headroom. Creates or truncates the temp artifact.
    pub async fn start(
        &mut self,
        filename: &str,
        size: u64,
        checksum: Option<String>,
        free_memory: u64,
    ) -> Result<OtaStarted, EngineError> {
        if self.session.is_some() {
            return Err(EngineError::Ota("Update already in progress".into()));
        }
        if size == 0 {
            return Err(EngineError::Validation("Invalid file size".into()));
        }
        if size as f64 > free_memory as f64 * FREE_MEMORY_HEADROOM {
            return Err(EngineError::Ota(format!(
                "File too large: {} bytes (free: {})",
                size, free_memory
            )));
        }

        let target_path = self.root.join(filename);
        let temp_path = self.root.join(format!("{filename}.tmp"));
        let backup_path = self.root.join(format!("{filename}.bak"));

        // Stale temp artifact from a crashed session is discarded
        let _ = fs::remove_file(&temp_path).await;

        let temp_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .await
            .map_err(|e| EngineError::Ota(format!("Failed to start OTA: {e}")))?;

        debug!(filename, size, "OTA session started");

        let temp_name = temp_path.to_string_lossy().into_owned();
        self.session = Some(OtaSession {
            filename: filename.to_string(),
            target_path,
            temp_path,
            backup_path,
            expected_size: size,
            received_size: 0,
            checksum,
            temp_file,
        });

        Ok(OtaStarted {
            filename: filename.to_string(),
            expected_size: size,
            temp_file: temp_name,
        })
    }

    /// Append one chunk to the temp artifact.
    ///
    /// Writes are append-only; the advisory `offset` the wire protocol
    /// carries is ignored in favor of the current end of file. A chunk that
    /// would push the session past its expected size is rejected.
    pub async fn chunk(&mut self, data: &[u8]) -> Result<OtaProgress, EngineError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| EngineError::InvalidState("No OTA in progress".into()))?;

        if data.is_empty() {
            return Err(EngineError::Validation("No data in chunk".into()));
        }
        if session.received_size + data.len() as u64 > session.expected_size {
            return Err(EngineError::Ota(format!(
                "Chunk exceeds expected size: {} + {} > {}",
                session.received_size,
                data.len(),
                session.expected_size
            )));
        }

        session
            .temp_file
            .write_all(data)
            .await
            .map_err(|e| EngineError::Ota(format!("Chunk write failed: {e}")))?;
        session.received_size += data.len() as u64;

        let progress = (session.received_size as f64 / session.expected_size as f64) * 100.0;
        Ok(OtaProgress {
            received: session.received_size,
            total: session.expected_size,
            progress: (progress * 10.0).round() / 10.0,
        })
    }

    /// Verify and install the received image.
    ///
    /// Any failure deletes the temp artifact (best effort) and resets the
    /// manager to idle before the error propagates.
    pub async fn finish(&mut self) -> Result<OtaInstalled, EngineError> {
        let session = self
            .session
            .take()
            .ok_or_else(|| EngineError::InvalidState("No OTA in progress".into()))?;

        match Self::verify_and_install(&session).await {
            Ok(installed) => Ok(installed),
            Err(e) => {
                let _ = fs::remove_file(&session.temp_path).await;
                Err(e)
            }
        }
    }

    async fn verify_and_install(session: &OtaSession) -> Result<OtaInstalled, EngineError> {
        // Make sure every chunk is on disk before measuring
        session
            .temp_file
            .sync_all()
            .await
            .map_err(|e| EngineError::Ota(format!("OTA finish failed: {e}")))?;

        let actual_size = fs::metadata(&session.temp_path)
            .await
            .map_err(|e| EngineError::Ota(format!("OTA finish failed: {e}")))?
            .len();

        if actual_size != session.expected_size {
            return Err(EngineError::Ota(format!(
                "Size mismatch: expected {}, got {}",
                session.expected_size, actual_size
            )));
        }

        if let Some(expected) = &session.checksum {
            let actual = digest_file(&session.temp_path).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(EngineError::Ota("Checksum mismatch".into()));
            }
        }

        // Best effort: keep the previous image, absence is not an error
        let _ = fs::remove_file(&session.backup_path).await;
        if let Err(e) = fs::rename(&session.target_path, &session.backup_path).await {
            debug!(filename = %session.filename, "no previous image to back up: {e}");
        }

        // The only irreversible step
        fs::rename(&session.temp_path, &session.target_path)
            .await
            .map_err(|e| EngineError::Ota(format!("OTA finish failed: {e}")))?;

        Ok(OtaInstalled {
            filename: session.filename.clone(),
            size: actual_size,
            backup: session.backup_path.to_string_lossy().into_owned(),
            reboot_required: BOOT_FILES.contains(&session.filename.as_str()),
        })
    }

    /// Abandon the session, deleting the temp artifact if present.
    ///
    /// Valid from any state; always leaves the manager idle.
    pub async fn abort(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = fs::remove_file(&session.temp_path).await {
                warn!(path = %session.temp_path.display(), "failed to remove temp artifact: {e}");
            }
        }
    }
}

/// Incremental MD5 over a file, bounded to small reads
async fn digest_file(path: &Path) -> Result<String, EngineError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| EngineError::Ota(format!("OTA finish failed: {e}")))?;

    let mut context = md5::Context::new();
    let mut buf = [0u8; DIGEST_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| EngineError::Ota(format!("OTA finish failed: {e}")))?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "webserial-ota-{}-{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).expect("create test root");
        root
    }

    const FREE: u64 = 1024 * 1024;

    #[tokio::test]
    async fn test_full_update_cycle() {
        let root = test_root("cycle");
        let mut ota = OtaManager::new(&root);

        let payload = b"print('v2')\n";
        let checksum = format!("{:x}", md5::compute(payload));

        let started = ota
            .start("app.py", payload.len() as u64, Some(checksum), FREE)
            .await
            .expect("start");
        assert_eq!(started.expected_size, payload.len() as u64);
        assert!(ota.in_progress());

        let progress = ota.chunk(&payload[..4]).await.expect("chunk 1");
        assert_eq!(progress.received, 4);
        let progress = ota.chunk(&payload[4..]).await.expect("chunk 2");
        assert_eq!(progress.progress, 100.0);

        let installed = ota.finish().await.expect("finish");
        assert_eq!(installed.size, payload.len() as u64);
        assert!(!installed.reboot_required);
        assert!(!ota.in_progress());

        let on_disk = std::fs::read(root.join("app.py")).expect("installed file");
        assert_eq!(on_disk, payload);
        assert!(!root.join("app.py.tmp").exists());
    }

    #[tokio::test]
    async fn test_install_backs_up_previous_image() {
        let root = test_root("backup");
        std::fs::write(root.join("main.py"), b"old").expect("seed target");

        let mut ota = OtaManager::new(&root);
        ota.start("main.py", 3, None, FREE).await.expect("start");
        ota.chunk(b"new").await.expect("chunk");
        let installed = ota.finish().await.expect("finish");

        assert!(installed.reboot_required);
        assert_eq!(std::fs::read(root.join("main.py")).expect("target"), b"new");
        assert_eq!(
            std::fs::read(root.join("main.py.bak")).expect("backup"),
            b"old"
        );
    }

    #[tokio::test]
    async fn test_checksum_mismatch_leaves_target_untouched() {
        let root = test_root("checksum");
        std::fs::write(root.join("main.py"), b"original").expect("seed target");

        let mut ota = OtaManager::new(&root);
        ota.start("main.py", 4, Some("deadbeef".into()), FREE)
            .await
            .expect("start");
        ota.chunk(b"data").await.expect("chunk");

        let err = ota.finish().await.expect_err("checksum must mismatch");
        assert!(matches!(err, EngineError::Ota(ref m) if m.contains("Checksum mismatch")));

        // Session is gone, temp artifact removed, target untouched
        assert!(!ota.in_progress());
        assert!(!root.join("main.py.tmp").exists());
        assert_eq!(
            std::fs::read(root.join("main.py")).expect("target"),
            b"original"
        );
    }

    #[tokio::test]
    async fn test_size_mismatch_aborts_session() {
        let root = test_root("size");
        let mut ota = OtaManager::new(&root);

        ota.start("app.py", 10, None, FREE).await.expect("start");
        ota.chunk(b"short").await.expect("chunk");

        let err = ota.finish().await.expect_err("size must mismatch");
        assert!(matches!(err, EngineError::Ota(ref m) if m.contains("Size mismatch")));
        assert!(!ota.in_progress());
        assert!(!root.join("app.py.tmp").exists());
    }

    #[tokio::test]
    async fn test_start_rejects_zero_size_and_headroom() {
        let root = test_root("validate");
        let mut ota = OtaManager::new(&root);

        assert!(matches!(
            ota.start("a.py", 0, None, FREE).await,
            Err(EngineError::Validation(_))
        ));
        // 90 bytes against 100 free exceeds the 80% headroom
        assert!(matches!(
            ota.start("a.py", 90, None, 100).await,
            Err(EngineError::Ota(_))
        ));
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_active() {
        let root = test_root("single");
        let mut ota = OtaManager::new(&root);

        ota.start("a.py", 4, None, FREE).await.expect("start");
        assert!(matches!(
            ota.start("b.py", 4, None, FREE).await,
            Err(EngineError::Ota(_))
        ));
    }

    #[tokio::test]
    async fn test_chunk_without_session_is_invalid_state() {
        let root = test_root("nosession");
        let mut ota = OtaManager::new(&root);

        assert!(matches!(
            ota.chunk(b"data").await,
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            ota.finish().await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_chunk_past_expected_size_rejected() {
        let root = test_root("overrun");
        let mut ota = OtaManager::new(&root);

        ota.start("a.py", 4, None, FREE).await.expect("start");
        ota.chunk(b"1234").await.expect("fill");
        assert!(matches!(
            ota.chunk(b"5").await,
            Err(EngineError::Ota(_))
        ));
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let root = test_root("abort");
        let mut ota = OtaManager::new(&root);

        ota.start("a.py", 4, None, FREE).await.expect("start");
        ota.chunk(b"12").await.expect("chunk");
        ota.abort().await;

        assert!(!ota.in_progress());
        assert!(!root.join("a.py.tmp").exists());

        // Aborting while idle is a no-op
        ota.abort().await;
        assert!(!ota.in_progress());
    }
}
