use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Writes PNG artifacts under one directory with collision-free names:
/// `<prefix>_<YYYYMMDD_HHMMSS>_<uuid>.png`.
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(prefix: &str) -> String {
        format!(
            "{prefix}_{}_{}.png",
            Local::now().format("%Y%m%d_%H%M%S"),
            Uuid::new_v4()
        )
    }

    async fn save(&self, prefix: &str, png: &[u8]) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(prefix));
        tokio::fs::write(&path, png).await?;
        Ok(path)
    }

    /// Final screenshot of a run.
    pub async fn save_execution(&self, png: &[u8]) -> io::Result<PathBuf> {
        self.save("execution", png).await
    }

    /// Captcha image sent to the solver, kept for debugging.
    pub async fn save_captcha(&self, png: &[u8]) -> io::Result<PathBuf> {
        self.save("captcha", png).await
    }
}
