use crate::browser::BrowserSession;
use crate::core::BrowserDriver;
use crate::errors::Result;
use std::path::{Path, PathBuf};

pub struct ScreenshotManager;

impl ScreenshotManager {
    pub async fn save_to_file<D: BrowserDriver>(
        session: &BrowserSession<D>,
        file_path: &Path,
    ) -> Result<()> {
        let screenshot_bytes = session.screenshot().await?;
        tokio::fs::write(file_path, screenshot_bytes).await?;
        Ok(())
    }

    /// Write `<dir>/<label>-<timestamp>.png`, creating `dir` when needed.
    pub async fn save_to_dir<D: BrowserDriver>(
        session: &BrowserSession<D>,
        dir: &Path,
        label: &str,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(Self::file_name(label, chrono::Utc::now()));
        Self::save_to_file(session, &path).await?;
        Ok(path)
    }

    fn file_name(label: &str, at: chrono::DateTime<chrono::Utc>) -> String {
        let label: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}-{}.png", label, at.format("%Y%m%dT%H%M%S%.3fZ"))
    }
}
