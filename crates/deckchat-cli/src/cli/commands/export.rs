//! Deck export command and the file writing shared with chat.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deckchat_core::client::{ChatClient, ExportedDeck};
use deckchat_core::config::Config;
use deckchat_core::models::Presentation;
use deckchat_core::raster::{CanvasTarget, Rasterizer};
use deckchat_core::session::Session;

use crate::cli::render;

pub fn rasterizer(config: &Config) -> Rasterizer<CanvasTarget> {
    Rasterizer::new(
        CanvasTarget::from_config(&config.raster),
        config.raster.settle(),
    )
}

pub async fn run(deck_path: &Path, out: Option<&Path>, preview: bool, config: &Config) -> Result<()> {
    let contents = fs::read_to_string(deck_path)
        .with_context(|| format!("read deck from {}", deck_path.display()))?;
    let deck: Presentation = serde_json::from_str(&contents)
        .with_context(|| format!("parse deck from {}", deck_path.display()))?;

    let client = ChatClient::from_config(config)?;
    let mut session = Session::new();
    session.deck.set_current(deck);

    if preview {
        let preview = session.preview(&client).await?;
        println!("{}", render::preview(&preview));
        return Ok(());
    }

    let exported = session.export(&client, &rasterizer(config)).await?;
    let written = write_export(&exported, out, config)?;
    println!("Exported {}", written.display());
    Ok(())
}

/// Writes an exported deck and returns the final path.
///
/// `out` may name a file or an existing directory; without it the file goes
/// to the configured export directory under the server's filename.
pub fn write_export(exported: &ExportedDeck, out: Option<&Path>, config: &Config) -> Result<PathBuf> {
    let path = match out {
        Some(path) if path.is_dir() => path.join(&exported.filename),
        Some(path) => path.to_path_buf(),
        None => config.export_dir().join(&exported.filename),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&path, &exported.bytes)
        .with_context(|| format!("write export to {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = exported.bytes.len(), "export written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn exported() -> ExportedDeck {
        ExportedDeck {
            filename: "Q3_Review.pptx".to_string(),
            bytes: b"PK\x03\x04".to_vec().into(),
        }
    }

    #[test]
    fn test_write_export_into_directory() {
        let dir = tempdir().unwrap();
        let path = write_export(&exported(), Some(dir.path()), &Config::default()).unwrap();
        assert_eq!(path, dir.path().join("Q3_Review.pptx"));
        assert_eq!(fs::read(&path).unwrap(), b"PK\x03\x04");
    }

    #[test]
    fn test_write_export_defaults_to_export_dir() {
        let dir = tempdir().unwrap();
        let config = Config {
            export_dir: Some(dir.path().join("decks").display().to_string()),
            ..Config::default()
        };
        let path = write_export(&exported(), None, &config).unwrap();
        assert_eq!(path, dir.path().join("decks").join("Q3_Review.pptx"));
        assert!(path.exists());
    }
}
