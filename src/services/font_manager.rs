// Font loading - reads the lettering font from disk into a cosmic-text FontSystem

use crate::core::errors::{RenderingError, RenderingResult};
use cosmic_text::{fontdb, FontSystem};
use std::path::{Path, PathBuf};
use tracing::info;

/// A single font file, validated and ready to hand to the painter
pub struct FontFace {
    path: PathBuf,
    family: String,
    db: fontdb::Database,
}

impl FontFace {
    /// Load and parse the font at `path`.
    ///
    /// Only this font goes into the database (no system font scan), so a bad
    /// file can't be silently replaced by a fallback face.
    pub fn load(path: impl AsRef<Path>) -> RenderingResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RenderingError::FontNotFound(path.to_path_buf()));
        }

        let font_data = std::fs::read(path).map_err(|e| RenderingError::FontLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut db = fontdb::Database::new();
        db.load_font_data(font_data);

        let family = db
            .faces()
            .find_map(|face| face.families.first().map(|(name, _)| name.clone()))
            .ok_or_else(|| RenderingError::FontLoad {
                path: path.to_path_buf(),
                reason: "no usable font face in file".to_string(),
            })?;

        info!("✓ Font: {} from {}", family, path.display());

        Ok(Self {
            path: path.to_path_buf(),
            family,
            db,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a FontSystem containing only this face
    pub fn into_font_system(self) -> (FontSystem, String) {
        let font_system = FontSystem::new_with_locale_and_db("en-US".to_string(), self.db);
        (font_system, self.family)
    }
}
