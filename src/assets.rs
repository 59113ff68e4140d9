// Asset resolution
// Turns sources and sound identifiers into loadable audio bytes

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{AudioError, Result};

/// List of extensions tried when a sound identifier has none
pub const DEFAULT_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a", "aac"];

/// Where a primary playback request points
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SoundSource {
    File(PathBuf),
    Url(String),
}

impl SoundSource {
    /// Interpret a host-supplied string. `file://` URLs become paths.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(path) = trimmed.strip_prefix("file://") {
            return SoundSource::File(PathBuf::from(path));
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SoundSource::Url(trimmed.to_string())
        } else {
            SoundSource::File(PathBuf::from(trimmed))
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, SoundSource::Url(_))
    }
}

impl fmt::Display for SoundSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundSource::File(path) => write!(f, "{}", path.display()),
            SoundSource::Url(url) => f.write_str(url),
        }
    }
}

/// Raw bytes of an audio asset plus a format hint
#[derive(Debug, Clone)]
pub struct AudioResource {
    /// Name used in logs and errors
    pub label: String,
    pub bytes: Vec<u8>,
    /// File extension, used as a probe hint
    pub extension: Option<String>,
}

/// Resolves sources and identifiers to audio resources
pub trait AssetResolver: Send + Sync {
    fn resolve_source(&self, source: &SoundSource) -> Result<AudioResource>;

    fn resolve_named(&self, identifier: &str) -> Result<AudioResource>;
}

/// Filesystem-backed resolver with an asset directory for named sounds
#[derive(Debug, Clone)]
pub struct FsAssetResolver {
    asset_dir: PathBuf,
    extensions: Vec<String>,
}

impl FsAssetResolver {
    pub fn new(asset_dir: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            extensions,
        }
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    /// Candidate paths for an identifier, in lookup order
    fn candidates(&self, identifier: &str) -> Vec<PathBuf> {
        let direct = self.asset_dir.join(identifier);
        let mut paths = Vec::with_capacity(self.extensions.len() + 1);
        if Path::new(identifier).extension().is_some() {
            paths.push(direct.clone());
        }
        for ext in &self.extensions {
            paths.push(self.asset_dir.join(format!("{}.{}", identifier, ext)));
        }
        if !paths.contains(&direct) {
            paths.push(direct);
        }
        paths
    }

    fn read_file(label: &str, path: &Path) -> Result<AudioResource> {
        let bytes = fs::read(path).map_err(|e| AudioError::source_unavailable(label, e))?;
        Ok(AudioResource {
            label: label.to_string(),
            bytes,
            extension: extension_of(path),
        })
    }

    #[cfg(feature = "remote")]
    fn fetch_url(url: &str) -> Result<AudioResource> {
        let response = reqwest::blocking::get(url)
            .and_then(|r| r.error_for_status())
            .map_err(|e| AudioError::source_unavailable(url, e))?;
        let bytes = response
            .bytes()
            .map_err(|e| AudioError::source_unavailable(url, e))?;
        let path_part = url.split(['?', '#']).next().unwrap_or(url);
        Ok(AudioResource {
            label: url.to_string(),
            bytes: bytes.to_vec(),
            extension: extension_of(Path::new(path_part)),
        })
    }

    #[cfg(not(feature = "remote"))]
    fn fetch_url(url: &str) -> Result<AudioResource> {
        Err(AudioError::source_unavailable(
            url,
            "remote sources need the `remote` feature",
        ))
    }
}

impl AssetResolver for FsAssetResolver {
    fn resolve_source(&self, source: &SoundSource) -> Result<AudioResource> {
        match source {
            SoundSource::File(path) => {
                let label = path.display().to_string();
                Self::read_file(&label, path)
            }
            SoundSource::Url(url) => {
                debug!("Fetching remote source {}", url);
                Self::fetch_url(url)
            }
        }
    }

    fn resolve_named(&self, identifier: &str) -> Result<AudioResource> {
        if !is_safe_identifier(identifier) {
            return Err(AudioError::source_unavailable(identifier, "invalid sound identifier"));
        }

        for path in self.candidates(identifier) {
            if path.is_file() {
                debug!("Resolved sound {} to {}", identifier, path.display());
                return Self::read_file(identifier, &path);
            }
        }

        Err(AudioError::source_unavailable(
            identifier,
            format!("not found in {}", self.asset_dir.display()),
        ))
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Identifiers are relative paths inside the asset directory
fn is_safe_identifier(identifier: &str) -> bool {
    if identifier.trim().is_empty() {
        return false;
    }
    Path::new(identifier)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}
