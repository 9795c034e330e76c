//! Classification of publishable files.
//!
//! All rules work on the path relative to the deploy root (e.g.
//! `Packages/windows/10/cmake/Release/x64/graphviz-install.exe`) so they can be
//! tested without touching the filesystem.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Only Windows artifacts under this subpath are offered on the download page.
pub const WINDOWS_WEB_SUBPATH: &str = "/windows/10/cmake/Release/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub platform: Platform,
    /// Bit-width, for paths tagged `win32` or `win64`.
    pub bits: Option<u8>,
}

impl Classification {
    /// Standalone macOS and Windows packages ship with a checksum.
    pub fn is_standalone(&self) -> bool {
        matches!(self.platform, Platform::MacOs | Platform::Windows)
    }
}

fn word_pattern(cell: &'static OnceLock<Regex>, word: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(&format!(r"\b{word}\b")).expect("static regex"))
}

fn macos_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    word_pattern(&PATTERN, "Darwin")
}

fn windows_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    word_pattern(&PATTERN, "windows")
}

pub fn is_macos_artifact(path: &Path) -> bool {
    macos_pattern().is_match(&path.to_string_lossy())
}

pub fn is_windows_artifact(path: &Path) -> bool {
    windows_pattern().is_match(&path.to_string_lossy())
}

/// Platform and bit-width implied by a path.
pub fn classify_artifact(path: &Path) -> Classification {
    let text = path.to_string_lossy();

    let platform = if is_macos_artifact(path) {
        Platform::MacOs
    } else if is_windows_artifact(path) {
        Platform::Windows
    } else {
        Platform::Other
    };

    let bits = if text.contains("win32") {
        Some(32)
    } else if text.contains("win64") {
        Some(64)
    } else {
        None
    };

    Classification { platform, bits }
}

/// Whether a Windows artifact belongs on the download page.
pub fn is_web_windows_artifact(path: &Path) -> bool {
    path.to_string_lossy().contains(WINDOWS_WEB_SUBPATH)
}

/// Human-readable format of a file, derived from its suffix(es).
pub fn artifact_format(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match suffix.as_str() {
        "exe" => return "EXE installer".to_string(),
        "zip" => return "ZIP archive".to_string(),
        _ => {}
    }

    if name.contains(".tar.") {
        let parts: Vec<&str> = name.rsplitn(3, '.').collect();
        if let [last, second, _] = parts.as_slice() {
            return format!("{second}.{last}").to_lowercase();
        }
    }

    suffix
}

/// A file about to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Location on disk.
    pub path: PathBuf,
    /// Path relative to the deploy root; what the classification rules see
    /// and what checksum sidecars record.
    pub display: PathBuf,
    /// Name to upload under; `None` uploads under `display`.
    pub upload_name: Option<String>,
    pub format: String,
    pub classification: Classification,
    pub needs_checksum: bool,
    /// Listed in the download page's Windows section.
    pub web_windows: bool,
}

impl Artifact {
    /// A canonical source archive: always checksummed, never platform-specific.
    pub fn source(path: PathBuf, display: PathBuf) -> Self {
        Self {
            format: artifact_format(&display),
            classification: Classification {
                platform: Platform::Other,
                bits: None,
            },
            needs_checksum: true,
            web_windows: false,
            upload_name: None,
            path,
            display,
        }
    }

    /// A file from the packages tree, uploaded as `upload_name`.
    pub fn package(path: PathBuf, display: PathBuf, upload_name: String) -> Self {
        let classification = classify_artifact(&display);
        Self {
            format: artifact_format(&display),
            needs_checksum: classification.is_standalone(),
            web_windows: is_web_windows_artifact(&display),
            classification,
            upload_name: Some(upload_name),
            path,
            display,
        }
    }

    pub fn upload_name(&self) -> String {
        self.upload_name
            .clone()
            .unwrap_or_else(|| self.display.display().to_string())
    }
}
