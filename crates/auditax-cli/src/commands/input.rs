//! Reading inputs from disk: configuration, invoice XML and report HTML.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use auditax_core::AuditConfig;

/// File name of the diagnostic copy written when a report yields no items.
pub const DIAGNOSTIC_FILE: &str = "portal-report-error.html";

/// Text encoding of an input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum InputEncoding {
    /// UTF-8, falling back to Windows-1252 when the bytes are not valid UTF-8
    Auto,
    /// Strict UTF-8
    Utf8,
    /// ISO-8859-1 / Windows-1252
    Latin1,
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("auditax")
        .join("config.json")
}

/// Load the config from `config_path`, else the default location, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<AuditConfig> {
    if let Some(path) = config_path {
        return AuditConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to load config from {}", path));
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Using config at {}", default_path.display());
        return AuditConfig::from_file(&default_path)
            .with_context(|| format!("Failed to load config from {}", default_path.display()));
    }
    Ok(AuditConfig::default())
}

/// Read a file and decode it to a string.
pub fn read_text(path: &Path, encoding: InputEncoding) -> anyhow::Result<String> {
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    decode(bytes, encoding).with_context(|| format!("Failed to decode {}", path.display()))
}

pub fn decode(bytes: Vec<u8>, encoding: InputEncoding) -> anyhow::Result<String> {
    match encoding {
        InputEncoding::Latin1 => Ok(latin1(&bytes)),
        InputEncoding::Utf8 => Ok(strip_bom(String::from_utf8(bytes)?)),
        InputEncoding::Auto => match String::from_utf8(bytes) {
            Ok(s) => Ok(strip_bom(s)),
            Err(e) => {
                warn!("Input is not valid UTF-8, decoding as Windows-1252");
                Ok(latin1(&e.into_bytes()))
            }
        },
    }
}

fn latin1(bytes: &[u8]) -> String {
    let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    decoded.into_owned()
}

fn strip_bom(text: String) -> String {
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

/// Keep a copy of a report that produced no items, for later inspection.
pub fn write_diagnostic(dir: &Path, html: &str) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(DIAGNOSTIC_FILE);
    fs::write(&path, html).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_auto_falls_back_to_latin1() {
        let bytes = b"OPERA\xc7\xc3O".to_vec();
        assert_eq!(decode(bytes, InputEncoding::Auto).unwrap(), "OPERAÇÃO");
    }

    #[test]
    fn test_decode_strips_bom() {
        let bytes = "\u{feff}<NFe/>".as_bytes().to_vec();
        assert_eq!(decode(bytes, InputEncoding::Auto).unwrap(), "<NFe/>");
    }

    #[test]
    fn test_decode_strict_utf8_rejects_latin1() {
        assert!(decode(b"\xe7".to_vec(), InputEncoding::Utf8).is_err());
    }

    #[test]
    fn test_write_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_diagnostic(dir.path(), "<html/>").unwrap();
        assert_eq!(path.file_name().unwrap(), DIAGNOSTIC_FILE);
        assert_eq!(fs::read_to_string(path).unwrap(), "<html/>");
    }
}
