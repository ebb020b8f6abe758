use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::ToolSettings;
use crate::downloader::errors::{PipelineError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg uses a single dash
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

/// Resolves external tools: configured path, then common install paths, then `PATH`.
pub struct ToolManager {
    overrides: ToolSettings,
}

impl ToolManager {
    pub fn new(overrides: ToolSettings) -> Self {
        Self { overrides }
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.detect_tool(tool_type);
        let version = path.as_deref().and_then(|p| self.get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    /// Path to the tool or `ToolNotFound`
    pub fn require(&self, tool_type: ToolType) -> Result<PathBuf> {
        self.detect_tool(tool_type)
            .ok_or_else(|| PipelineError::ToolNotFound(tool_type.as_str().to_string()))
    }

    /// Path to use for invocations. Falls back to the bare name so a missing
    /// tool surfaces as `ToolNotFound` at spawn time rather than at startup.
    pub fn resolve_or_name(&self, tool_type: ToolType) -> PathBuf {
        self.detect_tool(tool_type)
            .unwrap_or_else(|| PathBuf::from(tool_type.as_str()))
    }

    fn detect_tool(&self, tool_type: ToolType) -> Option<PathBuf> {
        let configured = match tool_type {
            ToolType::YtDlp => self.overrides.ytdlp.as_ref(),
            ToolType::Ffmpeg => self.overrides.ffmpeg.as_ref(),
        };
        if let Some(path) = configured {
            return Some(path.clone());
        }

        let binary_name = tool_type.as_str();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if Path::new(&path).exists() {
                return Some(PathBuf::from(path));
            }
        }

        // 2. Try PATH
        which::which(binary_name).ok()
    }

    fn get_version(&self, path: &Path, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|l| l.trim().to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_path_wins() {
        let manager = ToolManager::new(ToolSettings {
            ytdlp: Some(PathBuf::from("/custom/yt-dlp")),
            ffmpeg: None,
        });
        assert_eq!(manager.require(ToolType::YtDlp).unwrap(), PathBuf::from("/custom/yt-dlp"));
    }

    #[test]
    fn test_resolve_or_name_never_fails() {
        let manager = ToolManager::new(ToolSettings::default());
        let path = manager.resolve_or_name(ToolType::Ffmpeg);
        assert!(path.to_string_lossy().ends_with("ffmpeg"));
    }
}
