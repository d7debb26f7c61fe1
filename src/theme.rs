use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ratatui::style::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeMode {
    Light,
    Dark,
}

impl ThemeMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(ThemeMode::Dark),
            "light" => Some(ThemeMode::Light),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }

    pub fn palette(&self) -> Palette {
        match self {
            ThemeMode::Light => Palette {
                text: Color::Black,
                muted: Color::DarkGray,
                accent: Color::Blue,
                highlight: Color::Cyan,
                border: Color::Blue,
                error: Color::Red,
            },
            ThemeMode::Dark => Palette {
                text: Color::White,
                muted: Color::Gray,
                accent: Color::Yellow,
                highlight: Color::Cyan,
                border: Color::DarkGray,
                error: Color::LightRed,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub highlight: Color,
    pub border: Color,
    pub error: Color,
}

/// Saved light/dark choice. Without a saved choice the `NEWSDESK_THEME`
/// preference applies, then light.
pub struct ThemePreference {
    path: PathBuf,
    mode: ThemeMode,
}

impl ThemePreference {
    pub fn load(path: impl Into<PathBuf>, preferred: Option<&str>) -> Self {
        let path = path.into();
        let mode = read_mode(&path)
            .or_else(|| preferred.and_then(ThemeMode::parse))
            .unwrap_or(ThemeMode::Light);
        Self { path, mode }
    }

    pub fn mode(&self) -> ThemeMode {
        self.mode
    }

    pub fn toggle(&mut self) -> Result<ThemeMode> {
        self.mode = self.mode.toggled();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, self.mode.as_str())
            .with_context(|| format!("Failed to save theme to {}", self.path.display()))?;
        Ok(self.mode)
    }
}

fn read_mode(path: &Path) -> Option<ThemeMode> {
    fs::read_to_string(path).ok().and_then(|s| ThemeMode::parse(&s))
}
