//! Table and text extraction strategies.
//!
//! A strategy is either a named preset or a custom definition written as a
//! YAML mapping. Settings use the same key names as pdfplumber so that
//! existing definitions carry over.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Commented template shown to users; resolves to "no custom strategy".
pub const CUSTOM_TABLE_STRATEGY_TEMPLATE: &str = "\
# vertical_strategy: lines
# horizontal_strategy: lines
# intersection_tolerance: 5
# snap_tolerance: 3
# join_tolerance: 3
# edge_min_length: 3
# min_words_vertical: 3
# min_words_horizontal: 1
";

/// Commented template shown to users; resolves to "no custom strategy".
pub const CUSTOM_TEXT_STRATEGY_TEMPLATE: &str = "\
# x_tolerance: 3
# y_tolerance: 3
# layout: false
# keep_blank_chars: false
# use_text_flow: false
";

/// How table edges are detected along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStrategy {
    Lines,
    LinesStrict,
    Text,
    Explicit,
}

/// Table detection settings passed to [`PdfPage::extract_tables`](crate::PdfPage::extract_tables).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_strategy: Option<EdgeStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_strategy: Option<EdgeStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snap_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snap_x_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snap_y_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_min_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_words_vertical: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_words_horizontal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersection_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_x_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_y_tolerance: Option<f64>,
}

impl TableSettings {
    /// Detect table edges from ruling lines.
    pub fn lines() -> Self {
        Self {
            vertical_strategy: Some(EdgeStrategy::Lines),
            horizontal_strategy: Some(EdgeStrategy::Lines),
            ..Self::default()
        }
    }

    /// Detect table edges from text alignment.
    pub fn text() -> Self {
        Self {
            vertical_strategy: Some(EdgeStrategy::Text),
            horizontal_strategy: Some(EdgeStrategy::Text),
            ..Self::default()
        }
    }

    /// Horizontal gap (in points) that separates two cells.
    pub fn effective_x_tolerance(&self) -> f64 {
        self.text_x_tolerance
            .or(self.snap_x_tolerance)
            .or(self.snap_tolerance)
            .unwrap_or(3.0)
    }

    /// Minimum number of cells a row needs to count as a table row.
    pub fn effective_min_columns(&self) -> usize {
        self.min_words_horizontal.map(|n| n as usize).unwrap_or(1).max(2)
    }
}

/// Text extraction settings passed to [`PdfPage::extract_text`](crate::PdfPage::extract_text).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_tolerance: Option<f64>,
    /// Keep the page's spatial layout (blank lines between blocks).
    #[serde(default)]
    pub layout: bool,
    /// Keep runs of whitespace instead of collapsing them.
    #[serde(default)]
    pub keep_blank_chars: bool,
    /// Emit text in content-stream order rather than reading order.
    #[serde(default)]
    pub use_text_flow: bool,
}

impl TextSettings {
    pub fn layout() -> Self {
        Self {
            layout: true,
            ..Self::default()
        }
    }

    pub fn raw() -> Self {
        Self {
            keep_blank_chars: true,
            use_text_flow: true,
            ..Self::default()
        }
    }
}

/// Named table strategy choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableStrategy {
    #[default]
    Lines,
    Text,
    Custom,
}

impl TableStrategy {
    pub const CHOICES: [&'static str; 3] = ["lines", "text", "custom"];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableStrategy::Lines => "lines",
            TableStrategy::Text => "text",
            TableStrategy::Custom => "custom",
        }
    }

    /// Produce concrete settings. `custom` is only read for [`TableStrategy::Custom`].
    pub fn resolve(&self, custom: &str) -> Result<TableSettings, ConfigError> {
        match self {
            TableStrategy::Lines => Ok(TableSettings::lines()),
            TableStrategy::Text => Ok(TableSettings::text()),
            TableStrategy::Custom => parse_custom("table", custom),
        }
    }
}

impl fmt::Display for TableStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lines" => Ok(TableStrategy::Lines),
            "text" => Ok(TableStrategy::Text),
            "custom" => Ok(TableStrategy::Custom),
            _ => Err(ConfigError::UnknownTableStrategy(s.to_string())),
        }
    }
}

/// Named text strategy choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextStrategy {
    #[default]
    Default,
    Layout,
    Raw,
    Custom,
}

impl TextStrategy {
    pub const CHOICES: [&'static str; 4] = ["default", "layout", "raw", "custom"];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextStrategy::Default => "default",
            TextStrategy::Layout => "layout",
            TextStrategy::Raw => "raw",
            TextStrategy::Custom => "custom",
        }
    }

    pub fn resolve(&self, custom: &str) -> Result<TextSettings, ConfigError> {
        match self {
            TextStrategy::Default => Ok(TextSettings::default()),
            TextStrategy::Layout => Ok(TextSettings::layout()),
            TextStrategy::Raw => Ok(TextSettings::raw()),
            TextStrategy::Custom => parse_custom("text", custom),
        }
    }
}

impl fmt::Display for TextStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(TextStrategy::Default),
            "layout" => Ok(TextStrategy::Layout),
            "raw" => Ok(TextStrategy::Raw),
            "custom" => Ok(TextStrategy::Custom),
            _ => Err(ConfigError::UnknownTextStrategy(s.to_string())),
        }
    }
}

/// Strip comment and blank lines, then parse the remainder as YAML.
fn parse_custom<T: DeserializeOwned>(
    kind: &'static str,
    definition: &str,
) -> Result<T, ConfigError> {
    let cleaned = definition
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.trim().is_empty() {
        return Err(ConfigError::EmptyCustomStrategy { kind });
    }

    serde_yaml::from_str(&cleaned).map_err(|e| ConfigError::InvalidCustomStrategy {
        kind,
        message: e.to_string(),
    })
}
