use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pipeline::{IdPhotoSize, ImageMime};
use crate::providers::prompts::DEFAULT_TEXT_TO_IMAGE_PROMPT;
use crate::providers::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    Compress,
    Upscale,
    Restore,
    RemoveBg,
    RemoveObject,
    IdPhoto,
    Resize,
    Convert,
    TextToImage,
    Meme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Optimize,
    Modify,
    Create,
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolEntry {
    pub tool: Tool,
    pub category: ToolCategory,
    pub needs_source: bool,
    pub uses_provider: bool,
}

pub const TOOL_CATALOG: [ToolEntry; 10] = [
    ToolEntry {
        tool: Tool::Compress,
        category: ToolCategory::Optimize,
        needs_source: true,
        uses_provider: false,
    },
    ToolEntry {
        tool: Tool::Upscale,
        category: ToolCategory::Optimize,
        needs_source: true,
        uses_provider: true,
    },
    ToolEntry {
        tool: Tool::Restore,
        category: ToolCategory::Optimize,
        needs_source: true,
        uses_provider: true,
    },
    ToolEntry {
        tool: Tool::RemoveBg,
        category: ToolCategory::Modify,
        needs_source: true,
        uses_provider: true,
    },
    ToolEntry {
        tool: Tool::RemoveObject,
        category: ToolCategory::Modify,
        needs_source: true,
        uses_provider: true,
    },
    ToolEntry {
        tool: Tool::IdPhoto,
        category: ToolCategory::Create,
        needs_source: true,
        uses_provider: true,
    },
    ToolEntry {
        tool: Tool::Resize,
        category: ToolCategory::Modify,
        needs_source: true,
        uses_provider: false,
    },
    ToolEntry {
        tool: Tool::Convert,
        category: ToolCategory::Convert,
        needs_source: true,
        uses_provider: false,
    },
    ToolEntry {
        tool: Tool::TextToImage,
        category: ToolCategory::Create,
        needs_source: false,
        uses_provider: true,
    },
    ToolEntry {
        tool: Tool::Meme,
        category: ToolCategory::Create,
        needs_source: true,
        uses_provider: true,
    },
];

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Upscale => "upscale",
            Self::Restore => "restore",
            Self::RemoveBg => "remove-bg",
            Self::RemoveObject => "remove-object",
            Self::IdPhoto => "id-photo",
            Self::Resize => "resize",
            Self::Convert => "convert",
            Self::TextToImage => "text-to-image",
            Self::Meme => "meme",
        }
    }

    pub fn entry(self) -> ToolEntry {
        TOOL_CATALOG
            .iter()
            .copied()
            .find(|entry| entry.tool == self)
            .unwrap_or(ToolEntry {
                tool: self,
                category: ToolCategory::Modify,
                needs_source: true,
                uses_provider: false,
            })
    }

    pub fn category(self) -> ToolCategory {
        self.entry().category
    }

    pub fn needs_source(self) -> bool {
        self.entry().needs_source
    }

    pub fn uses_provider(self) -> bool {
        self.entry().uses_provider
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        TOOL_CATALOG
            .iter()
            .map(|entry| entry.tool)
            .find(|tool| tool.as_str() == raw.trim())
            .ok_or_else(|| format!("unknown tool '{}'", raw.trim()))
    }
}

pub fn tools_in(category: ToolCategory) -> Vec<Tool> {
    TOOL_CATALOG
        .iter()
        .filter(|entry| entry.category == category)
        .map(|entry| entry.tool)
        .collect()
}

/// Per-tool parameters. Values are trusted as given; range checks belong to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParams {
    pub provider: Option<ProviderKind>,
    pub target_kb: u32,
    pub id_color: String,
    pub id_size: IdPhotoSize,
    pub resize_width: u32,
    pub resize_height: u32,
    pub lock_aspect: bool,
    pub object_description: String,
    pub target_mime: ImageMime,
    pub quality: f32,
    pub prompt: String,
    pub generation_size: Option<String>,
    pub meme_top_text: String,
    pub meme_bottom_text: String,
}

impl Default for ToolParams {
    fn default() -> Self {
        Self {
            provider: None,
            target_kb: 100,
            id_color: String::from("white"),
            id_size: IdPhotoSize::default(),
            resize_width: 1000,
            resize_height: 1000,
            lock_aspect: false,
            object_description: String::new(),
            target_mime: ImageMime::Jpeg,
            quality: 0.92,
            prompt: String::from(DEFAULT_TEXT_TO_IMAGE_PROMPT),
            generation_size: None,
            meme_top_text: String::new(),
            meme_bottom_text: String::new(),
        }
    }
}

impl ToolParams {
    /// Target size for a resize, following the width when the aspect is locked.
    pub fn resize_dimensions(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        if !self.lock_aspect || source_width == 0 || source_height == 0 {
            return (self.resize_width, self.resize_height);
        }
        let ratio = f64::from(source_width) / f64::from(source_height);
        let height = (f64::from(self.resize_width) / ratio).round().max(1.0) as u32;
        (self.resize_width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_every_tool_once() {
        for entry in TOOL_CATALOG {
            let matches = TOOL_CATALOG
                .iter()
                .filter(|other| other.tool == entry.tool)
                .count();
            assert_eq!(matches, 1, "{}", entry.tool);
            assert_eq!(entry.tool.as_str().parse::<Tool>(), Ok(entry.tool));
        }
    }

    #[test]
    fn categories_follow_gallery_grouping() {
        assert_eq!(
            tools_in(ToolCategory::Optimize),
            vec![Tool::Compress, Tool::Upscale, Tool::Restore]
        );
        assert_eq!(tools_in(ToolCategory::Convert), vec![Tool::Convert]);
        assert_eq!(Tool::IdPhoto.category(), ToolCategory::Create);
        assert_eq!(Tool::Resize.category(), ToolCategory::Modify);
    }

    #[test]
    fn only_text_to_image_runs_without_source() {
        let sourceless = TOOL_CATALOG
            .iter()
            .filter(|entry| !entry.needs_source)
            .map(|entry| entry.tool)
            .collect::<Vec<_>>();
        assert_eq!(sourceless, vec![Tool::TextToImage]);
    }

    #[test]
    fn serde_ids_are_kebab_case() {
        assert_eq!(
            serde_json::to_value(Tool::RemoveBg).expect("serialize"),
            serde_json::json!("remove-bg")
        );
        assert_eq!("text-to-image".parse::<Tool>(), Ok(Tool::TextToImage));
        assert!("editor".parse::<Tool>().is_err());
    }

    #[test]
    fn defaults_match_the_editor_panel() {
        let params = ToolParams::default();
        assert_eq!(params.target_kb, 100);
        assert_eq!(params.id_color, "white");
        assert_eq!((params.id_size.px_width, params.id_size.px_height), (295, 413));
        assert_eq!(params.target_mime, ImageMime::Jpeg);
        assert!((params.quality - 0.92).abs() < f32::EPSILON);
        assert_eq!(params.prompt, "beautiful landscape, high quality");
    }

    #[test]
    fn locked_aspect_derives_height_from_width() {
        let params = ToolParams {
            resize_width: 400,
            resize_height: 1,
            lock_aspect: true,
            ..ToolParams::default()
        };
        assert_eq!(params.resize_dimensions(1600, 1200), (400, 300));

        let free = ToolParams {
            lock_aspect: false,
            ..params
        };
        assert_eq!(free.resize_dimensions(1600, 1200), (400, 1));
    }
}
