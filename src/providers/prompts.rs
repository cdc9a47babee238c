//! Operation prompt table shared by both provider variants.
//!
//! Single-call providers send `instruction` with the source image. Describe-then-generate
//! providers send `describe_prompt` to a vision model first, then wrap the returned
//! description with `generation_prefix`/`generation_suffix` for a text-to-image model.

use crate::providers::ProviderOperation;

pub const DEFAULT_ASPECT_RATIO: &str = "1:1";
pub const ID_PHOTO_ASPECT_RATIO: &str = "3:4";
pub const DEFAULT_GENERATION_SIZE: &str = "1024x1024";
pub const DEFAULT_TEXT_TO_IMAGE_PROMPT: &str = "beautiful landscape, high quality";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPlan {
    pub instruction: String,
    pub aspect_ratio: &'static str,
    pub describe_prompt: Option<&'static str>,
    pub generation_prefix: String,
    pub generation_suffix: String,
    pub size: Option<String>,
}

impl PromptPlan {
    pub fn compose_generation_prompt(&self, description: &str) -> String {
        format!(
            "{}{}{}",
            self.generation_prefix, description, self.generation_suffix
        )
    }
}

/// Chinese background colour name for the ID-photo generation prompt.
pub fn id_background_name(color: &str) -> &'static str {
    match color.trim().to_ascii_lowercase().as_str() {
        "white" => "纯白色",
        "#3b82f6" => "蓝色",
        "#ef4444" => "红色",
        _ => "白色",
    }
}

pub fn prompt_plan(operation: &ProviderOperation) -> PromptPlan {
    match operation {
        ProviderOperation::RemoveBackground => PromptPlan {
            instruction: String::from(
                "Extract the main subject and remove everything else from the background. Output ONLY the subject with a pure transparent background.",
            ),
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            describe_prompt: Some(
                "请详细描述这张图片中的主体（人物/物体），包括外观、姿态、表情等细节。不要描述背景。",
            ),
            generation_prefix: String::new(),
            generation_suffix: String::from("\n专业抠图效果，主体清晰，背景完全透明，PNG格式。"),
            size: None,
        },
        ProviderOperation::IdPhoto { color } => PromptPlan {
            instruction: format!(
                "Remove background and replace with solid {color}. Perform light professional face retouching and center the subject for an ID photo."
            ),
            aspect_ratio: ID_PHOTO_ASPECT_RATIO,
            describe_prompt: Some(
                "请详细描述这张证件照中的人物，包括面部特征、发型、表情、服装等。",
            ),
            generation_prefix: String::from("专业证件照，"),
            generation_suffix: format!(
                "，正面半身像，{}背景，光线均匀，高清晰度，标准证件照比例 3:4",
                id_background_name(color)
            ),
            size: Some(String::from("768x1024")),
        },
        ProviderOperation::Upscale => PromptPlan {
            instruction: String::from("Upscale this image, enhance details, and remove noise."),
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            describe_prompt: Some(
                "请详细描述这张图片的所有内容，包括主体、背景、色彩、构图、细节等。",
            ),
            generation_prefix: String::new(),
            generation_suffix: String::from("\n超高分辨率，4K画质，细节丰富，清晰锐利，专业摄影质感。"),
            size: Some(String::from("1536x1536")),
        },
        ProviderOperation::RestorePhoto => PromptPlan {
            instruction: String::from(
                "Restore this old photo: remove scratches, fix damages, sharpen blurry parts, and add natural colors if it's black and white.",
            ),
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            describe_prompt: Some("请详细描述这张老照片中的内容和场景。"),
            generation_prefix: String::from("修复后的照片："),
            generation_suffix: String::from(
                "\n去除划痕和污渍，修复破损，增强清晰度，如果是黑白则自然上色。保持原照片的真实感和年代感。",
            ),
            size: None,
        },
        ProviderOperation::RemoveObject { description } => PromptPlan {
            instruction: format!(
                "Smartly remove \"{description}\" from this image and fill the gap seamlessly with surrounding background textures."
            ),
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            describe_prompt: Some(
                "请详细描述这张图片的完整场景，包括主体、背景、环境布局等。",
            ),
            generation_prefix: String::new(),
            generation_suffix: format!(
                "\n注意：图片中的\"{description}\"已被移除，该区域由周围背景自然填充，画面完整和谐，看不出移除痕迹。"
            ),
            size: None,
        },
        ProviderOperation::TextToImage { prompt, size } => PromptPlan {
            instruction: prompt.clone(),
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            describe_prompt: None,
            generation_prefix: String::new(),
            generation_suffix: String::new(),
            size: size.clone(),
        },
        ProviderOperation::Meme {
            top_text,
            bottom_text,
        } => PromptPlan {
            instruction: format!(
                "Add professional-looking meme text: \"{top_text}\" at the top and \"{bottom_text}\" at the bottom."
            ),
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            describe_prompt: Some("请简要描述这张图片的内容和风格。"),
            generation_prefix: String::new(),
            generation_suffix: format!(
                "\n在图片顶部添加\"{top_text}\"文字，底部添加\"{bottom_text}\"文字。文字为白色，黑色描边，粗体，清晰易读。保持原图内容和风格不变。"
            ),
            size: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn id_photo_plan_uses_portrait_size_and_colour_name() {
        let plan = prompt_plan(&ProviderOperation::IdPhoto {
            color: String::from("#3b82f6"),
        });
        assert_eq!(plan.size.as_deref(), Some("768x1024"));
        assert_eq!(plan.aspect_ratio, "3:4");
        assert_eq!(
            plan.compose_generation_prompt("短发男性"),
            "专业证件照，短发男性，正面半身像，蓝色背景，光线均匀，高清晰度，标准证件照比例 3:4"
        );
        assert!(plan.instruction.contains("solid #3b82f6"));
    }

    #[test]
    fn unknown_colour_falls_back_to_plain_white() {
        assert_eq!(id_background_name("white"), "纯白色");
        assert_eq!(id_background_name("#EF4444"), "红色");
        assert_eq!(id_background_name("#00ff00"), "白色");
    }

    #[test]
    fn remove_object_prompt_names_the_removed_object() {
        let plan = prompt_plan(&ProviderOperation::RemoveObject {
            description: String::from("路人"),
        });
        let prompt = plan.compose_generation_prompt("海滩上的日落");
        assert!(prompt.starts_with("海滩上的日落\n注意：图片中的\"路人\"已被移除"));
        assert!(plan.instruction.starts_with("Smartly remove \"路人\""));
    }

    #[test]
    fn empty_description_still_composes_directive() {
        let plan = prompt_plan(&ProviderOperation::RemoveBackground);
        assert_eq!(
            plan.compose_generation_prompt(""),
            "\n专业抠图效果，主体清晰，背景完全透明，PNG格式。"
        );
    }

    #[test]
    fn text_to_image_passes_prompt_through() {
        let plan = prompt_plan(&ProviderOperation::TextToImage {
            prompt: String::from(DEFAULT_TEXT_TO_IMAGE_PROMPT),
            size: Some(String::from("1024x768")),
        });
        assert_eq!(plan.describe_prompt, None);
        assert_eq!(
            plan.compose_generation_prompt(""),
            DEFAULT_TEXT_TO_IMAGE_PROMPT
        );
        assert_eq!(plan.size.as_deref(), Some("1024x768"));
    }

    #[test]
    fn upscale_plan_requests_large_square() {
        let plan = prompt_plan(&ProviderOperation::Upscale);
        assert_eq!(plan.size.as_deref(), Some("1536x1536"));
        assert!(plan.describe_prompt.is_some());
    }
}
