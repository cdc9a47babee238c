use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdPhotoSize {
    pub id: &'static str,
    pub label_zh: &'static str,
    pub label_en: &'static str,
    pub mm_width: u32,
    pub mm_height: u32,
    pub px_width: u32,
    pub px_height: u32,
}

pub const ID_PHOTO_SIZES: [IdPhotoSize; 6] = [
    IdPhotoSize {
        id: "1in_s",
        label_zh: "小1寸",
        label_en: "Small 1\"",
        mm_width: 22,
        mm_height: 32,
        px_width: 260,
        px_height: 378,
    },
    IdPhotoSize {
        id: "1in",
        label_zh: "1寸",
        label_en: "1\"",
        mm_width: 25,
        mm_height: 35,
        px_width: 295,
        px_height: 413,
    },
    IdPhotoSize {
        id: "2in_s",
        label_zh: "小2寸",
        label_en: "Small 2\"",
        mm_width: 33,
        mm_height: 48,
        px_width: 390,
        px_height: 567,
    },
    IdPhotoSize {
        id: "2in",
        label_zh: "2寸",
        label_en: "2\"",
        mm_width: 35,
        mm_height: 49,
        px_width: 413,
        px_height: 579,
    },
    IdPhotoSize {
        id: "passport",
        label_zh: "护照/大2寸",
        label_en: "Passport",
        mm_width: 35,
        mm_height: 45,
        px_width: 413,
        px_height: 531,
    },
    IdPhotoSize {
        id: "visa_us",
        label_zh: "美国签证",
        label_en: "US Visa",
        mm_width: 51,
        mm_height: 51,
        px_width: 600,
        px_height: 600,
    },
];

impl IdPhotoSize {
    pub const DEFAULT_ID: &'static str = "1in";

    /// An ad hoc target; physical size unknown.
    pub fn custom(px_width: u32, px_height: u32) -> Self {
        Self {
            id: "custom",
            label_zh: "自定义",
            label_en: "Custom",
            mm_width: 0,
            mm_height: 0,
            px_width,
            px_height,
        }
    }
}

impl Default for IdPhotoSize {
    fn default() -> Self {
        ID_PHOTO_SIZES[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResizePreset {
    pub id: &'static str,
    pub label_zh: &'static str,
    pub label_en: &'static str,
    pub width: u32,
    pub height: u32,
}

pub const RESIZE_PRESETS: [ResizePreset; 5] = [
    ResizePreset {
        id: "1in",
        label_zh: "1寸",
        label_en: "1\"",
        width: 295,
        height: 413,
    },
    ResizePreset {
        id: "2in",
        label_zh: "2寸",
        label_en: "2\"",
        width: 413,
        height: 579,
    },
    ResizePreset {
        id: "hd",
        label_zh: "720P",
        label_en: "720P",
        width: 1280,
        height: 720,
    },
    ResizePreset {
        id: "fhd",
        label_zh: "1080P",
        label_en: "1080P",
        width: 1920,
        height: 1080,
    },
    ResizePreset {
        id: "square",
        label_zh: "方形",
        label_en: "1:1",
        width: 1000,
        height: 1000,
    },
];

pub fn find_id_photo_size(id: &str) -> Option<IdPhotoSize> {
    ID_PHOTO_SIZES
        .iter()
        .copied()
        .find(|size| size.id.eq_ignore_ascii_case(id.trim()))
}

pub fn find_resize_preset(id: &str) -> Option<ResizePreset> {
    RESIZE_PRESETS
        .iter()
        .copied()
        .find(|preset| preset.id.eq_ignore_ascii_case(id.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_id_size_is_one_inch() {
        let size = IdPhotoSize::default();
        assert_eq!(size.id, IdPhotoSize::DEFAULT_ID);
        assert_eq!((size.px_width, size.px_height), (295, 413));
    }

    #[test]
    fn lookups_are_case_insensitive() {
        assert_eq!(
            find_id_photo_size("PASSPORT").map(|s| (s.px_width, s.px_height)),
            Some((413, 531))
        );
        assert_eq!(
            find_resize_preset(" fhd ").map(|p| (p.width, p.height)),
            Some((1920, 1080))
        );
        assert!(find_id_photo_size("3in").is_none());
    }

    #[test]
    fn id_sizes_are_portrait_or_square() {
        for size in ID_PHOTO_SIZES {
            assert!(size.px_height >= size.px_width, "{}", size.id);
            assert!(size.mm_height >= size.mm_width, "{}", size.id);
        }
    }
}
