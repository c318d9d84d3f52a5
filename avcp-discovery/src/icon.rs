//! Device icon selection.

use serde::Serialize;

/// One `<icon>` entry of a device description, URL already absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Icon {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub url: String,
}

impl Icon {
    pub fn is_png(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("image/png")
    }

    pub fn is_jpeg(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("image/jpeg")
            || self.mime_type.eq_ignore_ascii_case("image/jpg")
    }

    /// `width * height * depth`, the quantity icons are ranked by.
    ///
    /// Three `u32` factors always fit in a `u128`.
    pub fn weight(&self) -> u128 {
        u128::from(self.width) * u128::from(self.height) * u128::from(self.depth)
    }
}

/// Policy picking the icon a device is represented by.
///
/// Installed on an engine with `DiscoveryEngine::set_icon_filter`; the engine
/// applies it once per loaded device description.
pub trait IconFilter: Send + Sync {
    fn select<'a>(&self, icons: &'a [Icon]) -> Option<&'a Icon>;
}

/// Prefers PNG or JPEG, then the largest `width * height * depth`.
///
/// Equal weights prefer PNG over JPEG. When two candidates are equal on
/// both, the one declared first in the description wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferredIconFilter;

impl IconFilter for PreferredIconFilter {
    fn select<'a>(&self, icons: &'a [Icon]) -> Option<&'a Icon> {
        icons
            .iter()
            .filter(|icon| icon.is_png() || icon.is_jpeg())
            .fold(None, |best: Option<&Icon>, icon| match best {
                Some(current) if rank(icon) <= rank(current) => Some(current),
                _ => Some(icon),
            })
    }
}

fn rank(icon: &Icon) -> (u128, bool) {
    (icon.weight(), icon.is_png())
}

/// Keeps no icon at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIconFilter;

impl IconFilter for NoIconFilter {
    fn select<'a>(&self, _icons: &'a [Icon]) -> Option<&'a Icon> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn icon(mime_type: &str, size: u32, depth: u32, url: &str) -> Icon {
        Icon {
            mime_type: mime_type.to_string(),
            width: size,
            height: size,
            depth,
            url: url.to_string(),
        }
    }

    #[test]
    fn test_jpeg_beats_smaller_png_and_bmp_is_excluded() {
        let icons = vec![
            icon("image/png", 100, 24, "png"),
            icon("image/jpeg", 200, 24, "jpeg"),
            icon("image/bmp", 500, 32, "bmp"),
        ];

        let selected = PreferredIconFilter.select(&icons).unwrap();
        assert_eq!(selected.url, "jpeg");
    }

    #[test]
    fn test_equal_pngs_keep_first_declared() {
        let icons = vec![
            icon("image/png", 120, 24, "first"),
            icon("image/png", 120, 24, "second"),
        ];

        assert_eq!(PreferredIconFilter.select(&icons).unwrap().url, "first");
    }

    #[rstest]
    #[case::png_first(vec![icon("image/png", 48, 24, "png"), icon("image/jpeg", 48, 24, "jpeg")])]
    #[case::jpeg_first(vec![icon("image/jpeg", 48, 24, "jpeg"), icon("image/png", 48, 24, "png")])]
    fn test_equal_weight_prefers_png(#[case] icons: Vec<Icon>) {
        assert_eq!(PreferredIconFilter.select(&icons).unwrap().url, "png");
    }

    #[test]
    fn test_depth_counts_in_weight() {
        let icons = vec![
            icon("image/png", 64, 8, "shallow"),
            icon("image/png", 64, 32, "deep"),
        ];

        assert_eq!(PreferredIconFilter.select(&icons).unwrap().url, "deep");
    }

    #[test]
    fn test_extreme_dimensions_rank_without_overflow() {
        let icons = vec![
            icon("image/png", 1, 1, "tiny"),
            icon("image/png", u32::MAX, u32::MAX, "huge"),
            icon("image/jpeg", u32::MAX, u32::MAX - 1, "huge-jpeg"),
        ];

        assert_eq!(PreferredIconFilter.select(&icons).unwrap().url, "huge");
        assert_eq!(icons[1].weight(), u128::from(u32::MAX).pow(3));
    }

    #[test]
    fn test_no_supported_format() {
        let icons = vec![icon("image/bmp", 500, 32, "bmp"), icon("image/gif", 32, 8, "gif")];
        assert!(PreferredIconFilter.select(&icons).is_none());
        assert!(PreferredIconFilter.select(&[]).is_none());
    }

    #[test]
    fn test_mime_type_case_insensitive() {
        let icons = vec![icon("IMAGE/PNG", 16, 24, "upper")];
        assert_eq!(PreferredIconFilter.select(&icons).unwrap().url, "upper");
    }

    #[test]
    fn test_no_icon_filter() {
        let icons = vec![icon("image/png", 16, 24, "png")];
        assert!(NoIconFilter.select(&icons).is_none());
    }
}
