//! Generated fixture images

use image::{ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::error::E2eResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureFormat {
    #[default]
    Png,
    Jpeg,
}

/// A solid-colour image rendered on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureImage {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_color")]
    pub color: [u8; 3],
    #[serde(default)]
    pub format: FixtureFormat,
}

fn default_width() -> u32 {
    48
}

fn default_height() -> u32 {
    64
}

fn default_color() -> [u8; 3] {
    [128, 128, 128]
}

impl Default for FixtureImage {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            color: default_color(),
            format: FixtureFormat::default(),
        }
    }
}

impl FixtureImage {
    pub fn solid(color: [u8; 3]) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    pub fn extension(&self) -> &'static str {
        match self.format {
            FixtureFormat::Png => "png",
            FixtureFormat::Jpeg => "jpg",
        }
    }

    /// Encode the image
    pub fn render(&self) -> E2eResult<Vec<u8>> {
        let img = RgbImage::from_pixel(self.width.max(1), self.height.max(1), Rgb(self.color));
        let format = match self.format {
            FixtureFormat::Png => ImageFormat::Png,
            FixtureFormat::Jpeg => ImageFormat::Jpeg,
        };

        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format)?;
        Ok(buf.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_decodes_back() {
        let fixture = FixtureImage {
            width: 8,
            height: 4,
            color: [10, 20, 30],
            format: FixtureFormat::Png,
        };
        let bytes = fixture.render().unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 4));
        assert_eq!(decoded.get_pixel(3, 2), &Rgb([10, 20, 30]));
    }
}
