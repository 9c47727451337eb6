//! 2D texture resources.
//!
//! A texture holds a decoded, GPU-ready pixel buffer plus the sampler state
//! declared alongside it. The pixel payload is produced by
//! [`TextureConverter`](crate::convert::texture::TextureConverter) and round
//! trips through the fastfile encoding unchanged.

use crate::errors::{KilnError, Result};
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::resources::SourceRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Rgba8,
    Rgba8Srgb,
}

impl PixelFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> u32 {
        4
    }

    pub(crate) fn to_tag(self) -> u8 {
        match self {
            PixelFormat::Rgba8 => 0,
            PixelFormat::Rgba8Srgb => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8, label: &str) -> Result<Self> {
        match tag {
            0 => Ok(PixelFormat::Rgba8),
            1 => Ok(PixelFormat::Rgba8Srgb),
            other => Err(KilnError::Load {
                name: label.to_string(),
                message: format!("unknown pixel format tag {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

/// Sampler state declared with the texture. Changing any of these in the
/// description file changes the cache key, exactly like editing the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDesc {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl SamplerDesc {
    fn to_tags(self) -> [u8; 4] {
        let f = |m: FilterMode| match m {
            FilterMode::Nearest => 0u8,
            FilterMode::Linear => 1,
        };
        let w = |m: WrapMode| match m {
            WrapMode::Repeat => 0u8,
            WrapMode::ClampToEdge => 1,
            WrapMode::MirroredRepeat => 2,
        };
        [
            f(self.min_filter),
            f(self.mag_filter),
            w(self.wrap_s),
            w(self.wrap_t),
        ]
    }

    fn from_tags(tags: [u8; 4], label: &str) -> Result<Self> {
        let f = |tag: u8| match tag {
            0 => Ok(FilterMode::Nearest),
            1 => Ok(FilterMode::Linear),
            other => Err(KilnError::Load {
                name: label.to_string(),
                message: format!("unknown filter tag {other}"),
            }),
        };
        let w = |tag: u8| match tag {
            0 => Ok(WrapMode::Repeat),
            1 => Ok(WrapMode::ClampToEdge),
            2 => Ok(WrapMode::MirroredRepeat),
            other => Err(KilnError::Load {
                name: label.to_string(),
                message: format!("unknown wrap tag {other}"),
            }),
        };
        Ok(Self {
            min_filter: f(tags[0])?,
            mag_filter: f(tags[1])?,
            wrap_s: w(tags[2])?,
            wrap_t: w(tags[3])?,
        })
    }
}

/// A decoded 2D texture.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Number of mip levels the renderer should generate/upload. 1 means
    /// no mipmapping; otherwise the full chain down to 1×1.
    pub mip_level_count: u32,
    pub sampler: SamplerDesc,
    /// Tightly packed level-0 pixels, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
    pub source: Option<SourceRef>,
}

impl Texture {
    /// Full mip chain length for the given dimensions.
    #[must_use]
    pub fn full_mip_count(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }

    /// The flat-color stand-in used when a texture fails to load: a single
    /// magenta pixel, unmistakable in any scene.
    #[must_use]
    pub fn fallback(name: &str) -> Self {
        Self {
            name: name.to_string(),
            width: 1,
            height: 1,
            format: PixelFormat::Rgba8,
            mip_level_count: 1,
            sampler: SamplerDesc::default(),
            pixels: vec![0xFF, 0x00, 0xFF, 0xFF],
            source: None,
        }
    }

    pub fn serialize(&self, w: &mut FastfileWriter) {
        w.write_str(&self.name);
        w.write_u32(self.width);
        w.write_u32(self.height);
        w.write_u8(self.format.to_tag());
        w.write_u32(self.mip_level_count);
        for tag in self.sampler.to_tags() {
            w.write_u8(tag);
        }
        w.write_bytes(&self.pixels);
    }

    pub fn deserialize(r: &mut FastfileReader<'_>) -> Result<Self> {
        let name = r.read_str()?;
        let width = r.read_u32()?;
        let height = r.read_u32()?;
        let format = PixelFormat::from_tag(r.read_u8()?, &name)?;
        let mip_level_count = r.read_u32()?;
        let tags = [r.read_u8()?, r.read_u8()?, r.read_u8()?, r.read_u8()?];
        let sampler = SamplerDesc::from_tags(tags, &name)?;
        let pixels = r.read_bytes()?;

        let expected = (width as usize) * (height as usize) * 4;
        if pixels.len() != expected {
            return Err(KilnError::Load {
                name,
                message: format!(
                    "pixel payload is {} bytes, expected {expected} for {width}x{height}",
                    pixels.len()
                ),
            });
        }

        Ok(Self {
            name,
            width,
            height,
            format,
            mip_level_count,
            sampler,
            pixels,
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mip_count_covers_chain() {
        assert_eq!(Texture::full_mip_count(1, 1), 1);
        assert_eq!(Texture::full_mip_count(256, 256), 9);
        assert_eq!(Texture::full_mip_count(640, 480), 10);
    }

    #[test]
    fn payload_round_trip() {
        let tex = Texture {
            name: "brick".to_string(),
            width: 2,
            height: 1,
            format: PixelFormat::Rgba8Srgb,
            mip_level_count: 2,
            sampler: SamplerDesc {
                min_filter: FilterMode::Nearest,
                wrap_s: WrapMode::ClampToEdge,
                ..SamplerDesc::default()
            },
            pixels: vec![0; 8],
            source: None,
        };

        let mut w = FastfileWriter::section();
        tex.serialize(&mut w);
        let bytes = w.into_bytes();

        let mut r = FastfileReader::section(&bytes, "brick");
        let back = Texture::deserialize(&mut r).unwrap();
        assert_eq!(back.name, "brick");
        assert_eq!(back.sampler, tex.sampler);
        assert_eq!(back.mip_level_count, 2);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut w = FastfileWriter::section();
        let mut tex = Texture::fallback("bad");
        tex.width = 16; // lies about its payload
        tex.serialize(&mut w);
        let bytes = w.into_bytes();
        let mut r = FastfileReader::section(&bytes, "bad");
        assert!(Texture::deserialize(&mut r).is_err());
    }
}
