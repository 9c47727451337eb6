//! Texture conversion.
//!
//! Decodes the source image (png/jpeg) to a tightly packed RGBA8 buffer,
//! the GPU-ready layout, and records sampler state and mip count from the
//! declaration. Pixel decode happens here, once, at conversion time; loads
//! only read back the cached buffer.

use std::path::PathBuf;

use crate::convert::{AssetStatus, Converter, ConverterCore, ConvertStatus};
use crate::database::ResourceDatabase;
use crate::errors::{KilnError, Result};
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::manifest::{ResourceDecl, TextureDecl};
use crate::resources::{PixelFormat, ResourceKind, Texture};
use crate::settings::PipelineSettings;

pub struct TextureConverter {
    decl: TextureDecl,
    source_path: PathBuf,
    core: ConverterCore,
}

impl TextureConverter {
    #[must_use]
    pub fn new(decl: TextureDecl, settings: &PipelineSettings) -> Self {
        let source_path = settings.resolve_source(&decl.filename);
        let core = ConverterCore::new(
            ResourceKind::Texture,
            decl.name.clone(),
            settings,
            &source_path,
            vec![source_path.clone()],
            &ResourceDecl::Texture(decl.clone()).params_key(),
        );
        Self {
            decl,
            source_path,
            core,
        }
    }
}

impl Converter for TextureConverter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Texture
    }

    fn name(&self) -> &str {
        &self.decl.name
    }

    fn check_dependencies(&mut self) -> AssetStatus {
        self.core.check().status
    }

    fn convert(&mut self, force: bool) -> ConvertStatus {
        let decl = &self.decl;
        let source_path = &self.source_path;
        self.core.run_convert(force, || {
            let img = image::open(source_path).map_err(|err| KilnError::Convert {
                name: decl.name.clone(),
                message: format!("cannot decode {}: {err}", source_path.display()),
            })?;
            let rgba = img.to_rgba8();
            let (width, height) = rgba.dimensions();

            let texture = Texture {
                name: decl.name.clone(),
                width,
                height,
                format: if decl.srgb {
                    PixelFormat::Rgba8Srgb
                } else {
                    PixelFormat::Rgba8
                },
                mip_level_count: if decl.mipmapped {
                    Texture::full_mip_count(width, height)
                } else {
                    1
                },
                sampler: decl.sampler,
                pixels: rgba.into_raw(),
                source: None,
            };

            let mut w = FastfileWriter::new();
            texture.serialize(&mut w);
            Ok(w.into_bytes())
        })
    }

    fn load_into(&self, staging: &ResourceDatabase) -> Result<()> {
        let payload = self.core.read_artifact_payload()?;
        let mut reader = FastfileReader::section(&payload, &self.decl.name);
        let mut texture = Texture::deserialize(&mut reader)?;
        texture.source = Some(self.core.source_ref(ResourceDecl::Texture(self.decl.clone())));
        staging.textures.insert(texture.name.clone(), texture);
        Ok(())
    }

    fn artifact_payload(&self) -> Result<Vec<u8>> {
        self.core.read_artifact_payload()
    }

    fn stage_fallback(&self, staging: &ResourceDatabase) {
        staging
            .textures
            .insert(self.decl.name.clone(), Texture::fallback(&self.decl.name));
    }
}
