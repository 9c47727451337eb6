//! Composite Conversion ("fastfiles")
//!
//! A composite converter owns one description file's worth of per-kind
//! converters and drives them as a unit: staleness aggregates across every
//! sub-converter, and `convert` additionally bundles the individually
//! cached artifacts into one combined fastfile for shipping loads.
//!
//! Combined layout: magic + version, then five `u32` section counts
//! (shaders, textures, materials, models, scripts), then the concatenated
//! per-kind payloads in that fixed order. The write is atomic (compose to
//! a `.tmp` sibling, rename over the target) so a failed conversion never
//! leaves a combined file describing a subset of the declared resources.

use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_64;

use crate::convert::{converter_for, AssetStatus, Converter, ConvertStatus};
use crate::database::ResourceDatabase;
use crate::errors::Result;
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::manifest::{self, Manifest};
use crate::resources::{Material, Model, ResourceKind, Script, Shader, Texture};
use crate::settings::PipelineSettings;

pub struct CompositeConverter {
    manifest: Manifest,
    converters: Vec<Box<dyn Converter>>,
    output_path: PathBuf,
    settings: PipelineSettings,
}

impl CompositeConverter {
    /// Parses the description file at `path` and builds one converter per
    /// declaration.
    pub fn from_file(path: impl AsRef<Path>, settings: &PipelineSettings) -> Result<Self> {
        let manifest = manifest::parse_manifest(path)?;
        Ok(Self::from_manifest(manifest, settings))
    }

    #[must_use]
    pub fn from_manifest(manifest: Manifest, settings: &PipelineSettings) -> Self {
        let converters = manifest
            .decls
            .iter()
            .map(|decl| converter_for(decl, &manifest.path, settings))
            .collect();
        let output_path = combined_path(settings, &manifest.path);
        Self {
            manifest,
            converters,
            output_path,
            settings: settings.clone(),
        }
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Where the combined fastfile for this manifest lands.
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Aggregate dependency check: a single checking failure dominates,
    /// otherwise any stale sub-converter makes the whole composite stale.
    pub fn check_dependencies(&mut self) -> AssetStatus {
        let mut aggregate = AssetStatus::UpToDate;
        for conv in &mut self.converters {
            match conv.check_dependencies() {
                AssetStatus::CheckingError => return AssetStatus::CheckingError,
                AssetStatus::OutOfDate => aggregate = AssetStatus::OutOfDate,
                AssetStatus::UpToDate => {}
            }
        }
        // The combined file itself can lag the individual artifacts, e.g.
        // after a crash between sub-convert and bundle.
        if aggregate == AssetStatus::UpToDate && !self.output_path.exists() {
            aggregate = AssetStatus::OutOfDate;
        }
        aggregate
    }

    /// Converts every stale sub-converter (all of them under `force`), then
    /// bundles the artifacts. Fails atomically: on any sub-converter
    /// failure no combined file is written and a previous valid one is left
    /// untouched.
    pub fn convert(&mut self, force: bool) -> ConvertStatus {
        let mut worst = ConvertStatus::Success;
        for conv in &mut self.converters {
            match conv.convert(force) {
                ConvertStatus::Success | ConvertStatus::HelpDisplayed => {}
                status @ ConvertStatus::ParseError => {
                    log::error!(
                        "composite {}: {} \"{}\" failed to parse",
                        self.manifest.path.display(),
                        conv.kind(),
                        conv.name()
                    );
                    worst = status;
                }
                status @ ConvertStatus::Error => {
                    log::error!(
                        "composite {}: {} \"{}\" failed to convert",
                        self.manifest.path.display(),
                        conv.kind(),
                        conv.name()
                    );
                    worst = status;
                }
            }
        }
        if worst != ConvertStatus::Success {
            return worst;
        }

        match self.write_combined() {
            Ok(()) => ConvertStatus::Success,
            Err(err) => {
                log::error!("composite {}: {err}", self.manifest.path.display());
                ConvertStatus::Error
            }
        }
    }

    fn write_combined(&self) -> Result<()> {
        let mut writer = FastfileWriter::new();

        // counts first, payloads after, fixed kind order
        let mut counts = [0u32; 5];
        let mut sections: Vec<Vec<u8>> = Vec::new();
        for (slot, kind) in ResourceKind::ALL.iter().enumerate() {
            for conv in &self.converters {
                if conv.kind() == *kind {
                    sections.push(conv.artifact_payload()?);
                    counts[slot] += 1;
                }
            }
        }
        for count in counts {
            writer.write_u32(count);
        }
        let mut body = FastfileWriter::section();
        for section in &sections {
            // length-prefixed so a reader can skip a corrupt entry
            body.write_bytes(section);
        }
        writer.write_section(&body);

        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.output_path.with_extension("ff.tmp");
        if let Err(err) = std::fs::write(&tmp, writer.into_bytes()) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        if let Err(err) = std::fs::rename(&tmp, &self.output_path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    /// Runs the full per-resource pipeline into `staging`: claim the name
    /// against `live` (skipping work another loader already claimed), check,
    /// convert, load. Load failures degrade to the kind's fallback so one
    /// bad asset never sinks the batch. Returns how many resources were
    /// staged.
    pub fn stage_into(
        &mut self,
        live: &ResourceDatabase,
        staging: &ResourceDatabase,
        force: bool,
    ) -> usize {
        let mut staged = 0;
        for conv in &mut self.converters {
            let (kind, name) = (conv.kind(), conv.name().to_string());
            if !live.begin_load(kind, &name) {
                log::debug!("{kind} \"{name}\" already loading elsewhere, skipping");
                continue;
            }

            conv.check_dependencies();
            conv.convert(force || self.settings.force);
            match conv.load_into(staging) {
                Ok(()) => staged += 1,
                Err(err) => {
                    log::warn!("{kind} \"{name}\": load failed ({err}), using fallback");
                    conv.stage_fallback(staging);
                    staged += 1;
                }
            }

            live.end_load(kind, &name);
        }
        staged
    }
}

/// Combined fastfile path for a manifest:
/// `cache_dir/<stem>_<xxh3(abs_path)>.ff`.
#[must_use]
pub fn combined_path(settings: &PipelineSettings, manifest_path: &Path) -> PathBuf {
    let absolute =
        std::path::absolute(manifest_path).unwrap_or_else(|_| manifest_path.to_path_buf());
    let hash = xxh3_64(absolute.display().to_string().as_bytes());
    let stem = manifest_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bundle");
    settings.cache_dir.join(format!("{stem}_{hash:016x}.ff"))
}

/// Reads a combined fastfile back into a fresh database, e.g. for a
/// shipping build that loads bundles without source assets present.
pub fn load_combined(path: impl AsRef<Path>, db: &ResourceDatabase) -> Result<usize> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let mut reader = FastfileReader::new(&bytes, path.display().to_string())?;

    let mut counts = [0u32; 5];
    for slot in &mut counts {
        *slot = reader.read_u32()?;
    }

    let mut loaded = 0;
    for (slot, kind) in ResourceKind::ALL.iter().enumerate() {
        for _ in 0..counts[slot] {
            let payload = reader.read_bytes()?;
            let label = format!("{}:{kind}", path.display());
            let mut section = FastfileReader::section(&payload, label);
            match kind {
                ResourceKind::Shader => {
                    let shader = Shader::deserialize(&mut section)?;
                    db.shaders.insert(shader.name.clone(), shader);
                }
                ResourceKind::Texture => {
                    let texture = Texture::deserialize(&mut section)?;
                    db.textures.insert(texture.name.clone(), texture);
                }
                ResourceKind::Material => {
                    let material = Material::deserialize(&mut section)?;
                    db.materials.insert(material.name.clone(), material);
                }
                ResourceKind::Model => {
                    let model = Model::deserialize(&mut section)?;
                    db.models.insert(model.name.clone(), model);
                }
                ResourceKind::Script => {
                    let script = Script::deserialize(&mut section)?;
                    db.scripts.insert(script.name.clone(), script);
                }
            }
            loaded += 1;
        }
    }
    Ok(loaded)
}
