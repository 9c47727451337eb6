//! Material conversion.
//!
//! Materials are declared entirely inline in the description file, so their
//! only dependency is the manifest itself and the transform is a straight
//! field copy. The `diffuseMap` reference stays a name (a soft link) until
//! the post-merge resolve pass binds it.

use std::path::{Path, PathBuf};

use crate::convert::{AssetStatus, Converter, ConverterCore, ConvertStatus};
use crate::database::ResourceDatabase;
use crate::errors::Result;
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::manifest::{MaterialDecl, ResourceDecl};
use crate::resources::{Material, ResourceKind};
use crate::settings::PipelineSettings;

pub struct MaterialConverter {
    decl: MaterialDecl,
    core: ConverterCore,
}

impl MaterialConverter {
    #[must_use]
    pub fn new(decl: MaterialDecl, manifest_path: &Path, settings: &PipelineSettings) -> Self {
        // All materials in one manifest share the manifest path as their
        // cache-key source, so the name goes into the params to keep their
        // artifacts distinct.
        let params = format!(
            "name={};{}",
            decl.name,
            ResourceDecl::Material(decl.clone()).params_key()
        );
        let core = ConverterCore::new(
            ResourceKind::Material,
            decl.name.clone(),
            settings,
            manifest_path,
            vec![PathBuf::from(manifest_path)],
            &params,
        );
        Self { decl, core }
    }
}

impl Converter for MaterialConverter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Material
    }

    fn name(&self) -> &str {
        &self.decl.name
    }

    fn check_dependencies(&mut self) -> AssetStatus {
        self.core.check().status
    }

    fn convert(&mut self, force: bool) -> ConvertStatus {
        let decl = &self.decl;
        self.core.run_convert(force, || {
            let material = Material {
                name: decl.name.clone(),
                diffuse: decl.diffuse,
                specular: decl.specular,
                shininess: decl.shininess,
                opacity: decl.opacity,
                diffuse_map: decl.diffuse_map.clone(),
                diffuse_texture: None,
                source: None,
            };
            let mut w = FastfileWriter::new();
            material.serialize(&mut w);
            Ok(w.into_bytes())
        })
    }

    fn load_into(&self, staging: &ResourceDatabase) -> Result<()> {
        let payload = self.core.read_artifact_payload()?;
        let mut reader = FastfileReader::section(&payload, &self.decl.name);
        let mut material = Material::deserialize(&mut reader)?;
        material.source = Some(self.core.source_ref(ResourceDecl::Material(self.decl.clone())));
        staging.materials.insert(material.name.clone(), material);
        Ok(())
    }

    fn artifact_payload(&self) -> Result<Vec<u8>> {
        self.core.read_artifact_payload()
    }

    fn stage_fallback(&self, staging: &ResourceDatabase) {
        staging
            .materials
            .insert(self.decl.name.clone(), Material::fallback(&self.decl.name));
    }
}
