//! Model conversion (Wavefront OBJ).
//!
//! Parses positions, normals, texture coordinates and faces into flat
//! vertex/index buffers. Faces with more than three corners are
//! triangulated as fans. With `optimize` set, identical
//! position/normal/uv corners share one vertex; without it every corner
//! becomes its own vertex (faster to convert, larger artifact).
//!
//! The first `usemtl` in the file becomes the model's material soft link.

use std::path::PathBuf;

use glam::{Vec2, Vec3};
use rustc_hash::FxHashMap;

use crate::convert::{AssetStatus, Converter, ConverterCore, ConvertStatus};
use crate::database::ResourceDatabase;
use crate::errors::{KilnError, Result};
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::manifest::{ModelDecl, ResourceDecl};
use crate::resources::{Model, ResourceKind, Vertex};
use crate::settings::PipelineSettings;

pub struct ModelConverter {
    decl: ModelDecl,
    source_path: PathBuf,
    core: ConverterCore,
}

impl ModelConverter {
    #[must_use]
    pub fn new(decl: ModelDecl, settings: &PipelineSettings) -> Self {
        let source_path = settings.resolve_source(&decl.filename);
        let core = ConverterCore::new(
            ResourceKind::Model,
            decl.name.clone(),
            settings,
            &source_path,
            vec![source_path.clone()],
            &ResourceDecl::Model(decl.clone()).params_key(),
        );
        Self {
            decl,
            source_path,
            core,
        }
    }
}

impl Converter for ModelConverter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Model
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
            let text = std::fs::read_to_string(source_path).map_err(|err| KilnError::Convert {
                name: decl.name.clone(),
                message: format!("cannot read {}: {err}", source_path.display()),
            })?;
            let model = parse_obj(
                &text,
                &decl.name,
                &source_path.display().to_string(),
                decl.optimize,
            )?;
            let mut w = FastfileWriter::new();
            model.serialize(&mut w);
            Ok(w.into_bytes())
        })
    }

    fn load_into(&self, staging: &ResourceDatabase) -> Result<()> {
        let payload = self.core.read_artifact_payload()?;
        let mut reader = FastfileReader::section(&payload, &self.decl.name);
        let mut model = Model::deserialize(&mut reader)?;
        model.source = Some(self.core.source_ref(ResourceDecl::Model(self.decl.clone())));
        staging.models.insert(model.name.clone(), model);
        Ok(())
    }

    fn artifact_payload(&self) -> Result<Vec<u8>> {
        self.core.read_artifact_payload()
    }

    fn stage_fallback(&self, staging: &ResourceDatabase) {
        staging
            .models
            .insert(self.decl.name.clone(), Model::fallback(&self.decl.name));
    }
}

// ============================================================================
// OBJ parsing
// ============================================================================

/// One face corner: indices into the position/uv/normal pools.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct Corner {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

pub(crate) fn parse_obj(text: &str, name: &str, file: &str, optimize: bool) -> Result<Model> {
    let parse_error = |line_no: usize, message: String| KilnError::Parse {
        file: file.to_string(),
        message: format!("line {line_no}: {message}"),
    };

    let mut positions: Vec<Vec3> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();
    let mut uvs: Vec<Vec2> = Vec::new();
    let mut corners: Vec<Corner> = Vec::new();
    let mut material_name: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let keyword = parts.next().unwrap_or("");
        match keyword {
            "v" => positions.push(parse_vec3(&mut parts).ok_or_else(|| {
                parse_error(line_no, "expected 'v x y z'".to_string())
            })?),
            "vn" => normals.push(parse_vec3(&mut parts).ok_or_else(|| {
                parse_error(line_no, "expected 'vn x y z'".to_string())
            })?),
            "vt" => {
                let u = parse_f32(parts.next());
                let v = parse_f32(parts.next());
                match (u, v) {
                    (Some(u), Some(v)) => uvs.push(Vec2::new(u, v)),
                    _ => return Err(parse_error(line_no, "expected 'vt u v'".to_string())),
                }
            }
            "f" => {
                let face: Vec<Corner> = parts
                    .map(|spec| {
                        parse_corner(spec, positions.len(), uvs.len(), normals.len())
                            .ok_or_else(|| parse_error(line_no, format!("bad face corner '{spec}'")))
                    })
                    .collect::<Result<_>>()?;
                if face.len() < 3 {
                    return Err(parse_error(line_no, "face needs at least 3 corners".to_string()));
                }
                // fan triangulation
                for i in 1..face.len() - 1 {
                    corners.push(face[0]);
                    corners.push(face[i]);
                    corners.push(face[i + 1]);
                }
            }
            "usemtl" => {
                if material_name.is_none() {
                    material_name = parts.next().map(ToString::to_string);
                }
            }
            // grouping/smoothing/library keywords carry no geometry
            "o" | "g" | "s" | "mtllib" => {}
            other => {
                log::debug!("{file}:{line_no}: ignoring OBJ keyword '{other}'");
            }
        }
    }

    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::with_capacity(corners.len());

    let make_vertex = |corner: Corner| Vertex {
        position: positions[corner.position],
        normal: corner.normal.map_or(Vec3::ZERO, |i| normals[i]),
        uv: corner.uv.map_or(Vec2::ZERO, |i| uvs[i]),
    };

    if optimize {
        let mut seen: FxHashMap<Corner, u32> = FxHashMap::default();
        for corner in corners {
            let index = *seen.entry(corner).or_insert_with(|| {
                vertices.push(make_vertex(corner));
                (vertices.len() - 1) as u32
            });
            indices.push(index);
        }
    } else {
        for corner in corners {
            vertices.push(make_vertex(corner));
            indices.push((vertices.len() - 1) as u32);
        }
    }

    Ok(Model {
        name: name.to_string(),
        vertices,
        indices,
        material_name,
        material: None,
        source: None,
    })
}

fn parse_f32(s: Option<&str>) -> Option<f32> {
    s.and_then(|s| s.parse::<f32>().ok())
}

fn parse_vec3<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Option<Vec3> {
    let x = parse_f32(parts.next())?;
    let y = parse_f32(parts.next())?;
    let z = parse_f32(parts.next())?;
    Some(Vec3::new(x, y, z))
}

/// Parses `v`, `v/vt`, `v//vn` or `v/vt/vn`, with OBJ's 1-based (or
/// negative, relative) indexing.
fn parse_corner(spec: &str, n_pos: usize, n_uv: usize, n_normal: usize) -> Option<Corner> {
    let resolve = |field: Option<&str>, len: usize| -> Option<Option<usize>> {
        match field {
            None | Some("") => Some(None),
            Some(s) => {
                let raw: i64 = s.parse().ok()?;
                let idx = if raw > 0 {
                    (raw - 1) as usize
                } else if raw < 0 {
                    let back = (-raw) as usize;
                    if back > len {
                        return None;
                    }
                    len - back
                } else {
                    return None;
                };
                (idx < len).then_some(Some(idx))
            }
        }
    };

    let mut fields = spec.split('/');
    let position = resolve(fields.next(), n_pos)??;
    let uv = resolve(fields.next(), n_uv)?;
    let normal = resolve(fields.next(), n_normal)?;
    Some(Corner {
        position,
        uv,
        normal,
    })
}
