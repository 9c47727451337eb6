//! Conversion Pipeline Tests
//!
//! Tests for:
//! - Composite check/convert against a real on-disk fixture
//! - Timestamp staleness and forced reconversion
//! - Cache key sensitivity to conversion parameters
//! - Atomicity of the combined fastfile
//! - Round-tripping a combined fastfile back into a database

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use kiln::convert::composite::{combined_path, load_combined};
use kiln::convert::{cache_artifact_path, AssetStatus, ConvertStatus};
use kiln::manifest::TextureDecl;
use kiln::resources::{Model, ResourceKind, SamplerDesc, Script, Shader, Texture};
use kiln::{CompositeConverter, PipelineSettings, ResourceDatabase};

const SHADER_SRC: &str = "void main() {\n    gl_Position = vec4(0.0);\n}\n";
const SCRIPT_SRC: &str = "-- spin setup\nspeed = 2\n";
const OBJ_SRC: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
usemtl wall
f 1/1/1 2/2/1 3/3/1 4/4/1
";

const MANIFEST: &str = r#"
shader "sky" { filename "sky.vert" stage vertex }
texture "brick" { filename "brick.png" mipmapped true }
material "wall" { diffuse 0.8 0.7 0.6 diffuseMap "brick" }
model "room" { filename "room.obj" optimize true }
script "spin" { filename "spin.ks" optimize true }
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    settings: PipelineSettings,
    manifest_path: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("assets");
    std::fs::create_dir_all(&assets).unwrap();

    std::fs::write(assets.join("sky.vert"), SHADER_SRC).unwrap();
    std::fs::write(assets.join("spin.ks"), SCRIPT_SRC).unwrap();
    std::fs::write(assets.join("room.obj"), OBJ_SRC).unwrap();
    write_png(&assets.join("brick.png"), 2, 2, [200, 60, 30, 255]);

    let manifest_path = assets.join("level1.res");
    std::fs::write(&manifest_path, MANIFEST).unwrap();

    let settings = PipelineSettings::new(&assets, dir.path().join("cache"));
    Fixture {
        _dir: dir,
        settings,
        manifest_path,
    }
}

fn write_png(path: &Path, w: u32, h: u32, rgba: [u8; 4]) {
    image::RgbaImage::from_pixel(w, h, image::Rgba(rgba))
        .save(path)
        .unwrap();
}

/// Sets the file's mtime well into the future so a change is observed even
/// on filesystems with coarse timestamp granularity.
fn touch_newer(path: &Path) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
}

// ============================================================================
// Check / convert cycle
// ============================================================================

#[test]
fn fresh_fixture_is_out_of_date_then_converts_clean() {
    let fx = fixture();
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings).unwrap();

    assert_eq!(composite.check_dependencies(), AssetStatus::OutOfDate);
    assert_eq!(composite.convert(false), ConvertStatus::Success);
    assert!(composite.output_path().exists());
    assert_eq!(composite.check_dependencies(), AssetStatus::UpToDate);
}

#[test]
fn second_convert_is_a_noop_until_a_source_changes() {
    let fx = fixture();
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings).unwrap();
    composite.check_dependencies();
    assert_eq!(composite.convert(false), ConvertStatus::Success);

    // untouched sources stay fresh
    assert_eq!(composite.check_dependencies(), AssetStatus::UpToDate);

    touch_newer(&fx.settings.resolve_source("sky.vert"));
    assert_eq!(composite.check_dependencies(), AssetStatus::OutOfDate);
    assert_eq!(composite.convert(false), ConvertStatus::Success);
    assert_eq!(composite.check_dependencies(), AssetStatus::UpToDate);
}

#[test]
fn force_reconverts_an_up_to_date_asset() {
    let fx = fixture();
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings).unwrap();
    composite.check_dependencies();
    composite.convert(false);

    assert_eq!(composite.check_dependencies(), AssetStatus::UpToDate);
    assert_eq!(composite.convert(true), ConvertStatus::Success);
}

#[test]
fn missing_combined_file_alone_makes_composite_stale() {
    let fx = fixture();
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings).unwrap();
    composite.check_dependencies();
    composite.convert(false);

    std::fs::remove_file(composite.output_path()).unwrap();
    // per-kind artifacts are all fresh, only the bundle is gone
    assert_eq!(composite.check_dependencies(), AssetStatus::OutOfDate);
}

// ============================================================================
// Cache keys
// ============================================================================

#[test]
fn parameter_edit_changes_the_cache_artifact_path() {
    let fx = fixture();
    let source = fx.settings.resolve_source("brick.png");

    let plain = TextureDecl {
        name: "brick".to_string(),
        filename: "brick.png".to_string(),
        srgb: false,
        mipmapped: false,
        sampler: SamplerDesc::default(),
    };
    let mipmapped = TextureDecl {
        mipmapped: true,
        ..plain.clone()
    };

    let a = cache_artifact_path(
        &fx.settings,
        ResourceKind::Texture,
        &source,
        &kiln::manifest::ResourceDecl::Texture(plain).params_key(),
    );
    let b = cache_artifact_path(
        &fx.settings,
        ResourceKind::Texture,
        &source,
        &kiln::manifest::ResourceDecl::Texture(mipmapped).params_key(),
    );
    assert_ne!(a, b);
    assert!(a.starts_with(fx.settings.cache_dir.join("texture")));
}

#[test]
fn combined_path_is_stable_for_a_manifest() {
    let fx = fixture();
    let a = combined_path(&fx.settings, &fx.manifest_path);
    let b = combined_path(&fx.settings, &fx.manifest_path);
    assert_eq!(a, b);
    assert_eq!(a.extension().unwrap(), "ff");
}

// ============================================================================
// Atomicity
// ============================================================================

#[test]
fn failed_sub_conversion_leaves_previous_bundle_untouched() {
    let fx = fixture();
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings).unwrap();
    composite.check_dependencies();
    assert_eq!(composite.convert(false), ConvertStatus::Success);
    let before = std::fs::read(composite.output_path()).unwrap();

    // break the shader source and make it look newer
    let shader_path = fx.settings.resolve_source("sky.vert");
    std::fs::write(&shader_path, "void main() {").unwrap();
    touch_newer(&shader_path);

    assert_eq!(composite.check_dependencies(), AssetStatus::OutOfDate);
    assert_eq!(composite.convert(false), ConvertStatus::ParseError);

    let after = std::fs::read(composite.output_path()).unwrap();
    assert_eq!(before, after);
}

// ============================================================================
// Loading converted output
// ============================================================================

#[test]
fn stage_into_loads_every_declared_resource() {
    let fx = fixture();
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings).unwrap();

    let live = ResourceDatabase::new();
    let staging = ResourceDatabase::new();
    let staged = composite.stage_into(&live, &staging, false);
    assert_eq!(staged, 5);

    let texture = staging.get::<Texture>("brick").unwrap();
    {
        let tex = texture.read();
        assert_eq!((tex.width, tex.height), (2, 2));
        assert_eq!(tex.mip_level_count, 2);
        assert_eq!(tex.pixels.len(), 16);
    }

    let model = staging.get::<Model>("room").unwrap();
    {
        let model = model.read();
        assert_eq!(model.vertices.len(), 4); // optimize dedups the quad corners
        assert_eq!(model.indices.len(), 6);
        assert_eq!(model.material_name.as_deref(), Some("wall"));
    }

    let script = staging.get::<Script>("spin").unwrap();
    assert_eq!(script.read().text, "speed = 2\n");

    let shader = staging.get::<Shader>("sky").unwrap();
    assert!(shader.read().compiled.contains("gl_Position"));
}

#[test]
fn combined_fastfile_round_trips_into_a_fresh_database() -> anyhow::Result<()> {
    let fx = fixture();
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings)?;
    composite.check_dependencies();
    assert_eq!(composite.convert(false), ConvertStatus::Success);

    let db = ResourceDatabase::new();
    let loaded = load_combined(composite.output_path(), &db)?;
    assert_eq!(loaded, 5);
    assert!(db.contains(ResourceKind::Shader, "sky"));
    assert!(db.contains(ResourceKind::Texture, "brick"));
    assert!(db.contains(ResourceKind::Material, "wall"));
    assert!(db.contains(ResourceKind::Model, "room"));
    assert!(db.contains(ResourceKind::Script, "spin"));
    Ok(())
}

#[test]
fn truncated_combined_fastfile_is_a_load_error() {
    let fx = fixture();
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings).unwrap();
    composite.check_dependencies();
    composite.convert(false);

    let mut bytes = std::fs::read(composite.output_path()).unwrap();
    bytes.truncate(bytes.len() / 2);
    std::fs::write(composite.output_path(), &bytes).unwrap();

    let db = ResourceDatabase::new();
    assert!(load_combined(composite.output_path(), &db).is_err());
}

#[test]
fn load_failure_stages_the_fallback_instead_of_sinking_the_batch() {
    let fx = fixture();
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings).unwrap();
    composite.check_dependencies();
    composite.convert(false);

    // corrupt one per-kind artifact after conversion
    let source = fx.settings.resolve_source("brick.png");
    let decl = TextureDecl {
        name: "brick".to_string(),
        filename: "brick.png".to_string(),
        srgb: false,
        mipmapped: true,
        sampler: SamplerDesc::default(),
    };
    let artifact = cache_artifact_path(
        &fx.settings,
        ResourceKind::Texture,
        &source,
        &kiln::manifest::ResourceDecl::Texture(decl).params_key(),
    );
    std::fs::write(&artifact, b"garbage").unwrap();
    touch_newer(&artifact); // keep it "fresh" so convert won't repair it

    let live = ResourceDatabase::new();
    let staging = ResourceDatabase::new();
    let staged = composite.stage_into(&live, &staging, false);
    assert_eq!(staged, 5);

    // magenta 1x1 stand-in
    let texture = staging.get::<Texture>("brick").unwrap();
    let tex = texture.read();
    assert_eq!((tex.width, tex.height), (1, 1));
    assert_eq!(tex.pixels, vec![0xFF, 0x00, 0xFF, 0xFF]);
}
