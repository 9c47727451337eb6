//! Hot Reload & Manager Tests
//!
//! Tests for:
//! - Staging + publish preserving the allocation behind every handle
//! - Soft-link resolution (bound, on-the-spot, and missing cases)
//! - The background scanner noticing source and manifest changes
//! - ResourceManager sync and async load paths

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use kiln::hotreload::publish::publish_batch;
use kiln::resources::{FilterMode, Material, Model, Texture};
use kiln::{
    CompositeConverter, PipelineSettings, ResourceDatabase, ResourceManager, Scanner, StagedBatch,
};

const SHADER_SRC: &str = "void main() {\n    gl_Position = vec4(0.0);\n}\n";
const OBJ_SRC: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
vn 0 0 1
vt 0 0
vt 1 0
vt 1 1
usemtl wall
f 1/1/1 2/2/1 3/3/1
";

const MANIFEST: &str = r#"
shader "sky" { filename "sky.vert" stage vertex }
texture "brick" { filename "brick.png" }
material "wall" { diffuse 0.8 0.7 0.6 diffuseMap "brick" }
model "room" { filename "room.obj" }
script "spin" { filename "spin.ks" }
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
    std::fs::write(assets.join("spin.ks"), "speed = 2\n").unwrap();
    std::fs::write(assets.join("room.obj"), OBJ_SRC).unwrap();
    write_png(&assets.join("brick.png"), [200, 60, 30, 255]);

    let manifest_path = assets.join("level1.res");
    std::fs::write(&manifest_path, MANIFEST).unwrap();

    let mut settings = PipelineSettings::new(&assets, dir.path().join("cache"));
    settings.scan_interval = Duration::from_millis(50);
    Fixture {
        _dir: dir,
        settings,
        manifest_path,
    }
}

fn write_png(path: &Path, rgba: [u8; 4]) {
    image::RgbaImage::from_pixel(2, 2, image::Rgba(rgba))
        .save(path)
        .unwrap();
}

fn touch_newer(path: &Path) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
}

/// Initial load: stage the whole manifest and publish it into `live`.
fn load_into(live: &ResourceDatabase, fx: &Fixture) {
    let mut composite = CompositeConverter::from_file(&fx.manifest_path, &fx.settings).unwrap();
    let mut batch = StagedBatch::new();
    composite.stage_into(live, &batch.db, false);
    publish_batch(live, batch, &fx.settings);
}

// ============================================================================
// Publish: links and identity
// ============================================================================

#[test]
fn publish_binds_material_and_model_links() {
    let fx = fixture();
    let live = ResourceDatabase::new();
    load_into(&live, &fx);

    let material = live.get::<Material>("wall").unwrap();
    let texture = live.get::<Texture>("brick").unwrap();
    assert!(material.read().diffuse_texture.as_ref().unwrap().ptr_eq(&texture));

    let model = live.get::<Model>("room").unwrap();
    assert!(model.read().material.as_ref().unwrap().ptr_eq(&material));
}

#[test]
fn republish_updates_contents_behind_the_same_handle() {
    let fx = fixture();
    let live = ResourceDatabase::new();
    load_into(&live, &fx);

    let handle = live.get::<Texture>("brick").unwrap();
    let old_pixels = handle.read().pixels.clone();

    // repaint the source and make it look newer
    let png = fx.settings.resolve_source("brick.png");
    write_png(&png, [10, 220, 10, 255]);
    touch_newer(&png);

    load_into(&live, &fx);

    let after = live.get::<Texture>("brick").unwrap();
    assert!(handle.ptr_eq(&after));
    assert_ne!(handle.read().pixels, old_pixels);
}

// ============================================================================
// Soft links
// ============================================================================

#[test]
fn missing_texture_leaves_material_untextured() {
    let fx = fixture();
    let manifest = fx._dir.path().join("assets").join("ghost.res");
    std::fs::write(
        &manifest,
        r#"material "spooky" { diffuse 1 1 1 diffuseMap "ghost" }"#,
    )
    .unwrap();

    let live = ResourceDatabase::new();
    let mut composite = CompositeConverter::from_file(&manifest, &fx.settings).unwrap();
    let mut batch = StagedBatch::new();
    composite.stage_into(&live, &batch.db, false);
    publish_batch(&live, batch, &fx.settings);

    let material = live.get::<Material>("spooky").unwrap();
    assert!(material.read().diffuse_texture.is_none());
}

#[test]
fn undeclared_texture_next_to_the_assets_is_loaded_on_the_spot() {
    let fx = fixture();
    let assets = fx._dir.path().join("assets");
    write_png(&assets.join("loose.png"), [1, 2, 3, 255]);
    let manifest = assets.join("loose.res");
    std::fs::write(
        &manifest,
        r#"material "patch" { diffuse 1 1 1 diffuseMap "loose" }"#,
    )
    .unwrap();

    let live = ResourceDatabase::new();
    let mut composite = CompositeConverter::from_file(&manifest, &fx.settings).unwrap();
    let mut batch = StagedBatch::new();
    composite.stage_into(&live, &batch.db, false);
    publish_batch(&live, batch, &fx.settings);

    let texture = live.get::<Texture>("loose").unwrap();
    let material = live.get::<Material>("patch").unwrap();
    assert!(material.read().diffuse_texture.as_ref().unwrap().ptr_eq(&texture));
}

#[test]
fn publish_runs_update_closures_on_the_publishing_thread() {
    let fx = fixture();
    let live = ResourceDatabase::new();
    load_into(&live, &fx);

    let handle = live.get::<Texture>("brick").unwrap();
    assert_eq!(handle.read().sampler.min_filter, FilterMode::Linear);

    // sampler retune: metadata only, no pixel re-upload
    let publisher_thread = std::thread::current().id();
    let mut batch = StagedBatch::new();
    batch.updates.push(Box::new(move |db: &ResourceDatabase| {
        assert_eq!(std::thread::current().id(), publisher_thread);
        if let Some(texture) = db.textures.get("brick") {
            texture.write().sampler.min_filter = FilterMode::Nearest;
        }
    }));
    assert!(!batch.is_empty());
    publish_batch(&live, batch, &fx.settings);

    assert_eq!(handle.read().sampler.min_filter, FilterMode::Nearest);
}

// ============================================================================
// Scanner
// ============================================================================

#[test]
fn scanner_stages_a_changed_source_file() {
    let fx = fixture();
    let live = Arc::new(ResourceDatabase::new());
    load_into(&live, &fx);

    let handle = live.get::<Texture>("brick").unwrap();
    let old_pixels = handle.read().pixels.clone();

    let (tx, rx) = flume::bounded(4);
    let mut scanner = Scanner::spawn(
        Arc::clone(&live),
        vec![fx.manifest_path.clone()],
        fx.settings.clone(),
        tx,
    );

    let png = fx.settings.resolve_source("brick.png");
    write_png(&png, [10, 220, 10, 255]);
    touch_newer(&png);

    let batch = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("scanner never staged the changed texture");
    scanner.shutdown();

    assert!(batch.db.textures.contains("brick"));
    publish_batch(&live, batch, &fx.settings);

    let after = live.get::<Texture>("brick").unwrap();
    assert!(handle.ptr_eq(&after));
    assert_ne!(handle.read().pixels, old_pixels);
}

#[test]
fn scanner_reloads_a_changed_manifest() {
    let fx = fixture();
    let live = Arc::new(ResourceDatabase::new());
    load_into(&live, &fx);

    let (tx, rx) = flume::bounded(4);
    let mut scanner = Scanner::spawn(
        Arc::clone(&live),
        vec![fx.manifest_path.clone()],
        fx.settings.clone(),
        tx,
    );

    // add a declaration and bump the manifest
    let extended = format!("{MANIFEST}\nmaterial \"floor\" {{ diffuse 0.2 0.2 0.2 }}\n");
    std::fs::write(&fx.manifest_path, extended).unwrap();
    touch_newer(&fx.manifest_path);

    let batch = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("scanner never reloaded the manifest");
    scanner.shutdown();

    assert!(batch.db.materials.contains("floor"));
    publish_batch(&live, batch, &fx.settings);
    assert!(live.get::<Material>("floor").is_some());
}

#[test]
fn scanner_shutdown_is_prompt_and_idempotent() {
    let fx = fixture();
    let live = Arc::new(ResourceDatabase::new());
    let (tx, _rx) = flume::bounded(4);

    let mut scanner = Scanner::spawn(Arc::clone(&live), vec![], fx.settings.clone(), tx);
    let start = std::time::Instant::now();
    scanner.shutdown();
    scanner.shutdown();
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn scanner_shutdown_returns_while_the_channel_is_full() {
    let fx = fixture();
    let live = Arc::new(ResourceDatabase::new());
    load_into(&live, &fx);

    // capacity 1 and a publisher that never drains
    let (tx, rx) = flume::bounded(1);
    let mut scanner = Scanner::spawn(
        Arc::clone(&live),
        vec![fx.manifest_path.clone()],
        fx.settings.clone(),
        tx,
    );

    // one edit; the live stamp never refreshes without a publish, so the
    // scanner restages it every cycle and runs into the plugged channel
    let png = fx.settings.resolve_source("brick.png");
    write_png(&png, [10, 220, 10, 255]);
    touch_newer(&png);

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while rx.is_empty() {
        assert!(
            std::time::Instant::now() < deadline,
            "scanner never staged the edit"
        );
        std::thread::sleep(Duration::from_millis(20));
    }
    // give the next cycle time to park on the full channel
    std::thread::sleep(Duration::from_millis(300));

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        scanner.shutdown();
        let _ = done_tx.send(());
    });
    assert!(
        done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "shutdown hung on a full staging channel"
    );
    drop(rx);
}

// ============================================================================
// ResourceManager
// ============================================================================

#[test]
fn manager_sync_load_populates_the_live_database() -> anyhow::Result<()> {
    let fx = fixture();
    let mut manager = ResourceManager::new(fx.settings.clone());

    let loaded = manager.load_manifest(&fx.manifest_path)?;
    assert_eq!(loaded, 5);
    assert!(manager.database().get::<Texture>("brick").is_some());
    Ok(())
}

#[test]
fn manager_async_load_merges_on_wait() -> anyhow::Result<()> {
    let fx = fixture();
    let mut manager = ResourceManager::new(fx.settings.clone());

    manager.load_async(&fx.manifest_path);
    assert!(manager.database().is_empty());

    manager.wait_for_completion(None)?;
    assert_eq!(manager.database().total_len(), 5);

    let material = manager.database().get::<Material>("wall").unwrap();
    assert!(material.read().diffuse_texture.is_some());
    Ok(())
}

#[test]
fn manager_wait_propagates_a_bad_description_file() {
    let fx = fixture();
    let mut manager = ResourceManager::new(fx.settings.clone());

    manager.load_async(fx._dir.path().join("nope.res"));
    assert!(manager.wait_for_completion(None).is_err());
}

#[test]
fn manager_wait_filter_only_touches_matching_loads() {
    let fx = fixture();
    let mut manager = ResourceManager::new(fx.settings.clone());

    manager.load_async(&fx.manifest_path);
    manager.load_async(fx._dir.path().join("missing.res"));

    // only the good load matches; the bad one stays pending
    manager.wait_for_completion(Some("level1")).unwrap();
    assert_eq!(manager.database().total_len(), 5);

    assert!(manager.wait_for_completion(None).is_err());
}

#[test]
fn manager_watch_publish_cycle_picks_up_edits() {
    let fx = fixture();
    let mut manager = ResourceManager::new(fx.settings.clone());
    manager.load_manifest(&fx.manifest_path).unwrap();

    let handle = manager.database().get::<Texture>("brick").unwrap();
    let old_pixels = handle.read().pixels.clone();

    manager.start_watching();
    assert!(manager.is_watching());

    let png = fx.settings.resolve_source("brick.png");
    write_png(&png, [0, 0, 250, 255]);
    touch_newer(&png);

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        manager.publish_pending();
        if handle.read().pixels != old_pixels {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "edit never reached the live database"
        );
        std::thread::sleep(Duration::from_millis(20));
    }

    manager.shutdown();
}
