//! Soft Link Resolution
//!
//! Cross-resource references live in description files as *names*
//! ("this material's diffuse texture is `brick`") because the target may
//! not exist yet when the referrer loads. After every merge, a single
//! deterministic pass binds whatever became resolvable: materials first,
//! then models. The order is fixed because models expect their materials
//! already bound when their own links resolve.
//!
//! A miss is never fatal: the resolver attempts one synchronous on-the-spot
//! load for missing textures (a convention-named image next to the asset
//! root), and otherwise logs and leaves the link unbound so the referrer
//! falls back to its untextured default.

use crate::convert::texture::TextureConverter;
use crate::convert::Converter;
use crate::database::ResourceDatabase;
use crate::manifest::TextureDecl;
use crate::resources::SamplerDesc;
use crate::settings::PipelineSettings;

/// Extensions probed for an on-the-spot texture load, in order.
const TEXTURE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Binds every resolvable soft link in `live`. Returns the number of links
/// bound this pass.
pub fn resolve_soft_links(live: &ResourceDatabase, settings: &PipelineSettings) -> usize {
    let mut bound = 0;

    // Pass 1: Material -> Texture
    for (name, material) in live.materials.handles() {
        let wanted = {
            let guard = material.read();
            if guard.has_unresolved_link() {
                guard.diffuse_map.clone()
            } else {
                None
            }
        };
        let Some(texture_name) = wanted else { continue };

        let handle = live
            .textures
            .get(&texture_name)
            .or_else(|| load_texture_on_the_spot(live, settings, &texture_name));

        match handle {
            Some(texture) => {
                material.write().diffuse_texture = Some(texture);
                bound += 1;
            }
            None => {
                log::warn!(
                    "material \"{name}\": diffuse texture \"{texture_name}\" not found, \
                     rendering untextured"
                );
            }
        }
    }

    // Pass 2: Model -> Material. Materials are declared inline in
    // description files, so there is nothing to load on the spot; a miss
    // is warn-and-skip.
    for (name, model) in live.models.handles() {
        let wanted = {
            let guard = model.read();
            if guard.has_unresolved_link() {
                guard.material_name.clone()
            } else {
                None
            }
        };
        let Some(material_name) = wanted else { continue };

        match live.materials.get(&material_name) {
            Some(material) => {
                model.write().material = Some(material);
                bound += 1;
            }
            None => {
                log::warn!(
                    "model \"{name}\": material \"{material_name}\" not found, \
                     rendering with default material"
                );
            }
        }
    }

    bound
}

/// Blocking fallback load for a texture referenced by name only: probes
/// `<asset_root>/<name>.<ext>` for the known extensions, converts and
/// inserts it directly into the live database. Runs on the publisher's
/// thread by design.
fn load_texture_on_the_spot(
    live: &ResourceDatabase,
    settings: &PipelineSettings,
    texture_name: &str,
) -> Option<crate::database::Handle<crate::resources::Texture>> {
    for ext in TEXTURE_EXTENSIONS {
        let filename = format!("{texture_name}.{ext}");
        if !settings.resolve_source(&filename).exists() {
            continue;
        }

        let decl = TextureDecl {
            name: texture_name.to_string(),
            filename,
            srgb: false,
            mipmapped: false,
            sampler: SamplerDesc::default(),
        };
        let mut converter = TextureConverter::new(decl, settings);
        converter.check_dependencies();
        converter.convert(false);
        match converter.load_into(live) {
            Ok(()) => {
                log::info!("resolved texture \"{texture_name}\" with an on-the-spot load");
                return live.textures.get(texture_name);
            }
            Err(err) => {
                log::warn!("on-the-spot load of \"{texture_name}\" failed: {err}");
                return None;
            }
        }
    }
    None
}
