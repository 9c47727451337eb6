//! Resource Description Files
//!
//! The human-authored text format that names the resources belonging to one
//! scene/level and the parameters that affect their conversion:
//!
//! ```text
//! # level 1 assets
//! shader "sky" { filename "sky.vert" stage vertex }
//! texture "brick" {
//!     filename "brick.png"
//!     internalFormat srgb
//!     mipmapped true
//!     minFilter linear
//!     wrapModeS repeat
//! }
//! material "wall" { diffuse 0.8 0.7 0.6 diffuseMap "brick" }
//! model "room" { filename "room.obj" optimize true }
//! script "spin" { filename "spin.ks" }
//! ```
//!
//! Unknown top-level keywords are logged as warnings and skipped, not
//! fatal; a malformed declaration aborts this file only
//! ([`KilnError::Parse`]).

use std::path::{Path, PathBuf};

use glam::Vec4;

use crate::errors::{KilnError, Result};
use crate::resources::{FilterMode, ResourceKind, SamplerDesc, ShaderStage, WrapMode};

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDecl {
    pub name: String,
    pub filename: String,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDecl {
    pub name: String,
    pub filename: String,
    /// `internalFormat srgb` in the description file.
    pub srgb: bool,
    pub mipmapped: bool,
    pub sampler: SamplerDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDecl {
    pub name: String,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub shininess: f32,
    pub opacity: f32,
    pub diffuse_map: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDecl {
    pub name: String,
    pub filename: String,
    pub optimize: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptDecl {
    pub name: String,
    pub filename: String,
    /// Strip comments from the script during conversion.
    pub optimize: bool,
}

/// One parsed resource declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDecl {
    Shader(ShaderDecl),
    Texture(TextureDecl),
    Material(MaterialDecl),
    Model(ModelDecl),
    Script(ScriptDecl),
}

impl ResourceDecl {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDecl::Shader(_) => ResourceKind::Shader,
            ResourceDecl::Texture(_) => ResourceKind::Texture,
            ResourceDecl::Material(_) => ResourceKind::Material,
            ResourceDecl::Model(_) => ResourceKind::Model,
            ResourceDecl::Script(_) => ResourceKind::Script,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ResourceDecl::Shader(d) => &d.name,
            ResourceDecl::Texture(d) => &d.name,
            ResourceDecl::Material(d) => &d.name,
            ResourceDecl::Model(d) => &d.name,
            ResourceDecl::Script(d) => &d.name,
        }
    }

    /// Source file this declaration reads, if any. Materials are defined
    /// entirely inline, so their only dependency is the manifest itself.
    #[must_use]
    pub fn source_filename(&self) -> Option<&str> {
        match self {
            ResourceDecl::Shader(d) => Some(&d.filename),
            ResourceDecl::Texture(d) => Some(&d.filename),
            ResourceDecl::Material(_) => None,
            ResourceDecl::Model(d) => Some(&d.filename),
            ResourceDecl::Script(d) => Some(&d.filename),
        }
    }

    /// Canonical encoding of every parameter that affects the converted
    /// bytes. Hashed into the cache key, so a parameter edit invalidates
    /// the cache exactly like a content edit would.
    #[must_use]
    pub fn params_key(&self) -> String {
        match self {
            ResourceDecl::Shader(d) => format!("stage={}", d.stage.as_str()),
            ResourceDecl::Texture(d) => format!(
                "srgb={};mip={};min={:?};mag={:?};ws={:?};wt={:?}",
                u8::from(d.srgb),
                u8::from(d.mipmapped),
                d.sampler.min_filter,
                d.sampler.mag_filter,
                d.sampler.wrap_s,
                d.sampler.wrap_t,
            ),
            ResourceDecl::Material(d) => format!(
                "diffuse={:?};specular={:?};shininess={};opacity={};map={}",
                d.diffuse.to_array(),
                d.specular.to_array(),
                d.shininess,
                d.opacity,
                d.diffuse_map.as_deref().unwrap_or(""),
            ),
            ResourceDecl::Model(d) => format!("opt={}", u8::from(d.optimize)),
            ResourceDecl::Script(d) => format!("opt={}", u8::from(d.optimize)),
        }
    }
}

/// A parsed description file: the path it came from plus its declarations,
/// in file order.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub decls: Vec<ResourceDecl>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Reads and parses a description file from disk.
pub fn parse_manifest(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    parse_manifest_str(&text, path)
}

/// Parses description-file text. `path` is used for error reporting and as
/// the manifest's identity.
pub fn parse_manifest_str(text: &str, path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref().to_path_buf();
    let file = path.display().to_string();
    let mut tokens = Tokenizer::new(text, &file);
    let mut decls: Vec<ResourceDecl> = Vec::new();

    while let Some(keyword) = tokens.next()? {
        let decl = match keyword.text.as_str() {
            "shader" => Some(parse_shader(&mut tokens)?),
            "texture" => Some(parse_texture(&mut tokens)?),
            "material" => Some(parse_material(&mut tokens)?),
            "model" => Some(parse_model(&mut tokens)?),
            "script" => Some(parse_script(&mut tokens)?),
            other => {
                log::warn!(
                    "{file}:{}: unknown resource keyword '{other}', skipping",
                    keyword.line
                );
                tokens.skip_declaration()?;
                None
            }
        };
        if let Some(decl) = decl {
            decls.push(decl);
        }
    }

    Ok(Manifest { path, decls })
}

// ----------------------------------------------------------------------------
// Per-kind declaration parsers
// ----------------------------------------------------------------------------

fn parse_shader(t: &mut Tokenizer<'_>) -> Result<ResourceDecl> {
    let name = t.expect_string("shader name")?;
    let mut decl = ShaderDecl {
        name,
        filename: String::new(),
        stage: ShaderStage::default(),
    };
    t.each_field(|t, key| {
        match key {
            "filename" => decl.filename = t.expect_string("filename")?,
            "stage" => {
                decl.stage = match t.expect_word("stage")?.as_str() {
                    "vertex" => ShaderStage::Vertex,
                    "fragment" => ShaderStage::Fragment,
                    "compute" => ShaderStage::Compute,
                    other => return Err(t.error(format!("unknown shader stage '{other}'"))),
                }
            }
            other => t.skip_unknown_field(other)?,
        }
        Ok(())
    })?;
    if decl.filename.is_empty() {
        return Err(t.error(format!("shader \"{}\" has no filename", decl.name)));
    }
    Ok(ResourceDecl::Shader(decl))
}

fn parse_texture(t: &mut Tokenizer<'_>) -> Result<ResourceDecl> {
    let name = t.expect_string("texture name")?;
    let mut decl = TextureDecl {
        name,
        filename: String::new(),
        srgb: false,
        mipmapped: false,
        sampler: SamplerDesc::default(),
    };
    t.each_field(|t, key| {
        match key {
            "filename" => decl.filename = t.expect_string("filename")?,
            "internalFormat" => {
                decl.srgb = match t.expect_word("internalFormat")?.as_str() {
                    "srgb" => true,
                    "linear" => false,
                    other => return Err(t.error(format!("unknown internalFormat '{other}'"))),
                }
            }
            "mipmapped" => decl.mipmapped = t.expect_bool("mipmapped")?,
            "minFilter" => decl.sampler.min_filter = t.expect_filter("minFilter")?,
            "magFilter" => decl.sampler.mag_filter = t.expect_filter("magFilter")?,
            "wrapModeS" => decl.sampler.wrap_s = t.expect_wrap("wrapModeS")?,
            "wrapModeT" => decl.sampler.wrap_t = t.expect_wrap("wrapModeT")?,
            other => t.skip_unknown_field(other)?,
        }
        Ok(())
    })?;
    if decl.filename.is_empty() {
        return Err(t.error(format!("texture \"{}\" has no filename", decl.name)));
    }
    Ok(ResourceDecl::Texture(decl))
}

fn parse_material(t: &mut Tokenizer<'_>) -> Result<ResourceDecl> {
    let name = t.expect_string("material name")?;
    let mut decl = MaterialDecl {
        name,
        diffuse: Vec4::new(1.0, 1.0, 1.0, 1.0),
        specular: Vec4::ZERO,
        shininess: 0.0,
        opacity: 1.0,
        diffuse_map: None,
    };
    t.each_field(|t, key| {
        match key {
            "diffuse" => decl.diffuse = t.expect_color("diffuse")?,
            "specular" => decl.specular = t.expect_color("specular")?,
            "shininess" => decl.shininess = t.expect_f32("shininess")?,
            "opacity" => decl.opacity = t.expect_f32("opacity")?,
            "diffuseMap" => decl.diffuse_map = Some(t.expect_string("diffuseMap")?),
            other => t.skip_unknown_field(other)?,
        }
        Ok(())
    })?;
    Ok(ResourceDecl::Material(decl))
}

fn parse_model(t: &mut Tokenizer<'_>) -> Result<ResourceDecl> {
    let name = t.expect_string("model name")?;
    let mut decl = ModelDecl {
        name,
        filename: String::new(),
        optimize: false,
    };
    t.each_field(|t, key| {
        match key {
            "filename" => decl.filename = t.expect_string("filename")?,
            "optimize" => decl.optimize = t.expect_bool("optimize")?,
            other => t.skip_unknown_field(other)?,
        }
        Ok(())
    })?;
    if decl.filename.is_empty() {
        return Err(t.error(format!("model \"{}\" has no filename", decl.name)));
    }
    Ok(ResourceDecl::Model(decl))
}

fn parse_script(t: &mut Tokenizer<'_>) -> Result<ResourceDecl> {
    let name = t.expect_string("script name")?;
    let mut decl = ScriptDecl {
        name,
        filename: String::new(),
        optimize: false,
    };
    t.each_field(|t, key| {
        match key {
            "filename" => decl.filename = t.expect_string("filename")?,
            "optimize" => decl.optimize = t.expect_bool("optimize")?,
            other => t.skip_unknown_field(other)?,
        }
        Ok(())
    })?;
    if decl.filename.is_empty() {
        return Err(t.error(format!("script \"{}\" has no filename", decl.name)));
    }
    Ok(ResourceDecl::Script(decl))
}

// ----------------------------------------------------------------------------
// Tokenizer
// ----------------------------------------------------------------------------

struct Token {
    text: String,
    line: usize,
    quoted: bool,
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    file: &'a str,
    line: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str, file: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            file,
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> KilnError {
        KilnError::Parse {
            file: self.file.to_string(),
            message: format!("line {}: {}", self.line, message.into()),
        }
    }

    fn next(&mut self) -> Result<Option<Token>> {
        loop {
            match self.chars.peek() {
                None => return Ok(None),
                Some('\n') => {
                    self.line += 1;
                    self.chars.next();
                }
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('#') => {
                    // comment to end of line
                    for c in self.chars.by_ref() {
                        if c == '\n' {
                            self.line += 1;
                            break;
                        }
                    }
                }
                Some('"') => {
                    self.chars.next();
                    let line = self.line;
                    let mut text = String::new();
                    loop {
                        match self.chars.next() {
                            Some('"') => break,
                            Some('\n') | None => {
                                return Err(self.error("unterminated string"));
                            }
                            Some(c) => text.push(c),
                        }
                    }
                    return Ok(Some(Token {
                        text,
                        line,
                        quoted: true,
                    }));
                }
                Some(&c) if c == '{' || c == '}' => {
                    self.chars.next();
                    return Ok(Some(Token {
                        text: c.to_string(),
                        line: self.line,
                        quoted: false,
                    }));
                }
                Some(_) => {
                    let line = self.line;
                    let mut text = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_whitespace() || c == '{' || c == '}' || c == '#' || c == '"' {
                            break;
                        }
                        text.push(c);
                        self.chars.next();
                    }
                    return Ok(Some(Token {
                        text,
                        line,
                        quoted: false,
                    }));
                }
            }
        }
    }

    fn next_or_eof(&mut self, what: &str) -> Result<Token> {
        self.next()?
            .ok_or_else(|| self.error(format!("unexpected end of file, expected {what}")))
    }

    fn expect_string(&mut self, what: &str) -> Result<String> {
        let tok = self.next_or_eof(what)?;
        if tok.quoted {
            Ok(tok.text)
        } else {
            Err(self.error(format!("expected quoted string for {what}, got '{}'", tok.text)))
        }
    }

    fn expect_word(&mut self, what: &str) -> Result<String> {
        let tok = self.next_or_eof(what)?;
        if tok.quoted || tok.text == "{" || tok.text == "}" {
            Err(self.error(format!("expected value for {what}")))
        } else {
            Ok(tok.text)
        }
    }

    fn expect_bool(&mut self, what: &str) -> Result<bool> {
        match self.expect_word(what)?.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(self.error(format!("expected true/false for {what}, got '{other}'"))),
        }
    }

    fn expect_f32(&mut self, what: &str) -> Result<f32> {
        let word = self.expect_word(what)?;
        word.parse::<f32>()
            .map_err(|_| self.error(format!("expected number for {what}, got '{word}'")))
    }

    /// Three floats, alpha fixed at 1.
    fn expect_color(&mut self, what: &str) -> Result<Vec4> {
        let r = self.expect_f32(what)?;
        let g = self.expect_f32(what)?;
        let b = self.expect_f32(what)?;
        Ok(Vec4::new(r, g, b, 1.0))
    }

    fn expect_filter(&mut self, what: &str) -> Result<FilterMode> {
        match self.expect_word(what)?.as_str() {
            "nearest" => Ok(FilterMode::Nearest),
            "linear" => Ok(FilterMode::Linear),
            other => Err(self.error(format!("unknown filter '{other}' for {what}"))),
        }
    }

    fn expect_wrap(&mut self, what: &str) -> Result<WrapMode> {
        match self.expect_word(what)?.as_str() {
            "repeat" => Ok(WrapMode::Repeat),
            "clamp" => Ok(WrapMode::ClampToEdge),
            "mirror" => Ok(WrapMode::MirroredRepeat),
            other => Err(self.error(format!("unknown wrap mode '{other}' for {what}"))),
        }
    }

    /// Consumes `{ key value ... }`, invoking `field` once per key.
    fn each_field<F>(&mut self, mut field: F) -> Result<()>
    where
        F: FnMut(&mut Self, &str) -> Result<()>,
    {
        let open = self.next_or_eof("'{'")?;
        if open.text != "{" {
            return Err(self.error(format!("expected '{{', got '{}'", open.text)));
        }
        loop {
            let tok = self.next_or_eof("field or '}'")?;
            if !tok.quoted && tok.text == "}" {
                return Ok(());
            }
            if tok.quoted || tok.text == "{" {
                return Err(self.error(format!("expected field name, got '{}'", tok.text)));
            }
            field(self, &tok.text)?;
        }
    }

    /// Warns about an unrecognized field and consumes its single value.
    fn skip_unknown_field(&mut self, key: &str) -> Result<()> {
        log::warn!("{}:{}: unknown field '{key}', skipping", self.file, self.line);
        self.next_or_eof("field value")?;
        Ok(())
    }

    /// Skips a whole `"name" { ... }` block after an unknown keyword.
    fn skip_declaration(&mut self) -> Result<()> {
        // optional name
        let tok = self.next_or_eof("declaration body")?;
        let tok = if tok.quoted {
            self.next_or_eof("'{'")?
        } else {
            tok
        };
        if tok.text != "{" {
            return Err(self.error(format!("expected '{{' after unknown keyword, got '{}'", tok.text)));
        }
        let mut depth = 1usize;
        while depth > 0 {
            let tok = self.next_or_eof("'}'")?;
            if !tok.quoted {
                match tok.text.as_str() {
                    "{" => depth += 1,
                    "}" => depth -= 1,
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_kinds() {
        let text = r#"
            # level 1
            shader "sky" { filename "sky.vert" stage vertex }
            texture "brick" {
                filename "brick.png"
                internalFormat srgb
                mipmapped true
                wrapModeS clamp
            }
            material "wall" { diffuse 0.8 0.7 0.6 diffuseMap "brick" shininess 16 }
            model "room" { filename "room.obj" optimize true }
            script "spin" { filename "spin.ks" }
        "#;
        let manifest = parse_manifest_str(text, "level1.res").unwrap();
        assert_eq!(manifest.decls.len(), 5);
        assert_eq!(manifest.decls[0].kind(), ResourceKind::Shader);
        assert_eq!(manifest.decls[1].name(), "brick");

        let ResourceDecl::Texture(tex) = &manifest.decls[1] else {
            panic!("expected texture");
        };
        assert!(tex.srgb);
        assert!(tex.mipmapped);
        assert_eq!(tex.sampler.wrap_s, WrapMode::ClampToEdge);

        let ResourceDecl::Material(mat) = &manifest.decls[2] else {
            panic!("expected material");
        };
        assert_eq!(mat.diffuse_map.as_deref(), Some("brick"));
        assert_eq!(mat.shininess, 16.0);
    }

    #[test]
    fn unknown_keyword_is_skipped_not_fatal() {
        let text = r#"
            soundbank "boom" { filename "boom.wav" volume 0.5 }
            texture "ok" { filename "ok.png" }
        "#;
        let manifest = parse_manifest_str(text, "mixed.res").unwrap();
        assert_eq!(manifest.decls.len(), 1);
        assert_eq!(manifest.decls[0].name(), "ok");
    }

    #[test]
    fn missing_filename_is_a_parse_error() {
        let text = r#"texture "broken" { mipmapped true }"#;
        assert!(parse_manifest_str(text, "bad.res").is_err());
    }

    #[test]
    fn unterminated_string_is_a_parse_error() {
        let text = "texture \"oops { filename \"x.png\" }";
        assert!(parse_manifest_str(text, "bad.res").is_err());
    }

    #[test]
    fn params_key_changes_with_parameters() {
        let a = parse_manifest_str(r#"texture "t" { filename "t.png" }"#, "a.res").unwrap();
        let b = parse_manifest_str(
            r#"texture "t" { filename "t.png" mipmapped true }"#,
            "b.res",
        )
        .unwrap();
        assert_ne!(a.decls[0].params_key(), b.decls[0].params_key());
    }
}
