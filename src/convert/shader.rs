//! Shader conversion.
//!
//! The transform preprocesses shader source text: comments are stripped,
//! trailing whitespace removed and brace balance validated. Actual GPU
//! compilation is the renderer's job; what we cache is the cleaned source
//! the renderer hands to its backend.

use std::path::PathBuf;

use crate::convert::{AssetStatus, Converter, ConverterCore, ConvertStatus};
use crate::database::ResourceDatabase;
use crate::errors::{KilnError, Result};
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::manifest::{ResourceDecl, ShaderDecl};
use crate::resources::{ResourceKind, Shader};
use crate::settings::PipelineSettings;

pub struct ShaderConverter {
    decl: ShaderDecl,
    source_path: PathBuf,
    core: ConverterCore,
}

impl ShaderConverter {
    #[must_use]
    pub fn new(decl: ShaderDecl, settings: &PipelineSettings) -> Self {
        let source_path = settings.resolve_source(&decl.filename);
        let core = ConverterCore::new(
            ResourceKind::Shader,
            decl.name.clone(),
            settings,
            &source_path,
            vec![source_path.clone()],
            &ResourceDecl::Shader(decl.clone()).params_key(),
        );
        Self {
            decl,
            source_path,
            core,
        }
    }

}

impl Converter for ShaderConverter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Shader
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
            let compiled = preprocess(&text, &source_path.display().to_string())?;
            let shader = Shader {
                name: decl.name.clone(),
                stage: decl.stage,
                compiled,
                source: None,
            };
            let mut w = FastfileWriter::new();
            shader.serialize(&mut w);
            Ok(w.into_bytes())
        })
    }

    fn load_into(&self, staging: &ResourceDatabase) -> Result<()> {
        let payload = self.core.read_artifact_payload()?;
        let mut reader = FastfileReader::section(&payload, &self.decl.name);
        let mut shader = Shader::deserialize(&mut reader)?;
        shader.source = Some(self.core.source_ref(ResourceDecl::Shader(self.decl.clone())));
        staging.shaders.insert(shader.name.clone(), shader);
        Ok(())
    }

    fn artifact_payload(&self) -> Result<Vec<u8>> {
        self.core.read_artifact_payload()
    }

    fn stage_fallback(&self, staging: &ResourceDatabase) {
        staging
            .shaders
            .insert(self.decl.name.clone(), Shader::fallback(&self.decl.name));
    }
}

/// Strips `//` and `/* */` comments, trims trailing whitespace and checks
/// brace balance. Unbalanced braces are a parse error.
fn preprocess(text: &str, file: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut depth: i64 = 0;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                let mut closed = false;
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    return Err(KilnError::Parse {
                        file: file.to_string(),
                        message: "unterminated block comment".to_string(),
                    });
                }
            }
            '{' => {
                depth += 1;
                out.push(c);
            }
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(KilnError::Parse {
                        file: file.to_string(),
                        message: "unbalanced '}'".to_string(),
                    });
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    if depth != 0 {
        return Err(KilnError::Parse {
            file: file.to_string(),
            message: "unbalanced '{'".to_string(),
        });
    }

    // Drop trailing whitespace and blank lines left by stripped comments.
    let cleaned: Vec<&str> = out.lines().map(str::trim_end).collect();
    let mut result = String::with_capacity(out.len());
    let mut last_blank = false;
    for line in cleaned {
        if line.is_empty() {
            if !last_blank && !result.is_empty() {
                result.push('\n');
            }
            last_blank = true;
        } else {
            result.push_str(line);
            result.push('\n');
            last_blank = false;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments() {
        let src = "void main() { // entry\n    /* nothing */ gl_Position = vec4(0.0);\n}\n";
        let out = preprocess(src, "test.vert").unwrap();
        assert!(!out.contains("entry"));
        assert!(!out.contains("nothing"));
        assert!(out.contains("gl_Position"));
    }

    #[test]
    fn unbalanced_braces_are_a_parse_error() {
        assert!(preprocess("void main() {", "test.vert").is_err());
        assert!(preprocess("}", "test.vert").is_err());
    }

    #[test]
    fn unterminated_block_comment_is_a_parse_error() {
        assert!(preprocess("/* forever", "test.vert").is_err());
    }
}
