//! Script conversion.
//!
//! Validates the source as UTF-8 and, with `optimize` set, drops
//! whole-line comments (`//` and `--`) so shipped scripts carry no author
//! notes. Execution belongs to the scripting runtime, not the pipeline.

use std::path::PathBuf;

use crate::convert::{AssetStatus, Converter, ConverterCore, ConvertStatus};
use crate::database::ResourceDatabase;
use crate::errors::{KilnError, Result};
use crate::fastfile::{FastfileReader, FastfileWriter};
use crate::manifest::{ResourceDecl, ScriptDecl};
use crate::resources::{ResourceKind, Script};
use crate::settings::PipelineSettings;

pub struct ScriptConverter {
    decl: ScriptDecl,
    source_path: PathBuf,
    core: ConverterCore,
}

impl ScriptConverter {
    #[must_use]
    pub fn new(decl: ScriptDecl, settings: &PipelineSettings) -> Self {
        let source_path = settings.resolve_source(&decl.filename);
        let core = ConverterCore::new(
            ResourceKind::Script,
            decl.name.clone(),
            settings,
            &source_path,
            vec![source_path.clone()],
            &ResourceDecl::Script(decl.clone()).params_key(),
        );
        Self {
            decl,
            source_path,
            core,
        }
    }
}

impl Converter for ScriptConverter {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Script
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
            let text = match std::fs::read_to_string(source_path) {
                Ok(text) => text,
                Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                    return Err(KilnError::Parse {
                        file: source_path.display().to_string(),
                        message: "script is not valid UTF-8".to_string(),
                    });
                }
                Err(err) => {
                    return Err(KilnError::Convert {
                        name: decl.name.clone(),
                        message: format!("cannot read {}: {err}", source_path.display()),
                    });
                }
            };

            let text = if decl.optimize {
                strip_comment_lines(&text)
            } else {
                text
            };

            let script = Script {
                name: decl.name.clone(),
                text,
                source: None,
            };
            let mut w = FastfileWriter::new();
            script.serialize(&mut w);
            Ok(w.into_bytes())
        })
    }

    fn load_into(&self, staging: &ResourceDatabase) -> Result<()> {
        let payload = self.core.read_artifact_payload()?;
        let mut reader = FastfileReader::section(&payload, &self.decl.name);
        let mut script = Script::deserialize(&mut reader)?;
        script.source = Some(self.core.source_ref(ResourceDecl::Script(self.decl.clone())));
        staging.scripts.insert(script.name.clone(), script);
        Ok(())
    }

    fn artifact_payload(&self) -> Result<Vec<u8>> {
        self.core.read_artifact_payload()
    }

    fn stage_fallback(&self, staging: &ResourceDatabase) {
        staging
            .scripts
            .insert(self.decl.name.clone(), Script::fallback(&self.decl.name));
    }
}

fn strip_comment_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("//") || trimmed.starts_with("--") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
