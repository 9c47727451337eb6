//! Offline conversion tool.
//!
//! Usage:
//!   kiln-convert assets/level1.res                 # convert what's stale
//!   kiln-convert --check assets/level1.res         # report status only
//!   kiln-convert --force assets/*.res              # rebuild everything
//!
//! Exit code is zero only when every description file checks out or
//! converts cleanly, so the tool slots into build scripts as-is.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use kiln::convert::{AssetStatus, ConvertStatus};
use kiln::settings::PipelineSettings;
use kiln::CompositeConverter;

#[derive(Parser)]
#[command(name = "kiln-convert")]
#[command(about = "Convert authored assets into cached fastfiles")]
struct Cli {
    /// Resource description files to process
    #[arg(required = true)]
    manifests: Vec<PathBuf>,

    /// Directory source filenames are resolved against
    #[arg(long, default_value = "assets")]
    asset_root: PathBuf,

    /// Directory cache artifacts are written to
    #[arg(long, default_value = "assets/.cache")]
    cache_dir: PathBuf,

    /// Reconvert everything, ignoring timestamps
    #[arg(long, short)]
    force: bool,

    /// Report staleness without converting
    #[arg(long)]
    check: bool,

    /// Verbose logging (repeat for more)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut settings = PipelineSettings::new(&cli.asset_root, &cli.cache_dir);
    settings.force = cli.force;

    let mut failed = false;
    for path in &cli.manifests {
        let mut composite = match CompositeConverter::from_file(path, &settings) {
            Ok(composite) => composite,
            Err(err) => {
                log::error!("{}: {err}", path.display());
                failed = true;
                continue;
            }
        };

        let status = composite.check_dependencies();
        if cli.check {
            match status {
                AssetStatus::UpToDate => log::info!("{}: up to date", path.display()),
                AssetStatus::OutOfDate => {
                    log::info!("{}: out of date", path.display());
                    failed = true;
                }
                AssetStatus::CheckingError => {
                    log::error!("{}: dependency check failed", path.display());
                    failed = true;
                }
            }
            continue;
        }

        if status == AssetStatus::UpToDate && !cli.force {
            log::info!("{}: up to date", path.display());
            continue;
        }

        match composite.convert(cli.force) {
            ConvertStatus::Success | ConvertStatus::HelpDisplayed => {
                log::info!("{}: wrote {}", path.display(), composite.output_path().display());
            }
            ConvertStatus::ParseError => {
                log::error!("{}: parse error, fix the source and retry", path.display());
                failed = true;
            }
            ConvertStatus::Error => {
                log::error!("{}: conversion failed", path.display());
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
