use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

pub mod codec;
pub mod config;
pub mod directive;
pub mod engine;
pub mod locate;
pub mod reloc;
pub mod slack;

pub use config::{CharMap, PatchConfig};
pub use directive::{parse_directives, Directive, DirectiveError};
pub use engine::{DirectiveReport, Mode, Outcome, PatchSession};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSettings {
    pub directives_path: PathBuf,
    pub target_path: PathBuf,
    /// Where the patched file goes; the target is overwritten when unset.
    pub output_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub compressed: bool,
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("directive error: {0}")]
    Directive(#[from] DirectiveError),
    #[error("compressed output is {actual} bytes but must stay {expected} bytes")]
    SizeInvariantViolation { expected: usize, actual: usize },
    #[error("malformed relocation{}: {detail}", pointer_suffix(.index))]
    MalformedRelocation { index: Option<usize>, detail: String },
}

impl PatchError {
    /// Fatal errors raised while directives were being applied, as opposed
    /// to failures loading inputs.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            PatchError::SizeInvariantViolation { .. } | PatchError::MalformedRelocation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;

fn pointer_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" (pointer #{i})"),
        None => String::new(),
    }
}

/// Everything a finished run reports back.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub target_path: PathBuf,
    pub output_path: PathBuf,
    pub mode: Mode,
    pub original_len: usize,
    pub final_len: usize,
    pub cumulative_delta: isize,
    pub pointer_count: usize,
    pub reports: Vec<DirectiveReport>,
}

impl RunSummary {
    pub fn applied_count(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_applied()).count()
    }

    /// Plain-text report, one line per directive.
    pub fn render(&self) -> String {
        let mut log = format!(
            "target: {} -> {}\n",
            self.target_path.display(),
            self.output_path.display()
        );
        log.push_str(&format!("mode: {:?}\n", self.mode));
        log.push_str(&format!(
            "size: {} -> {} bytes (cumulative delta {})\n",
            self.original_len, self.final_len, self.cumulative_delta
        ));
        log.push_str(&format!("pointers tracked: {}\n", self.pointer_count));
        log.push_str(&format!(
            "directives: {} applied of {}\n",
            self.applied_count(),
            self.reports.len()
        ));
        for (i, report) in self.reports.iter().enumerate() {
            log.push_str(&format!("  [{:>4}] {}: {}\n", i + 1, report.label, report.outcome));
        }
        log
    }
}

/// Patch one file according to a directive file.
///
/// Nothing is written unless every directive applied without a fatal
/// error and the size invariant holds.
pub fn run(settings: &PatchSettings) -> Result<RunSummary> {
    if !settings.target_path.exists() {
        return Err(PatchError::Config(format!(
            "Target file does not exist: {}",
            settings.target_path.display()
        )));
    }

    let config = match &settings.config_path {
        Some(path) => PatchConfig::load(path)?,
        None => PatchConfig::default(),
    };

    let source = fs::read_to_string(&settings.directives_path)?;
    let directives = parse_directives(&source)?;
    info!(
        "Loaded {} directives from {}",
        directives.len(),
        settings.directives_path.display()
    );

    let data = fs::read(&settings.target_path)?;
    info!(
        "Loaded binary file {} ({} bytes)",
        settings.target_path.display(),
        data.len()
    );

    let mode = if settings.compressed {
        Mode::Compressed
    } else {
        Mode::Plain
    };

    let mut session = PatchSession::new(data, mode, config)?;
    let original_len = session.original_len();
    info!("Beginning replacements.");
    let reports = session.apply_all(&directives)?;
    let cumulative_delta = session.cumulative_delta();
    let pointer_count = session.relocations().len();
    let output = session.finish()?;

    let output_path = settings
        .output_path
        .clone()
        .unwrap_or_else(|| settings.target_path.clone());
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    info!("Writing file {}", output_path.display());
    fs::write(&output_path, &output)?;

    let summary = RunSummary {
        target_path: settings.target_path.clone(),
        output_path,
        mode,
        original_len,
        final_len: output.len(),
        cumulative_delta,
        pointer_count,
        reports,
    };

    let skipped = summary.reports.len() - summary.applied_count();
    if skipped > 0 {
        warn!("{} directive(s) were not applied", skipped);
    }

    if let Some(report_path) = &settings.report_path {
        fs::write(report_path, summary.render())?;
    }

    Ok(summary)
}
