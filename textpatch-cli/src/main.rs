use clap::{ArgAction, Parser};
use std::path::PathBuf;

use textpatch_core::{codec, run, PatchSettings};

#[derive(Debug, Parser)]
#[command(
    name = "textpatch",
    version,
    about = "Replace length-prefixed strings inside binary game resources"
)]
struct Args {
    /// Directive file (`id|from|to`, `@offset|bytes`, `*id|address`)
    #[arg(required_unless_present = "debug_decode")]
    directives: Option<PathBuf>,

    /// Binary file to patch
    #[arg(required_unless_present = "debug_decode")]
    target: Option<PathBuf>,

    /// Strings are 6-bit packed (ECL blocks); the file may be resized
    /// internally but must end at its original size
    #[arg(short = 'e', long)]
    compressed: bool,

    /// Write the patched file here instead of overwriting the target
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with boundary tunables, pointer base and character remap
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a per-directive report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Debug-only: decode packed text from a file and print it. Patching is
    /// skipped when this is provided.
    #[arg(long, value_name = "FILE", hide = true)]
    debug_decode: Option<PathBuf>,

    /// Hex offset for --debug-decode
    #[arg(long, value_name = "HEX", value_parser = parse_hex_offset, default_value = "0", hide = true)]
    debug_offset: usize,

    /// Byte count for --debug-decode
    #[arg(long, value_name = "N", default_value_t = 32, hide = true)]
    debug_len: usize,
}

fn parse_hex_offset(s: &str) -> Result<usize, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    usize::from_str_radix(digits, 16).map_err(|e| format!("invalid hex offset '{s}': {e}"))
}

/// `-v`/`-q` override `RUST_LOG`; without either it defaults to info.
fn log_level(verbose: u8, quiet: bool) -> Option<log::LevelFilter> {
    match (verbose, quiet) {
        (0, false) => None,
        (0, true) => Some(log::LevelFilter::Error),
        (1, _) => Some(log::LevelFilter::Debug),
        _ => Some(log::LevelFilter::Trace),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = log_level(verbose, quiet) {
        builder.filter_level(level);
    }
    builder.init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    // Debug path: decode a packed block and exit.
    if let Some(path) = args.debug_decode.as_ref() {
        match std::fs::read(path) {
            Ok(data) => {
                let start = args.debug_offset.min(data.len());
                let end = start.saturating_add(args.debug_len).min(data.len());
                println!("{}", codec::decode(&data[start..end]));
            }
            Err(e) => {
                eprintln!("Failed to read {:?}: {}", path, e);
                std::process::exit(1);
            }
        }
        return;
    }

    let settings = PatchSettings {
        // clap enforces both positionals unless --debug-decode was given,
        // and that case has already returned.
        directives_path: args
            .directives
            .expect("directive file is required unless --debug-decode is used"),
        target_path: args
            .target
            .expect("target file is required unless --debug-decode is used"),
        output_path: args.output,
        config_path: args.config,
        compressed: args.compressed,
        report_path: args.report,
    };

    match run(&settings) {
        Ok(summary) => {
            log::info!(
                "Complete. {} of {} directives applied.",
                summary.applied_count(),
                summary.reports.len()
            );
        }
        Err(err) => {
            if err.is_invariant_violation() {
                eprintln!("Error: {err} (no output written)");
            } else {
                eprintln!("Error: {err}");
            }
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{log_level, parse_hex_offset, Args};
    use clap::Parser;
    use log::LevelFilter;

    #[test]
    fn verbosity_flags_pick_the_filter() {
        assert_eq!(log_level(0, false), None);
        assert_eq!(log_level(0, true), Some(LevelFilter::Error));
        assert_eq!(log_level(1, false), Some(LevelFilter::Debug));
        assert_eq!(log_level(3, false), Some(LevelFilter::Trace));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        let args = Args::try_parse_from(["TextPatch-CLI", "-vv", "s.txt", "t.bin"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(Args::try_parse_from(["TextPatch-CLI", "-v", "-q", "s.txt", "t.bin"]).is_err());
    }

    #[test]
    fn debug_decode_takes_file_offset_and_length() {
        let args = Args::try_parse_from([
            "TextPatch-CLI",
            "--debug-decode",
            "block.bin",
            "--debug-offset",
            "0x1A",
            "--debug-len",
            "8",
        ])
        .unwrap();
        assert_eq!(args.debug_decode.unwrap().to_str(), Some("block.bin"));
        assert_eq!(args.debug_offset, 0x1A);
        assert_eq!(args.debug_len, 8);
        assert!(args.directives.is_none());

        assert_eq!(parse_hex_offset("ff"), Ok(0xFF));
        assert!(parse_hex_offset("0xZZ").is_err());
    }
}
