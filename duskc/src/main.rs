//! `duskc` — compiles a Dusk source file to a SPIR-V binary module.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dusk source file to compile.
    input: PathBuf,

    /// Output SPIR-V file path. Defaults to `{input}.spv`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Name of the entry point to emit. Emits every declared entry point
    /// if not given.
    #[arg(short, long)]
    entry: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let source = fs::read_to_string(&args.input).unwrap_or_else(|e| {
        eprintln!("error: failed to read {}: {}", args.input.display(), e);
        exit(1);
    });

    let path = args.input.to_string_lossy().into_owned();
    let words = dusk::compile(&path, &source, args.entry.as_deref()).unwrap_or_else(|diagnostics| {
        for diag in &diagnostics {
            eprintln!("{diag}");
        }
        exit(1);
    });

    let out_path = args.output.unwrap_or_else(|| args.input.with_extension("spv"));
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in &words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    let mut out_file = fs::File::create(&out_path).unwrap_or_else(|e| {
        eprintln!("error: failed to open {}: {}", out_path.display(), e);
        exit(1);
    });
    out_file.write_all(&bytes).unwrap_or_else(|e| {
        eprintln!("error: failed to write {}: {}", out_path.display(), e);
        exit(1);
    });
}
