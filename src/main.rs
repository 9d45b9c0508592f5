//! cell-ldr - PS3 PPU executable/PRX loader
//!
//! Loads one image into a fresh in-memory program, then prints the load
//! report and every name the loader recovered.

use clap::Parser;
use oc_analysis::Program;
use oc_core::{Config, LoaderError, LogLevel, Result};
use oc_loader::{accept_file, CellLoader, ElfImage, LoadOptions, LoadReport, NidDatabase};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cell-ldr", version, about = "Load a PS3 PPU executable or PRX")]
struct Args {
    /// ELF executable or PRX to load
    image: PathBuf,

    /// Relocation base for PRX images (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_address)]
    base: Option<u32>,

    /// NID database (JSON or TOML)
    #[arg(long = "nid-db")]
    nid_db: Option<PathBuf>,

    /// Configuration file (defaults to the per-user config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// off, error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<LogLevel>,
}

fn parse_address(text: &str) -> std::result::Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", text, e))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_err) = match &args.config {
        Some(path) => (Config::load_from(path)?, None),
        None => match Config::load() {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };

    if let Some(level) = args.log_level {
        config.debug.log_level = level;
    }
    oc_core::logging::init(config.debug.log_level);

    if let Some(e) = config_err {
        tracing::warn!("Using default configuration: {}", e);
    }
    if let Some(base) = args.base {
        config.loader.relocation_base = base;
    }
    if let Some(path) = args.nid_db {
        config.loader.nid_database = path;
    }

    let nids = NidDatabase::open(&config.loader.nid_database)?;

    let image = ElfImage::open(&args.image)?;
    let Some(format) = accept_file(image.data()) else {
        return Err(LoaderError::UnsupportedFormat(format!(
            "{} is not a PS3 PPU image",
            args.image.display()
        ))
        .into());
    };
    tracing::info!("{}: {}", args.image.display(), format.display_name());

    let mut program = Program::new();
    let report = CellLoader::new(&image, &nids, LoadOptions::from_config(&config.loader))
        .apply(&mut program)
        .inspect_err(|e| tracing::error!("Failed to load {}: {}", args.image.display(), e))?;

    print_report(&report);
    print_names(&program);
    Ok(())
}

fn print_report(report: &LoadReport) {
    println!("variant          {}", report.variant);
    println!("relocation base  0x{:08x}", report.relocation_base);
    println!("gp               0x{:08x}", report.gp);
    println!("regions          {}", report.regions);
    println!(
        "relocations      {} applied, {} skipped",
        report.relocations.applied, report.relocations.skipped
    );
    println!(
        "libraries        {} ({} NIDs resolved, {} unresolved)",
        report.libraries.libraries, report.libraries.resolved, report.libraries.unresolved
    );
    if let Some(module) = &report.module {
        println!(
            "module           {} v{}.{}",
            module.name, module.version[0], module.version[1]
        );
    }
    if let Some(param) = &report.process_param {
        println!(
            "process param    sdk 0x{:08x}, priority {}, stack 0x{:x}",
            param.sdk_version, param.primary_prio, param.primary_stacksize
        );
    }
    println!("symbols          {}", report.symbols_applied);
}

fn print_names(program: &Program) {
    println!();
    for entry in program.entry_points() {
        let tag = if entry.primary { " (primary)" } else { "" };
        println!("entry  0x{:08x}  {}{}", entry.addr, entry.name, tag);
    }
    for import in program.imports() {
        println!("import 0x{:08x}  {} ({})", import.addr, import.name, import.library);
    }
    for (addr, name) in program.names() {
        println!("name   0x{:08x}  {}", addr, name);
    }
}
