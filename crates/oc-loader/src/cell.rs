//! PS3 PPU image loader
//!
//! [`CellLoader`] drives one load from start to end: structure declarations,
//! segment mapping, relocation, module/process info and library tables,
//! then the image's own symbols last.

use crate::elf::{ElfImage, SymbolTable};
use crate::info::{apply_module_info, apply_process_info, ModuleInfo, ProcessParam};
use crate::layout::record_types;
use crate::libs::WalkStats;
use crate::nid::NidDatabase;
use crate::reloc::{apply_relocations, RelocationOptions, RelocationStats};
use crate::segments::map_segments;
use crate::symbols::apply_symbols;
use crate::toc::{executable_gp, module_info_gp, resolve_gp, LoadContext};
use crate::variant::Variant;
use oc_analysis::AnalysisDatabase;
use oc_core::config::LoaderConfig;
use oc_core::error::LoaderError;
use tracing::{debug, info, warn};

/// Per-load settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Requested base for PRX images
    pub relocation_base: u32,
    pub relocation: RelocationOptions,
}

impl LoadOptions {
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self {
            relocation_base: config.relocation_base,
            relocation: RelocationOptions {
                max_segments: config.max_relocation_segments,
            },
        }
    }
}

/// What a load did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub variant: Variant,
    pub relocation_base: u32,
    pub gp: u32,
    pub regions: usize,
    pub relocations: RelocationStats,
    pub libraries: WalkStats,
    pub module: Option<ModuleInfo>,
    pub process_param: Option<ProcessParam>,
    pub symbols_applied: usize,
}

/// Register every record layout the loader declares
pub fn declare_structures(db: &mut dyn AnalysisDatabase) {
    for ty in record_types() {
        debug!("Declaring structure {} ({} bytes)", ty.name, ty.size());
        db.define_record_type(ty);
    }
}

/// Loader for one PPU executable or PRX
pub struct CellLoader<'a> {
    image: &'a ElfImage,
    nids: &'a NidDatabase,
    variant: Variant,
    options: LoadOptions,
}

impl<'a> CellLoader<'a> {
    /// Prepare a load. The relocation base is dropped for executables,
    /// which always sit at their linked addresses.
    pub fn new(image: &'a ElfImage, nids: &'a NidDatabase, mut options: LoadOptions) -> Self {
        let variant = Variant::detect(image);
        if !variant.is_prx() && options.relocation_base != 0 {
            warn!(
                "Ignoring relocation base 0x{:08x} for an executable",
                options.relocation_base
            );
            options.relocation_base = 0;
        }

        Self {
            image,
            nids,
            variant,
            options,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn relocation_base(&self) -> u32 {
        self.options.relocation_base
    }

    /// Run the whole load against `db`
    ///
    /// Only a missing segment and section table aborts the load; every
    /// other problem is logged and skipped. On error `db` keeps whatever
    /// was written before the failure.
    pub fn apply(&self, db: &mut dyn AnalysisDatabase) -> Result<LoadReport, LoaderError> {
        let image = self.image;
        let mut ctx = LoadContext::new(self.options.relocation_base);

        info!("Declaring structures...");
        declare_structures(db);

        info!("Applying segments...");
        let regions = map_segments(image, &ctx, db)?;

        let symbols = SymbolTable::decode(image);

        let mut report = LoadReport {
            variant: self.variant,
            relocation_base: ctx.relocation_base,
            gp: 0,
            regions,
            relocations: RelocationStats::default(),
            libraries: WalkStats::default(),
            module: None,
            process_param: None,
            symbols_applied: 0,
        };

        match self.variant {
            Variant::LegacyPrx | Variant::ModernPrx => {
                ctx.gp = resolve_gp(self.variant, image, ctx.relocation_base, &*db);

                info!("Applying relocations...");
                report.relocations = apply_relocations(
                    self.variant,
                    image,
                    &symbols,
                    &ctx,
                    &self.options.relocation,
                    db,
                );

                if self.variant == Variant::ModernPrx {
                    let relocated = module_info_gp(image, ctx.relocation_base, &*db);
                    if relocated != ctx.gp {
                        warn!(
                            "Module info gp 0x{:08x} differs from the 0x{:08x} used for TOC relocations",
                            relocated, ctx.gp
                        );
                    }
                    ctx.gp = relocated;
                }

                info!("Applying module info...");
                if let Some((module, stats)) = apply_module_info(image, &ctx, self.nids, db) {
                    report.module = Some(module);
                    report.libraries = stats;
                }
            }
            Variant::Executable => {
                ctx.gp = executable_gp(image, &*db);

                info!("Applying process info...");
                let (param, stats) = apply_process_info(image, self.nids, db);
                report.process_param = param;
                report.libraries = stats;

                db.register_entry_point(image.entry_address() as u32, "_start", true);
            }
        }

        info!("gpValue = 0x{:08x}", ctx.gp);
        db.set_toc(ctx.gp);
        report.gp = ctx.gp;

        report.symbols_applied = apply_symbols(self.variant, image, &symbols, &ctx, db);

        info!(
            "Loaded {} with {} regions, {} relocations, {} libraries, {}/{} NIDs resolved",
            self.variant,
            report.regions,
            report.relocations.applied,
            report.libraries.libraries,
            report.libraries.resolved,
            report.libraries.resolved + report.libraries.unresolved
        );
        Ok(report)
    }
}
