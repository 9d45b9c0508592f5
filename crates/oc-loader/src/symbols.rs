//! Final symbol pass
//!
//! Runs last so names from the image's own symbol table replace anything
//! the table walker synthesized for the same address.

use crate::elf::{shn, ElfImage, SymbolTable, STT_FILE, STT_FUNC, STT_OBJECT};
use crate::toc::LoadContext;
use crate::variant::Variant;
use oc_analysis::AnalysisDatabase;
use tracing::{debug, info, trace};

/// Apply every symbol of an allocatable section. Returns how many were applied.
pub fn apply_symbols(
    variant: Variant,
    image: &ElfImage,
    symbols: &SymbolTable,
    ctx: &LoadContext,
    db: &mut dyn AnalysisDatabase,
) -> usize {
    if symbols.is_empty() {
        debug!("No symbols to apply");
        return 0;
    }

    info!("Applying symbols...");

    let sections = image.sections();
    let mut applied = 0;

    for sym in symbols.iter() {
        if sym.section == shn::ABS {
            continue;
        }
        let Some(owner) = sections.get(sym.section as usize) else {
            continue;
        };
        if !owner.is_alloc() {
            continue;
        }

        let mut value = sym.value as u32;
        if variant.is_prx() {
            value = value.wrapping_add(ctx.rebase(owner.sh_addr));
        }

        match sym.sym_type() {
            STT_OBJECT if !sym.name.is_empty() => {
                db.define_name(value, &sym.name);
            }
            STT_FILE => {
                db.annotate(value, &format!("Source File: {}", sym.name));
            }
            STT_FUNC if !sym.name.is_empty() => {
                db.define_name(value, &sym.name);
                db.mark_code(value);
            }
            _ => continue,
        }
        trace!("Symbol {} at 0x{:08x}", sym.name, value);
        applied += 1;
    }

    debug!("Applied {} of {} symbols", applied, symbols.len());
    applied
}
