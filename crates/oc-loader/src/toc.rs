//! Relocation base and TOC (r2 / gp) resolution

use crate::elf::ElfImage;
use crate::layout::module_info;
use crate::variant::Variant;
use oc_analysis::AnalysisDatabase;
use tracing::{debug, warn};

/// Values every address computation of a load depends on
///
/// Built once the variant is known and passed by reference to each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadContext {
    /// Added to every file-derived virtual address. Always 0 for executables.
    pub relocation_base: u32,
    /// Resolved TOC value; 0 when it could not be found
    pub gp: u32,
}

impl LoadContext {
    pub fn new(relocation_base: u32) -> Self {
        Self {
            relocation_base,
            gp: 0,
        }
    }

    /// File virtual address to final address
    #[inline]
    pub fn rebase(&self, vaddr: u64) -> u32 {
        (vaddr as u32).wrapping_add(self.relocation_base)
    }
}

/// Address of `_scemoduleinfo` in a PRX
///
/// The first segment's `p_paddr` holds the file offset of the module info,
/// so `p_paddr - p_offset` is its distance from the segment start.
pub fn module_info_address(image: &ElfImage, relocation_base: u32) -> Option<u32> {
    let first = image.segments().first()?;
    let vaddr = (first.p_vaddr as u32).wrapping_add(relocation_base);
    let delta = (first.p_paddr as u32).wrapping_sub(first.p_offset as u32);
    Some(vaddr.wrapping_add(delta))
}

/// Legacy PRX: the `.toc` section address
pub fn legacy_gp(image: &ElfImage, relocation_base: u32) -> u32 {
    match image.section_by_name(".toc") {
        Some((_, toc)) => (toc.sh_addr as u32).wrapping_add(relocation_base),
        None => {
            warn!("Legacy PRX has no .toc section, TOC-relative relocations will use gp = 0");
            0
        }
    }
}

/// Modern PRX: the `gp_value` field of the module info, as currently stored
///
/// Before relocation the field holds a file address; once relocations ran
/// it holds the final one.
pub fn module_info_gp(image: &ElfImage, relocation_base: u32, db: &dyn AnalysisDatabase) -> u32 {
    let Some(modinfo) = module_info_address(image, relocation_base) else {
        warn!("PRX has no program headers, cannot locate module info gp");
        return 0;
    };

    let field = modinfo.wrapping_add(module_info::GP_VALUE);
    db.read_u32(field).unwrap_or_else(|e| {
        warn!("Cannot read module info gp at 0x{:08x}: {}", field, e);
        0
    })
}

/// Executable: the word following the entry point
///
/// `_start` loads r2 with an `lwz` from `entry + 4`.
pub fn executable_gp(image: &ElfImage, db: &dyn AnalysisDatabase) -> u32 {
    let addr = (image.entry_address() as u32).wrapping_add(4);
    db.read_u32(addr).unwrap_or_else(|e| {
        warn!("Cannot read gp at entry + 4 (0x{:08x}): {}", addr, e);
        0
    })
}

/// Modern PRX gp for patching TOC-relative relocations
///
/// The field is not relocated yet, so a non-zero value is rebased here.
pub fn unrelocated_module_info_gp(
    image: &ElfImage,
    relocation_base: u32,
    db: &dyn AnalysisDatabase,
) -> u32 {
    match module_info_gp(image, relocation_base, db) {
        0 => 0,
        raw => raw.wrapping_add(relocation_base),
    }
}

/// Resolve gp the way `variant` defines it, before any relocation is applied.
/// Segments must already be mapped.
pub fn resolve_gp(
    variant: Variant,
    image: &ElfImage,
    relocation_base: u32,
    db: &dyn AnalysisDatabase,
) -> u32 {
    let gp = match variant {
        Variant::LegacyPrx => legacy_gp(image, relocation_base),
        Variant::ModernPrx => unrelocated_module_info_gp(image, relocation_base, db),
        Variant::Executable => executable_gp(image, db),
    };
    debug!("Resolved gp for {}: 0x{:08x}", variant, gp);
    gp
}
