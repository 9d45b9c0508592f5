//! Relocation engine
//!
//! Two record layouts exist. Legacy PRX files keep `SHT_RELA` sections
//! whose records index the symbol table; every later PRX keeps a single
//! `PT_SCE_PPURELA` segment whose records index program headers. Both feed
//! the same per-type patch rules in [`patch_value`].

use crate::elf::{pt, r_ppc64, rela_records, sht, ElfImage, Elf64Rela, SymbolTable};
use crate::toc::LoadContext;
use crate::variant::Variant;
use oc_analysis::{AnalysisDatabase, Width};
use oc_core::error::DatabaseError;
use tracing::{debug, info, trace, warn};

/// Branch displacement field of an I-form instruction (bits 2..25)
pub const REL24_MASK: u32 = 0x03FF_FFFC;

/// DS-form displacement field (low 16 bits, 4-byte aligned)
pub const TOC16_DS_MASK: u32 = 0xFFFC;

/// Relocation types this engine applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocType {
    Addr32,
    Addr16Lo,
    Addr16Ha,
    Rel24,
    Toc16,
    Toc16Ds,
    TlsGd,
}

impl RelocType {
    /// Map a raw `R_PPC64_*` value. `None` for `R_PPC64_NONE` and every
    /// unsupported type.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            r_ppc64::ADDR32 => Some(Self::Addr32),
            r_ppc64::ADDR16_LO => Some(Self::Addr16Lo),
            r_ppc64::ADDR16_HA => Some(Self::Addr16Ha),
            r_ppc64::REL24 => Some(Self::Rel24),
            r_ppc64::TOC16 => Some(Self::Toc16),
            r_ppc64::TOC16_DS => Some(Self::Toc16Ds),
            r_ppc64::TLSGD => Some(Self::TlsGd),
            _ => None,
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::Addr32 => r_ppc64::ADDR32,
            Self::Addr16Lo => r_ppc64::ADDR16_LO,
            Self::Addr16Ha => r_ppc64::ADDR16_HA,
            Self::Rel24 => r_ppc64::REL24,
            Self::Toc16 => r_ppc64::TOC16,
            Self::Toc16Ds => r_ppc64::TOC16_DS,
            Self::TlsGd => r_ppc64::TLSGD,
        }
    }

    /// Width of the patched field
    pub fn width(&self) -> Width {
        match self {
            Self::Addr32 | Self::Rel24 | Self::TlsGd => Width::Word,
            Self::Addr16Lo | Self::Addr16Ha | Self::Toc16 | Self::Toc16Ds => Width::Half,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Addr32 => "R_PPC64_ADDR32",
            Self::Addr16Lo => "R_PPC64_ADDR16_LO",
            Self::Addr16Ha => "R_PPC64_ADDR16_HA",
            Self::Rel24 => "R_PPC64_REL24",
            Self::Toc16 => "R_PPC64_TOC16",
            Self::Toc16Ds => "R_PPC64_TOC16_DS",
            Self::TlsGd => "R_PPC64_TLSGD",
        }
    }
}

/// New field value for a relocation
///
/// `a` is the patch address and `s` the resolved value, both rebased.
/// `existing` is the field's prior content where the rule keeps some of
/// its bits: the originally loaded word for `Rel24`, the current halfword
/// for `Toc16Ds`. It is ignored for the other types.
pub fn patch_value(ty: RelocType, a: u32, s: u32, gp: u32, existing: u32) -> u32 {
    match ty {
        RelocType::Addr32 => s,
        RelocType::Addr16Lo => s & 0xFFFF,
        RelocType::Addr16Ha => (s.wrapping_add(0x8000) >> 16) & 0xFFFF,
        RelocType::Rel24 => (existing & !REL24_MASK) | (s.wrapping_sub(a) & REL24_MASK),
        RelocType::Toc16 => s.wrapping_sub(gp) & 0xFFFF,
        RelocType::Toc16Ds => {
            (existing & !TOC16_DS_MASK & 0xFFFF) | (s.wrapping_sub(gp) & TOC16_DS_MASK)
        }
        RelocType::TlsGd => gp,
    }
}

/// Apply one relocation. `a` and `s` are file addresses; the relocation
/// base from `ctx` is added here.
pub fn apply_relocation(
    db: &mut dyn AnalysisDatabase,
    ty: RelocType,
    a: u32,
    s: u32,
    ctx: &LoadContext,
) -> Result<(), DatabaseError> {
    let a = a.wrapping_add(ctx.relocation_base);
    let s = s.wrapping_add(ctx.relocation_base);

    let existing = match ty {
        RelocType::Rel24 => db.read_original(a, Width::Word)?,
        RelocType::Toc16Ds => db.read(a, Width::Half)?,
        _ => 0,
    };

    let value = patch_value(ty, a, s, ctx.gp, existing);
    trace!("{} 0x{:08x} <- 0x{:08x} (S=0x{:08x})", ty.name(), a, value, s);
    db.patch(a, ty.width(), value)
}

/// Index value meaning "no segment, address zero"
pub const SEGMENT_SENTINEL: u32 = 0xFF;

/// Decoded `r_sym` field of a segment-indexed relocation
///
/// `None` stands for [`SEGMENT_SENTINEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSymbol {
    /// Segment containing the patch site (low byte)
    pub target: Option<u32>,
    /// Segment the value is relative to (bits 8..30)
    pub symbol: Option<u32>,
}

impl SegmentSymbol {
    pub fn decode(r_sym: u32) -> Self {
        let index = |raw: u32| (raw != SEGMENT_SENTINEL).then_some(raw);
        Self {
            target: index(r_sym & 0xFF),
            symbol: index((r_sym & 0x7FFF_FF00) >> 8),
        }
    }
}

/// Which algorithm a load used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocAlgorithm {
    Section,
    Segment,
}

/// Tunables for the relocation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationOptions {
    /// Number of `PT_SCE_PPURELA` segments processed; the rest are skipped
    /// with a warning
    pub max_segments: usize,
}

impl Default for RelocationOptions {
    fn default() -> Self {
        Self { max_segments: 1 }
    }
}

/// Outcome counters of a relocation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationStats {
    pub algorithm: Option<RelocAlgorithm>,
    pub applied: usize,
    pub skipped: usize,
    /// Relocation-bearing sections or segments visited
    pub blocks: usize,
}

impl RelocationStats {
    fn new(algorithm: RelocAlgorithm) -> Self {
        Self {
            algorithm: Some(algorithm),
            ..Default::default()
        }
    }

    fn record(&mut self, db: &mut dyn AnalysisDatabase, ty: RelocType, a: u32, s: u32, ctx: &LoadContext) {
        match apply_relocation(db, ty, a, s, ctx) {
            Ok(()) => self.applied += 1,
            Err(e) => {
                warn!("{} at 0x{:08x} not applied: {}", ty.name(), a, e);
                self.skipped += 1;
            }
        }
    }
}

/// Relocate a PRX with the algorithm its variant calls for.
/// Executables carry no relocations and are left alone.
pub fn apply_relocations(
    variant: Variant,
    image: &ElfImage,
    symbols: &SymbolTable,
    ctx: &LoadContext,
    options: &RelocationOptions,
    db: &mut dyn AnalysisDatabase,
) -> RelocationStats {
    let stats = match variant {
        Variant::LegacyPrx => apply_section_relocations(image, symbols, ctx, db),
        Variant::ModernPrx => apply_segment_relocations(image, ctx, options, db),
        Variant::Executable => return RelocationStats::default(),
    };

    info!(
        "Relocations: {} applied, {} skipped ({:?})",
        stats.applied, stats.skipped, stats.algorithm
    );
    stats
}

fn decode_type(rela: &Elf64Rela, index: usize, stats: &mut RelocationStats) -> Option<RelocType> {
    let raw = rela.r_type();
    if raw == r_ppc64::NONE {
        trace!("Skipping R_PPC64_NONE record {}", index);
        return None;
    }
    let ty = RelocType::from_raw(raw);
    if ty.is_none() {
        warn!(
            "Unsupported relocation type {} in record {} (offset 0x{:x})",
            raw, index, rela.r_offset
        );
        stats.skipped += 1;
    }
    ty
}

/// Section-indexed relocations (legacy PRX)
pub fn apply_section_relocations(
    image: &ElfImage,
    symbols: &SymbolTable,
    ctx: &LoadContext,
    db: &mut dyn AnalysisDatabase,
) -> RelocationStats {
    info!("Applying section based relocations...");

    let sections = image.sections();
    let mut stats = RelocationStats::new(RelocAlgorithm::Section);

    for (sec_index, rela_sec) in sections.iter().enumerate() {
        if rela_sec.sh_type != sht::RELA {
            continue;
        }

        let Some(target) = sections.get(rela_sec.sh_info as usize) else {
            warn!(
                "Relocation section {} targets missing section {}",
                sec_index, rela_sec.sh_info
            );
            continue;
        };
        if !target.is_alloc() {
            continue;
        }

        let Some(data) = image.section_data(rela_sec) else {
            warn!("Relocation section {} lies outside the file", sec_index);
            continue;
        };

        stats.blocks += 1;
        debug!(
            "Relocation section {} -> section {}: {} records",
            sec_index,
            rela_sec.sh_info,
            data.len() / crate::elf::RELA_SIZE
        );

        for (i, rela) in rela_records(data).enumerate() {
            let Some(ty) = decode_type(&rela, i, &mut stats) else {
                continue;
            };

            let sym_index = rela.r_sym();
            let Some(sym) = symbols.get(sym_index as usize) else {
                warn!(
                    "Relocation {} in section {}: symbol index {} out of range ({} symbols)",
                    i,
                    sec_index,
                    sym_index,
                    symbols.len()
                );
                stats.skipped += 1;
                continue;
            };

            let sym_addr = if sym.is_absolute() {
                sym.value as u32
            } else {
                match sections.get(sym.section as usize) {
                    Some(owner) => (owner.sh_addr as u32).wrapping_add(sym.value as u32),
                    None => {
                        warn!(
                            "Relocation {} in section {}: symbol {} has bad section index 0x{:04x}",
                            i, sec_index, sym_index, sym.section
                        );
                        stats.skipped += 1;
                        continue;
                    }
                }
            };

            let a = (target.sh_addr as u32).wrapping_add(rela.r_offset as u32);
            let s = sym_addr.wrapping_add(rela.r_addend as u32);
            stats.record(db, ty, a, s, ctx);
        }
    }

    stats
}

/// Segment-indexed relocations (every PRX but the legacy one)
pub fn apply_segment_relocations(
    image: &ElfImage,
    ctx: &LoadContext,
    options: &RelocationOptions,
    db: &mut dyn AnalysisDatabase,
) -> RelocationStats {
    info!("Applying segment based relocations...");

    let segments = image.segments();
    let mut stats = RelocationStats::new(RelocAlgorithm::Segment);

    let rela_segments: Vec<_> = segments
        .iter()
        .filter(|ph| ph.p_type == pt::SCE_PPURELA)
        .collect();
    if rela_segments.len() > options.max_segments {
        warn!(
            "Image has {} relocation segments, only the first {} are applied",
            rela_segments.len(),
            options.max_segments
        );
    }

    let segment_base = |index: Option<u32>| -> Option<u32> {
        match index {
            None => Some(0),
            Some(i) => segments.get(i as usize).map(|ph| ph.p_vaddr as u32),
        }
    };

    for phdr in rela_segments.into_iter().take(options.max_segments) {
        let Some(data) = image.segment_data(phdr) else {
            warn!(
                "Relocation segment at offset 0x{:x} lies outside the file",
                phdr.p_offset
            );
            continue;
        };

        stats.blocks += 1;
        debug!(
            "Relocation segment at offset 0x{:x}: {} records",
            phdr.p_offset,
            data.len() / crate::elf::RELA_SIZE
        );

        for (i, rela) in rela_records(data).enumerate() {
            let Some(ty) = decode_type(&rela, i, &mut stats) else {
                continue;
            };

            let packed = SegmentSymbol::decode(rela.r_sym());
            let (Some(target_base), Some(symbol_base)) =
                (segment_base(packed.target), segment_base(packed.symbol))
            else {
                warn!(
                    "Relocation {}: segment index out of range (r_sym 0x{:08x}, {} segments)",
                    i,
                    rela.r_sym(),
                    segments.len()
                );
                stats.skipped += 1;
                continue;
            };

            let a = match packed.target {
                Some(_) => target_base.wrapping_add(rela.r_offset as u32),
                None => 0,
            };
            let s = match packed.symbol {
                Some(_) => symbol_base.wrapping_add(rela.r_addend as u32),
                None => 0,
            };
            stats.record(db, ty, a, s, ctx);
        }
    }

    stats
}
