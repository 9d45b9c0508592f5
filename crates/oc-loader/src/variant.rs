//! File acceptance and format variant detection

use crate::elf::{et, pt, ElfImage, ELFOSABI_CELLOSLV2, EM_PPC64};
use tracing::debug;

/// Which kind of PPU image is being loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Fixed-address executable (`ET_EXEC`)
    Executable,
    /// PRX with segment-indexed relocations
    ModernPrx,
    /// Early PRX carrying a `PT_SCE_SEGSYM` segment; relocations are
    /// section-indexed
    LegacyPrx,
}

impl Variant {
    /// Inspect the declared type and, for PRX images, scan every segment
    /// for the segment-symbol marker.
    pub fn detect(image: &ElfImage) -> Variant {
        if image.declared_type() == et::EXEC {
            return Variant::Executable;
        }

        let legacy = image
            .segments()
            .iter()
            .any(|ph| ph.p_type == pt::SCE_SEGSYM);

        let variant = if legacy {
            Variant::LegacyPrx
        } else {
            Variant::ModernPrx
        };
        debug!("Detected format variant {:?}", variant);
        variant
    }

    pub fn is_prx(&self) -> bool {
        !matches!(self, Variant::Executable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executable => "executable",
            Self::ModernPrx => "PRX",
            Self::LegacyPrx => "legacy PRX",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file format this loader accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Executable,
    RelocatableExecutable,
}

impl FileFormat {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Executable => "PlayStation 3 PPU (Executable)",
            Self::RelocatableExecutable => "PlayStation 3 PPU (Relocatable Executable)",
        }
    }
}

/// Decide from the leading bytes whether this is a PS3 PPU image
pub fn accept_file(data: &[u8]) -> Option<FileFormat> {
    let header = ElfImage::parse_header(data).ok()?;
    if header.e_ident[7] != ELFOSABI_CELLOSLV2 || header.e_machine != EM_PPC64 {
        return None;
    }

    match header.e_type {
        et::EXEC => Some(FileFormat::Executable),
        et::SCE_PPURELEXEC => Some(FileFormat::RelocatableExecutable),
        _ => None,
    }
}
