//! Segment mapper
//!
//! Turns the section table (preferred) or the program header table into
//! address regions of the analysis database and copies their bytes in.

use crate::elf::{pf, sht, shf, Elf64Phdr, Elf64Shdr, ElfImage};
use crate::toc::LoadContext;
use oc_analysis::{AddressRegion, AnalysisDatabase, SegmentClass, SegmentPerms};
use oc_core::error::LoaderError;
use tracing::{debug, info, warn};

/// Class and permissions of an allocatable section
pub fn classify_section(shdr: &Elf64Shdr) -> (SegmentClass, SegmentPerms) {
    let mut perms = SegmentPerms::empty();
    if shdr.sh_flags & shf::WRITE != 0 {
        perms |= SegmentPerms::WRITE;
    }
    if shdr.sh_flags & shf::EXECINSTR != 0 {
        perms |= SegmentPerms::EXEC;
    }

    let class = if shdr.sh_type == sht::NOBITS {
        SegmentClass::Bss
    } else if shdr.sh_flags & shf::EXECINSTR != 0 {
        SegmentClass::Code
    } else {
        SegmentClass::Data
    };

    (class, perms)
}

/// Class and permissions of a loadable program header
///
/// A header with none of R/W/X set maps as data with no permissions.
pub fn classify_segment(phdr: &Elf64Phdr) -> (SegmentClass, SegmentPerms) {
    let r = phdr.p_flags & pf::R != 0;
    let w = phdr.p_flags & pf::W != 0;
    let x = phdr.p_flags & pf::X != 0;

    let mut class = match (r, w, x) {
        (_, _, true) => SegmentClass::Code,
        (_, true, false) => SegmentClass::Data,
        (true, false, false) => SegmentClass::Const,
        (false, false, false) => SegmentClass::Data,
    };
    if phdr.p_filesz == 0 && phdr.p_memsz > 0 {
        class = SegmentClass::Bss;
    }

    let mut perms = SegmentPerms::empty();
    perms.set(SegmentPerms::READ, r);
    perms.set(SegmentPerms::WRITE, w);
    perms.set(SegmentPerms::EXEC, x);

    (class, perms)
}

/// Map every loadable region of `image`. Returns the number of regions created.
///
/// Fails with [`LoaderError::NoSegments`] when the image has neither
/// sections nor program headers.
pub fn map_segments(
    image: &ElfImage,
    ctx: &LoadContext,
    db: &mut dyn AnalysisDatabase,
) -> Result<usize, LoaderError> {
    if !image.sections().is_empty() {
        map_sections(image, ctx, db)
    } else if !image.segments().is_empty() {
        map_program_headers(image, ctx, db)
    } else {
        Err(LoaderError::NoSegments)
    }
}

fn map_sections(
    image: &ElfImage,
    ctx: &LoadContext,
    db: &mut dyn AnalysisDatabase,
) -> Result<usize, LoaderError> {
    info!("Applying section headers...");

    let mut selector = 0;
    for shdr in image.sections() {
        if !shdr.is_alloc() || shdr.sh_size == 0 || shdr.sh_type == sht::NULL {
            continue;
        }

        let (class, perms) = classify_section(shdr);
        let backing = if shdr.sh_type == sht::NOBITS {
            None
        } else {
            let data = image.section_data(shdr);
            if data.is_none() {
                warn!(
                    "Section at 0x{:x} points outside the file (offset 0x{:x}, size 0x{:x}), mapping zeros",
                    shdr.sh_addr, shdr.sh_offset, shdr.sh_size
                );
            }
            Some(data.unwrap_or(&[]))
        };

        let region = AddressRegion {
            selector,
            start: ctx.rebase(shdr.sh_addr),
            size: shdr.sh_size as u32,
            name: image.section_name(shdr).map(str::to_string),
            class,
            perms,
            align: shdr.sh_addralign as u32,
        };
        db.create_region(region, backing)?;
        selector += 1;
    }

    debug!("Mapped {} sections", selector);
    Ok(selector as usize)
}

fn map_program_headers(
    image: &ElfImage,
    ctx: &LoadContext,
    db: &mut dyn AnalysisDatabase,
) -> Result<usize, LoaderError> {
    info!("Applying program headers...");

    let mut selector = 0;
    for phdr in image.segments() {
        if phdr.p_memsz == 0 {
            continue;
        }

        let (class, perms) = classify_segment(phdr);
        let backing = if class == SegmentClass::Bss {
            None
        } else {
            let filesz = phdr.p_filesz.min(phdr.p_memsz);
            let data = image.bytes(phdr.p_offset, filesz);
            if data.is_none() {
                warn!(
                    "Segment at 0x{:x} points outside the file (offset 0x{:x}, size 0x{:x}), mapping zeros",
                    phdr.p_vaddr, phdr.p_offset, filesz
                );
            }
            Some(data.unwrap_or(&[]))
        };

        let region = AddressRegion {
            selector,
            start: ctx.rebase(phdr.p_vaddr),
            size: phdr.p_memsz as u32,
            name: None,
            class,
            perms,
            align: phdr.p_align as u32,
        };
        db.create_region(region, backing)?;
        selector += 1;
    }

    debug!("Mapped {} program headers", selector);
    Ok(selector as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(sh_type: u32, sh_flags: u64) -> Elf64Shdr {
        Elf64Shdr {
            sh_type,
            sh_flags,
            sh_size: 0x10,
            ..Default::default()
        }
    }

    fn segment(p_flags: u32, p_filesz: u64, p_memsz: u64) -> Elf64Phdr {
        Elf64Phdr {
            p_type: crate::elf::pt::LOAD,
            p_flags,
            p_filesz,
            p_memsz,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_section() {
        let text = section(sht::PROGBITS, shf::ALLOC | shf::EXECINSTR);
        assert_eq!(classify_section(&text), (SegmentClass::Code, SegmentPerms::EXEC));

        let data = section(sht::PROGBITS, shf::ALLOC | shf::WRITE);
        assert_eq!(classify_section(&data), (SegmentClass::Data, SegmentPerms::WRITE));

        // Exec wins over write
        let both = section(sht::PROGBITS, shf::ALLOC | shf::WRITE | shf::EXECINSTR);
        assert_eq!(classify_section(&both).0, SegmentClass::Code);

        let bss = section(sht::NOBITS, shf::ALLOC | shf::WRITE | shf::EXECINSTR);
        assert_eq!(classify_section(&bss).0, SegmentClass::Bss);

        let rodata = section(sht::PROGBITS, shf::ALLOC);
        assert_eq!(classify_section(&rodata), (SegmentClass::Data, SegmentPerms::empty()));
    }

    #[test]
    fn test_classify_segment() {
        assert_eq!(
            classify_segment(&segment(pf::R | pf::X, 0x10, 0x10)),
            (SegmentClass::Code, SegmentPerms::RX)
        );
        assert_eq!(
            classify_segment(&segment(pf::R | pf::W, 0x10, 0x20)),
            (SegmentClass::Data, SegmentPerms::RW)
        );
        assert_eq!(
            classify_segment(&segment(pf::R, 0x10, 0x10)),
            (SegmentClass::Const, SegmentPerms::READ)
        );
        assert_eq!(
            classify_segment(&segment(pf::R | pf::W | pf::X, 0, 0x10)),
            (SegmentClass::Bss, SegmentPerms::RWX)
        );
        assert_eq!(
            classify_segment(&segment(0, 0x10, 0x10)),
            (SegmentClass::Data, SegmentPerms::empty())
        );
    }
}
