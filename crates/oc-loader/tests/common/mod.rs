//! Synthetic big-endian PPU images for loader tests

#![allow(dead_code)]

use oc_loader::elf::{
    et, pf, pt, shf, sht, Elf64Header, Elf64Phdr, Elf64Rela, Elf64Shdr, Elf64Sym, EHDR_SIZE,
    ELFCLASS64, ELFDATA2MSB, ELFOSABI_CELLOSLV2, ELF_MAGIC, EM_PPC64, PHDR_SIZE, SHDR_SIZE,
    SYM_SIZE,
};

/// A program header to emit
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    pub p_type: u32,
    pub flags: u32,
    pub vaddr: u64,
    pub data: Vec<u8>,
    pub memsz: u64,
    /// `p_paddr - p_offset`
    pub paddr_delta: u64,
    pub align: u64,
}

impl SegmentSpec {
    pub fn load(vaddr: u64, flags: u32, data: Vec<u8>) -> Self {
        let memsz = data.len() as u64;
        Self {
            p_type: pt::LOAD,
            flags,
            vaddr,
            data,
            memsz,
            paddr_delta: 0,
            align: 0x10,
        }
    }

    /// Unmapped segment (memsz 0) carrying raw bytes
    pub fn raw(p_type: u32, data: Vec<u8>) -> Self {
        Self {
            p_type,
            flags: pf::R,
            vaddr: 0,
            data,
            memsz: 0,
            paddr_delta: 0,
            align: 8,
        }
    }

    pub fn relocations(records: &[Elf64Rela]) -> Self {
        Self::raw(pt::SCE_PPURELA, rela_bytes(records))
    }

    pub fn with_memsz(mut self, memsz: u64) -> Self {
        self.memsz = memsz;
        self
    }

    pub fn with_vaddr(mut self, vaddr: u64) -> Self {
        self.vaddr = vaddr;
        self
    }

    pub fn with_paddr_delta(mut self, delta: u64) -> Self {
        self.paddr_delta = delta;
        self
    }
}

/// A section header to emit
#[derive(Debug, Clone)]
pub struct SectionSpec {
    pub name: String,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub data: Vec<u8>,
    /// Only used for `SHT_NOBITS`
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub entsize: u64,
}

impl SectionSpec {
    pub fn progbits(name: &str, addr: u64, flags: u64, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            sh_type: sht::PROGBITS,
            flags,
            addr,
            data,
            size: 0,
            link: 0,
            info: 0,
            entsize: 0,
        }
    }

    pub fn nobits(name: &str, addr: u64, size: u64) -> Self {
        Self {
            name: name.to_string(),
            sh_type: sht::NOBITS,
            flags: shf::ALLOC | shf::WRITE,
            addr,
            data: Vec::new(),
            size,
            link: 0,
            info: 0,
            entsize: 0,
        }
    }

    /// `SHT_RELA` section patching section `target`
    pub fn rela(name: &str, target: u32, records: &[Elf64Rela]) -> Self {
        Self {
            name: name.to_string(),
            sh_type: sht::RELA,
            flags: 0,
            addr: 0,
            data: rela_bytes(records),
            size: 0,
            link: 0,
            info: target,
            entsize: 24,
        }
    }
}

/// A symbol to emit. Index 0 of the table is the null symbol, so the first
/// added symbol has index 1.
#[derive(Debug, Clone)]
pub struct SymbolSpec {
    pub name: String,
    pub value: u64,
    pub sym_type: u8,
    pub shndx: u16,
}

impl SymbolSpec {
    pub fn new(name: &str, sym_type: u8, shndx: u16, value: u64) -> Self {
        Self {
            name: name.to_string(),
            value,
            sym_type,
            shndx,
        }
    }
}

pub fn rela(r_offset: u64, sym: u32, r_type: u32, r_addend: i64) -> Elf64Rela {
    Elf64Rela {
        r_offset,
        r_info: Elf64Rela::info(sym, r_type),
        r_addend,
    }
}

/// `r_sym` of a segment-indexed relocation
pub fn segment_sym(target: u32, symbol: u32) -> u32 {
    (symbol << 8) | target
}

pub fn rela_bytes(records: &[Elf64Rela]) -> Vec<u8> {
    records.iter().flat_map(|r| r.to_be_bytes()).collect()
}

/// Little helper for filling big-endian segment contents
#[derive(Debug, Clone)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0u8; len])
    }

    pub fn u8(mut self, at: usize, v: u8) -> Self {
        self.0[at] = v;
        self
    }

    pub fn u16(mut self, at: usize, v: u16) -> Self {
        self.0[at..at + 2].copy_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(mut self, at: usize, v: u32) -> Self {
        self.0[at..at + 4].copy_from_slice(&v.to_be_bytes());
        self
    }

    pub fn str(mut self, at: usize, s: &str) -> Self {
        self.0[at..at + s.len()].copy_from_slice(s.as_bytes());
        self
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

/// Assembles an ELF64 big-endian image
#[derive(Debug, Clone)]
pub struct ElfBuilder {
    e_type: u16,
    entry: u64,
    segments: Vec<SegmentSpec>,
    sections: Vec<SectionSpec>,
    symbols: Vec<SymbolSpec>,
}

impl ElfBuilder {
    pub fn prx() -> Self {
        Self {
            e_type: et::SCE_PPURELEXEC,
            entry: 0,
            segments: Vec::new(),
            sections: Vec::new(),
            symbols: Vec::new(),
        }
    }

    pub fn exec(entry: u64) -> Self {
        Self {
            e_type: et::EXEC,
            entry,
            ..Self::prx()
        }
    }

    pub fn segment(mut self, segment: SegmentSpec) -> Self {
        self.segments.push(segment);
        self
    }

    /// Sections are numbered from 1 in the order they are added
    pub fn section(mut self, section: SectionSpec) -> Self {
        self.sections.push(section);
        self
    }

    pub fn symbol(mut self, symbol: SymbolSpec) -> Self {
        self.symbols.push(symbol);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; EHDR_SIZE + PHDR_SIZE * self.segments.len()];

        let align8 = |out: &mut Vec<u8>| {
            while out.len() % 8 != 0 {
                out.push(0);
            }
        };

        let mut phdrs = Vec::new();
        for seg in &self.segments {
            align8(&mut out);
            let offset = out.len() as u64;
            out.extend_from_slice(&seg.data);
            phdrs.push(Elf64Phdr {
                p_type: seg.p_type,
                p_flags: seg.flags,
                p_offset: offset,
                p_vaddr: seg.vaddr,
                p_paddr: offset + seg.paddr_delta,
                p_filesz: seg.data.len() as u64,
                p_memsz: seg.memsz,
                p_align: seg.align,
            });
        }

        let mut sections = self.sections.clone();
        if !self.symbols.is_empty() {
            let (symtab, strtab) = self.symbol_tables();
            let strtab_index = sections.len() as u32 + 2;
            sections.push(SectionSpec {
                name: ".symtab".to_string(),
                sh_type: sht::SYMTAB,
                flags: 0,
                addr: 0,
                data: symtab,
                size: 0,
                link: strtab_index,
                info: 1,
                entsize: SYM_SIZE as u64,
            });
            sections.push(SectionSpec {
                name: ".strtab".to_string(),
                sh_type: sht::STRTAB,
                flags: 0,
                addr: 0,
                data: strtab,
                size: 0,
                link: 0,
                info: 0,
                entsize: 0,
            });
        }

        let mut shdrs = Vec::new();
        let mut shstrndx = 0;
        if !sections.is_empty() {
            let mut shstrtab = vec![0u8];
            let mut name_offsets = Vec::new();
            for sec in &sections {
                name_offsets.push(shstrtab.len() as u32);
                shstrtab.extend_from_slice(sec.name.as_bytes());
                shstrtab.push(0);
            }
            let shstrtab_name = shstrtab.len() as u32;
            shstrtab.extend_from_slice(b".shstrtab\0");

            shdrs.push(Elf64Shdr::default());
            for (sec, name) in sections.iter().zip(name_offsets) {
                align8(&mut out);
                let offset = out.len() as u64;
                out.extend_from_slice(&sec.data);
                let size = if sec.sh_type == sht::NOBITS {
                    sec.size
                } else {
                    sec.data.len() as u64
                };
                shdrs.push(Elf64Shdr {
                    sh_name: name,
                    sh_type: sec.sh_type,
                    sh_flags: sec.flags,
                    sh_addr: sec.addr,
                    sh_offset: offset,
                    sh_size: size,
                    sh_link: sec.link,
                    sh_info: sec.info,
                    sh_addralign: 4,
                    sh_entsize: sec.entsize,
                });
            }

            align8(&mut out);
            let offset = out.len() as u64;
            out.extend_from_slice(&shstrtab);
            shstrndx = shdrs.len() as u16;
            shdrs.push(Elf64Shdr {
                sh_name: shstrtab_name,
                sh_type: sht::STRTAB,
                sh_offset: offset,
                sh_size: shstrtab.len() as u64,
                sh_addralign: 1,
                ..Default::default()
            });
        }

        align8(&mut out);
        let shoff = if shdrs.is_empty() { 0 } else { out.len() as u64 };
        for sh in &shdrs {
            out.extend_from_slice(&sh.to_be_bytes());
        }

        for (i, ph) in phdrs.iter().enumerate() {
            let at = EHDR_SIZE + i * PHDR_SIZE;
            out[at..at + PHDR_SIZE].copy_from_slice(&ph.to_be_bytes());
        }

        let mut e_ident = [0u8; 16];
        e_ident[0..4].copy_from_slice(&ELF_MAGIC);
        e_ident[4] = ELFCLASS64;
        e_ident[5] = ELFDATA2MSB;
        e_ident[6] = 1;
        e_ident[7] = ELFOSABI_CELLOSLV2;
        let header = Elf64Header {
            e_ident,
            e_type: self.e_type,
            e_machine: EM_PPC64,
            e_version: 1,
            e_entry: self.entry,
            e_phoff: if phdrs.is_empty() { 0 } else { EHDR_SIZE as u64 },
            e_shoff: shoff,
            e_flags: 0,
            e_ehsize: EHDR_SIZE as u16,
            e_phentsize: PHDR_SIZE as u16,
            e_phnum: phdrs.len() as u16,
            e_shentsize: SHDR_SIZE as u16,
            e_shnum: shdrs.len() as u16,
            e_shstrndx: shstrndx,
        };
        out[..EHDR_SIZE].copy_from_slice(&header.to_be_bytes());

        out
    }

    fn symbol_tables(&self) -> (Vec<u8>, Vec<u8>) {
        let mut strtab = vec![0u8];
        let mut symtab = Elf64Sym::default().to_be_bytes().to_vec();

        for sym in &self.symbols {
            let st_name = if sym.name.is_empty() {
                0
            } else {
                let at = strtab.len() as u32;
                strtab.extend_from_slice(sym.name.as_bytes());
                strtab.push(0);
                at
            };
            let entry = Elf64Sym {
                st_name,
                st_info: (1 << 4) | sym.sym_type,
                st_other: 0,
                st_shndx: sym.shndx,
                st_value: sym.value,
                st_size: 0,
            };
            symtab.extend_from_slice(&entry.to_be_bytes());
        }

        (symtab, strtab)
    }
}
