//! ELF64 big-endian image parser
//!
//! Read-only view over a PS3 PPU executable or PRX: header, program
//! headers, section headers and raw bytes by file offset. Header tables
//! are decoded from big-endian when the image is parsed; the symbol
//! table is decoded separately, once, by [`SymbolTable::decode`].

use oc_core::error::LoaderError;
use std::path::Path;
use tracing::{debug, info, warn};

/// ELF file header (64-bit)
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Elf64Header {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// ELF program header (64-bit)
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Elf64Phdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

/// ELF section header (64-bit)
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Elf64Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

/// ELF symbol table entry (64-bit)
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Elf64Sym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

/// ELF relocation entry with addend (64-bit)
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Elf64Rela {
    pub r_offset: u64,
    pub r_info: u64,
    pub r_addend: i64,
}

/// ELF magic bytes
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2MSB: u8 = 2;

/// 64-bit PowerPC
pub const EM_PPC64: u16 = 21;

/// CellOS LV-2
pub const ELFOSABI_CELLOSLV2: u8 = 0x66;

pub const EHDR_SIZE: usize = 64;
pub const PHDR_SIZE: usize = 56;
pub const SHDR_SIZE: usize = 64;
pub const SYM_SIZE: usize = 24;
pub const RELA_SIZE: usize = 24;

/// Object file types
pub mod et {
    pub const EXEC: u16 = 2;
    /// Relocatable PPU executable (PRX)
    pub const SCE_PPURELEXEC: u16 = 0xFFA4;
}

/// Program header types
pub mod pt {
    pub const LOAD: u32 = 1;
    /// sys_process_param_t
    pub const PROC_PARAM: u32 = 0x6000_0001;
    /// sys_process_prx_info_t
    pub const PROC_PRX: u32 = 0x6000_0002;
    /// Segment-indexed relocations
    pub const SCE_PPURELA: u32 = 0x7000_00A4;
    /// Embedded segment symbols, only present in 0.85 era PRX files
    pub const SCE_SEGSYM: u32 = 0x7000_00A8;
}

/// Program header flags
pub mod pf {
    pub const X: u32 = 0x1;
    pub const W: u32 = 0x2;
    pub const R: u32 = 0x4;
}

/// Section header types
pub mod sht {
    pub const NULL: u32 = 0;
    pub const PROGBITS: u32 = 1;
    pub const SYMTAB: u32 = 2;
    pub const STRTAB: u32 = 3;
    pub const RELA: u32 = 4;
    pub const NOBITS: u32 = 8;
}

/// Section header flags
pub mod shf {
    pub const WRITE: u64 = 0x1;
    pub const ALLOC: u64 = 0x2;
    pub const EXECINSTR: u64 = 0x4;
}

/// Special section indices
pub mod shn {
    pub const ABS: u16 = 0xFFF1;
}

/// Relocation types for PowerPC64
pub mod r_ppc64 {
    pub const NONE: u32 = 0;
    pub const ADDR32: u32 = 1;
    pub const ADDR16_LO: u32 = 4;
    pub const ADDR16_HA: u32 = 6;
    pub const REL24: u32 = 10;
    pub const TOC16: u32 = 47;
    pub const TOC16_DS: u32 = 63;
    pub const TLSGD: u32 = 107;
}

/// Symbol type
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;
pub const STT_FILE: u8 = 4;

#[inline]
fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

#[inline]
fn be_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_be_bytes(b)
}

#[inline]
fn be_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(b)
}

impl Elf64Header {
    /// Decode from the first 64 bytes of an image
    pub fn from_be_bytes(buf: &[u8; EHDR_SIZE]) -> Self {
        let mut e_ident = [0u8; 16];
        e_ident.copy_from_slice(&buf[0..16]);
        Self {
            e_ident,
            e_type: be_u16(buf, 16),
            e_machine: be_u16(buf, 18),
            e_version: be_u32(buf, 20),
            e_entry: be_u64(buf, 24),
            e_phoff: be_u64(buf, 32),
            e_shoff: be_u64(buf, 40),
            e_flags: be_u32(buf, 48),
            e_ehsize: be_u16(buf, 52),
            e_phentsize: be_u16(buf, 54),
            e_phnum: be_u16(buf, 56),
            e_shentsize: be_u16(buf, 58),
            e_shnum: be_u16(buf, 60),
            e_shstrndx: be_u16(buf, 62),
        }
    }

    pub fn to_be_bytes(&self) -> [u8; EHDR_SIZE] {
        let mut buf = [0u8; EHDR_SIZE];
        buf[0..16].copy_from_slice(&self.e_ident);
        buf[16..18].copy_from_slice(&self.e_type.to_be_bytes());
        buf[18..20].copy_from_slice(&self.e_machine.to_be_bytes());
        buf[20..24].copy_from_slice(&self.e_version.to_be_bytes());
        buf[24..32].copy_from_slice(&self.e_entry.to_be_bytes());
        buf[32..40].copy_from_slice(&self.e_phoff.to_be_bytes());
        buf[40..48].copy_from_slice(&self.e_shoff.to_be_bytes());
        buf[48..52].copy_from_slice(&self.e_flags.to_be_bytes());
        buf[52..54].copy_from_slice(&self.e_ehsize.to_be_bytes());
        buf[54..56].copy_from_slice(&self.e_phentsize.to_be_bytes());
        buf[56..58].copy_from_slice(&self.e_phnum.to_be_bytes());
        buf[58..60].copy_from_slice(&self.e_shentsize.to_be_bytes());
        buf[60..62].copy_from_slice(&self.e_shnum.to_be_bytes());
        buf[62..64].copy_from_slice(&self.e_shstrndx.to_be_bytes());
        buf
    }
}

impl Elf64Phdr {
    pub fn from_be_bytes(buf: &[u8; PHDR_SIZE]) -> Self {
        Self {
            p_type: be_u32(buf, 0),
            p_flags: be_u32(buf, 4),
            p_offset: be_u64(buf, 8),
            p_vaddr: be_u64(buf, 16),
            p_paddr: be_u64(buf, 24),
            p_filesz: be_u64(buf, 32),
            p_memsz: be_u64(buf, 40),
            p_align: be_u64(buf, 48),
        }
    }

    pub fn to_be_bytes(&self) -> [u8; PHDR_SIZE] {
        let mut buf = [0u8; PHDR_SIZE];
        buf[0..4].copy_from_slice(&self.p_type.to_be_bytes());
        buf[4..8].copy_from_slice(&self.p_flags.to_be_bytes());
        buf[8..16].copy_from_slice(&self.p_offset.to_be_bytes());
        buf[16..24].copy_from_slice(&self.p_vaddr.to_be_bytes());
        buf[24..32].copy_from_slice(&self.p_paddr.to_be_bytes());
        buf[32..40].copy_from_slice(&self.p_filesz.to_be_bytes());
        buf[40..48].copy_from_slice(&self.p_memsz.to_be_bytes());
        buf[48..56].copy_from_slice(&self.p_align.to_be_bytes());
        buf
    }
}

impl Elf64Shdr {
    pub fn from_be_bytes(buf: &[u8; SHDR_SIZE]) -> Self {
        Self {
            sh_name: be_u32(buf, 0),
            sh_type: be_u32(buf, 4),
            sh_flags: be_u64(buf, 8),
            sh_addr: be_u64(buf, 16),
            sh_offset: be_u64(buf, 24),
            sh_size: be_u64(buf, 32),
            sh_link: be_u32(buf, 40),
            sh_info: be_u32(buf, 44),
            sh_addralign: be_u64(buf, 48),
            sh_entsize: be_u64(buf, 56),
        }
    }

    pub fn to_be_bytes(&self) -> [u8; SHDR_SIZE] {
        let mut buf = [0u8; SHDR_SIZE];
        buf[0..4].copy_from_slice(&self.sh_name.to_be_bytes());
        buf[4..8].copy_from_slice(&self.sh_type.to_be_bytes());
        buf[8..16].copy_from_slice(&self.sh_flags.to_be_bytes());
        buf[16..24].copy_from_slice(&self.sh_addr.to_be_bytes());
        buf[24..32].copy_from_slice(&self.sh_offset.to_be_bytes());
        buf[32..40].copy_from_slice(&self.sh_size.to_be_bytes());
        buf[40..44].copy_from_slice(&self.sh_link.to_be_bytes());
        buf[44..48].copy_from_slice(&self.sh_info.to_be_bytes());
        buf[48..56].copy_from_slice(&self.sh_addralign.to_be_bytes());
        buf[56..64].copy_from_slice(&self.sh_entsize.to_be_bytes());
        buf
    }

    /// Section occupies memory at run time
    pub fn is_alloc(&self) -> bool {
        self.sh_flags & shf::ALLOC != 0
    }
}

impl Elf64Sym {
    pub fn from_be_bytes(buf: &[u8; SYM_SIZE]) -> Self {
        Self {
            st_name: be_u32(buf, 0),
            st_info: buf[4],
            st_other: buf[5],
            st_shndx: be_u16(buf, 6),
            st_value: be_u64(buf, 8),
            st_size: be_u64(buf, 16),
        }
    }

    pub fn to_be_bytes(&self) -> [u8; SYM_SIZE] {
        let mut buf = [0u8; SYM_SIZE];
        buf[0..4].copy_from_slice(&self.st_name.to_be_bytes());
        buf[4] = self.st_info;
        buf[5] = self.st_other;
        buf[6..8].copy_from_slice(&self.st_shndx.to_be_bytes());
        buf[8..16].copy_from_slice(&self.st_value.to_be_bytes());
        buf[16..24].copy_from_slice(&self.st_size.to_be_bytes());
        buf
    }
}

impl Elf64Rela {
    pub fn from_be_bytes(buf: &[u8; RELA_SIZE]) -> Self {
        Self {
            r_offset: be_u64(buf, 0),
            r_info: be_u64(buf, 8),
            r_addend: be_u64(buf, 16) as i64,
        }
    }

    pub fn to_be_bytes(&self) -> [u8; RELA_SIZE] {
        let mut buf = [0u8; RELA_SIZE];
        buf[0..8].copy_from_slice(&self.r_offset.to_be_bytes());
        buf[8..16].copy_from_slice(&self.r_info.to_be_bytes());
        buf[16..24].copy_from_slice(&self.r_addend.to_be_bytes());
        buf
    }

    /// Build `r_info` from a symbol field and a type
    pub fn info(sym: u32, r_type: u32) -> u64 {
        ((sym as u64) << 32) | r_type as u64
    }

    pub fn r_type(&self) -> u32 {
        (self.r_info & 0xffff_ffff) as u32
    }

    pub fn r_sym(&self) -> u32 {
        (self.r_info >> 32) as u32
    }
}

/// Decode a packed block of big-endian RELA records; a trailing partial
/// record is ignored.
pub fn rela_records(data: &[u8]) -> impl Iterator<Item = Elf64Rela> + '_ {
    data.chunks_exact(RELA_SIZE).map(|chunk| {
        let mut buf = [0u8; RELA_SIZE];
        buf.copy_from_slice(chunk);
        Elf64Rela::from_be_bytes(&buf)
    })
}

/// Parsed symbol information
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub name_offset: u32,
    pub value: u64,
    pub size: u64,
    pub sym_type: u8,
    pub section: u16,
}

impl Symbol {
    /// Get symbol type from st_info
    pub fn sym_type(&self) -> u8 {
        self.sym_type
    }

    /// Check if the value is absolute rather than section-relative
    pub fn is_absolute(&self) -> bool {
        self.section == shn::ABS
    }
}

/// The image's symbol table, decoded from big-endian exactly once
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Decode the `SHT_SYMTAB` section, if the image has one
    ///
    /// A symbol table that points outside the file is treated as absent.
    pub fn decode(image: &ElfImage) -> SymbolTable {
        let Some((_, symtab)) = image.section_by_type(sht::SYMTAB) else {
            debug!("No symbol table found");
            return SymbolTable::default();
        };

        let Some(data) = image.section_data(symtab) else {
            warn!(
                "Symbol table at offset 0x{:x} (size 0x{:x}) lies outside the file",
                symtab.sh_offset, symtab.sh_size
            );
            return SymbolTable::default();
        };

        let strtab = image
            .sections()
            .get(symtab.sh_link as usize)
            .and_then(|sh| image.section_data(sh))
            .unwrap_or(&[]);

        let entsize = match symtab.sh_entsize as usize {
            0 => SYM_SIZE,
            n => n.max(SYM_SIZE),
        };

        let symbols: Vec<Symbol> = data
            .chunks_exact(entsize)
            .map(|chunk| {
                let mut buf = [0u8; SYM_SIZE];
                buf.copy_from_slice(&chunk[..SYM_SIZE]);
                let sym = Elf64Sym::from_be_bytes(&buf);

                Symbol {
                    name: c_string_at(strtab, sym.st_name as usize),
                    name_offset: sym.st_name,
                    value: sym.st_value,
                    size: sym.st_size,
                    sym_type: sym.st_info & 0xf,
                    section: sym.st_shndx,
                }
            })
            .collect();

        info!("Loaded {} symbols", symbols.len());
        SymbolTable { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}

/// NUL-terminated string starting at `offset` in `table`
fn c_string_at(table: &[u8], offset: usize) -> String {
    if offset == 0 || offset >= table.len() {
        return String::new();
    }
    let end = table[offset..]
        .iter()
        .position(|&b| b == 0)
        .map(|pos| offset + pos)
        .unwrap_or(table.len());
    String::from_utf8_lossy(&table[offset..end]).into_owned()
}

/// Parsed PS3 ELF image
pub struct ElfImage {
    data: Vec<u8>,
    header: Elf64Header,
    phdrs: Vec<Elf64Phdr>,
    shdrs: Vec<Elf64Shdr>,
}

impl ElfImage {
    /// Read and parse an image from disk
    pub fn open(path: &Path) -> Result<Self, LoaderError> {
        let data = std::fs::read(path).map_err(|e| {
            LoaderError::InvalidElf(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(data)
    }

    /// Parse an in-memory image
    pub fn parse(data: Vec<u8>) -> Result<Self, LoaderError> {
        let header = Self::parse_header(&data)?;
        let phdrs = Self::parse_phdrs(&data, &header)?;
        let shdrs = Self::parse_shdrs(&data, &header);

        info!(
            "ELF parsed: type=0x{:04x}, entry=0x{:x}, phdrs={}, shdrs={}",
            header.e_type,
            header.e_entry,
            phdrs.len(),
            shdrs.len()
        );

        Ok(Self {
            data,
            header,
            phdrs,
            shdrs,
        })
    }

    /// Parse ELF header
    pub fn parse_header(data: &[u8]) -> Result<Elf64Header, LoaderError> {
        if data.len() < EHDR_SIZE {
            return Err(LoaderError::InvalidElf(format!(
                "File too small to be a valid ELF: {} bytes (minimum 64 bytes required for ELF64 header)",
                data.len()
            )));
        }

        let mut buf = [0u8; EHDR_SIZE];
        buf.copy_from_slice(&data[..EHDR_SIZE]);
        let header = Elf64Header::from_be_bytes(&buf);

        if header.e_ident[0..4] != ELF_MAGIC {
            let magic_bytes: String = header.e_ident[0..4]
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ");
            return Err(LoaderError::InvalidElf(format!(
                "Invalid ELF magic bytes: {} (expected: 7F 45 4C 46 / \\x7FELF)",
                magic_bytes
            )));
        }

        if header.e_ident[4] != ELFCLASS64 {
            return Err(LoaderError::InvalidElf(format!(
                "Not a 64-bit ELF: class={} (expected: 2 for ELFCLASS64)",
                header.e_ident[4]
            )));
        }

        if header.e_ident[5] != ELFDATA2MSB {
            return Err(LoaderError::InvalidElf(format!(
                "Not big-endian ELF: data encoding={} (expected: 2 for ELFDATA2MSB)",
                header.e_ident[5]
            )));
        }

        Ok(header)
    }

    /// Parse program headers
    pub fn parse_phdrs(data: &[u8], header: &Elf64Header) -> Result<Vec<Elf64Phdr>, LoaderError> {
        if header.e_phnum == 0 {
            return Ok(Vec::new());
        }

        let entsize = (header.e_phentsize as usize).max(PHDR_SIZE);
        let table_end = header.e_phoff as u128 + header.e_phnum as u128 * entsize as u128;
        if table_end > data.len() as u128 {
            return Err(LoaderError::InvalidElf(format!(
                "Program header table extends beyond file: table ends at offset 0x{:x} but file is only {} bytes",
                table_end,
                data.len()
            )));
        }

        let phdrs = (0..header.e_phnum as usize)
            .map(|i| {
                let at = header.e_phoff as usize + i * entsize;
                let mut buf = [0u8; PHDR_SIZE];
                buf.copy_from_slice(&data[at..at + PHDR_SIZE]);
                Elf64Phdr::from_be_bytes(&buf)
            })
            .collect();

        Ok(phdrs)
    }

    /// Parse section headers
    ///
    /// Section headers are optional; a table that does not fit in the file
    /// is dropped with a diagnostic.
    pub fn parse_shdrs(data: &[u8], header: &Elf64Header) -> Vec<Elf64Shdr> {
        if header.e_shoff == 0 || header.e_shnum == 0 {
            debug!("No section headers present (e_shoff=0 or e_shnum=0)");
            return Vec::new();
        }

        let entsize = (header.e_shentsize as usize).max(SHDR_SIZE);
        let table_end = header.e_shoff as u128 + header.e_shnum as u128 * entsize as u128;
        if table_end > data.len() as u128 {
            warn!(
                "Section header table extends beyond file: table ends at 0x{:x} but file is {} bytes, ignoring section headers",
                table_end,
                data.len()
            );
            return Vec::new();
        }

        (0..header.e_shnum as usize)
            .map(|i| {
                let at = header.e_shoff as usize + i * entsize;
                let mut buf = [0u8; SHDR_SIZE];
                buf.copy_from_slice(&data[at..at + SHDR_SIZE]);
                Elf64Shdr::from_be_bytes(&buf)
            })
            .collect()
    }

    pub fn declared_type(&self) -> u16 {
        self.header.e_type
    }

    pub fn machine(&self) -> u16 {
        self.header.e_machine
    }

    pub fn osabi(&self) -> u8 {
        self.header.e_ident[7]
    }

    pub fn entry_address(&self) -> u64 {
        self.header.e_entry
    }

    pub fn segments(&self) -> &[Elf64Phdr] {
        &self.phdrs
    }

    pub fn sections(&self) -> &[Elf64Shdr] {
        &self.shdrs
    }

    /// Whole file contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes in `[offset, offset + size)`, if that range is inside the file
    pub fn bytes(&self, offset: u64, size: u64) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(size).ok()?)?;
        self.data.get(start..end)
    }

    /// File bytes backing a segment (`p_filesz` of them)
    pub fn segment_data(&self, phdr: &Elf64Phdr) -> Option<&[u8]> {
        self.bytes(phdr.p_offset, phdr.p_filesz)
    }

    /// File bytes backing a section
    pub fn section_data(&self, shdr: &Elf64Shdr) -> Option<&[u8]> {
        self.bytes(shdr.sh_offset, shdr.sh_size)
    }

    /// Name of a section from the section header string table
    pub fn section_name(&self, shdr: &Elf64Shdr) -> Option<&str> {
        if shdr.sh_name == 0 {
            return None;
        }
        let strtab = self.shdrs.get(self.header.e_shstrndx as usize)?;
        let table = self.section_data(strtab)?;
        let start = shdr.sh_name as usize;
        let rest = table.get(start..)?;
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        std::str::from_utf8(&rest[..len]).ok()
    }

    /// First section with the given name
    pub fn section_by_name(&self, name: &str) -> Option<(usize, &Elf64Shdr)> {
        self.shdrs
            .iter()
            .enumerate()
            .find(|(_, sh)| self.section_name(sh) == Some(name))
    }

    /// First section with the given type
    pub fn section_by_type(&self, sh_type: u32) -> Option<(usize, &Elf64Shdr)> {
        self.shdrs
            .iter()
            .enumerate()
            .find(|(_, sh)| sh.sh_type == sh_type)
    }
}
