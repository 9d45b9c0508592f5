//! The analysis database seam

use crate::pages::SegmentPerms;
use oc_core::error::DatabaseError;

/// Segment class, mirroring the usual disassembler segment classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentClass {
    Code,
    Data,
    Const,
    Bss,
}

impl SegmentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "CODE",
            Self::Data => "DATA",
            Self::Const => "CONST",
            Self::Bss => "BSS",
        }
    }
}

impl std::fmt::Display for SegmentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An address-space region handed to [`AnalysisDatabase::create_region`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRegion {
    /// Selector (ordinal of the region within the load)
    pub selector: u32,
    /// Final start address, relocation base already applied
    pub start: u32,
    /// Size in bytes
    pub size: u32,
    pub name: Option<String>,
    pub class: SegmentClass,
    pub perms: SegmentPerms,
    pub align: u32,
}

impl AddressRegion {
    /// One past the last address of the region
    pub fn end(&self) -> u64 {
        self.start as u64 + self.size as u64
    }

    /// Whether `addr` lies inside the region
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && (addr as u64) < self.end()
    }
}

/// Access width for patches and reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    /// Width in bytes
    pub fn bytes(&self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
        }
    }

    /// Mask selecting the bits a value of this width keeps
    pub fn mask(&self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Half => 0xFFFF,
            Self::Word => 0xFFFF_FFFF,
        }
    }
}

/// One member of a [`RecordType`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMember {
    pub name: &'static str,
    pub offset: u32,
    pub size: u32,
    /// The member holds a 32-bit address
    pub is_pointer: bool,
}

/// A named structure layout the database can stamp onto addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub name: &'static str,
    pub members: Vec<RecordMember>,
}

impl RecordType {
    /// Total size: end of the furthest member
    pub fn size(&self) -> u32 {
        self.members
            .iter()
            .map(|m| m.offset + m.size)
            .max()
            .unwrap_or(0)
    }

    /// Look up a member by name
    pub fn member(&self, name: &str) -> Option<&RecordMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Receiver of everything a load produces
///
/// Naming calls must tolerate being repeated for the same address: the
/// last call wins. Declaring the same record twice at one address is
/// idempotent.
pub trait AnalysisDatabase {
    /// Register a region and, unless `backing` is `None`, copy its bytes in.
    /// Bytes past the end of `backing` read as zero.
    fn create_region(
        &mut self,
        region: AddressRegion,
        backing: Option<&[u8]>,
    ) -> Result<(), DatabaseError>;

    /// Give `addr` a name, replacing any previous one
    fn define_name(&mut self, addr: u32, name: &str);

    /// Attach a free-form annotation line to `addr`
    fn annotate(&mut self, addr: u32, text: &str);

    /// Make a structure layout known to the database
    fn define_record_type(&mut self, ty: RecordType);

    /// Declare `size` bytes at `addr` as an instance of the named type
    fn declare_record(&mut self, addr: u32, size: u32, type_name: &str);

    /// Register an entry point
    fn register_entry_point(&mut self, addr: u32, name: &str, primary: bool);

    /// Record that `name` at `addr` is imported from `library`
    fn register_import(&mut self, library: &str, addr: u32, name: &str);

    /// Queue `addr` as the start of a function for later analysis
    fn mark_code(&mut self, addr: u32);

    /// Publish the resolved TOC (r2) value
    fn set_toc(&mut self, gp: u32);

    /// Store the low `width` bytes of `value` big-endian at `addr`
    fn patch(&mut self, addr: u32, width: Width, value: u32) -> Result<(), DatabaseError>;

    /// Read a big-endian value as currently stored (patches included)
    fn read(&self, addr: u32, width: Width) -> Result<u32, DatabaseError>;

    /// Read a big-endian value as originally loaded, ignoring patches
    fn read_original(&self, addr: u32, width: Width) -> Result<u32, DatabaseError>;

    fn read_u8(&self, addr: u32) -> Result<u8, DatabaseError> {
        self.read(addr, Width::Byte).map(|v| v as u8)
    }

    fn read_u16(&self, addr: u32) -> Result<u16, DatabaseError> {
        self.read(addr, Width::Half).map(|v| v as u16)
    }

    fn read_u32(&self, addr: u32) -> Result<u32, DatabaseError> {
        self.read(addr, Width::Word)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes
    fn read_cstr(&self, addr: u32, max_len: u32) -> Result<String, DatabaseError> {
        let mut bytes = Vec::new();
        for i in 0..max_len {
            let b = self.read_u8(addr.wrapping_add(i))?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
