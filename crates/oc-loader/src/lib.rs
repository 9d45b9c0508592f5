//! PS3 PPU executable and PRX loader

pub mod cell;
pub mod elf;
pub mod info;
pub mod layout;
pub mod libs;
pub mod nid;
pub mod reloc;
pub mod segments;
pub mod symbols;
pub mod toc;
pub mod variant;

// Re-export main types
pub use cell::{declare_structures, CellLoader, LoadOptions, LoadReport};
pub use elf::{Elf64Header, Elf64Phdr, Elf64Rela, Elf64Shdr, Elf64Sym, ElfImage, Symbol, SymbolTable};
pub use info::{ModuleInfo, ProcessParam, ProcessPrxInfo};
pub use libs::{LibraryExport, LibraryImport, LibraryRecord, LibraryRecords, TableKind, WalkStats};
pub use nid::NidDatabase;
pub use reloc::{RelocAlgorithm, RelocType, RelocationOptions, RelocationStats, SegmentSymbol};
pub use toc::LoadContext;
pub use variant::{accept_file, FileFormat, Variant};
