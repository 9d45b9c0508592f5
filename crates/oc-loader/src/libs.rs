//! Import/export table walker
//!
//! Export (`_scelibent_ppu32`) and import (`_scelibstub_ppu32`) records
//! are chained by their leading size byte. [`LibraryRecords`] walks a
//! `[start, end)` range lazily; [`load_exports`] and [`load_imports`]
//! resolve each NID against the [`NidDatabase`] and label the tables.

use crate::layout::{self, lib_common, libent, libstub};
use crate::nid::NidDatabase;
use oc_analysis::AnalysisDatabase;
use oc_core::error::DatabaseError;
use tracing::{debug, info, trace, warn};

/// Longest library name read from the image
pub const MAX_LIBNAME_LEN: u32 = 0x100;

/// Which table a walk is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Exports,
    Imports,
}

impl TableKind {
    /// Size byte a well-formed record of this kind carries
    pub fn record_size(&self) -> u8 {
        match self {
            Self::Exports => libent::SIZE,
            Self::Imports => libstub::SIZE,
        }
    }
}

/// Counts shared by both record shapes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryCounts {
    pub nfunc: u16,
    pub nvar: u16,
    pub ntlsvar: u16,
}

impl LibraryCounts {
    pub fn total(&self) -> u32 {
        self.nfunc as u32 + self.nvar as u32 + self.ntlsvar as u32
    }
}

/// A decoded `_scelibent_ppu32`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryExport {
    pub addr: u32,
    pub version: u16,
    pub attribute: u16,
    pub counts: LibraryCounts,
    pub libname: u32,
    pub nid_table: u32,
    pub add_table: u32,
}

/// One NID/address table pair of an import record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubTable {
    pub nid_table: u32,
    pub addr_table: u32,
}

impl StubTable {
    fn is_present(&self) -> bool {
        self.nid_table != 0 && self.addr_table != 0
    }
}

/// A decoded `_scelibstub_ppu32`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryImport {
    pub addr: u32,
    pub version: u16,
    pub attribute: u16,
    pub counts: LibraryCounts,
    pub libname: u32,
    pub functions: StubTable,
    pub variables: StubTable,
    pub tls_variables: StubTable,
}

/// One step of a table walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryRecord {
    Export(LibraryExport),
    Import(LibraryImport),
    /// Size byte does not match the expected shape; skipped using that size
    Unrecognized { addr: u32, size: u8 },
}

/// Lazy walk over a chain of library records
///
/// Each record's first byte is its size and advances the cursor. The walk
/// ends at `end`, at a zero size byte, or at an unreadable address.
#[derive(Clone)]
pub struct LibraryRecords<'a> {
    db: &'a dyn AnalysisDatabase,
    kind: TableKind,
    cursor: u32,
    end: u32,
}

impl<'a> LibraryRecords<'a> {
    pub fn new(db: &'a dyn AnalysisDatabase, kind: TableKind, start: u32, end: u32) -> Self {
        Self {
            db,
            kind,
            cursor: start,
            end,
        }
    }

    fn counts(&self, addr: u32) -> Result<(u16, u16, LibraryCounts), DatabaseError> {
        Ok((
            self.db.read_u16(addr.wrapping_add(lib_common::VERSION))?,
            self.db.read_u16(addr.wrapping_add(lib_common::ATTRIBUTE))?,
            LibraryCounts {
                nfunc: self.db.read_u16(addr.wrapping_add(lib_common::NFUNC))?,
                nvar: self.db.read_u16(addr.wrapping_add(lib_common::NVAR))?,
                ntlsvar: self.db.read_u16(addr.wrapping_add(lib_common::NTLSVAR))?,
            },
        ))
    }

    fn decode_export(&self, addr: u32) -> Result<LibraryExport, DatabaseError> {
        let (version, attribute, counts) = self.counts(addr)?;
        Ok(LibraryExport {
            addr,
            version,
            attribute,
            counts,
            libname: self.db.read_u32(addr.wrapping_add(libent::LIBNAME))?,
            nid_table: self.db.read_u32(addr.wrapping_add(libent::NIDTABLE))?,
            add_table: self.db.read_u32(addr.wrapping_add(libent::ADDTABLE))?,
        })
    }

    fn decode_import(&self, addr: u32) -> Result<LibraryImport, DatabaseError> {
        let (version, attribute, counts) = self.counts(addr)?;
        let table = |nid: u32, tbl: u32| -> Result<StubTable, DatabaseError> {
            Ok(StubTable {
                nid_table: self.db.read_u32(addr.wrapping_add(nid))?,
                addr_table: self.db.read_u32(addr.wrapping_add(tbl))?,
            })
        };
        Ok(LibraryImport {
            addr,
            version,
            attribute,
            counts,
            libname: self.db.read_u32(addr.wrapping_add(libstub::LIBNAME))?,
            functions: table(libstub::FUNC_NIDTABLE, libstub::FUNC_TABLE)?,
            variables: table(libstub::VAR_NIDTABLE, libstub::VAR_TABLE)?,
            tls_variables: table(libstub::TLS_NIDTABLE, libstub::TLS_TABLE)?,
        })
    }
}

impl Iterator for LibraryRecords<'_> {
    type Item = LibraryRecord;

    fn next(&mut self) -> Option<LibraryRecord> {
        if self.cursor >= self.end {
            return None;
        }

        let addr = self.cursor;
        let size = match self.db.read_u8(addr) {
            Ok(0) => {
                warn!("Zero-sized library record at 0x{:08x}, stopping walk", addr);
                self.cursor = self.end;
                return None;
            }
            Ok(size) => size,
            Err(e) => {
                warn!("Library table walk stopped at 0x{:08x}: {}", addr, e);
                self.cursor = self.end;
                return None;
            }
        };

        self.cursor = match addr.checked_add(size as u32) {
            Some(next) => next,
            None => self.end,
        };

        if size != self.kind.record_size() {
            return Some(LibraryRecord::Unrecognized { addr, size });
        }

        let decoded = match self.kind {
            TableKind::Exports => self.decode_export(addr).map(LibraryRecord::Export),
            TableKind::Imports => self.decode_import(addr).map(LibraryRecord::Import),
        };
        Some(decoded.unwrap_or_else(|e| {
            warn!("Cannot decode library record at 0x{:08x}: {}", addr, e);
            LibraryRecord::Unrecognized { addr, size }
        }))
    }
}

/// Outcome counters of a table walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub libraries: usize,
    pub unrecognized: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

impl WalkStats {
    pub fn merge(&mut self, other: WalkStats) {
        self.libraries += other.libraries;
        self.unrecognized += other.unrecognized;
        self.resolved += other.resolved;
        self.unresolved += other.unresolved;
    }
}

fn library_name(db: &dyn AnalysisDatabase, ptr: u32) -> Option<String> {
    if ptr == 0 {
        return None;
    }
    match db.read_cstr(ptr, MAX_LIBNAME_LEN) {
        Ok(name) => Some(name),
        Err(e) => {
            warn!("Cannot read library name at 0x{:08x}: {}", ptr, e);
            None
        }
    }
}

fn read_slot(db: &dyn AnalysisDatabase, addr: u32) -> Option<u32> {
    db.read_u32(addr)
        .map_err(|e| debug!("Unreadable table slot 0x{:08x}: {}", addr, e))
        .ok()
}

fn lookup<'n>(
    nids: &'n NidDatabase,
    library: &str,
    nid: u32,
    stats: &mut WalkStats,
) -> Option<&'n str> {
    let name = nids.lookup(library, nid);
    match name {
        Some(name) => {
            trace!("{} 0x{:08x} -> {}", library, nid, name);
            stats.resolved += 1;
        }
        None => {
            if nids.has_library(library) {
                trace!("{} 0x{:08x} unresolved", library, nid);
            } else {
                trace!("{} 0x{:08x} unresolved, library not in NID database", library, nid);
            }
            stats.unresolved += 1;
        }
    }
    name
}

fn declare_slot_pair(db: &mut dyn AnalysisDatabase, nid_slot: u32, addr_slot: u32) {
    db.declare_record(nid_slot, 4, layout::DWORD);
    db.declare_record(addr_slot, 4, layout::DWORD);
}

/// Walk the export table `[start, end)` and label what it finds
pub fn load_exports(
    db: &mut dyn AnalysisDatabase,
    nids: &NidDatabase,
    start: u32,
    end: u32,
) -> WalkStats {
    info!("Loading exports [0x{:08x}, 0x{:08x})...", start, end);

    db.define_name(start.wrapping_sub(4), "__begin_of_section_lib_ent");
    db.define_name(end, "__end_of_section_lib_ent");

    let records: Vec<_> = LibraryRecords::new(&*db, TableKind::Exports, start, end).collect();
    let mut stats = WalkStats::default();

    for record in records {
        match record {
            LibraryRecord::Export(export) => {
                stats.libraries += 1;
                apply_export(db, nids, &export, &mut stats);
            }
            LibraryRecord::Unrecognized { addr, size } => {
                warn!("Unknown export structure at 0x{:08x} (size {})", addr, size);
                stats.unrecognized += 1;
            }
            LibraryRecord::Import(_) => {}
        }
    }

    stats
}

fn apply_export(
    db: &mut dyn AnalysisDatabase,
    nids: &NidDatabase,
    export: &LibraryExport,
    stats: &mut WalkStats,
) {
    db.declare_record(export.addr, libent::SIZE as u32, layout::LIBENT);

    let library = library_name(&*db, export.libname);
    match &library {
        None => {
            db.define_name(export.nid_table, "_NONAMEnid_table");
            db.define_name(export.add_table, "_NONAMEentry_table");
        }
        Some(lib) => {
            db.define_name(export.libname, &format!("_{}_str", lib));
            db.define_name(export.nid_table, &format!("__{}_Functions_NID_table", lib));
            db.define_name(export.add_table, &format!("__{}_Functions_table", lib));
        }
    }

    debug!(
        "Export {}: {} functions, {} variables, {} TLS variables",
        library.as_deref().unwrap_or("<noname>"),
        export.counts.nfunc,
        export.counts.nvar,
        export.counts.ntlsvar
    );

    if export.nid_table == 0 || export.add_table == 0 {
        return;
    }

    for i in 0..export.counts.total() {
        let nid_slot = export.nid_table.wrapping_add(i * 4);
        let add_slot = export.add_table.wrapping_add(i * 4);
        let is_function = i < export.counts.nfunc as u32;

        if let (Some(lib), Some(nid), Some(add)) = (
            library.as_deref(),
            read_slot(&*db, nid_slot),
            read_slot(&*db, add_slot),
        ) {
            // Function entries point at an OPD; its first word is the body
            let body = read_slot(&*db, add);

            if let Some(name) = lookup(nids, lib, nid, stats) {
                db.annotate(nid_slot, name);
                db.define_name(add, name);
                if let (true, Some(body)) = (is_function, body) {
                    db.define_name(body, &format!(".{}", name));
                }
            }

            if let (true, Some(body)) = (is_function, body) {
                db.mark_code(body);
            }
        }

        declare_slot_pair(db, nid_slot, add_slot);
    }
}

/// Walk the import table `[start, end)` and label what it finds
pub fn load_imports(
    db: &mut dyn AnalysisDatabase,
    nids: &NidDatabase,
    start: u32,
    end: u32,
) -> WalkStats {
    info!("Loading imports [0x{:08x}, 0x{:08x})...", start, end);

    db.define_name(start.wrapping_sub(4), "__begin_of_section_lib_stub");
    db.define_name(end, "__end_of_section_lib_stub");

    let records: Vec<_> = LibraryRecords::new(&*db, TableKind::Imports, start, end).collect();
    let mut stats = WalkStats::default();

    for record in records {
        match record {
            LibraryRecord::Import(import) => {
                stats.libraries += 1;
                apply_import(db, nids, &import, &mut stats);
            }
            LibraryRecord::Unrecognized { addr, size } => {
                warn!("Unknown import structure at 0x{:08x} (size {})", addr, size);
                stats.unrecognized += 1;
            }
            LibraryRecord::Export(_) => {}
        }
    }

    stats
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportKind {
    Function,
    Variable,
}

fn apply_import(
    db: &mut dyn AnalysisDatabase,
    nids: &NidDatabase,
    import: &LibraryImport,
    stats: &mut WalkStats,
) {
    db.declare_record(import.addr, libstub::SIZE as u32, layout::LIBSTUB);

    let library = library_name(&*db, import.libname);
    if let Some(lib) = &library {
        db.define_name(import.addr, &format!("_{}_0001_stub_head", lib));
        db.define_name(import.libname, &format!("_{}_stub_str", lib));
        db.define_name(
            import.libname.wrapping_sub(4),
            &format!("_sce_package_version_{}", lib),
        );
    } else {
        warn!("Import record at 0x{:08x} has no library name", import.addr);
    }

    debug!(
        "Import {}: {} functions, {} variables, {} TLS variables",
        library.as_deref().unwrap_or("<noname>"),
        import.counts.nfunc,
        import.counts.nvar,
        import.counts.ntlsvar
    );

    let tables = [
        (import.functions, import.counts.nfunc, ImportKind::Function),
        (import.variables, import.counts.nvar, ImportKind::Variable),
        (import.tls_variables, import.counts.ntlsvar, ImportKind::Variable),
    ];

    for (table, count, kind) in tables {
        if !table.is_present() {
            continue;
        }
        for i in 0..count as u32 {
            let nid_slot = table.nid_table.wrapping_add(i * 4);
            let addr_slot = table.addr_table.wrapping_add(i * 4);
            apply_import_slot(db, nids, library.as_deref(), kind, nid_slot, addr_slot, stats);
            declare_slot_pair(db, nid_slot, addr_slot);
        }
    }
}

fn apply_import_slot(
    db: &mut dyn AnalysisDatabase,
    nids: &NidDatabase,
    library: Option<&str>,
    kind: ImportKind,
    nid_slot: u32,
    addr_slot: u32,
    stats: &mut WalkStats,
) {
    let Some(lib) = library else {
        return;
    };
    let Some(nid) = read_slot(&*db, nid_slot) else {
        return;
    };
    let Some(name) = lookup(nids, lib, nid, stats) else {
        return;
    };

    db.annotate(nid_slot, name);
    match kind {
        ImportKind::Function => {
            db.define_name(addr_slot, &format!("{}.stub_entry", name));
            if let Some(target) = read_slot(&*db, addr_slot) {
                let symbol = format!(".{}", name);
                db.define_name(target, &symbol);
                db.register_import(lib, target, &symbol);
            }
        }
        ImportKind::Variable => db.define_name(addr_slot, name),
    }
}
