//! In-memory analysis database

use crate::database::{AddressRegion, AnalysisDatabase, RecordType, Width};
use crate::pages::PageStore;
use oc_core::error::DatabaseError;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace};

/// A structure instance declared at an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub size: u32,
    pub type_name: String,
}

/// A registered entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub addr: u32,
    pub name: String,
    pub primary: bool,
}

/// A cross-module import binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub library: String,
    pub addr: u32,
    pub name: String,
}

/// Page-backed program model
///
/// Keeps two copies of every loaded byte: the live image that relocations
/// patch, and the image as it came from the file.
#[derive(Debug, Default)]
pub struct Program {
    regions: Vec<AddressRegion>,
    current: PageStore,
    original: PageStore,
    names: BTreeMap<u32, String>,
    annotations: BTreeMap<u32, Vec<String>>,
    record_types: HashMap<&'static str, RecordType>,
    records: BTreeMap<u32, Record>,
    entry_points: Vec<EntryPoint>,
    imports: Vec<ImportBinding>,
    code: BTreeSet<u32>,
    toc: Option<u32>,
}

impl Program {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Regions in creation order
    pub fn regions(&self) -> &[AddressRegion] {
        &self.regions
    }

    /// Most recently created region containing `addr`
    pub fn region_at(&self, addr: u32) -> Option<&AddressRegion> {
        self.regions.iter().rev().find(|r| r.contains(addr))
    }

    /// Whether every byte of `[addr, addr + len)` belongs to some region
    pub fn is_mapped(&self, addr: u32, len: u32) -> bool {
        (0..len).all(|i| {
            addr.checked_add(i)
                .is_some_and(|a| self.region_at(a).is_some())
        })
    }

    pub fn name_at(&self, addr: u32) -> Option<&str> {
        self.names.get(&addr).map(|s| s.as_str())
    }

    /// Address carrying `name`, if any
    pub fn address_of(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(addr, _)| *addr)
    }

    pub fn names(&self) -> &BTreeMap<u32, String> {
        &self.names
    }

    pub fn annotations_at(&self, addr: u32) -> &[String] {
        self.annotations
            .get(&addr)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn record_type(&self, name: &str) -> Option<&RecordType> {
        self.record_types.get(name)
    }

    pub fn record_at(&self, addr: u32) -> Option<&Record> {
        self.records.get(&addr)
    }

    pub fn records(&self) -> &BTreeMap<u32, Record> {
        &self.records
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn imports(&self) -> &[ImportBinding] {
        &self.imports
    }

    pub fn is_code(&self, addr: u32) -> bool {
        self.code.contains(&addr)
    }

    pub fn code_addresses(&self) -> impl Iterator<Item = u32> + '_ {
        self.code.iter().copied()
    }

    pub fn toc(&self) -> Option<u32> {
        self.toc
    }

    fn check_mapped(&self, addr: u32, width: Width) -> Result<(), DatabaseError> {
        if self.is_mapped(addr, width.bytes()) {
            Ok(())
        } else {
            Err(DatabaseError::Unmapped(addr))
        }
    }

    fn read_from(store: &PageStore, addr: u32, width: Width) -> u32 {
        let mut buf = [0u8; 4];
        let len = width.bytes() as usize;
        store.read_into(addr, &mut buf[4 - len..]);
        u32::from_be_bytes(buf)
    }
}

impl AnalysisDatabase for Program {
    fn create_region(
        &mut self,
        region: AddressRegion,
        backing: Option<&[u8]>,
    ) -> Result<(), DatabaseError> {
        if region.size == 0 || region.end() > u32::MAX as u64 + 1 {
            return Err(DatabaseError::InvalidRegion {
                start: region.start,
                size: region.size,
            });
        }

        debug!(
            "Creating region {:?} [0x{:08x}, 0x{:08x}) class={} perms={:?}",
            region.name.as_deref().unwrap_or(""),
            region.start,
            region.end(),
            region.class,
            region.perms
        );

        if self.regions.iter().any(|r| {
            (r.start as u64) < region.end() && (region.start as u64) < r.end()
        }) {
            debug!("Region at 0x{:08x} overlaps an existing region", region.start);
        }

        // Bytes past the backing stay unmaterialized and read as zero
        if let Some(data) = backing {
            let data = &data[..data.len().min(region.size as usize)];
            self.current.write_bytes(region.start, data);
            self.original.write_bytes(region.start, data);
        }

        self.regions.push(region);
        Ok(())
    }

    fn define_name(&mut self, addr: u32, name: &str) {
        trace!("name 0x{:08x} = {}", addr, name);
        self.names.insert(addr, name.to_string());
    }

    fn annotate(&mut self, addr: u32, text: &str) {
        self.annotations
            .entry(addr)
            .or_default()
            .push(text.to_string());
    }

    fn define_record_type(&mut self, ty: RecordType) {
        self.record_types.insert(ty.name, ty);
    }

    fn declare_record(&mut self, addr: u32, size: u32, type_name: &str) {
        self.records.insert(
            addr,
            Record {
                size,
                type_name: type_name.to_string(),
            },
        );
    }

    fn register_entry_point(&mut self, addr: u32, name: &str, primary: bool) {
        self.entry_points.push(EntryPoint {
            addr,
            name: name.to_string(),
            primary,
        });
    }

    fn register_import(&mut self, library: &str, addr: u32, name: &str) {
        self.imports.push(ImportBinding {
            library: library.to_string(),
            addr,
            name: name.to_string(),
        });
    }

    fn mark_code(&mut self, addr: u32) {
        self.code.insert(addr);
    }

    fn set_toc(&mut self, gp: u32) {
        self.toc = Some(gp);
    }

    fn patch(&mut self, addr: u32, width: Width, value: u32) -> Result<(), DatabaseError> {
        self.check_mapped(addr, width)?;
        let bytes = value.to_be_bytes();
        let len = width.bytes() as usize;
        self.current.write_bytes(addr, &bytes[4 - len..]);
        Ok(())
    }

    fn read(&self, addr: u32, width: Width) -> Result<u32, DatabaseError> {
        self.check_mapped(addr, width)?;
        Ok(Self::read_from(&self.current, addr, width))
    }

    fn read_original(&self, addr: u32, width: Width) -> Result<u32, DatabaseError> {
        self.check_mapped(addr, width)?;
        Ok(Self::read_from(&self.original, addr, width))
    }
}
