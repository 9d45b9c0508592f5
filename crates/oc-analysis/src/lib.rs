//! Analysis database for cell-ldr
//!
//! The loader never touches an address space directly. It declares
//! regions, names, records and patches through [`AnalysisDatabase`];
//! [`Program`] is the in-memory implementation used by the command line
//! front end and the tests.

pub mod database;
pub mod pages;
pub mod program;

pub use database::{
    AddressRegion, AnalysisDatabase, RecordMember, RecordType, SegmentClass, Width,
};
pub use pages::{PageStore, SegmentPerms, PAGE_SIZE};
pub use program::{EntryPoint, ImportBinding, Program, Record};
