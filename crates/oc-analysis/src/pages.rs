//! Page-backed byte storage and segment permissions

use bitflags::bitflags;
use std::collections::HashMap;

/// Size of one backing page
pub const PAGE_SIZE: u32 = 0x1000;

bitflags! {
    /// Segment permission flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentPerms: u8 {
        /// Segment is readable
        const READ  = 0b0000_0001;
        /// Segment is writable
        const WRITE = 0b0000_0010;
        /// Segment is executable
        const EXEC  = 0b0000_0100;

        /// Read and write access
        const RW  = Self::READ.bits() | Self::WRITE.bits();
        /// Read and execute access
        const RX  = Self::READ.bits() | Self::EXEC.bits();
        /// Read, write, and execute access
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXEC.bits();
    }
}

impl Default for SegmentPerms {
    fn default() -> Self {
        Self::empty()
    }
}

/// Sparse 32-bit address space made of zero-filled 4KB pages
///
/// Pages come into existence the first time they are written; reads of
/// pages that were never written return zeros. Callers are responsible
/// for checking that an address is mapped.
#[derive(Debug, Default, Clone)]
pub struct PageStore {
    pages: HashMap<u32, Box<[u8]>>,
}

impl PageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages materialized so far
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    fn split(addr: u32) -> (u32, usize) {
        (addr / PAGE_SIZE, (addr % PAGE_SIZE) as usize)
    }

    /// Copy `data` into the store starting at `addr`
    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        let mut addr = addr;
        let mut rest = data;

        while !rest.is_empty() {
            let (page, offset) = Self::split(addr);
            let chunk = rest.len().min(PAGE_SIZE as usize - offset);
            let buf = self
                .pages
                .entry(page)
                .or_insert_with(|| vec![0u8; PAGE_SIZE as usize].into_boxed_slice());
            buf[offset..offset + chunk].copy_from_slice(&rest[..chunk]);

            rest = &rest[chunk..];
            addr = addr.wrapping_add(chunk as u32);
        }
    }

    /// Copy `out.len()` bytes starting at `addr` into `out`
    pub fn read_into(&self, addr: u32, out: &mut [u8]) {
        let mut addr = addr;
        let mut done = 0;

        while done < out.len() {
            let (page, offset) = Self::split(addr);
            let chunk = (out.len() - done).min(PAGE_SIZE as usize - offset);
            match self.pages.get(&page) {
                Some(buf) => out[done..done + chunk].copy_from_slice(&buf[offset..offset + chunk]),
                None => out[done..done + chunk].fill(0),
            }

            done += chunk;
            addr = addr.wrapping_add(chunk as u32);
        }
    }
}
