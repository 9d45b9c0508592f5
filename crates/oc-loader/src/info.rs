//! Module info (PRX) and process info (executable) parsing

use crate::elf::{pt, ElfImage};
use crate::layout::{self, module_info, process_param, process_prx_info};
use crate::libs::{load_exports, load_imports, WalkStats};
use crate::nid::NidDatabase;
use crate::toc::{module_info_address, LoadContext};
use oc_analysis::AnalysisDatabase;
use oc_core::error::DatabaseError;
use tracing::{info, warn};

/// Decoded `_scemoduleinfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub addr: u32,
    pub attribute: u16,
    pub version: [u8; 2],
    pub name: String,
    pub gp_value: u32,
    pub ent_top: u32,
    pub ent_end: u32,
    pub stub_top: u32,
    pub stub_end: u32,
}

impl ModuleInfo {
    pub fn read(db: &dyn AnalysisDatabase, addr: u32) -> Result<Self, DatabaseError> {
        let at = |off: u32| addr.wrapping_add(off);
        Ok(Self {
            addr,
            attribute: db.read_u16(at(module_info::ATTRIBUTE))?,
            version: [
                db.read_u8(at(module_info::VERSION))?,
                db.read_u8(at(module_info::VERSION + 1))?,
            ],
            name: db.read_cstr(at(module_info::NAME), module_info::NAME_LEN)?,
            gp_value: db.read_u32(at(module_info::GP_VALUE))?,
            ent_top: db.read_u32(at(module_info::ENT_TOP))?,
            ent_end: db.read_u32(at(module_info::ENT_END))?,
            stub_top: db.read_u32(at(module_info::STUB_TOP))?,
            stub_end: db.read_u32(at(module_info::STUB_END))?,
        })
    }
}

/// Decoded `sys_process_param_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessParam {
    pub size: u32,
    pub magic: u32,
    pub version: u32,
    pub sdk_version: u32,
    pub primary_prio: i32,
    pub primary_stacksize: u32,
    pub malloc_pagesize: u32,
    pub ppc_seg: u32,
    pub crash_dump_param_addr: u32,
}

impl ProcessParam {
    pub fn read(db: &dyn AnalysisDatabase, addr: u32) -> Result<Self, DatabaseError> {
        let word = |off: u32| db.read_u32(addr.wrapping_add(off));
        Ok(Self {
            size: word(process_param::SIZE_FIELD)?,
            magic: word(process_param::MAGIC)?,
            version: word(process_param::VERSION)?,
            sdk_version: word(process_param::SDK_VERSION)?,
            primary_prio: word(process_param::PRIMARY_PRIO)? as i32,
            primary_stacksize: word(process_param::PRIMARY_STACKSIZE)?,
            malloc_pagesize: word(process_param::MALLOC_PAGESIZE)?,
            ppc_seg: word(process_param::PPC_SEG)?,
            crash_dump_param_addr: word(process_param::CRASH_DUMP_PARAM_ADDR)?,
        })
    }
}

/// Decoded `sys_process_prx_info_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessPrxInfo {
    pub size: u32,
    pub magic: u32,
    pub version: u32,
    pub sdk_version: u32,
    pub libent_start: u32,
    pub libent_end: u32,
    pub libstub_start: u32,
    pub libstub_end: u32,
    pub major_version: u8,
    pub minor_version: u8,
}

impl ProcessPrxInfo {
    pub fn read(db: &dyn AnalysisDatabase, addr: u32) -> Result<Self, DatabaseError> {
        let word = |off: u32| db.read_u32(addr.wrapping_add(off));
        Ok(Self {
            size: word(process_prx_info::SIZE_FIELD)?,
            magic: word(process_prx_info::MAGIC)?,
            version: word(process_prx_info::VERSION)?,
            sdk_version: word(process_prx_info::SDK_VERSION)?,
            libent_start: word(process_prx_info::LIBENT_START)?,
            libent_end: word(process_prx_info::LIBENT_END)?,
            libstub_start: word(process_prx_info::LIBSTUB_START)?,
            libstub_end: word(process_prx_info::LIBSTUB_END)?,
            major_version: db.read_u8(addr.wrapping_add(process_prx_info::MAJOR_VERSION))?,
            minor_version: db.read_u8(addr.wrapping_add(process_prx_info::MINOR_VERSION))?,
        })
    }
}

/// Locate the module info of a PRX, walk its export then import tables and
/// register the `module_info` entry point.
///
/// Returns `None` (after logging) when the module info cannot be read.
pub fn apply_module_info(
    image: &ElfImage,
    ctx: &LoadContext,
    nids: &NidDatabase,
    db: &mut dyn AnalysisDatabase,
) -> Option<(ModuleInfo, WalkStats)> {
    let Some(addr) = module_info_address(image, ctx.relocation_base) else {
        warn!("PRX has no program headers, cannot locate module info");
        return None;
    };

    let modinfo = match ModuleInfo::read(&*db, addr) {
        Ok(modinfo) => modinfo,
        Err(e) => {
            warn!("Cannot read module info at 0x{:08x}: {}", addr, e);
            return None;
        }
    };

    info!(
        "Module '{}' v{}.{} attr=0x{:04x} at 0x{:08x}",
        modinfo.name, modinfo.version[0], modinfo.version[1], modinfo.attribute, addr
    );

    db.declare_record(addr, module_info::SIZE, layout::MODULE_INFO);

    let mut stats = load_exports(db, nids, modinfo.ent_top, modinfo.ent_end);
    stats.merge(load_imports(db, nids, modinfo.stub_top, modinfo.stub_end));

    db.register_entry_point(addr, "module_info", false);
    Some((modinfo, stats))
}

/// Scan an executable's segments for process parameters and PRX info.
/// The library tables referenced by the PRX info are walked.
pub fn apply_process_info(
    image: &ElfImage,
    nids: &NidDatabase,
    db: &mut dyn AnalysisDatabase,
) -> (Option<ProcessParam>, WalkStats) {
    let mut param = None;
    let mut stats = WalkStats::default();

    for phdr in image.segments() {
        let addr = phdr.p_vaddr as u32;
        match phdr.p_type {
            pt::PROC_PARAM => {
                db.declare_record(addr, process_param::SIZE, layout::PROCESS_PARAM);
                match ProcessParam::read(&*db, addr) {
                    Ok(p) => {
                        info!(
                            "Process param: sdk 0x{:08x}, priority {}, stack 0x{:x}, malloc page 0x{:x}",
                            p.sdk_version, p.primary_prio, p.primary_stacksize, p.malloc_pagesize
                        );
                        param = Some(p);
                    }
                    Err(e) => warn!("Cannot read process param at 0x{:08x}: {}", addr, e),
                }
            }
            pt::PROC_PRX => {
                db.declare_record(addr, process_prx_info::SIZE, layout::PROCESS_PRX_INFO);
                match ProcessPrxInfo::read(&*db, addr) {
                    Ok(prx) => {
                        info!(
                            "Process PRX info: version {}.{}",
                            prx.major_version, prx.minor_version
                        );
                        stats.merge(load_exports(db, nids, prx.libent_start, prx.libent_end));
                        stats.merge(load_imports(db, nids, prx.libstub_start, prx.libstub_end));
                    }
                    Err(e) => warn!("Cannot read process PRX info at 0x{:08x}: {}", addr, e),
                }
            }
            _ => {}
        }
    }

    (param, stats)
}
