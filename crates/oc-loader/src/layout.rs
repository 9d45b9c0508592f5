//! Layouts of the PPU loader structures
//!
//! All structures are big-endian with 32-bit pointers. The same layouts are
//! handed to the analysis database as record types by [`record_types`].

use oc_analysis::{RecordMember, RecordType};

pub const DWORD: &str = "dword";
pub const MODULE_INFO: &str = "_scemoduleinfo";
pub const LIBENT: &str = "_scelibent_ppu32";
pub const LIBSTUB: &str = "_scelibstub_ppu32";
pub const PROCESS_PARAM: &str = "sys_process_param_t";
pub const PROCESS_PRX_INFO: &str = "sys_process_prx_info_t";

/// `_scemoduleinfo`
pub mod module_info {
    pub const ATTRIBUTE: u32 = 0;
    pub const VERSION: u32 = 2;
    pub const NAME: u32 = 4;
    pub const NAME_LEN: u32 = 27;
    pub const TERMINAL: u32 = 31;
    pub const GP_VALUE: u32 = 32;
    pub const ENT_TOP: u32 = 36;
    pub const ENT_END: u32 = 40;
    pub const STUB_TOP: u32 = 44;
    pub const STUB_END: u32 = 48;
    pub const SIZE: u32 = 52;
}

/// Fields shared by the export and import records
pub mod lib_common {
    pub const STRUCTSIZE: u32 = 0;
    pub const VERSION: u32 = 2;
    pub const ATTRIBUTE: u32 = 4;
    pub const NFUNC: u32 = 6;
    pub const NVAR: u32 = 8;
    pub const NTLSVAR: u32 = 10;
}

/// `_scelibent_ppu32`
pub mod libent {
    pub const HASHINFO: u32 = 12;
    pub const HASHINFOTLS: u32 = 13;
    pub const NIDALTSETS: u32 = 15;
    pub const LIBNAME: u32 = 16;
    pub const NIDTABLE: u32 = 20;
    pub const ADDTABLE: u32 = 24;
    pub const SIZE: u8 = 28;
}

/// `_scelibstub_ppu32`
pub mod libstub {
    pub const LIBNAME: u32 = 16;
    pub const FUNC_NIDTABLE: u32 = 20;
    pub const FUNC_TABLE: u32 = 24;
    pub const VAR_NIDTABLE: u32 = 28;
    pub const VAR_TABLE: u32 = 32;
    pub const TLS_NIDTABLE: u32 = 36;
    pub const TLS_TABLE: u32 = 40;
    pub const SIZE: u8 = 44;
}

/// `sys_process_param_t`
pub mod process_param {
    pub const SIZE_FIELD: u32 = 0;
    pub const MAGIC: u32 = 4;
    pub const VERSION: u32 = 8;
    pub const SDK_VERSION: u32 = 12;
    pub const PRIMARY_PRIO: u32 = 16;
    pub const PRIMARY_STACKSIZE: u32 = 20;
    pub const MALLOC_PAGESIZE: u32 = 24;
    pub const PPC_SEG: u32 = 28;
    pub const CRASH_DUMP_PARAM_ADDR: u32 = 32;
    pub const SIZE: u32 = 36;
}

/// `sys_process_prx_info_t`
pub mod process_prx_info {
    pub const SIZE_FIELD: u32 = 0;
    pub const MAGIC: u32 = 4;
    pub const VERSION: u32 = 8;
    pub const SDK_VERSION: u32 = 12;
    pub const LIBENT_START: u32 = 16;
    pub const LIBENT_END: u32 = 20;
    pub const LIBSTUB_START: u32 = 24;
    pub const LIBSTUB_END: u32 = 28;
    pub const MAJOR_VERSION: u32 = 32;
    pub const MINOR_VERSION: u32 = 33;
    pub const SIZE: u32 = 40;
}

fn field(name: &'static str, offset: u32, size: u32) -> RecordMember {
    RecordMember {
        name,
        offset,
        size,
        is_pointer: false,
    }
}

fn pointer(name: &'static str, offset: u32) -> RecordMember {
    RecordMember {
        name,
        offset,
        size: 4,
        is_pointer: true,
    }
}

fn lib_header(members: &mut Vec<RecordMember>) {
    members.extend([
        field("structsize", lib_common::STRUCTSIZE, 1),
        field("reserved1", 1, 1),
        field("version", lib_common::VERSION, 2),
        field("attribute", lib_common::ATTRIBUTE, 2),
        field("nfunc", lib_common::NFUNC, 2),
        field("nvar", lib_common::NVAR, 2),
        field("ntlsvar", lib_common::NTLSVAR, 2),
    ]);
}

/// Every structure the loader declares, `dword` first
pub fn record_types() -> Vec<RecordType> {
    let dword = RecordType {
        name: DWORD,
        members: vec![field("value", 0, 4)],
    };

    let module_info = RecordType {
        name: MODULE_INFO,
        members: vec![
            field("modattribute", module_info::ATTRIBUTE, 2),
            field("modversion", module_info::VERSION, 2),
            field("modname", module_info::NAME, module_info::NAME_LEN),
            field("terminal", module_info::TERMINAL, 1),
            pointer("gp_value", module_info::GP_VALUE),
            pointer("ent_top", module_info::ENT_TOP),
            pointer("ent_end", module_info::ENT_END),
            pointer("stub_top", module_info::STUB_TOP),
            pointer("stub_end", module_info::STUB_END),
        ],
    };

    let mut ent_members = Vec::new();
    lib_header(&mut ent_members);
    ent_members.extend([
        field("hashinfo", libent::HASHINFO, 1),
        field("hashinfotls", libent::HASHINFOTLS, 1),
        field("reserved2", 14, 1),
        field("nidaltsets", libent::NIDALTSETS, 1),
        pointer("libname", libent::LIBNAME),
        pointer("nidtable", libent::NIDTABLE),
        pointer("addtable", libent::ADDTABLE),
    ]);
    let libent = RecordType {
        name: LIBENT,
        members: ent_members,
    };

    let mut stub_members = Vec::new();
    lib_header(&mut stub_members);
    stub_members.extend([
        field("reserved2", 12, 4),
        pointer("libname", libstub::LIBNAME),
        pointer("func_nidtable", libstub::FUNC_NIDTABLE),
        pointer("func_table", libstub::FUNC_TABLE),
        pointer("var_nidtable", libstub::VAR_NIDTABLE),
        pointer("var_table", libstub::VAR_TABLE),
        pointer("tls_nidtable", libstub::TLS_NIDTABLE),
        pointer("tls_table", libstub::TLS_TABLE),
    ]);
    let libstub = RecordType {
        name: LIBSTUB,
        members: stub_members,
    };

    let process_param = RecordType {
        name: PROCESS_PARAM,
        members: vec![
            field("size", process_param::SIZE_FIELD, 4),
            field("magic", process_param::MAGIC, 4),
            field("version", process_param::VERSION, 4),
            field("sdk_version", process_param::SDK_VERSION, 4),
            field("primary_prio", process_param::PRIMARY_PRIO, 4),
            field("primary_stacksize", process_param::PRIMARY_STACKSIZE, 4),
            field("malloc_pagesize", process_param::MALLOC_PAGESIZE, 4),
            field("ppc_seg", process_param::PPC_SEG, 4),
            pointer("crash_dump_param_addr", process_param::CRASH_DUMP_PARAM_ADDR),
        ],
    };

    let process_prx_info = RecordType {
        name: PROCESS_PRX_INFO,
        members: vec![
            field("size", process_prx_info::SIZE_FIELD, 4),
            field("magic", process_prx_info::MAGIC, 4),
            field("version", process_prx_info::VERSION, 4),
            field("sdk_version", process_prx_info::SDK_VERSION, 4),
            pointer("libent_start", process_prx_info::LIBENT_START),
            pointer("libent_end", process_prx_info::LIBENT_END),
            pointer("libstub_start", process_prx_info::LIBSTUB_START),
            pointer("libstub_end", process_prx_info::LIBSTUB_END),
            field("major_version", process_prx_info::MAJOR_VERSION, 1),
            field("minor_version", process_prx_info::MINOR_VERSION, 1),
            field("reserved", 34, 6),
        ],
    };

    vec![dword, module_info, libent, libstub, process_param, process_prx_info]
}
