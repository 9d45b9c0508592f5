//! End-to-end loads of synthetic PPU images

mod common;

use common::{rela, segment_sym, Bytes, ElfBuilder, SectionSpec, SegmentSpec, SymbolSpec};
use oc_analysis::{AnalysisDatabase, Program, SegmentClass};
use oc_core::error::LoaderError;
use oc_loader::elf::{pf, pt, r_ppc64, shf, shn, STT_FILE, STT_FUNC, STT_OBJECT};
use oc_loader::reloc::apply_segment_relocations;
use oc_loader::segments::map_segments;
use oc_loader::{
    CellLoader, ElfImage, LoadContext, LoadOptions, NidDatabase, RelocAlgorithm,
    RelocationOptions, Variant,
};

const TEXT_SIZE: usize = 0x200;
const DATA_VADDR: u64 = 0x1000;
const DATA_SIZE: usize = 0x200;

fn modern_text() -> Vec<u8> {
    Bytes::zeroed(TEXT_SIZE)
        .u32(0x000, 0x4800_0001) // bl
        .u32(0x020, 0x3C60_0000) // lis r3, 0
        .u32(0x024, 0x3863_0000) // addi r3, r3, 0
        .u32(0x030, 0x3862_0000) // addi r3, r2, 0
        .u32(0x040, 0xE862_0000) // ld r3, 0(r2)
        // _scemoduleinfo
        .u16(0x100, 0x0000)
        .u8(0x102, 1)
        .u8(0x103, 1)
        .str(0x104, "testPrx")
        .u32(0x120, 0x8000)
        .u32(0x124, 0x1000)
        .u32(0x128, 0x101C)
        .u32(0x12C, 0x1040)
        .u32(0x130, 0x106C)
        .u32(0x180, 0x6000_0000)
        .u32(0x1F8, 0xFFFF_FFFF)
        .into_vec()
}

fn modern_data() -> Vec<u8> {
    Bytes::zeroed(DATA_SIZE)
        // _scelibent_ppu32
        .u8(0x000, 28)
        .u16(0x002, 1)
        .u16(0x006, 1)
        .u32(0x010, 0x1100)
        .u32(0x014, 0x1120)
        .u32(0x018, 0x1130)
        // _scelibstub_ppu32
        .u8(0x040, 44)
        .u16(0x042, 1)
        .u16(0x046, 2)
        .u32(0x050, 0x1110)
        .u32(0x054, 0x1140)
        .u32(0x058, 0x1150)
        .str(0x100, "cellTest")
        .str(0x110, "sysPrxForUser")
        .u32(0x120, 0xAAAA_0001)
        .u32(0x130, 0x1160)
        .u32(0x140, 0x1111_1111)
        .u32(0x144, 0x9999_9999)
        .u32(0x150, 0x190)
        .u32(0x154, 0x1A0)
        // OPD: body, toc
        .u32(0x160, 0x180)
        .u32(0x164, 0x8000)
        .into_vec()
}

fn modern_relocations() -> Vec<oc_loader::Elf64Rela> {
    vec![
        rela(0x00, segment_sym(0, 0), r_ppc64::REL24, 0x40),
        rela(0x10, segment_sym(0, 1), r_ppc64::ADDR32, 0x180),
        rela(0x22, segment_sym(0, 1), r_ppc64::ADDR16_HA, 0x9000),
        rela(0x26, segment_sym(0, 1), r_ppc64::ADDR16_LO, 0x9000),
        rela(0x32, segment_sym(0, 1), r_ppc64::TOC16, 0x180),
        rela(0x42, segment_sym(0, 1), r_ppc64::TOC16_DS, 0x190),
        rela(0x00, 0, r_ppc64::NONE, 0),
        rela(0x50, segment_sym(0, 1), 5, 0),
        rela(0x60, segment_sym(7, 0), r_ppc64::ADDR32, 0),
        rela(0x1F0, segment_sym(1, 1), r_ppc64::TLSGD, 0),
        rela(0x1F8, segment_sym(0, 0xFF), r_ppc64::ADDR32, 0x1234),
    ]
}

fn modern_prx() -> ElfBuilder {
    ElfBuilder::prx()
        .segment(SegmentSpec::load(0, pf::R | pf::X, modern_text()).with_paddr_delta(0x100))
        .segment(SegmentSpec::load(DATA_VADDR, pf::R | pf::W, modern_data()))
        .segment(SegmentSpec::relocations(&modern_relocations()))
}

fn nids() -> NidDatabase {
    let mut db = NidDatabase::new();
    db.insert("cellTest", 0xAAAA_0001, "cellTestInit");
    db.insert("sysPrxForUser", 0x1111_1111, "sys_lwmutex_lock");
    db.insert("cellSysutil", 0x0BAE_8772, "cellSysutilCheckCallback");
    db
}

fn load(bytes: Vec<u8>, nids: &NidDatabase, options: LoadOptions) -> (Program, oc_loader::LoadReport) {
    let image = ElfImage::parse(bytes).unwrap();
    let mut program = Program::new();
    let report = CellLoader::new(&image, nids, options)
        .apply(&mut program)
        .unwrap();
    (program, report)
}

#[test]
fn test_modern_prx_relocations() {
    let (program, report) = load(modern_prx().build(), &nids(), LoadOptions::default());

    assert_eq!(report.variant, Variant::ModernPrx);
    assert_eq!(report.regions, 2);
    assert_eq!(report.relocations.algorithm, Some(RelocAlgorithm::Segment));
    assert_eq!(report.relocations.applied, 8);
    assert_eq!(report.relocations.skipped, 2);

    assert_eq!(program.read_u32(0x00).unwrap(), 0x4800_0041);
    assert_eq!(program.read_u32(0x10).unwrap(), 0x0000_1180);
    assert_eq!(program.read_u32(0x20).unwrap(), 0x3C60_0001);
    assert_eq!(program.read_u32(0x24).unwrap(), 0x3863_A000);
    assert_eq!(program.read_u32(0x30).unwrap(), 0x3862_9180);
    assert_eq!(program.read_u32(0x40).unwrap(), 0xE862_9190);
    assert_eq!(program.read_u32(0x11F0).unwrap(), 0x8000);
    // Sentinel symbol segment resolves to address zero
    assert_eq!(program.read_u32(0x1F8).unwrap(), 0);
    // Unsupported type left the word alone
    assert_eq!(program.read_u32(0x50).unwrap(), 0);
}

#[test]
fn test_modern_prx_module_info_and_tables() {
    let (program, report) = load(modern_prx().build(), &nids(), LoadOptions::default());

    assert_eq!(report.gp, 0x8000);
    assert_eq!(program.toc(), Some(0x8000));

    let module = report.module.expect("module info");
    assert_eq!(module.name, "testPrx");
    assert_eq!(module.addr, 0x100);
    assert_eq!(program.record_at(0x100).map(|r| r.type_name.as_str()), Some("_scemoduleinfo"));
    assert_eq!(program.entry_points().len(), 1);
    assert_eq!(program.entry_points()[0].name, "module_info");
    assert!(!program.entry_points()[0].primary);

    assert_eq!(report.libraries.libraries, 2);
    assert_eq!(report.libraries.resolved, 2);
    assert_eq!(report.libraries.unresolved, 1);

    // Exports
    assert_eq!(program.name_at(0xFFC), Some("__begin_of_section_lib_ent"));
    assert_eq!(program.name_at(0x101C), Some("__end_of_section_lib_ent"));
    assert_eq!(program.name_at(0x1100), Some("_cellTest_str"));
    assert_eq!(program.name_at(0x1120), Some("__cellTest_Functions_NID_table"));
    assert_eq!(program.name_at(0x1130), Some("__cellTest_Functions_table"));
    assert_eq!(program.name_at(0x1160), Some("cellTestInit"));
    assert_eq!(program.name_at(0x180), Some(".cellTestInit"));
    assert!(program.is_code(0x180));

    // Imports
    assert_eq!(program.name_at(0x103C), Some("__begin_of_section_lib_stub"));
    assert_eq!(program.name_at(0x106C), Some("__end_of_section_lib_stub"));
    assert_eq!(program.name_at(0x1040), Some("_sysPrxForUser_0001_stub_head"));
    assert_eq!(program.name_at(0x1110), Some("_sysPrxForUser_stub_str"));
    assert_eq!(program.name_at(0x110C), Some("_sce_package_version_sysPrxForUser"));
    assert_eq!(program.name_at(0x1150), Some("sys_lwmutex_lock.stub_entry"));
    assert_eq!(program.name_at(0x190), Some(".sys_lwmutex_lock"));
    assert_eq!(program.annotations_at(0x1140), ["sys_lwmutex_lock"]);

    // The second import has no name in the database
    assert_eq!(program.name_at(0x1154), None);
    assert_eq!(program.name_at(0x1A0), None);
    assert_eq!(program.record_at(0x1144).map(|r| r.size), Some(4));
    assert_eq!(program.record_at(0x1154).map(|r| r.size), Some(4));

    assert_eq!(program.imports().len(), 1);
    assert_eq!(program.imports()[0].library, "sysPrxForUser");
    assert_eq!(program.imports()[0].addr, 0x190);
    assert_eq!(program.imports()[0].name, ".sys_lwmutex_lock");
}

#[test]
fn test_unresolved_import_declares_slots_only() {
    let (program, report) = load(modern_prx().build(), &NidDatabase::new(), LoadOptions::default());

    assert_eq!(report.libraries.resolved, 0);
    assert_eq!(report.libraries.unresolved, 3);
    assert!(program.imports().is_empty());

    for slot in [0x1140, 0x1144, 0x1150, 0x1154] {
        assert_eq!(program.record_at(slot).map(|r| r.type_name.as_str()), Some("dword"));
        assert!(program.annotations_at(slot).is_empty());
    }
    assert_eq!(program.name_at(0x1150), None);
    assert_eq!(program.name_at(0x190), None);

    // Export bodies are still queued as code
    assert!(program.is_code(0x180));
    assert_eq!(program.name_at(0x180), None);
}

#[test]
fn test_symbols_override_walker_names() {
    let bytes = modern_prx()
        .section(SectionSpec::progbits(".text", 0, shf::ALLOC | shf::EXECINSTR, modern_text()))
        .section(SectionSpec::progbits(".data", DATA_VADDR, shf::ALLOC | shf::WRITE, modern_data()))
        .symbol(SymbolSpec::new("cell_test_init_impl", STT_FUNC, 1, 0x180))
        .symbol(SymbolSpec::new("opd_cell_test_init", STT_OBJECT, 2, 0x160))
        .symbol(SymbolSpec::new("test.c", STT_FILE, 1, 0))
        .symbol(SymbolSpec::new("absolute", STT_OBJECT, shn::ABS, 0x40))
        // Section 3 is .symtab, which is not allocatable
        .symbol(SymbolSpec::new("not_loaded", STT_OBJECT, 3, 0x8))
        .build();

    let (program, report) = load(bytes, &nids(), LoadOptions::default());

    assert_eq!(report.symbols_applied, 3);
    assert_eq!(program.name_at(0x180), Some("cell_test_init_impl"));
    assert_eq!(program.name_at(0x1160), Some("opd_cell_test_init"));
    assert_eq!(program.annotations_at(0), ["Source File: test.c"]);
    assert_eq!(program.address_of("absolute"), None);
    assert_eq!(program.address_of("not_loaded"), None);
    assert!(program.is_code(0x180));

    // Sections took precedence over program headers
    assert_eq!(program.regions().len(), 2);
    assert_eq!(program.regions()[0].name.as_deref(), Some(".text"));
    assert_eq!(program.regions()[0].class, SegmentClass::Code);
}

#[test]
fn test_mapping_honours_relocation_base() {
    for base in [0u32, 0x1_0000, 0x1000_0000] {
        let text = Bytes::zeroed(0x40).into_vec();
        let data = Bytes::zeroed(0x40).into_vec();
        let bytes = ElfBuilder::prx()
            .segment(SegmentSpec::load(0, pf::R | pf::X, text))
            .segment(SegmentSpec::load(DATA_VADDR, pf::R | pf::W, data))
            .segment(SegmentSpec::relocations(&[rela(
                0x10,
                segment_sym(0, 1),
                r_ppc64::ADDR32,
                0x20,
            )]))
            .build();

        let options = LoadOptions {
            relocation_base: base,
            ..Default::default()
        };
        let (program, report) = load(bytes, &NidDatabase::new(), options);

        assert_eq!(report.relocation_base, base);
        let regions = program.regions();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].start, base);
        assert_eq!(regions[0].end(), base as u64 + 0x40);
        assert_eq!(regions[1].start, DATA_VADDR as u32 + base);
        assert_eq!(regions[1].end(), regions[1].start as u64 + 0x40);

        assert_eq!(program.read_u32(base + 0x10).unwrap(), base + 0x1020);
    }
}

#[test]
fn test_toc16_segment_relocation() {
    let bytes = ElfBuilder::prx()
        .segment(SegmentSpec::load(0x100, pf::R | pf::W, Bytes::zeroed(0x20).u32(0, 0x3862_0000).into_vec()))
        .segment(SegmentSpec::load(0x200, pf::R | pf::W, Bytes::zeroed(0x20).into_vec()))
        .segment(SegmentSpec::relocations(&[rela(
            0x2,
            segment_sym(0, 1),
            r_ppc64::TOC16,
            0x10,
        )]))
        .build();
    let image = ElfImage::parse(bytes).unwrap();
    let mut program = Program::new();
    let ctx = LoadContext {
        relocation_base: 0,
        gp: 0x50,
    };

    map_segments(&image, &ctx, &mut program).unwrap();
    let stats = apply_segment_relocations(&image, &ctx, &RelocationOptions::default(), &mut program);

    assert_eq!(stats.applied, 1);
    assert_eq!(program.read_u16(0x102).unwrap(), 0x01C0);
    assert_eq!(program.read_u16(0x100).unwrap(), 0x3862);
}

#[test]
fn test_modern_prx_gp_is_rebased_for_toc_relocations() {
    let base = 0x1_2340;
    let text = Bytes::zeroed(0x200)
        .u32(0x030, 0x3862_0000) // addi r3, r2, 0
        .u8(0x102, 1)
        .str(0x104, "gpPrx")
        .u32(0x120, 0x8000)
        .into_vec();
    let bytes = ElfBuilder::prx()
        .segment(SegmentSpec::load(0, pf::R | pf::X, text).with_paddr_delta(0x100))
        .segment(SegmentSpec::relocations(&[
            rela(0x120, segment_sym(0, 0), r_ppc64::ADDR32, 0x8000),
            rela(0x32, segment_sym(0, 0), r_ppc64::TOC16, 0x8010),
        ]))
        .build();

    let options = LoadOptions {
        relocation_base: base,
        ..Default::default()
    };
    let (program, report) = load(bytes, &NidDatabase::new(), options);

    assert_eq!(report.relocations.applied, 2);
    assert_eq!(report.gp, base + 0x8000);
    assert_eq!(program.toc(), Some(base + 0x8000));
    assert_eq!(program.read_u32(base + 0x120).unwrap(), base + 0x8000);
    // target - gp, independent of the base
    assert_eq!(program.read_u16(base + 0x32).unwrap(), 0x0010);
    assert_eq!(report.module.map(|m| m.name), Some("gpPrx".to_string()));
}

#[test]
fn test_prx_without_program_headers_has_no_module_info() {
    let bytes = ElfBuilder::prx()
        .section(SectionSpec::progbits(
            ".text",
            0,
            shf::ALLOC | shf::EXECINSTR,
            Bytes::zeroed(0x40).u32(0, 0x4E80_0020).into_vec(),
        ))
        .build();

    let (program, report) = load(bytes, &NidDatabase::new(), LoadOptions::default());

    assert_eq!(report.variant, Variant::ModernPrx);
    assert_eq!(report.regions, 1);
    assert_eq!(report.gp, 0);
    assert!(report.module.is_none());
    assert!(program.entry_points().is_empty());
    assert_eq!(program.read_u32(0).unwrap(), 0x4E80_0020);
}

#[test]
fn test_extra_relocation_segments_follow_limit() {
    let build = || {
        ElfBuilder::prx()
            .segment(SegmentSpec::load(0, pf::R | pf::W, Bytes::zeroed(0x20).into_vec()))
            .segment(SegmentSpec::relocations(&[rela(0x0, segment_sym(0, 0), r_ppc64::ADDR32, 0x11)]))
            .segment(SegmentSpec::relocations(&[rela(0x4, segment_sym(0, 0), r_ppc64::ADDR32, 0x22)]))
            .build()
    };

    let (program, report) = load(build(), &NidDatabase::new(), LoadOptions::default());
    assert_eq!(report.relocations.blocks, 1);
    assert_eq!(program.read_u32(0x0).unwrap(), 0x11);
    assert_eq!(program.read_u32(0x4).unwrap(), 0);

    let options = LoadOptions {
        relocation: RelocationOptions { max_segments: 2 },
        ..Default::default()
    };
    let (program, report) = load(build(), &NidDatabase::new(), options);
    assert_eq!(report.relocations.blocks, 2);
    assert_eq!(program.read_u32(0x4).unwrap(), 0x22);
}

fn legacy_text() -> Vec<u8> {
    Bytes::zeroed(0x100)
        .u32(0x00, 0x3862_0000) // addi r3, r2, 0
        .u32(0x10, 0x4800_0001) // bl
        .u32(0x20, 0xFFFF_FFFF)
        .u32(0x30, 0xE862_0001) // ldu r3, 0(r2)
        .into_vec()
}

#[test]
fn test_legacy_prx_uses_section_relocations() {
    let base = 0x1_0000u32;
    let text_relocs = [
        rela(0x02, 1, r_ppc64::TOC16, 0x10),
        rela(0x08, 2, r_ppc64::ADDR32, 4),
        rela(0x10, 3, r_ppc64::REL24, 0),
        rela(0x32, 1, r_ppc64::TOC16_DS, 0x8),
        rela(0x0C, 99, r_ppc64::ADDR32, 0),
        rela(0x0C, 1, 200, 0),
    ];
    let debug_relocs = [rela(0x0, 2, r_ppc64::ADDR32, 0)];

    let bytes = ElfBuilder::prx()
        .segment(SegmentSpec::load(0, pf::R | pf::X, legacy_text()).with_paddr_delta(0x80))
        .segment(SegmentSpec::load(0x800, pf::R | pf::W, Bytes::zeroed(0x40).into_vec()))
        .segment(SegmentSpec::raw(pt::SCE_SEGSYM, Vec::new()))
        .segment(SegmentSpec::relocations(&[rela(0x20, segment_sym(0, 0), r_ppc64::ADDR32, 0x5555)]))
        .section(SectionSpec::progbits(".text", 0, shf::ALLOC | shf::EXECINSTR, legacy_text()))
        .section(SectionSpec::progbits(".toc", 0x800, shf::ALLOC | shf::WRITE, Bytes::zeroed(0x40).into_vec()))
        .section(SectionSpec::rela(".rela.text", 1, &text_relocs))
        .section(SectionSpec::rela(".rela.debug_info", 5, &debug_relocs))
        .section(SectionSpec::progbits(".debug_info", 0, 0, Bytes::zeroed(0x10).into_vec()))
        .symbol(SymbolSpec::new("toc_entry", STT_OBJECT, 2, 0x10))
        .symbol(SymbolSpec::new("abs_value", STT_OBJECT, shn::ABS, 0x1234))
        .symbol(SymbolSpec::new("text_fn", STT_FUNC, 1, 0x40))
        .build();

    let options = LoadOptions {
        relocation_base: base,
        ..Default::default()
    };
    let (program, report) = load(bytes, &NidDatabase::new(), options);

    assert_eq!(report.variant, Variant::LegacyPrx);
    assert_eq!(report.relocations.algorithm, Some(RelocAlgorithm::Section));
    assert_eq!(report.relocations.blocks, 1);
    assert_eq!(report.relocations.applied, 4);
    assert_eq!(report.relocations.skipped, 2);
    assert_eq!(report.gp, base + 0x800);

    // S = .toc + 0x10 + 0x10, gp = .toc
    assert_eq!(program.read_u32(base).unwrap(), 0x3862_0020);
    // Absolute symbols contribute their value once
    assert_eq!(program.read_u32(base + 0x08).unwrap(), base + 0x1238);
    assert_eq!(program.read_u32(base + 0x10).unwrap(), 0x4800_0031);
    assert_eq!(program.read_u32(base + 0x30).unwrap(), 0xE862_0019);
    // The segment relocation block is ignored for legacy images
    assert_eq!(program.read_u32(base + 0x20).unwrap(), 0xFFFF_FFFF);

    assert_eq!(report.symbols_applied, 2);
    assert_eq!(program.name_at(base + 0x40), Some("text_fn"));
    assert!(program.is_code(base + 0x40));
    assert_eq!(program.name_at(base + 0x810), Some("toc_entry"));
    assert_eq!(program.address_of("abs_value"), None);
}

#[test]
fn test_legacy_prx_without_toc_section() {
    let bytes = ElfBuilder::prx()
        .segment(SegmentSpec::load(0, pf::R | pf::X, legacy_text()).with_paddr_delta(0x80))
        .segment(SegmentSpec::raw(pt::SCE_SEGSYM, Vec::new()))
        .section(SectionSpec::progbits(".text", 0, shf::ALLOC | shf::EXECINSTR, legacy_text()))
        .section(SectionSpec::rela(".rela.text", 1, &[rela(0x02, 0, r_ppc64::TOC16, 0x30)]))
        .symbol(SymbolSpec::new("entry", STT_FUNC, 1, 0))
        .build();

    let (program, report) = load(bytes, &NidDatabase::new(), LoadOptions::default());

    assert_eq!(report.variant, Variant::LegacyPrx);
    assert_eq!(report.gp, 0);
    // Symbol 0 is the null symbol in section 0: S = 0x30, gp = 0
    assert_eq!(program.read_u32(0).unwrap(), 0x3862_0030);
}

#[test]
fn test_executable_load() {
    let entry = 0x1_0000u64;
    let text = Bytes::zeroed(0x100)
        .u32(0x00, 0x4800_0011)
        .u32(0x04, 0x0000_4321)
        .into_vec();

    let param = Bytes::zeroed(0x24)
        .u32(0x00, 0x24)
        .u32(0x04, 0x13BC_C5F6)
        .u32(0x08, 0x0033_0000)
        .u32(0x0C, 0x0036_0001)
        .u32(0x10, 1001)
        .u32(0x14, 0x1_0000)
        .u32(0x18, 0x10_0000)
        .into_vec();

    let mut data = Bytes::zeroed(0x200)
        // sys_process_prx_info_t
        .u32(0x40, 0x28)
        .u32(0x44, 0x1B43_4CEC)
        .u32(0x50, 0x2_0100)
        .u32(0x54, 0x2_0100)
        .u32(0x58, 0x2_0100)
        .u32(0x5C, 0x2_012C)
        .u8(0x60, 1)
        // _scelibstub_ppu32
        .u8(0x100, 44)
        .u16(0x106, 1)
        .u32(0x110, 0x2_0180)
        .u32(0x114, 0x2_0190)
        .u32(0x118, 0x2_01A0)
        .str(0x180, "cellSysutil")
        .u32(0x190, 0x0BAE_8772)
        .u32(0x1A0, 0x1_0080);
    data.0[..param.len()].copy_from_slice(&param);

    let bytes = ElfBuilder::exec(entry)
        .segment(SegmentSpec::load(entry, pf::R | pf::X, text))
        .segment(SegmentSpec::load(0x2_0000, pf::R | pf::W, data.clone().into_vec()))
        .segment(SegmentSpec::raw(pt::PROC_PARAM, param).with_vaddr(0x2_0000))
        .segment(SegmentSpec::raw(pt::PROC_PRX, data.0[0x40..0x68].to_vec()).with_vaddr(0x2_0040))
        .build();

    let image = ElfImage::parse(bytes).unwrap();
    let nids = nids();
    let options = LoadOptions {
        relocation_base: 0x1000_0000,
        ..Default::default()
    };
    let loader = CellLoader::new(&image, &nids, options);
    assert_eq!(loader.variant(), Variant::Executable);
    assert_eq!(loader.relocation_base(), 0);

    let mut program = Program::new();
    let report = loader.apply(&mut program).unwrap();

    assert_eq!(report.gp, 0x4321);
    assert_eq!(program.toc(), Some(0x4321));
    assert_eq!(report.relocations.algorithm, None);
    assert_eq!(program.regions()[0].start, 0x1_0000);

    let start = &program.entry_points()[0];
    assert_eq!((start.addr, start.name.as_str(), start.primary), (0x1_0000, "_start", true));

    let param = report.process_param.expect("process param");
    assert_eq!(param.primary_prio, 1001);
    assert_eq!(param.primary_stacksize, 0x1_0000);
    assert_eq!(param.malloc_pagesize, 0x10_0000);
    assert_eq!(
        program.record_at(0x2_0000).map(|r| r.type_name.as_str()),
        Some("sys_process_param_t")
    );
    assert_eq!(
        program.record_at(0x2_0040).map(|r| r.type_name.as_str()),
        Some("sys_process_prx_info_t")
    );

    assert_eq!(program.name_at(0x2_01A0), Some("cellSysutilCheckCallback.stub_entry"));
    assert_eq!(program.name_at(0x1_0080), Some(".cellSysutilCheckCallback"));
    assert_eq!(program.imports().len(), 1);
    assert_eq!(program.imports()[0].library, "cellSysutil");
}

#[test]
fn test_image_without_segments_is_fatal() {
    let image = ElfImage::parse(ElfBuilder::prx().build()).unwrap();
    let nids = NidDatabase::new();
    let mut program = Program::new();

    let result = CellLoader::new(&image, &nids, LoadOptions::default()).apply(&mut program);
    assert!(matches!(result, Err(LoaderError::NoSegments)));
    // Structures were declared before the failure
    assert!(program.record_type("_scemoduleinfo").is_some());
    assert!(program.regions().is_empty());
}

#[test]
fn test_section_mapping_classes() {
    let bytes = ElfBuilder::prx()
        .segment(SegmentSpec::load(0, pf::R | pf::X, Bytes::zeroed(0x100).into_vec()))
        .section(SectionSpec::progbits(
            ".text",
            0,
            shf::ALLOC | shf::EXECINSTR,
            Bytes::zeroed(0x40).u32(0, 0x4E80_0020).into_vec(),
        ))
        .section(SectionSpec::nobits(".bss", 0x40, 0x20))
        .section(SectionSpec::progbits(".comment", 0, 0, b"GCC".to_vec()))
        .build();

    let image = ElfImage::parse(bytes).unwrap();
    let mut program = Program::new();
    let regions = map_segments(&image, &LoadContext::new(0x2000), &mut program).unwrap();

    assert_eq!(regions, 2);
    let mapped = program.regions();
    assert_eq!((mapped[0].start, mapped[0].class), (0x2000, SegmentClass::Code));
    assert_eq!((mapped[1].start, mapped[1].size, mapped[1].class), (0x2040, 0x20, SegmentClass::Bss));
    assert_eq!(mapped[1].selector, 1);
    assert_eq!(program.read_u32(0x2000).unwrap(), 0x4E80_0020);
    assert_eq!(program.read_u32(0x2040).unwrap(), 0);
    // Covered by the program header but not by any section
    assert!(program.read_u32(0x2080).is_err());
}
