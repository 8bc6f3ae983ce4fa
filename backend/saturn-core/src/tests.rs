use crate::api::{Saturn, SaturnError};
use crate::bus::pages::Handler;
use crate::memory::BIOS_LEN;
use crate::savestate::SaveStateError;
use crate::sound::NullSound;
use crate::video::NullVideo;
use saturn_config::{SaturnConfig, Sh2CoreKind};
use sh2_emu::WhichCpu;
use sh2_emu::debug::{BreakpointHit, MemoryAccessFlags};
use std::cell::RefCell;
use std::rc::Rc;
use test_log::test;

const SMPC_COMREG: u32 = 0x2010001F;
const SMPC_SSHON: u8 = 0x02;
const SMPC_SSHOFF: u8 = 0x03;

fn new_saturn(bios: &[u8], sh2_core: Sh2CoreKind) -> Saturn {
    let config = SaturnConfig { sh2_core, ..SaturnConfig::default() };
    Saturn::init(bios, config, Box::new(NullVideo), Box::new(NullSound)).unwrap()
}

fn dummy_saturn() -> Saturn {
    new_saturn(&vec![0; BIOS_LEN], Sh2CoreKind::Dummy)
}

// Reset vector points at $100, followed by nothing but NOPs
fn nop_bios() -> Vec<u8> {
    let mut bios = vec![0; BIOS_LEN];
    bios[0..4].copy_from_slice(&0x0000_0100_u32.to_be_bytes());
    bios[4..8].copy_from_slice(&0x0600_4000_u32.to_be_bytes());
    for word in bios[0x100..].chunks_exact_mut(2) {
        word.copy_from_slice(&0x0009_u16.to_be_bytes());
    }
    bios
}

#[test]
fn init_rejects_bad_bios_sizes() {
    for len in [0, BIOS_LEN + 1] {
        let result = Saturn::init(
            &vec![0; len],
            SaturnConfig::default(),
            Box::new(NullVideo),
            Box::new(NullSound),
        );
        assert!(matches!(result, Err(SaturnError::BiosSize(size)) if size == len));
    }
}

#[test]
fn power_on_state() {
    let saturn = dummy_saturn();

    let master = saturn.master();
    assert_eq!(master.sr(), 0xF0);
    assert!((0..16).all(|register| master.gpr(register) == 0));
    assert!(!saturn.slave_running());
    assert_eq!(saturn.line(), 0);
}

#[test]
fn reset_vector_is_loaded_from_bios() {
    let saturn = new_saturn(&nop_bios(), Sh2CoreKind::Interpreter);
    assert_eq!(saturn.master().pc(), 0x100);
    assert_eq!(saturn.master().gpr(15), 0x06004000);
}

#[test]
fn high_wram_access_through_master() {
    let mut saturn = dummy_saturn();

    let before = saturn.master().cycles();
    saturn.write_memory_longword(WhichCpu::Master, 0x06000000, 0x12345678);
    assert_eq!(saturn.master().cycles().wrapping_sub(before), 1);

    let before = saturn.master().cycles();
    assert_eq!(saturn.read_memory_longword(WhichCpu::Master, 0x06000000), 0x12345678);
    assert_eq!(saturn.master().cycles().wrapping_sub(before), 4);

    // Cache-through mirror sees the same RAM
    assert_eq!(saturn.peek_longword(0x26000000), 0x12345678);
}

// Channel 0, both addresses increment, longword units, auto-request
fn run_dma_transfer(saturn: &mut Saturn, source: u32, destination: u32, longwords: u32) {
    let master = WhichCpu::Master;
    saturn.write_memory_longword(master, 0xFFFFFF80, source);
    saturn.write_memory_longword(master, 0xFFFFFF84, destination);
    saturn.write_memory_longword(master, 0xFFFFFF88, longwords);
    saturn.write_memory_longword(master, 0xFFFFFF8C, 0x5A01);
    saturn.write_memory_longword(master, 0xFFFFFFB0, 0x1);

    for _ in 0..100 {
        if saturn.read_memory_longword(master, 0xFFFFFF8C) & 0x2 != 0 {
            break;
        }
        saturn.exec(1000);
    }

    assert_eq!(saturn.read_memory_longword(master, 0xFFFFFF88), 0);
    assert_eq!(saturn.read_memory_longword(master, 0xFFFFFF8C) & 0x2, 0x2);
}

#[test]
fn dma_copies_high_to_low_wram() {
    let mut saturn = dummy_saturn();

    let pattern: Vec<u32> = (0..16).map(|i| 0x01020304_u32.wrapping_mul(i + 1)).collect();
    for (i, &value) in pattern.iter().enumerate() {
        saturn.bus_mut().write_longword(0x06000000 + 4 * i as u32, value, None);
    }

    run_dma_transfer(&mut saturn, 0x06000000, 0x00200000, 0x10);

    for (i, &value) in pattern.iter().enumerate() {
        assert_eq!(saturn.peek_longword(0x00200000 + 4 * i as u32), value, "longword {i}");
    }
}

#[test]
fn dma_from_smpc_page_to_low_wram() {
    let mut saturn = dummy_saturn();
    for i in 0..16 {
        saturn.bus_mut().write_longword(0x00200000 + 4 * i, 0xFFFFFFFF, None);
    }

    let source: Vec<u32> = (0..16).map(|i| saturn.peek_longword(0x00100000 + 4 * i)).collect();
    run_dma_transfer(&mut saturn, 0x00100000, 0x00200000, 0x10);

    for (i, &value) in source.iter().enumerate() {
        assert_eq!(saturn.peek_longword(0x00200000 + 4 * i as u32), value, "longword {i}");
    }
}

#[test]
fn memory_breakpoints_watch_pages() {
    let mut saturn = dummy_saturn();
    let flags = MemoryAccessFlags::LONG_WRITE;

    saturn.add_memory_breakpoint(WhichCpu::Master, 0x06000100, flags).unwrap();
    assert!(matches!(saturn.bus().pages.handler(0x06000100), Handler::Watched(_)));
    assert_eq!(saturn.bus().hooks.hooks().len(), 1);

    saturn.remove_memory_breakpoint(WhichCpu::Master, 0x06000100).unwrap();
    assert!(matches!(saturn.bus().pages.handler(0x06000100), Handler::Direct(_)));
    assert!(saturn.bus().hooks.hooks().is_empty());

    assert!(saturn.remove_memory_breakpoint(WhichCpu::Master, 0x06000100).is_err());
}

#[test]
fn code_breakpoint_invokes_callback() {
    let mut saturn = new_saturn(&nop_bios(), Sh2CoreKind::Interpreter);
    saturn.add_code_breakpoint(WhichCpu::Master, 0x104).unwrap();

    let hits = Rc::new(RefCell::new(Vec::new()));
    let callback_hits = Rc::clone(&hits);
    saturn.set_breakpoint_callback(Some(Box::new(move |saturn, which, hit| {
        assert!(saturn.bus().hooks.in_breakpoint());
        callback_hits.borrow_mut().push((which, hit));
    })));

    saturn.exec(200);

    assert_eq!(*hits.borrow(), vec![(WhichCpu::Master, BreakpointHit::Code { pc: 0x104 })]);
    assert_eq!(saturn.master().pc(), 0x104);
    assert!(!saturn.bus().hooks.in_breakpoint());

    // Execution resumes past the breakpoint
    saturn.exec(200);
    assert!(saturn.master().pc() > 0x104);
}

#[test]
fn smpc_starts_and_stops_slave() {
    let mut saturn = dummy_saturn();

    saturn.bus_mut().write_byte(SMPC_COMREG, SMPC_SSHON, None);
    saturn.exec(100);
    assert!(saturn.slave_running());

    saturn.exec(1000);
    assert!(saturn.slave().cycles() > 0);

    saturn.bus_mut().write_byte(SMPC_COMREG, SMPC_SSHOFF, None);
    saturn.exec(100);
    assert!(!saturn.slave_running());
}

#[test]
fn frame_wraps_line_counter() {
    let mut saturn = dummy_saturn();

    saturn.exec_frame().unwrap();
    assert_eq!(saturn.frame_counter(), 1);
    assert_eq!(saturn.line(), 0);

    saturn.exec_frame().unwrap();
    assert_eq!(saturn.frame_counter(), 2);
}

#[test]
fn soft_reset_keeps_work_ram_and_hard_reset_clears_it() {
    let mut saturn = dummy_saturn();
    saturn.bus_mut().write_longword(0x06000000, 0xDEADBEEF, None);
    saturn.bus_mut().write_longword(0x00200000, 0xCAFEF00D, None);

    saturn.reset();
    assert_eq!(saturn.peek_longword(0x06000000), 0xDEADBEEF);
    assert_eq!(saturn.peek_longword(0x00200000), 0xCAFEF00D);

    saturn.hard_reset();
    assert_eq!(saturn.peek_longword(0x06000000), 0);
    assert_eq!(saturn.peek_longword(0x00200000), 0);
}

#[test]
fn save_state_round_trip() {
    let mut saturn = dummy_saturn();
    saturn.exec_frame().unwrap();
    saturn.bus_mut().write_longword(0x06000010, 0x11223344, None);
    saturn.bus_mut().write_longword(0x00200010, 0x55667788, None);
    let read = MemoryAccessFlags::LONG_READ;
    saturn.add_memory_breakpoint(WhichCpu::Master, 0x06000200, read).unwrap();

    let state = saturn.save_state_buffer().unwrap();

    saturn.bus_mut().write_longword(0x06000010, 0, None);
    saturn.bus_mut().write_longword(0x00200010, 0, None);
    saturn.exec_frame().unwrap();
    saturn.remove_memory_breakpoint(WhichCpu::Master, 0x06000200).unwrap();

    saturn.load_state_buffer(&state).unwrap();

    assert_eq!(saturn.peek_longword(0x06000010), 0x11223344);
    assert_eq!(saturn.peek_longword(0x00200010), 0x55667788);
    assert_eq!(saturn.frame_counter(), 1);
    // Bus hooks are rebuilt from the restored CPU breakpoints
    assert!(matches!(saturn.bus().pages.handler(0x06000200), Handler::Watched(_)));

    assert_eq!(saturn.save_state_buffer().unwrap(), state);
}

#[test]
fn failed_load_leaves_state_untouched() {
    let mut saturn = dummy_saturn();
    saturn.bus_mut().write_longword(0x06000010, 0x11223344, None);

    let mut state = saturn.save_state_buffer().unwrap();
    saturn.bus_mut().write_longword(0x06000010, 0xAABBCCDD, None);

    // Truncate the final chunk
    state.truncate(state.len() - 16);
    let payload_len = (state.len() - 0x14) as u32;
    state[8..12].copy_from_slice(&payload_len.to_le_bytes());

    assert!(matches!(saturn.load_state_buffer(&state), Err(SaturnError::SaveState(_))));
    assert_eq!(saturn.peek_longword(0x06000010), 0xAABBCCDD);

    let result = saturn.load_state_buffer(b"not a save state");
    assert!(matches!(result, Err(SaturnError::SaveState(SaveStateError::NotSaveState))));
}

#[test]
fn backup_ram_survives_reload_and_tracks_writes() {
    let mut saturn = dummy_saturn();
    let mut contents = vec![0; saturn.backup_ram().len()];
    contents[1] = 0x42;
    saturn.load_backup_ram(&contents);
    assert_eq!(saturn.backup_ram()[1], 0x42);
    assert!(!saturn.take_backup_ram_dirty());

    saturn.bus_mut().write_byte(0x00180003, 0x99, None);
    assert!(saturn.take_backup_ram_dirty());
    assert!(!saturn.take_backup_ram_dirty());
}
