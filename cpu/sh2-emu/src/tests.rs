use super::*;
use test_log::test;

const MEMORY_LEN: usize = 0x10000;

struct TestBus {
    memory: Vec<u8>,
    cacheable: bool,
}

impl TestBus {
    fn new() -> Self {
        Self { memory: vec![0; MEMORY_LEN], cacheable: true }
    }

    fn index(address: u32) -> usize {
        (address as usize) & (MEMORY_LEN - 1)
    }

    fn poke_u16(&mut self, address: u32, value: u16) {
        let i = Self::index(address);
        self.memory[i..i + 2].copy_from_slice(&value.to_be_bytes());
    }

    fn poke_u32(&mut self, address: u32, value: u32) {
        let i = Self::index(address);
        self.memory[i..i + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn peek_u32(&self, address: u32) -> u32 {
        let i = Self::index(address);
        u32::from_be_bytes(self.memory[i..i + 4].try_into().unwrap())
    }

    fn load_program(&mut self, address: u32, program: &[u16]) {
        for (i, &opcode) in program.iter().enumerate() {
            self.poke_u16(address + 2 * i as u32, opcode);
        }
    }
}

impl BusInterface for TestBus {
    fn read_byte(&mut self, address: u32, cycles: Option<&mut u32>) -> u8 {
        if let Some(cycles) = cycles {
            *cycles += 1;
        }
        self.memory[Self::index(address)]
    }

    fn read_word(&mut self, address: u32, cycles: Option<&mut u32>) -> u16 {
        if let Some(cycles) = cycles {
            *cycles += 1;
        }
        let i = Self::index(address & !1);
        u16::from_be_bytes([self.memory[i], self.memory[i + 1]])
    }

    fn read_longword(&mut self, address: u32, cycles: Option<&mut u32>) -> u32 {
        if let Some(cycles) = cycles {
            *cycles += 1;
        }
        self.peek_u32(address & !3)
    }

    fn write_byte(&mut self, address: u32, value: u8, _cycles: Option<&mut u32>) {
        self.memory[Self::index(address)] = value;
    }

    fn write_word(&mut self, address: u32, value: u16, _cycles: Option<&mut u32>) {
        self.poke_u16(address & !1, value);
    }

    fn write_longword(&mut self, address: u32, value: u32, _cycles: Option<&mut u32>) {
        self.poke_u32(address & !3, value);
    }

    fn is_cacheable(&self, _address: u32) -> bool {
        self.cacheable
    }
}

const RESET_PC: u32 = 0x1000;
const RESET_SP: u32 = 0xF000;

// BRA to self, NOP
const SPIN: [u16; 2] = [0xAFFE, 0x0009];

fn boot(bus: &mut TestBus) -> Sh2 {
    bus.poke_u32(0, RESET_PC);
    bus.poke_u32(4, RESET_SP);

    let mut cpu = Sh2::new(WhichCpu::Master, Sh2CoreId::Interpreter);
    cpu.power_on_reset(bus);
    cpu
}

#[test]
fn reset_state() {
    let cpu = Sh2::new(WhichCpu::Master, Sh2CoreId::Interpreter);
    assert_eq!(cpu.sr(), 0xF0);
    assert_eq!(cpu.vbr(), 0);
    assert!((0..16).all(|r| cpu.gpr(r) == 0));
    assert!(!cpu.cache_enabled());
    assert!(cpu.debug().code_breakpoints().next().is_none());

    let slave = Sh2::new(WhichCpu::Slave, Sh2CoreId::Interpreter);
    assert_eq!(slave.name(), "SSH2");
    assert_eq!(slave.debug().code_breakpoints().collect::<Vec<_>>(), vec![SLAVE_HANDSHAKE_ADDRESS]);
}

#[test]
fn power_on_reset_loads_vectors() {
    let mut bus = TestBus::new();
    let cpu = boot(&mut bus);
    assert_eq!(cpu.pc(), RESET_PC);
    assert_eq!(cpu.gpr(15), RESET_SP);
}

#[test]
fn executes_straight_line_code() {
    let mut bus = TestBus::new();
    // MOV #5, R1; ADD #3, R1; MOV #-2, R2; ADD R1, R2
    bus.load_program(RESET_PC, &[0xE105, 0x7103, 0xE2FE, 0x321C]);
    bus.load_program(RESET_PC + 8, &SPIN);

    let mut cpu = boot(&mut bus);
    cpu.exec(50, &mut bus);

    assert_eq!(cpu.gpr(1), 8);
    assert_eq!(cpu.gpr(2), 6);
    assert_eq!(cpu.pc() & !2, RESET_PC + 8);
}

#[test]
fn delay_slot_executes_before_branch() {
    let mut bus = TestBus::new();
    // BRA +1 word; MOV #7, R3 (delay slot); MOV #9, R3 (skipped)
    bus.load_program(RESET_PC, &[0xA001, 0xE307, 0xE309]);
    bus.load_program(RESET_PC + 6, &SPIN);

    let mut cpu = boot(&mut bus);
    cpu.exec(20, &mut bus);

    assert_eq!(cpu.gpr(3), 7);
}

#[test]
fn branch_in_delay_slot_is_slot_illegal() {
    let mut bus = TestBus::new();
    // BRA; BRA (illegal in the slot)
    bus.load_program(RESET_PC, &[0xA010, 0xA010]);
    bus.poke_u32(6 * 4, 0x3000);
    bus.load_program(0x3000, &SPIN);

    let mut cpu = boot(&mut bus);
    cpu.exec(30, &mut bus);

    assert_eq!(cpu.pc() & !2, 0x3000);
    // Stacked PC is the address of the first branch
    assert_eq!(bus.peek_u32(RESET_SP - 8), RESET_PC);
}

#[test]
fn interrupt_is_masked_then_accepted() {
    let mut bus = TestBus::new();
    bus.load_program(RESET_PC, &SPIN);
    bus.poke_u32(0x40 * 4, 0x2000);
    bus.load_program(0x2000, &SPIN);

    let mut cpu = boot(&mut bus);
    cpu.send_interrupt(0x40, 5);
    cpu.exec(20, &mut bus);
    assert_eq!(cpu.pc() & !2, RESET_PC, "level 5 should be masked while I=15");

    cpu.set_sr(0);
    cpu.exec(20, &mut bus);
    assert_eq!(cpu.pc() & !2, 0x2000);
    assert_eq!((cpu.sr() >> 4) & 0xF, 5);
    assert_eq!(cpu.gpr(15), RESET_SP - 8);
    assert!(cpu.interrupts().is_empty());
}

#[test]
fn nmi_ignores_mask() {
    let mut bus = TestBus::new();
    bus.load_program(RESET_PC, &SPIN);
    bus.poke_u32(u32::from(NMI_VECTOR) * 4, 0x2400);
    bus.load_program(0x2400, &SPIN);

    let mut cpu = boot(&mut bus);
    cpu.nmi();
    cpu.exec(20, &mut bus);

    assert_eq!(cpu.pc() & !2, 0x2400);
    assert_eq!((cpu.sr() >> 4) & 0xF, 15);
}

#[test]
fn trapa_and_rte_round_trip() {
    let mut bus = TestBus::new();
    // TRAPA #0x20; MOV #1, R2
    bus.load_program(RESET_PC, &[0xC320, 0xE201]);
    bus.load_program(RESET_PC + 4, &SPIN);
    bus.poke_u32(0x20 * 4, 0x3000);
    // MOV #4, R4; RTE; NOP
    bus.load_program(0x3000, &[0xE404, 0x002B, 0x0009]);

    let mut cpu = boot(&mut bus);
    cpu.exec(100, &mut bus);

    assert_eq!(cpu.gpr(4), 4);
    assert_eq!(cpu.gpr(2), 1);
    assert_eq!(cpu.gpr(15), RESET_SP);
    assert_eq!(cpu.sr(), 0xF0);
}

#[test]
fn sleep_waits_for_interrupt() {
    let mut bus = TestBus::new();
    // SLEEP; MOV #1, R5
    bus.load_program(RESET_PC, &[0x001B, 0xE501]);
    bus.load_program(RESET_PC + 4, &SPIN);
    bus.poke_u32(0x41 * 4, 0x2000);
    // RTE; NOP
    bus.load_program(0x2000, &[0x002B, 0x0009]);

    let mut cpu = boot(&mut bus);
    cpu.set_sr(0);
    cpu.exec(100, &mut bus);
    assert_eq!(cpu.pc(), RESET_PC + 2);
    assert_eq!(cpu.gpr(5), 0);

    cpu.send_interrupt(0x41, 3);
    cpu.exec(100, &mut bus);
    assert_eq!(cpu.gpr(5), 1);
}

#[test]
fn code_breakpoint_stops_and_resumes() {
    let mut bus = TestBus::new();
    // MOV #1, R1; MOV #2, R1; MOV #3, R1
    bus.load_program(RESET_PC, &[0xE101, 0xE102, 0xE103]);
    bus.load_program(RESET_PC + 6, &SPIN);

    let mut cpu = boot(&mut bus);
    cpu.add_code_breakpoint(RESET_PC + 4).unwrap();
    cpu.exec(100, &mut bus);

    assert_eq!(cpu.pc(), RESET_PC + 4);
    assert_eq!(cpu.gpr(1), 2);
    assert_eq!(cpu.take_breakpoint_hit(), Some(BreakpointHit::Code { pc: RESET_PC + 4 }));

    cpu.exec(100, &mut bus);
    assert_eq!(cpu.gpr(1), 3);
}

#[test]
fn dummy_core_does_not_execute() {
    let mut bus = TestBus::new();
    bus.load_program(RESET_PC, &[0xE101]);

    bus.poke_u32(0, RESET_PC);
    bus.poke_u32(4, RESET_SP);
    let mut cpu = Sh2::new(WhichCpu::Master, Sh2CoreId::Dummy);
    cpu.power_on_reset(&mut bus);
    cpu.exec(100, &mut bus);

    assert_eq!(cpu.pc(), RESET_PC);
    assert_eq!(cpu.gpr(1), 0);
}

#[test]
fn divu_through_onchip_registers() {
    let mut bus = TestBus::new();
    let mut cpu = boot(&mut bus);

    cpu.write_longword(0xFFFFFF00, 7, &mut bus);
    cpu.write_longword(0xFFFFFF04, 100, &mut bus);
    assert_eq!(cpu.read_longword(0xFFFFFF04, &mut bus), 14);
    assert_eq!(cpu.read_longword(0xFFFFFF10, &mut bus), 2);
}

#[test]
fn dma_auto_request_transfer() {
    let mut bus = TestBus::new();
    let mut cpu = boot(&mut bus);
    for i in 0..4 {
        bus.poke_u32(0x06008000 + 4 * i, 0x11111111 * (i + 1));
    }

    cpu.write_longword(0xFFFFFF80, 0x06008000, &mut bus);
    cpu.write_longword(0xFFFFFF84, 0x06008100, &mut bus);
    cpu.write_longword(0xFFFFFF88, 4, &mut bus);
    cpu.write_longword(0xFFFFFFB0, 1, &mut bus);
    // Longword units, both addresses incrementing, auto-request, enabled
    cpu.write_longword(0xFFFFFF8C, 0x5A01, &mut bus);

    for i in 0..4 {
        assert_eq!(bus.peek_u32(0x06008100 + 4 * i), 0x11111111 * (i + 1));
    }
    assert_eq!(cpu.read_longword(0xFFFFFF88, &mut bus), 0);
    // TE set
    assert_eq!(cpu.read_longword(0xFFFFFF8C, &mut bus) & 0x2, 0x2);
}

#[test]
fn dma_with_zero_count_does_nothing() {
    let mut bus = TestBus::new();
    let mut cpu = boot(&mut bus);
    bus.poke_u32(0x06008000, 0x12345678);
    bus.poke_u32(0x06008100, 0xDEADBEEF);

    cpu.write_longword(0xFFFFFF80, 0x06008000, &mut bus);
    cpu.write_longword(0xFFFFFF84, 0x06008100, &mut bus);
    cpu.write_longword(0xFFFFFF88, 0, &mut bus);
    cpu.write_longword(0xFFFFFFB0, 1, &mut bus);
    cpu.write_longword(0xFFFFFF8C, 0x5A01, &mut bus);

    // Re-enabling DMAOR kicks the controller again
    cpu.write_longword(0xFFFFFFB0, 1, &mut bus);

    assert_eq!(bus.peek_u32(0x06008100), 0xDEADBEEF);
    assert_eq!(cpu.read_longword(0xFFFFFF88, &mut bus), 0);
    assert_eq!(cpu.read_longword(0xFFFFFF84, &mut bus), 0x06008100);
    assert_eq!(cpu.read_longword(0xFFFFFF8C, &mut bus) & 0x2, 0);
}

#[test]
fn cached_reads_survive_external_writes() {
    let mut bus = TestBus::new();
    bus.poke_u32(0x4000, 0xAAAA5555);
    let mut cpu = boot(&mut bus);

    // CCR: cache enabled
    cpu.write_byte(0xFFFFFE92, 0x01, &mut bus);
    assert!(cpu.cache_enabled());

    assert_eq!(cpu.read_longword(0x4000, &mut bus), 0xAAAA5555);
    bus.poke_u32(0x4000, 0x12345678);

    assert_eq!(cpu.read_longword(0x4000, &mut bus), 0xAAAA5555);
    assert_eq!(cpu.read_longword(0x20004000, &mut bus), 0x12345678);

    // Associative purge drops the stale line
    cpu.write_longword(0x40004000, 0, &mut bus);
    assert_eq!(cpu.read_longword(0x4000, &mut bus), 0x12345678);
}

#[test]
fn uncacheable_pages_bypass_cache() {
    let mut bus = TestBus::new();
    bus.cacheable = false;
    bus.poke_u32(0x4000, 1);
    let mut cpu = boot(&mut bus);
    cpu.write_byte(0xFFFFFE92, 0x01, &mut bus);

    assert_eq!(cpu.read_longword(0x4000, &mut bus), 1);
    bus.poke_u32(0x4000, 2);
    assert_eq!(cpu.read_longword(0x4000, &mut bus), 2);
}
