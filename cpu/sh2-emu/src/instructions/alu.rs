//! Arithmetic, comparison, multiplication and division step instructions

use crate::Sh2;
use crate::bus::BusInterface;
use crate::instructions::{imm8, rm, rn};
use saturn_common::num::SignBit;

// ADD Rm, Rn
pub fn add(cpu: &mut Sh2, opcode: u16) {
    let r = &mut cpu.registers.gpr;
    r[rn(opcode)] = r[rn(opcode)].wrapping_add(r[rm(opcode)]);
}

// ADD #imm, Rn
pub fn add_imm(cpu: &mut Sh2, opcode: u16) {
    let n = rn(opcode);
    cpu.registers.gpr[n] = cpu.registers.gpr[n].wrapping_add(imm8(opcode));
}

// ADDC Rm, Rn
// Rn + Rm + T -> Rn, carry -> T
pub fn addc(cpu: &mut Sh2, opcode: u16) {
    let source = cpu.registers.gpr[rm(opcode)];
    let destination = cpu.registers.gpr[rn(opcode)];

    let (sum, carry_a) = destination.overflowing_add(source);
    let (sum, carry_b) = sum.overflowing_add(cpu.registers.sr.t.into());

    cpu.registers.gpr[rn(opcode)] = sum;
    cpu.registers.sr.t = carry_a | carry_b;
}

// ADDV Rm, Rn
// Rn + Rm -> Rn, signed overflow -> T
pub fn addv(cpu: &mut Sh2, opcode: u16) {
    let source = cpu.registers.gpr[rm(opcode)] as i32;
    let destination = cpu.registers.gpr[rn(opcode)] as i32;

    let (sum, overflow) = destination.overflowing_add(source);
    cpu.registers.gpr[rn(opcode)] = sum as u32;
    cpu.registers.sr.t = overflow;
}

// SUB Rm, Rn
pub fn sub(cpu: &mut Sh2, opcode: u16) {
    let r = &mut cpu.registers.gpr;
    r[rn(opcode)] = r[rn(opcode)].wrapping_sub(r[rm(opcode)]);
}

// SUBC Rm, Rn
// Rn - Rm - T -> Rn, borrow -> T
pub fn subc(cpu: &mut Sh2, opcode: u16) {
    let source = cpu.registers.gpr[rm(opcode)];
    let destination = cpu.registers.gpr[rn(opcode)];

    let (difference, borrow_a) = destination.overflowing_sub(source);
    let (difference, borrow_b) = difference.overflowing_sub(cpu.registers.sr.t.into());

    cpu.registers.gpr[rn(opcode)] = difference;
    cpu.registers.sr.t = borrow_a | borrow_b;
}

// SUBV Rm, Rn
// Rn - Rm -> Rn, signed underflow -> T
pub fn subv(cpu: &mut Sh2, opcode: u16) {
    let source = cpu.registers.gpr[rm(opcode)] as i32;
    let destination = cpu.registers.gpr[rn(opcode)] as i32;

    let (difference, overflow) = destination.overflowing_sub(source);
    cpu.registers.gpr[rn(opcode)] = difference as u32;
    cpu.registers.sr.t = overflow;
}

// NEG Rm, Rn
pub fn neg(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.gpr[rm(opcode)].wrapping_neg();
}

// NEGC Rm, Rn
// 0 - Rm - T -> Rn, borrow -> T
pub fn negc(cpu: &mut Sh2, opcode: u16) {
    let source = cpu.registers.gpr[rm(opcode)];
    let t = u32::from(cpu.registers.sr.t);

    let result = 0_u32.wrapping_sub(source).wrapping_sub(t);
    cpu.registers.gpr[rn(opcode)] = result;
    cpu.registers.sr.t = source != 0 || t != 0;
}

macro_rules! impl_compare {
    ($name:ident, |$n:ident| $compare:expr) => {
        pub fn $name(cpu: &mut Sh2, opcode: u16) {
            let $n = cpu.registers.gpr[rn(opcode)];
            cpu.registers.sr.t = $compare;
        }
    };
    ($name:ident, |$m:ident, $n:ident| $compare:expr) => {
        pub fn $name(cpu: &mut Sh2, opcode: u16) {
            let $m = cpu.registers.gpr[rm(opcode)];
            let $n = cpu.registers.gpr[rn(opcode)];
            cpu.registers.sr.t = $compare;
        }
    };
}

// CMP/EQ Rm, Rn
impl_compare!(cmp_eq, |m, n| m == n);

// CMP/HS Rm, Rn (unsigned >=)
impl_compare!(cmp_hs, |m, n| n >= m);

// CMP/GE Rm, Rn (signed >=)
impl_compare!(cmp_ge, |m, n| (n as i32) >= (m as i32));

// CMP/HI Rm, Rn (unsigned >)
impl_compare!(cmp_hi, |m, n| n > m);

// CMP/GT Rm, Rn (signed >)
impl_compare!(cmp_gt, |m, n| (n as i32) > (m as i32));

// CMP/PZ Rn
impl_compare!(cmp_pz, |n| (n as i32) >= 0);

// CMP/PL Rn
impl_compare!(cmp_pl, |n| (n as i32) > 0);

// CMP/STR Rm, Rn
// T set if any byte position holds equal bytes
impl_compare!(cmp_str, |m, n| (m ^ n).to_be_bytes().contains(&0));

// CMP/EQ #imm, R0
pub fn cmp_eq_imm(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.sr.t = cpu.registers.gpr[0] == imm8(opcode);
}

// DT Rn
pub fn dt(cpu: &mut Sh2, opcode: u16) {
    let n = rn(opcode);
    let value = cpu.registers.gpr[n].wrapping_sub(1);
    cpu.registers.gpr[n] = value;
    cpu.registers.sr.t = value == 0;
}

// EXTS.B Rm, Rn
pub fn exts_b(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.gpr[rm(opcode)] as i8 as u32;
}

// EXTS.W Rm, Rn
pub fn exts_w(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.gpr[rm(opcode)] as i16 as u32;
}

// EXTU.B Rm, Rn
pub fn extu_b(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.gpr[rm(opcode)] & 0xFF;
}

// EXTU.W Rm, Rn
pub fn extu_w(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.gpr[rn(opcode)] = cpu.registers.gpr[rm(opcode)] & 0xFFFF;
}

// MUL.L Rm, Rn
// Rn * Rm -> MACL
pub fn mul_l(cpu: &mut Sh2, opcode: u16) {
    cpu.registers.macl = cpu.registers.gpr[rn(opcode)].wrapping_mul(cpu.registers.gpr[rm(opcode)]);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// MULS.W Rm, Rn
pub fn muls(cpu: &mut Sh2, opcode: u16) {
    let a = i32::from(cpu.registers.gpr[rm(opcode)] as i16);
    let b = i32::from(cpu.registers.gpr[rn(opcode)] as i16);
    cpu.registers.macl = a.wrapping_mul(b) as u32;
}

// MULU.W Rm, Rn
pub fn mulu(cpu: &mut Sh2, opcode: u16) {
    let a = cpu.registers.gpr[rm(opcode)] & 0xFFFF;
    let b = cpu.registers.gpr[rn(opcode)] & 0xFFFF;
    cpu.registers.macl = a * b;
}

// DMULS.L Rm, Rn
// Signed 32x32 -> 64 into MACH:MACL
pub fn dmuls(cpu: &mut Sh2, opcode: u16) {
    let a = i64::from(cpu.registers.gpr[rm(opcode)] as i32);
    let b = i64::from(cpu.registers.gpr[rn(opcode)] as i32);
    cpu.registers.set_mac(a * b);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// DMULU.L Rm, Rn
// Unsigned 32x32 -> 64 into MACH:MACL
pub fn dmulu(cpu: &mut Sh2, opcode: u16) {
    let product =
        u64::from(cpu.registers.gpr[rm(opcode)]) * u64::from(cpu.registers.gpr[rn(opcode)]);
    cpu.registers.set_mac(product as i64);
    cpu.cycles = cpu.cycles.wrapping_add(1);
}

// MAC.W @Rm+, @Rn+
// With S set, the accumulation saturates to 32 bits in MACL
pub fn mac_w(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    let (m, n) = (rm(opcode), rn(opcode));

    let address_n = cpu.registers.gpr[n];
    let b = cpu.read_word(address_n, bus) as i16;
    cpu.registers.gpr[n] = address_n.wrapping_add(2);

    let address_m = cpu.registers.gpr[m];
    let a = cpu.read_word(address_m, bus) as i16;
    cpu.registers.gpr[m] = address_m.wrapping_add(2);

    let product = i64::from(a) * i64::from(b);
    if cpu.registers.sr.s {
        let sum = i64::from(cpu.registers.macl as i32) + product;
        cpu.registers.macl = sum.clamp(i32::MIN.into(), i32::MAX.into()) as u32;
    } else {
        cpu.registers.set_mac(cpu.registers.mac().wrapping_add(product));
    }

    cpu.cycles = cpu.cycles.wrapping_add(2);
}

// MAC.L @Rm+, @Rn+
// With S set, the accumulation saturates to 48 bits
pub fn mac_l(cpu: &mut Sh2, opcode: u16, bus: &mut dyn BusInterface) {
    const MIN_48: i64 = -(1 << 47);
    const MAX_48: i64 = (1 << 47) - 1;

    let (m, n) = (rm(opcode), rn(opcode));

    let address_n = cpu.registers.gpr[n];
    let b = cpu.read_longword(address_n, bus) as i32;
    cpu.registers.gpr[n] = address_n.wrapping_add(4);

    let address_m = cpu.registers.gpr[m];
    let a = cpu.read_longword(address_m, bus) as i32;
    cpu.registers.gpr[m] = address_m.wrapping_add(4);

    let sum = (i64::from(a) * i64::from(b)).wrapping_add(cpu.registers.mac());
    let sum = if cpu.registers.sr.s { sum.clamp(MIN_48, MAX_48) } else { sum };
    cpu.registers.set_mac(sum);

    cpu.cycles = cpu.cycles.wrapping_add(2);
}

// DIV0U
pub fn div0u(cpu: &mut Sh2) {
    let sr = &mut cpu.registers.sr;
    sr.m = false;
    sr.q = false;
    sr.t = false;
}

// DIV0S Rm, Rn
pub fn div0s(cpu: &mut Sh2, opcode: u16) {
    let q = cpu.registers.gpr[rn(opcode)].sign_bit();
    let m = cpu.registers.gpr[rm(opcode)].sign_bit();

    let sr = &mut cpu.registers.sr;
    sr.q = q;
    sr.m = m;
    sr.t = q != m;
}

// DIV1 Rm, Rn
// One non-restoring division step: shifts T into Rn, then adds or subtracts Rm depending on Q/M
pub fn div1(cpu: &mut Sh2, opcode: u16) {
    let divisor = cpu.registers.gpr[rm(opcode)];
    let old_q = cpu.registers.sr.q;
    let shifted_out = cpu.registers.gpr[rn(opcode)].sign_bit();
    let partial = (cpu.registers.gpr[rn(opcode)] << 1) | u32::from(cpu.registers.sr.t);

    let (result, carry) = if old_q == cpu.registers.sr.m {
        partial.overflowing_sub(divisor)
    } else {
        partial.overflowing_add(divisor)
    };

    let q = shifted_out ^ cpu.registers.sr.m ^ carry;
    cpu.registers.gpr[rn(opcode)] = result;
    cpu.registers.sr.q = q;
    cpu.registers.sr.t = q == cpu.registers.sr.m;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WhichCpu;
    use crate::engine::Sh2CoreId;
    use crate::instructions::bits::rotcl;
    use test_log::test;

    fn new_cpu() -> Sh2 {
        Sh2::new(WhichCpu::Master, Sh2CoreId::Interpreter)
    }

    fn op(m: usize, n: usize) -> u16 {
        ((n as u16) << 8) | ((m as u16) << 4)
    }

    #[test]
    fn unsigned_division_steps() {
        let mut cpu = new_cpu();

        for _ in 0..200 {
            let divisor = rand::random::<u16>().max(1);
            let dividend = rand::random::<u32>() % (u32::from(divisor) << 16);

            // 32/16 unsigned: divisor in the upper half of R1
            cpu.registers.gpr[1] = u32::from(divisor) << 16;
            cpu.registers.gpr[0] = dividend;
            div0u(&mut cpu);
            for _ in 0..16 {
                div1(&mut cpu, op(1, 0));
            }
            rotcl(&mut cpu, op(0, 0));

            assert_eq!(cpu.registers.gpr[0] & 0xFFFF, dividend / u32::from(divisor));
        }
    }

    #[test]
    fn signed_division_steps() {
        let mut cpu = new_cpu();

        for _ in 0..200 {
            let dividend: i16 = rand::random();
            let divisor = (rand::random::<i16>() >> 7) | 1;
            if dividend == i16::MIN && divisor == -1 {
                continue;
            }

            // 16/16 signed division sequence from the SH-2 programming manual
            cpu.registers.gpr[0] = (divisor as u32) << 16;
            cpu.registers.gpr[1] = dividend as u32;
            cpu.registers.gpr[2] = 0;
            cpu.registers.gpr[3] = cpu.registers.gpr[1];
            rotcl(&mut cpu, op(0, 3));
            subc(&mut cpu, op(2, 1));
            div0s(&mut cpu, op(0, 1));
            for _ in 0..16 {
                div1(&mut cpu, op(0, 1));
            }
            cpu.registers.gpr[1] = cpu.registers.gpr[1] as i16 as u32;
            rotcl(&mut cpu, op(0, 1));
            addc(&mut cpu, op(2, 1));

            assert_eq!(cpu.registers.gpr[1] as i16, dividend / divisor, "{dividend} / {divisor}");
        }
    }

    #[test]
    fn carry_and_overflow_flags() {
        let mut cpu = new_cpu();

        cpu.registers.gpr[0] = 0xFFFF_FFFF;
        cpu.registers.gpr[1] = 1;
        cpu.registers.sr.t = false;
        addc(&mut cpu, op(0, 1));
        assert_eq!(cpu.registers.gpr[1], 0);
        assert!(cpu.registers.sr.t);

        cpu.registers.gpr[0] = 1;
        cpu.registers.gpr[1] = 0x7FFF_FFFF;
        addv(&mut cpu, op(0, 1));
        assert!(cpu.registers.sr.t);

        cpu.registers.gpr[0] = 5;
        cpu.registers.sr.t = false;
        negc(&mut cpu, op(0, 2));
        assert_eq!(cpu.registers.gpr[2] as i32, -5);
        assert!(cpu.registers.sr.t);
    }

    #[test]
    fn cmp_str_finds_equal_byte() {
        let mut cpu = new_cpu();
        cpu.registers.gpr[0] = 0x12345678;
        cpu.registers.gpr[1] = 0xAB34CDEF;
        cmp_str(&mut cpu, op(0, 1));
        assert!(cpu.registers.sr.t);

        cpu.registers.gpr[1] = 0xAB35CDEF;
        cmp_str(&mut cpu, op(0, 1));
        assert!(!cpu.registers.sr.t);
    }

    #[test]
    fn multiplies() {
        let mut cpu = new_cpu();
        for _ in 0..100 {
            let a: i32 = rand::random();
            let b: i32 = rand::random();
            cpu.registers.gpr[2] = a as u32;
            cpu.registers.gpr[3] = b as u32;

            dmuls(&mut cpu, op(2, 3));
            assert_eq!(cpu.registers.mac(), i64::from(a) * i64::from(b));

            dmulu(&mut cpu, op(2, 3));
            assert_eq!(cpu.registers.mac() as u64, u64::from(a as u32) * u64::from(b as u32));

            muls(&mut cpu, op(2, 3));
            assert_eq!(cpu.registers.macl as i32, i32::from(a as i16) * i32::from(b as i16));
        }
    }
}
