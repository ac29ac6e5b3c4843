//! オペコードの実装（ロード/ストア・転送・スタック・演算）

use super::addressing::AddressingMode;
use super::{flags, Cpu, MemoryBus};

impl Cpu {
    //--------------------------------------------------
    // LDA / LDX / LDY - Load
    //--------------------------------------------------
    pub(super) fn lda<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.regs.a = self.read_operand(memory, mode);
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn ldx<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.regs.x = self.read_operand(memory, mode);
        self.regs.update_zero_negative_flags(self.regs.x);
    }

    pub(super) fn ldy<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.regs.y = self.read_operand(memory, mode);
        self.regs.update_zero_negative_flags(self.regs.y);
    }

    //--------------------------------------------------
    // STA / STX / STY - Store
    //--------------------------------------------------
    fn store<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode, value: u8) {
        let addr = self.operand_addr(memory, mode, true);
        self.write_bus(memory, addr, value);
        self.cycles += 1;
    }

    pub(super) fn sta<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.store(memory, mode, self.regs.a);
    }

    pub(super) fn stx<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.store(memory, mode, self.regs.x);
    }

    pub(super) fn sty<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.store(memory, mode, self.regs.y);
    }

    //--------------------------------------------------
    // Transfer Instructions
    //--------------------------------------------------
    pub(super) fn tax(&mut self) {
        self.regs.x = self.regs.a;
        self.regs.update_zero_negative_flags(self.regs.x);
        self.cycles += 1;
    }

    pub(super) fn txa(&mut self) {
        self.regs.a = self.regs.x;
        self.regs.update_zero_negative_flags(self.regs.a);
        self.cycles += 1;
    }

    pub(super) fn tay(&mut self) {
        self.regs.y = self.regs.a;
        self.regs.update_zero_negative_flags(self.regs.y);
        self.cycles += 1;
    }

    pub(super) fn tya(&mut self) {
        self.regs.a = self.regs.y;
        self.regs.update_zero_negative_flags(self.regs.a);
        self.cycles += 1;
    }

    pub(super) fn tsx(&mut self) {
        self.regs.x = self.regs.sp;
        self.regs.update_zero_negative_flags(self.regs.x);
        self.cycles += 1;
    }

    pub(super) fn txs(&mut self) {
        // TXSはフラグに影響しない
        self.regs.sp = self.regs.x;
        self.cycles += 1;
    }

    //--------------------------------------------------
    // Stack Instructions
    //--------------------------------------------------
    pub(super) fn pha<M: MemoryBus>(&mut self, memory: &mut M) {
        self.push_byte(memory, self.regs.a);
        self.cycles += 2;
    }

    pub(super) fn pla<M: MemoryBus>(&mut self, memory: &mut M) {
        self.regs.a = self.pop_byte(memory);
        self.regs.update_zero_negative_flags(self.regs.a);
        self.cycles += 3;
    }

    pub(super) fn php<M: MemoryBus>(&mut self, memory: &mut M) {
        // PHPはBフラグとUNUSEDをセットしてプッシュ
        self.push_byte(memory, self.regs.status | flags::BREAK | flags::UNUSED);
        self.cycles += 2;
    }

    pub(super) fn plp<M: MemoryBus>(&mut self, memory: &mut M) {
        let value = self.pop_byte(memory);
        self.regs.status = (value & !flags::BREAK) | flags::UNUSED;
        self.cycles += 3;
    }

    //--------------------------------------------------
    // ADC / SBC
    //--------------------------------------------------
    fn do_adc(&mut self, value: u8) {
        let a = self.regs.a;
        let carry = self.regs.get_flag(flags::CARRY) as u16;
        let binary = a as u16 + value as u16 + carry;

        if self.regs.get_flag(flags::DECIMAL) {
            // NMOS: Zはバイナリ結果、N/Vは上位ニブル補正前の中間値から
            let mut low = (a & 0x0F) as u16 + (value & 0x0F) as u16 + carry;
            let mut high = (a >> 4) as u16 + (value >> 4) as u16;
            if low > 9 {
                low += 6;
            }
            if low > 0x0F {
                high += 1;
            }
            self.regs.set_flag(flags::ZERO, (binary & 0xFF) == 0);
            self.regs.set_flag(flags::NEGATIVE, (high & 0x08) != 0);
            self.regs.set_flag(
                flags::OVERFLOW,
                ((((high << 4) as u8) ^ a) & 0x80) != 0 && ((a ^ value) & 0x80) == 0,
            );
            if high > 9 {
                high += 6;
            }
            self.regs.set_flag(flags::CARRY, high > 0x0F);
            self.regs.a = (((high << 4) | (low & 0x0F)) & 0xFF) as u8;
        } else {
            let result8 = binary as u8;
            self.regs.set_flag(flags::CARRY, binary > 0xFF);
            self.regs.set_flag(
                flags::OVERFLOW,
                ((a ^ result8) & (value ^ result8) & 0x80) != 0,
            );
            self.regs.update_zero_negative_flags(result8);
            self.regs.a = result8;
        }
    }

    fn do_sbc(&mut self, value: u8) {
        let a = self.regs.a;
        let borrow = (!self.regs.get_flag(flags::CARRY)) as i16;
        let binary = a as i16 - value as i16 - borrow;
        let result8 = binary as u8;

        // フラグはBCDモードでもバイナリ減算から決まる
        self.regs.set_flag(flags::CARRY, binary >= 0);
        self.regs.set_flag(flags::OVERFLOW, ((a ^ value) & (a ^ result8) & 0x80) != 0);
        self.regs.update_zero_negative_flags(result8);

        if self.regs.get_flag(flags::DECIMAL) {
            let mut low = (a & 0x0F) as i16 - (value & 0x0F) as i16 - borrow;
            let mut high = (a >> 4) as i16 - (value >> 4) as i16;
            if low < 0 {
                low -= 6;
                high -= 1;
            }
            if high < 0 {
                high -= 6;
            }
            self.regs.a = (((high << 4) | (low & 0x0F)) & 0xFF) as u8;
        } else {
            self.regs.a = result8;
        }
    }

    pub(super) fn adc<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        let value = self.read_operand(memory, mode);
        self.do_adc(value);
    }

    pub(super) fn sbc<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        let value = self.read_operand(memory, mode);
        self.do_sbc(value);
    }

    //--------------------------------------------------
    // Logical
    //--------------------------------------------------
    pub(super) fn and<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.regs.a &= self.read_operand(memory, mode);
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn ora<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.regs.a |= self.read_operand(memory, mode);
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn eor<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.regs.a ^= self.read_operand(memory, mode);
        self.regs.update_zero_negative_flags(self.regs.a);
    }

    pub(super) fn bit<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        let value = self.read_operand(memory, mode);
        self.regs.set_flag(flags::ZERO, (self.regs.a & value) == 0);
        self.regs.set_flag(flags::NEGATIVE, (value & 0x80) != 0);
        self.regs.set_flag(flags::OVERFLOW, (value & 0x40) != 0);
    }

    //--------------------------------------------------
    // Compare
    //--------------------------------------------------
    fn do_compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.regs.set_flag(flags::CARRY, register >= value);
        self.regs.update_zero_negative_flags(result);
    }

    pub(super) fn cmp<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        let value = self.read_operand(memory, mode);
        self.do_compare(self.regs.a, value);
    }

    pub(super) fn cpx<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        let value = self.read_operand(memory, mode);
        self.do_compare(self.regs.x, value);
    }

    pub(super) fn cpy<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        let value = self.read_operand(memory, mode);
        self.do_compare(self.regs.y, value);
    }
}
