//! オペコードの実装（インクリメント・シフト・分岐・割り込み・未定義命令）

use super::addressing::AddressingMode;
use super::{flags, Cpu, MemoryBus};

impl Cpu {
    //--------------------------------------------------
    // Read-Modify-Write共通
    //--------------------------------------------------

    /// NMOSのRMWは元の値を一度書き戻してから結果を書く
    fn read_modify_write<M, F>(&mut self, memory: &mut M, mode: AddressingMode, op: F)
    where
        M: MemoryBus,
        F: FnOnce(&mut Self, u8) -> u8,
    {
        let addr = self.operand_addr(memory, mode, true);
        let value = self.read_bus(memory, addr);
        self.cycles += 1;
        self.write_bus(memory, addr, value);
        self.cycles += 1;
        let result = op(self, value);
        self.write_bus(memory, addr, result);
        self.cycles += 1;
    }

    //--------------------------------------------------
    // Increment/Decrement
    //--------------------------------------------------
    pub(super) fn inc<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.read_modify_write(memory, mode, |cpu, v| {
            let r = v.wrapping_add(1);
            cpu.regs.update_zero_negative_flags(r);
            r
        });
    }

    pub(super) fn dec<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.read_modify_write(memory, mode, |cpu, v| {
            let r = v.wrapping_sub(1);
            cpu.regs.update_zero_negative_flags(r);
            r
        });
    }

    pub(super) fn inx(&mut self) {
        self.regs.x = self.regs.x.wrapping_add(1);
        self.regs.update_zero_negative_flags(self.regs.x);
        self.cycles += 1;
    }

    pub(super) fn iny(&mut self) {
        self.regs.y = self.regs.y.wrapping_add(1);
        self.regs.update_zero_negative_flags(self.regs.y);
        self.cycles += 1;
    }

    pub(super) fn dex(&mut self) {
        self.regs.x = self.regs.x.wrapping_sub(1);
        self.regs.update_zero_negative_flags(self.regs.x);
        self.cycles += 1;
    }

    pub(super) fn dey(&mut self) {
        self.regs.y = self.regs.y.wrapping_sub(1);
        self.regs.update_zero_negative_flags(self.regs.y);
        self.cycles += 1;
    }

    //--------------------------------------------------
    // Shifts
    //--------------------------------------------------
    fn do_asl(&mut self, value: u8) -> u8 {
        self.regs.set_flag(flags::CARRY, (value & 0x80) != 0);
        let result = value << 1;
        self.regs.update_zero_negative_flags(result);
        result
    }

    fn do_lsr(&mut self, value: u8) -> u8 {
        self.regs.set_flag(flags::CARRY, (value & 0x01) != 0);
        let result = value >> 1;
        self.regs.update_zero_negative_flags(result);
        result
    }

    fn do_rol(&mut self, value: u8) -> u8 {
        let carry_in = self.regs.get_flag(flags::CARRY) as u8;
        self.regs.set_flag(flags::CARRY, (value & 0x80) != 0);
        let result = (value << 1) | carry_in;
        self.regs.update_zero_negative_flags(result);
        result
    }

    fn do_ror(&mut self, value: u8) -> u8 {
        let carry_in = if self.regs.get_flag(flags::CARRY) { 0x80 } else { 0 };
        self.regs.set_flag(flags::CARRY, (value & 0x01) != 0);
        let result = (value >> 1) | carry_in;
        self.regs.update_zero_negative_flags(result);
        result
    }

    pub(super) fn asl_accumulator(&mut self) {
        self.regs.a = self.do_asl(self.regs.a);
        self.cycles += 1;
    }

    pub(super) fn lsr_accumulator(&mut self) {
        self.regs.a = self.do_lsr(self.regs.a);
        self.cycles += 1;
    }

    pub(super) fn rol_accumulator(&mut self) {
        self.regs.a = self.do_rol(self.regs.a);
        self.cycles += 1;
    }

    pub(super) fn ror_accumulator(&mut self) {
        self.regs.a = self.do_ror(self.regs.a);
        self.cycles += 1;
    }

    pub(super) fn asl<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.read_modify_write(memory, mode, Self::do_asl);
    }

    pub(super) fn lsr<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.read_modify_write(memory, mode, Self::do_lsr);
    }

    pub(super) fn rol<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.read_modify_write(memory, mode, Self::do_rol);
    }

    pub(super) fn ror<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) {
        self.read_modify_write(memory, mode, Self::do_ror);
    }

    //--------------------------------------------------
    // Jump/Call
    //--------------------------------------------------
    pub(super) fn jmp_absolute<M: MemoryBus>(&mut self, memory: &mut M) {
        self.regs.pc = self.get_absolute_addr(memory);
    }

    pub(super) fn jmp_indirect<M: MemoryBus>(&mut self, memory: &mut M) {
        let ptr = self.get_absolute_addr(memory);
        // NMOSのバグ: 上位バイトはページを跨がずに読む
        let high_ptr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
        let low = self.read_bus(memory, ptr) as u16;
        let high = self.read_bus(memory, high_ptr) as u16;
        self.regs.pc = (high << 8) | low;
        self.cycles += 2;
    }

    pub(super) fn jsr<M: MemoryBus>(&mut self, memory: &mut M) {
        let target = self.get_absolute_addr(memory);
        let ret = self.regs.pc.wrapping_sub(1);
        self.push_word(memory, ret);
        self.regs.pc = target;
        self.cycles += 3;
    }

    pub(super) fn rts<M: MemoryBus>(&mut self, memory: &mut M) {
        self.regs.pc = self.pop_word(memory).wrapping_add(1);
        self.cycles += 5;
    }

    //--------------------------------------------------
    // Interrupts
    //--------------------------------------------------
    pub(super) fn brk<M: MemoryBus>(&mut self, memory: &mut M) {
        // パディングバイトを読み飛ばす
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.interrupt(memory, 0xFFFE, true);
        self.cycles += 6;
    }

    pub(super) fn rti<M: MemoryBus>(&mut self, memory: &mut M) {
        let status = self.pop_byte(memory);
        self.regs.status = (status & !flags::BREAK) | flags::UNUSED;
        self.regs.pc = self.pop_word(memory);
        self.cycles += 5;
    }

    //--------------------------------------------------
    // Flag Instructions
    //--------------------------------------------------
    pub(super) fn flag_op(&mut self, flag: u8, value: bool) {
        self.regs.set_flag(flag, value);
        self.cycles += 1;
    }

    //--------------------------------------------------
    // 未定義オペコード（NOPモード）
    //--------------------------------------------------

    /// 命令長とサイクル数だけ消費し、レジスタは変更しない
    pub(super) fn illegal_nop<M: MemoryBus>(&mut self, memory: &mut M, opcode: u8) {
        // 列3/7/B/F のうち$80-$BF以外はRMW系（SLO, RLA, SRE, RRA, DCP, ISC）
        let rmw = (opcode & 0x03) == 0x03 && !(0x80..=0xBF).contains(&opcode);
        match Self::illegal_mode(opcode) {
            AddressingMode::Implied => self.cycles += 1,
            AddressingMode::Immediate => {
                self.get_immediate(memory);
            }
            mode => {
                let addr = self.operand_addr(memory, mode, rmw);
                self.read_bus(memory, addr);
                self.cycles += 1;
                if rmw {
                    self.cycles += 2;
                }
            }
        }
    }
}
