//! アドレッシングモードの実装
//!
//! 6502のアドレッシングモードを定義

use super::{Cpu, MemoryBus};

/// アドレッシングモードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// 即値（Immediate） - #$nn
    Immediate,
    /// ゼロページ - $nn
    ZeroPage,
    /// ゼロページ,X - $nn,X
    ZeroPageX,
    /// ゼロページ,Y - $nn,Y
    ZeroPageY,
    /// 絶対 - $nnnn
    Absolute,
    /// 絶対,X - $nnnn,X
    AbsoluteX,
    /// 絶対,Y - $nnnn,Y
    AbsoluteY,
    /// 間接,X（プリインデックス） - ($nn,X)
    IndirectX,
    /// 間接,Y（ポストインデックス） - ($nn),Y
    IndirectY,
    /// 暗黙的/アキュムレータ
    Implied,
}

impl Cpu {
    //--------------------------------------------------
    // アドレッシングモードのヘルパー関数
    //--------------------------------------------------

    /// 即値を取得
    pub(super) fn get_immediate<M: MemoryBus>(&mut self, memory: &mut M) -> u8 {
        let value = self.read_bus(memory, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;
        value
    }

    /// ゼロページアドレスを取得
    fn get_zeropage_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let addr = self.read_bus(memory, self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;
        addr
    }

    /// ゼロページ,X / ゼロページ,Yアドレスを取得
    fn get_zeropage_indexed_addr<M: MemoryBus>(&mut self, memory: &mut M, index: u8) -> u16 {
        let base = self.read_bus(memory, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 2; // +1 for ZP read, +1 for index add
        base.wrapping_add(index) as u16
    }

    /// 絶対アドレスを取得
    pub(super) fn get_absolute_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let low = self.read_bus(memory, self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let high = self.read_bus(memory, self.regs.pc) as u16;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 2;
        (high << 8) | low
    }

    /// 絶対,X / 絶対,Yアドレスを取得（読み込みはページ境界でペナルティ）
    fn get_absolute_indexed_addr<M: MemoryBus>(&mut self, memory: &mut M, index: u8, write: bool) -> u16 {
        let base = self.get_absolute_addr(memory);
        let addr = base.wrapping_add(index as u16);
        // ページ境界を越えた場合、追加サイクル
        if write || (base & 0xFF00) != (addr & 0xFF00) {
            self.cycles += 1;
        }
        addr
    }

    /// 間接,Xアドレスを取得
    fn get_indirect_x_addr<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let base = self.read_bus(memory, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let ptr = base.wrapping_add(self.regs.x);
        let low = self.read_bus(memory, ptr as u16) as u16;
        let high = self.read_bus(memory, ptr.wrapping_add(1) as u16) as u16;
        self.cycles += 4;
        (high << 8) | low
    }

    /// 間接,Yアドレスを取得
    fn get_indirect_y_addr<M: MemoryBus>(&mut self, memory: &mut M, write: bool) -> u16 {
        let ptr = self.read_bus(memory, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let low = self.read_bus(memory, ptr as u16) as u16;
        let high = self.read_bus(memory, ptr.wrapping_add(1) as u16) as u16;
        let base = (high << 8) | low;
        let addr = base.wrapping_add(self.regs.y as u16);
        self.cycles += 3;
        if write || (base & 0xFF00) != (addr & 0xFF00) {
            self.cycles += 1;
        }
        addr
    }

    /// モードに応じた実効アドレスを求める
    pub(super) fn operand_addr<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode, write: bool) -> u16 {
        match mode {
            AddressingMode::ZeroPage => self.get_zeropage_addr(memory),
            AddressingMode::ZeroPageX => self.get_zeropage_indexed_addr(memory, self.regs.x),
            AddressingMode::ZeroPageY => self.get_zeropage_indexed_addr(memory, self.regs.y),
            AddressingMode::Absolute => self.get_absolute_addr(memory),
            AddressingMode::AbsoluteX => self.get_absolute_indexed_addr(memory, self.regs.x, write),
            AddressingMode::AbsoluteY => self.get_absolute_indexed_addr(memory, self.regs.y, write),
            AddressingMode::IndirectX => self.get_indirect_x_addr(memory),
            AddressingMode::IndirectY => self.get_indirect_y_addr(memory, write),
            // 即値・暗黙はアドレスを持たない。即値はPC位置を返す
            AddressingMode::Immediate => {
                let addr = self.regs.pc;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                addr
            }
            AddressingMode::Implied => self.regs.pc,
        }
    }

    /// オペランド値を読み込む
    pub(super) fn read_operand<M: MemoryBus>(&mut self, memory: &mut M, mode: AddressingMode) -> u8 {
        if mode == AddressingMode::Immediate {
            return self.get_immediate(memory);
        }
        let addr = self.operand_addr(memory, mode, false);
        let value = self.read_bus(memory, addr);
        self.cycles += 1;
        value
    }

    /// ブランチを実行（共通ロジック）
    pub(super) fn branch<M: MemoryBus>(&mut self, memory: &mut M, condition: bool) {
        let offset = self.read_bus(memory, self.regs.pc) as i8;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;

        if condition {
            let old_pc = self.regs.pc;
            self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
            self.cycles += 1;
            // ページ境界を越えた場合、追加サイクル
            if (old_pc & 0xFF00) != (self.regs.pc & 0xFF00) {
                self.cycles += 1;
            }
        }
    }
}
