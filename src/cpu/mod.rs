//! MOS 6502 CPU Emulator
//!
//! Apple IIで使用されるNMOS 6502プロセッサのエミュレーション実装。
//! 1命令単位で実行し、データシート通りのサイクル数を累積する。

mod opcodes;
mod opcodes2;
pub mod addressing;

use crate::error::{EmuError, Result};
use crate::savestate::{StateReader, StateWriter};
use addressing::AddressingMode::{self, *};

/// CPUのステータスレジスタのフラグビット
pub mod flags {
    pub const CARRY: u8 = 0b0000_0001;      // C: キャリーフラグ
    pub const ZERO: u8 = 0b0000_0010;       // Z: ゼロフラグ
    pub const IRQ_DISABLE: u8 = 0b0000_0100; // I: 割り込み禁止フラグ
    pub const DECIMAL: u8 = 0b0000_1000;    // D: BCDモードフラグ
    pub const BREAK: u8 = 0b0001_0000;      // B: ブレークフラグ
    pub const UNUSED: u8 = 0b0010_0000;     // 未使用（常に1）
    pub const OVERFLOW: u8 = 0b0100_0000;   // V: オーバーフローフラグ
    pub const NEGATIVE: u8 = 0b1000_0000;   // N: 負数フラグ
}

/// 未定義オペコードの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IllegalOpcodePolicy {
    /// 実行を停止してエラーを返す
    #[default]
    Fatal,
    /// NMOSの命令長・サイクル数どおりにNOPとして実行
    Nop,
}

/// CPUレジスタの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    /// アキュムレータ（A）
    pub a: u8,
    /// Xインデックスレジスタ
    pub x: u8,
    /// Yインデックスレジスタ
    pub y: u8,
    /// スタックポインタ
    pub sp: u8,
    /// プログラムカウンタ
    pub pc: u16,
    /// ステータスレジスタ（プロセッサフラグ）
    pub status: u8,
}

impl Default for Registers {
    fn default() -> Self {
        Registers {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,  // スタックは$01FDから開始
            pc: 0,
            status: flags::UNUSED | flags::IRQ_DISABLE,
        }
    }
}

impl Registers {
    /// フラグをセット
    pub fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    /// フラグを取得
    pub fn get_flag(&self, flag: u8) -> bool {
        (self.status & flag) != 0
    }

    /// ゼロフラグと負数フラグを値に基づいて更新
    pub fn update_zero_negative_flags(&mut self, value: u8) {
        self.set_flag(flags::ZERO, value == 0);
        self.set_flag(flags::NEGATIVE, (value & 0x80) != 0);
    }
}

/// メモリバスインターフェース
/// CPUがメモリにアクセスするために必要なトレイト
pub trait MemoryBus {
    /// メモリから1バイト読み取り
    fn read(&mut self, address: u16) -> u8;
    /// メモリに1バイト書き込み
    fn write(&mut self, address: u16, value: u8);
    /// 続くアクセスのバスサイクル（命令内のオフセットを含む）
    fn set_cycle(&mut self, _cycle: u64) {}
}

/// 6502 CPUエミュレータ
#[derive(Debug, Clone)]
pub struct Cpu {
    /// CPUレジスタ
    pub regs: Registers,
    /// 累積サイクル数（単調増加）
    pub total_cycles: u64,
    /// 現在の命令で消費したサイクル
    pub cycles: u32,
    /// 未定義オペコードの扱い
    pub illegal_policy: IllegalOpcodePolicy,
    /// 命令トレースを`log::trace!`へ出力
    pub trace: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(IllegalOpcodePolicy::Fatal)
    }
}

impl Cpu {
    /// 新しいCPUインスタンスを作成
    pub fn new(illegal_policy: IllegalOpcodePolicy) -> Self {
        Cpu {
            regs: Registers::default(),
            total_cycles: 0,
            cycles: 0,
            illegal_policy,
            trace: false,
        }
    }

    /// CPUをリセット（RAMには触れない）
    pub fn reset<M: MemoryBus>(&mut self, memory: &mut M) {
        self.cycles = 0;
        self.regs.set_flag(flags::DECIMAL, false);
        self.regs.set_flag(flags::IRQ_DISABLE, true);
        self.regs.status |= flags::UNUSED;
        self.regs.sp = 0xFD;
        self.regs.pc = self.read_vector(memory, 0xFFFC);
        self.cycles = 7; // リセットには7サイクル必要
        self.total_cycles += 7;
    }

    fn read_vector<M: MemoryBus>(&self, memory: &mut M, vector: u16) -> u16 {
        let low = self.read_bus(memory, vector) as u16;
        let high = self.read_bus(memory, vector.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    /// 割り込みシーケンス共通部（PCとPをプッシュしてベクターへ）
    fn interrupt<M: MemoryBus>(&mut self, memory: &mut M, vector: u16, brk: bool) {
        self.push_word(memory, self.regs.pc);
        let status = if brk {
            self.regs.status | flags::UNUSED | flags::BREAK
        } else {
            (self.regs.status | flags::UNUSED) & !flags::BREAK
        };
        self.push_byte(memory, status);
        self.regs.set_flag(flags::IRQ_DISABLE, true);
        self.regs.pc = self.read_vector(memory, vector);
    }

    /// NMI（ノンマスカブル割り込み）を処理
    pub fn nmi<M: MemoryBus>(&mut self, memory: &mut M) {
        self.cycles = 0;
        self.interrupt(memory, 0xFFFA, false);
        self.total_cycles += 7;
    }

    /// IRQ（割り込み要求）を処理。Iフラグがセットされていれば無視
    pub fn irq<M: MemoryBus>(&mut self, memory: &mut M) {
        if self.regs.get_flag(flags::IRQ_DISABLE) {
            return;
        }
        self.cycles = 0;
        self.interrupt(memory, 0xFFFE, false);
        self.total_cycles += 7;
    }

    /// 1命令を実行し、消費したサイクル数を返す
    pub fn step<M: MemoryBus>(&mut self, memory: &mut M) -> Result<u32> {
        self.cycles = 0;
        let pc = self.regs.pc;

        // 命令をフェッチ
        let opcode = self.fetch_byte(memory);
        if self.trace {
            log::trace!(
                "{:04X}: {:02X}  A={:02X} X={:02X} Y={:02X} P={:02X} SP={:02X} CYC={}",
                pc, opcode, self.regs.a, self.regs.x, self.regs.y,
                self.regs.status, self.regs.sp, self.total_cycles
            );
        }

        // 命令を実行
        self.execute_opcode(memory, opcode, pc)?;

        self.total_cycles += self.cycles as u64;
        Ok(self.cycles)
    }

    /// バスサイクルを通知してから読む
    fn read_bus<M: MemoryBus>(&self, memory: &mut M, address: u16) -> u8 {
        memory.set_cycle(self.total_cycles + self.cycles as u64);
        memory.read(address)
    }

    /// バスサイクルを通知してから書く
    fn write_bus<M: MemoryBus>(&self, memory: &mut M, address: u16, value: u8) {
        memory.set_cycle(self.total_cycles + self.cycles as u64);
        memory.write(address, value);
    }

    /// PCから1バイトフェッチしてPCをインクリメント
    fn fetch_byte<M: MemoryBus>(&mut self, memory: &mut M) -> u8 {
        let value = self.read_bus(memory, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.cycles += 1;
        value
    }

    /// スタックに1バイトプッシュ
    fn push_byte<M: MemoryBus>(&mut self, memory: &mut M, value: u8) {
        self.write_bus(memory, 0x0100 | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    /// スタックから1バイトポップ
    fn pop_byte<M: MemoryBus>(&mut self, memory: &mut M) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        self.read_bus(memory, 0x0100 | self.regs.sp as u16)
    }

    /// スタックに2バイトプッシュ（上位バイト先）
    fn push_word<M: MemoryBus>(&mut self, memory: &mut M, value: u16) {
        self.push_byte(memory, (value >> 8) as u8);
        self.push_byte(memory, value as u8);
    }

    /// スタックから2バイトポップ
    fn pop_word<M: MemoryBus>(&mut self, memory: &mut M) -> u16 {
        let low = self.pop_byte(memory) as u16;
        let high = self.pop_byte(memory) as u16;
        (high << 8) | low
    }

    /// 状態を保存（PC, SP, A, X, Y, P, サイクル）
    pub fn save(&self, w: &mut StateWriter) {
        w.write_u16(self.regs.pc);
        w.write_u8(self.regs.sp);
        w.write_u8(self.regs.a);
        w.write_u8(self.regs.x);
        w.write_u8(self.regs.y);
        w.write_u8(self.regs.status);
        w.write_u64(self.total_cycles);
    }

    /// 状態を復元
    pub fn load(&mut self, r: &mut StateReader) -> Result<()> {
        self.regs.pc = r.read_u16()?;
        self.regs.sp = r.read_u8()?;
        self.regs.a = r.read_u8()?;
        self.regs.x = r.read_u8()?;
        self.regs.y = r.read_u8()?;
        self.regs.status = r.read_u8()?;
        self.total_cycles = r.read_u64()?;
        Ok(())
    }

    /// オペコードを実行
    fn execute_opcode<M: MemoryBus>(&mut self, memory: &mut M, opcode: u8, pc: u16) -> Result<()> {
        match opcode {
            // LDA / LDX / LDY
            0xA9 => self.lda(memory, Immediate),
            0xA5 => self.lda(memory, ZeroPage),
            0xB5 => self.lda(memory, ZeroPageX),
            0xAD => self.lda(memory, Absolute),
            0xBD => self.lda(memory, AbsoluteX),
            0xB9 => self.lda(memory, AbsoluteY),
            0xA1 => self.lda(memory, IndirectX),
            0xB1 => self.lda(memory, IndirectY),
            0xA2 => self.ldx(memory, Immediate),
            0xA6 => self.ldx(memory, ZeroPage),
            0xB6 => self.ldx(memory, ZeroPageY),
            0xAE => self.ldx(memory, Absolute),
            0xBE => self.ldx(memory, AbsoluteY),
            0xA0 => self.ldy(memory, Immediate),
            0xA4 => self.ldy(memory, ZeroPage),
            0xB4 => self.ldy(memory, ZeroPageX),
            0xAC => self.ldy(memory, Absolute),
            0xBC => self.ldy(memory, AbsoluteX),

            // STA / STX / STY
            0x85 => self.sta(memory, ZeroPage),
            0x95 => self.sta(memory, ZeroPageX),
            0x8D => self.sta(memory, Absolute),
            0x9D => self.sta(memory, AbsoluteX),
            0x99 => self.sta(memory, AbsoluteY),
            0x81 => self.sta(memory, IndirectX),
            0x91 => self.sta(memory, IndirectY),
            0x86 => self.stx(memory, ZeroPage),
            0x96 => self.stx(memory, ZeroPageY),
            0x8E => self.stx(memory, Absolute),
            0x84 => self.sty(memory, ZeroPage),
            0x94 => self.sty(memory, ZeroPageX),
            0x8C => self.sty(memory, Absolute),

            // Transfer Instructions
            0xAA => self.tax(),
            0x8A => self.txa(),
            0xA8 => self.tay(),
            0x98 => self.tya(),
            0xBA => self.tsx(),
            0x9A => self.txs(),

            // Stack Instructions
            0x48 => self.pha(memory),
            0x68 => self.pla(memory),
            0x08 => self.php(memory),
            0x28 => self.plp(memory),

            // ADC / SBC
            0x69 => self.adc(memory, Immediate),
            0x65 => self.adc(memory, ZeroPage),
            0x75 => self.adc(memory, ZeroPageX),
            0x6D => self.adc(memory, Absolute),
            0x7D => self.adc(memory, AbsoluteX),
            0x79 => self.adc(memory, AbsoluteY),
            0x61 => self.adc(memory, IndirectX),
            0x71 => self.adc(memory, IndirectY),
            0xE9 => self.sbc(memory, Immediate),
            0xE5 => self.sbc(memory, ZeroPage),
            0xF5 => self.sbc(memory, ZeroPageX),
            0xED => self.sbc(memory, Absolute),
            0xFD => self.sbc(memory, AbsoluteX),
            0xF9 => self.sbc(memory, AbsoluteY),
            0xE1 => self.sbc(memory, IndirectX),
            0xF1 => self.sbc(memory, IndirectY),

            // Logical
            0x29 => self.and(memory, Immediate),
            0x25 => self.and(memory, ZeroPage),
            0x35 => self.and(memory, ZeroPageX),
            0x2D => self.and(memory, Absolute),
            0x3D => self.and(memory, AbsoluteX),
            0x39 => self.and(memory, AbsoluteY),
            0x21 => self.and(memory, IndirectX),
            0x31 => self.and(memory, IndirectY),
            0x09 => self.ora(memory, Immediate),
            0x05 => self.ora(memory, ZeroPage),
            0x15 => self.ora(memory, ZeroPageX),
            0x0D => self.ora(memory, Absolute),
            0x1D => self.ora(memory, AbsoluteX),
            0x19 => self.ora(memory, AbsoluteY),
            0x01 => self.ora(memory, IndirectX),
            0x11 => self.ora(memory, IndirectY),
            0x49 => self.eor(memory, Immediate),
            0x45 => self.eor(memory, ZeroPage),
            0x55 => self.eor(memory, ZeroPageX),
            0x4D => self.eor(memory, Absolute),
            0x5D => self.eor(memory, AbsoluteX),
            0x59 => self.eor(memory, AbsoluteY),
            0x41 => self.eor(memory, IndirectX),
            0x51 => self.eor(memory, IndirectY),
            0x24 => self.bit(memory, ZeroPage),
            0x2C => self.bit(memory, Absolute),

            // Compare
            0xC9 => self.cmp(memory, Immediate),
            0xC5 => self.cmp(memory, ZeroPage),
            0xD5 => self.cmp(memory, ZeroPageX),
            0xCD => self.cmp(memory, Absolute),
            0xDD => self.cmp(memory, AbsoluteX),
            0xD9 => self.cmp(memory, AbsoluteY),
            0xC1 => self.cmp(memory, IndirectX),
            0xD1 => self.cmp(memory, IndirectY),
            0xE0 => self.cpx(memory, Immediate),
            0xE4 => self.cpx(memory, ZeroPage),
            0xEC => self.cpx(memory, Absolute),
            0xC0 => self.cpy(memory, Immediate),
            0xC4 => self.cpy(memory, ZeroPage),
            0xCC => self.cpy(memory, Absolute),

            // Increment/Decrement
            0xE6 => self.inc(memory, ZeroPage),
            0xF6 => self.inc(memory, ZeroPageX),
            0xEE => self.inc(memory, Absolute),
            0xFE => self.inc(memory, AbsoluteX),
            0xC6 => self.dec(memory, ZeroPage),
            0xD6 => self.dec(memory, ZeroPageX),
            0xCE => self.dec(memory, Absolute),
            0xDE => self.dec(memory, AbsoluteX),
            0xE8 => self.inx(),
            0xC8 => self.iny(),
            0xCA => self.dex(),
            0x88 => self.dey(),

            // Shifts
            0x0A => self.asl_accumulator(),
            0x06 => self.asl(memory, ZeroPage),
            0x16 => self.asl(memory, ZeroPageX),
            0x0E => self.asl(memory, Absolute),
            0x1E => self.asl(memory, AbsoluteX),
            0x4A => self.lsr_accumulator(),
            0x46 => self.lsr(memory, ZeroPage),
            0x56 => self.lsr(memory, ZeroPageX),
            0x4E => self.lsr(memory, Absolute),
            0x5E => self.lsr(memory, AbsoluteX),
            0x2A => self.rol_accumulator(),
            0x26 => self.rol(memory, ZeroPage),
            0x36 => self.rol(memory, ZeroPageX),
            0x2E => self.rol(memory, Absolute),
            0x3E => self.rol(memory, AbsoluteX),
            0x6A => self.ror_accumulator(),
            0x66 => self.ror(memory, ZeroPage),
            0x76 => self.ror(memory, ZeroPageX),
            0x6E => self.ror(memory, Absolute),
            0x7E => self.ror(memory, AbsoluteX),

            // Branch Instructions
            0x10 => { let c = !self.regs.get_flag(flags::NEGATIVE); self.branch(memory, c) }
            0x30 => { let c = self.regs.get_flag(flags::NEGATIVE); self.branch(memory, c) }
            0x50 => { let c = !self.regs.get_flag(flags::OVERFLOW); self.branch(memory, c) }
            0x70 => { let c = self.regs.get_flag(flags::OVERFLOW); self.branch(memory, c) }
            0x90 => { let c = !self.regs.get_flag(flags::CARRY); self.branch(memory, c) }
            0xB0 => { let c = self.regs.get_flag(flags::CARRY); self.branch(memory, c) }
            0xD0 => { let c = !self.regs.get_flag(flags::ZERO); self.branch(memory, c) }
            0xF0 => { let c = self.regs.get_flag(flags::ZERO); self.branch(memory, c) }

            // Jump/Call
            0x4C => self.jmp_absolute(memory),
            0x6C => self.jmp_indirect(memory),
            0x20 => self.jsr(memory),
            0x60 => self.rts(memory),

            // Interrupts
            0x00 => self.brk(memory),
            0x40 => self.rti(memory),

            // Flag Instructions
            0x18 => self.flag_op(flags::CARRY, false),
            0x38 => self.flag_op(flags::CARRY, true),
            0x58 => self.flag_op(flags::IRQ_DISABLE, false),
            0x78 => self.flag_op(flags::IRQ_DISABLE, true),
            0xB8 => self.flag_op(flags::OVERFLOW, false),
            0xD8 => self.flag_op(flags::DECIMAL, false),
            0xF8 => self.flag_op(flags::DECIMAL, true),

            // NOP
            0xEA => self.cycles += 1,

            // 未定義オペコード
            _ => match self.illegal_policy {
                IllegalOpcodePolicy::Fatal => {
                    self.regs.pc = pc;
                    return Err(EmuError::IllegalOpcode { opcode, pc });
                }
                IllegalOpcodePolicy::Nop => self.illegal_nop(memory, opcode),
            },
        }
        Ok(())
    }

    /// 未定義オペコードのアドレッシングモード（NMOSの列配置に従う）
    pub(crate) fn illegal_mode(opcode: u8) -> AddressingMode {
        match opcode & 0x1F {
            0x00 | 0x09 | 0x0B => Immediate,
            0x02 if matches!(opcode, 0x82 | 0xC2 | 0xE2) => Immediate,
            0x01 | 0x03 => IndirectX,
            0x04..=0x07 => ZeroPage,
            0x0C..=0x0F => Absolute,
            0x11 | 0x13 => IndirectY,
            0x16 | 0x17 if matches!(opcode, 0x96 | 0x97 | 0xB6 | 0xB7) => ZeroPageY,
            0x14..=0x17 => ZeroPageX,
            0x19 | 0x1B => AbsoluteY,
            0x1E | 0x1F if matches!(opcode, 0x9E | 0x9F | 0xBE | 0xBF) => AbsoluteY,
            0x1C..=0x1F => AbsoluteX,
            _ => Implied,
        }
    }
}
