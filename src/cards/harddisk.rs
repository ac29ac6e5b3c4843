//! ProDOSブロックデバイスカード（.po / .hdv / .2mg）
//!
//! スロットROMはProDOSのブロックデバイス規約どおりのシグネチャと
//! ドライバを持つ。ドライバは $C080+slot*16 へ書き込むだけで、
//! カードがゼロページ $42-$47 のコマンドを読み、バッファを直接転送する。
//!
//! レジスタ:
//! - +0 書き込み: コマンド実行
//! - +1 読み込み: エラーコード
//! - +2/+3 読み込み: ブロック数（下位/上位）

use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;

use crate::disk::twoimg::BLOCK_SIZE;
use crate::disk::BlockDisk;
use crate::error::{EmuError, Result};
use crate::memory::PageHandler;
use crate::savestate::{StateReader, StateWriter};

use super::{Card, CardBus};

/// ユニット数（ドライブ1/2）
pub const UNITS: usize = 2;

const CMD_STATUS: u8 = 0;
const CMD_READ: u8 = 1;
const CMD_WRITE: u8 = 2;
const CMD_FORMAT: u8 = 3;

pub const ERR_NONE: u8 = 0x00;
pub const ERR_BAD_COMMAND: u8 = 0x01;
pub const ERR_IO: u8 = 0x27;
pub const ERR_NO_DEVICE: u8 = 0x28;
pub const ERR_WRITE_PROTECTED: u8 = 0x2B;

/// ドライバ入口のオフセット
const DRIVER_OFFSET: u8 = 0x30;

/// スロットROM（256バイト）を組み立てる
fn slot_rom(slot: u8) -> [u8; 256] {
    let cn = 0xC0 | slot;
    let io = 0x80 + slot * 16;
    let mut rom = [0u8; 256];
    let boot: &[u8] = &[
        0xA2, 0x20, // LDX #$20
        0xA0, 0x00, // LDY #$00
        0xA2, 0x03, // LDX #$03
        0xA2, 0x3C, // LDX #$3C
        0xA9, CMD_READ, 0x85, 0x42, // LDA #READ / STA $42
        0xA9, slot << 4, 0x85, 0x43, // unit
        0xA9, 0x00, 0x85, 0x44, 0x85, 0x46, 0x85, 0x47, // バッファ下位・ブロック0
        0xA9, 0x08, 0x85, 0x45, // バッファ $0800
        0x20, DRIVER_OFFSET, cn, // JSR driver
        0xB0, 0x05, // BCS fail
        0xA2, slot << 4, // LDX #slot*16
        0x4C, 0x01, 0x08, // JMP $0801
        0x4C, 0x00, 0xE0, // fail: JMP $E000
    ];
    rom[..boot.len()].copy_from_slice(boot);
    let driver: &[u8] = &[
        0x8D, io, 0xC0, // STA $C0n0
        0xAD, io + 1, 0xC0, // LDA $C0n1
        0xAE, io + 2, 0xC0, // LDX $C0n2
        0xAC, io + 3, 0xC0, // LDY $C0n3
        0xC9, 0x01, // CMP #$01
        0x60, // RTS
    ];
    let at = DRIVER_OFFSET as usize;
    rom[at..at + driver.len()].copy_from_slice(driver);
    // $CnFC-$CnFF: ブロック数はSTATUSで問い合わせ、2ユニット・R/W/STATUS可
    rom[0xFE] = 0x17;
    rom[0xFF] = DRIVER_OFFSET;
    rom
}

/// ProDOSブロックデバイスカード
#[derive(Debug, Default)]
pub struct HardDiskCard {
    slot: u8,
    units: [Option<BlockDisk>; UNITS],
    error: u8,
    count: u16,
}

impl HardDiskCard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_volume(&mut self, unit: usize, disk: BlockDisk) -> Result<()> {
        let slot = self.units.get_mut(unit).ok_or(EmuError::InvalidDrive(unit))?;
        log::info!("Block device unit {}: {} blocks", unit + 1, disk.block_count());
        *slot = Some(disk);
        Ok(())
    }

    /// ファイルを開いて挿入
    pub fn load_volume<P: AsRef<Path>>(&mut self, unit: usize, path: P) -> Result<()> {
        if unit >= UNITS {
            return Err(EmuError::InvalidDrive(unit));
        }
        let disk = BlockDisk::open(path)?;
        self.insert_volume(unit, disk)
    }

    pub fn eject(&mut self, unit: usize) -> Option<BlockDisk> {
        self.units.get_mut(unit).and_then(Option::take)
    }

    pub fn volume(&self, unit: usize) -> Option<&BlockDisk> {
        self.units.get(unit).and_then(Option::as_ref)
    }

    /// 最後のコマンドのエラーコード
    pub fn last_error(&self) -> u8 {
        self.error
    }

    /// ゼロページのコマンドブロックを実行
    fn execute(&mut self, bus: &mut CardBus) {
        let mmu = &*bus.mmu;
        let command = mmu.internal_peek(0x42);
        let unit_byte = mmu.internal_peek(0x43);
        let buffer = u16::from_le_bytes([mmu.internal_peek(0x44), mmu.internal_peek(0x45)]);
        let block = u16::from_le_bytes([mmu.internal_peek(0x46), mmu.internal_peek(0x47)]) as u32;
        let unit = (unit_byte >> 7) as usize;

        self.count = 0;
        self.error = match self.units[unit].as_mut() {
            None => ERR_NO_DEVICE,
            Some(disk) => match command {
                CMD_STATUS => {
                    self.count = disk.block_count().min(0xFFFF) as u16;
                    if disk.is_read_only() { ERR_WRITE_PROTECTED } else { ERR_NONE }
                }
                CMD_READ => {
                    let mut data = [0u8; BLOCK_SIZE];
                    match disk.read_block(block, &mut data) {
                        Ok(()) => {
                            for (i, byte) in data.iter().enumerate() {
                                bus.mmu.poke(buffer.wrapping_add(i as u16), *byte);
                            }
                            ERR_NONE
                        }
                        Err(e) => {
                            log::warn!("Block read {} failed: {}", block, e);
                            ERR_IO
                        }
                    }
                }
                CMD_WRITE if disk.is_read_only() => ERR_WRITE_PROTECTED,
                CMD_WRITE => {
                    let mut data = [0u8; BLOCK_SIZE];
                    for (i, byte) in data.iter_mut().enumerate() {
                        *byte = bus.mmu.internal_peek(buffer.wrapping_add(i as u16));
                    }
                    match disk.write_block(block, &data) {
                        Ok(()) => ERR_NONE,
                        Err(e) => {
                            log::warn!("Block write {} failed: {}", block, e);
                            ERR_IO
                        }
                    }
                }
                CMD_FORMAT if disk.is_read_only() => ERR_WRITE_PROTECTED,
                CMD_FORMAT => ERR_NONE,
                _ => ERR_BAD_COMMAND,
            },
        };
        log::debug!(
            "Block device cmd={} unit={} block={} buf=${:04X} -> ${:02X}",
            command,
            unit + 1,
            block,
            buffer,
            self.error
        );
    }
}

impl Card for HardDiskCard {
    fn name(&self) -> &'static str {
        "ProDOS block device"
    }

    fn info(&self) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        for (i, unit) in self.units.iter().enumerate() {
            let value = unit.as_ref().map_or("(empty)".to_string(), |d| {
                format!("{} ({} blocks)", d.path().display(), d.block_count())
            });
            info.insert(format!("unit{}", i + 1), value);
        }
        info.insert("slot".to_string(), self.slot.to_string());
        info.insert("error".to_string(), format!("${:02X}", self.error));
        info
    }

    fn insert(&mut self, bus: &mut CardBus, slot: u8) -> Result<()> {
        if !(1..=7).contains(&slot) {
            return Err(EmuError::InvalidSlot(slot));
        }
        self.slot = slot;
        let block = bus.mmu.add_rom_block(&format!("Block device ROM (slot {})", slot), &slot_rom(slot));
        bus.mmu.set_slot_rom(slot, PageHandler::Rom { block, page: 0 });
        Ok(())
    }

    fn read_switch(&mut self, reg: u8, _bus: &mut CardBus) -> u8 {
        match reg & 0x0F {
            1 => self.error,
            2 => self.count as u8,
            3 => (self.count >> 8) as u8,
            _ => 0,
        }
    }

    fn write_switch(&mut self, reg: u8, _value: u8, bus: &mut CardBus) {
        if reg & 0x0F == 0 {
            self.execute(bus);
        }
    }

    fn save(&self, w: &mut StateWriter) {
        w.write_u8(self.error);
        w.write_u16(self.count);
    }

    fn load(&mut self, r: &mut StateReader, _bus: &mut CardBus) -> Result<()> {
        self.error = r.read_u8()?;
        self.count = r.read_u16()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
