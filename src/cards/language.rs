//! Language Card（16KB）とSaturn 128K
//!
//! RAMブロックの並び（16KB単位）:
//! - ページ 0-15: $D000 バンク1
//! - ページ 16-31: $D000 バンク2
//! - ページ 32-63: $E000-$FFFF
//!
//! Saturnは16KBブロックを8つ持ち、$C084-$C087/$C08C-$C08Fでブロックを選ぶ。

use std::any::Any;
use std::collections::BTreeMap;

use crate::error::{EmuError, Result};
use crate::memory::{BlockId, PageHandler};
use crate::savestate::{StateReader, StateWriter};

use super::{Card, CardBus};

const BANK_PAGES: u16 = 64;
const BANK1_PAGE: u16 = 0;
const BANK2_PAGE: u16 = 16;
const HIGH_PAGE: u16 = 32;

/// Saturnのブロック数
pub const SATURN_BLOCKS: u8 = 8;

/// Language Card / Saturn
#[derive(Debug, Clone)]
pub struct LanguageCard {
    /// 16KBブロック数（1 = Language Card、8 = Saturn）
    blocks: u8,
    /// 現在のブロック
    block: u8,
    ram: Option<BlockId>,
    /// 挿入時の$D000-$FFFFの読み込み/書き込みハンドラ（ROM）
    rom_read: [Option<PageHandler>; 48],
    rom_write: [Option<PageHandler>; 48],
    lc_bank2: bool,
    lc_read_enable: bool,
    lc_write_enable: bool,
    /// 連続した奇数アドレス読み込みの数
    lc_prewrite: u8,
}

impl Default for LanguageCard {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageCard {
    /// 16KB Language Card
    pub fn new() -> Self {
        Self::with_blocks(1)
    }

    /// Saturn 128K
    pub fn saturn() -> Self {
        Self::with_blocks(SATURN_BLOCKS)
    }

    fn with_blocks(blocks: u8) -> Self {
        LanguageCard {
            blocks,
            block: 0,
            ram: None,
            rom_read: [None; 48],
            rom_write: [None; 48],
            lc_bank2: true,
            lc_read_enable: false,
            lc_write_enable: false,
            lc_prewrite: 0,
        }
    }

    pub fn is_saturn(&self) -> bool {
        self.blocks > 1
    }

    pub fn read_enabled(&self) -> bool {
        self.lc_read_enable
    }

    pub fn write_enabled(&self) -> bool {
        self.lc_write_enable
    }

    pub fn bank2(&self) -> bool {
        self.lc_bank2
    }

    pub fn current_block(&self) -> u8 {
        self.block
    }

    /// レジスタアクセス共通部
    fn access(&mut self, reg: u8, write: bool, bus: &mut CardBus) {
        let reg = reg & 0x0F;
        if reg & 0x04 != 0 {
            if self.is_saturn() {
                self.block = ((reg & 3) | ((reg >> 1) & 4)) % self.blocks;
                self.remap(bus);
                return;
            }
        }

        let action = reg & 0x03;
        self.lc_bank2 = reg & 0x08 == 0;
        self.lc_read_enable = action == 0 || action == 3;

        if reg & 0x01 == 0 {
            // 偶数アドレスは書き込み禁止
            self.lc_write_enable = false;
            self.lc_prewrite = 0;
        } else if write {
            self.lc_prewrite = 0;
        } else {
            self.lc_prewrite = self.lc_prewrite.saturating_add(1);
            if self.lc_prewrite >= 2 {
                self.lc_write_enable = true;
            }
        }
        self.remap(bus);
    }

    /// 現在の状態で$D000-$FFFFのハンドラを張り替える
    fn remap(&self, bus: &mut CardBus) {
        let Some(ram) = self.ram else {
            return;
        };
        let base = self.block as u16 * BANK_PAGES;
        let d000 = base + if self.lc_bank2 { BANK2_PAGE } else { BANK1_PAGE };
        for i in 0..48u16 {
            let page = 0xD0 + i as u8;
            let ram_page = if i < 16 { d000 + i } else { base + HIGH_PAGE + (i - 16) };
            let handler = PageHandler::Ram { block: ram, page: ram_page };
            let read = if self.lc_read_enable { Some(handler) } else { self.rom_read[i as usize] };
            let write = if self.lc_write_enable { Some(handler) } else { self.rom_write[i as usize] };
            if let Some(h) = read {
                bus.mmu.set_pages_read(page, page, h);
            }
            if let Some(h) = write {
                bus.mmu.set_pages_write(page, page, h);
            }
        }
    }
}

impl Card for LanguageCard {
    fn name(&self) -> &'static str {
        if self.is_saturn() { "Saturn 128K" } else { "Language Card" }
    }

    fn info(&self) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        info.insert("read".to_string(), if self.lc_read_enable { "RAM" } else { "ROM" }.to_string());
        info.insert("write".to_string(), if self.lc_write_enable { "RAM" } else { "none" }.to_string());
        info.insert("bank".to_string(), if self.lc_bank2 { "2" } else { "1" }.to_string());
        if self.is_saturn() {
            info.insert("block".to_string(), self.block.to_string());
        }
        info
    }

    fn insert(&mut self, bus: &mut CardBus, slot: u8) -> Result<()> {
        if slot > 7 {
            return Err(EmuError::InvalidSlot(slot));
        }
        for i in 0..48usize {
            let page = 0xD0 + i as u8;
            self.rom_read[i] = bus.mmu.read_handler(page);
            self.rom_write[i] = bus.mmu.write_handler(page);
        }
        let size = self.blocks as usize * BANK_PAGES as usize * 256;
        self.ram = Some(bus.mmu.add_ram_block(&format!("{} RAM (slot {})", self.name(), slot), size));
        self.remap(bus);
        log::info!("{} installed in slot {}", self.name(), slot);
        Ok(())
    }

    fn read_switch(&mut self, reg: u8, bus: &mut CardBus) -> u8 {
        self.access(reg, false, bus);
        0
    }

    fn write_switch(&mut self, reg: u8, _value: u8, bus: &mut CardBus) {
        self.access(reg, true, bus);
    }

    fn save(&self, w: &mut StateWriter) {
        w.write_u8(self.block);
        w.write_bool(self.lc_bank2);
        w.write_bool(self.lc_read_enable);
        w.write_bool(self.lc_write_enable);
        w.write_u8(self.lc_prewrite);
    }

    fn load(&mut self, r: &mut StateReader, bus: &mut CardBus) -> Result<()> {
        let block = r.read_u8()?;
        if block >= self.blocks {
            return Err(EmuError::StateMismatch(format!(
                "{} block {} out of range",
                self.name(),
                block
            )));
        }
        self.block = block;
        self.lc_bank2 = r.read_bool()?;
        self.lc_read_enable = r.read_bool()?;
        self.lc_write_enable = r.read_bool()?;
        self.lc_prewrite = r.read_u8()?;
        self.remap(bus);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
