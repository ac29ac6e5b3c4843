//! Apple II メモリサブシステム
//!
//! 64KBの空間を256ページに分割し、ページごとに読み込み用と書き込み用の
//! ハンドラを独立に持つ。ハンドラはMMUが所有するストレージブロックを
//! (ブロックID, ブロック内ページ) で参照する。$C0ページ（I/O）は
//! バス側で横取りされるため、ここではマーカーとしてのみ存在する。

use crate::error::{EmuError, Result};
use crate::savestate::{StateReader, StateWriter};

/// ストレージブロックの識別子
pub type BlockId = usize;

/// 割り当てのないページから読んだ値
pub const ABSENT_READ: u8 = 0xF4;
/// 未割り当てハンドラ（Unassigned）から読んだ値
pub const UNASSIGNED_READ: u8 = 0xDD;
/// I/Oページ番号
pub const IO_PAGE: u8 = 0xC0;

/// ページハンドラ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageHandler {
    /// 読み書き可能なRAM
    Ram { block: BlockId, page: u16 },
    /// ROM（書き込みは無視）
    Rom { block: BlockId, page: u16 },
    /// テキスト画面RAM（書き込みでダーティビットを立てる）
    TextRam { block: BlockId, page: u16 },
    /// 未割り当て（$DDを返す）
    Unassigned,
    /// I/Oページ（$C0xx）
    Io,
}

impl PageHandler {
    /// `n`ページ先を指すハンドラ
    pub fn offset(self, n: u16) -> PageHandler {
        match self {
            PageHandler::Ram { block, page } => PageHandler::Ram { block, page: page + n },
            PageHandler::Rom { block, page } => PageHandler::Rom { block, page: page + n },
            PageHandler::TextRam { block, page } => PageHandler::TextRam { block, page: page + n },
            other => other,
        }
    }

    fn encode(handler: Option<PageHandler>, w: &mut StateWriter) {
        let (tag, block, page) = match handler {
            None => (0u8, 0usize, 0u16),
            Some(PageHandler::Ram { block, page }) => (1, block, page),
            Some(PageHandler::Rom { block, page }) => (2, block, page),
            Some(PageHandler::TextRam { block, page }) => (3, block, page),
            Some(PageHandler::Unassigned) => (4, 0, 0),
            Some(PageHandler::Io) => (5, 0, 0),
        };
        w.write_u8(tag);
        w.write_u16(block as u16);
        w.write_u16(page);
    }

    fn decode(r: &mut StateReader) -> Result<Option<PageHandler>> {
        let tag = r.read_u8()?;
        let block = r.read_u16()? as BlockId;
        let page = r.read_u16()?;
        Ok(match tag {
            0 => None,
            1 => Some(PageHandler::Ram { block, page }),
            2 => Some(PageHandler::Rom { block, page }),
            3 => Some(PageHandler::TextRam { block, page }),
            4 => Some(PageHandler::Unassigned),
            5 => Some(PageHandler::Io),
            _ => return Err(EmuError::StateMismatch(format!("unknown page handler tag {}", tag))),
        })
    }
}

/// ストレージブロック
#[derive(Debug, Clone)]
struct MemoryBlock {
    name: String,
    data: Vec<u8>,
    rom: bool,
}

/// メモリ管理ユニット
#[derive(Debug, Clone)]
pub struct Mmu {
    blocks: Vec<MemoryBlock>,
    read_pages: [Option<PageHandler>; 256],
    write_pages: [Option<PageHandler>; 256],
    text_dirty: bool,
    /// 各スロットの$Cs00 ROM
    slot_roms: [Option<PageHandler>; 8],
    /// 各スロットの$C800拡張ROM（8ページ）
    expansion_roms: [Option<PageHandler>; 8],
    /// 現在$C800に見えている拡張ROMのスロット
    active_expansion: Option<u8>,
    /// //e 内蔵ROMの$C000相当ページ
    internal_rom: Option<PageHandler>,
    /// INTCXROM（$C100-$CFFFを内蔵ROMに）
    intcxrom: bool,
    /// SLOTC3ROM（$C300をスロットROMに）
    slotc3rom: bool,
    /// $C3xxアクセスで内蔵$C800 ROMが選択された
    intc8rom: bool,
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

impl Mmu {
    pub fn new() -> Self {
        let mut read_pages = [None; 256];
        let mut write_pages = [None; 256];
        read_pages[IO_PAGE as usize] = Some(PageHandler::Io);
        write_pages[IO_PAGE as usize] = Some(PageHandler::Io);
        Mmu {
            blocks: Vec::new(),
            read_pages,
            write_pages,
            text_dirty: false,
            slot_roms: [None; 8],
            expansion_roms: [None; 8],
            active_expansion: None,
            internal_rom: None,
            intcxrom: false,
            slotc3rom: false,
            intc8rom: false,
        }
    }

    //--------------------------------------------------
    // ブロック管理
    //--------------------------------------------------

    /// ゼロ埋めのRAMブロックを追加
    pub fn add_ram_block(&mut self, name: &str, size: usize) -> BlockId {
        self.blocks.push(MemoryBlock { name: name.to_string(), data: vec![0; size], rom: false });
        self.blocks.len() - 1
    }

    /// ROMブロックを追加（ページ境界に切り上げ）
    pub fn add_rom_block(&mut self, name: &str, data: &[u8]) -> BlockId {
        let mut data = data.to_vec();
        data.resize((data.len() + 0xFF) & !0xFF, 0);
        self.blocks.push(MemoryBlock { name: name.to_string(), data, rom: true });
        self.blocks.len() - 1
    }

    pub fn block(&self, id: BlockId) -> &[u8] {
        &self.blocks[id].data
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut [u8] {
        &mut self.blocks[id].data
    }

    pub fn block_name(&self, id: BlockId) -> &str {
        &self.blocks[id].name
    }

    //--------------------------------------------------
    // ページテーブル
    //--------------------------------------------------

    /// `begin`..=`end`ページの読み込みハンドラを設定（ハンドラのページは連番で進む）
    pub fn set_pages_read(&mut self, begin: u8, end: u8, handler: PageHandler) {
        for (i, page) in (begin..=end).enumerate() {
            self.read_pages[page as usize] = Some(handler.offset(i as u16));
        }
    }

    /// `begin`..=`end`ページの書き込みハンドラを設定
    pub fn set_pages_write(&mut self, begin: u8, end: u8, handler: PageHandler) {
        for (i, page) in (begin..=end).enumerate() {
            self.write_pages[page as usize] = Some(handler.offset(i as u16));
        }
    }

    pub fn read_handler(&self, page: u8) -> Option<PageHandler> {
        self.read_pages[page as usize]
    }

    pub fn write_handler(&self, page: u8) -> Option<PageHandler> {
        self.write_pages[page as usize]
    }

    //--------------------------------------------------
    // アクセス
    //--------------------------------------------------

    /// 副作用つき読み込み（$CFFFフック・拡張ROM選択を含む）
    pub fn peek(&mut self, addr: u16) -> u8 {
        self.pre_access(addr);
        self.read_with(self.read_pages[(addr >> 8) as usize], addr)
    }

    /// 副作用つき書き込み
    pub fn poke(&mut self, addr: u16, value: u8) {
        self.pre_access(addr);
        match self.write_pages[(addr >> 8) as usize] {
            Some(PageHandler::Ram { block, page }) => {
                self.blocks[block].data[Self::offset(page, addr)] = value;
            }
            Some(PageHandler::TextRam { block, page }) => {
                self.blocks[block].data[Self::offset(page, addr)] = value;
                self.text_dirty = true;
            }
            _ => {}
        }
    }

    /// 副作用なしの読み込み（ビデオ・デバッガ用）
    pub fn internal_peek(&self, addr: u16) -> u8 {
        self.read_with(self.read_pages[(addr >> 8) as usize], addr)
    }

    /// ロード時専用: 読み込みハンドラの先（ROMを含む）へ直接書き込む
    pub fn burn(&mut self, addr: u16, value: u8) {
        if let Some(
            PageHandler::Ram { block, page }
            | PageHandler::Rom { block, page }
            | PageHandler::TextRam { block, page },
        ) = self.read_pages[(addr >> 8) as usize]
        {
            self.blocks[block].data[Self::offset(page, addr)] = value;
        }
    }

    fn offset(page: u16, addr: u16) -> usize {
        ((page as usize) << 8) | (addr & 0xFF) as usize
    }

    fn read_with(&self, handler: Option<PageHandler>, addr: u16) -> u8 {
        match handler {
            Some(
                PageHandler::Ram { block, page }
                | PageHandler::Rom { block, page }
                | PageHandler::TextRam { block, page },
            ) => self.blocks[block].data[Self::offset(page, addr)],
            Some(PageHandler::Unassigned) => UNASSIGNED_READ,
            // I/Oページはバスが処理する
            Some(PageHandler::Io) => 0,
            None => ABSENT_READ,
        }
    }

    fn pre_access(&mut self, addr: u16) {
        if addr == 0xCFFF {
            self.reset_expansion_rom();
        } else if (0xC100..0xC800).contains(&addr) {
            self.select_expansion_rom(((addr >> 8) & 0x07) as u8);
        }
    }

    /// テキスト画面が書き換えられたかを取得してクリア
    pub fn take_text_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.text_dirty, false)
    }

    //--------------------------------------------------
    // スロットROM / 拡張ROM / //e 内蔵ROM
    //--------------------------------------------------

    /// スロットの$Cs00 ROMを登録
    pub fn set_slot_rom(&mut self, slot: u8, handler: PageHandler) {
        self.slot_roms[(slot & 7) as usize] = Some(handler);
        self.remap_cx_roms();
    }

    /// スロットの$C800-$CFFF拡張ROM（8ページ）を登録
    pub fn set_expansion_rom(&mut self, slot: u8, handler: PageHandler) {
        self.expansion_roms[(slot & 7) as usize] = Some(handler);
    }

    /// //e の16KB ROMの$C000ページを内蔵ROMとして登録
    pub fn set_internal_rom(&mut self, handler: PageHandler) {
        self.internal_rom = Some(handler);
        self.remap_cx_roms();
    }

    pub fn has_internal_rom(&self) -> bool {
        self.internal_rom.is_some()
    }

    /// INTCXROM切り替え
    pub fn set_intcxrom(&mut self, on: bool) {
        if self.intcxrom != on {
            self.intcxrom = on;
            self.remap_cx_roms();
        }
    }

    /// SLOTC3ROM切り替え
    pub fn set_slotc3rom(&mut self, on: bool) {
        if self.slotc3rom != on {
            self.slotc3rom = on;
            self.remap_cx_roms();
        }
    }

    pub fn intcxrom(&self) -> bool {
        self.intcxrom
    }

    pub fn slotc3rom(&self) -> bool {
        self.slotc3rom
    }

    /// 現在$C800に見えている拡張ROMのスロット
    pub fn active_expansion(&self) -> Option<u8> {
        self.active_expansion
    }

    /// $CFFFアクセス: $C800-$CFFEの拡張ROMを外す（INTCXROM時は何もしない）
    pub fn reset_expansion_rom(&mut self) {
        if self.intcxrom {
            return;
        }
        self.active_expansion = None;
        self.intc8rom = false;
        self.remap_c8_roms();
    }

    /// $Cs00アクセス: スロットsの拡張ROMを$C800へ
    fn select_expansion_rom(&mut self, slot: u8) {
        if self.intcxrom {
            return;
        }
        if slot == 3 && !self.slotc3rom && self.internal_rom.is_some() {
            if !self.intc8rom {
                self.intc8rom = true;
                self.remap_c8_roms();
            }
        } else if self.expansion_roms[slot as usize].is_some()
            && self.active_expansion != Some(slot)
        {
            self.active_expansion = Some(slot);
            self.remap_c8_roms();
        }
    }

    fn remap_cx_roms(&mut self) {
        for slot in 1..8u8 {
            let page = IO_PAGE + slot;
            let internal = self.internal_rom.filter(|_| {
                self.intcxrom || (slot == 3 && !self.slotc3rom)
            });
            let handler = match internal {
                Some(rom) => rom.offset(slot as u16),
                None => self.slot_roms[slot as usize].unwrap_or(PageHandler::Unassigned),
            };
            self.read_pages[page as usize] = Some(handler);
            self.write_pages[page as usize] = Some(handler);
        }
        self.remap_c8_roms();
    }

    fn remap_c8_roms(&mut self) {
        let internal = self.internal_rom.filter(|_| self.intcxrom || self.intc8rom);
        let handler = match (internal, self.active_expansion) {
            (Some(rom), _) => rom.offset(8),
            (None, Some(slot)) => self.expansion_roms[slot as usize].unwrap_or(PageHandler::Unassigned),
            (None, None) => PageHandler::Unassigned,
        };
        self.set_pages_read(0xC8, 0xCF, handler);
        self.set_pages_write(0xC8, 0xCF, handler);
    }

    //--------------------------------------------------
    // RAMクリア / セーブステート
    //--------------------------------------------------

    /// 全RAMブロックをゼロクリア
    pub fn wipe_ram(&mut self) {
        for block in self.blocks.iter_mut().filter(|b| !b.rom) {
            block.data.fill(0);
        }
    }

    pub fn save(&self, w: &mut StateWriter) {
        let ram: Vec<&MemoryBlock> = self.blocks.iter().filter(|b| !b.rom).collect();
        w.write_u16(ram.len() as u16);
        for block in ram {
            w.write_bytes(&block.data);
        }
        for page in 0..256 {
            PageHandler::encode(self.read_pages[page], w);
            PageHandler::encode(self.write_pages[page], w);
        }
        w.write_bool(self.text_dirty);
        w.write_bool(self.intcxrom);
        w.write_bool(self.slotc3rom);
        w.write_bool(self.intc8rom);
        w.write_u8(self.active_expansion.unwrap_or(0xFF));
    }

    pub fn load(&mut self, r: &mut StateReader) -> Result<()> {
        let count = r.read_u16()? as usize;
        let ram_count = self.blocks.iter().filter(|b| !b.rom).count();
        if count != ram_count {
            return Err(EmuError::StateMismatch(format!(
                "{} RAM blocks saved, machine has {}",
                count, ram_count
            )));
        }
        for block in self.blocks.iter_mut().filter(|b| !b.rom) {
            r.read_bytes_into(&mut block.data)?;
        }
        let mut read_pages = [None; 256];
        let mut write_pages = [None; 256];
        for page in 0..256 {
            read_pages[page] = self.checked(PageHandler::decode(r)?)?;
            write_pages[page] = self.checked(PageHandler::decode(r)?)?;
        }
        let text_dirty = r.read_bool()?;
        let intcxrom = r.read_bool()?;
        let slotc3rom = r.read_bool()?;
        let intc8rom = r.read_bool()?;
        let active_expansion = match r.read_u8()? {
            0xFF => None,
            slot @ 0..=7 => Some(slot),
            slot => {
                return Err(EmuError::StateMismatch(format!("expansion ROM slot {} out of range", slot)));
            }
        };

        self.read_pages = read_pages;
        self.write_pages = write_pages;
        self.text_dirty = text_dirty;
        self.intcxrom = intcxrom;
        self.slotc3rom = slotc3rom;
        self.intc8rom = intc8rom;
        self.active_expansion = active_expansion;
        Ok(())
    }

    /// 復元したハンドラがこのMMUのブロック内を指しているか確かめる
    fn checked(&self, handler: Option<PageHandler>) -> Result<Option<PageHandler>> {
        if let Some(
            PageHandler::Ram { block, page }
            | PageHandler::Rom { block, page }
            | PageHandler::TextRam { block, page },
        ) = handler
        {
            let len = self.blocks.get(block).map_or(0, |b| b.data.len());
            if (page as usize + 1) * 0x100 > len {
                return Err(EmuError::StateMismatch(format!(
                    "page handler points outside block {} (page {})",
                    block, page
                )));
            }
        }
        Ok(handler)
    }
}
