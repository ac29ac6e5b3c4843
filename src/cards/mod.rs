//! 拡張スロットカード
//!
//! カードはマシンへの逆参照を持たない。ソフトスイッチのアクセスごとに
//! `CardBus`（MMU、現在のサイクル、高速化要求カウンタ）を受け取る。

pub mod disk2;
pub mod harddisk;
pub mod language;
mod sequencer;

use std::any::Any;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::memory::Mmu;
use crate::savestate::{StateReader, StateWriter};

pub use disk2::DiskIICard;
pub use harddisk::HardDiskCard;
pub use language::LanguageCard;

/// カードがアクセスできるマシンの能力
pub struct CardBus<'a> {
    pub mmu: &'a mut Mmu,
    /// 現在のCPUサイクル
    pub cycles: u64,
    /// ペーシング解除要求の数（モーターON中のドライブ等）
    pub fast_requests: &'a mut u32,
}

impl CardBus<'_> {
    /// 高速化を要求
    pub fn request_fast(&mut self) {
        *self.fast_requests += 1;
    }

    /// 高速化要求を取り下げ
    pub fn release_fast(&mut self) {
        *self.fast_requests = self.fast_requests.saturating_sub(1);
    }
}

/// スロットカード
pub trait Card {
    fn name(&self) -> &'static str;

    /// 状態表示用のキーと値
    fn info(&self) -> BTreeMap<String, String>;

    /// スロットへ挿入（ROM・RAMのマッピング）
    fn insert(&mut self, bus: &mut CardBus, slot: u8) -> Result<()>;

    /// $C080 + slot*16 + reg の読み込み
    fn read_switch(&mut self, reg: u8, bus: &mut CardBus) -> u8;

    /// $C080 + slot*16 + reg への書き込み
    fn write_switch(&mut self, reg: u8, value: u8, bus: &mut CardBus);

    fn save(&self, w: &mut StateWriter);

    fn load(&mut self, r: &mut StateReader, bus: &mut CardBus) -> Result<()>;

    /// 未書き戻しのデータをホストへ
    fn flush(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
