//! Disk II コントローラ（P5 ROM + P6シーケンサ）と2台のドライブ
//!
//! - $C0s0-$C0s7: ステッパーのフェーズ（偶数OFF、奇数ON）
//! - $C0s8/9: モーターOFF/ON（ONの間は高速化を要求）
//! - $C0sA/B: ドライブ1/2選択
//! - $C0sC-$C0sF: Q6L/Q6H/Q7L/Q7H
//!
//! NIBトラックはバイト単位、WOZトラックはビット単位で読む。

use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;

use crate::disk::{Diskette, MAX_HALF_TRACK, NIB_TRACK_SIZE};
use crate::disk_log::{self, NibbleRing};
use crate::error::{EmuError, Result};
use crate::memory::PageHandler;
use crate::savestate::{StateReader, StateWriter};

use super::sequencer::Sequencer;
use super::{Card, CardBus};

/// P5 ROMのサイズ
pub const DISK_ROM_SIZE: usize = 256;

/// ドライブ数
pub const DRIVES: usize = 2;

/// ウィークビット乱数の既定シード
pub const DEFAULT_WEAK_BIT_SEED: u64 = 0x6502;

/// ディスクがないときのラッチ値
const EMPTY_LATCH: u8 = 0xFF;

/// 奇数アドレスの読み込み値（フローティングバス）
const FLOATING_BUS: u8 = 0xFF;

/// シーケンサーの動作（Q7, Q6）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequencerFunction {
    /// L L: 読み込み
    ReadSequencing,
    /// L H: ライトプロテクトのセンス
    CheckWriteProtect,
    /// H L: 書き込みモード解除
    ClearWriteMode,
    /// H H: 書き込みモード、CPU書き込みでラッチをロード
    DataLoadWrite,
}

/// ドライブ
#[derive(Debug, Default)]
struct Drive {
    diskette: Option<Diskette>,
    /// ハーフトラック位置（0-68）
    half_track: u8,
    /// 最後にONになったフェーズ（0-3）
    phase: u8,
    /// トラック内の位置（NIBはバイト、WOZはビット）
    position: usize,
}

impl Drive {
    /// NIBのトラック番号
    fn track(&self) -> usize {
        self.half_track as usize / 2
    }

    fn commit(&mut self) {
        if let Some(d) = self.diskette.as_mut() {
            d.commit();
        }
    }
}

/// Disk II インターフェースカード
pub struct DiskIICard {
    slot: u8,
    rom: Option<Vec<u8>>,
    drives: [Drive; DRIVES],
    curr_drive: usize,
    motor_on: bool,
    /// ONになっているフェーズのビット
    magnet_states: u8,
    q6: bool,
    q7: bool,
    write_mode: bool,
    latch: u8,
    /// モーターON中に高速化を要求する
    fast_disk: bool,
    sequencer: Sequencer,
    history: NibbleRing,
}

impl DiskIICard {
    /// P5 ROM（256バイト）を指定して作成。ROMなしではブートできない
    pub fn new(rom: Option<Vec<u8>>) -> Result<Self> {
        if let Some(rom) = &rom {
            if rom.len() != DISK_ROM_SIZE {
                return Err(EmuError::CardRomSize(rom.len()));
            }
        }
        Ok(DiskIICard {
            slot: 6,
            rom,
            drives: [Drive::default(), Drive::default()],
            curr_drive: 0,
            motor_on: false,
            magnet_states: 0,
            q6: false,
            q7: false,
            write_mode: false,
            latch: EMPTY_LATCH,
            fast_disk: true,
            sequencer: Sequencer::new(DEFAULT_WEAK_BIT_SEED),
            history: NibbleRing::default(),
        })
    }

    /// モーターON中にペーシングを外すか
    pub fn set_fast_disk(&mut self, on: bool) {
        self.fast_disk = on;
    }

    /// ウィークビットの乱数シード
    pub fn set_weak_bit_seed(&mut self, seed: u64) {
        self.sequencer = Sequencer::new(seed);
    }

    //--------------------------------------------------
    // ディスケット
    //--------------------------------------------------

    /// ドライブ（0/1）に挿入。前のディスケットは書き戻してから外す
    pub fn insert_diskette(&mut self, drive: usize, diskette: Diskette) -> Result<()> {
        let slot = self.drives.get_mut(drive).ok_or(EmuError::InvalidDrive(drive))?;
        slot.commit();
        log::info!("Drive {}: {}", drive + 1, diskette.name());
        slot.diskette = Some(diskette);
        slot.position = 0;
        Ok(())
    }

    /// ファイルを開いて挿入
    pub fn load_disk<P: AsRef<Path>>(&mut self, drive: usize, path: P) -> Result<()> {
        if drive >= DRIVES {
            return Err(EmuError::InvalidDrive(drive));
        }
        let diskette = Diskette::open(path)?;
        self.insert_diskette(drive, diskette)
    }

    /// 取り出し
    pub fn eject(&mut self, drive: usize) -> Option<Diskette> {
        let slot = self.drives.get_mut(drive)?;
        slot.commit();
        slot.diskette.take()
    }

    pub fn diskette(&self, drive: usize) -> Option<&Diskette> {
        self.drives.get(drive).and_then(|d| d.diskette.as_ref())
    }

    pub fn half_track(&self, drive: usize) -> u8 {
        self.drives.get(drive).map_or(0, |d| d.half_track)
    }

    pub fn selected_drive(&self) -> usize {
        self.curr_drive
    }

    pub fn is_motor_on(&self) -> bool {
        self.motor_on
    }

    pub fn is_write_mode(&self) -> bool {
        self.write_mode
    }

    /// 最近ラッチに入ったバイトをNIBBLEログへ
    pub fn dump_history(&self, n: usize) {
        self.history.dump(n);
    }

    //--------------------------------------------------
    // ソフトスイッチ
    //--------------------------------------------------

    fn access(&mut self, reg: u8, bus: &mut CardBus) {
        match reg {
            0x00..=0x07 => self.control_stepper(reg),
            0x08 => self.control_motor(false, bus),
            0x09 => self.control_motor(true, bus),
            0x0A => self.enable_drive(0),
            0x0B => self.enable_drive(1),
            0x0C => {
                // 現在のモードで1バイト読み書きしてからQ6を落とす
                self.read_write_nibble(bus.cycles);
                self.update_sequencer_function(reg);
            }
            _ => self.update_sequencer_function(reg),
        }
    }

    /// Q6/Q7の切り替えと、その状態での動作
    fn update_sequencer_function(&mut self, reg: u8) {
        match reg {
            0x0C => self.q6 = false,
            0x0D => self.q6 = true,
            0x0E => self.q7 = false,
            0x0F => self.q7 = true,
            _ => return,
        }
        let was_write = self.write_mode;
        match self.sequencer_function() {
            SequencerFunction::ReadSequencing => {}
            SequencerFunction::CheckWriteProtect => {
                self.load_write_protect();
                self.write_mode = false;
            }
            SequencerFunction::ClearWriteMode => self.write_mode = false,
            SequencerFunction::DataLoadWrite => self.write_mode = true,
        }
        if was_write != self.write_mode {
            disk_log::log_write_mode(self.write_mode);
        }
    }

    fn sequencer_function(&self) -> SequencerFunction {
        match (self.q7, self.q6) {
            (false, false) => SequencerFunction::ReadSequencing,
            (false, true) => SequencerFunction::CheckWriteProtect,
            (true, false) => SequencerFunction::ClearWriteMode,
            (true, true) => SequencerFunction::DataLoadWrite,
        }
    }

    /// ライトプロテクトをラッチのbit7へ
    fn load_write_protect(&mut self) {
        let protected = self.drives[self.curr_drive]
            .diskette
            .as_ref()
            .map_or(true, |d| d.is_write_protected());
        if protected {
            self.latch |= 0x80;
        } else {
            self.latch &= 0x7F;
        }
    }

    /// モーター制御
    fn control_motor(&mut self, on: bool, bus: &mut CardBus) {
        if on == self.motor_on {
            return;
        }
        self.motor_on = on;
        if on {
            self.sequencer.sync(bus.cycles);
            if self.fast_disk {
                bus.request_fast();
            }
            disk_log::log_motor_on(self.slot);
        } else {
            if self.fast_disk {
                bus.release_fast();
            }
            self.drives[self.curr_drive].commit();
            disk_log::log_motor_off(self.slot);
        }
    }

    /// ドライブ選択
    fn enable_drive(&mut self, drive: usize) {
        if drive != self.curr_drive {
            self.drives[self.curr_drive].commit();
            self.curr_drive = drive;
            disk_log::log_drive_select(drive);
        }
    }

    /// ステッパーモーター制御
    fn control_stepper(&mut self, reg: u8) {
        let phase = (reg >> 1) & 3;
        let phase_bit = 1u8 << phase;
        if reg & 1 == 0 {
            self.magnet_states &= !phase_bit;
            return;
        }
        self.magnet_states |= phase_bit;

        let drive = &mut self.drives[self.curr_drive];
        let old = drive.half_track;
        let new = match (phase + 4 - drive.phase) % 4 {
            1 | 2 => old.saturating_add(1).min(MAX_HALF_TRACK),
            3 => old.saturating_sub(1),
            _ => old,
        };
        drive.phase = phase;
        if new != old {
            self.change_track(old, new);
        }
    }

    /// ハーフトラック移動（汚れたトラックの書き戻しとWOZ位置の換算）
    fn change_track(&mut self, old: u8, new: u8) {
        let drive = &mut self.drives[self.curr_drive];
        drive.half_track = new;
        match drive.diskette.as_mut() {
            Some(Diskette::Nib(nib)) => {
                if old / 2 != new / 2 {
                    nib.commit();
                }
            }
            Some(Diskette::Woz(woz)) => {
                let old_bits = woz.bit_count(old);
                let new_bits = woz.bit_count(new);
                drive.position = if old_bits > 0 && new_bits > 0 {
                    drive.position * new_bits / old_bits
                } else {
                    0
                };
            }
            None => {}
        }
        disk_log::log_track_change(old, new);
    }

    /// $C0sCアクセス: 読み込みモードなら次のバイトをラッチへ、
    /// 書き込みモードならラッチを現在位置へ書く
    fn read_write_nibble(&mut self, cycles: u64) {
        if !self.motor_on {
            return;
        }
        let drive = &mut self.drives[self.curr_drive];
        let track = drive.track();
        match drive.diskette.as_mut() {
            None => self.latch = EMPTY_LATCH,
            Some(Diskette::Nib(nib)) => {
                let len = nib.track_len(track).max(1);
                if self.write_mode {
                    nib.write(track, drive.position, self.latch);
                } else {
                    self.latch = nib.read(track, drive.position);
                    self.history.push(self.latch);
                    disk_log::log_nibble(self.latch);
                }
                drive.position = (drive.position + 1) % len;
            }
            Some(Diskette::Woz(woz)) => {
                // 書き込みは捨てる
                if !self.write_mode {
                    let half_track = drive.half_track;
                    self.sequencer
                        .advance(cycles, woz.track(half_track), half_track, &mut drive.position);
                    self.latch = self.sequencer.latch();
                    if self.latch & 0x80 != 0 {
                        self.history.push(self.latch);
                    }
                }
            }
        }
    }

    fn flush_drives(&mut self) {
        for drive in self.drives.iter_mut() {
            drive.commit();
        }
    }
}

impl Card for DiskIICard {
    fn name(&self) -> &'static str {
        "Disk II"
    }

    fn info(&self) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        for (i, drive) in self.drives.iter().enumerate() {
            let name = drive.diskette.as_ref().map_or("(empty)".to_string(), |d| d.name().to_string());
            info.insert(format!("drive{}", i + 1), name);
            info.insert(
                format!("drive{}.track", i + 1),
                format!("{}{}", drive.half_track / 2, if drive.half_track % 2 == 1 { ".5" } else { "" }),
            );
        }
        info.insert("selected".to_string(), (self.curr_drive + 1).to_string());
        info.insert("motor".to_string(), if self.motor_on { "on" } else { "off" }.to_string());
        info.insert("mode".to_string(), if self.write_mode { "write" } else { "read" }.to_string());
        info.insert("latch".to_string(), format!("${:02X}", self.latch));
        info
    }

    fn insert(&mut self, bus: &mut CardBus, slot: u8) -> Result<()> {
        if !(1..=7).contains(&slot) {
            return Err(EmuError::InvalidSlot(slot));
        }
        self.slot = slot;
        match &self.rom {
            Some(rom) => {
                let block = bus.mmu.add_rom_block(&format!("Disk II ROM (slot {})", slot), rom);
                bus.mmu.set_slot_rom(slot, PageHandler::Rom { block, page: 0 });
            }
            None => log::warn!("Disk II in slot {} has no P5 ROM; it cannot boot", slot),
        }
        log::info!("Disk II installed in slot {}", slot);
        Ok(())
    }

    fn read_switch(&mut self, reg: u8, bus: &mut CardBus) -> u8 {
        self.access(reg & 0x0F, bus);
        // 偶数アドレスのみラッチを返す
        if reg & 1 == 0 { self.latch } else { FLOATING_BUS }
    }

    fn write_switch(&mut self, reg: u8, value: u8, bus: &mut CardBus) {
        self.access(reg & 0x0F, bus);
        if self.sequencer_function() == SequencerFunction::DataLoadWrite {
            self.latch = value;
        }
    }

    fn save(&self, w: &mut StateWriter) {
        w.write_u8(self.curr_drive as u8);
        w.write_bool(self.motor_on);
        w.write_u8(self.magnet_states);
        w.write_bool(self.q6);
        w.write_bool(self.q7);
        w.write_bool(self.write_mode);
        w.write_u8(self.latch);
        for drive in &self.drives {
            w.write_u8(drive.half_track);
            w.write_u8(drive.phase);
            w.write_u32(drive.position as u32);
        }
        self.sequencer.save(w);
    }

    fn load(&mut self, r: &mut StateReader, _bus: &mut CardBus) -> Result<()> {
        let drive = r.read_u8()? as usize;
        if drive >= DRIVES {
            return Err(EmuError::StateMismatch(format!("Disk II drive {}", drive)));
        }
        self.flush_drives();
        self.curr_drive = drive;
        self.motor_on = r.read_bool()?;
        self.magnet_states = r.read_u8()?;
        self.q6 = r.read_bool()?;
        self.q7 = r.read_bool()?;
        self.write_mode = r.read_bool()?;
        self.latch = r.read_u8()?;
        for drive in self.drives.iter_mut() {
            drive.half_track = r.read_u8()?.min(MAX_HALF_TRACK);
            drive.phase = r.read_u8()? & 3;
            drive.position = r.read_u32()? as usize;
            if let Some(Diskette::Nib(_)) = drive.diskette {
                drive.position %= NIB_TRACK_SIZE;
            }
        }
        self.sequencer.load(r)
    }

    fn flush(&mut self) {
        self.flush_drives();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::gcr::nib_encode_track;
    use crate::disk::woz::build_woz2;
    use crate::disk::{DiskFormat, DEFAULT_VOLUME, DOS_SECTOR_ORDER, DSK_SIZE, NIB_SIZE};
    use crate::memory::Mmu;

    struct Fixture {
        mmu: Mmu,
        fast: u32,
        cycles: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture { mmu: Mmu::new(), fast: 0, cycles: 0 }
        }

        fn bus(&mut self) -> CardBus<'_> {
            CardBus { mmu: &mut self.mmu, cycles: self.cycles, fast_requests: &mut self.fast }
        }
    }

    fn card_with(diskette: Option<Diskette>) -> (DiskIICard, Fixture) {
        let mut fx = Fixture::new();
        let mut card = DiskIICard::new(Some(vec![0xA2; DISK_ROM_SIZE])).unwrap();
        card.insert(&mut fx.bus(), 6).unwrap();
        if let Some(d) = diskette {
            card.insert_diskette(0, d).unwrap();
        }
        (card, fx)
    }

    fn dsk_diskette() -> Diskette {
        Diskette::from_bytes("test.dsk", DiskFormat::Dsk, &vec![0u8; DSK_SIZE], None).unwrap()
    }

    #[test]
    fn test_rom_size_checked() {
        assert!(matches!(DiskIICard::new(Some(vec![0; 100])), Err(EmuError::CardRomSize(100))));
    }

    #[test]
    fn test_slot_rom_mapped() {
        let (_card, mut fx) = card_with(None);
        assert_eq!(fx.mmu.peek(0xC600), 0xA2);
        assert_eq!(fx.mmu.peek(0xC6FF), 0xA2);
    }

    #[test]
    fn test_half_track_motion() {
        let (mut card, mut fx) = card_with(None);
        // フェーズ1,2,3,0 と順にONで4ハーフトラック前進
        for reg in [0x3, 0x5, 0x7, 0x1] {
            card.read_switch(reg, &mut fx.bus());
        }
        assert_eq!(card.half_track(0), 4);
        // 逆順で戻る
        for reg in [0x7, 0x5, 0x3, 0x1] {
            card.read_switch(reg, &mut fx.bus());
        }
        assert_eq!(card.half_track(0), 0);
        // 0では下に止まる
        card.read_switch(0x7, &mut fx.bus());
        assert_eq!(card.half_track(0), 0);
        // OFFは動かない
        card.read_switch(0x0, &mut fx.bus());
        assert_eq!(card.half_track(0), 0);
    }

    #[test]
    fn test_half_track_clamped_at_top() {
        let (mut card, mut fx) = card_with(None);
        let mut phase = 0u8;
        for _ in 0..100 {
            phase = (phase + 1) % 4;
            card.read_switch(phase * 2 + 1, &mut fx.bus());
        }
        assert_eq!(card.half_track(0), MAX_HALF_TRACK);
    }

    #[test]
    fn test_opposite_phase_steps_forward() {
        let (mut card, mut fx) = card_with(None);
        card.read_switch(0x5, &mut fx.bus()); // phase 0 -> 2
        assert_eq!(card.half_track(0), 1);
    }

    #[test]
    fn test_motor_requests_fast_mode() {
        let (mut card, mut fx) = card_with(None);
        card.read_switch(0x9, &mut fx.bus());
        card.read_switch(0x9, &mut fx.bus());
        assert_eq!(fx.fast, 1);
        card.read_switch(0x8, &mut fx.bus());
        assert_eq!(fx.fast, 0);
        card.set_fast_disk(false);
        card.read_switch(0x9, &mut fx.bus());
        assert_eq!(fx.fast, 0);
    }

    #[test]
    fn test_nib_read_sequence() {
        let (mut card, mut fx) = card_with(Some(dsk_diskette()));
        card.read_switch(0x9, &mut fx.bus());
        card.read_switch(0xE, &mut fx.bus());
        let expected = nib_encode_track(&[0u8; 4096], DEFAULT_VOLUME, 0, &DOS_SECTOR_ORDER);
        let read: Vec<u8> = (0..64).map(|_| card.read_switch(0xC, &mut fx.bus())).collect();
        assert_eq!(&read[..], &expected[..64]);
    }

    #[test]
    fn test_write_protect_sense() {
        let nib = Diskette::from_bytes("x.nib", DiskFormat::Nib, &vec![0xFF; NIB_SIZE], None).unwrap();
        let (mut card, mut fx) = card_with(Some(nib));
        card.read_switch(0xD, &mut fx.bus());
        assert!(card.read_switch(0xE, &mut fx.bus()) & 0x80 != 0);

        let (mut card, mut fx) = card_with(Some(dsk_diskette()));
        card.read_switch(0xD, &mut fx.bus());
        assert_eq!(card.read_switch(0xE, &mut fx.bus()) & 0x80, 0);
    }

    #[test]
    fn test_write_mode_stores_latch() {
        let (mut card, mut fx) = card_with(Some(dsk_diskette()));
        card.read_switch(0x9, &mut fx.bus());
        // Q6H, Q7H（書き込み + ラッチロード）
        card.read_switch(0xD, &mut fx.bus());
        card.write_switch(0xF, 0xD5, &mut fx.bus());
        assert!(card.is_write_mode());
        card.read_switch(0xC, &mut fx.bus());
        assert!(!card.is_write_mode());
        card.write_switch(0xD, 0xAA, &mut fx.bus());
        card.read_switch(0xC, &mut fx.bus());

        match card.diskette(0) {
            Some(Diskette::Nib(nib)) => {
                assert_eq!(nib.read(0, 0), 0xD5);
                assert_eq!(nib.read(0, 1), 0xAA);
                assert_eq!(nib.dirty_track(), Some(0));
            }
            _ => panic!("expected NIB diskette"),
        }
    }

    #[test]
    fn test_woz_stream_finds_address_fields() {
        let nib = nib_encode_track(&[0u8; 4096], DEFAULT_VOLUME, 0, &DOS_SECTOR_ORDER);
        let woz = Diskette::from_bytes("t.woz", DiskFormat::Woz, &build_woz2(&[nib]), None).unwrap();
        let (mut card, mut fx) = card_with(Some(woz));
        card.read_switch(0x9, &mut fx.bus());
        card.read_switch(0xE, &mut fx.bus());

        // 1回転分（6656バイト × 32サイクル）を8サイクルごとにポーリング
        let mut bytes = Vec::new();
        let mut last = 0u8;
        while fx.cycles < 6656 * 32 {
            fx.cycles += 8;
            let value = card.read_switch(0xC, &mut fx.bus());
            if value & 0x80 != 0 && last & 0x80 == 0 {
                bytes.push(value);
            }
            last = value;
        }
        let prologues = bytes.windows(3).filter(|w| **w == [0xD5, 0xAA, 0x96]).count();
        assert!(prologues >= 16, "found {} address prologues", prologues);
    }

    #[test]
    fn test_save_load_round_trip() {
        let (mut card, mut fx) = card_with(Some(dsk_diskette()));
        card.read_switch(0x9, &mut fx.bus());
        card.read_switch(0x3, &mut fx.bus());
        card.read_switch(0xB, &mut fx.bus());
        let mut w = StateWriter::new();
        card.save(&mut w);

        let (mut other, mut fx2) = card_with(Some(dsk_diskette()));
        other.load(&mut StateReader::new(w.into_inner()), &mut fx2.bus()).unwrap();
        assert_eq!(other.half_track(0), 1);
        assert_eq!(other.selected_drive(), 1);
        assert!(other.is_motor_on());
    }
}
