//! I/Oページ（$C000-$C0FF）
//!
//! 読み込み用と書き込み用に256エントリずつのソフトスイッチ表を持ち、
//! 128バイトのデータ領域にラッチされた状態を保持する。
//! スロットカードのストリップ（$C080 + slot*16）はバス側へ委譲する。

use crate::error::Result;
use crate::memory::Mmu;
use crate::providers::{JoysticksProvider, KeyboardProvider, NoDevice, SpeakerProvider, VideoMode};
use crate::savestate::{StateReader, StateWriter};
use crate::softswitch as sw;

/// パドルタイマーの1目盛りあたりのサイクル数
const PADDLE_CYCLES_PER_UNIT: u64 = 11;

/// ソフトスイッチ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftSwitch {
    /// 未使用アドレス（読み込み0、書き込み無視）
    Unhandled,
    /// $C000 キーボードラッチ
    KeyLatch,
    /// $C010 キーボードストローブ
    KeyStrobe,
    /// $C030 スピーカー
    Speaker,
    /// アクセスでフラグをセット/クリア
    Toggle { flag: u8, on: bool },
    /// //e ステータス読み込み（bit7にフラグ）
    Status { flag: u8, invert: bool },
    /// $C061-$C063 ボタン
    Button(u8),
    /// $C064-$C067 パドルタイマー
    Paddle(u8),
    /// $C070 パドルトリガー
    PaddleTrigger,
    /// //e INTCXROM off/on（書き込みのみ）
    IntCxRom(bool),
    /// //e SLOTC3ROM off/on（書き込みのみ）
    SlotC3Rom(bool),
    /// スロットカードのレジスタ
    Card { slot: u8, reg: u8 },
}

/// I/O読み込みの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoAccess {
    /// I/Oページ内で処理済み
    Done(u8),
    /// カードへ委譲
    Card { slot: u8, reg: u8 },
}

/// I/Oページ
pub struct IoPage {
    read_table: [SoftSwitch; 256],
    write_table: [SoftSwitch; 256],
    /// ラッチされた状態（bit7 = on）
    pub data: [u8; 128],
    paddle_trigger_cycle: u64,
    keyboard: Box<dyn KeyboardProvider>,
    speaker: Box<dyn SpeakerProvider>,
    joysticks: Box<dyn JoysticksProvider>,
}

impl Default for IoPage {
    fn default() -> Self {
        Self::new()
    }
}

impl IoPage {
    pub fn new() -> Self {
        IoPage {
            read_table: [SoftSwitch::Unhandled; 256],
            write_table: [SoftSwitch::Unhandled; 256],
            data: [0; 128],
            paddle_trigger_cycle: 0,
            keyboard: Box::new(NoDevice),
            speaker: Box::new(NoDevice),
            joysticks: Box::new(NoDevice),
        }
    }

    //--------------------------------------------------
    // プロバイダ
    //--------------------------------------------------

    pub fn set_keyboard_provider(&mut self, provider: Box<dyn KeyboardProvider>) {
        self.keyboard = provider;
    }

    pub fn set_speaker_provider(&mut self, provider: Box<dyn SpeakerProvider>) {
        self.speaker = provider;
    }

    pub fn set_joysticks_provider(&mut self, provider: Box<dyn JoysticksProvider>) {
        self.joysticks = provider;
    }

    //--------------------------------------------------
    // テーブル
    //--------------------------------------------------

    /// 読み込み側にだけ登録
    pub fn install_read(&mut self, addr: u8, switch: SoftSwitch) {
        self.read_table[addr as usize] = switch;
    }

    /// 書き込み側にだけ登録
    pub fn install_write(&mut self, addr: u8, switch: SoftSwitch) {
        self.write_table[addr as usize] = switch;
    }

    /// 読み書き両方に登録
    pub fn install(&mut self, addr: u8, switch: SoftSwitch) {
        self.install_read(addr, switch);
        self.install_write(addr, switch);
    }

    /// カードの16バイトストリップを登録
    pub fn install_card_strip(&mut self, slot: u8) {
        for reg in 0..16u8 {
            self.install(0x80 + (slot << 4) + reg, SoftSwitch::Card { slot, reg });
        }
    }

    pub fn read_switch(&self, addr: u8) -> SoftSwitch {
        self.read_table[addr as usize]
    }

    pub fn write_switch(&self, addr: u8) -> SoftSwitch {
        self.write_table[addr as usize]
    }

    /// フラグがonか
    pub fn flag(&self, flag: u8) -> bool {
        self.data[(flag & 0x7F) as usize] & 0x80 != 0
    }

    fn set_flag(&mut self, flag: u8, on: bool) {
        self.data[(flag & 0x7F) as usize] = if on { 0x80 } else { 0 };
    }

    /// ビデオ関連フラグ
    pub fn video_mode(&self) -> VideoMode {
        VideoMode {
            graphics: self.flag(sw::FLAG_GRAPHICS),
            mixed: self.flag(sw::FLAG_MIXED),
            page2: self.flag(sw::FLAG_PAGE2),
            hires: self.flag(sw::FLAG_HIRES),
            alt_char: self.flag(sw::FLAG_ALTCHAR),
            color: false,
        }
    }

    //--------------------------------------------------
    // アクセス
    //--------------------------------------------------

    /// $C0xxの読み込み
    pub fn read(&mut self, addr: u8, cycles: u64, mmu: &mut Mmu) -> IoAccess {
        let switch = self.read_table[addr as usize];
        IoAccess::Done(match switch {
            SoftSwitch::Card { slot, reg } => return IoAccess::Card { slot, reg },
            SoftSwitch::KeyLatch => {
                let strobed = self.data[sw::FLAG_KEYBOARD as usize] & 0x80 == 0;
                if let Some(key) = self.keyboard.get_key(strobed) {
                    self.data[sw::FLAG_KEYBOARD as usize] = key | 0x80;
                }
                self.data[sw::FLAG_KEYBOARD as usize]
            }
            SoftSwitch::KeyStrobe => {
                let value = self.data[sw::FLAG_KEYBOARD as usize];
                self.data[sw::FLAG_KEYBOARD as usize] &= 0x7F;
                value
            }
            SoftSwitch::Status { flag, invert } => {
                let on = self.flag(flag) != invert;
                (if on { 0x80 } else { 0 }) | (self.data[sw::FLAG_KEYBOARD as usize] & 0x7F)
            }
            SoftSwitch::Button(index) => {
                let pressed = self.joysticks.read_button(index as usize).unwrap_or(false);
                if pressed { 0x80 } else { 0 }
            }
            SoftSwitch::Paddle(index) => {
                let value = self.data[(sw::FLAG_PADDLE0 + index) as usize] as u64;
                let elapsed = cycles.saturating_sub(self.paddle_trigger_cycle);
                if elapsed < value * PADDLE_CYCLES_PER_UNIT { 0x80 } else { 0 }
            }
            other => {
                self.apply(other, cycles, mmu);
                0
            }
        })
    }

    /// $C0xxへの書き込み。カードへ委譲が必要ならそのスロットとレジスタを返す
    pub fn write(&mut self, addr: u8, cycles: u64, mmu: &mut Mmu) -> Option<(u8, u8)> {
        match self.write_table[addr as usize] {
            SoftSwitch::Card { slot, reg } => Some((slot, reg)),
            SoftSwitch::KeyStrobe => {
                self.data[sw::FLAG_KEYBOARD as usize] &= 0x7F;
                None
            }
            other => {
                self.apply(other, cycles, mmu);
                None
            }
        }
    }

    /// 読み書き共通の副作用
    fn apply(&mut self, switch: SoftSwitch, cycles: u64, mmu: &mut Mmu) {
        match switch {
            SoftSwitch::Speaker => {
                self.data[sw::FLAG_SPEAKER as usize] ^= 0x80;
                self.speaker.click(cycles);
            }
            SoftSwitch::Toggle { flag, on } => self.set_flag(flag, on),
            SoftSwitch::PaddleTrigger => {
                self.paddle_trigger_cycle = cycles;
                for i in 0..4u8 {
                    let value = self.joysticks.read_paddle(i as usize).unwrap_or(0xFF);
                    self.data[(sw::FLAG_PADDLE0 + i) as usize] = value;
                }
            }
            SoftSwitch::IntCxRom(on) => {
                self.set_flag(sw::FLAG_INTCXROM, on);
                mmu.set_intcxrom(on);
            }
            SoftSwitch::SlotC3Rom(on) => {
                self.set_flag(sw::FLAG_SLOTC3ROM, on);
                mmu.set_slotc3rom(on);
            }
            SoftSwitch::Unhandled => {
                log::trace!("unhandled soft switch access");
            }
            _ => {}
        }
    }

    //--------------------------------------------------
    // セーブステート
    //--------------------------------------------------

    pub fn save(&self, w: &mut StateWriter) {
        w.write_bytes(&self.data);
        w.write_u64(self.paddle_trigger_cycle);
    }

    pub fn load(&mut self, r: &mut StateReader) -> Result<()> {
        r.read_bytes_into(&mut self.data)?;
        self.paddle_trigger_cycle = r.read_u64()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct Keys(VecDeque<u8>);

    impl KeyboardProvider for Keys {
        fn get_key(&mut self, strobed: bool) -> Option<u8> {
            if strobed { self.0.pop_front() } else { None }
        }
    }

    struct Clicks(Arc<Mutex<Vec<u64>>>);

    impl SpeakerProvider for Clicks {
        fn click(&mut self, cycle: u64) {
            self.0.lock().unwrap().push(cycle);
        }
    }

    fn value(access: IoAccess) -> u8 {
        match access {
            IoAccess::Done(v) => v,
            IoAccess::Card { .. } => panic!("unexpected card access"),
        }
    }

    #[test]
    fn test_keyboard_strobe() {
        let mut io = IoPage::new();
        let mut mmu = Mmu::new();
        sw::install_apple2_switches(&mut io);
        io.set_keyboard_provider(Box::new(Keys(VecDeque::from(vec![0x41, 0x42]))));
        assert_eq!(value(io.read(0x00, 0, &mut mmu)), 0xC1);
        // 未ストローブの間は同じキー
        assert_eq!(value(io.read(0x00, 0, &mut mmu)), 0xC1);
        assert_eq!(value(io.read(0x10, 0, &mut mmu)), 0xC1);
        assert_eq!(value(io.read(0x00, 0, &mut mmu)), 0xC2);
        io.write(0x10, 0, &mut mmu);
        assert_eq!(io.data[0] & 0x80, 0);
    }

    #[test]
    fn test_toggle_symmetry() {
        let mut io = IoPage::new();
        let mut mmu = Mmu::new();
        sw::install_apple2_switches(&mut io);
        for &(off, on, flag) in sw::TOGGLE_PAIRS {
            io.read(on, 0, &mut mmu);
            assert!(io.flag(flag));
            io.write(off, 0, &mut mmu);
            assert!(!io.flag(flag));
            io.write(on, 0, &mut mmu);
            assert!(io.flag(flag));
            io.read(off, 0, &mut mmu);
            assert!(!io.flag(flag));
        }
    }

    #[test]
    fn test_speaker_clicks_carry_cycle() {
        let clicks = Arc::new(Mutex::new(Vec::new()));
        let mut io = IoPage::new();
        let mut mmu = Mmu::new();
        sw::install_apple2_switches(&mut io);
        io.set_speaker_provider(Box::new(Clicks(clicks.clone())));
        io.read(0x30, 100, &mut mmu);
        io.write(0x30, 104, &mut mmu);
        assert_eq!(*clicks.lock().unwrap(), vec![100, 104]);
    }

    #[test]
    fn test_paddle_timer() {
        struct Stick;
        impl JoysticksProvider for Stick {
            fn read_button(&mut self, index: usize) -> Option<bool> {
                Some(index == 0)
            }
            fn read_paddle(&mut self, _index: usize) -> Option<u8> {
                Some(10)
            }
        }
        let mut io = IoPage::new();
        let mut mmu = Mmu::new();
        sw::install_apple2_switches(&mut io);
        io.set_joysticks_provider(Box::new(Stick));
        io.read(0x70, 1000, &mut mmu);
        assert_eq!(value(io.read(0x64, 1050, &mut mmu)), 0x80);
        assert_eq!(value(io.read(0x64, 1110, &mut mmu)), 0);
        assert_eq!(value(io.read(0x61, 0, &mut mmu)), 0x80);
        assert_eq!(value(io.read(0x62, 0, &mut mmu)), 0);
    }

    #[test]
    fn test_card_strip_delegation() {
        let mut io = IoPage::new();
        let mut mmu = Mmu::new();
        io.install_card_strip(6);
        assert_eq!(io.read(0xEC, 0, &mut mmu), IoAccess::Card { slot: 6, reg: 0x0C });
        assert_eq!(io.write(0xE9, 0, &mut mmu), Some((6, 9)));
        assert_eq!(value(io.read(0x20, 0, &mut mmu)), 0);
    }

    #[test]
    fn test_iie_status_reads() {
        let mut io = IoPage::new();
        let mut mmu = Mmu::new();
        sw::install_apple2_switches(&mut io);
        sw::install_iie_switches(&mut io);
        // テキストモードが既定
        assert_eq!(value(io.read(0x1A, 0, &mut mmu)) & 0x80, 0x80);
        io.read(0x50, 0, &mut mmu);
        assert_eq!(value(io.read(0x1A, 0, &mut mmu)) & 0x80, 0);
        io.write(0x07, 0, &mut mmu);
        assert_eq!(value(io.read(0x15, 0, &mut mmu)) & 0x80, 0x80);
        assert!(mmu.intcxrom());
        // $C007の読み込みはキーボード
        assert_eq!(io.read_switch(0x07), SoftSwitch::KeyLatch);
    }
}
