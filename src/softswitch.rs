//! ソフトスイッチの定義（Apple II / //e）
//!
//! フラグ番号はデータ領域のインデックス（$C0xxの下位7ビット）。

use crate::io::{IoPage, SoftSwitch};

pub const FLAG_KEYBOARD: u8 = 0x00;
pub const FLAG_80STORE: u8 = 0x18;
pub const FLAG_INTCXROM: u8 = 0x15;
pub const FLAG_SLOTC3ROM: u8 = 0x17;
pub const FLAG_ALTCHAR: u8 = 0x1E;
pub const FLAG_80COL: u8 = 0x1F;
pub const FLAG_SPEAKER: u8 = 0x30;
pub const FLAG_GRAPHICS: u8 = 0x50;
pub const FLAG_MIXED: u8 = 0x52;
pub const FLAG_PAGE2: u8 = 0x54;
pub const FLAG_HIRES: u8 = 0x56;
pub const FLAG_AN0: u8 = 0x58;
pub const FLAG_AN1: u8 = 0x5A;
pub const FLAG_AN2: u8 = 0x5C;
pub const FLAG_AN3: u8 = 0x5E;
pub const FLAG_PADDLE0: u8 = 0x64;

/// (offアドレス, onアドレス, フラグ)。読み書きどちらでも反応する
pub const TOGGLE_PAIRS: &[(u8, u8, u8)] = &[
    (0x51, 0x50, FLAG_GRAPHICS),
    (0x52, 0x53, FLAG_MIXED),
    (0x54, 0x55, FLAG_PAGE2),
    (0x56, 0x57, FLAG_HIRES),
    (0x58, 0x59, FLAG_AN0),
    (0x5A, 0x5B, FLAG_AN1),
    (0x5C, 0x5D, FLAG_AN2),
    (0x5E, 0x5F, FLAG_AN3),
];

/// //e の書き込み専用トグル (off, on, フラグ)
const IIE_WRITE_TOGGLES: &[(u8, u8, u8)] = &[
    (0x00, 0x01, FLAG_80STORE),
    (0x0C, 0x0D, FLAG_80COL),
    (0x0E, 0x0F, FLAG_ALTCHAR),
];

/// //e のステータス読み込み (アドレス, フラグ, 反転)
const IIE_STATUS_READS: &[(u8, u8, bool)] = &[
    (0x15, FLAG_INTCXROM, false),
    (0x17, FLAG_SLOTC3ROM, false),
    (0x18, FLAG_80STORE, false),
    (0x1A, FLAG_GRAPHICS, true),
    (0x1B, FLAG_MIXED, false),
    (0x1C, FLAG_PAGE2, false),
    (0x1D, FLAG_HIRES, false),
    (0x1E, FLAG_ALTCHAR, false),
    (0x1F, FLAG_80COL, false),
];

/// Apple II / II+ の標準ソフトスイッチを登録
pub fn install_apple2_switches(io: &mut IoPage) {
    for addr in 0x00..=0x0F {
        io.install_read(addr, SoftSwitch::KeyLatch);
    }
    for addr in 0x10..=0x1F {
        io.install(addr, SoftSwitch::KeyStrobe);
    }
    for addr in 0x30..=0x3F {
        io.install(addr, SoftSwitch::Speaker);
    }
    for &(off, on, flag) in TOGGLE_PAIRS {
        io.install(off, SoftSwitch::Toggle { flag, on: false });
        io.install(on, SoftSwitch::Toggle { flag, on: true });
    }
    for i in 0..3u8 {
        io.install_read(0x61 + i, SoftSwitch::Button(i));
        io.install_read(0x69 + i, SoftSwitch::Button(i));
    }
    for i in 0..4u8 {
        io.install_read(0x64 + i, SoftSwitch::Paddle(i));
        io.install_read(0x6C + i, SoftSwitch::Paddle(i));
    }
    for addr in 0x70..=0x7F {
        io.install(addr, SoftSwitch::PaddleTrigger);
    }
}

/// //e の拡張ソフトスイッチを登録（書き込みで反応、$C01xで状態読み込み）
pub fn install_iie_switches(io: &mut IoPage) {
    for &(off, on, flag) in IIE_WRITE_TOGGLES {
        io.install_write(off, SoftSwitch::Toggle { flag, on: false });
        io.install_write(on, SoftSwitch::Toggle { flag, on: true });
    }
    io.install_write(0x06, SoftSwitch::IntCxRom(false));
    io.install_write(0x07, SoftSwitch::IntCxRom(true));
    io.install_write(0x0A, SoftSwitch::SlotC3Rom(false));
    io.install_write(0x0B, SoftSwitch::SlotC3Rom(true));
    for &(addr, flag, invert) in IIE_STATUS_READS {
        io.install_read(addr, SoftSwitch::Status { flag, invert });
    }
}
