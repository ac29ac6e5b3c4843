//! A2Cycle - cycle-paced Apple II emulator core
//!
//! - 6502 CPU（NMOS、未定義オペコードはFatal/NOP選択）
//! - ページ単位の読み書きハンドラを持つMMU
//! - $C0xxソフトスイッチとスロットカード（Language Card、Saturn、Disk II）
//! - DSK/PO/NIB/WOZ/2MGディスクイメージ、GCR 6-and-2
//! - テキスト、Lo-Res、Hi-ResのRGBAスナップショット
//! - 実時間ペーシングとセーブステート
//!
//! ウィンドウ・オーディオデバイスなどのホスト側は`providers`のトレイト越しに接続する。

pub mod apple2;
pub mod cards;
pub mod command;
pub mod config;
pub mod cpu;
pub mod disk;
pub mod disk_log;
pub mod error;
pub mod io;
pub mod keyboard;
pub mod memory;
pub mod pacer;
pub mod providers;
pub mod savestate;
pub mod softswitch;
pub mod sound;
pub mod video;

pub use apple2::{Apple2, AppleModel};
pub use error::{EmuError, Result};
