//! エミュレータ共通エラー型
//!
//! 構築時・ロード時の設定エラーはすべてここに集約し、`?`で伝播する。
//! ディスク書き戻し中の一時的なI/Oエラーはここを通らず、ログに残して
//! ディスクを読み取り専用に落とす。

use thiserror::Error;

/// エミュレータのエラー
#[derive(Debug, Error)]
pub enum EmuError {
    /// ROMサイズが12KB/16KBのどちらでもない
    #[error("unsupported ROM size: {0} bytes (expected 12288 or 16384)")]
    RomSize(usize),

    /// キャラクタジェネレータROMが2KBの倍数でない
    #[error("character ROM size {0} is not a multiple of 2048 bytes")]
    CharRomSize(usize),

    /// Disk II P5 ROMが256バイトでない
    #[error("Disk II ROM must be 256 bytes, got {0}")]
    CardRomSize(usize),

    /// ディスクイメージのサイズが想定外
    #[error("unsupported disk image size: {0} bytes")]
    DiskImageSize(usize),

    /// 拡張子などから形式を判別できない
    #[error("unsupported disk image format: {0}")]
    DiskFormat(String),

    /// WOZヘッダ/チャンクの不整合
    #[error("malformed WOZ image: {0}")]
    Woz(String),

    /// 2MGヘッダの不整合
    #[error("malformed 2MG image: {0}")]
    TwoImg(String),

    /// GCRとして不正なバイト
    #[error("invalid byte {value:#04x} at offset {offset}")]
    InvalidByte { value: u8, offset: usize },

    /// データフィールドのチェックサム不一致
    #[error("checksum mismatch in sector {sector}")]
    Checksum { sector: u8 },

    /// トラック内にセクタが見つからない
    #[error("sector {0} not found in track")]
    SectorNotFound(u8),

    /// ブロック番号が範囲外
    #[error("block {block} out of range (disk has {count} blocks)")]
    BlockOutOfRange { block: u32, count: u32 },

    /// スロット番号が範囲外
    #[error("invalid slot {0}")]
    InvalidSlot(u8),

    /// 既にカードが挿さっている
    #[error("slot {0} is already occupied")]
    SlotOccupied(u8),

    /// 該当するカードがない
    #[error("no {0} card installed")]
    NoCard(&'static str),

    /// ドライブ番号が範囲外
    #[error("invalid drive {0}")]
    InvalidDrive(usize),

    /// ステートファイルが現在のマシン構成と合わない
    #[error("state file does not match this machine: {0}")]
    StateMismatch(String),

    /// 未定義オペコード（致命的）
    #[error("illegal opcode {opcode:#04x} at PC {pc:#06x}")]
    IllegalOpcode { opcode: u8, pc: u16 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
}

/// エミュレータ共通のResult
pub type Result<T> = std::result::Result<T, EmuError>;
