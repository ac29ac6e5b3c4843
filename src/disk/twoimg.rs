//! 2MG（2IMG）ユニバーサルディスクイメージとブロックデバイス
//!
//! ヘッダはリトルエンディアン。140KBのDOS/ProDOS/NIBペイロードは
//! 5.25インチディスケットとして、それ以外はブロックデバイスとして扱う。

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{EmuError, Result};

pub const TWO_IMG_MAGIC: &[u8; 4] = b"2IMG";
pub const TWO_IMG_HEADER_SIZE: usize = 64;

/// ブロックサイズ
pub const BLOCK_SIZE: usize = 512;

/// ヘッダのフラグ: 書き込み禁止
const FLAG_LOCKED: u32 = 0x8000_0000;

/// ペイロード形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoImgFormat {
    Dos,
    ProDos,
    Nib,
}

/// 2MGヘッダ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoImgHeader {
    pub creator: [u8; 4],
    pub header_len: u16,
    pub version: u16,
    pub format: TwoImgFormat,
    pub flags: u32,
    /// ProDOSブロック数
    pub blocks: u32,
    pub data_offset: u32,
    pub data_len: u32,
}

fn le16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn le32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

impl TwoImgHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < TWO_IMG_HEADER_SIZE {
            return Err(EmuError::TwoImg(format!("header too short ({} bytes)", data.len())));
        }
        if &data[0..4] != TWO_IMG_MAGIC {
            return Err(EmuError::TwoImg("missing 2IMG magic".to_string()));
        }
        let format = match le32(data, 0x0C) {
            0 => TwoImgFormat::Dos,
            1 => TwoImgFormat::ProDos,
            2 => TwoImgFormat::Nib,
            other => return Err(EmuError::TwoImg(format!("unknown image format {}", other))),
        };
        let mut creator = [0u8; 4];
        creator.copy_from_slice(&data[4..8]);
        let header = TwoImgHeader {
            creator,
            header_len: le16(data, 0x08),
            version: le16(data, 0x0A),
            format,
            flags: le32(data, 0x10),
            blocks: le32(data, 0x14),
            data_offset: le32(data, 0x18),
            data_len: le32(data, 0x1C),
        };
        // ProDOS形式ではデータ長0の作成ツールがある
        let data_len = if header.data_len == 0 && header.format == TwoImgFormat::ProDos {
            header.blocks * BLOCK_SIZE as u32
        } else {
            header.data_len
        };
        let end = header.data_offset as usize + data_len as usize;
        if end > data.len() {
            return Err(EmuError::TwoImg(format!(
                "payload {}..{} exceeds file size {}",
                header.data_offset,
                end,
                data.len()
            )));
        }
        Ok(TwoImgHeader { data_len, ..header })
    }

    /// ペイロード部分
    pub fn payload<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.data_offset as usize;
        let end = start + self.data_len as usize;
        data.get(start..end)
            .ok_or_else(|| EmuError::TwoImg("payload out of range".to_string()))
    }

    /// 書き込み禁止フラグ
    pub fn locked(&self) -> bool {
        self.flags & FLAG_LOCKED != 0
    }
}

/// 512バイトブロック単位でアクセスするディスク（2MG/PO/HDV）
///
/// 書き込みはその場でホストのファイルへ反映する。
#[derive(Debug)]
pub struct BlockDisk {
    path: PathBuf,
    data_offset: u64,
    block_count: u32,
    read_only: bool,
}

impl BlockDisk {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let host_read_only = fs::metadata(path).map(|m| m.permissions().readonly()).unwrap_or(true);
        let is_2mg = data.len() >= 4 && &data[0..4] == TWO_IMG_MAGIC;
        let (data_offset, data_len, locked) = if is_2mg {
            let header = TwoImgHeader::parse(&data)?;
            (header.data_offset as u64, header.data_len as usize, header.locked())
        } else {
            (0, data.len(), false)
        };
        if data_len == 0 || data_len % BLOCK_SIZE != 0 {
            return Err(EmuError::DiskImageSize(data_len));
        }
        log::info!(
            "Block device opened: {} ({} blocks)",
            path.display(),
            data_len / BLOCK_SIZE
        );
        Ok(BlockDisk {
            path: path.to_path_buf(),
            data_offset,
            block_count: (data_len / BLOCK_SIZE) as u32,
            read_only: locked || host_read_only,
        })
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check(&self, block: u32) -> Result<u64> {
        if block >= self.block_count {
            return Err(EmuError::BlockOutOfRange { block, count: self.block_count });
        }
        Ok(self.data_offset + block as u64 * BLOCK_SIZE as u64)
    }

    pub fn read_block(&self, block: u32, out: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        let at = self.check(block)?;
        let mut file = fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(at))?;
        file.read_exact(out)?;
        Ok(())
    }

    pub fn write_block(&mut self, block: u32, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        let at = self.check(block)?;
        if self.read_only {
            return Err(EmuError::TwoImg(format!("{} is write protected", self.path.display())));
        }
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(at))?;
        file.write_all(data)?;
        Ok(())
    }
}
