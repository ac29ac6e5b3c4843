//! ディスクイメージ
//!
//! 5.25インチディスケット（NIB/DSK/PO/WOZ、140KBの2MG）と
//! ブロックデバイス（2MG/PO/HDV）の読み込み。

pub mod gcr;
pub mod nib;
pub mod twoimg;
pub mod woz;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EmuError, Result};

pub use nib::NibDiskette;
pub use twoimg::{BlockDisk, TwoImgFormat, TwoImgHeader};
pub use woz::WozDiskette;

pub const TRACKS: usize = 35;
pub const SECTORS_PER_TRACK: usize = 16;
pub const BYTES_PER_SECTOR: usize = 256;
pub const BYTES_PER_TRACK: usize = SECTORS_PER_TRACK * BYTES_PER_SECTOR;
pub const DSK_SIZE: usize = TRACKS * BYTES_PER_TRACK; // 143360 bytes

/// NIB形式: 1トラック6656バイト
pub const NIB_TRACK_SIZE: usize = 6656;
pub const NIB_SIZE: usize = TRACKS * NIB_TRACK_SIZE;

/// ヘッド位置の最大ハーフトラック
pub const MAX_HALF_TRACK: u8 = 68;

/// DOS 3.3セクターインターリーブ（物理 → 論理）
pub const DOS_SECTOR_ORDER: [usize; 16] = [0, 7, 14, 6, 13, 5, 12, 4, 11, 3, 10, 2, 9, 1, 8, 15];

/// ProDOSセクターオーダー（物理 → 論理）
pub const PRODOS_SECTOR_ORDER: [usize; 16] = [0, 8, 1, 9, 2, 10, 3, 11, 4, 12, 5, 13, 6, 14, 7, 15];

/// DSK/POのボリューム番号
pub const DEFAULT_VOLUME: u8 = 254;

/// ディスクイメージ形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    /// DOS 3.3順のセクタイメージ
    Dsk,
    /// ProDOS順のセクタイメージ
    Po,
    Nib,
    Woz,
    TwoImg,
}

impl DiskFormat {
    /// 拡張子から判別
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "dsk" | "do" => Ok(DiskFormat::Dsk),
            "po" => Ok(DiskFormat::Po),
            "nib" => Ok(DiskFormat::Nib),
            "woz" => Ok(DiskFormat::Woz),
            "2mg" | "2img" => Ok(DiskFormat::TwoImg),
            _ => Err(EmuError::DiskFormat(path.display().to_string())),
        }
    }

    /// セクタイメージの並び
    pub fn sector_order(self) -> &'static [usize; 16] {
        match self {
            DiskFormat::Po => &PRODOS_SECTOR_ORDER,
            _ => &DOS_SECTOR_ORDER,
        }
    }
}

/// ドライブに挿入できるディスケット
#[derive(Debug)]
pub enum Diskette {
    /// バイト単位のトラック（NIB、DSK/POを変換したもの）
    Nib(NibDiskette),
    /// ビット単位のトラック（WOZ）
    Woz(WozDiskette),
}

impl Diskette {
    /// ファイルを開く。DSK/POはホスト側が書き込み可能なら書き戻しを有効にする
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = DiskFormat::from_path(path)?;
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let writable = fs::metadata(path).map(|m| !m.permissions().readonly()).unwrap_or(false);
        let write_back = if writable { Some(path.to_path_buf()) } else { None };
        let diskette = Self::from_bytes(&name, format, &data, write_back)?;
        log::info!("Disk image loaded: {} ({:?})", name, format);
        Ok(diskette)
    }

    /// メモリ上のイメージから作る
    pub fn from_bytes(
        name: &str,
        format: DiskFormat,
        data: &[u8],
        write_back: Option<PathBuf>,
    ) -> Result<Self> {
        match format {
            DiskFormat::Dsk | DiskFormat::Po => Ok(Diskette::Nib(NibDiskette::from_sectors(
                name,
                data,
                format.sector_order(),
                write_back.map(|p| (p, 0)),
            )?)),
            DiskFormat::Nib => Ok(Diskette::Nib(NibDiskette::from_nib(name, data)?)),
            DiskFormat::Woz => Ok(Diskette::Woz(WozDiskette::parse(name, data)?)),
            DiskFormat::TwoImg => {
                let header = TwoImgHeader::parse(data)?;
                let payload = header.payload(data)?;
                let write_back = write_back
                    .filter(|_| !header.locked())
                    .map(|p| (p, header.data_offset as u64));
                match header.format {
                    TwoImgFormat::Dos => Ok(Diskette::Nib(NibDiskette::from_sectors(
                        name, payload, &DOS_SECTOR_ORDER, write_back,
                    )?)),
                    TwoImgFormat::ProDos => Ok(Diskette::Nib(NibDiskette::from_sectors(
                        name, payload, &PRODOS_SECTOR_ORDER, write_back,
                    )?)),
                    TwoImgFormat::Nib => Ok(Diskette::Nib(NibDiskette::from_nib(name, payload)?)),
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Diskette::Nib(d) => d.name(),
            Diskette::Woz(d) => d.name(),
        }
    }

    /// ライトプロテクトのセンス値
    pub fn is_write_protected(&self) -> bool {
        match self {
            Diskette::Nib(d) => d.is_write_protected(),
            // WOZは読み込み専用
            Diskette::Woz(_) => true,
        }
    }

    /// 未コミットのトラックを書き戻す
    pub fn commit(&mut self) {
        if let Diskette::Nib(d) = self {
            d.commit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DiskFormat::from_path(Path::new("a/DOS33.DSK")).unwrap(), DiskFormat::Dsk);
        assert_eq!(DiskFormat::from_path(Path::new("x.po")).unwrap(), DiskFormat::Po);
        assert_eq!(DiskFormat::from_path(Path::new("x.woz")).unwrap(), DiskFormat::Woz);
        assert_eq!(DiskFormat::from_path(Path::new("x.2mg")).unwrap(), DiskFormat::TwoImg);
        assert!(matches!(
            DiskFormat::from_path(Path::new("x.img")),
            Err(EmuError::DiskFormat(_))
        ));
    }

    #[test]
    fn test_wrong_dsk_size_is_rejected() {
        let err = Diskette::from_bytes("bad.dsk", DiskFormat::Dsk, &[0u8; 1000], None).unwrap_err();
        assert!(matches!(err, EmuError::DiskImageSize(1000)));
    }
}
