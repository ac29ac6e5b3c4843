//! バイト単位トラックのディスケット
//!
//! NIBイメージはそのまま、DSK/POは読み込み時にGCRでNIBへ変換して保持する。
//! DSK/POはトラック切り替えかモーターOFFで、汚れたトラックをセクタへ戻して
//! ホストのファイルへ書き戻す。書き戻しに失敗したらメモリ上だけの運用に落とす。

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::disk_log;
use crate::error::{EmuError, Result};

use super::gcr::{nib_decode_track, nib_encode_track};
use super::{BYTES_PER_TRACK, DEFAULT_VOLUME, DSK_SIZE, NIB_SIZE, NIB_TRACK_SIZE, TRACKS};

/// 書き戻し先
#[derive(Debug, Clone)]
struct WriteBack {
    path: PathBuf,
    /// ファイル内のデータ開始位置（2MGのヘッダ分）
    offset: u64,
    order: [usize; 16],
}

/// NIBトラックを持つディスケット
#[derive(Debug)]
pub struct NibDiskette {
    name: String,
    tracks: Vec<Vec<u8>>,
    /// 書き込みを受け付けるか（NIBイメージは受け付けない）
    writable: bool,
    write_back: Option<WriteBack>,
    /// 書き込まれて未コミットのトラック
    dirty_track: Option<usize>,
}

impl NibDiskette {
    /// NIBイメージ（35 × 6656）から作る。書き込みは捨てる
    pub fn from_nib(name: &str, data: &[u8]) -> Result<Self> {
        if data.len() != NIB_SIZE {
            return Err(EmuError::DiskImageSize(data.len()));
        }
        Ok(NibDiskette {
            name: name.to_string(),
            tracks: data.chunks(NIB_TRACK_SIZE).map(|t| t.to_vec()).collect(),
            writable: false,
            write_back: None,
            dirty_track: None,
        })
    }

    /// 140KBのセクタイメージから作る
    pub fn from_sectors(
        name: &str,
        data: &[u8],
        order: &[usize; 16],
        write_back: Option<(PathBuf, u64)>,
    ) -> Result<Self> {
        if data.len() != DSK_SIZE {
            return Err(EmuError::DiskImageSize(data.len()));
        }
        let tracks = (0..TRACKS)
            .map(|t| {
                let start = t * BYTES_PER_TRACK;
                nib_encode_track(&data[start..start + BYTES_PER_TRACK], DEFAULT_VOLUME, t as u8, order)
            })
            .collect();
        Ok(NibDiskette {
            name: name.to_string(),
            tracks,
            writable: true,
            write_back: write_back.map(|(path, offset)| WriteBack { path, offset, order: *order }),
            dirty_track: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_write_protected(&self) -> bool {
        !self.writable
    }

    /// 書き戻しが有効か
    pub fn has_write_back(&self) -> bool {
        self.write_back.is_some()
    }

    pub fn dirty_track(&self) -> Option<usize> {
        self.dirty_track
    }

    pub fn track_len(&self, track: usize) -> usize {
        self.tracks.get(track).map_or(NIB_TRACK_SIZE, |t| t.len())
    }

    pub fn track(&self, track: usize) -> &[u8] {
        &self.tracks[track.min(TRACKS - 1)]
    }

    pub fn read(&self, track: usize, position: usize) -> u8 {
        let data = self.track(track);
        data[position % data.len()]
    }

    /// 現在位置へ1バイト書き込む。別トラックが汚れていれば先にコミット
    pub fn write(&mut self, track: usize, position: usize, value: u8) {
        if !self.writable {
            return;
        }
        let track = track.min(TRACKS - 1);
        if let Some(dirty) = self.dirty_track {
            if dirty != track {
                self.commit();
            }
        }
        let data = &mut self.tracks[track];
        let len = data.len();
        data[position % len] = value;
        self.dirty_track = Some(track);
    }

    /// 汚れたトラックを書き戻す。失敗したら警告してメモリ上のみに切り替える
    pub fn commit(&mut self) {
        if let Err(e) = self.try_commit() {
            log::warn!(
                "{}: write-back failed ({}); keeping changes in memory only",
                self.name, e
            );
            self.write_back = None;
            self.dirty_track = None;
        }
    }

    /// 汚れたトラックをセクタへデコードしてファイルへ書く
    pub fn try_commit(&mut self) -> Result<()> {
        let Some(track) = self.dirty_track else {
            return Ok(());
        };
        let Some(wb) = &self.write_back else {
            self.dirty_track = None;
            return Ok(());
        };
        let sectors = nib_decode_track(&self.tracks[track], &wb.order)?;
        let mut file = OpenOptions::new().write(true).open(&wb.path)?;
        file.seek(SeekFrom::Start(wb.offset + (track * BYTES_PER_TRACK) as u64))?;
        file.write_all(&sectors)?;
        file.flush()?;
        disk_log::log_commit(track as u8);
        self.dirty_track = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DOS_SECTOR_ORDER;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("a2cycle-nib-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_nib_rejects_wrong_size() {
        assert!(matches!(
            NibDiskette::from_nib("x.nib", &[0xFF; 100]),
            Err(EmuError::DiskImageSize(100))
        ));
    }

    #[test]
    fn test_nib_drops_writes() {
        let mut disk = NibDiskette::from_nib("x.nib", &vec![0xFF; NIB_SIZE]).unwrap();
        disk.write(0, 0, 0x96);
        assert_eq!(disk.read(0, 0), 0xFF);
        assert!(disk.is_write_protected());
        assert_eq!(disk.dirty_track(), None);
    }

    #[test]
    fn test_commit_writes_sectors_back() {
        let path = temp_path("commit.dsk");
        let image = vec![0u8; DSK_SIZE];
        fs::write(&path, &image).unwrap();

        let mut disk =
            NibDiskette::from_sectors("commit.dsk", &image, &DOS_SECTOR_ORDER, Some((path.clone(), 0)))
                .unwrap();
        // トラック2を別データで丸ごと書き換える
        let mut new_track = vec![0u8; BYTES_PER_TRACK];
        new_track[0x0105] = 0xA5; // 論理セクタ1
        let nib = nib_encode_track(&new_track, DEFAULT_VOLUME, 2, &DOS_SECTOR_ORDER);
        for (i, &b) in nib.iter().enumerate() {
            disk.write(2, i, b);
        }
        assert_eq!(disk.dirty_track(), Some(2));
        disk.commit();
        assert_eq!(disk.dirty_track(), None);

        let written = fs::read(&path).unwrap();
        assert_eq!(written[2 * BYTES_PER_TRACK + 0x0105], 0xA5);
        assert_eq!(written.len(), DSK_SIZE);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_undecodable_track_degrades_to_memory_only() {
        let path = temp_path("degrade.dsk");
        let image = vec![0u8; DSK_SIZE];
        fs::write(&path, &image).unwrap();
        let mut disk =
            NibDiskette::from_sectors("degrade.dsk", &image, &DOS_SECTOR_ORDER, Some((path.clone(), 0)))
                .unwrap();
        disk.write(0, 0, 0x00);
        disk.commit();
        assert!(!disk.has_write_back());
        // 書き込み自体は引き続きメモリ上で有効
        assert!(!disk.is_write_protected());
        assert_eq!(disk.read(0, 0), 0x00);
        assert_eq!(fs::read(&path).unwrap(), image);
        fs::remove_file(&path).ok();
    }
}
