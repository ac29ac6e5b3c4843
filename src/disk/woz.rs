//! WOZディスクイメージ（WOZ1/WOZ2）
//!
//! トラックはビットストリームで保持し、160エントリのクォータートラック
//! マップ（TMAP）からハーフトラック位置のトラックを引く。読み込み専用。

use std::collections::BTreeMap;

use crate::error::{EmuError, Result};

const HEADER_SIZE: usize = 12;
const TMAP_SIZE: usize = 160;
const WOZ1_TRACK_SIZE: usize = 6656;
const WOZ1_BITSTREAM_SIZE: usize = 6646;
const WOZ2_BLOCK_SIZE: usize = 512;

/// TMAPの空エントリ
const NO_TRACK: u8 = 0xFF;

/// ビットストリームのトラック
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WozTrack {
    /// MSBファーストのビット列
    pub bits: Vec<u8>,
    pub bit_count: usize,
}

impl WozTrack {
    /// `index`番目のビット（0/1）
    pub fn bit(&self, index: usize) -> u8 {
        let index = index % self.bit_count.max(1);
        (self.bits[index / 8] >> (7 - (index % 8))) & 1
    }
}

/// INFOチャンク
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WozInfo {
    pub version: u8,
    /// 1 = 5.25インチ、2 = 3.5インチ
    pub disk_type: u8,
    pub write_protected: bool,
    pub creator: String,
}

/// WOZディスケット
#[derive(Debug)]
pub struct WozDiskette {
    name: String,
    version: u8,
    info: WozInfo,
    tmap: [u8; TMAP_SIZE],
    tracks: Vec<WozTrack>,
    meta: BTreeMap<String, String>,
}

fn le16(data: &[u8], at: usize) -> usize {
    u16::from_le_bytes([data[at], data[at + 1]]) as usize
}

fn le32(data: &[u8], at: usize) -> usize {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize
}

impl WozDiskette {
    /// ファイル全体から解析する（CRCは検証しない）
    pub fn parse(name: &str, data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(EmuError::Woz("file too short".to_string()));
        }
        let version = match &data[0..4] {
            b"WOZ1" => 1,
            b"WOZ2" => 2,
            _ => return Err(EmuError::Woz("missing WOZ1/WOZ2 magic".to_string())),
        };
        if data[4..8] != [0xFF, 0x0A, 0x0D, 0x0A] {
            return Err(EmuError::Woz("corrupted header bytes".to_string()));
        }

        let mut info = None;
        let mut tmap = None;
        let mut tracks = None;
        let mut meta = BTreeMap::new();

        let mut pos = HEADER_SIZE;
        while pos + 8 <= data.len() {
            let id = &data[pos..pos + 4];
            let size = le32(data, pos + 4);
            let body_start = pos + 8;
            let body_end = body_start
                .checked_add(size)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| {
                    EmuError::Woz(format!("chunk {} overruns file", String::from_utf8_lossy(id)))
                })?;
            let body = &data[body_start..body_end];
            match id {
                b"INFO" => info = Some(parse_info(body)?),
                b"TMAP" => {
                    if body.len() < TMAP_SIZE {
                        return Err(EmuError::Woz("TMAP too short".to_string()));
                    }
                    let mut map = [NO_TRACK; TMAP_SIZE];
                    map.copy_from_slice(&body[..TMAP_SIZE]);
                    tmap = Some(map);
                }
                b"TRKS" => {
                    tracks = Some(if version == 1 {
                        parse_trks_v1(body)?
                    } else {
                        parse_trks_v2(body, data)?
                    })
                }
                b"META" => meta = parse_meta(body),
                _ => log::debug!("{}: skipping WOZ chunk {}", name, String::from_utf8_lossy(id)),
            }
            pos = body_end;
        }

        let info = info.ok_or_else(|| EmuError::Woz("missing INFO chunk".to_string()))?;
        if info.disk_type != 1 {
            return Err(EmuError::Woz(format!("unsupported disk type {}", info.disk_type)));
        }
        let tmap = tmap.ok_or_else(|| EmuError::Woz("missing TMAP chunk".to_string()))?;
        let tracks = tracks.ok_or_else(|| EmuError::Woz("missing TRKS chunk".to_string()))?;
        if let Some(&bad) = tmap.iter().find(|&&t| t != NO_TRACK && t as usize >= tracks.len()) {
            return Err(EmuError::Woz(format!("TMAP refers to missing track {}", bad)));
        }

        Ok(WozDiskette {
            name: name.to_string(),
            version,
            info,
            tmap,
            tracks,
            meta,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn info(&self) -> &WozInfo {
        &self.info
    }

    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    /// ハーフトラック位置のトラック。データがなければNone
    pub fn track(&self, half_track: u8) -> Option<&WozTrack> {
        let quarter = half_track as usize * 2;
        match self.tmap.get(quarter) {
            Some(&NO_TRACK) | None => None,
            Some(&index) => self.tracks.get(index as usize).filter(|t| t.bit_count > 0),
        }
    }

    /// ハーフトラック位置のビット数（トラックなしは0）
    pub fn bit_count(&self, half_track: u8) -> usize {
        self.track(half_track).map_or(0, |t| t.bit_count)
    }
}

fn parse_info(body: &[u8]) -> Result<WozInfo> {
    if body.len() < 37 {
        return Err(EmuError::Woz("INFO too short".to_string()));
    }
    Ok(WozInfo {
        version: body[0],
        disk_type: body[1],
        write_protected: body[2] == 1,
        creator: String::from_utf8_lossy(&body[5..37]).trim_end().to_string(),
    })
}

fn parse_trks_v1(body: &[u8]) -> Result<Vec<WozTrack>> {
    body.chunks_exact(WOZ1_TRACK_SIZE)
        .map(|entry| {
            let bit_count = le16(entry, WOZ1_BITSTREAM_SIZE + 2);
            let byte_count = (bit_count + 7) / 8;
            if bit_count == 0 || byte_count > WOZ1_BITSTREAM_SIZE {
                return Err(EmuError::Woz(format!("bad WOZ1 bit count {}", bit_count)));
            }
            Ok(WozTrack {
                bits: entry[..byte_count].to_vec(),
                bit_count,
            })
        })
        .collect()
}

fn parse_trks_v2(body: &[u8], file: &[u8]) -> Result<Vec<WozTrack>> {
    if body.len() < TMAP_SIZE * 8 {
        return Err(EmuError::Woz("TRKS too short".to_string()));
    }
    let mut tracks = Vec::new();
    for entry in body[..TMAP_SIZE * 8].chunks_exact(8) {
        let start_block = le16(entry, 0);
        let block_count = le16(entry, 2);
        let bit_count = le32(entry, 4);
        if start_block == 0 || block_count == 0 {
            // TMAPの添字を保つため以降も読む
            tracks.push(WozTrack { bits: Vec::new(), bit_count: 0 });
            continue;
        }
        let start = start_block * WOZ2_BLOCK_SIZE;
        let byte_count = (bit_count + 7) / 8;
        if bit_count == 0 || byte_count > block_count * WOZ2_BLOCK_SIZE {
            return Err(EmuError::Woz(format!("bad WOZ2 bit count {}", bit_count)));
        }
        let bits = file
            .get(start..start + byte_count)
            .ok_or_else(|| EmuError::Woz(format!("track data at block {} out of range", start_block)))?;
        tracks.push(WozTrack { bits: bits.to_vec(), bit_count });
    }
    // 末尾の空エントリは落とす
    while tracks.last().map_or(false, |t| t.bit_count == 0) {
        tracks.pop();
    }
    Ok(tracks)
}

/// タブ区切りの key\tvalue 行
fn parse_meta(body: &[u8]) -> BTreeMap<String, String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('\t')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// NIBトラック列から読み込み専用のWOZ2イメージを組み立てる。
/// トラック`t`はクォータートラック`4t-1`..=`4t+1`に割り当てる。CRCは0のまま
pub fn build_woz2(tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"WOZ2");
    out.extend_from_slice(&[0xFF, 0x0A, 0x0D, 0x0A]);
    out.extend_from_slice(&[0, 0, 0, 0]);

    let mut info = vec![0u8; 60];
    info[0] = 2;
    info[1] = 1;
    info[2] = 1;
    info[5..37].copy_from_slice(&[b' '; 32]);
    info[5..12].copy_from_slice(b"a2cycle");
    out.extend_from_slice(b"INFO");
    out.extend_from_slice(&60u32.to_le_bytes());
    out.extend_from_slice(&info);

    let mut tmap = [NO_TRACK; TMAP_SIZE];
    for (t, _) in tracks.iter().enumerate() {
        // 整数トラックと前後のクォータートラック
        for q in (t * 4).saturating_sub(1)..=(t * 4 + 1) {
            if q < TMAP_SIZE {
                tmap[q] = t as u8;
            }
        }
    }
    out.extend_from_slice(b"TMAP");
    out.extend_from_slice(&(TMAP_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&tmap);

    // TRKSヘッダの後ろ、ブロック境界からトラックデータ
    let trks_header = 8 + TMAP_SIZE * 8;
    let data_start = (out.len() + trks_header + WOZ2_BLOCK_SIZE - 1) / WOZ2_BLOCK_SIZE;
    let mut entries = vec![0u8; TMAP_SIZE * 8];
    let mut blobs = Vec::new();
    let mut block = data_start;
    for (t, nib) in tracks.iter().enumerate() {
        let blocks = (nib.len() + WOZ2_BLOCK_SIZE - 1) / WOZ2_BLOCK_SIZE;
        entries[t * 8..t * 8 + 2].copy_from_slice(&(block as u16).to_le_bytes());
        entries[t * 8 + 2..t * 8 + 4].copy_from_slice(&(blocks as u16).to_le_bytes());
        entries[t * 8 + 4..t * 8 + 8].copy_from_slice(&((nib.len() * 8) as u32).to_le_bytes());
        let mut blob = nib.clone();
        blob.resize(blocks * WOZ2_BLOCK_SIZE, 0);
        blobs.extend_from_slice(&blob);
        block += blocks;
    }
    let padding = data_start * WOZ2_BLOCK_SIZE - (out.len() + trks_header);
    out.extend_from_slice(b"TRKS");
    out.extend_from_slice(&((TMAP_SIZE * 8 + padding + blobs.len()) as u32).to_le_bytes());
    out.extend_from_slice(&entries);
    out.resize(out.len() + padding, 0);
    out.extend_from_slice(&blobs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_synthetic_woz2() {
        let tracks = vec![vec![0xD5, 0xAA, 0x96, 0xFF], vec![0xFF; 8]];
        let woz = WozDiskette::parse("t.woz", &build_woz2(&tracks)).unwrap();
        assert_eq!(woz.version(), 2);
        assert_eq!(woz.info().creator, "a2cycle");
        assert!(woz.info().write_protected);

        let t0 = woz.track(0).unwrap();
        assert_eq!(t0.bit_count, 32);
        // 0xD5 = 1101_0101
        let bits: Vec<u8> = (0..8).map(|i| t0.bit(i)).collect();
        assert_eq!(bits, vec![1, 1, 0, 1, 0, 1, 0, 1]);
        // ハーフトラック1はクォータートラック2: 空
        assert!(woz.track(1).is_none());
        assert_eq!(woz.bit_count(2), 64);
        assert_eq!(woz.bit_count(10), 0);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut image = build_woz2(&[vec![0xFF; 4]]);
        image[3] = b'3';
        assert!(matches!(WozDiskette::parse("x.woz", &image), Err(EmuError::Woz(_))));
    }

    #[test]
    fn test_meta_chunk() {
        let mut image = build_woz2(&[vec![0xFF; 4]]);
        let text = b"title\tTest Disk\nside\tA";
        image.extend_from_slice(b"META");
        image.extend_from_slice(&(text.len() as u32).to_le_bytes());
        image.extend_from_slice(text);
        let woz = WozDiskette::parse("x.woz", &image).unwrap();
        assert_eq!(woz.meta().get("title").map(String::as_str), Some("Test Disk"));
    }

    #[test]
    fn test_bit_index_wraps() {
        let track = WozTrack { bits: vec![0x80], bit_count: 3 };
        assert_eq!(track.bit(0), 1);
        assert_eq!(track.bit(3), 1);
        assert_eq!(track.bit(4), 0);
    }
}
