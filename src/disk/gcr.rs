//! GCR 6-and-2 / 4-and-4 コーデック
//!
//! 256バイトのセクタを342個の6ビット値（下位2ビット群86個 + 上位6ビット256個）
//! に分け、直前の値とのXORを取ってから`SIX_AND_TWO`表で有効なディスクバイトへ写す。
//! アドレスフィールドは4-and-4（奇数ビット/偶数ビット）で書く。

use crate::error::{EmuError, Result};

use super::{BYTES_PER_SECTOR, BYTES_PER_TRACK, NIB_TRACK_SIZE, SECTORS_PER_TRACK};

/// 6-and-2エンコーディングテーブル
pub const SIX_AND_TWO: [u8; 64] = [
    0x96, 0x97, 0x9A, 0x9B, 0x9D, 0x9E, 0x9F, 0xA6,
    0xA7, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, 0xB2, 0xB3,
    0xB4, 0xB5, 0xB6, 0xB7, 0xB9, 0xBA, 0xBB, 0xBC,
    0xBD, 0xBE, 0xBF, 0xCB, 0xCD, 0xCE, 0xCF, 0xD3,
    0xD6, 0xD7, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE,
    0xDF, 0xE5, 0xE6, 0xE7, 0xE9, 0xEA, 0xEB, 0xEC,
    0xED, 0xEE, 0xEF, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6,
    0xF7, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF,
];

const INVALID: u8 = 0xFF;

/// ディスクバイト → 6ビット値（無効は$FF）
const SIX_AND_TWO_DECODE: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < 64 {
        table[SIX_AND_TWO[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// 下位2ビット群の数
const SECONDARY_COUNT: usize = 86;
/// データフィールドのエンコード後の長さ（342 + チェックサム）
pub const ENCODED_SECTOR_SIZE: usize = 343;

const GAP1: usize = 48;
const GAP2: usize = 5;
const ADDRESS_PROLOG: [u8; 3] = [0xD5, 0xAA, 0x96];
const DATA_PROLOG: [u8; 3] = [0xD5, 0xAA, 0xAD];
const EPILOG: [u8; 3] = [0xDE, 0xAA, 0xEB];

/// 1セクタ分のNIBバイト数
pub const NIB_SECTOR_SIZE: usize =
    GAP1 + 3 + 8 + 3 + GAP2 + 3 + ENCODED_SECTOR_SIZE + 3;

/// 4-and-4エンコード
pub fn odd_even_encode_byte(value: u8) -> [u8; 2] {
    [(value >> 1) | 0xAA, value | 0xAA]
}

/// 4-and-4デコード
pub fn odd_even_decode_byte(odd: u8, even: u8) -> u8 {
    ((odd & 0x55) << 1) | (even & 0x55)
}

/// 下位2ビットの並びを入れ替える（D1D0 → D0D1）
fn swap2(bits: u8) -> u8 {
    ((bits & 0x01) << 1) | ((bits & 0x02) >> 1)
}

/// 256バイトのセクタデータを343バイトにエンコード
pub fn encode_sector_data(data: &[u8]) -> [u8; ENCODED_SECTOR_SIZE] {
    let mut values = [0u8; SECONDARY_COUNT + BYTES_PER_SECTOR];
    for k in 0..SECONDARY_COUNT {
        let mut v = swap2(data[k] & 0x03) | (swap2(data[k + 86] & 0x03) << 2);
        if k + 172 < BYTES_PER_SECTOR {
            v |= swap2(data[k + 172] & 0x03) << 4;
        }
        values[k] = v;
    }
    for (k, &byte) in data.iter().take(BYTES_PER_SECTOR).enumerate() {
        values[SECONDARY_COUNT + k] = byte >> 2;
    }

    let mut out = [0u8; ENCODED_SECTOR_SIZE];
    let mut prev = 0u8;
    for (i, &v) in values.iter().enumerate() {
        out[i] = SIX_AND_TWO[((v ^ prev) & 0x3F) as usize];
        prev = v;
    }
    out[ENCODED_SECTOR_SIZE - 1] = SIX_AND_TWO[prev as usize];
    out
}

/// 343バイトのデータフィールドをデコード（`base`はエラー報告用のトラック内位置）
pub fn decode_sector_data(encoded: &[u8], base: usize, sector: u8) -> Result<[u8; BYTES_PER_SECTOR]> {
    let mut values = [0u8; SECONDARY_COUNT + BYTES_PER_SECTOR];
    let mut prev = 0u8;
    for (i, &code) in encoded.iter().take(ENCODED_SECTOR_SIZE).enumerate() {
        let six = SIX_AND_TWO_DECODE[code as usize];
        if six == INVALID {
            return Err(EmuError::InvalidByte { value: code, offset: base + i });
        }
        let v = six ^ prev;
        if i == ENCODED_SECTOR_SIZE - 1 {
            if v != 0 {
                return Err(EmuError::Checksum { sector });
            }
        } else {
            values[i] = v;
            prev = v;
        }
    }

    let mut data = [0u8; BYTES_PER_SECTOR];
    for (k, byte) in data.iter_mut().enumerate() {
        let secondary = values[k % SECONDARY_COUNT];
        let low = swap2((secondary >> ((k / SECONDARY_COUNT) * 2)) & 0x03);
        *byte = (values[SECONDARY_COUNT + k] << 2) | low;
    }
    Ok(data)
}

/// 4096バイトの論理トラックを6656バイトのNIBトラックへ
///
/// 物理セクタ`p`には論理セクタ`order[p]`のデータを置く。
pub fn nib_encode_track(data: &[u8], volume: u8, track: u8, order: &[usize; 16]) -> Vec<u8> {
    let mut nib = Vec::with_capacity(NIB_TRACK_SIZE);
    for (physical, &logical) in order.iter().enumerate() {
        let sector = physical as u8;
        nib.extend(std::iter::repeat(0xFF).take(GAP1));

        // アドレスフィールド
        nib.extend_from_slice(&ADDRESS_PROLOG);
        nib.extend_from_slice(&odd_even_encode_byte(volume));
        nib.extend_from_slice(&odd_even_encode_byte(track));
        nib.extend_from_slice(&odd_even_encode_byte(sector));
        nib.extend_from_slice(&odd_even_encode_byte(volume ^ track ^ sector));
        nib.extend_from_slice(&EPILOG);

        nib.extend(std::iter::repeat(0xFF).take(GAP2));

        // データフィールド
        let start = logical * BYTES_PER_SECTOR;
        nib.extend_from_slice(&DATA_PROLOG);
        nib.extend_from_slice(&encode_sector_data(&data[start..start + BYTES_PER_SECTOR]));
        nib.extend_from_slice(&EPILOG);
    }
    nib
}

/// NIBトラックを4096バイトの論理トラックへ戻す
pub fn nib_decode_track(nib: &[u8], order: &[usize; 16]) -> Result<Vec<u8>> {
    if let Some((offset, &value)) = nib.iter().enumerate().find(|(_, &b)| b & 0x80 == 0) {
        return Err(EmuError::InvalidByte { value, offset });
    }

    let len = nib.len();
    let at = |i: usize| nib[i % len];
    let mut data = vec![0u8; BYTES_PER_TRACK];
    let mut found = [false; SECTORS_PER_TRACK];

    let mut pos = 0;
    while pos < len {
        if (0..3).all(|k| at(pos + k) == ADDRESS_PROLOG[k]) {
            let sector = odd_even_decode_byte(at(pos + 7), at(pos + 8));
            let physical = sector as usize;
            if physical < SECTORS_PER_TRACK && !found[physical] {
                // アドレスフィールドの後ろでデータプロローグを探す
                let search_from = pos + 14;
                let data_start = (search_from..search_from + 64)
                    .find(|&p| (0..3).all(|k| at(p + k) == DATA_PROLOG[k]))
                    .map(|p| p + 3);
                if let Some(start) = data_start {
                    let encoded: Vec<u8> = (start..start + ENCODED_SECTOR_SIZE).map(at).collect();
                    let sector_data = decode_sector_data(&encoded, start % len, sector)?;
                    let logical = order[physical];
                    data[logical * BYTES_PER_SECTOR..(logical + 1) * BYTES_PER_SECTOR]
                        .copy_from_slice(&sector_data);
                    found[physical] = true;
                }
            }
        }
        pos += 1;
    }

    if let Some(missing) = found.iter().position(|&f| !f) {
        return Err(EmuError::SectorNotFound(missing as u8));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{DOS_SECTOR_ORDER, PRODOS_SECTOR_ORDER};

    fn sample_track() -> Vec<u8> {
        (0..BYTES_PER_TRACK).map(|i| (i * 7 + i / 256) as u8).collect()
    }

    #[test]
    fn test_track_size() {
        assert_eq!(NIB_SECTOR_SIZE, 416);
        let nib = nib_encode_track(&sample_track(), 254, 17, &DOS_SECTOR_ORDER);
        assert_eq!(nib.len(), NIB_TRACK_SIZE);
        assert!(nib.iter().all(|&b| b & 0x80 != 0));
    }

    #[test]
    fn test_track_round_trip_both_orders() {
        let data = sample_track();
        for order in [&DOS_SECTOR_ORDER, &PRODOS_SECTOR_ORDER] {
            let nib = nib_encode_track(&data, 254, 3, order);
            assert_eq!(nib_decode_track(&nib, order).unwrap(), data);
        }
    }

    #[test]
    fn test_address_field_layout() {
        let nib = nib_encode_track(&sample_track(), 254, 5, &DOS_SECTOR_ORDER);
        // 2番目のセクタのヘッダ
        let p = NIB_SECTOR_SIZE + GAP1;
        assert_eq!(&nib[p..p + 3], &ADDRESS_PROLOG);
        assert_eq!(odd_even_decode_byte(nib[p + 3], nib[p + 4]), 254);
        assert_eq!(odd_even_decode_byte(nib[p + 5], nib[p + 6]), 5);
        assert_eq!(odd_even_decode_byte(nib[p + 7], nib[p + 8]), 1);
        assert_eq!(odd_even_decode_byte(nib[p + 9], nib[p + 10]), 254 ^ 5 ^ 1);
    }

    #[test]
    fn test_zero_track_is_invalid_byte() {
        let err = nib_decode_track(&[0u8; NIB_TRACK_SIZE], &DOS_SECTOR_ORDER).unwrap_err();
        assert!(matches!(err, EmuError::InvalidByte { value: 0, offset: 0 }));
        assert!(err.to_string().contains("invalid byte"));
    }

    #[test]
    fn test_rotated_track_still_decodes() {
        let data = sample_track();
        let mut nib = nib_encode_track(&data, 254, 0, &DOS_SECTOR_ORDER);
        nib.rotate_left(1000);
        assert_eq!(nib_decode_track(&nib, &DOS_SECTOR_ORDER).unwrap(), data);
    }

    #[test]
    fn test_corrupted_checksum() {
        let mut nib = nib_encode_track(&sample_track(), 254, 0, &DOS_SECTOR_ORDER);
        let p = GAP1 + 3 + 8 + 3 + GAP2 + 3 + 100;
        nib[p] = if nib[p] == 0x96 { 0x97 } else { 0x96 };
        assert!(matches!(
            nib_decode_track(&nib, &DOS_SECTOR_ORDER),
            Err(EmuError::Checksum { sector: 0 })
        ));
    }

    #[test]
    fn test_missing_sector() {
        let mut nib = nib_encode_track(&sample_track(), 254, 0, &DOS_SECTOR_ORDER);
        // セクタ15のアドレスプロローグを潰す
        let p = 15 * NIB_SECTOR_SIZE + GAP1;
        nib[p] = 0xFF;
        assert!(matches!(
            nib_decode_track(&nib, &DOS_SECTOR_ORDER),
            Err(EmuError::SectorNotFound(15))
        ));
    }

    #[test]
    fn test_odd_even_all_bytes() {
        for b in 0..=255u8 {
            let [odd, even] = odd_even_encode_byte(b);
            assert_eq!(odd & 0xAA, 0xAA);
            assert_eq!(even & 0xAA, 0xAA);
            assert_eq!(odd_even_decode_byte(odd, even), b);
        }
    }
}
