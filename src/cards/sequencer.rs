//! Disk II P6ステートマシン（ビットストリーム読み込み）
//!
//! 4サイクルに1ビットをラッチへシフトする。ビット7が立ったバイトは
//! 2ビット期間だけ見え続け、その後ラッチをクリアして保留中のビットを入れる。
//! ゼロが4つ続くとMC3470のAGCを模して乱数のビットを出す。
//! 時刻はCPUサイクルから遅延評価する。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::disk::woz::WozTrack;
use crate::disk_log;
use crate::error::Result;
use crate::savestate::{StateReader, StateWriter};

/// 1ビットあたりのCPUサイクル
pub const CYCLES_PER_BIT: u64 = 4;

/// 完成したバイトを見せ続けるビット期間
const HOLD_BITS: u8 = 2;

/// 一度にシミュレートする最大ビット数（それ以上は位置だけ進める）
const MAX_SIMULATED_BITS: u64 = 64;

/// ウィークビットが1になる確率
const WEAK_BIT_ONE_PROBABILITY: f64 = 0.3;

/// P6シーケンサ
#[derive(Debug, Clone)]
pub struct Sequencer {
    latch: u8,
    /// 完成バイトの残り表示期間
    hold: u8,
    /// 表示中に届いたビット
    pending: u8,
    zero_run: u8,
    /// 最後に評価したCPUサイクル
    last_cycle: u64,
    rng: StdRng,
}

impl Sequencer {
    pub fn new(seed: u64) -> Self {
        Sequencer {
            latch: 0,
            hold: 0,
            pending: 0,
            zero_run: 0,
            last_cycle: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn latch(&self) -> u8 {
        self.latch
    }

    /// 時刻だけ合わせる（モーターON時）
    pub fn sync(&mut self, cycle: u64) {
        self.last_cycle = cycle;
    }

    /// `now`までのビットを読み進める。`position`はトラック内のビット位置
    pub fn advance(&mut self, now: u64, track: Option<&WozTrack>, half_track: u8, position: &mut usize) {
        let bits = now.saturating_sub(self.last_cycle) / CYCLES_PER_BIT;
        self.last_cycle += bits * CYCLES_PER_BIT;
        if bits == 0 {
            return;
        }
        let skipped = bits.saturating_sub(MAX_SIMULATED_BITS);
        let bit_count = track.map_or(0, |t| t.bit_count);
        if bit_count > 0 {
            *position = (*position + (skipped % bit_count as u64) as usize) % bit_count;
        }
        for _ in skipped..bits {
            let raw = match track {
                Some(t) if bit_count > 0 => {
                    let bit = t.bit(*position);
                    *position = (*position + 1) % bit_count;
                    bit
                }
                _ => 0,
            };
            let bit = self.filter(raw, half_track, *position);
            self.shift(bit);
        }
    }

    /// ゼロが続いたときのAGCノイズ
    fn filter(&mut self, raw: u8, half_track: u8, position: usize) -> u8 {
        if raw != 0 {
            self.zero_run = 0;
            return 1;
        }
        self.zero_run = self.zero_run.saturating_add(1);
        if self.zero_run >= 4 {
            disk_log::log_weak_bit(half_track, position);
            self.rng.gen_bool(WEAK_BIT_ONE_PROBABILITY) as u8
        } else {
            0
        }
    }

    fn shift(&mut self, bit: u8) {
        if self.hold > 0 {
            self.pending = (self.pending << 1) | bit;
            self.hold -= 1;
            if self.hold == 0 {
                self.latch = self.pending;
                self.pending = 0;
            }
            return;
        }
        self.latch = (self.latch << 1) | bit;
        if self.latch & 0x80 != 0 {
            disk_log::log_nibble(self.latch);
            self.hold = HOLD_BITS;
        }
    }

    pub fn save(&self, w: &mut StateWriter) {
        w.write_u8(self.latch);
        w.write_u8(self.hold);
        w.write_u8(self.pending);
        w.write_u8(self.zero_run);
        w.write_u64(self.last_cycle);
    }

    pub fn load(&mut self, r: &mut StateReader) -> Result<()> {
        self.latch = r.read_u8()?;
        self.hold = r.read_u8()?;
        self.pending = r.read_u8()?;
        self.zero_run = r.read_u8()?;
        self.last_cycle = r.read_u64()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_of(bytes: &[u8]) -> WozTrack {
        WozTrack { bits: bytes.to_vec(), bit_count: bytes.len() * 8 }
    }

    #[test]
    fn test_byte_visible_for_two_bit_periods() {
        let track = track_of(&[0xD5, 0xAA]);
        let mut seq = Sequencer::new(1);
        let mut pos = 0;
        seq.advance(8 * CYCLES_PER_BIT, Some(&track), 0, &mut pos);
        assert_eq!(seq.latch(), 0xD5);
        seq.advance(9 * CYCLES_PER_BIT, Some(&track), 0, &mut pos);
        assert_eq!(seq.latch(), 0xD5);
        // 2ビット後にクリアされ、保留ビット "10" が入る
        seq.advance(10 * CYCLES_PER_BIT, Some(&track), 0, &mut pos);
        assert_eq!(seq.latch(), 0b10);
        seq.advance(16 * CYCLES_PER_BIT, Some(&track), 0, &mut pos);
        assert_eq!(seq.latch(), 0xAA);
        assert_eq!(pos, 0);
    }

    /// "1011..." 形式のビット列からトラックを作る
    fn track_from_bits(pattern: &str) -> WozTrack {
        let mut bits = vec![0u8; (pattern.len() + 7) / 8];
        for (i, c) in pattern.chars().enumerate() {
            if c == '1' {
                bits[i / 8] |= 0x80 >> (i % 8);
            }
        }
        WozTrack { bits, bit_count: pattern.len() }
    }

    #[test]
    fn test_sync_byte_zeros_are_absorbed() {
        // 10ビットの自己同期FFの後にD5
        let track = track_from_bits("1111111100110101011111111111");
        let mut seq = Sequencer::new(1);
        let mut pos = 0;
        seq.advance(8 * CYCLES_PER_BIT, Some(&track), 0, &mut pos);
        assert_eq!(seq.latch(), 0xFF);
        seq.advance(10 * CYCLES_PER_BIT, Some(&track), 0, &mut pos);
        assert_eq!(seq.latch(), 0x00);
        seq.advance(18 * CYCLES_PER_BIT, Some(&track), 0, &mut pos);
        assert_eq!(seq.latch(), 0xD5);
    }

    #[test]
    fn test_weak_bits_are_seeded() {
        let track = track_of(&[0x00; 16]);
        let run = |seed| {
            let mut seq = Sequencer::new(seed);
            let mut pos = 0;
            let mut latches = Vec::new();
            for c in 1..=100u64 {
                seq.advance(c * CYCLES_PER_BIT, Some(&track), 0, &mut pos);
                latches.push(seq.latch());
            }
            latches
        };
        assert_eq!(run(7), run(7));
        assert!(run(7).iter().any(|&l| l != 0));
    }

    #[test]
    fn test_long_gap_only_moves_position() {
        let track = track_of(&[0xFF; 4]);
        let mut seq = Sequencer::new(1);
        let mut pos = 0;
        seq.advance(1000 * CYCLES_PER_BIT, Some(&track), 0, &mut pos);
        assert_eq!(pos, 1000 % 32);
    }
}
