//! Disk II ログシステム
//!
//! 原則:
//! 1. ログは「現象」ではなく「状態遷移」を記録
//! 2. 毎回のI/Oは記録しない（NIBBLEは短時間のみ）
//! 3. レベル分離: FLOW / STATE / DECIDE / NIBBLE
//!
//! 出力は`log`クレート経由（ターゲット`disk`）。

use std::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    /// ログカテゴリ
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DiskLogLevel: u32 {
        /// L1: 何が起きているか（人間向け）
        const FLOW   = 0b0001;
        /// L2: 状態遷移（開発者向け）
        const STATE  = 0b0010;
        /// L2: 判断（書き戻し、ウィークビット等）
        const DECIDE = 0b0100;
        /// L3: 生データ（短時間のみ）
        const NIBBLE = 0b1000;
    }
}

impl DiskLogLevel {
    /// "flow+state" や "flow,state" を解釈。"all"は全レベル
    pub fn parse(s: &str) -> Option<Self> {
        let mut level = DiskLogLevel::empty();
        for part in s.split(|c| c == ',' || c == '+').map(str::trim).filter(|p| !p.is_empty()) {
            level |= match part.to_ascii_lowercase().as_str() {
                "flow" => DiskLogLevel::FLOW,
                "state" => DiskLogLevel::STATE,
                "decide" => DiskLogLevel::DECIDE,
                "nibble" => DiskLogLevel::NIBBLE,
                "all" => DiskLogLevel::all(),
                _ => return None,
            };
        }
        Some(level)
    }
}

/// グローバルログレベル
static LOG_LEVEL: AtomicU32 = AtomicU32::new(0);

/// ログレベルを設定
pub fn set_log_level(level: DiskLogLevel) {
    LOG_LEVEL.store(level.bits(), Ordering::Relaxed);
}

/// 現在のログレベルを取得
pub fn get_log_level() -> DiskLogLevel {
    DiskLogLevel::from_bits_truncate(LOG_LEVEL.load(Ordering::Relaxed))
}

/// ログレベルが有効かチェック
#[inline]
pub fn is_enabled(flag: DiskLogLevel) -> bool {
    (LOG_LEVEL.load(Ordering::Relaxed) & flag.bits()) != 0
}

/// ニブルリングバッファ（最後のN個を保持）
#[derive(Debug, Clone)]
pub struct NibbleRing {
    buf: Vec<u8>,
    pos: usize,
    capacity: usize,
}

impl NibbleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            pos: 0,
            capacity,
        }
    }

    pub fn push(&mut self, nibble: u8) {
        self.buf[self.pos % self.capacity] = nibble;
        self.pos += 1;
    }

    /// 最新からN個を取得（古い順）
    pub fn last_n(&self, n: usize) -> Vec<u8> {
        let n = n.min(self.capacity).min(self.pos);
        (0..n)
            .map(|i| self.buf[(self.pos - n + i) % self.capacity])
            .collect()
    }

    /// 16個ずつ区切ったダンプ
    pub fn dump(&self, n: usize) {
        if !is_enabled(DiskLogLevel::NIBBLE) {
            return;
        }
        let data = self.last_n(n);
        log::debug!(target: "disk", "[DUMP] Last {} nibbles:", data.len());
        for row in data.chunks(16) {
            let line: Vec<String> = row.iter().map(|b| format!("{:02X}", b)).collect();
            log::debug!(target: "disk", "{}", line.join(" "));
        }
    }
}

impl Default for NibbleRing {
    fn default() -> Self {
        Self::new(256)
    }
}

// ============================================================
// ログ出力関数
// ============================================================

/// [FLOW] モーターON
pub fn log_motor_on(slot: u8) {
    if is_enabled(DiskLogLevel::FLOW) {
        log::info!(target: "disk", "[DISK] S{} Motor ON", slot);
    }
}

/// [FLOW] モーターOFF
pub fn log_motor_off(slot: u8) {
    if is_enabled(DiskLogLevel::FLOW) {
        log::info!(target: "disk", "[DISK] S{} Motor OFF", slot);
    }
}

/// [STATE] ハーフトラック変更
pub fn log_track_change(from: u8, to: u8) {
    if is_enabled(DiskLogLevel::STATE) {
        log::debug!(
            target: "disk",
            "[STATE] Half-track {} -> {} (T={}{})",
            from,
            to,
            to / 2,
            if to % 2 == 1 { ".5" } else { "" }
        );
    }
}

/// [STATE] ドライブ選択
pub fn log_drive_select(drive: usize) {
    if is_enabled(DiskLogLevel::STATE) {
        log::debug!(target: "disk", "[STATE] Drive {} selected", drive + 1);
    }
}

/// [STATE] 読み込み/書き込みモード
pub fn log_write_mode(write: bool) {
    if is_enabled(DiskLogLevel::STATE) {
        log::debug!(target: "disk", "[STATE] {} mode", if write { "Write" } else { "Read" });
    }
}

/// [DECIDE] トラックの書き戻し
pub fn log_commit(track: u8) {
    if is_enabled(DiskLogLevel::DECIDE) {
        log::debug!(target: "disk", "[DECIDE] Track {} written back", track);
    }
}

/// [DECIDE] ウィークビットを乱数で置き換えた
pub fn log_weak_bit(half_track: u8, bit: usize) {
    if is_enabled(DiskLogLevel::DECIDE) {
        log::trace!(target: "disk", "[DECIDE] Weak bit at HT={} bit={}", half_track, bit);
    }
}

/// [NIBBLE] ラッチに入ったバイト
pub fn log_nibble(value: u8) {
    if is_enabled(DiskLogLevel::NIBBLE) {
        log::trace!(target: "disk", "[NIBBLE] {:02X}", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble_ring() {
        let mut ring = NibbleRing::new(8);
        for i in 0..10 {
            ring.push(i as u8);
        }
        let last4 = ring.last_n(4);
        assert_eq!(last4, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_log_level() {
        set_log_level(DiskLogLevel::FLOW | DiskLogLevel::STATE);
        assert!(is_enabled(DiskLogLevel::FLOW));
        assert!(is_enabled(DiskLogLevel::STATE));
        assert!(!is_enabled(DiskLogLevel::DECIDE));
        assert!(!is_enabled(DiskLogLevel::NIBBLE));
        set_log_level(DiskLogLevel::empty());
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!(
            DiskLogLevel::parse("flow+decide"),
            Some(DiskLogLevel::FLOW | DiskLogLevel::DECIDE)
        );
        assert_eq!(DiskLogLevel::parse("all"), Some(DiskLogLevel::all()));
        assert_eq!(DiskLogLevel::parse(""), Some(DiskLogLevel::empty()));
        assert_eq!(DiskLogLevel::parse("bogus"), None);
    }
}
