//! 実時間とのペーシング
//!
//! 経過サイクルから求めたシミュレーション時刻と壁時計を比べ、先行していれば
//! 眠る。1ms未満の差は溜めておき、100msを超えてずれたら基準を付け替える。

use std::time::{Duration, Instant};

use crate::sound::CPU_CLOCK_HZ;

/// これより短いスリープは溜めておく
const MIN_SLEEP: Duration = Duration::from_millis(1);

/// これ以上ずれたら基準時刻を付け替える
const MAX_SKEW: Duration = Duration::from_millis(100);

/// ペーサー
#[derive(Debug, Clone)]
pub struct Pacer {
    /// 1サイクルあたりのナノ秒（実機速度）
    base_cycle_ns: f64,
    /// 速度倍率（0 = 最速）
    speed: u32,
    reference: Instant,
    ref_cycles: u64,
}

impl Pacer {
    pub fn new(speed: u32, now: Instant, cycles: u64) -> Self {
        Pacer {
            base_cycle_ns: 1.0e9 / CPU_CLOCK_HZ,
            speed,
            reference: now,
            ref_cycles: cycles,
        }
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: u32, now: Instant, cycles: u64) {
        self.speed = speed;
        self.resync(now, cycles);
    }

    /// 基準を現在に合わせる
    pub fn resync(&mut self, now: Instant, cycles: u64) {
        self.reference = now;
        self.ref_cycles = cycles;
    }

    /// 1サイクルのナノ秒。高速化中は0
    pub fn cycle_ns(&self, unthrottled: bool) -> f64 {
        if unthrottled || self.speed == 0 {
            0.0
        } else {
            self.base_cycle_ns / self.speed as f64
        }
    }

    /// `now`の時点で眠るべき時間を求める（眠りはしない）
    pub fn pace_at(&mut self, cycles: u64, now: Instant, unthrottled: bool) -> Option<Duration> {
        let cycle_ns = self.cycle_ns(unthrottled);
        if cycle_ns == 0.0 {
            self.resync(now, cycles);
            return None;
        }
        let simulated = Duration::from_nanos((cycles.saturating_sub(self.ref_cycles) as f64 * cycle_ns) as u64);
        let elapsed = now.saturating_duration_since(self.reference);

        if simulated > elapsed {
            let ahead = simulated - elapsed;
            if ahead > MAX_SKEW {
                self.resync(now, cycles);
                return None;
            }
            return if ahead >= MIN_SLEEP { Some(ahead) } else { None };
        }
        if elapsed - simulated > MAX_SKEW {
            // 大きく遅れたら追いつこうとしない
            self.resync(now, cycles);
        }
        None
    }

    /// 必要なら眠る
    pub fn pace(&mut self, cycles: u64, unthrottled: bool) {
        if let Some(duration) = self.pace_at(cycles, Instant::now(), unthrottled) {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleeps_when_ahead() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(1, t0, 0);
        // 約10ms分のサイクル
        let sleep = pacer.pace_at(10_205, t0, false).unwrap();
        assert!(sleep >= Duration::from_millis(9) && sleep <= Duration::from_millis(11));
    }

    #[test]
    fn test_small_lead_is_accumulated() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(1, t0, 0);
        assert_eq!(pacer.pace_at(100, t0, false), None);
        // 基準は変わらないので溜まった分で眠る
        assert!(pacer.pace_at(2_000, t0, false).is_some());
    }

    #[test]
    fn test_snaps_after_large_skew() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(1, t0, 0);
        let late = t0 + Duration::from_millis(500);
        assert_eq!(pacer.pace_at(1_000, late, false), None);
        // 基準が付け替わったので次の10msはまた眠る
        let sleep = pacer.pace_at(1_000 + 10_205, late, false);
        assert!(sleep.is_some());
    }

    #[test]
    fn test_unthrottled_never_sleeps() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(1, t0, 0);
        assert_eq!(pacer.pace_at(1_000_000, t0, true), None);
        let mut max = Pacer::new(0, t0, 0);
        assert_eq!(max.pace_at(50_000, t0, false), None);
    }
}
