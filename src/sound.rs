//! Apple II サウンド (1bit Speaker)
//!
//! $C030のアクセスごとにCPUサイクル値をクリックとして有界キューへ送る。
//! ホスト側は`ClickSynth`でキューを取り出し、自分のレートでPCMを合成する。
//! キューが満杯のときは新しいクリックを捨てる。

use std::collections::VecDeque;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};

use crate::providers::SpeakerProvider;

/// サンプルレート (Hz)
pub const SAMPLE_RATE: u32 = 44100;

/// Apple IIのCPUクロック (Hz)
pub const CPU_CLOCK_HZ: f64 = 1_020_484.0;

/// クリックキューの既定容量
pub const DEFAULT_CLICK_CAPACITY: usize = 8192;

/// クリックの送り手（CPUスレッド側）
#[derive(Clone)]
pub struct ClickSender {
    tx: SyncSender<u64>,
    dropped: u64,
}

impl ClickSender {
    /// 満杯で捨てたクリック数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SpeakerProvider for ClickSender {
    fn click(&mut self, cycle: u64) {
        match self.tx.try_send(cycle) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            // 受け手がいなければ捨てる
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// 有界クリックキューを作る
pub fn click_channel(capacity: usize) -> (ClickSender, Receiver<u64>) {
    let (tx, rx) = sync_channel(capacity);
    (ClickSender { tx, dropped: 0 }, rx)
}

/// 1-pole IIR ローパスフィルタ
struct LowPass {
    alpha: f32,
    z: f32,
}

impl LowPass {
    fn new(cutoff_hz: f32, sample_rate: f32) -> Self {
        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
        let dt = 1.0 / sample_rate;
        let alpha = dt / (rc + dt);
        Self { alpha, z: 0.0 }
    }

    fn process(&mut self, input: f32) -> f32 {
        self.z += self.alpha * (input - self.z);
        self.z
    }
}

/// クリック列からPCMを合成する（ホストのオーディオコールバック用）
pub struct ClickSynth {
    rx: Receiver<u64>,
    pending: VecDeque<u64>,
    /// 現在のスピーカー状態 (true = HIGH)
    speaker_state: bool,
    /// 紙コーンの慣性
    cone: f32,
    lpf: LowPass,
    volume: f32,
    /// 次のサンプルが表すCPUサイクル
    cursor: f64,
    cycles_per_sample: f64,
}

impl ClickSynth {
    pub fn new(rx: Receiver<u64>) -> Self {
        ClickSynth {
            rx,
            pending: VecDeque::new(),
            speaker_state: false,
            cone: 0.0,
            lpf: LowPass::new(4000.0, SAMPLE_RATE as f32),
            volume: 0.25,
            cursor: 0.0,
            cycles_per_sample: CPU_CLOCK_HZ / SAMPLE_RATE as f64,
        }
    }

    /// ボリュームを設定（0.0 - 1.0）
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// 合成開始位置をCPUサイクルで合わせる
    pub fn sync_to(&mut self, cycle: u64) {
        self.cursor = cycle as f64;
    }

    /// キューから届いているクリックを取り込む
    fn drain(&mut self) {
        while let Ok(cycle) = self.rx.try_recv() {
            self.pending.push_back(cycle);
        }
    }

    /// `out`をPCMで埋める
    pub fn fill(&mut self, out: &mut [f32]) {
        self.drain();
        for sample in out.iter_mut() {
            let now = self.cursor as u64;
            while let Some(&cycle) = self.pending.front() {
                if cycle > now {
                    break;
                }
                self.pending.pop_front();
                self.speaker_state = !self.speaker_state;
            }
            let raw = if self.speaker_state { 1.0 } else { -1.0 };
            self.cone += 0.2 * (raw - self.cone);
            *sample = (self.lpf.process(self.cone) * 1.5).tanh() * self.volume;
            self.cursor += self.cycles_per_sample;
        }
    }

    /// 1bit状態（テスト・デバッグ用）
    pub fn speaker_state(&self) -> bool {
        self.speaker_state
    }
}
