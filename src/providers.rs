//! ホスト側とのインターフェース
//!
//! コアはウィンドウやオーディオデバイスを知らない。キーボード・スピーカー・
//! ジョイスティック・マウス・ビデオの各能力をトレイトとして受け取る。

/// キーボード入力の供給元
pub trait KeyboardProvider {
    /// `strobed`がtrue（前のキーが読み取り済み）のときだけ次のキーを返す
    fn get_key(&mut self, strobed: bool) -> Option<u8>;
}

/// スピーカーのクリック（$C030）を受け取る
pub trait SpeakerProvider {
    fn click(&mut self, cycle: u64);
}

/// ジョイスティック/パドル
pub trait JoysticksProvider {
    /// ボタン0-2の押下状態
    fn read_button(&mut self, index: usize) -> Option<bool>;
    /// パドル0-3の値（0-255）
    fn read_paddle(&mut self, index: usize) -> Option<u8>;
}

/// マウス（位置とボタン）
pub trait MouseProvider {
    fn read_mouse(&mut self) -> (u16, u16, bool);
}

/// ビデオ描画に必要なマシン側の読み取り口
pub trait VideoSource {
    /// 副作用なしのメモリ読み込み
    fn internal_peek(&self, addr: u16) -> u8;
    /// 現在のビデオモード
    fn video_mode(&self) -> VideoMode;
}

/// ソフトスイッチから得たビデオモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoMode {
    pub graphics: bool,
    pub mixed: bool,
    pub page2: bool,
    pub hires: bool,
    pub alt_char: bool,
    pub color: bool,
}

/// 何も接続されていない入出力
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevice;

impl KeyboardProvider for NoDevice {
    fn get_key(&mut self, _strobed: bool) -> Option<u8> {
        None
    }
}

impl SpeakerProvider for NoDevice {
    fn click(&mut self, _cycle: u64) {}
}

impl JoysticksProvider for NoDevice {
    fn read_button(&mut self, _index: usize) -> Option<bool> {
        None
    }

    fn read_paddle(&mut self, _index: usize) -> Option<u8> {
        None
    }
}

impl MouseProvider for NoDevice {
    fn read_mouse(&mut self) -> (u16, u16, bool) {
        (0, 0, false)
    }
}
