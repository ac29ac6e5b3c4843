//! キーボード入力
//!
//! ホストのキー入力をApple IIの7ビットコードに変換して有界キューに積む。
//! CPUスレッドは$C000の読み込み時、ストローブ済みのときだけ次のキーを取り出す。

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use crate::providers::KeyboardProvider;

/// キーキューの既定容量
pub const DEFAULT_KEY_CAPACITY: usize = 64;

/// 矢印キーなど文字にならないキー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKey {
    Left,
    Right,
    Up,
    Down,
    Escape,
    Return,
    Delete,
}

impl SpecialKey {
    pub fn code(self) -> u8 {
        match self {
            SpecialKey::Left => 0x08,
            SpecialKey::Right => 0x15,
            SpecialKey::Up => 0x0B,
            SpecialKey::Down => 0x0A,
            SpecialKey::Escape => 0x1B,
            SpecialKey::Return => 0x0D,
            SpecialKey::Delete => 0x7F,
        }
    }
}

/// 文字をApple IIのキーコードへ変換（II/II+は大文字のみ）
pub fn apple_key_for_char(c: char, uppercase_only: bool) -> Option<u8> {
    let code = match c {
        '\n' | '\r' => 0x0D,
        '\u{8}' => 0x08,
        '\t' => 0x09,
        '\u{1b}' => 0x1B,
        c if c.is_ascii() && !c.is_ascii_control() => {
            if uppercase_only {
                c.to_ascii_uppercase() as u8
            } else {
                c as u8
            }
        }
        c if c.is_ascii_control() => c as u8,
        _ => return None,
    };
    Some(code & 0x7F)
}

/// キー送信側（ホスト側）
#[derive(Clone)]
pub struct KeySender {
    tx: SyncSender<u8>,
    uppercase_only: bool,
}

impl KeySender {
    /// 変換済みコードを送る。満杯なら捨ててfalse
    pub fn send_code(&self, code: u8) -> bool {
        self.tx.try_send(code & 0x7F).is_ok()
    }

    /// 文字を送る
    pub fn send_char(&self, c: char) -> bool {
        match apple_key_for_char(c, self.uppercase_only) {
            Some(code) => self.send_code(code),
            None => false,
        }
    }

    pub fn send_special(&self, key: SpecialKey) -> bool {
        self.send_code(key.code())
    }

    /// 文字列を順に送る（貼り付け用）。受理された数を返す
    pub fn send_text(&self, text: &str) -> usize {
        text.chars().filter(|&c| self.send_char(c)).count()
    }
}

/// CPUスレッド側の受け口
pub struct KeyboardChannel {
    rx: Receiver<u8>,
}

impl KeyboardProvider for KeyboardChannel {
    fn get_key(&mut self, strobed: bool) -> Option<u8> {
        if !strobed {
            return None;
        }
        self.rx.try_recv().ok()
    }
}

/// 有界キーキューを作る
pub fn key_channel(capacity: usize, uppercase_only: bool) -> (KeySender, KeyboardChannel) {
    let (tx, rx) = sync_channel(capacity);
    (KeySender { tx, uppercase_only }, KeyboardChannel { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_mapping() {
        assert_eq!(apple_key_for_char('a', true), Some(b'A'));
        assert_eq!(apple_key_for_char('a', false), Some(b'a'));
        assert_eq!(apple_key_for_char('\n', true), Some(0x0D));
        assert_eq!(apple_key_for_char('é', true), None);
    }

    #[test]
    fn test_keys_wait_for_strobe() {
        let (tx, mut rx) = key_channel(4, true);
        assert!(tx.send_char('x'));
        assert_eq!(rx.get_key(false), None);
        assert_eq!(rx.get_key(true), Some(b'X'));
        assert_eq!(rx.get_key(true), None);
    }

    #[test]
    fn test_full_queue_drops_new_keys() {
        let (tx, mut rx) = key_channel(2, true);
        assert_eq!(tx.send_text("ABC"), 2);
        assert_eq!(rx.get_key(true), Some(b'A'));
        assert_eq!(rx.get_key(true), Some(b'B'));
        assert_eq!(rx.get_key(true), None);
    }
}
