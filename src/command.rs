//! ホストからのコマンド
//!
//! UIスレッドから有界キューで送られ、CPUスレッドが命令ごとに取り出して処理する。

use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};

/// コマンドキューの既定容量
pub const DEFAULT_COMMAND_CAPACITY: usize = 100;

/// エミュレータへのコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CPUリセット（RAMは保持）
    Reset,
    /// 高速モード切り替え
    ToggleSpeed,
    /// 実効速度をログへ出力
    ShowSpeed,
    /// カラー/モノクロ切り替え
    ToggleColor,
    /// ステートを保存
    SaveState,
    /// ステートを読み込み
    LoadState,
    /// CPUとカードの状態をログへ出力
    DumpDebugInfo,
    /// キャラクタジェネレータの次のページへ
    NextCharGenPage,
    /// CPUトレース切り替え
    ToggleCpuTrace,
    /// 一時停止/再開
    PauseUnpause,
    /// 実行ループを終了
    Kill,
    /// ディスクを挿入（drive 0/1）
    LoadDisk { drive: usize, path: PathBuf },
}

/// コマンド送信側
#[derive(Clone)]
pub struct CommandSender {
    tx: SyncSender<Command>,
}

impl CommandSender {
    /// 満杯ならコマンドを捨ててfalse
    pub fn send(&self, command: Command) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("command dropped: {}", e);
                false
            }
        }
    }
}

/// コマンド受信側（CPUスレッド）
pub struct CommandReceiver {
    rx: Receiver<Command>,
}

impl CommandReceiver {
    /// 届いていれば1件取り出す
    pub fn poll(&self) -> Option<Command> {
        match self.rx.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// 有界コマンドキューを作る
pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = sync_channel(capacity);
    (CommandSender { tx }, CommandReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_in_order() {
        let (tx, rx) = command_channel(4);
        assert!(tx.send(Command::Reset));
        assert!(tx.send(Command::LoadDisk { drive: 1, path: PathBuf::from("x.dsk") }));
        assert_eq!(rx.poll(), Some(Command::Reset));
        assert_eq!(rx.poll(), Some(Command::LoadDisk { drive: 1, path: PathBuf::from("x.dsk") }));
        assert_eq!(rx.poll(), None);
    }

    #[test]
    fn test_full_queue_rejects() {
        let (tx, _rx) = command_channel(1);
        assert!(tx.send(Command::Kill));
        assert!(!tx.send(Command::Kill));
    }
}
