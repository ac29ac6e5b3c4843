//! 設定ファイル管理モジュール
//!
//! エミュレータの設定をJSON形式で永続化

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::apple2::AppleModel;
use crate::command::DEFAULT_COMMAND_CAPACITY;
use crate::cpu::IllegalOpcodePolicy;
use crate::error::Result;
use crate::keyboard::DEFAULT_KEY_CAPACITY;
use crate::sound::DEFAULT_CLICK_CAPACITY;

/// 設定ファイルのデフォルトファイル名
pub const CONFIG_FILENAME: &str = "a2cycle.json";

/// 実行ファイルのディレクトリを取得
pub fn get_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 既定の設定ファイル。カレントディレクトリになければ実行ファイルの隣
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        local
    } else {
        get_exe_dir().join(CONFIG_FILENAME)
    }
}

/// 相対パスを指定されたベースディレクトリからの絶対パスに解決
/// （ベースが空ならカレントディレクトリ基準）
pub fn resolve_path_with_base(base: &str, relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() || base.is_empty() {
        path.to_path_buf()
    } else {
        Path::new(base).join(relative)
    }
}

/// スロット0のカード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Slot0Card {
    /// 16KB Language Card
    #[default]
    Language,
    /// Saturn 128KB
    Saturn,
    None,
}

/// 未定義オペコードの扱い（設定ファイル表記）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IllegalOpcodeSetting {
    #[default]
    Fatal,
    Nop,
}

impl From<IllegalOpcodeSetting> for IllegalOpcodePolicy {
    fn from(setting: IllegalOpcodeSetting) -> Self {
        match setting {
            IllegalOpcodeSetting::Fatal => IllegalOpcodePolicy::Fatal,
            IllegalOpcodeSetting::Nop => IllegalOpcodePolicy::Nop,
        }
    }
}

/// エミュレータ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 相対パスの基準ディレクトリ（空ならカレントディレクトリ）
    #[serde(default)]
    pub home: String,
    /// メインROM（12KBまたは16KB）
    #[serde(default = "default_rom")]
    pub rom: String,
    /// キャラクタジェネレータROM（なければ内蔵フォント）
    #[serde(default)]
    pub char_rom: Option<String>,
    /// Disk II P5 ROM（256バイト）
    #[serde(default = "default_disk_rom")]
    pub disk_rom: Option<String>,
    /// 機種（ROMから判別できないとき）
    #[serde(default)]
    pub model: AppleModel,
    /// スロット0のカード
    #[serde(default)]
    pub slot0: Slot0Card,
    /// Disk IIのスロット（0で無効）
    #[serde(default = "default_disk_slot")]
    pub disk_slot: u8,
    /// ドライブ1のイメージ
    #[serde(default)]
    pub drive1: Option<String>,
    /// ドライブ2のイメージ
    #[serde(default)]
    pub drive2: Option<String>,
    /// ブロックデバイスカードのスロット（0で無効）
    #[serde(default)]
    pub hdv_slot: u8,
    /// ブロックデバイス ユニット1（.po/.hdv/.2mg）
    #[serde(default)]
    pub hdv1: Option<String>,
    #[serde(default)]
    pub hdv2: Option<String>,
    /// カラー表示
    #[serde(default = "default_true")]
    pub color: bool,
    /// モーターON中はウェイトなしで実行
    #[serde(default = "default_true")]
    pub fast_disk: bool,
    /// 速度（1=実機速度、0=最速）
    #[serde(default = "default_speed")]
    pub speed: u32,
    #[serde(default)]
    pub illegal_opcode: IllegalOpcodeSetting,
    /// CPUトレース
    #[serde(default)]
    pub trace: bool,
    /// ディスクログレベル（"flow+state" など）
    #[serde(default)]
    pub disk_log: String,
    /// ウィークビット乱数のシード
    #[serde(default = "default_weak_bit_seed")]
    pub weak_bit_seed: u64,
    #[serde(default = "default_key_capacity")]
    pub key_capacity: usize,
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
    #[serde(default = "default_click_capacity")]
    pub click_capacity: usize,
    /// SaveState/LoadStateコマンドのファイル
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_rom() -> String { "roms/apple2plus.rom".to_string() }
fn default_disk_rom() -> Option<String> { Some("roms/disk2.rom".to_string()) }
fn default_disk_slot() -> u8 { 6 }
fn default_true() -> bool { true }
fn default_speed() -> u32 { 1 }
fn default_weak_bit_seed() -> u64 { crate::cards::disk2::DEFAULT_WEAK_BIT_SEED }
fn default_key_capacity() -> usize { DEFAULT_KEY_CAPACITY }
fn default_command_capacity() -> usize { DEFAULT_COMMAND_CAPACITY }
fn default_click_capacity() -> usize { DEFAULT_CLICK_CAPACITY }
fn default_state_file() -> String { "a2cycle.state".to_string() }

impl Default for Config {
    fn default() -> Self {
        Config {
            home: String::new(),
            rom: default_rom(),
            char_rom: None,
            disk_rom: default_disk_rom(),
            model: AppleModel::default(),
            slot0: Slot0Card::default(),
            disk_slot: default_disk_slot(),
            drive1: None,
            drive2: None,
            hdv_slot: 0,
            hdv1: None,
            hdv2: None,
            color: true,
            fast_disk: true,
            speed: default_speed(),
            illegal_opcode: IllegalOpcodeSetting::default(),
            trace: false,
            disk_log: String::new(),
            weak_bit_seed: default_weak_bit_seed(),
            key_capacity: default_key_capacity(),
            command_capacity: default_command_capacity(),
            click_capacity: default_click_capacity(),
            state_file: default_state_file(),
        }
    }
}

impl Config {
    /// 指定したパスから設定を読み込む。なければ既定値、壊れていれば警告して既定値
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Failed to parse config {:?}: {}, using defaults", path.as_ref(), e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    /// 指定したパスに設定を保存する
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// 相対パスをhomeからのパスに解決
    pub fn resolve_path(&self, relative: &str) -> PathBuf {
        resolve_path_with_base(&self.home, relative)
    }

    /// ステートファイルのパス
    pub fn state_path(&self) -> PathBuf {
        self.resolve_path(&self.state_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{ "disk_slot": 5, "slot0": "saturn" }"#).unwrap();
        assert_eq!(config.disk_slot, 5);
        assert_eq!(config.slot0, Slot0Card::Saturn);
        assert!(config.fast_disk);
        assert_eq!(config.rom, default_rom());
        assert_eq!(config.illegal_opcode, IllegalOpcodeSetting::Fatal);
    }

    #[test]
    fn test_bad_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("a2cycle_bad_config_{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.disk_slot, 6);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("a2cycle_config_{}.json", std::process::id()));
        let mut config = Config::default();
        config.drive1 = Some("disks/dos33.dsk".to_string());
        config.model = AppleModel::AppleIIe;
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path);
        assert_eq!(loaded.drive1.as_deref(), Some("disks/dos33.dsk"));
        assert_eq!(loaded.model, AppleModel::AppleIIe);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_resolve_path() {
        let mut config = Config::default();
        assert_eq!(config.resolve_path("a.dsk"), PathBuf::from("a.dsk"));
        config.home = "/apple".to_string();
        assert_eq!(config.resolve_path("a.dsk"), PathBuf::from("/apple/a.dsk"));
        assert_eq!(config.resolve_path("/abs/b.dsk"), PathBuf::from("/abs/b.dsk"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(CONFIG_FILENAME));
        if !Path::new(CONFIG_FILENAME).exists() {
            assert_eq!(path.parent(), Some(get_exe_dir().as_path()));
        }
        assert!(get_exe_dir().is_dir());
    }
}
