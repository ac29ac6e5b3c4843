//! セーブステート機能
//!
//! エミュレータの状態をビッグエンディアンのバイナリで保存・復元する。
//! バージョンタグは持たない。登録順にコンポーネントを書き出し、同じ順に読む。

use std::fs;
use std::path::Path;

use crate::error::{EmuError, Result};

/// 状態を持つコンポーネントの識別子（登録順に保存される）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// メモリ管理ユニット（ブロック内容とページテーブル）
    Mmu,
    /// I/Oページ（ソフトスイッチのデータ領域）
    IoPage,
    /// スロットカード
    Card(u8),
}

/// 登録済みコンポーネントの順序表
#[derive(Debug, Default, Clone)]
pub struct Registry {
    order: Vec<Component>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// コンポーネントを末尾に登録
    pub fn register(&mut self, component: Component) {
        if !self.order.contains(&component) {
            self.order.push(component);
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.order
    }
}

/// ビッグエンディアンの書き込みバッファ
#[derive(Debug, Default)]
pub struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// 長さ(u32)付きのバイト列
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.write_u32(data.len() as u32);
        self.buf.extend_from_slice(data);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// ファイルに書き出す
    pub fn save_to<P: AsRef<Path>>(self, path: P) -> Result<()> {
        fs::write(path, self.buf)?;
        Ok(())
    }
}

/// ビッグエンディアンの読み出しカーソル
#[derive(Debug)]
pub struct StateReader {
    data: Vec<u8>,
    pos: usize,
}

impl StateReader {
    pub fn new(data: Vec<u8>) -> Self {
        StateReader { data, pos: 0 }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(fs::read(path)?))
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.pos + n > self.data.len() {
            return Err(EmuError::StateMismatch(format!(
                "unexpected end of state data at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// 長さ付きバイト列を`dest`へ読み込む（長さが違えば不一致エラー）
    pub fn read_bytes_into(&mut self, dest: &mut [u8]) -> Result<()> {
        let len = self.read_u32()? as usize;
        if len != dest.len() {
            return Err(EmuError::StateMismatch(format!(
                "expected {} bytes, found {}",
                dest.len(),
                len
            )));
        }
        dest.copy_from_slice(self.take(len)?);
        Ok(())
    }

    /// 残りバイト数
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}
