//! Apple II エミュレータ
//!
//! CPU、MMU、I/Oページ、スロットカードを統合する。
//! $C0xxはMMUより先にI/Oページが横取りし、カードのストリップはここから
//! `CardBus`を渡して各カードへ振り分ける。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cards::{Card, CardBus, DiskIICard, HardDiskCard, LanguageCard};
use crate::command::{Command, CommandReceiver};
use crate::config::{Config, Slot0Card};
use crate::cpu::{Cpu, IllegalOpcodePolicy, MemoryBus};
use crate::error::{EmuError, Result};
use crate::io::{IoAccess, IoPage};
use crate::memory::{Mmu, PageHandler, IO_PAGE};
use crate::pacer::Pacer;
use crate::providers::{
    JoysticksProvider, KeyboardProvider, MouseProvider, NoDevice, SpeakerProvider, VideoMode, VideoSource,
};
use crate::savestate::{Component, Registry, StateReader, StateWriter};
use crate::softswitch;
use crate::video::{flash_phase, CharacterGenerator, RgbaImage, Video};

/// II/II+ のROMサイズ（$D000-$FFFF）
pub const ROM_SIZE_12K: usize = 0x3000;
/// //e のROMサイズ（$C000-$FFFF）
pub const ROM_SIZE_16K: usize = 0x4000;

/// メインRAM（$0000-$BFFF）
const MAIN_RAM_SIZE: usize = 0xC000;

/// 一時停止中の待ち時間
const PAUSE_SLEEP: Duration = Duration::from_millis(10);

/// Apple IIのモデル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AppleModel {
    /// Apple II（Integer BASIC）
    #[serde(rename = "ii")]
    AppleII,
    /// Apple II Plus
    #[default]
    #[serde(rename = "iiplus")]
    AppleIIPlus,
    /// Apple IIe（拡張ソフトスイッチと内蔵Cx ROMのみ）
    #[serde(rename = "iie")]
    AppleIIe,
}

impl AppleModel {
    /// ROMサイズからモデルを推定
    pub fn detect_from_rom(rom: &[u8]) -> Result<Self> {
        match rom.len() {
            ROM_SIZE_12K => Ok(AppleModel::AppleIIPlus),
            ROM_SIZE_16K => Ok(AppleModel::AppleIIe),
            n => Err(EmuError::RomSize(n)),
        }
    }

    pub fn rom_size(self) -> usize {
        match self {
            AppleModel::AppleII | AppleModel::AppleIIPlus => ROM_SIZE_12K,
            AppleModel::AppleIIe => ROM_SIZE_16K,
        }
    }

    /// キーボードが大文字のみか
    pub fn uppercase_only(self) -> bool {
        self != AppleModel::AppleIIe
    }
}

impl FromStr for AppleModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ii" | "apple2" => Ok(AppleModel::AppleII),
            "iiplus" | "ii+" | "apple2plus" => Ok(AppleModel::AppleIIPlus),
            "iie" | "apple2e" => Ok(AppleModel::AppleIIe),
            other => Err(format!("unknown model '{}' (ii, iiplus, iie)", other)),
        }
    }
}

/// Apple IIエミュレータのメイン構造体
pub struct Apple2 {
    /// 6502 CPU
    pub cpu: Cpu,
    /// メモリ管理ユニット
    pub mmu: Mmu,
    /// I/Oページ（$C000-$C0FF）
    pub io: IoPage,
    /// ビデオ（スナップショット生成）
    pub video: Video,
    pub model: AppleModel,
    cards: [Option<Box<dyn Card>>; 8],
    registry: Registry,
    /// 実行中の命令の開始サイクル（バスのタイムスタンプ）
    cycles: u64,
    /// ペーシング解除要求の数（モーターON中のドライブ等）
    fast_requests: u32,
    /// ユーザーが切り替える高速モード
    fast_mode: bool,
    is_color: bool,
    paused: bool,
    running: bool,
    /// 一時停止時点の画面
    frozen: Option<RgbaImage>,
    mouse: Box<dyn MouseProvider>,
    pacer: Pacer,
    started: Instant,
    /// ShowSpeed用の前回計測点
    speed_mark: (Instant, u64),
    state_path: PathBuf,
}

//--------------------------------------------------
// バス
//--------------------------------------------------

/// メモリバスの実装（$C0xxはI/Oページとカードへ）
impl MemoryBus for Apple2 {
    fn read(&mut self, address: u16) -> u8 {
        if (address >> 8) as u8 == IO_PAGE {
            return match self.io.read(address as u8, self.cycles, &mut self.mmu) {
                IoAccess::Done(value) => value,
                IoAccess::Card { slot, reg } => self.card_access(slot, reg, None),
            };
        }
        self.mmu.peek(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        if (address >> 8) as u8 == IO_PAGE {
            if let Some((slot, reg)) = self.io.write(address as u8, self.cycles, &mut self.mmu) {
                self.card_access(slot, reg, Some(value));
            }
            return;
        }
        self.mmu.poke(address, value);
    }

    fn set_cycle(&mut self, cycle: u64) {
        self.cycles = cycle;
    }
}

impl VideoSource for Apple2 {
    fn internal_peek(&self, addr: u16) -> u8 {
        self.mmu.internal_peek(addr)
    }

    fn video_mode(&self) -> VideoMode {
        VideoMode { color: self.is_color, ..self.io.video_mode() }
    }
}

impl Apple2 {
    /// ROMを読み込んでマシンを構築する（カードは未挿入）
    pub fn new(model: AppleModel, rom: &[u8], illegal_policy: IllegalOpcodePolicy) -> Result<Self> {
        if rom.len() != ROM_SIZE_12K && rom.len() != ROM_SIZE_16K {
            return Err(EmuError::RomSize(rom.len()));
        }
        let model = if rom.len() == model.rom_size() {
            model
        } else {
            let detected = AppleModel::detect_from_rom(rom)?;
            log::warn!("{:?} ROM size mismatch ({} bytes); using {:?}", model, rom.len(), detected);
            detected
        };

        let mut mmu = Mmu::new();

        // メインRAM（テキストページ1/2はダーティビット付き）
        let ram = mmu.add_ram_block("Main RAM", MAIN_RAM_SIZE);
        mmu.set_pages_read(0x00, 0xBF, PageHandler::Ram { block: ram, page: 0 });
        mmu.set_pages_write(0x00, 0xBF, PageHandler::Ram { block: ram, page: 0 });
        mmu.set_pages_read(0x04, 0x0B, PageHandler::TextRam { block: ram, page: 0x04 });
        mmu.set_pages_write(0x04, 0x0B, PageHandler::TextRam { block: ram, page: 0x04 });

        // スロットROM領域は挿入されるまで未割り当て
        mmu.set_pages_read(0xC1, 0xCF, PageHandler::Unassigned);
        mmu.set_pages_write(0xC1, 0xCF, PageHandler::Unassigned);

        let block = mmu.add_rom_block("System ROM", rom);
        let rom_base = if rom.len() == ROM_SIZE_16K {
            // $C100-$CFFFは内蔵ROMとしてシャドウ
            mmu.set_internal_rom(PageHandler::Rom { block, page: 0 });
            0x10
        } else {
            0
        };
        mmu.set_pages_read(0xD0, 0xFF, PageHandler::Rom { block, page: rom_base });
        mmu.set_pages_write(0xD0, 0xFF, PageHandler::Rom { block, page: rom_base });
        log::info!("ROM loaded: {:?}, {} bytes", model, rom.len());

        let mut io = IoPage::new();
        softswitch::install_apple2_switches(&mut io);
        if model == AppleModel::AppleIIe {
            softswitch::install_iie_switches(&mut io);
        }

        let mut registry = Registry::new();
        registry.register(Component::Mmu);
        registry.register(Component::IoPage);

        let now = Instant::now();
        Ok(Apple2 {
            cpu: Cpu::new(illegal_policy),
            mmu,
            io,
            video: Video::default(),
            model,
            cards: Default::default(),
            registry,
            cycles: 0,
            fast_requests: 0,
            fast_mode: false,
            is_color: true,
            paused: false,
            running: true,
            frozen: None,
            mouse: Box::new(NoDevice),
            pacer: Pacer::new(1, now, 0),
            started: now,
            speed_mark: (now, 0),
            state_path: PathBuf::from("a2cycle.state"),
        })
    }

    /// 設定からマシンを組み立てる（ROM、カード、ディスク）
    pub fn from_config(config: &Config) -> Result<Self> {
        let rom = fs::read(config.resolve_path(&config.rom))?;
        let mut emu = Apple2::new(config.model, &rom, config.illegal_opcode.into())?;

        if let Some(path) = &config.char_rom {
            let data = fs::read(config.resolve_path(path))?;
            emu.video.chargen = CharacterGenerator::from_rom(&data)?;
        }

        match config.slot0 {
            Slot0Card::Language => emu.insert_card(0, Box::new(LanguageCard::new()))?,
            Slot0Card::Saturn => emu.insert_card(0, Box::new(LanguageCard::saturn()))?,
            Slot0Card::None => {}
        }

        if config.disk_slot != 0 {
            let rom = match &config.disk_rom {
                Some(path) => match fs::read(config.resolve_path(path)) {
                    Ok(data) => Some(data),
                    Err(e) => {
                        log::warn!("Disk II ROM {} not loaded: {}", path, e);
                        None
                    }
                },
                None => None,
            };
            let mut disk = DiskIICard::new(rom)?;
            disk.set_fast_disk(config.fast_disk);
            disk.set_weak_bit_seed(config.weak_bit_seed);
            emu.insert_card(config.disk_slot, Box::new(disk))?;
            for (drive, image) in [&config.drive1, &config.drive2].into_iter().enumerate() {
                if let Some(image) = image {
                    emu.load_disk(drive, config.resolve_path(image))?;
                }
            }
        }

        if config.hdv_slot != 0 {
            emu.insert_card(config.hdv_slot, Box::new(HardDiskCard::new()))?;
            for (unit, image) in [&config.hdv1, &config.hdv2].into_iter().enumerate() {
                if let Some(image) = image {
                    emu.load_volume(unit, config.resolve_path(image))?;
                }
            }
        }

        emu.is_color = config.color;
        emu.cpu.trace = config.trace;
        emu.state_path = config.state_path();
        emu.set_speed(config.speed);
        emu.reset();
        Ok(emu)
    }

    //--------------------------------------------------
    // カード
    //--------------------------------------------------

    /// スロットへカードを挿入し、ストリップとROMをマッピングする
    pub fn insert_card(&mut self, slot: u8, mut card: Box<dyn Card>) -> Result<()> {
        if slot > 7 {
            return Err(EmuError::InvalidSlot(slot));
        }
        if self.cards[slot as usize].is_some() {
            return Err(EmuError::SlotOccupied(slot));
        }
        let mut bus = CardBus { mmu: &mut self.mmu, cycles: self.cycles, fast_requests: &mut self.fast_requests };
        card.insert(&mut bus, slot)?;
        self.io.install_card_strip(slot);
        log::info!("{} card in slot {}", card.name(), slot);
        self.cards[slot as usize] = Some(card);
        self.registry.register(Component::Card(slot));
        Ok(())
    }

    pub fn card(&self, slot: u8) -> Option<&dyn Card> {
        self.cards.get(slot as usize).and_then(|c| c.as_deref())
    }

    /// 最初に見つかったDisk II
    pub fn disk2(&self) -> Option<&DiskIICard> {
        self.cards.iter().flatten().find_map(|c| c.as_any().downcast_ref::<DiskIICard>())
    }

    pub fn disk2_mut(&mut self) -> Option<&mut DiskIICard> {
        self.cards.iter_mut().flatten().find_map(|c| c.as_any_mut().downcast_mut::<DiskIICard>())
    }

    /// Disk IIのドライブ（0/1）へイメージを挿入
    pub fn load_disk<P: AsRef<Path>>(&mut self, drive: usize, path: P) -> Result<()> {
        self.disk2_mut().ok_or(EmuError::NoCard("Disk II"))?.load_disk(drive, path)
    }

    pub fn hard_disk(&self) -> Option<&HardDiskCard> {
        self.cards.iter().flatten().find_map(|c| c.as_any().downcast_ref::<HardDiskCard>())
    }

    pub fn hard_disk_mut(&mut self) -> Option<&mut HardDiskCard> {
        self.cards.iter_mut().flatten().find_map(|c| c.as_any_mut().downcast_mut::<HardDiskCard>())
    }

    /// ブロックデバイスのユニット（0/1）へ.po/.hdv/.2mgを挿入
    pub fn load_volume<P: AsRef<Path>>(&mut self, unit: usize, path: P) -> Result<()> {
        self.hard_disk_mut().ok_or(EmuError::NoCard("block device"))?.load_volume(unit, path)
    }

    /// 全カードの状態
    pub fn cards_info(&self) -> Vec<(u8, &'static str, BTreeMap<String, String>)> {
        self.cards
            .iter()
            .enumerate()
            .filter_map(|(slot, card)| card.as_ref().map(|c| (slot as u8, c.name(), c.info())))
            .collect()
    }

    fn card_access(&mut self, slot: u8, reg: u8, write: Option<u8>) -> u8 {
        let mut bus = CardBus { mmu: &mut self.mmu, cycles: self.cycles, fast_requests: &mut self.fast_requests };
        match self.cards[(slot & 7) as usize].as_mut() {
            Some(card) => match write {
                Some(value) => {
                    card.write_switch(reg, value, &mut bus);
                    0
                }
                None => card.read_switch(reg, &mut bus),
            },
            None => {
                debug_assert!(false, "card strip installed for empty slot {}", slot);
                0
            }
        }
    }

    /// 汚れたトラックをすべて書き戻す
    pub fn flush(&mut self) {
        for card in self.cards.iter_mut().flatten() {
            card.flush();
        }
    }

    //--------------------------------------------------
    // プロバイダ
    //--------------------------------------------------

    pub fn set_keyboard_provider(&mut self, provider: Box<dyn KeyboardProvider>) {
        self.io.set_keyboard_provider(provider);
    }

    pub fn set_speaker_provider(&mut self, provider: Box<dyn SpeakerProvider>) {
        self.io.set_speaker_provider(provider);
    }

    pub fn set_joysticks_provider(&mut self, provider: Box<dyn JoysticksProvider>) {
        self.io.set_joysticks_provider(provider);
    }

    pub fn set_mouse_provider(&mut self, provider: Box<dyn MouseProvider>) {
        self.mouse = provider;
    }

    /// マウスの位置とボタン
    pub fn read_mouse(&mut self) -> (u16, u16, bool) {
        self.mouse.read_mouse()
    }

    //--------------------------------------------------
    // 実行
    //--------------------------------------------------

    /// CPUをリセット（RAMは保持）
    pub fn reset(&mut self) {
        let mut cpu = std::mem::take(&mut self.cpu);
        self.cycles = cpu.total_cycles;
        cpu.reset(self);
        self.cpu = cpu;
        self.pacer.resync(Instant::now(), self.cpu.total_cycles);
    }

    /// 全RAMをゼロクリア
    pub fn wipe_ram(&mut self) {
        self.mmu.wipe_ram();
    }

    pub fn irq(&mut self) {
        let mut cpu = std::mem::take(&mut self.cpu);
        cpu.irq(self);
        self.cpu = cpu;
    }

    pub fn nmi(&mut self) {
        let mut cpu = std::mem::take(&mut self.cpu);
        cpu.nmi(self);
        self.cpu = cpu;
    }

    /// 1命令を実行
    pub fn step(&mut self) -> Result<u32> {
        let mut cpu = std::mem::take(&mut self.cpu);
        self.cycles = cpu.total_cycles;
        let result = cpu.step(self);
        self.cpu = cpu;
        result
    }

    /// 指定サイクル数だけ実行（ペーシングなし）
    pub fn run_cycles(&mut self, target_cycles: u64) -> Result<()> {
        let start = self.cpu.total_cycles;
        while self.running && self.cpu.total_cycles - start < target_cycles {
            self.step()?;
        }
        Ok(())
    }

    /// 実行ループ: コマンドを処理し、1命令実行し、実時間に合わせる。
    /// `Kill`か`max_cycles`到達で戻る
    pub fn run(&mut self, commands: &CommandReceiver, max_cycles: Option<u64>) -> Result<()> {
        let start = self.cpu.total_cycles;
        self.pacer.resync(Instant::now(), start);
        while self.running {
            while let Some(command) = commands.poll() {
                self.handle_command(command);
            }
            if !self.running {
                break;
            }
            if self.paused {
                std::thread::sleep(PAUSE_SLEEP);
                continue;
            }
            self.step()?;
            let cycles = self.cpu.total_cycles;
            self.pacer.pace(cycles, self.is_unthrottled());
            if max_cycles.is_some_and(|max| cycles - start >= max) {
                break;
            }
        }
        self.flush();
        Ok(())
    }

    /// コマンドを1つ処理
    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Reset => {
                log::info!("Reset");
                self.reset();
            }
            Command::ToggleSpeed => {
                self.fast_mode = !self.fast_mode;
                self.pacer.resync(Instant::now(), self.cpu.total_cycles);
                log::info!("Fast mode: {}", if self.fast_mode { "ON" } else { "OFF" });
            }
            Command::ShowSpeed => {
                let (since, cycles) = self.speed_mark;
                let secs = since.elapsed().as_secs_f64();
                if secs > 0.0 {
                    let mhz = (self.cpu.total_cycles - cycles) as f64 / secs / 1.0e6;
                    log::info!("Speed: {:.3} MHz", mhz);
                }
                self.speed_mark = (Instant::now(), self.cpu.total_cycles);
            }
            Command::ToggleColor => {
                self.is_color = !self.is_color;
                log::info!("Color: {}", if self.is_color { "ON" } else { "OFF" });
            }
            Command::SaveState => {
                let path = self.state_path.clone();
                match self.save_state(&path) {
                    Ok(()) => log::info!("State saved: {}", path.display()),
                    Err(e) => log::warn!("Failed to save state {}: {}", path.display(), e),
                }
            }
            Command::LoadState => {
                let path = self.state_path.clone();
                match self.load_state(&path) {
                    Ok(()) => log::info!("State loaded: {}", path.display()),
                    Err(e) => log::warn!("Failed to load state {}: {}", path.display(), e),
                }
            }
            Command::DumpDebugInfo => self.dump_debug_info(),
            Command::NextCharGenPage => {
                let page = self.video.chargen.next_page();
                log::info!("Character generator page {}/{}", page + 1, self.video.chargen.pages());
            }
            Command::ToggleCpuTrace => {
                self.cpu.trace = !self.cpu.trace;
                log::info!("CPU trace: {}", if self.cpu.trace { "ON" } else { "OFF" });
            }
            Command::PauseUnpause => {
                self.paused = !self.paused;
                self.frozen = if self.paused { Some(self.render()) } else { None };
                self.pacer.resync(Instant::now(), self.cpu.total_cycles);
                log::info!("{}", if self.paused { "Paused" } else { "Resumed" });
            }
            Command::Kill => self.running = false,
            Command::LoadDisk { drive, path } => {
                if let Err(e) = self.load_disk(drive, &path) {
                    log::warn!("Failed to load {}: {}", path.display(), e);
                }
            }
        }
    }

    fn dump_debug_info(&self) {
        let r = &self.cpu.regs;
        log::info!(
            "PC={:04X} A={:02X} X={:02X} Y={:02X} SP={:02X} P={:02X} cycles={} fast_requests={}",
            r.pc, r.a, r.x, r.y, r.sp, r.status, self.cpu.total_cycles, self.fast_requests
        );
        for (slot, name, info) in self.cards_info() {
            let fields: Vec<String> = info.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            log::info!("slot {} {}: {}", slot, name, fields.join(" "));
        }
        if let Some(disk) = self.disk2() {
            disk.dump_history(32);
        }
    }

    //--------------------------------------------------
    // 状態
    //--------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_color(&self) -> bool {
        self.is_color
    }

    pub fn is_fast_mode(&self) -> bool {
        self.fast_mode
    }

    pub fn fast_requests(&self) -> u32 {
        self.fast_requests
    }

    /// ペーシングを外しているか
    pub fn is_unthrottled(&self) -> bool {
        self.fast_mode || self.fast_requests > 0
    }

    /// 速度倍率（0 = 最速）
    pub fn set_speed(&mut self, speed: u32) {
        self.pacer.set_speed(speed, Instant::now(), self.cpu.total_cycles);
    }

    pub fn set_state_path<P: AsRef<Path>>(&mut self, path: P) {
        self.state_path = path.as_ref().to_path_buf();
    }

    //--------------------------------------------------
    // ビデオ
    //--------------------------------------------------

    fn render(&self) -> RgbaImage {
        self.video.snapshot(self, flash_phase(self.started.elapsed()))
    }

    /// 現在の画面（一時停止中は停止時点の画面）
    pub fn snapshot(&self) -> RgbaImage {
        match &self.frozen {
            Some(image) => image.clone(),
            None => self.render(),
        }
    }

    /// テキスト画面の内容
    pub fn text_lines(&self) -> Vec<String> {
        Video::text_lines(self)
    }

    //--------------------------------------------------
    // セーブステート
    //--------------------------------------------------

    /// 状態をバイト列に書き出す
    pub fn save_state_bytes(&self) -> Vec<u8> {
        let mut w = StateWriter::new();
        w.write_bool(self.is_color);
        w.write_bool(self.fast_mode);
        w.write_u32(self.fast_requests);
        self.cpu.save(&mut w);
        for component in self.registry.components() {
            match *component {
                Component::Mmu => self.mmu.save(&mut w),
                Component::IoPage => self.io.save(&mut w),
                Component::Card(slot) => {
                    if let Some(card) = &self.cards[slot as usize] {
                        card.save(&mut w);
                    }
                }
            }
        }
        w.into_inner()
    }

    /// バイト列から状態を復元する
    pub fn load_state_bytes(&mut self, data: Vec<u8>) -> Result<()> {
        let mut r = StateReader::new(data);
        self.is_color = r.read_bool()?;
        self.fast_mode = r.read_bool()?;
        self.fast_requests = r.read_u32()?;
        self.cpu.load(&mut r)?;
        for component in self.registry.components().to_vec() {
            match component {
                Component::Mmu => self.mmu.load(&mut r)?,
                Component::IoPage => self.io.load(&mut r)?,
                Component::Card(slot) => {
                    let mut bus =
                        CardBus { mmu: &mut self.mmu, cycles: self.cycles, fast_requests: &mut self.fast_requests };
                    match self.cards[slot as usize].as_mut() {
                        Some(card) => card.load(&mut r, &mut bus)?,
                        None => return Err(EmuError::StateMismatch(format!("no card in slot {}", slot))),
                    }
                }
            }
        }
        if r.remaining() != 0 {
            return Err(EmuError::StateMismatch(format!("{} trailing bytes", r.remaining())));
        }
        self.cycles = self.cpu.total_cycles;
        self.pacer.resync(Instant::now(), self.cpu.total_cycles);
        Ok(())
    }

    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.save_state_bytes())?;
        Ok(())
    }

    pub fn load_state<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let data = fs::read(path)?;
        self.load_state_bytes(data)
    }
}

impl Drop for Apple2 {
    fn drop(&mut self) {
        self.flush();
    }
}
