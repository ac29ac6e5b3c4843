//! A2Cycle - cycle-paced Apple II emulator core
//!
//! ヘッドレスのランチャー。設定ファイルとコマンドラインからマシンを組み立て、
//! 指定サイクル数だけ実時間で実行し、テキスト画面やスナップショットを出力する。
//!
//! # 使用方法
//! ```text
//! a2cycle --rom roms/apple2plus.rom -1 dos33.dsk --cycles 5000000 --dump-text
//! ```

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;

use a2cycle::apple2::{Apple2, AppleModel};
use a2cycle::command::command_channel;
use a2cycle::config::{default_config_path, Config};
use a2cycle::disk_log::{self, DiskLogLevel};
use a2cycle::error::Result;
use a2cycle::keyboard::key_channel;
use a2cycle::sound::click_channel;

/// A2Cycle - cycle-paced Apple II emulator
#[derive(Parser, Debug)]
#[command(name = "a2cycle")]
#[command(version = "0.1.0")]
#[command(about = "A2Cycle - cycle-paced Apple II emulator core", long_about = None)]
struct Args {
    /// 設定ファイル（JSON）
    #[arg(long)]
    config: Option<PathBuf>,

    /// ROMファイル（12KBまたは16KB）
    #[arg(short, long)]
    rom: Option<String>,

    /// Apple IIモデル (ii, iiplus, iie)
    #[arg(short, long)]
    model: Option<AppleModel>,

    /// ディスクイメージファイル（ドライブ1）
    #[arg(short = '1', long)]
    disk1: Option<String>,

    /// ディスクイメージファイル（ドライブ2）
    #[arg(short = '2', long)]
    disk2: Option<String>,

    /// ProDOSブロックデバイスのイメージ（.po/.hdv/.2mg、未設定ならスロット7）
    #[arg(long)]
    hdv: Option<String>,

    /// 実行するサイクル数
    #[arg(long, default_value = "2000000")]
    cycles: u64,

    /// 速度倍率（1=通常、2=2倍速、0=最高速）
    #[arg(long)]
    speed: Option<u32>,

    /// 起動後に打ち込む文字列（\n で改行）
    #[arg(long)]
    keys: Option<String>,

    /// 終了時にテキスト画面を出力
    #[arg(long)]
    dump_text: bool,

    /// 終了時にPNGスナップショットを保存（省略時はタイムスタンプ名）
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    snapshot: Option<String>,

    /// CPUトレース（RUST_LOG=trace と併用）
    #[arg(long)]
    trace: bool,

    /// ディスクログレベル: none, flow, state, decide, nibble, all
    /// 複数指定可: flow+state
    #[arg(long)]
    disk_log: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load_from(&config_path);

    // コマンドライン指定を優先
    if let Some(rom) = args.rom {
        config.rom = rom;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    if args.disk1.is_some() {
        config.drive1 = args.disk1;
    }
    if args.disk2.is_some() {
        config.drive2 = args.disk2;
    }
    if args.hdv.is_some() {
        config.hdv1 = args.hdv;
        if config.hdv_slot == 0 {
            config.hdv_slot = 7;
        }
    }
    if let Some(speed) = args.speed {
        config.speed = speed;
    }
    if args.trace {
        config.trace = true;
    }
    if let Some(level) = args.disk_log {
        config.disk_log = level;
    }

    if !config.disk_log.is_empty() {
        match DiskLogLevel::parse(&config.disk_log) {
            Some(level) => disk_log::set_log_level(level),
            None => log::warn!("Unknown disk log level '{}', ignored", config.disk_log),
        }
    }

    let mut emu = Apple2::from_config(&config)?;

    let (keys, keyboard) = key_channel(config.key_capacity, emu.model.uppercase_only());
    emu.set_keyboard_provider(Box::new(keyboard));
    let (clicks, _click_rx) = click_channel(config.click_capacity);
    emu.set_speaker_provider(Box::new(clicks));
    let (_commands, command_rx) = command_channel(config.command_capacity);

    if let Some(text) = &args.keys {
        let text = text.replace("\\n", "\n");
        let accepted = keys.send_text(&text);
        log::info!("Queued {} keys", accepted);
    }

    let start = Instant::now();
    let start_cycles = emu.cpu.total_cycles;
    emu.run(&command_rx, Some(args.cycles))?;
    let elapsed = start.elapsed();
    let executed = emu.cpu.total_cycles - start_cycles;
    let mhz = executed as f64 / elapsed.as_secs_f64().max(1e-9) / 1_000_000.0;
    println!("Executed {} cycles in {:?} ({:.3} MHz effective)", executed, elapsed, mhz);
    println!("Final PC: ${:04X}", emu.cpu.regs.pc);

    if args.dump_text {
        for line in emu.text_lines() {
            println!("{}", line);
        }
    }

    if let Some(path) = args.snapshot {
        let path = if path.is_empty() {
            format!("a2cycle_{}.png", chrono::Local::now().format("%Y%m%d_%H%M%S"))
        } else {
            path
        };
        emu.snapshot().save_png(&path)?;
        println!("Snapshot saved: {}", path);
    }

    Ok(())
}
