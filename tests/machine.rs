//! End-to-end machine tests: boot, Disk II through the bus, save states.
//!
//! Tests that need real ROM or disk images run only when the environment
//! points at them:
//!   A2CYCLE_ROM       12K/16K system ROM
//!   A2CYCLE_DISK_ROM  256-byte Disk II P5 ROM
//!   A2CYCLE_DOS33     DOS 3.3 system master (.dsk)

use std::fs;
use std::path::PathBuf;

use a2cycle::apple2::{Apple2, AppleModel, ROM_SIZE_12K};
use a2cycle::cards::{DiskIICard, LanguageCard};
use a2cycle::config::{Config, Slot0Card};
use a2cycle::cpu::{IllegalOpcodePolicy, MemoryBus};
use a2cycle::disk::gcr::nib_encode_track;
use a2cycle::disk::woz::build_woz2;
use a2cycle::disk::{DiskFormat, Diskette, BYTES_PER_TRACK, DEFAULT_VOLUME, DOS_SECTOR_ORDER, DSK_SIZE};
use a2cycle::keyboard::key_channel;

/// $F000から`program`を置いた12KB ROM（リセットベクタ = $F000）
fn rom_with(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0xEA; ROM_SIZE_12K];
    rom[0x2000..0x2000 + program.len()].copy_from_slice(program);
    rom[0x2FFC] = 0x00;
    rom[0x2FFD] = 0xF0;
    rom
}

fn machine(program: &[u8]) -> Apple2 {
    let mut emu = Apple2::new(AppleModel::AppleIIPlus, &rom_with(program), IllegalOpcodePolicy::Fatal).unwrap();
    emu.reset();
    emu
}

fn with_disk_card(program: &[u8]) -> Apple2 {
    let mut emu = machine(program);
    emu.insert_card(6, Box::new(DiskIICard::new(None).unwrap())).unwrap();
    emu
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("a2cycle_{}_{}", std::process::id(), name))
}

/// 画面を空白で埋め、最下行に']'を出してキー入力をエコーする
const PROMPT_PROGRAM: &[u8] = &[
    0xA2, 0x00,       // F000 LDX #$00
    0xA9, 0xA0,       // F002 LDA #$A0
    0x9D, 0x00, 0x04, // F004 STA $0400,X
    0x9D, 0x00, 0x05, // F007 STA $0500,X
    0x9D, 0x00, 0x06, // F00A STA $0600,X
    0x9D, 0x00, 0x07, // F00D STA $0700,X
    0xE8,             // F010 INX
    0xD0, 0xF1,       // F011 BNE $F004
    0xA9, 0xDD,       // F013 LDA #$DD (']')
    0x8D, 0xD0, 0x07, // F015 STA $07D0
    0xAD, 0x00, 0xC0, // F018 LDA $C000
    0x10, 0xFB,       // F01B BPL $F018
    0x8D, 0x10, 0xC0, // F01D STA $C010
    0x8D, 0xD1, 0x07, // F020 STA $07D1
    0x4C, 0x18, 0xF0, // F023 JMP $F018
];

#[test]
fn test_synthetic_rom_boots_to_prompt() {
    let mut emu = machine(PROMPT_PROGRAM);
    emu.run_cycles(20_000).unwrap();
    let lines = emu.text_lines();
    assert_eq!(lines[23], "]");
    assert!(lines[..23].iter().all(|l| l.is_empty()));

    let (keys, keyboard) = key_channel(8, true);
    emu.set_keyboard_provider(Box::new(keyboard));
    assert!(keys.send_char('a'));
    emu.run_cycles(1_000).unwrap();
    assert_eq!(emu.text_lines()[23], "]A");
}

#[test]
fn test_half_track_motion_through_bus() {
    let mut emu = with_disk_card(&[]);
    for addr in [0xC0E3, 0xC0E5, 0xC0E7, 0xC0E1, 0xC0E3] {
        emu.read(addr);
    }
    let disk = emu.disk2().unwrap();
    assert_eq!(disk.half_track(0), 5);
    assert_eq!(disk.half_track(1), 0);
}

#[test]
fn test_motor_requests_fast_mode() {
    let mut emu = with_disk_card(&[]);
    assert!(!emu.is_unthrottled());
    emu.read(0xC0E9);
    assert_eq!(emu.fast_requests(), 1);
    assert!(emu.is_unthrottled());
    emu.read(0xC0E8);
    assert_eq!(emu.fast_requests(), 0);
}

/// モーターONでトラックを読み、アドレスフィールドのプロローグを数える
const PROLOGUE_COUNTER: &[u8] = &[
    0xAD, 0xE9, 0xC0, // F000 LDA $C0E9
    0xAD, 0xEE, 0xC0, // F003 LDA $C0EE
    0xAD, 0xEC, 0xC0, // F006 LDA $C0EC
    0x10, 0xFB,       // F009 BPL $F006
    0xC9, 0xD5,       // F00B CMP #$D5
    0xD0, 0xF7,       // F00D BNE $F006
    0xAD, 0xEC, 0xC0, // F00F LDA $C0EC
    0x10, 0xFB,       // F012 BPL $F00F
    0xC9, 0xAA,       // F014 CMP #$AA
    0xD0, 0xEE,       // F016 BNE $F006
    0xAD, 0xEC, 0xC0, // F018 LDA $C0EC
    0x10, 0xFB,       // F01B BPL $F018
    0xC9, 0x96,       // F01D CMP #$96
    0xD0, 0xE5,       // F01F BNE $F006
    0xEE, 0x00, 0x03, // F021 INC $0300
    0x4C, 0x06, 0xF0, // F024 JMP $F006
];

#[test]
fn test_woz_bitstream_read_by_cpu() {
    let nib = nib_encode_track(&vec![0u8; BYTES_PER_TRACK], DEFAULT_VOLUME, 0, &DOS_SECTOR_ORDER);
    let woz = Diskette::from_bytes("sync.woz", DiskFormat::Woz, &build_woz2(&[nib]), None).unwrap();
    let mut emu = with_disk_card(PROLOGUE_COUNTER);
    emu.disk2_mut().unwrap().insert_diskette(0, woz).unwrap();

    // 1回転（6656バイト × 32サイクル）と少し
    emu.run_cycles(6656 * 32 + 20_000).unwrap();
    let found = emu.read(0x0300);
    assert!(found >= 16, "found {} address prologues", found);
}

#[test]
fn test_nib_bytes_read_by_cpu() {
    let dsk = Diskette::from_bytes("zero.dsk", DiskFormat::Dsk, &vec![0u8; DSK_SIZE], None).unwrap();
    let mut emu = with_disk_card(PROLOGUE_COUNTER);
    emu.disk2_mut().unwrap().insert_diskette(0, dsk).unwrap();
    emu.run_cycles(200_000).unwrap();
    assert!(emu.read(0x0300) >= 16);
}

#[test]
fn test_write_protect_sensed_through_bus() {
    let woz = build_woz2(&[vec![0xFF; 6656]]);
    let mut emu = with_disk_card(&[]);
    emu.disk2_mut()
        .unwrap()
        .insert_diskette(0, Diskette::from_bytes("p.woz", DiskFormat::Woz, &woz, None).unwrap())
        .unwrap();
    emu.read(0xC0ED);
    assert_eq!(emu.read(0xC0EE) & 0x80, 0x80);
}

#[test]
fn test_track_write_commits_to_file() {
    let path = temp_path("write.dsk");
    fs::write(&path, vec![0u8; DSK_SIZE]).unwrap();

    let new_data: Vec<u8> = (0..BYTES_PER_TRACK).map(|i| (i % 251) as u8).collect();
    let nib = nib_encode_track(&new_data, DEFAULT_VOLUME, 0, &DOS_SECTOR_ORDER);
    {
        let mut emu = with_disk_card(&[]);
        emu.load_disk(0, &path).unwrap();
        emu.read(0xC0E9);
        // Q6H（プロテクトセンス）→ Q7H で書き込みモード
        assert_eq!(emu.read(0xC0ED) & 0x80, 0);
        emu.write(0xC0EF, nib[0]);
        emu.read(0xC0EC);
        for &byte in &nib[1..] {
            emu.write(0xC0ED, byte);
            emu.read(0xC0EC);
        }
        emu.read(0xC0EE);
        // モーターOFFで書き戻し
        emu.read(0xC0E8);
        assert!(!emu.disk2().unwrap().is_motor_on());
    }
    let written = fs::read(&path).unwrap();
    assert_eq!(&written[..BYTES_PER_TRACK], &new_data[..]);
    assert!(written[BYTES_PER_TRACK..].iter().all(|&b| b == 0));
    fs::remove_file(&path).unwrap();
}

#[test]
fn test_save_load_with_cards() {
    let mut emu = with_disk_card(&[0xE8, 0x4C, 0x00, 0xF0]);
    emu.insert_card(0, Box::new(LanguageCard::new())).unwrap();
    emu.run_cycles(1_000).unwrap();
    emu.read(0xC0E3);
    emu.read(0xC0E9);
    emu.read(0xC08B);
    emu.read(0xC08B);
    emu.write(0xD123, 0x5A);

    let path = temp_path("state.bin");
    emu.save_state(&path).unwrap();
    let pc = emu.cpu.regs.pc;
    let x = emu.cpu.regs.x;

    emu.run_cycles(1_000).unwrap();
    emu.read(0xC0E5);
    emu.read(0xC0E8);
    emu.read(0xC08A);

    emu.load_state(&path).unwrap();
    assert_eq!(emu.cpu.regs.pc, pc);
    assert_eq!(emu.cpu.regs.x, x);
    assert_eq!(emu.disk2().unwrap().half_track(0), 1);
    assert!(emu.disk2().unwrap().is_motor_on());
    assert_eq!(emu.fast_requests(), 1);
    assert_eq!(emu.read(0xD123), 0x5A);
    fs::remove_file(&path).unwrap();
}

/// テキストページへXの値を書き続ける
const SCREEN_FILLER: &[u8] = &[
    0xA2, 0x00,       // F000 LDX #$00
    0x8A,             // F002 TXA
    0x9D, 0x00, 0x04, // F003 STA $0400,X
    0x9D, 0x80, 0x06, // F006 STA $0680,X
    0xE8,             // F009 INX
    0x38,             // F00A SEC
    0x4C, 0x02, 0xF0, // F00B JMP $F002
];

fn text_page(emu: &mut Apple2) -> Vec<u8> {
    (0x0400..0x0800).map(|addr| emu.read(addr)).collect()
}

#[test]
fn test_state_survives_reset_and_wipe() {
    let mut emu = with_disk_card(SCREEN_FILLER);
    emu.insert_card(0, Box::new(LanguageCard::new())).unwrap();
    emu.run_cycles(1_000_000).unwrap();
    emu.read(0xC0E3);
    emu.read(0xC0E9);
    emu.read(0xC08B);
    emu.read(0xC08B);
    emu.write(0xD000, 0xA5);

    let saved = emu.save_state_bytes();
    let cycles = emu.cpu.total_cycles;
    let status = emu.cpu.regs.status;
    let screen = text_page(&mut emu);
    assert!(screen.iter().any(|&b| b != 0));

    emu.reset();
    emu.wipe_ram();
    assert!(text_page(&mut emu).iter().all(|&b| b == 0));

    emu.load_state_bytes(saved.clone()).unwrap();
    assert_eq!(emu.cpu.total_cycles, cycles);
    assert_eq!(emu.cpu.regs.status, status);
    assert_eq!(text_page(&mut emu), screen);
    assert_eq!(emu.read(0xD000), 0xA5);
    assert_eq!(emu.save_state_bytes(), saved);
}

#[test]
fn test_cfff_releases_expansion_rom() {
    let mut emu = machine(&[]);
    // $C800-$CFFEは拡張ROMなしで未割り当て
    assert_eq!(emu.read(0xC800), 0xDD);
    emu.read(0xCFFF);
    assert_eq!(emu.read(0xC800), 0xDD);
}

//--------------------------------------------------
// 実ROM・実ディスク（環境変数があるときだけ）
//--------------------------------------------------

fn env_path(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(path) if !path.is_empty() => Some(path),
        _ => {
            eprintln!("{} not set; skipping", name);
            None
        }
    }
}

/// ブロック0: スロット値を画面へ出し、$0800をブロック1へ書き戻して結果を表示
const BLOCK_BOOT: &[u8] = &[
    0x01,             // 0800
    0x8E, 0x00, 0x04, // 0801 STX $0400
    0xA9, 0xC1,       // 0804 LDA #$C1
    0x8D, 0x01, 0x04, // 0806 STA $0401
    0xA9, 0x02,       // 0809 LDA #WRITE
    0x85, 0x42,       // 080B STA $42
    0xA9, 0x01,       // 080D LDA #$01
    0x85, 0x46,       // 080F STA $46
    0x20, 0x30, 0xC7, // 0811 JSR $C730
    0x69, 0x41,       // 0814 ADC #$41
    0x8D, 0x02, 0x04, // 0816 STA $0402
    0x4C, 0x19, 0x08, // 0819 JMP $0819
];

#[test]
fn test_block_device_boots_and_writes() {
    let rom_path = temp_path("hd.rom");
    fs::write(&rom_path, rom_with(&[0x4C, 0x00, 0xC7])).unwrap();
    let image_path = temp_path("boot.po");
    let mut image = vec![0u8; 280 * 512];
    image[..BLOCK_BOOT.len()].copy_from_slice(BLOCK_BOOT);
    fs::write(&image_path, &image).unwrap();

    let config = Config {
        rom: rom_path.to_string_lossy().into_owned(),
        disk_slot: 0,
        slot0: Slot0Card::None,
        hdv_slot: 7,
        hdv1: Some(image_path.to_string_lossy().into_owned()),
        speed: 0,
        ..Config::default()
    };
    let mut emu = Apple2::from_config(&config).unwrap();
    assert_eq!(emu.hard_disk().unwrap().volume(0).unwrap().block_count(), 280);
    emu.run_cycles(50_000).unwrap();

    assert_eq!(emu.mmu.internal_peek(0x0400), 0x70);
    assert_eq!(emu.mmu.internal_peek(0x0401), 0xC1);
    // 成功ならA=0・キャリー0
    assert_eq!(emu.mmu.internal_peek(0x0402), 0x41);
    assert_eq!(emu.hard_disk().unwrap().last_error(), 0);
    let written = fs::read(&image_path).unwrap();
    assert_eq!(&written[512..1024], &written[..512]);

    emu.hard_disk_mut().unwrap().eject(0);
    assert!(emu.load_volume(0, temp_path("missing.po")).is_err());
    fs::remove_file(&rom_path).ok();
    fs::remove_file(&image_path).ok();
}

#[test]
fn test_cold_boot_to_basic_prompt() {
    let Some(rom) = env_path("A2CYCLE_ROM") else { return };
    let config = Config {
        rom,
        disk_slot: 0,
        slot0: Slot0Card::Language,
        speed: 0,
        ..Config::default()
    };
    let mut emu = Apple2::from_config(&config).unwrap();
    emu.run_cycles(3_000_000).unwrap();
    let lines = emu.text_lines();
    assert!(lines.iter().any(|l| l.starts_with(']')), "screen:\n{}", lines.join("\n"));
}

#[test]
fn test_dos33_boot() {
    let (Some(rom), Some(disk_rom), Some(dos)) =
        (env_path("A2CYCLE_ROM"), env_path("A2CYCLE_DISK_ROM"), env_path("A2CYCLE_DOS33"))
    else {
        return;
    };
    let config = Config {
        rom,
        disk_rom: Some(disk_rom),
        disk_slot: 6,
        speed: 0,
        ..Config::default()
    };
    let mut emu = Apple2::from_config(&config).unwrap();
    // 元のイメージを書き換えないよう書き戻しなしで挿入
    let data = fs::read(&dos).unwrap();
    let diskette = Diskette::from_bytes("dos33.dsk", DiskFormat::Dsk, &data, None).unwrap();
    emu.disk2_mut().unwrap().insert_diskette(0, diskette).unwrap();
    emu.reset();
    emu.run_cycles(10_000_000).unwrap();
    let lines = emu.text_lines();
    assert!(
        lines.iter().any(|l| l.to_ascii_uppercase().contains("DOS VERSION 3.3")),
        "screen:\n{}",
        lines.join("\n")
    );
}
