//! Apple II ビデオエミュレーション
//!
//! 画面メモリを`VideoSource`経由で読み、テキスト・Lo-Res・Hi-Resを
//! 280×192のRGBA画像へスナップショットする。ソフトスイッチの状態は
//! `VideoMode`で受け取り、マシン本体には触れない。

mod font;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use crate::error::{EmuError, Result};
use crate::providers::{VideoMode, VideoSource};

pub use font::{BUILTIN_FONT, BUILTIN_GLYPHS};

/// 画面サイズ
pub const SCREEN_WIDTH: usize = 280;
pub const SCREEN_HEIGHT: usize = 192;

pub const TEXT_COLUMNS: usize = 40;
pub const TEXT_LINES: usize = 24;

/// キャラクタジェネレータ1ページのサイズ
pub const CHARGEN_PAGE_SIZE: usize = 2048;

/// Apple IIのカラーパレット（Lo-Res 16色）
pub const COLORS: [u32; 16] = [
    0x000000, // 0: Black
    0xDD0033, // 1: Magenta
    0x604EBD, // 2: Dark Blue
    0xFF44FD, // 3: Purple
    0x00A360, // 4: Dark Green
    0x9C9C9C, // 5: Gray 1
    0x14CFFD, // 6: Medium Blue
    0xD0C3FF, // 7: Light Blue
    0x607203, // 8: Brown
    0xFF6A3C, // 9: Orange
    0x9C9C9C, // 10: Gray 2
    0xFFA0D0, // 11: Pink
    0x14F53C, // 12: Light Green
    0xD0DD8D, // 13: Yellow
    0x72FFD0, // 14: Aqua
    0xFFFFFF, // 15: White
];

/// モノクロ表示色
pub const MONO_GREEN: u32 = 0x33FF33;

/// 点滅の半周期（2Hz）
const FLASH_HALF_PERIOD_MS: u128 = 250;

/// テキスト(col, line)の位置をテキストページ先頭からの(ページ, オフセット)で返す
///
/// 行0-7: $000,$080..$380 / 行8-15: $028.. / 行16-23: $050..
pub fn char_address(col: usize, line: usize) -> (u8, u8) {
    let addr = (line / 8) * 40 + (line % 8) * 0x80 + col;
    ((addr >> 8) as u8, addr as u8)
}

/// Hi-Res走査線のHi-Resページ先頭からのオフセット
pub fn hires_line_offset(line: usize) -> u16 {
    ((line >> 6) * 40 + ((line >> 3) & 7) * 0x80 + (line & 7) * 0x400) as u16
}

/// 起動からの経過時間での点滅位相
pub fn flash_phase(elapsed: Duration) -> bool {
    (elapsed.as_millis() / FLASH_HALF_PERIOD_MS) % 2 == 1
}

/// 画面コードをASCIIへ（テキストダンプ用）
pub fn screen_code_to_ascii(code: u8) -> char {
    let c = if code >= 0x80 {
        code & 0x7F
    } else {
        let c = code & 0x3F;
        if c < 0x20 { c + 0x40 } else { c }
    };
    if (0x20..0x7F).contains(&c) { c as char } else { ' ' }
}

//--------------------------------------------------
// キャラクタジェネレータ
//--------------------------------------------------

/// 2KB単位のページを切り替えられる文字ROM
#[derive(Debug, Clone)]
pub struct CharacterGenerator {
    data: Vec<u8>,
    page: usize,
}

impl Default for CharacterGenerator {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CharacterGenerator {
    /// 内蔵フォントを256文字に展開した1ページ
    ///
    /// $E0-$FFは小文字グリフ($40-$5F)、それ以外は下位6ビットのグリフ
    pub fn builtin() -> Self {
        let mut data = vec![0u8; CHARGEN_PAGE_SIZE];
        for code in 0..256usize {
            let glyph = if code >= 0xE0 { 0x40 + (code & 0x1F) } else { code & 0x3F };
            data[code * 8..code * 8 + 8].copy_from_slice(&BUILTIN_FONT[glyph]);
        }
        CharacterGenerator { data, page: 0 }
    }

    /// 外部文字ROM（2048バイトの倍数）
    pub fn from_rom(data: &[u8]) -> Result<Self> {
        if data.is_empty() || data.len() % CHARGEN_PAGE_SIZE != 0 {
            return Err(EmuError::CharRomSize(data.len()));
        }
        log::info!("Loaded character ROM ({} page(s))", data.len() / CHARGEN_PAGE_SIZE);
        Ok(CharacterGenerator { data: data.to_vec(), page: 0 })
    }

    pub fn pages(&self) -> usize {
        self.data.len() / CHARGEN_PAGE_SIZE
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// 次のページへ（最後の次は先頭）
    pub fn next_page(&mut self) -> usize {
        self.page = (self.page + 1) % self.pages();
        self.page
    }

    /// 文字コードのグリフ行（反転・点滅は描画側で掛ける）
    pub fn glyph_row(&self, code: u8, row: usize) -> u8 {
        self.data[self.page * CHARGEN_PAGE_SIZE + code as usize * 8 + (row & 7)]
    }
}

//--------------------------------------------------
// RGBA画像
//--------------------------------------------------

/// RGBAのスナップショット画像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    pub fn new(width: usize, height: usize) -> Self {
        RgbaImage { width, height, pixels: vec![0; width * height * 4] }
    }

    pub fn set(&mut self, x: usize, y: usize, rgb: u32) {
        let i = (y * self.width + x) * 4;
        self.pixels[i] = (rgb >> 16) as u8;
        self.pixels[i + 1] = (rgb >> 8) as u8;
        self.pixels[i + 2] = rgb as u8;
        self.pixels[i + 3] = 0xFF;
    }

    /// 0xRRGGBB形式で取得
    pub fn get(&self, x: usize, y: usize) -> u32 {
        let i = (y * self.width + x) * 4;
        (self.pixels[i] as u32) << 16 | (self.pixels[i + 1] as u32) << 8 | self.pixels[i + 2] as u32
    }

    /// PNGで保存
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), self.width as u32, self.height as u32);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels)?;
        writer.finish()?;
        log::info!("Snapshot saved: {}", path.as_ref().display());
        Ok(())
    }
}

//--------------------------------------------------
// レンダラ
//--------------------------------------------------

/// 画面メモリからスナップショットを作る
#[derive(Debug, Clone)]
pub struct Video {
    pub chargen: CharacterGenerator,
    /// モノクロ時の前景色
    pub mono_color: u32,
}

impl Default for Video {
    fn default() -> Self {
        Self::new(CharacterGenerator::builtin())
    }
}

impl Video {
    pub fn new(chargen: CharacterGenerator) -> Self {
        Video { chargen, mono_color: MONO_GREEN }
    }

    /// 現在のモードで1枚描画
    pub fn snapshot<S: VideoSource + ?Sized>(&self, source: &S, flash: bool) -> RgbaImage {
        let mode = source.video_mode();
        let mut image = RgbaImage::new(SCREEN_WIDTH, SCREEN_HEIGHT);
        if !mode.graphics {
            self.render_text(source, mode, &mut image, 0, flash);
            return image;
        }
        if mode.hires {
            self.render_hires(source, mode, &mut image);
        } else {
            self.render_lores(source, mode, &mut image);
        }
        if mode.mixed {
            self.render_text(source, mode, &mut image, 20, flash);
        }
        image
    }

    /// テキスト画面の内容（24行）
    pub fn text_lines<S: VideoSource + ?Sized>(source: &S) -> Vec<String> {
        let base = text_base(source.video_mode());
        (0..TEXT_LINES)
            .map(|line| {
                (0..TEXT_COLUMNS)
                    .map(|col| screen_code_to_ascii(source.internal_peek(text_addr(base, col, line))))
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .collect()
    }

    fn render_text<S: VideoSource + ?Sized>(
        &self,
        source: &S,
        mode: VideoMode,
        image: &mut RgbaImage,
        first_line: usize,
        flash: bool,
    ) {
        let base = text_base(mode);
        let fg = if mode.color { 0xFFFFFF } else { self.mono_color };
        for line in first_line..TEXT_LINES {
            for col in 0..TEXT_COLUMNS {
                let code = source.internal_peek(text_addr(base, col, line));
                // $00-$3F 反転、$40-$7F 点滅
                let inverse = code < 0x40 || (code < 0x80 && flash);
                for row in 0..8 {
                    let bits = self.chargen.glyph_row(code, row);
                    for x in 0..7 {
                        let on = (bits & (0x40 >> x)) != 0;
                        let color = if on != inverse { fg } else { 0 };
                        image.set(col * 7 + x, line * 8 + row, color);
                    }
                }
            }
        }
    }

    fn render_lores<S: VideoSource + ?Sized>(&self, source: &S, mode: VideoMode, image: &mut RgbaImage) {
        let base = text_base(mode);
        let last_line = if mode.mixed { 20 } else { TEXT_LINES };
        for line in 0..last_line {
            for col in 0..TEXT_COLUMNS {
                let byte = source.internal_peek(text_addr(base, col, line));
                let top = self.lores_color(byte & 0x0F, mode);
                let bottom = self.lores_color(byte >> 4, mode);
                for y in 0..8 {
                    let color = if y < 4 { top } else { bottom };
                    for x in 0..7 {
                        image.set(col * 7 + x, line * 8 + y, color);
                    }
                }
            }
        }
    }

    fn lores_color(&self, index: u8, mode: VideoMode) -> u32 {
        if mode.color {
            COLORS[index as usize]
        } else if index == 0 {
            0
        } else {
            self.mono_color
        }
    }

    fn render_hires<S: VideoSource + ?Sized>(&self, source: &S, mode: VideoMode, image: &mut RgbaImage) {
        let base: u16 = if mode.page2 { 0x4000 } else { 0x2000 };
        let last_line = if mode.mixed { 160 } else { SCREEN_HEIGHT };

        // 0=黒, 1-2=紫/緑, 3-4=青/橙（bit7で半ピクセルずれた組）, 5=白
        let hires_colors: [u32; 6] = [COLORS[0], COLORS[3], COLORS[12], COLORS[6], COLORS[9], COLORS[15]];

        for y in 0..last_line {
            let row_addr = base + hires_line_offset(y);
            let bytes: Vec<u8> = (0..40).map(|x| source.internal_peek(row_addr + x)).collect();
            // 280ドットのビット列と各ドットのパレットビット
            let dot = |x: isize| -> bool {
                if !(0..SCREEN_WIDTH as isize).contains(&x) {
                    return false;
                }
                let x = x as usize;
                (bytes[x / 7] >> (x % 7)) & 1 != 0
            };
            for x in 0..SCREEN_WIDTH {
                let on = dot(x as isize);
                let color = if !mode.color {
                    if on { self.mono_color } else { 0 }
                } else {
                    let left = dot(x as isize - 1);
                    let right = dot(x as isize + 1);
                    let shifted = bytes[x / 7] & 0x80 != 0;
                    let group = if shifted { 3 } else { 1 };
                    if on && (left || right) {
                        hires_colors[5]
                    } else if on {
                        hires_colors[group + (x & 1)]
                    } else if left && right {
                        hires_colors[group + 1 - (x & 1)]
                    } else {
                        hires_colors[0]
                    }
                };
                image.set(x, y, color);
            }
        }
    }
}

fn text_base(mode: VideoMode) -> u16 {
    if mode.page2 { 0x0800 } else { 0x0400 }
}

fn text_addr(base: u16, col: usize, line: usize) -> u16 {
    let (page, offset) = char_address(col, line);
    base + ((page as u16) << 8) + offset as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Screen {
        ram: Vec<u8>,
        mode: VideoMode,
    }

    impl Screen {
        fn new(mode: VideoMode) -> Self {
            Screen { ram: vec![0xA0; 0x6000], mode }
        }
    }

    impl VideoSource for Screen {
        fn internal_peek(&self, addr: u16) -> u8 {
            self.ram[addr as usize]
        }

        fn video_mode(&self) -> VideoMode {
            self.mode
        }
    }

    #[test]
    fn test_char_address() {
        assert_eq!(char_address(0, 0), (0, 0x00));
        assert_eq!(char_address(0, 1), (0, 0x80));
        assert_eq!(char_address(0, 2), (1, 0x00));
        assert_eq!(char_address(0, 8), (0, 0x28));
        assert_eq!(char_address(0, 23), (3, 0xD0));
        assert_eq!(char_address(39, 23), (3, 0xF7));
    }

    #[test]
    fn test_hires_line_offset() {
        assert_eq!(hires_line_offset(0), 0x0000);
        assert_eq!(hires_line_offset(1), 0x0400);
        assert_eq!(hires_line_offset(8), 0x0080);
        assert_eq!(hires_line_offset(64), 0x0028);
        assert_eq!(hires_line_offset(191), 0x1FD0);
    }

    #[test]
    fn test_text_dump() {
        let mut screen = Screen::new(VideoMode::default());
        for (i, b) in b"HELLO".iter().enumerate() {
            screen.ram[0x400 + i] = b | 0x80;
        }
        // 反転の ']' ($1D)
        screen.ram[0x7D0] = 0x1D;
        let lines = Video::text_lines(&screen);
        assert_eq!(lines.len(), 24);
        assert_eq!(lines[0], "HELLO");
        assert_eq!(lines[23], "]");
    }

    #[test]
    fn test_inverse_and_flash() {
        let mut screen = Screen::new(VideoMode { color: true, ..VideoMode::default() });
        let video = Video::default();
        // 空白の反転は全面白、通常の空白は黒
        screen.ram[0x400] = 0x20;
        screen.ram[0x401] = 0x60;
        let image = video.snapshot(&screen, false);
        assert_eq!(image.get(0, 0), 0xFFFFFF);
        assert_eq!(image.get(7, 0), 0);
        assert_eq!(image.get(14, 0), 0);
        let image = video.snapshot(&screen, true);
        assert_eq!(image.get(7, 0), 0xFFFFFF);
    }

    #[test]
    fn test_lores_and_mixed() {
        let mode = VideoMode { graphics: true, mixed: true, color: true, ..VideoMode::default() };
        let mut screen = Screen::new(mode);
        screen.ram[0x400] = 0x1F; // 上: 白, 下: マゼンタ
        let image = Video::default().snapshot(&screen, false);
        assert_eq!(image.get(0, 0), COLORS[15]);
        assert_eq!(image.get(0, 7), COLORS[1]);
        // 下4行はテキスト（$A0 = 通常の空白）
        assert_eq!(image.get(0, 170), 0);
    }

    #[test]
    fn test_hires_white_run() {
        let mode = VideoMode { graphics: true, hires: true, color: true, ..VideoMode::default() };
        let mut screen = Screen::new(mode);
        screen.ram[0x2000..0x2028].fill(0);
        screen.ram[0x2000] = 0x03;
        let image = Video::default().snapshot(&screen, false);
        assert_eq!(image.get(0, 0), COLORS[15]);
        assert_eq!(image.get(1, 0), COLORS[15]);
        assert_eq!(image.get(5, 0), 0);
    }

    #[test]
    fn test_chargen_pages() {
        assert!(matches!(CharacterGenerator::from_rom(&[0; 1000]), Err(EmuError::CharRomSize(1000))));
        let mut rom = vec![0u8; CHARGEN_PAGE_SIZE * 2];
        rom[CHARGEN_PAGE_SIZE + 0xC1 * 8] = 0x7F;
        let mut chargen = CharacterGenerator::from_rom(&rom).unwrap();
        assert_eq!(chargen.pages(), 2);
        assert_eq!(chargen.glyph_row(0xC1, 0), 0);
        assert_eq!(chargen.next_page(), 1);
        assert_eq!(chargen.glyph_row(0xC1, 0), 0x7F);
        assert_eq!(chargen.next_page(), 0);
    }

    #[test]
    fn test_chargen_uses_all_256_glyphs() {
        let mut rom = vec![0u8; CHARGEN_PAGE_SIZE];
        rom[0x21 * 8] = 0x01;
        rom[0x61 * 8] = 0x02;
        rom[0xA1 * 8] = 0x04;
        rom[0xE1 * 8 + 7] = 0x08;
        let chargen = CharacterGenerator::from_rom(&rom).unwrap();
        assert_eq!(chargen.glyph_row(0x21, 0), 0x01);
        assert_eq!(chargen.glyph_row(0x61, 0), 0x02);
        assert_eq!(chargen.glyph_row(0xA1, 0), 0x04);
        assert_eq!(chargen.glyph_row(0xE1, 7), 0x08);

        // 内蔵フォントは通常・反転・点滅で同じ形
        let builtin = CharacterGenerator::builtin();
        for row in 0..8 {
            assert_eq!(builtin.glyph_row(0x01, row), builtin.glyph_row(0xC1, row));
            assert_eq!(builtin.glyph_row(0x41, row), builtin.glyph_row(0xC1, row));
            assert_eq!(builtin.glyph_row(0xE1, row), BUILTIN_FONT[0x41][row]);
        }
    }

    #[test]
    fn test_flash_phase() {
        assert!(!flash_phase(Duration::from_millis(100)));
        assert!(flash_phase(Duration::from_millis(300)));
        assert!(!flash_phase(Duration::from_millis(600)));
    }

    #[test]
    fn test_save_png() {
        let path = std::env::temp_dir().join(format!("a2cycle-snap-{}.png", std::process::id()));
        let image = Video::default().snapshot(&Screen::new(VideoMode::default()), false);
        image.save_png(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        std::fs::remove_file(&path).ok();
    }
}
