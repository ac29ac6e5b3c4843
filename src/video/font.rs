//! 内蔵キャラクタジェネレータ
//!
//! 1文字8行、各行の下位7ビットを使用（bit6が左端）。
//! $00-$3Fは大文字・記号、$40-$5Fは小文字。

/// 内蔵フォントの文字数
pub const BUILTIN_GLYPHS: usize = 96;

pub const BUILTIN_FONT: [[u8; 8]; BUILTIN_GLYPHS] = [
    [0x1C, 0x22, 0x2A, 0x2E, 0x2C, 0x20, 0x1E, 0x00], // $00 @
    [0x08, 0x14, 0x22, 0x22, 0x3E, 0x22, 0x22, 0x00], // $01 A
    [0x3C, 0x22, 0x22, 0x3C, 0x22, 0x22, 0x3C, 0x00], // $02 B
    [0x1C, 0x22, 0x20, 0x20, 0x20, 0x22, 0x1C, 0x00], // $03 C
    [0x3C, 0x22, 0x22, 0x22, 0x22, 0x22, 0x3C, 0x00], // $04 D
    [0x3E, 0x20, 0x20, 0x3C, 0x20, 0x20, 0x3E, 0x00], // $05 E
    [0x3E, 0x20, 0x20, 0x3C, 0x20, 0x20, 0x20, 0x00], // $06 F
    [0x1E, 0x20, 0x20, 0x2E, 0x22, 0x22, 0x1E, 0x00], // $07 G
    [0x22, 0x22, 0x22, 0x3E, 0x22, 0x22, 0x22, 0x00], // $08 H
    [0x1C, 0x08, 0x08, 0x08, 0x08, 0x08, 0x1C, 0x00], // $09 I
    [0x02, 0x02, 0x02, 0x02, 0x02, 0x22, 0x1C, 0x00], // $0A J
    [0x22, 0x24, 0x28, 0x30, 0x28, 0x24, 0x22, 0x00], // $0B K
    [0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x3E, 0x00], // $0C L
    [0x22, 0x36, 0x2A, 0x2A, 0x22, 0x22, 0x22, 0x00], // $0D M
    [0x22, 0x32, 0x2A, 0x26, 0x22, 0x22, 0x22, 0x00], // $0E N
    [0x1C, 0x22, 0x22, 0x22, 0x22, 0x22, 0x1C, 0x00], // $0F O
    [0x3C, 0x22, 0x22, 0x3C, 0x20, 0x20, 0x20, 0x00], // $10 P
    [0x1C, 0x22, 0x22, 0x22, 0x2A, 0x24, 0x1A, 0x00], // $11 Q
    [0x3C, 0x22, 0x22, 0x3C, 0x28, 0x24, 0x22, 0x00], // $12 R
    [0x1C, 0x22, 0x20, 0x1C, 0x02, 0x22, 0x1C, 0x00], // $13 S
    [0x3E, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x00], // $14 T
    [0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x1C, 0x00], // $15 U
    [0x22, 0x22, 0x22, 0x22, 0x14, 0x14, 0x08, 0x00], // $16 V
    [0x22, 0x22, 0x22, 0x2A, 0x2A, 0x36, 0x22, 0x00], // $17 W
    [0x22, 0x22, 0x14, 0x08, 0x14, 0x22, 0x22, 0x00], // $18 X
    [0x22, 0x22, 0x14, 0x08, 0x08, 0x08, 0x08, 0x00], // $19 Y
    [0x3E, 0x02, 0x04, 0x08, 0x10, 0x20, 0x3E, 0x00], // $1A Z
    [0x1E, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1E, 0x00], // $1B [
    [0x00, 0x20, 0x10, 0x08, 0x04, 0x02, 0x00, 0x00], // $1C \
    [0x1E, 0x02, 0x02, 0x02, 0x02, 0x02, 0x1E, 0x00], // $1D ]
    [0x08, 0x14, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00], // $1E ^
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3F, 0x00], // $1F _
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // $20 space
    [0x08, 0x08, 0x08, 0x08, 0x08, 0x00, 0x08, 0x00], // $21 !
    [0x14, 0x14, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00], // $22 "
    [0x14, 0x14, 0x3E, 0x14, 0x3E, 0x14, 0x14, 0x00], // $23 #
    [0x08, 0x1E, 0x28, 0x1C, 0x0A, 0x3C, 0x08, 0x00], // $24 $
    [0x30, 0x32, 0x04, 0x08, 0x10, 0x26, 0x06, 0x00], // $25 %
    [0x10, 0x28, 0x28, 0x10, 0x2A, 0x24, 0x1A, 0x00], // $26 &
    [0x08, 0x08, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00], // $27 '
    [0x04, 0x08, 0x10, 0x10, 0x10, 0x08, 0x04, 0x00], // $28 (
    [0x10, 0x08, 0x04, 0x04, 0x04, 0x08, 0x10, 0x00], // $29 )
    [0x00, 0x08, 0x2A, 0x1C, 0x2A, 0x08, 0x00, 0x00], // $2A *
    [0x00, 0x08, 0x08, 0x3E, 0x08, 0x08, 0x00, 0x00], // $2B +
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x08, 0x10], // $2C ,
    [0x00, 0x00, 0x00, 0x3E, 0x00, 0x00, 0x00, 0x00], // $2D -
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00], // $2E .
    [0x00, 0x02, 0x04, 0x08, 0x10, 0x20, 0x00, 0x00], // $2F /
    [0x1C, 0x22, 0x26, 0x2A, 0x32, 0x22, 0x1C, 0x00], // $30 0
    [0x08, 0x18, 0x08, 0x08, 0x08, 0x08, 0x1C, 0x00], // $31 1
    [0x1C, 0x22, 0x02, 0x0C, 0x10, 0x20, 0x3E, 0x00], // $32 2
    [0x1C, 0x22, 0x02, 0x0C, 0x02, 0x22, 0x1C, 0x00], // $33 3
    [0x04, 0x0C, 0x14, 0x24, 0x3E, 0x04, 0x04, 0x00], // $34 4
    [0x3E, 0x20, 0x3C, 0x02, 0x02, 0x22, 0x1C, 0x00], // $35 5
    [0x0E, 0x10, 0x20, 0x3C, 0x22, 0x22, 0x1C, 0x00], // $36 6
    [0x3E, 0x02, 0x04, 0x08, 0x10, 0x10, 0x10, 0x00], // $37 7
    [0x1C, 0x22, 0x22, 0x1C, 0x22, 0x22, 0x1C, 0x00], // $38 8
    [0x1C, 0x22, 0x22, 0x1E, 0x02, 0x04, 0x38, 0x00], // $39 9
    [0x00, 0x00, 0x08, 0x00, 0x00, 0x08, 0x00, 0x00], // $3A :
    [0x00, 0x00, 0x08, 0x00, 0x00, 0x08, 0x08, 0x10], // $3B ;
    [0x04, 0x08, 0x10, 0x20, 0x10, 0x08, 0x04, 0x00], // $3C <
    [0x00, 0x00, 0x3E, 0x00, 0x3E, 0x00, 0x00, 0x00], // $3D =
    [0x10, 0x08, 0x04, 0x02, 0x04, 0x08, 0x10, 0x00], // $3E >
    [0x1C, 0x22, 0x02, 0x04, 0x08, 0x00, 0x08, 0x00], // $3F ?
    [0x10, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // $40 `
    [0x00, 0x00, 0x1C, 0x02, 0x1E, 0x22, 0x1E, 0x00], // $41 a
    [0x20, 0x20, 0x3C, 0x22, 0x22, 0x22, 0x3C, 0x00], // $42 b
    [0x00, 0x00, 0x1C, 0x20, 0x20, 0x20, 0x1C, 0x00], // $43 c
    [0x02, 0x02, 0x1E, 0x22, 0x22, 0x22, 0x1E, 0x00], // $44 d
    [0x00, 0x00, 0x1C, 0x22, 0x3E, 0x20, 0x1C, 0x00], // $45 e
    [0x0C, 0x10, 0x10, 0x3C, 0x10, 0x10, 0x10, 0x00], // $46 f
    [0x00, 0x00, 0x1E, 0x22, 0x22, 0x1E, 0x02, 0x1C], // $47 g
    [0x20, 0x20, 0x3C, 0x22, 0x22, 0x22, 0x22, 0x00], // $48 h
    [0x08, 0x00, 0x18, 0x08, 0x08, 0x08, 0x1C, 0x00], // $49 i
    [0x04, 0x00, 0x04, 0x04, 0x04, 0x04, 0x24, 0x18], // $4A j
    [0x20, 0x20, 0x24, 0x28, 0x30, 0x28, 0x24, 0x00], // $4B k
    [0x18, 0x08, 0x08, 0x08, 0x08, 0x08, 0x1C, 0x00], // $4C l
    [0x00, 0x00, 0x36, 0x2A, 0x2A, 0x2A, 0x22, 0x00], // $4D m
    [0x00, 0x00, 0x3C, 0x22, 0x22, 0x22, 0x22, 0x00], // $4E n
    [0x00, 0x00, 0x1C, 0x22, 0x22, 0x22, 0x1C, 0x00], // $4F o
    [0x00, 0x00, 0x3C, 0x22, 0x22, 0x3C, 0x20, 0x20], // $50 p
    [0x00, 0x00, 0x1E, 0x22, 0x22, 0x1E, 0x02, 0x02], // $51 q
    [0x00, 0x00, 0x2C, 0x32, 0x20, 0x20, 0x20, 0x00], // $52 r
    [0x00, 0x00, 0x1E, 0x20, 0x1C, 0x02, 0x3C, 0x00], // $53 s
    [0x10, 0x10, 0x3C, 0x10, 0x10, 0x10, 0x0C, 0x00], // $54 t
    [0x00, 0x00, 0x22, 0x22, 0x22, 0x22, 0x1E, 0x00], // $55 u
    [0x00, 0x00, 0x22, 0x22, 0x22, 0x14, 0x08, 0x00], // $56 v
    [0x00, 0x00, 0x22, 0x2A, 0x2A, 0x2A, 0x14, 0x00], // $57 w
    [0x00, 0x00, 0x22, 0x14, 0x08, 0x14, 0x22, 0x00], // $58 x
    [0x00, 0x00, 0x22, 0x22, 0x22, 0x1E, 0x02, 0x1C], // $59 y
    [0x00, 0x00, 0x3E, 0x04, 0x08, 0x10, 0x3E, 0x00], // $5A z
    [0x04, 0x08, 0x08, 0x10, 0x08, 0x08, 0x04, 0x00], // $5B {
    [0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x00], // $5C |
    [0x10, 0x08, 0x08, 0x04, 0x08, 0x08, 0x10, 0x00], // $5D }
    [0x00, 0x00, 0x10, 0x2A, 0x04, 0x00, 0x00, 0x00], // $5E ~
    [0x3E, 0x3E, 0x3E, 0x3E, 0x3E, 0x3E, 0x3E, 0x00], // $5F block
];
