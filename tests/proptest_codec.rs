//! Property-based tests for the GCR codec and MMU page dispatch.

use a2cycle::disk::gcr::{nib_decode_track, nib_encode_track, odd_even_decode_byte, odd_even_encode_byte};
use a2cycle::disk::{BYTES_PER_TRACK, DOS_SECTOR_ORDER, NIB_TRACK_SIZE, PRODOS_SECTOR_ORDER};
use a2cycle::memory::{Mmu, PageHandler, ABSENT_READ, UNASSIGNED_READ};
use proptest::prelude::*;

// ========== GCR ==========

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: encoding then decoding a track returns the same 4096 bytes
    #[test]
    fn prop_gcr_track_round_trip(
        data in proptest::collection::vec(any::<u8>(), BYTES_PER_TRACK),
        volume in any::<u8>(),
        track in 0u8..35,
        prodos in any::<bool>(),
    ) {
        let order = if prodos { &PRODOS_SECTOR_ORDER } else { &DOS_SECTOR_ORDER };
        let nib = nib_encode_track(&data, volume, track, order);
        prop_assert_eq!(nib.len(), NIB_TRACK_SIZE);
        prop_assert!(nib.iter().all(|b| b & 0x80 != 0));
        let decoded = nib_decode_track(&nib, order).unwrap();
        prop_assert_eq!(decoded, data);
    }

    /// Property: the decoder finds every sector wherever the track starts
    #[test]
    fn prop_gcr_rotated_track_decodes(seed in any::<u8>(), rotate in 0usize..NIB_TRACK_SIZE) {
        let data: Vec<u8> = (0..BYTES_PER_TRACK).map(|i| (i as u8).wrapping_mul(seed)).collect();
        let mut nib = nib_encode_track(&data, 254, 0, &DOS_SECTOR_ORDER);
        nib.rotate_left(rotate);
        prop_assert_eq!(nib_decode_track(&nib, &DOS_SECTOR_ORDER).unwrap(), data);
    }
}

proptest! {
    /// Property: 4-and-4 encoding round-trips and always sets bit 7
    #[test]
    fn prop_odd_even_round_trip(value in any::<u8>()) {
        let [odd, even] = odd_even_encode_byte(value);
        prop_assert!(odd & 0xAA == 0xAA);
        prop_assert!(even & 0xAA == 0xAA);
        prop_assert_eq!(odd_even_decode_byte(odd, even), value);
    }
}

// ========== MMU ==========

fn mmu_with_ram() -> Mmu {
    let mut mmu = Mmu::new();
    let ram = mmu.add_ram_block("main", 0xC000);
    mmu.set_pages_read(0x00, 0xBF, PageHandler::Ram { block: ram, page: 0 });
    mmu.set_pages_write(0x00, 0xBF, PageHandler::Ram { block: ram, page: 0 });
    mmu.set_pages_read(0xD0, 0xDF, PageHandler::Unassigned);
    mmu
}

proptest! {
    /// Property: a poke to RAM is read back by a peek at the same address
    #[test]
    fn prop_ram_round_trip(addr in 0u16..0xC000, value in any::<u8>()) {
        let mut mmu = mmu_with_ram();
        mmu.poke(addr, value);
        prop_assert_eq!(mmu.peek(addr), value);
        prop_assert_eq!(mmu.internal_peek(addr), value);
    }

    /// Property: unassigned pages read $DD and absent pages read $F4
    #[test]
    fn prop_unmapped_reads(low in any::<u8>(), value in any::<u8>()) {
        let mut mmu = mmu_with_ram();
        let unassigned = 0xD000 | low as u16;
        let absent = 0xE000 | low as u16;
        mmu.poke(unassigned, value);
        mmu.poke(absent, value);
        prop_assert_eq!(mmu.peek(unassigned), UNASSIGNED_READ);
        prop_assert_eq!(mmu.peek(absent), ABSENT_READ);
    }

    /// Property: a poke to a ROM page never changes what a peek returns
    #[test]
    fn prop_rom_ignores_pokes(addr in 0xD000u16..=0xFFFF, value in any::<u8>(), seed in any::<u8>()) {
        let image: Vec<u8> = (0..0x3000usize).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect();
        let mut mmu = Mmu::new();
        let rom = mmu.add_rom_block("rom", &image);
        mmu.set_pages_read(0xD0, 0xFF, PageHandler::Rom { block: rom, page: 0 });
        mmu.set_pages_write(0xD0, 0xFF, PageHandler::Rom { block: rom, page: 0 });
        let burned = image[(addr - 0xD000) as usize];
        mmu.poke(addr, value);
        prop_assert_eq!(mmu.peek(addr), burned);
        prop_assert_eq!(mmu.internal_peek(addr), burned);
    }

    /// Property: separate read and write handlers route one page two ways
    #[test]
    fn prop_split_read_write(offset in any::<u8>(), value in any::<u8>()) {
        let mut mmu = Mmu::new();
        let a = mmu.add_ram_block("a", 0x100);
        let b = mmu.add_ram_block("b", 0x100);
        mmu.set_pages_read(0x20, 0x20, PageHandler::Ram { block: a, page: 0 });
        mmu.set_pages_write(0x20, 0x20, PageHandler::Ram { block: b, page: 0 });
        let addr = 0x2000 | offset as u16;
        mmu.poke(addr, value);
        prop_assert_eq!(mmu.block(b)[offset as usize], value);
        prop_assert_eq!(mmu.peek(addr), 0);
    }
}
