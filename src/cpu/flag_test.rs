use pretty_assertions::assert_eq;

use crate::cpu::flag::{Flags, FLAG_CF, FLAG_DF, FLAG_ZF};

#[test]
fn flag_writes_are_compositional() {
    let mut flags = Flags::default();
    flags.set_zero(true);
    flags.set_carry(true);
    flags.set_direction(true);
    assert!(flags.zero());
    assert!(flags.carry());
    assert!(flags.direction());

    flags.set_zero(false);
    assert!(!flags.zero());
    assert!(flags.carry());
    assert!(flags.direction());

    flags.set_carry(false);
    assert!(flags.direction());
    assert!(!flags.zero());
}

#[test]
fn undefined_bits_are_preserved() {
    let mut flags = Flags::new_from_u32(0xFFFF_FFFF);
    flags.set_zero(false);
    assert_eq!(0xFFFF_FFFF & !FLAG_ZF, flags.u32());
    flags.set_carry(false);
    flags.set_direction(false);
    assert_eq!(0xFFFF_FFFF & !(FLAG_ZF | FLAG_CF | FLAG_DF), flags.u32());
}

#[test]
fn defined_bits_match_the_eflags_layout() {
    assert_eq!(0x0000_0001, FLAG_CF);
    assert_eq!(0x0000_0040, FLAG_ZF);
    assert_eq!(0x0000_0200, FLAG_DF);
}
