use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use pretty_assertions::assert_eq;

use mzbox::cpu::{R16, R8};
use mzbox::dos::IntHandlers;
use mzbox::machine::{run_exe, run_exe_with_handlers};
use mzbox::EmuError;

/// an output sink that stays inspectable after the machine takes
/// ownership of its clone
#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// minimal MZ header: 2 paragraphs, SS=1, SP=0x1000, CS=0, IP=0
fn minimal_header() -> Vec<u8> {
    vec![
        0x4D, 0x5A, 0x2B, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x01, 0xFF, 0xFF, 0x01, 0x00,
        0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ]
}

/// header declaring one relocation item, with the relocation table in
/// the third header paragraph
fn header_with_relocation() -> Vec<u8> {
    vec![
        0x4D, 0x5A, 0x4F, 0x00, 0x01, 0x00, 0x01, 0x00, 0x03, 0x00, 0x01, 0x01, 0xFF, 0xFF, 0x01, 0x00,
        0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ]
}

#[test]
fn exit_status_via_ax_shift() {
    let mut image = minimal_header();
    image.extend_from_slice(&[0xB8, 0x4C, 0x00]); // mov ax,0x4c
    image.extend_from_slice(&[0xC1, 0xE0, 0x08]); // shl ax,8
    image.extend_from_slice(&[0x83, 0xC0, 0x01]); // add ax,byte +0x1
    image.extend_from_slice(&[0xCD, 0x21]); // int 0x21

    let machine = run_exe(&image[..]).unwrap();
    assert_eq!(0x4C01, machine.cpu.get_r16(R16::AX));
    assert_eq!(0x4C, machine.cpu.get_r8(R8::AH));
    assert_eq!(0x01, machine.cpu.get_r8(R8::AL));
    assert_eq!(0x01, machine.exit_code());
}

#[test]
fn push_pop_swap() {
    let mut image = minimal_header();
    image.extend_from_slice(&[0xB8, 0x35, 0x10]); // mov ax,0x1035
    image.extend_from_slice(&[0xB9, 0x36, 0x20]); // mov cx,0x2036
    image.extend_from_slice(&[0x50]); // push ax
    image.extend_from_slice(&[0x51]); // push cx
    image.extend_from_slice(&[0x5B]); // pop bx
    image.extend_from_slice(&[0x5A]); // pop dx
    image.extend_from_slice(&[0xB8, 0x00, 0x4C]); // mov ax,0x4c00
    image.extend_from_slice(&[0xCD, 0x21]); // int 0x21

    let machine = run_exe(&image[..]).unwrap();
    assert_eq!(0x1035, machine.cpu.get_r16(R16::DX));
    assert_eq!(0x2036, machine.cpu.get_r16(R16::BX));
    assert_eq!(0x1000, machine.cpu.get_r16(R16::SP));
    assert_eq!(0x00, machine.exit_code());
}

#[test]
fn int21_09_writes_the_string_to_the_sink() {
    let mut image = header_with_relocation();
    image.extend_from_slice(&[0xB8, 0x01, 0x00]); // mov ax,seg msg
    image.extend_from_slice(&[0x8E, 0xD8]); // mov ds,ax
    image.extend_from_slice(&[0xB4, 0x09]); // mov ah,0x9
    image.extend_from_slice(&[0x8D, 0x16, 0x02, 0x00]); // lea dx,[0x0002]
    image.extend_from_slice(&[0xCD, 0x21]); // int 0x21
    image.extend_from_slice(&[0xB8, 0x00, 0x4C]); // mov ax,0x4c00
    image.extend_from_slice(&[0xCD, 0x21]); // int 0x21
    image.extend_from_slice(b"Hello world!$");

    let sink = SharedSink::default();
    let machine =
        run_exe_with_handlers(&image[..], IntHandlers::new(), Box::new(sink.clone())).unwrap();
    // the $ terminator is not emitted
    assert_eq!(b"Hello world!".to_vec(), *sink.0.borrow());
    assert_eq!(0x00, machine.exit_code());
}

#[test]
fn near_call_and_return() {
    let mut image = minimal_header();
    image.extend_from_slice(&[0xB8, 0x34, 0x12]); // mov ax,0x1234
    image.extend_from_slice(&[0x50]); // push ax
    image.extend_from_slice(&[0xE8, 0x06, 0x00]); // call +0x6
    image.extend_from_slice(&[0x83, 0xC4, 0x02]); // add sp,byte +0x2
    image.extend_from_slice(&[0xCD, 0x21]); // int 0x21
    image.extend_from_slice(&[0x00]); // (never executed)
    image.extend_from_slice(&[0xB8, 0x07, 0x4C]); // mov ax,0x4c07
    image.extend_from_slice(&[0xC3]); // ret

    let machine = run_exe(&image[..]).unwrap();
    assert_eq!(0x07, machine.exit_code());
    // call/ret and the stack cleanup leave SP where it started
    assert_eq!(0x1000, machine.cpu.get_r16(R16::SP));
}

#[test]
fn segment_override_write_lands_in_es() {
    let mut image = minimal_header();
    image.extend_from_slice(&[0xB8, 0x80, 0x00]); // mov ax,0x80
    image.extend_from_slice(&[0x8E, 0xC0]); // mov es,ax
    image.extend_from_slice(&[0xBB, 0x34, 0x12]); // mov bx,0x1234
    image.extend_from_slice(&[0x26, 0x89, 0x1E, 0x38, 0x00]); // es: mov [0x0038],bx
    image.extend_from_slice(&[0xB8, 0x00, 0x4C]); // mov ax,0x4c00
    image.extend_from_slice(&[0xCD, 0x21]); // int 0x21

    let machine = run_exe(&image[..]).unwrap();
    assert_eq!(0x1234, machine.mmu.read_u16(0x0080, 0x0038).unwrap());
    assert_eq!(0x0000, machine.mmu.read_u16(0x0000, 0x0038).unwrap());
    assert_eq!(0x00, machine.exit_code());
}

#[test]
fn rep_stosb_fills_the_buffer() {
    let mut image = minimal_header();
    image.extend_from_slice(&[0xB8, 0x80, 0x00]); // mov ax,0x80
    image.extend_from_slice(&[0x8E, 0xC0]); // mov es,ax
    image.extend_from_slice(&[0xBF, 0x40, 0x00]); // mov di,0x40
    image.extend_from_slice(&[0xB9, 0x10, 0x00]); // mov cx,0x10
    image.extend_from_slice(&[0xB0, 0xAA]); // mov al,0xaa
    image.extend_from_slice(&[0xFC]); // cld
    image.extend_from_slice(&[0xF3, 0xAA]); // rep stosb
    image.extend_from_slice(&[0xB8, 0x00, 0x4C]); // mov ax,0x4c00
    image.extend_from_slice(&[0xCD, 0x21]); // int 0x21

    let machine = run_exe(&image[..]).unwrap();
    assert_eq!(vec![0xAA; 16], machine.mmu.read(0x0080, 0x0040, 16).unwrap());
    assert_eq!(0x0000, machine.cpu.get_r16(R16::CX));
    assert_eq!(0x0050, machine.cpu.get_r16(R16::DI));
    assert_eq!(0x00, machine.exit_code());
}

#[test]
fn malformed_images_are_rejected() {
    assert!(matches!(run_exe(&[][..]), Err(EmuError::TruncatedHeader("0-1"))));

    let mut image = minimal_header();
    image[0] = 0x00;
    assert!(matches!(run_exe(&image[..]), Err(EmuError::BadSignature(_))));
}
