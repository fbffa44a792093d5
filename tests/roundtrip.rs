//! Decode / encode round-trips over canonical method bodies.
//!
//! A body is canonical when every instruction already uses its most compact encoding, which is
//! what the encoder produces; such bodies must survive `encode(decode(bytes))` byte for byte.

mod common;

use common::{il, with_token, Host};
use dotemit::prelude::*;

fn roundtrip(code: &[u8], locals: &[LocalDecl], symbols: &SymbolTable) -> Result<EmittedBody> {
    let body = decode_body(code, locals, symbols, &GenericContext::default())?;
    let mut emitter = BytecodeEmitter::new();
    encode_body(&body, &mut emitter, EncoderOptions { log_level: None })?;
    emitter.finish()
}

#[test]
fn arithmetic() -> Result<()> {
    // ldarg.1; ldarg.2; mul; ldc.i4 1000; add; conv.i8; ldc.i8 -1; xor; ret
    let code = il(&[
        &[0x03, 0x04, 0x5A, 0x20],
        &1000i32.to_le_bytes(),
        &[0x58, 0x6A, 0x21],
        &(-1i64).to_le_bytes(),
        &[0x61, 0x2A],
    ]);
    let emitted = roundtrip(&code, &[], &SymbolTable::new())?;
    assert_eq!(emitted.code, code);
    assert_eq!(emitted.max_stack, 2);
    Ok(())
}

#[test]
fn locals_in_every_width() -> Result<()> {
    let host = Host::new();
    let locals: Vec<LocalDecl> = (0..300)
        .map(|index| LocalDecl::new(host.int32.clone(), index == 7))
        .collect();

    // ldc.i4.0; stloc.0; ldloc.3; stloc.s 4; ldloca.s 255; pop; ldloc 256; stloc 299; ret
    let code = il(&[
        &[0x16, 0x0A, 0x09, 0x13, 0x04, 0x12, 0xFF, 0x26],
        &[0xFE, 0x0C, 0x00, 0x01],
        &[0xFE, 0x0E, 0x2B, 0x01],
        &[0x2A],
    ]);
    let emitted = roundtrip(&code, &locals, &SymbolTable::new())?;
    assert_eq!(emitted.code, code);
    assert_eq!(emitted.locals, locals);
    Ok(())
}

#[test]
fn loops_and_switches() -> Result<()> {
    // 0: ldc.i4.0; 1: stloc.0
    // 2: ldloc.0; 3: switch (2) [+2, +4]; 16: br.s +4
    // 18: ldloc.0; 19: pop; 20: ldloc.0; 21: pop
    // 22: ldloc.0; 23: ldc.i4.s 10; 25: blt.s -25; 27: ret
    let code = il(&[
        &[0x16, 0x0A, 0x06, 0x45, 0x02, 0x00, 0x00, 0x00],
        &2i32.to_le_bytes(),
        &4i32.to_le_bytes(),
        &[0x2B, 0x04, 0x06, 0x26, 0x06, 0x26],
        &[0x06, 0x1F, 0x0A, 0x32, 0xE7, 0x2A],
    ]);
    let host = Host::new();
    let locals = [LocalDecl::new(host.int32.clone(), false)];

    let body = decode_body(&code, &locals, &SymbolTable::new(), &GenericContext::default())?;
    assert_eq!(body.labels().count(), 4);

    let emitted = roundtrip(&code, &locals, &SymbolTable::new())?;
    assert_eq!(emitted.code, code);
    Ok(())
}

#[test]
fn members_and_strings() -> Result<()> {
    let mut host = Host::new();
    let greeting = Token::new(0x7000_0001);
    host.symbols.insert_string(greeting, "hello");

    // ldarg.0; ldfld Count; call Log; ldstr "hello"; pop; ldarg.0; ldc.i4.2; stfld Count; ret
    let code = il(&[
        &[0x02],
        &with_token(0x7B, host.count.token),
        &with_token(0x28, host.log.token),
        &with_token(0x72, greeting),
        &[0x26, 0x02, 0x18],
        &with_token(0x7D, host.count.token),
        &[0x2A],
    ]);

    let body = decode_body(&code, &[], &host.symbols, &GenericContext::default())?;
    let mut emitter =
        BytecodeEmitter::new().with_user_strings([("hello".to_string(), greeting)]);
    encode_body(&body, &mut emitter, EncoderOptions { log_level: None })?;
    let emitted = emitter.finish()?;

    assert_eq!(emitted.code, code);
    assert_eq!(emitted.user_strings, vec![("hello".to_string(), greeting)]);
    Ok(())
}

#[test]
fn virtual_calls_keep_callvirt() -> Result<()> {
    let mut host = Host::new();
    let render = common::method(
        50,
        "Render",
        &host.widget,
        &[],
        None,
        MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
    );
    host.symbols.insert_method(render.clone());

    // ldarg.0; callvirt Render; ret
    let code = il(&[&[0x02], &with_token(0x6F, render.token), &[0x2A]]);
    let emitted = roundtrip(&code, &[], &host.symbols)?;
    assert_eq!(emitted.code, code);
    Ok(())
}

#[test]
fn short_form_selection() -> Result<()> {
    let mut body = MethodBody::new();
    for index in [0u16, 1, 2, 3, 4, 255, 256, 65535] {
        body.push(Instruction::LoadArgument(index));
    }
    for _ in 0..8 {
        body.push(Instruction::raw(opcodes::POP));
    }
    body.push(Instruction::Return);

    let mut emitter = BytecodeEmitter::new();
    encode_body(&body, &mut emitter, EncoderOptions::default())?;
    let emitted = emitter.finish()?;

    let expected = il(&[
        &[0x02, 0x03, 0x04, 0x05],
        &[0x0E, 0x04, 0x0E, 0xFF],
        &[0xFE, 0x09, 0x00, 0x01],
        &[0xFE, 0x09, 0xFF, 0xFF],
        &[0x26; 8],
        &[0x2A],
    ]);
    assert_eq!(emitted.code, expected);
    assert_eq!(emitted.max_stack, 8);
    Ok(())
}

#[test]
fn decode_errors() {
    let symbols = SymbolTable::new();
    let context = GenericContext::default();

    // reserved opcode
    assert!(matches!(
        decode_body(&[0xA6], &[], &symbols, &context),
        Err(Error::Malformed { .. })
    ));
    // truncated ldc.i4
    assert!(matches!(
        decode_body(&[0x20, 0x01, 0x02], &[], &symbols, &context),
        Err(Error::OutOfBounds)
    ));
    // br.s into the middle of ldc.i4
    assert!(matches!(
        decode_body(&[0x2B, 0x01, 0x20, 0, 0, 0, 0, 0x2A], &[], &symbols, &context),
        Err(Error::Malformed { .. })
    ));
    // unknown token
    assert!(matches!(
        decode_body(&with_token(0x28, Token::new(0x0600_0999)), &[], &symbols, &context),
        Err(Error::UnresolvedToken(_))
    ));
    // ldloc.0 without locals
    assert!(decode_body(&[0x06, 0x2A], &[], &symbols, &context).is_err());
}
