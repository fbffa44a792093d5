#![allow(unused)]
extern crate dotemit;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use dotemit::{prelude::*, templating::slice_arguments};
use std::{hint::black_box, sync::Arc};

/// A straight-line body of `blocks` times `ldarg.1; ldc.i4.s n; add; starg.s 1`, closed by a
/// backwards `blt.s` loop and `ret`.
fn synthetic_body(blocks: usize) -> Vec<u8> {
    let mut code = Vec::with_capacity(blocks * 6 + 8);
    for index in 0..blocks {
        code.extend_from_slice(&[0x03, 0x1F, (index % 100) as u8, 0x58, 0x10, 0x01]);
    }
    // ldarg.1; ldc.i4.s 100; blt <start>; ret
    let branch_end = code.len() + 8;
    code.extend_from_slice(&[0x03, 0x1F, 0x64, 0x3F]);
    code.extend_from_slice(&(-(branch_end as i32)).to_le_bytes());
    code.push(0x2A);
    code
}

/// Benchmark decoding into the token stream
///
/// Covers opcode lookup, operand reads and label placement for a single backward branch.
fn bench_decode(c: &mut Criterion) {
    let code = synthetic_body(2000);
    let symbols = SymbolTable::new();
    let context = GenericContext::default();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(code.len() as u64));
    group.bench_function("decode_body", |b| {
        b.iter(|| {
            let body = decode_body(black_box(&code), &[], &symbols, &context).unwrap();
            black_box(body)
        });
    });
    group.finish();
}

/// Benchmark encoding into raw bytecode, including short form selection and fixups
fn bench_encode(c: &mut Criterion) {
    let code = synthetic_body(2000);
    let body = decode_body(&code, &[], &SymbolTable::new(), &GenericContext::default()).unwrap();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(body.tokens.len() as u64));
    group.bench_function("encode_body", |b| {
        b.iter(|| {
            let mut emitter = BytecodeEmitter::new();
            encode_body(
                black_box(&body),
                &mut emitter,
                EncoderOptions { log_level: None },
            )
            .unwrap();
            black_box(emitter.finish().unwrap())
        });
    });
    group.finish();
}

/// Benchmark argument boundary recovery on a long argument list
fn bench_slicing(c: &mut Criterion) {
    let arguments = 256;
    let mut tokens: Vec<CilToken> = Vec::with_capacity(arguments * 3);
    for index in 0..arguments {
        tokens.push(Instruction::LoadArgument(1).into());
        tokens.push(Instruction::load_i4(index as i32).into());
        tokens.push(Instruction::raw(opcodes::ADD).into());
    }

    c.bench_function("slice_arguments", |b| {
        b.iter(|| black_box(slice_arguments(black_box(&tokens), arguments).unwrap()));
    });
}

/// Benchmark the capture table hand-over under a single thread
fn bench_capture_table(c: &mut Criterion) {
    let table = CaptureTable::new();
    let ty = Arc::new(CilType::new(Token::new(0x0200_0002), "Demo", "Payload", "Demo"));

    c.bench_function("capture_table_insert_take", |b| {
        b.iter(|| {
            let key = CaptureTable::next_key();
            table
                .insert(key, CapturedObject::new(ty.clone(), key))
                .unwrap();
            black_box(table.take(key).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_decode,
    bench_encode,
    bench_slicing,
    bench_capture_table
);
criterion_main!(benches);
