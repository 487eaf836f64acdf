// Criterion benchmarks for the langbridge frame codec
//
// Run benchmarks with:
//   cargo bench -p langbridge-common

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use langbridge_common::protocol::{Argument, ClassDescriptor, Frame, ReturnValue, TypeTag};
use langbridge_common::transport::FrameCodec;

fn sample_descriptor() -> ClassDescriptor {
    let mut descriptor = ClassDescriptor::new("Calculator")
        .with_constructor([])
        .with_constructor([TypeTag::Int]);
    for i in 0..16 {
        descriptor = descriptor.with_method(
            format!("op{}", i),
            [TypeTag::Int, TypeTag::Float, TypeTag::String],
            TypeTag::Float,
        );
    }
    descriptor
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");

    let call = Frame::call_method(
        12345,
        "calc",
        "add",
        vec![Argument::from(1), Argument::from(2.5), Argument::from("label")],
    );
    group.bench_function("call_method", |b| {
        b.iter(|| FrameCodec::encode(black_box(&call)))
    });

    let ret = Frame::return_value(12345, ReturnValue::from(3.5));
    group.bench_function("return", |b| b.iter(|| FrameCodec::encode(black_box(&ret))));

    let register = Frame::RegisterClass(sample_descriptor());
    group.bench_function("register_class", |b| {
        b.iter(|| FrameCodec::encode(black_box(&register)))
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");

    let call = FrameCodec::encode(&Frame::call_method(
        12345,
        "calc",
        "add",
        vec![Argument::from(1), Argument::from(2.5), Argument::from("label")],
    ))
    .unwrap();
    group.bench_function("call_method", |b| {
        b.iter(|| FrameCodec::decode(black_box(&call)))
    });

    let register = FrameCodec::encode(&Frame::RegisterClass(sample_descriptor())).unwrap();
    group.bench_function("register_class", |b| {
        b.iter(|| FrameCodec::decode(black_box(&register)))
    });

    group.bench_function("error", |b| {
        b.iter(|| FrameCodec::decode(black_box("0000500042NoMatch: no signature matches")))
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
