//! 块翻译性能基准测试
//!
//! 测量 A32、Thumb 与 MVE 直线代码的翻译吞吐

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use vm_arm_cpu::{CpuModel, TranslationOptions};
use vm_core::GuestAddr;

#[path = "../tests/test_mmu.rs"]
mod test_mmu;

use test_mmu::{translator, translator_with, TestMmu};

const BASE: u64 = 0x10000;
const INSNS: usize = 64;

fn bench_a32_block(c: &mut Criterion) {
    let mut mmu = TestMmu::new(BASE, 0x1000);
    // add r1, r1, #1 / eor r2, r2, r1 / ldr r3, [r4, #4] / cmp r1, r2 交替
    let pattern = [0xe2811001u32, 0xe0222001, 0xe5943004, 0xe1510002];
    let words: Vec<u32> = pattern.iter().copied().cycle().take(INSNS).collect();
    mmu.load_words(BASE, &words);
    let t = translator(CpuModel::CortexA9, false);

    let mut group = c.benchmark_group("translate");
    group.throughput(Throughput::Elements(INSNS as u64));
    group.bench_function("a32_straight_line", |b| {
        b.iter(|| black_box(t.translate_block(&mmu, GuestAddr(BASE)).unwrap()));
    });
    group.finish();
}

fn bench_thumb_block(c: &mut Criterion) {
    let mut mmu = TestMmu::new(BASE, 0x1000);
    // adds / ldr.w 混合
    let pattern = [0x1840u16, 0xf8d1, 0x0004, 0x2001];
    let halves: Vec<u16> = pattern.iter().copied().cycle().take(INSNS * 2).collect();
    mmu.load_halfwords(BASE, &halves);
    let t = translator(CpuModel::CortexM4, true);

    c.bench_function("translate_thumb_mixed", |b| {
        b.iter(|| black_box(t.translate_block(&mmu, GuestAddr(BASE)).unwrap()));
    });
}

fn bench_mve_block(c: &mut Criterion) {
    let mut mmu = TestMmu::new(BASE, 0x1000);
    let halves: Vec<u16> = [0xef22u16, 0x0844].iter().copied().cycle().take(INSNS * 2).collect();
    mmu.load_halfwords(BASE, &halves);
    let t = translator_with(CpuModel::CortexM55, TranslationOptions::default(), |f| {
        f.thumb = true;
        f.vfp_enabled = true;
    });

    c.bench_function("translate_mve_vadd", |b| {
        b.iter(|| black_box(t.translate_block(&mmu, GuestAddr(BASE)).unwrap()));
    });
}

criterion_group!(benches, bench_a32_block, bench_thumb_block, bench_mve_block);
criterion_main!(benches);
