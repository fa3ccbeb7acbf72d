use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use specweave_bytecode::{access, ClassBuilder, ClassFile, Kind};
use specweave_engine::{MemorySource, Weaver};

const MARKER: &str = "contracts/Contracted";

/// A marked class with `n` specified methods and its companion
fn contracted(n: usize) -> (ClassFile, ClassFile) {
    let mut class = ClassBuilder::new("bench/Subject").annotate(MARKER);
    let mut spec = ClassBuilder::new("bench/SubjectSpec");
    for i in 0..n {
        let name = format!("op{}", i);
        class = class.method(access::PUBLIC, &name, "(I)I", |code| {
            code.load(Kind::Int, 1).iconst(1).emit(specweave_bytecode::Instruction::Add(Kind::Int)).ret(Kind::Int);
        });
        spec = spec.method(
            access::PUBLIC | access::STATIC,
            &format!("{}Spec", name),
            "(Lbench/Subject;I)Lcontracts/DeferredCheck;",
            |code| {
                code.aconst_null().ret(Kind::Ref);
            },
        );
    }
    (class.build().unwrap(), spec.build().unwrap())
}

/// An unmarked client calling every method of the subject
fn client(n: usize) -> ClassFile {
    ClassBuilder::new("bench/Client")
        .method(access::PUBLIC | access::STATIC, "run", "(Lbench/Subject;)V", |code| {
            for i in 0..n {
                code.load(Kind::Ref, 0)
                    .iconst(i as i32)
                    .invoke_virtual("bench/Subject", &format!("op{}", i), "(I)I")
                    .emit(specweave_bytecode::Instruction::Pop);
            }
            code.ret_void();
        })
        .build()
        .unwrap()
}

fn bench_owner(c: &mut Criterion) {
    let mut group = c.benchmark_group("weave_owner");
    for n in [1usize, 8, 64] {
        let (class, spec) = contracted(n);
        let source = MemorySource::new();
        source.insert(class.name.clone(), class.encode());
        source.insert(spec.name.clone(), spec.encode());
        let bytes = class.encode();
        let weaver = Weaver::default();

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("methods", n), &bytes, |b, bytes| {
            b.iter(|| weaver.transform(&source, black_box(bytes)).unwrap());
        });
    }
    group.finish();
}

fn bench_client(c: &mut Criterion) {
    let mut group = c.benchmark_group("weave_client");
    for n in [1usize, 8, 64] {
        let (class, spec) = contracted(n);
        let caller = client(n);
        let source = MemorySource::new();
        source.insert(class.name.clone(), class.encode());
        source.insert(spec.name.clone(), spec.encode());
        let bytes = caller.encode();
        let weaver = Weaver::default();

        group.bench_with_input(BenchmarkId::new("call_sites", n), &bytes, |b, bytes| {
            b.iter(|| weaver.transform(&source, black_box(bytes)).unwrap());
        });
    }
    group.finish();
}

fn bench_untouched(c: &mut Criterion) {
    let plain = client(16);
    let bytes = plain.encode();
    let source = MemorySource::new();
    let weaver = Weaver::default();

    c.bench_function("weave_untouched", |b| {
        b.iter(|| weaver.transform(&source, black_box(&bytes)).unwrap());
    });
}

criterion_group!(benches, bench_owner, bench_client, bench_untouched);
criterion_main!(benches);
