use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;

use interpose::generation::GenerationRequest;
use interpose::{ContractDescriptor, MemberDescriptor, ProxyGenerator, ProxyKind, TypeRef};

fn capabilities(count: usize) -> Vec<Arc<ContractDescriptor>> {
    (0..count)
        .map(|i| {
            ContractDescriptor::interface(format!("Bench.ICapability{}", i))
                .member(MemberDescriptor::method(format!("Run{}", i)).returns(TypeRef::int()))
                .shared()
        })
        .collect()
}

fn bench_cache(c: &mut Criterion) {
    let contract = ContractDescriptor::interface("Bench.IService")
        .member(MemberDescriptor::method("Run").returns(TypeRef::int()))
        .shared();
    let extra = capabilities(8);
    let request = GenerationRequest::new(ProxyKind::InterfaceWithoutTarget, Arc::clone(&contract))
        .with_additional(&extra);

    let generator = ProxyGenerator::new();
    generator
        .build_implementation(&request)
        .expect("implementation should build");
    c.bench_function("cache_hit", |b| {
        b.iter(|| {
            let implementation = generator
                .build_implementation(black_box(&request))
                .expect("cache hit");
            black_box(implementation);
        })
    });

    c.bench_function("cache_build", |b| {
        b.iter(|| {
            let generator = ProxyGenerator::new();
            let implementation = generator
                .build_implementation(black_box(&request))
                .expect("implementation should build");
            black_box(implementation);
        })
    });
}

criterion_group!(cache, bench_cache);
criterion_main!(cache);
