use criterion::{criterion_group, criterion_main, Criterion};
use mwapi_core::{combine_params, encode_params, params, ParamValue};
use std::hint::black_box;

fn bench_encode_params(c: &mut Criterion) {
    let params = params! {
        "action" => "query",
        "prop" => ParamValue::set(["info", "revisions", "categories"]),
        "titles" => ["Main Page", "Sandbox", "A|B"],
        "rvprop" => ParamValue::list(["content", "timestamp"]),
        "redirects" => true,
        "formatversion" => 2,
    };

    c.bench_function("encode_params", |b| b.iter(|| encode_params(black_box(&params))));
}

fn bench_combine_params(c: &mut Criterion) {
    let a = params! {
        "action" => "query",
        "meta" => ParamValue::set(["siteinfo"]),
        "siprop" => ParamValue::set(["general", "namespaces"]),
    };
    let b = params! {
        "action" => "query",
        "meta" => ParamValue::set(["userinfo"]),
        "formatversion" => 2,
    };

    c.bench_function("combine_params", |bench| {
        bench.iter(|| combine_params(black_box(&a), black_box(&b)))
    });
}

criterion_group!(benches, bench_encode_params, bench_combine_params);
criterion_main!(benches);
