//! Criterion benchmarks for the jsonata-eval evaluator.
//!
//! Most groups measure raw evaluation cost against prebuilt documents, with
//! parsing done once up front. `end_to_end` measures the text contract:
//! parse expression, parse JSON, evaluate, serialize.
//!
//! Run:
//!   cargo bench
//!   cargo bench -- simple_path        # one group
//!   cargo bench -- realistic_workload # one group

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use indexmap::IndexMap;
use jsonata_eval::ast::AstNode;
use jsonata_eval::evaluator::Evaluator;
use jsonata_eval::parser;
use jsonata_eval::value::JValue;

// ── Data builders ─────────────────────────────────────────────────────────────

fn tiny_obj(key: &str, val: JValue) -> JValue {
    let mut m = IndexMap::new();
    m.insert(key.to_string(), val);
    JValue::object(m)
}

/// Flat array of f64 values: [0.0, 1.0, ..., (n-1).0].
fn numeric_array(n: usize) -> JValue {
    let values: Vec<JValue> = (0..n).map(|i| JValue::from(i as f64)).collect();
    tiny_obj("values", JValue::array(values))
}

/// 100 products: {id, name, category, price, inStock, tags, vendor}.
fn ecommerce_100() -> JValue {
    let categories = ["Electronics", "Clothing", "Books", "Home"];
    let products: Vec<JValue> = (0..100_usize)
        .map(|i| {
            let tags: Vec<JValue> = (0..i % 5)
                .map(|j| JValue::string(format!("tag{j}")))
                .collect();

            let mut vendor = IndexMap::new();
            vendor.insert(
                "name".to_string(),
                JValue::string(format!("Vendor {}", i % 10)),
            );
            vendor.insert("rating".to_string(), JValue::from(4.0 + (i % 5) as f64 * 0.2));

            let mut p = IndexMap::new();
            p.insert("id".to_string(), JValue::from(i as f64));
            p.insert("name".to_string(), JValue::string(format!("Product {i}")));
            p.insert("category".to_string(), JValue::from(categories[i % 4]));
            p.insert("price".to_string(), JValue::from(10.0 + i as f64 * 2.5));
            p.insert("inStock".to_string(), JValue::Bool(i % 3 != 0));
            p.insert("tags".to_string(), JValue::array(tags));
            p.insert("vendor".to_string(), JValue::object(vendor));
            JValue::object(p)
        })
        .collect();
    tiny_obj("products", JValue::array(products))
}

/// Object nested `depth` levels deep under key `a`, ending in 42.
fn deep_object(depth: usize) -> JValue {
    (0..depth).fold(JValue::from(42i64), |inner, _| tiny_obj("a", inner))
}

fn compile(expr: &str) -> AstNode {
    parser::parse(expr).unwrap()
}

fn eval(ast: &AstNode, data: &JValue) -> JValue {
    Evaluator::new().evaluate(ast, data).unwrap()
}

// ── Bench groups ──────────────────────────────────────────────────────────────

fn bench_simple_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("simple_path");
    group.sample_size(300);

    let data = tiny_obj("name", JValue::from("Alice"));
    let ast = compile("name");
    group.bench_function("simple_path", |b| b.iter(|| eval(black_box(&ast), &data)));

    let data = deep_object(5);
    let ast = compile("a.a.a.a.a");
    group.bench_function("deep_path_5", |b| b.iter(|| eval(black_box(&ast), &data)));

    let data = deep_object(12);
    let ast = compile("a.a.a.a.a.a.a.a.a.a.a.a");
    group.bench_function("deep_path_12", |b| b.iter(|| eval(black_box(&ast), &data)));

    let data = numeric_array(100);
    let ast = compile("values[50]");
    group.bench_function("array_index_100", |b| b.iter(|| eval(black_box(&ast), &data)));

    let ast = compile("(1 + 2) * 3 - 4 / 2");
    group.bench_function("arithmetic", |b| {
        b.iter(|| eval(black_box(&ast), &JValue::Undefined))
    });

    group.finish();
}

fn bench_array_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_operations");

    for n in [100_usize, 1000, 10_000] {
        let data = numeric_array(n);
        let sum = compile("$sum(values)");
        let max = compile("$max(values)");
        let count = compile("$count(values)");
        group.bench_with_input(BenchmarkId::new("sum", n), &data, |b, d| {
            b.iter(|| eval(&sum, d))
        });
        group.bench_with_input(BenchmarkId::new("max", n), &data, |b, d| {
            b.iter(|| eval(&max, d))
        });
        group.bench_with_input(BenchmarkId::new("count", n), &data, |b, d| {
            b.iter(|| eval(&count, d))
        });
    }

    let data = ecommerce_100();
    let ast = compile("products.price");
    group.bench_function("map_field_100", |b| b.iter(|| eval(&ast, &data)));

    let ast = compile("$sum(products.price)");
    group.bench_function("map_sum_100", |b| b.iter(|| eval(&ast, &data)));

    let ast = compile("products[price > 100]");
    group.bench_function("filter_predicate_100", |b| b.iter(|| eval(&ast, &data)));

    let ast = compile("products^(>price, name)");
    group.bench_function("sort_100", |b| b.iter(|| eval(&ast, &data)));

    group.finish();
}

fn bench_complex_transformations(c: &mut Criterion) {
    let mut group = c.benchmark_group("complex_transformations");
    group.sample_size(300);

    let data = ecommerce_100();
    let cases: &[(&str, &str)] = &[
        ("object_construction_simple", r#"{"count": $count(products), "first": products[1].name}"#),
        ("object_construction_nested", r#"products[1].{"name": name, "vendor": {"n": vendor.name}}"#),
        ("conditional", r#"products.(price > 100 ? "expensive" : "cheap")"#),
        ("nested_functions", r#"$uppercase($substring(products[1].name, 0, 4))"#),
        ("transform", r#"products[1] ~> |$|{"price": price * 2}, ["tags"]|"#),
    ];
    for (name, expr) in cases {
        let ast = compile(expr);
        group.bench_function(*name, |b| b.iter(|| eval(&ast, &data)));
    }

    group.finish();
}

fn bench_string_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("string_operations");
    group.sample_size(300);

    let data = tiny_obj(
        "text",
        JValue::from("The quick brown fox jumps over the lazy dog"),
    );
    let cases: &[(&str, &str)] = &[
        ("uppercase", "$uppercase(text)"),
        ("split_join", r#"$join($split(text, " "), "-")"#),
        ("contains", r#"$contains(text, "fox")"#),
        ("regex_replace", r#"$replace(text, /o(\w)/, "0$1")"#),
        ("match", r#"$match(text, /\b\w{5}\b/)"#),
        ("concat", r#"text & " " & text"#),
    ];
    for (name, expr) in cases {
        let ast = compile(expr);
        group.bench_function(*name, |b| b.iter(|| eval(&ast, &data)));
    }

    group.finish();
}

fn bench_higher_order_functions(c: &mut Criterion) {
    let mut group = c.benchmark_group("higher_order_functions");

    let data = numeric_array(100);
    let cases: &[(&str, &str)] = &[
        ("map_100", "$map(values, function($v) { $v * 2 })"),
        ("filter_100", "$filter(values, function($v) { $v % 2 = 0 })"),
        ("reduce_100", "$reduce(values, function($a, $b) { $a + $b })"),
        ("sort_comparator_100", "$sort(values, function($a, $b) { $a < $b })"),
        ("recursive_lambda", "($f := function($n) { $n <= 1 ? 1 : $n * $f($n - 1) }; $f(20))"),
    ];
    for (name, expr) in cases {
        let ast = compile(expr);
        group.bench_function(*name, |b| b.iter(|| eval(&ast, &data)));
    }

    group.finish();
}

fn bench_realistic_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("realistic_workload");

    let data = ecommerce_100();
    let cases: &[(&str, &str)] = &[
        ("filter_and_project", "products[inStock and price < 100].{\"id\": id, \"name\": name}"),
        ("group_by_category", "products{category: $sum(price)}"),
        ("top_rated_vendors", "$distinct(products[vendor.rating > 4.5].vendor.name)"),
        ("tag_counts", "products{category: $count(tags)}"),
        ("positional", "products#$i[$i < 5].name"),
    ];
    for (name, expr) in cases {
        let ast = compile(expr);
        group.bench_function(*name, |b| b.iter(|| eval(&ast, &data)));
    }

    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");

    let input = ecommerce_100().to_json_string();
    group.bench_function("parse_and_evaluate_100", |b| {
        b.iter(|| jsonata_eval::evaluate(black_box("$sum(products[inStock].price)"), &input))
    });
    group.bench_function("parse_only", |b| {
        b.iter(|| parser::parse(black_box("products[price > 100]^(>price).{\"n\": name}")))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_simple_paths,
    bench_array_operations,
    bench_complex_transformations,
    bench_string_operations,
    bench_higher_order_functions,
    bench_realistic_workload,
    bench_end_to_end,
);
criterion_main!(benches);
