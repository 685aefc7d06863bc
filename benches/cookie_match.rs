//! Cookie jar matching and serialization benchmarks.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use url::Url;

use tabpilot::{Cookie, CookieJar};

fn build_jar(size: usize) -> CookieJar {
    let mut jar = CookieJar::new();
    for i in 0..size {
        let cookie = Cookie::new(format!("name{i}"), format!("value{i}"))
            .expect("valid cookie")
            .with_domain(if i % 3 == 0 {
                ".example.com".to_string()
            } else {
                format!("host{i}.example.com")
            })
            .with_path(if i % 2 == 0 { "/" } else { "/app/" });
        jar.add(cookie);
    }
    jar
}

fn bench_header_for(c: &mut Criterion) {
    let url = Url::parse("https://www.example.com/app/index.html").expect("valid url");

    let mut group = c.benchmark_group("jar_header_for");
    for size in [8, 64, 256] {
        let jar = build_jar(size);
        group.bench_function(format!("{size}_cookies"), |b| {
            b.iter(|| black_box(jar.header_for(black_box(&url))));
        });
    }
    group.finish();
}

fn bench_parse_set_cookie(c: &mut Criterion) {
    let url = Url::parse("https://example.com/login").expect("valid url");
    let header = "session=abc123def456; Domain=.example.com; Path=/; \
                  Expires=Wed, 21 Oct 2026 07:28:00 GMT; Secure; HttpOnly";

    c.bench_function("parse_set_cookie", |b| {
        b.iter(|| black_box(Cookie::parse(black_box(header), &url).expect("parse")));
    });
}

criterion_group!(benches, bench_header_for, bench_parse_set_cookie);
criterion_main!(benches);
