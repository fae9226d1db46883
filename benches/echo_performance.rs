use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use echoservice::common::spawn_test_server;
use echoservice::echo::{
    EchoResponseAssembler, EnvironmentSource, ProcessContext, RequestDescriptor,
    build_request_echo, measure_execution_time,
};
use echoservice::http::HttpEchoClient;
use http::header::{HeaderName, HeaderValue};
use http::Method;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;

fn bench_context() -> ProcessContext {
    ProcessContext::new(Instant::now(), "bench-host", "bench-runtime")
        .with_environment(EnvironmentSource::Fixed("bench".into()))
}

fn descriptor(header_count: usize) -> RequestDescriptor {
    let mut request = RequestDescriptor::new(Method::GET, "/echo?a=1&b=2&b=3");
    for i in 0..header_count {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(format!("x-bench-{i}").as_bytes()),
            HeaderValue::from_str(&format!("value-{i}")),
        ) {
            request.headers.append(name, value);
        }
    }
    request.client_ip = Some("127.0.0.1".to_string());
    request
}

fn bench_request_echo(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_echo");

    for header_count in [0, 8, 32] {
        let request = descriptor(header_count);
        group.bench_with_input(
            BenchmarkId::new("build", header_count),
            &request,
            |b, request| b.iter(|| build_request_echo(black_box(request)).unwrap()),
        );
    }

    let assembler = EchoResponseAssembler::new(Arc::new(bench_context()));
    let request = descriptor(8);
    group.bench_function("build_timed_echo", |b| {
        b.iter(|| assembler.build_timed_echo(black_box(&request)).unwrap())
    });

    group.finish();
}

fn bench_timer_overhead(c: &mut Criterion) {
    c.bench_function("measure_execution_time", |b| {
        b.iter(|| measure_execution_time(|| black_box(42u64)))
    });
}

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(spawn_test_server(bench_context())).unwrap();
    let mut client = rt.block_on(HttpEchoClient::connect(server.addr)).unwrap();

    let mut group = c.benchmark_group("round_trip");

    group.bench_function("health", |b| {
        b.iter(|| rt.block_on(client.get("/health")).unwrap())
    });

    for size in [64usize, 1024, 16384] {
        let body = format!(r#"{{"payload":"{}"}}"#, "x".repeat(size));
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::new("echo_json", size), &body, |b, body| {
            b.iter(|| {
                rt.block_on(client.post_json("/echo", black_box(body.as_bytes())))
                    .unwrap()
            })
        });
    }

    group.finish();
    rt.block_on(server.stop()).unwrap();
}

criterion_group!(
    benches,
    bench_request_echo,
    bench_timer_overhead,
    bench_round_trip
);
criterion_main!(benches);
