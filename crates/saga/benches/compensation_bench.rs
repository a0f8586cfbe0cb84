use common::TraceId;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use saga::{CompensationStack, SagaError, WorkflowContext};

fn bench_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("compensation/register");
    for size in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut stack = CompensationStack::new();
                for i in 0..size {
                    stack.register(format!("step {i}"), || async { Ok(()) });
                }
                stack
            });
        });
    }
    group.finish();
}

fn bench_unwind(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("compensation/unwind");

    for size in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                let mut stack = CompensationStack::new();
                for i in 0..size {
                    stack.register(format!("step {i}"), || async { Ok(()) });
                }
                stack.unwind().await
            });
        });
    }
    group.finish();
}

fn bench_unwind_with_failures(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("compensation/unwind_half_failing_50", |b| {
        b.to_async(&rt).iter(|| async {
            let mut stack = CompensationStack::new();
            for i in 0..50 {
                stack.register(format!("step {i}"), move || async move {
                    if i % 2 == 0 {
                        Err(SagaError::Conflict("gone".to_string()))
                    } else {
                        Ok(())
                    }
                });
            }
            stack.unwind().await
        });
    });
}

fn bench_context_step_and_fail(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("context/ten_steps_then_fail", |b| {
        b.to_async(&rt).iter(|| async {
            let mut ctx = WorkflowContext::new(TraceId::new());
            for i in 0..10 {
                ctx.step(async { Ok::<_, SagaError>(i) }).await.unwrap();
                ctx.register(format!("undo {i}"), || async { Ok(()) });
            }
            ctx.fail(SagaError::Validation("bench".to_string())).await
        });
    });
}

criterion_group!(
    benches,
    bench_register,
    bench_unwind,
    bench_unwind_with_failures,
    bench_context_step_and_fail,
);
criterion_main!(benches);
