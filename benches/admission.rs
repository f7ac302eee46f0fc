use clickgate::{
    AdmissionEngine, ClickGate, ClickGateLayer, EscalationPolicy, InMemoryRecordStore, SubjectId,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::Ready;
use std::sync::atomic::{AtomicU64, Ordering};
use tower::{Service, ServiceBuilder};

const NOW: u64 = 1_700_000_000_000;

// Echo service wrapped by the gate layer.
#[derive(Clone)]
struct EchoService;

impl Service<String> for EchoService {
    type Response = String;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: String) -> Self::Future {
        futures::future::ready(Ok(req))
    }
}

fn engine_transitions(c: &mut Criterion) {
    let engine = AdmissionEngine::default();
    let subject = SubjectId::parse("bench").unwrap();
    let created = engine.evaluate_click(&subject, None, NOW).next.unwrap();

    c.bench_function("engine_evaluate_click_live_cycle", |b| {
        b.iter(|| black_box(engine.evaluate_click(&subject, Some(black_box(&created)), NOW)));
    });
}

fn gate_fresh_subjects(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gate = ClickGate::new(InMemoryRecordStore::new(), EscalationPolicy::default());
    let next_id = AtomicU64::new(0);

    c.bench_function("gate_evaluate_click_new_subject", |b| {
        b.to_async(&rt).iter(|| {
            let id = next_id.fetch_add(1, Ordering::Relaxed).to_string();
            let gate = &gate;
            async move {
                let _ = black_box(gate.evaluate_click(&id).await);
            }
        });
    });
}

fn layer_click_and_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gate = ClickGate::new(InMemoryRecordStore::new(), EscalationPolicy::default());
    let svc = ServiceBuilder::new().layer(ClickGateLayer::new(gate)).service(EchoService);

    c.bench_function("layer_click_then_release_same_subject", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box("bench".to_string()))).await;
        });
    });
}

criterion_group!(benches, engine_transitions, gate_fresh_subjects, layer_click_and_release);
criterion_main!(benches);
