//! Tower middleware that gates an inner service by subject.
//!
//! [`ClickGateService`] evaluates a click for the request's subject before calling the inner
//! service. Anything other than [`Decision::Allow`] short-circuits with
//! [`AdmissionError::Rejected`]. Once the inner call completes, successfully or not, the subject's
//! cycle is closed with a cooperative release; a failing release is logged, never surfaced.

use crate::decision::Decision;
use crate::error::AdmissionError;
use crate::gate::ClickGate;
use crate::store::RecordStore;
use crate::telemetry::{NullSink, TelemetrySink};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Requests that name the subject they act for.
pub trait HasSubject {
    fn subject_id(&self) -> &str;
}

impl HasSubject for String {
    fn subject_id(&self) -> &str {
        self
    }
}

impl HasSubject for &str {
    fn subject_id(&self) -> &str {
        self
    }
}

/// A layer that gates requests through a [`ClickGate`].
pub struct ClickGateLayer<S, T = NullSink> {
    gate: Arc<ClickGate<S, T>>,
}

impl<S, T> ClickGateLayer<S, T> {
    pub fn new(gate: ClickGate<S, T>) -> Self {
        Self { gate: Arc::new(gate) }
    }

    /// Share one gate between the layer and other callers (e.g. an admin endpoint).
    pub fn from_shared(gate: Arc<ClickGate<S, T>>) -> Self {
        Self { gate }
    }
}

impl<S, T> Clone for ClickGateLayer<S, T> {
    fn clone(&self) -> Self {
        Self { gate: self.gate.clone() }
    }
}

impl<Svc, S, T> Layer<Svc> for ClickGateLayer<S, T> {
    type Service = ClickGateService<Svc, S, T>;

    fn layer(&self, service: Svc) -> Self::Service {
        ClickGateService { inner: service, gate: self.gate.clone() }
    }
}

/// Middleware service produced by [`ClickGateLayer`].
pub struct ClickGateService<Svc, S, T = NullSink> {
    inner: Svc,
    gate: Arc<ClickGate<S, T>>,
}

impl<Svc: Clone, S, T> Clone for ClickGateService<Svc, S, T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), gate: self.gate.clone() }
    }
}

impl<Svc, S, T, Req> Service<Req> for ClickGateService<Svc, S, T>
where
    Svc: Service<Req> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    Svc::Response: Send + 'static,
    Svc::Error: Send + 'static,
    S: RecordStore + 'static,
    T: TelemetrySink + Sync,
    T::Future: Send + 'static,
    Req: HasSubject + Send + 'static,
{
    type Response = Svc::Response;
    type Error = AdmissionError<Svc::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let gate = self.gate.clone();
        // Keep the instance that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let subject = req.subject_id().to_owned();

        Box::pin(async move {
            match gate.evaluate_click(&subject).await.map_err(AdmissionError::Gate)? {
                Decision::Allow { .. } => {}
                rejected => return Err(AdmissionError::Rejected(rejected)),
            }

            let result = inner.call(req).await;

            if let Err(err) = gate.finalize_click(&subject).await {
                tracing::warn!(subject = %subject, error = %err, "release after gated call failed");
            }
            result.map_err(AdmissionError::Inner)
        })
    }
}
