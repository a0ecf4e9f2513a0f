//! Forward-or-retry decision loop.
//!
//! ```text
//! for attempt in 1..=cap:
//!     target = next_target()        none → NoHealthyTarget / Exhausted
//!     forward(target, request)      ok   → Forwarded
//!     remove_target(target)         err  → next attempt
//!                                   local build err → Failed (target kept)
//! ```
//!
//! The attempt cap is the healthy-set size when the request arrived, so a
//! request can try each of those targets at most once even if health cycles
//! refill the set while it is retrying.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;

use crate::forwarding::transport::{ForwardError, Transport, UpstreamRequest};
use crate::load_balancer::{LoadBalancer, Target, TargetRegistry};
use crate::observability::metrics;

/// Result of handling one inbound request.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// A target answered; its response should be relayed.
    Forwarded {
        target: Target,
        attempts: usize,
        response: Response<Body>,
    },
    /// Nothing was healthy when the request arrived.
    NoHealthyTarget,
    /// Every attempt failed, or the healthy set ran dry while retrying.
    Exhausted {
        attempts: usize,
        last_error: ForwardError,
    },
    /// The request could not be prepared locally; no target was at fault.
    Failed {
        target: Target,
        error: ForwardError,
    },
}

pub struct ForwardingCoordinator {
    balancer: Arc<dyn LoadBalancer>,
    registry: Arc<TargetRegistry>,
    transport: Arc<dyn Transport>,
    max_attempts: Option<usize>,
}

impl ForwardingCoordinator {
    pub fn new(
        balancer: Arc<dyn LoadBalancer>,
        registry: Arc<TargetRegistry>,
        transport: Arc<dyn Transport>,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            balancer,
            registry,
            transport,
            max_attempts,
        }
    }

    fn attempt_cap(&self) -> usize {
        let cap = self.registry.healthy_count().max(1);
        match self.max_attempts {
            Some(max) => cap.min(max.max(1)),
            None => cap,
        }
    }

    pub async fn handle(&self, request: UpstreamRequest) -> ForwardOutcome {
        let cap = self.attempt_cap();
        let mut last_error: Option<ForwardError> = None;

        for attempt in 1..=cap {
            let Some(target) = self.balancer.next_target() else {
                return match last_error {
                    Some(last_error) => {
                        tracing::error!(attempts = attempt - 1, "Healthy set exhausted while retrying");
                        ForwardOutcome::Exhausted {
                            attempts: attempt - 1,
                            last_error,
                        }
                    }
                    None => {
                        tracing::error!("No target available for request");
                        ForwardOutcome::NoHealthyTarget
                    }
                };
            };

            tracing::debug!(
                upstream = %target,
                attempt,
                max_attempts = cap,
                method = %request.method,
                path = %request.path_and_query,
                "Forwarding request"
            );

            match self.transport.forward(&target, request.clone()).await {
                Ok(response) => {
                    tracing::info!(
                        upstream = %target,
                        status = response.status().as_u16(),
                        attempt,
                        "Forwarded request"
                    );
                    return ForwardOutcome::Forwarded {
                        target,
                        attempts: attempt,
                        response,
                    };
                }
                Err(e) if !e.is_target_failure() => {
                    tracing::error!(upstream = %target, error = %e, "Could not prepare upstream request");
                    return ForwardOutcome::Failed { target, error: e };
                }
                Err(e) => {
                    tracing::warn!(
                        upstream = %target,
                        error = %e,
                        attempt,
                        max_attempts = cap,
                        "Forwarding failed, demoting target"
                    );
                    if self.registry.remove_target(&target) {
                        metrics::record_target_removal(target.address());
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last_error) => {
                tracing::error!(attempts = cap, error = %last_error, "All forwarding attempts failed");
                ForwardOutcome::Exhausted {
                    attempts: cap,
                    last_error,
                }
            }
            // Every iteration either returns or records an error.
            None => ForwardOutcome::NoHealthyTarget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::RoundRobin;
    use async_trait::async_trait;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method, StatusCode, Uri};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transport that fails for a configurable set of targets and records calls.
    #[derive(Default)]
    struct FakeTransport {
        down: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn down(addrs: &[&Target]) -> Self {
            let t = Self::default();
            *t.down.lock().unwrap() = addrs.iter().map(|a| a.address().to_string()).collect();
            t
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn forward(
            &self,
            target: &Target,
            request: UpstreamRequest,
        ) -> Result<Response<Body>, ForwardError> {
            self.calls.lock().unwrap().push(target.address().to_string());
            if self.down.lock().unwrap().contains(target.address()) {
                return Err(ForwardError::Timeout(Duration::from_millis(1)));
            }
            assert_eq!(request.body, Bytes::from_static(b"payload"));
            Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Body::from(target.address().to_string()))
                .unwrap())
        }
    }

    struct Fixture {
        registry: Arc<TargetRegistry>,
        transport: Arc<FakeTransport>,
        coordinator: ForwardingCoordinator,
        t: Vec<Target>,
    }

    fn fixture(down: &[usize], max_attempts: Option<usize>) -> Fixture {
        let t: Vec<Target> = ["a:1", "b:2", "c:3"]
            .iter()
            .map(|a| Target::parse(a).unwrap())
            .collect();
        let registry = Arc::new(TargetRegistry::new(t.clone()));
        let balancer = Arc::new(RoundRobin::new(registry.clone()));
        let down: Vec<&Target> = down.iter().map(|i| &t[*i]).collect();
        let transport = Arc::new(FakeTransport::down(&down));
        let coordinator =
            ForwardingCoordinator::new(balancer, registry.clone(), transport.clone(), max_attempts);
        Fixture {
            registry,
            transport,
            coordinator,
            t,
        }
    }

    fn request() -> UpstreamRequest {
        UpstreamRequest::new(
            Method::POST,
            &Uri::from_static("/echo"),
            HeaderMap::new(),
            Bytes::from_static(b"payload"),
        )
    }

    fn forwarded_to(outcome: ForwardOutcome) -> (Target, usize) {
        match outcome {
            ForwardOutcome::Forwarded {
                target, attempts, ..
            } => (target, attempts),
            other => panic!("expected Forwarded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rotates_when_everything_is_up() {
        let f = fixture(&[], None);
        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(forwarded_to(f.coordinator.handle(request()).await).0);
        }
        assert_eq!(order, vec![f.t[0].clone(), f.t[1].clone(), f.t[2].clone(), f.t[0].clone()]);
    }

    #[tokio::test]
    async fn test_failed_target_is_demoted_and_request_retried() {
        let f = fixture(&[1], None);

        // Request 1 → a.
        assert_eq!(forwarded_to(f.coordinator.handle(request()).await).0, f.t[0]);

        // Request 2 → b fails, b removed, retried on a or c.
        let (target, attempts) = forwarded_to(f.coordinator.handle(request()).await);
        assert_eq!(attempts, 2);
        assert_ne!(target, f.t[1]);
        assert!(!f.registry.is_healthy(&f.t[1]));

        // From here on only a and c are used.
        let mut seen = HashSet::new();
        for _ in 0..6 {
            seen.insert(forwarded_to(f.coordinator.handle(request()).await).0);
        }
        assert_eq!(seen, HashSet::from([f.t[0].clone(), f.t[2].clone()]));
        assert_eq!(
            f.transport.calls().iter().filter(|c| *c == f.t[1].address()).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_all_down_exhausts_and_empties_set() {
        let f = fixture(&[0, 1, 2], None);

        match f.coordinator.handle(request()).await {
            ForwardOutcome::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(f.registry.healthy_count(), 0);
        assert_eq!(f.transport.calls().len(), 3);

        // Nothing left: no transport call, explicit no-target outcome.
        assert!(matches!(
            f.coordinator.handle(request()).await,
            ForwardOutcome::NoHealthyTarget
        ));
        assert_eq!(f.transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_healthy_set_does_not_forward() {
        let f = fixture(&[], None);
        f.registry.replace_healthy(Vec::new());

        assert!(matches!(
            f.coordinator.handle(request()).await,
            ForwardOutcome::NoHealthyTarget
        ));
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_configured_cap_limits_attempts() {
        let f = fixture(&[0, 1, 2], Some(2));

        match f.coordinator.handle(request()).await {
            ForwardOutcome::Exhausted { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(f.transport.calls().len(), 2);
        assert_eq!(f.registry.healthy_count(), 1);
    }

    /// Transport whose requests can never be built.
    struct UnbuildableTransport {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for UnbuildableTransport {
        async fn forward(
            &self,
            _target: &Target,
            _request: UpstreamRequest,
        ) -> Result<Response<Body>, ForwardError> {
            *self.calls.lock().unwrap() += 1;
            let err = Response::builder().status(1000u16).body(()).unwrap_err();
            Err(ForwardError::Build(err))
        }
    }

    #[tokio::test]
    async fn test_local_build_error_keeps_target_healthy() {
        let t: Vec<Target> = ["a:1", "b:2"].iter().map(|a| Target::parse(a).unwrap()).collect();
        let registry = Arc::new(TargetRegistry::new(t.clone()));
        let transport = Arc::new(UnbuildableTransport { calls: Mutex::new(0) });
        let coordinator = ForwardingCoordinator::new(
            Arc::new(RoundRobin::new(registry.clone())),
            registry.clone(),
            transport.clone(),
            None,
        );

        match coordinator.handle(request()).await {
            ForwardOutcome::Failed { target, error } => {
                assert_eq!(target, t[0]);
                assert!(matches!(error, ForwardError::Build(_)));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(*transport.calls.lock().unwrap(), 1);
        assert_eq!(registry.healthy_count(), 2);
    }

    /// Transport that fails and immediately re-adds the target, simulating a
    /// health cycle racing with the retry loop.
    struct RefillingTransport {
        registry: Arc<TargetRegistry>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for RefillingTransport {
        async fn forward(
            &self,
            target: &Target,
            _request: UpstreamRequest,
        ) -> Result<Response<Body>, ForwardError> {
            *self.calls.lock().unwrap() += 1;
            let registry = self.registry.clone();
            let target = target.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                registry.add_target(&target);
            });
            tokio::task::yield_now().await;
            Err(ForwardError::Timeout(Duration::from_millis(1)))
        }
    }

    #[tokio::test]
    async fn test_retries_are_bounded_when_set_keeps_refilling() {
        let t: Vec<Target> = ["a:1", "b:2"].iter().map(|a| Target::parse(a).unwrap()).collect();
        let registry = Arc::new(TargetRegistry::new(t));
        let transport = Arc::new(RefillingTransport {
            registry: registry.clone(),
            calls: Mutex::new(0),
        });
        let coordinator = ForwardingCoordinator::new(
            Arc::new(RoundRobin::new(registry.clone())),
            registry,
            transport.clone(),
            None,
        );

        let outcome = coordinator.handle(request()).await;
        assert!(matches!(outcome, ForwardOutcome::Exhausted { attempts: 2, .. }));
        assert_eq!(*transport.calls.lock().unwrap(), 2);
    }
}
