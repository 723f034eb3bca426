//! Calling/called pipeline execution
//!
//! Stages are laid out once per call from the instance's optional handler and
//! the service and method filter chains. The calling list stops at the first
//! stage that sets a response or fails (panics included); the called list
//! always runs in full.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::engine::panic_message;
use crate::filter::{CallFilter, FilterChain, FilterError, ServiceHandler};

const HANDLER_STAGE: &str = "service handler";

#[derive(Clone, Copy)]
enum Stage<'a> {
    Handler(&'a dyn ServiceHandler),
    Filter(&'a Arc<dyn CallFilter>),
}

impl Stage<'_> {
    fn name(&self) -> &str {
        match self {
            Stage::Handler(_) => HANDLER_STAGE,
            Stage::Filter(filter) => filter.name(),
        }
    }

    /// A panicking hook is reported as an internal filter error
    async fn calling(&self, ctx: &mut CallContext) -> Result<(), FilterError> {
        let hook = async {
            match self {
                Stage::Handler(handler) => handler.calling(ctx).await,
                Stage::Filter(filter) => filter.calling(ctx).await,
            }
        };
        AssertUnwindSafe(hook)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panicked(payload.as_ref())))
    }

    async fn called(&self, ctx: &mut CallContext) -> Result<(), FilterError> {
        let hook = async {
            match self {
                Stage::Handler(handler) => handler.called(ctx).await,
                Stage::Filter(filter) => filter.called(ctx).await,
            }
        };
        AssertUnwindSafe(hook)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panicked(payload.as_ref())))
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> FilterError {
    FilterError::internal(format!("panic: {}", panic_message(payload)))
}

/// A hook that returned an error
#[derive(Debug)]
pub(crate) struct StageFailure {
    pub stage: String,
    pub error: FilterError,
}

pub(crate) struct Pipeline<'a> {
    calling: Vec<Stage<'a>>,
    called: Vec<Stage<'a>>,
}

impl<'a> Pipeline<'a> {
    /// Calling: handler, service filters, method filters.
    /// Called: method filters, service filters, handler. Each chain keeps its
    /// declared order in both phases.
    pub(crate) fn new(
        handler: Option<&'a dyn ServiceHandler>,
        service_filters: &'a FilterChain,
        method_filters: &'a FilterChain,
    ) -> Self {
        let handler = handler.map(Stage::Handler);

        let calling = handler
            .into_iter()
            .chain(service_filters.iter().map(Stage::Filter))
            .chain(method_filters.iter().map(Stage::Filter))
            .collect();

        let called = method_filters
            .iter()
            .map(Stage::Filter)
            .chain(service_filters.iter().map(Stage::Filter))
            .chain(handler)
            .collect();

        Self { calling, called }
    }

    pub(crate) fn len(&self) -> usize {
        self.calling.len()
    }

    /// Run calling hooks until one sets a response or fails
    pub(crate) async fn run_calling(&self, ctx: &mut CallContext) -> Result<(), StageFailure> {
        for stage in &self.calling {
            if let Err(error) = stage.calling(ctx).await {
                debug!("Calling hook '{}' failed: {}", stage.name(), error);
                return Err(StageFailure {
                    stage: stage.name().to_string(),
                    error,
                });
            }
            if ctx.has_response() {
                debug!("Calling hook '{}' short-circuited the call", stage.name());
                return Ok(());
            }
        }
        Ok(())
    }

    /// Run every called hook once; failures are collected, not propagated
    pub(crate) async fn run_called(&self, ctx: &mut CallContext) -> Vec<StageFailure> {
        let mut failures = Vec::new();
        for stage in &self.called {
            if let Err(error) = stage.called(ctx).await {
                warn!("Called hook '{}' failed: {}", stage.name(), error);
                failures.push(StageFailure {
                    stage: stage.name().to_string(),
                    error,
                });
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ClientEndpoint, SessionScope};
    use crate::policy::RegistryPolicy;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use turul_rpc_cache::InMemoryCacheBackend;
    use turul_rpc_protocol::{CallRequest, CallResponse};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        id: &'static str,
        log: Log,
        respond: bool,
        fail_called: bool,
    }

    impl Recording {
        fn new(id: &'static str, log: &Log) -> Self {
            Self {
                id,
                log: log.clone(),
                respond: false,
                fail_called: false,
            }
        }
    }

    #[async_trait]
    impl CallFilter for Recording {
        fn name(&self) -> &str {
            self.id
        }

        async fn calling(&self, ctx: &mut CallContext) -> Result<(), FilterError> {
            self.log.lock().unwrap().push(format!("calling_{}", self.id));
            if self.respond {
                ctx.set_response(CallResponse::bad_request("stopped"));
            }
            Ok(())
        }

        async fn called(&self, _ctx: &mut CallContext) -> Result<(), FilterError> {
            self.log.lock().unwrap().push(format!("called_{}", self.id));
            if self.fail_called {
                return Err(FilterError::internal("called failed"));
            }
            Ok(())
        }
    }

    struct Handler {
        log: Log,
    }

    #[async_trait]
    impl ServiceHandler for Handler {
        async fn calling(&self, _ctx: &mut CallContext) -> Result<(), FilterError> {
            self.log.lock().unwrap().push("calling_handler".to_string());
            Ok(())
        }

        async fn called(&self, _ctx: &mut CallContext) -> Result<(), FilterError> {
            self.log.lock().unwrap().push("called_handler".to_string());
            Ok(())
        }
    }

    fn context() -> CallContext {
        let scope = Arc::new(SessionScope::new(
            "s-1",
            Arc::new(InMemoryCacheBackend::new()),
            &RegistryPolicy::default(),
        ));
        CallContext::new(
            CallRequest::new("Calc", "Add", vec![]),
            ClientEndpoint::local(),
            scope,
        )
    }

    fn chain(filters: Vec<Recording>) -> FilterChain {
        filters
            .into_iter()
            .map(|f| Arc::new(f) as Arc<dyn CallFilter>)
            .collect()
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_stage_order() {
        let log: Log = Arc::default();
        let handler = Handler { log: log.clone() };
        let service = chain(vec![Recording::new("s1", &log), Recording::new("s2", &log)]);
        let method = chain(vec![Recording::new("m1", &log), Recording::new("m2", &log)]);

        let pipeline = Pipeline::new(Some(&handler), &service, &method);
        assert_eq!(pipeline.len(), 5);

        let mut ctx = context();
        pipeline.run_calling(&mut ctx).await.unwrap();
        assert!(pipeline.run_called(&mut ctx).await.is_empty());

        assert_eq!(
            entries(&log),
            vec![
                "calling_handler",
                "calling_s1",
                "calling_s2",
                "calling_m1",
                "calling_m2",
                "called_m1",
                "called_m2",
                "called_s1",
                "called_s2",
                "called_handler",
            ]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_still_runs_every_called_hook() {
        let log: Log = Arc::default();
        let mut stopper = Recording::new("s1", &log);
        stopper.respond = true;
        let service = chain(vec![stopper]);
        let method = chain(vec![Recording::new("m1", &log)]);

        let pipeline = Pipeline::new(None, &service, &method);
        let mut ctx = context();
        pipeline.run_calling(&mut ctx).await.unwrap();
        pipeline.run_called(&mut ctx).await;

        assert!(ctx.has_response());
        assert_eq!(entries(&log), vec!["calling_s1", "called_m1", "called_s1"]);
    }

    #[tokio::test]
    async fn test_called_failures_do_not_stop_unwind() {
        let log: Log = Arc::default();
        let mut failing = Recording::new("m1", &log);
        failing.fail_called = true;
        let service = chain(vec![Recording::new("s1", &log)]);
        let method = chain(vec![failing]);

        let pipeline = Pipeline::new(None, &service, &method);
        let mut ctx = context();
        let failures = pipeline.run_called(&mut ctx).await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, "m1");
        assert_eq!(entries(&log), vec!["called_m1", "called_s1"]);
    }

    struct Panicking {
        in_calling: bool,
    }

    #[async_trait]
    impl CallFilter for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn calling(&self, _ctx: &mut CallContext) -> Result<(), FilterError> {
            if self.in_calling {
                panic!("filter bug");
            }
            Ok(())
        }

        async fn called(&self, _ctx: &mut CallContext) -> Result<(), FilterError> {
            if !self.in_calling {
                panic!("cleanup bug");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicking_hooks_become_internal_errors() {
        let log: Log = Arc::default();
        let service: FilterChain = vec![
            Arc::new(Panicking { in_calling: true }) as Arc<dyn CallFilter>,
            Arc::new(Recording::new("s2", &log)) as Arc<dyn CallFilter>,
        ]
        .into_iter()
        .collect();
        let method = chain(vec![Recording::new("m1", &log)]);

        let pipeline = Pipeline::new(None, &service, &method);
        let mut ctx = context();
        let failure = pipeline.run_calling(&mut ctx).await.unwrap_err();
        assert_eq!(failure.stage, "panicking");
        assert_eq!(failure.error, FilterError::internal("panic: filter bug"));

        assert!(pipeline.run_called(&mut ctx).await.is_empty());
        assert_eq!(entries(&log), vec!["called_m1", "called_s2"]);
    }

    #[tokio::test]
    async fn test_panicking_called_hook_does_not_stop_unwind() {
        let log: Log = Arc::default();
        let service = chain(vec![Recording::new("s1", &log)]);
        let method: FilterChain = vec![Arc::new(Panicking { in_calling: false }) as Arc<dyn CallFilter>]
            .into_iter()
            .collect();

        let pipeline = Pipeline::new(None, &service, &method);
        let mut ctx = context();
        let failures = pipeline.run_called(&mut ctx).await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error, FilterError::internal("panic: cleanup bug"));
        assert_eq!(entries(&log), vec!["called_s1"]);
    }
}
