//! Shared state for the REST server.

use std::sync::Arc;

use crate::config::Config;
use crate::notifications::NotificationService;
use crate::workflow::SessionEngine;

#[derive(Clone)]
pub struct ApiState {
    pub engine: SessionEngine,
    pub notifier: NotificationService,
    pub config: Arc<Config>,
}

impl ApiState {
    pub fn new(engine: SessionEngine, notifier: NotificationService, config: Config) -> Self {
        Self {
            engine,
            notifier,
            config: Arc::new(config),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::*;
    use crate::gateways::mock::MockReasoning;
    use crate::notifications::RecordingSink;
    use crate::workflow::test_support::{harness_with, Harness};

    pub struct TestApi {
        pub state: ApiState,
        pub sink: Arc<RecordingSink>,
        pub harness: Harness,
    }

    pub fn test_api() -> TestApi {
        test_api_with(MockReasoning::new())
    }

    pub fn test_api_with(reasoning: MockReasoning) -> TestApi {
        let harness = harness_with(reasoning);
        let sink = Arc::new(RecordingSink::new());
        let state = ApiState::new(
            harness.engine.clone(),
            NotificationService::with_sink(sink.clone()),
            Config::default(),
        );
        TestApi {
            state,
            sink,
            harness,
        }
    }
}
