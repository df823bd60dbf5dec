use std::{fmt, sync::Arc};

use postwatch_core::{Dispatcher, LifecycleController, Registry};
use tokio_util::task::TaskTracker;

use crate::infra::config::Config;
use crate::infra::shutdown::ShutdownSignal;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub lifecycle: Arc<LifecycleController>,
    /// Refresh work spawned from notification handlers.
    pub tasks: TaskTracker,
    pub shutdown: ShutdownSignal,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Dispatcher,
        lifecycle: Arc<LifecycleController>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            lifecycle,
            tasks: TaskTracker::new(),
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.dispatcher.registry()
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("channels", &self.registry().len())
            .field("in_flight", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
