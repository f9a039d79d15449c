use crate::durations::DurationStore;
use crate::run::registry::Registry;
use crate::run::supervisor::Supervisor;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub supervisor: Supervisor,
    pub scheduler: Scheduler,
    pub durations: DurationStore,
}
