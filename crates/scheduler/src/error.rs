/// Errors returned to callers of [`ActionHandle`](crate::ActionHandle)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
  #[error("Action name must not be empty")]
  EmptyName,
  #[error("Scheduler has shut down")]
  SchedulerGone,
}
