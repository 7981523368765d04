//! Executor wrapper for top-level computations

use crate::task::Task;

/// Wrap `task` in a computation that runs it to the end and absorbs its failure
pub(crate) fn wrap<T: Send + 'static>(task: Task<T>) -> Task<()> {
    task.set_error_handler(true);
    let id = task.id();
    Task::new(async move {
        if task.await.is_none() {
            log::warn!("task {:?}: failed, dropped by its executor", id);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskFailed;

    #[test]
    fn test_wrap_marks_handler_on_inner_task() {
        let inner: Task<u8> = Task::new(async { Err(TaskFailed) });
        let probe = inner.get_ref().unwrap();
        let outer = wrap(inner);
        assert!(!outer.has_error_handler());
        assert!(probe.upgrade().header().has_error_handler());
    }
}
