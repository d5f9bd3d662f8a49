//! Task group with shared cancellation.
//!
//! Every task runs under one `CancellationToken`. Tasks spawned with
//! [`Teardown::OnExit`] cancel it when they end, for any reason, so the rest
//! of the group stops with them. [`TaskGroup::wait`] joins everything and
//! returns the first error.

use std::future::Future;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::ServerError;

/// What a task's exit means for the rest of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Ending this task cancels every other task.
    OnExit,
    /// This task may end quietly (e.g. a disabled feature).
    Detached,
}

type TaskOutput = (&'static str, Result<(), ServerError>);

pub struct TaskGroup {
    token: CancellationToken,
    tasks: JoinSet<TaskOutput>,
    names: Vec<&'static str>,
}

impl TaskGroup {
    /// Creates a group whose token is a child of `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            tasks: JoinSet::new(),
            names: Vec::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn spawn<F>(&mut self, name: &'static str, teardown: Teardown, task: F)
    where
        F: Future<Output = Result<(), ServerError>> + Send + 'static,
    {
        // dropped on return or unwind
        let guard = (teardown == Teardown::OnExit).then(|| self.token.clone().drop_guard());
        self.names.push(name);
        self.tasks.spawn(async move {
            let _guard = guard;
            (name, task.await)
        });
    }

    /// Waits for all tasks and returns the first error.
    pub async fn wait(mut self) -> Result<(), ServerError> {
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!("Task {} finished", name),
                Ok((name, Err(e))) => {
                    error!("Task {} failed: {}", name, e);
                    self.token.cancel();
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!("Task panicked or was aborted: {}", e);
                    self.token.cancel();
                    first_error.get_or_insert(ServerError::Task {
                        name: "unknown",
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!("All tasks finished: {:?}", self.names);
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_exit_cancels_siblings() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);

        let token = group.token();
        group.spawn("waiter", Teardown::OnExit, async move {
            token.cancelled().await;
            Ok(())
        });
        group.spawn("quick", Teardown::OnExit, async { Ok(()) });

        tokio::time::timeout(Duration::from_secs(2), group.wait())
            .await
            .expect("group should finish")
            .unwrap();
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_detached_exit_keeps_group_running() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);

        let token = group.token();
        group.spawn("disabled", Teardown::Detached, async { Ok(()) });
        group.spawn("waiter", Teardown::OnExit, async move {
            token.cancelled().await;
            Ok(())
        });

        let token = group.token();
        let handle = tokio::spawn(group.wait());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled());

        root.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_first_error_is_returned() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);

        let token = group.token();
        group.spawn("failing", Teardown::OnExit, async {
            Err(ServerError::Task {
                name: "failing",
                reason: "boom".into(),
            })
        });
        group.spawn("waiter", Teardown::OnExit, async move {
            token.cancelled().await;
            Ok(())
        });

        let err = group.wait().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_panic_cancels_group() {
        let root = CancellationToken::new();
        let mut group = TaskGroup::new(&root);

        let token = group.token();
        group.spawn("panicking", Teardown::OnExit, async {
            if true {
                panic!("task panic");
            }
            Ok(())
        });
        group.spawn("waiter", Teardown::OnExit, async move {
            token.cancelled().await;
            Ok(())
        });

        let err = group.wait().await.unwrap_err();
        assert!(matches!(err, ServerError::Task { .. }));
    }
}
