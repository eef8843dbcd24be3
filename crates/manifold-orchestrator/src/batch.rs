// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrent multi-task execution over one orchestrator.

use std::collections::HashMap;

use futures::future::join_all;
use manifold_core::ManifoldError;
use manifold_router::TaskType;

use crate::orchestrator::{ChatOutcome, Orchestrator};

/// One unit of work in a batch.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Key the outcome is reported under.
    pub key: String,
    pub prompt: String,
    /// Overrides the classifier's task type when set; complexity is still
    /// inferred from the prompt.
    pub task_type: Option<TaskType>,
}

impl TaskSpec {
    pub fn new(key: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            prompt: prompt.into(),
            task_type: None,
        }
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }
}

impl Orchestrator {
    /// Runs every task concurrently and keys the outcomes by `TaskSpec::key`.
    ///
    /// Per-backend concurrency stays bounded by the connection pools; tasks
    /// queue on acquire once a backend is saturated. One task failing does
    /// not cancel the others. Duplicate keys keep the last outcome to
    /// arrive.
    pub async fn run_batch(
        &self,
        tasks: Vec<TaskSpec>,
    ) -> HashMap<String, Result<ChatOutcome, ManifoldError>> {
        let futures = tasks.into_iter().map(|spec| async move {
            let outcome = self.chat_task(&spec.prompt, spec.task_type).await;
            (spec.key, outcome)
        });
        join_all(futures).await.into_iter().collect()
    }
}
