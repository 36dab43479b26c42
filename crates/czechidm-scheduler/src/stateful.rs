//! Paged execution with a resumable processed-items queue
//!
//! `StatefulExecutor` wraps a `StatefulTaskExecutor` and drives it page by
//! page. Items successfully processed under a scheduled task are remembered in
//! the queue of that scheduled task and skipped by later runs.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use czechidm_common::{IdmError, IdmResult, OperationResult, OperationState};
use czechidm_persistence::{Page, PageRequest};

use crate::executor::{TaskContext, TaskExecutor};
use crate::processed_items::ProcessedItemsService;

/// Candidates are loaded in pages of this size
pub const PAGE_SIZE: u64 = 100;

/// Reference to one candidate entity
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskItem {
    pub id: Uuid,
    pub dto_type: String,
}

impl TaskItem {
    pub fn new(id: Uuid, dto_type: &str) -> Self {
        Self {
            id,
            dto_type: dto_type.to_string(),
        }
    }
}

/// Per item work of a stateful task
#[async_trait]
pub trait StatefulTaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<String> {
        None
    }

    fn is_concurrent(&self) -> bool {
        true
    }

    fn supports_dry_run(&self) -> bool {
        false
    }

    /// Process each item in isolation, a panic fails only that item
    fn require_new_transaction(&self) -> bool {
        false
    }

    /// Keep going after a failed item instead of failing the run
    fn continue_on_exception(&self) -> bool {
        false
    }

    /// Remember processed items between runs
    fn supports_queue(&self) -> bool {
        true
    }

    async fn items_to_process(
        &self,
        ctx: &TaskContext,
        page: PageRequest,
    ) -> IdmResult<Page<TaskItem>>;

    /// `Ok(None)` counts as executed
    async fn process_item(
        &self,
        ctx: &TaskContext,
        item: &TaskItem,
    ) -> IdmResult<Option<OperationResult>>;
}

pub struct StatefulExecutor<E> {
    executor: Arc<E>,
    items: ProcessedItemsService,
}

impl<E: StatefulTaskExecutor> StatefulExecutor<E> {
    pub fn new(executor: Arc<E>, items: ProcessedItemsService) -> Self {
        Self { executor, items }
    }

    pub fn inner(&self) -> &Arc<E> {
        &self.executor
    }

    async fn process_candidate(
        &self,
        ctx: &TaskContext,
        item: &TaskItem,
    ) -> IdmResult<Option<OperationResult>> {
        // unsupported dry runs are rejected by the runner before start
        if ctx.is_dry_run() {
            return Ok(Some(OperationResult::new(OperationState::NotExecuted)));
        }

        if !self.executor.require_new_transaction() {
            return self.executor.process_item(ctx, item).await;
        }
        match AssertUnwindSafe(self.executor.process_item(ctx, item))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(IdmError::Internal(format!(
                "processing of item [{}] panicked",
                item.id
            ))),
        }
    }

    /// Drop queue entries of candidates that were not seen by this run
    async fn purge_queue(&self, scheduled_task_id: Uuid, seen: &HashSet<Uuid>) -> IdmResult<()> {
        for queued in self.items.find_queue(scheduled_task_id).await? {
            if !seen.contains(&queued.referenced_entity_id) {
                self.items
                    .remove_from_queue(scheduled_task_id, queued.referenced_entity_id)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<E: StatefulTaskExecutor + 'static> TaskExecutor for StatefulExecutor<E> {
    fn name(&self) -> &str {
        self.executor.name()
    }

    fn description(&self) -> Option<String> {
        self.executor.description()
    }

    fn is_concurrent(&self) -> bool {
        self.executor.is_concurrent()
    }

    fn supports_dry_run(&self) -> bool {
        self.executor.supports_dry_run()
    }

    fn is_stateful(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &TaskContext) -> IdmResult<Option<OperationResult>> {
        let queue_owner = ctx
            .scheduled_task_id()
            .filter(|_| self.executor.supports_queue());
        let mut seen = HashSet::new();
        let mut request = PageRequest::first(PAGE_SIZE);
        let mut canceled = false;

        'pages: loop {
            let page = self.executor.items_to_process(ctx, request).await?;
            if request.page == 0 {
                ctx.set_count(Some(page.total_count as i64));
            }

            for item in &page.page_items {
                seen.insert(item.id);

                if let Some(owner) = queue_owner {
                    if self.items.is_in_queue(owner, item.id).await? {
                        debug!(task_id = %ctx.long_running_task_id(), item = %item.id, "Item already processed, skipping");
                        ctx.decrement_count();
                        continue;
                    }
                }

                let outcome = self.process_candidate(ctx, item).await;
                let result = match &outcome {
                    Ok(result) => result
                        .clone()
                        .unwrap_or_else(|| OperationResult::new(OperationState::Executed)),
                    Err(e) => OperationResult::from_error(e),
                };
                self.items
                    .log_item(ctx.long_running_task_id(), item.id, &item.dto_type, &result)
                    .await?;

                match outcome {
                    Err(e) if !self.executor.continue_on_exception() => return Err(e),
                    Err(e) => {
                        warn!(task_id = %ctx.long_running_task_id(), item = %item.id, error = %e, "Item processing failed, continuing");
                    }
                    Ok(_) => {
                        if let Some(owner) = queue_owner.filter(|_| result.state.is_successful()) {
                            self.items
                                .enqueue(owner, item.id, &item.dto_type, &result)
                                .await?;
                        }
                    }
                }

                ctx.increment_counter();
                if !ctx.update_state().await? {
                    canceled = true;
                    break 'pages;
                }
            }

            if !page.has_next() {
                break;
            }
            request = request.next();
        }

        if canceled {
            info!(task_id = %ctx.long_running_task_id(), counter = ?ctx.counter(), "Stateful task canceled");
        } else if let Some(owner) = queue_owner {
            self.purge_queue(owner, &seen).await?;
        }
        Ok(None)
    }
}
