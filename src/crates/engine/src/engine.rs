//! Topological workflow execution.
//!
//! A run walks the validated graph with an in-degree ready queue: start
//! nodes first, each node released once every predecessor has finished,
//! each node executed at most once. Per-node results land in
//! `workflow_execution_logs`; counters and cost accumulate on the
//! `workflow_executions` row through single-statement increments.
//!
//! Error strategy is a per-workflow setting:
//!
//! - `stop` (default) — the first failure fails the run and the remaining
//!   nodes are logged `skipped`
//! - `continue` — a failure condemns only the failed node's transitive
//!   successors; independent branches keep running
//! - `retry` — bounded attempts with linear backoff and jitter, one log
//!   row per attempt; exhaustion follows the `stop` path

use crate::graph::{WorkflowDefinition, WorkflowNode};
use crate::handlers::{HandlerRegistry, NodeContext};
use crate::vars;
use platform::{PlatformError, Result};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::models::{Workflow, WorkflowExecution, WorkflowExecutionLog};
use storage::repositories::{ExecutionLogRepository, ExecutionRepository, WorkflowRepository};
use storage::DatabasePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What the engine does after a node fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// Fail the run on the first node failure
    Stop,
    /// Skip the failed node's dependents, keep independent branches running
    Continue,
    /// Retry the node before giving up, then fail the run
    Retry,
}

impl ErrorStrategy {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "stop" => Some(Self::Stop),
            "continue" => Some(Self::Continue),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }
}

/// Engine knobs, overridable per workflow through its settings JSON
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Wall-clock budget for one run
    pub max_execution_time_secs: u64,
    pub error_strategy: ErrorStrategy,
    /// Attempts per node under the retry strategy
    pub retry_attempts: u32,
    /// Base of the linear backoff between attempts
    pub retry_delay_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_execution_time_secs: 3600,
            error_strategy: ErrorStrategy::Stop,
            retry_attempts: 3,
            retry_delay_secs: 5,
        }
    }
}

impl EngineSettings {
    /// Overlay a workflow's settings JSON on these defaults.
    ///
    /// Unknown keys and malformed JSON are ignored; an unrecognized
    /// strategy name keeps the default and logs a warning.
    pub fn overlay(&self, settings_json: &str) -> Self {
        let parsed: Value = serde_json::from_str(settings_json).unwrap_or(Value::Null);
        let mut merged = self.clone();

        if let Some(secs) = parsed.get("max_execution_time_secs").and_then(Value::as_u64) {
            merged.max_execution_time_secs = secs;
        }
        if let Some(name) = parsed.get("error_strategy").and_then(Value::as_str) {
            match ErrorStrategy::parse(name) {
                Some(strategy) => merged.error_strategy = strategy,
                None => warn!(strategy = name, "unknown error strategy, keeping default"),
            }
        }
        if let Some(attempts) = parsed.get("retry_attempts").and_then(Value::as_u64) {
            merged.retry_attempts = attempts as u32;
        }
        if let Some(secs) = parsed.get("retry_delay_secs").and_then(Value::as_u64) {
            merged.retry_delay_secs = secs;
        }

        merged
    }
}

/// Point-in-time view of a run, for status endpoints
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionProgress {
    pub execution_id: String,
    pub status: String,
    /// completed / total * 100, zero while no nodes are known
    pub progress_percent: f64,
    pub total_nodes: i64,
    pub completed_nodes: i64,
    pub failed_nodes: i64,
    pub total_cost: f64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub logs: Vec<WorkflowExecutionLog>,
}

/// How a node loop ended
enum RunOutcome {
    Completed(HashMap<String, Value>),
    Failed(String),
    Cancelled,
    TimedOut(u64),
}

/// The workflow execution engine.
///
/// Holds the handler registry and default settings; everything per-run
/// lives in the database so instances are freely shared.
pub struct ExecutionEngine {
    pool: DatabasePool,
    handlers: Arc<HandlerRegistry>,
    defaults: EngineSettings,
}

impl ExecutionEngine {
    pub fn new(pool: DatabasePool, handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            pool,
            handlers,
            defaults: EngineSettings::default(),
        }
    }

    /// Replace the default settings workflows overlay their own onto
    pub fn with_defaults(mut self, defaults: EngineSettings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Run a workflow to a terminal state.
    ///
    /// The returned record is terminal whenever the run actually started;
    /// `Err` is reserved for pre-run failures: unknown or inactive
    /// workflow, invalid definition, storage errors. Caller-supplied
    /// `variables` override the workflow's own defaults key by key.
    pub async fn execute(
        &self,
        workflow_id: &str,
        user_id: &str,
        input_data: Value,
        variables: Value,
    ) -> Result<WorkflowExecution> {
        let workflow = WorkflowRepository::get_readable(&self.pool, workflow_id, user_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("workflow {workflow_id}")))?;
        if !workflow.is_active() {
            return Err(PlatformError::validation(format!(
                "workflow '{}' is not active",
                workflow.name
            )));
        }

        let definition =
            WorkflowDefinition::validated(&workflow.definition, &self.handlers.node_types())?;

        let mut merged: Map<String, Value> =
            serde_json::from_str(&workflow.variables).unwrap_or_default();
        if let Value::Object(caller) = variables {
            for (key, value) in caller {
                merged.insert(key, value);
            }
        }

        let settings = self.defaults.overlay(&workflow.settings);

        let execution_id = Uuid::new_v4().to_string();
        let record = WorkflowExecution::new(
            execution_id.clone(),
            workflow.id.clone(),
            user_id.to_string(),
        )
        .with_input(input_data.to_string())
        .with_variables(Value::Object(merged.clone()).to_string());
        ExecutionRepository::create(&self.pool, record).await?;
        WorkflowRepository::record_execution(&self.pool, &workflow.id).await?;

        if !ExecutionRepository::try_start(&self.pool, &execution_id).await? {
            // Cancelled between create and start
            return self.reload(&execution_id).await;
        }
        ExecutionRepository::set_total_nodes(
            &self.pool,
            &execution_id,
            definition.nodes.len() as i64,
        )
        .await?;

        info!(
            workflow_id = %workflow.id,
            execution_id = %execution_id,
            nodes = definition.nodes.len(),
            strategy = ?settings.error_strategy,
            "workflow execution started"
        );

        let outcome = match self
            .run_nodes(&workflow, &definition, &settings, &execution_id, user_id, merged)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                // Never leave the row in running after a mid-run error
                if let Err(write_err) =
                    ExecutionRepository::try_fail(&self.pool, &execution_id, &err.to_string()).await
                {
                    warn!(
                        execution_id = %execution_id,
                        error = %write_err,
                        "failed to record run failure"
                    );
                }
                return Err(err);
            }
        };

        match outcome {
            RunOutcome::Completed(outputs) => {
                let output_json =
                    Value::Object(outputs.into_iter().collect::<Map<String, Value>>()).to_string();
                ExecutionRepository::try_complete(&self.pool, &execution_id, &output_json).await?;
                info!(execution_id = %execution_id, "workflow execution completed");
            }
            RunOutcome::Failed(message) => {
                ExecutionRepository::try_fail(&self.pool, &execution_id, &message).await?;
                warn!(execution_id = %execution_id, error = %message, "workflow execution failed");
            }
            RunOutcome::Cancelled => {
                info!(execution_id = %execution_id, "workflow execution cancelled");
            }
            RunOutcome::TimedOut(elapsed) => {
                let message = PlatformError::Timeout {
                    elapsed_secs: elapsed,
                    limit_secs: settings.max_execution_time_secs,
                }
                .to_string();
                ExecutionRepository::try_fail(&self.pool, &execution_id, &message).await?;
                warn!(execution_id = %execution_id, elapsed, "workflow execution timed out");
            }
        }

        self.reload(&execution_id).await
    }

    /// Flip a pending or running execution to cancelled.
    ///
    /// The node loop observes the flip between nodes and stops promptly.
    pub async fn cancel(&self, user_id: &str, execution_id: &str) -> Result<WorkflowExecution> {
        let execution = ExecutionRepository::get_for_user(&self.pool, execution_id, user_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("execution {execution_id}")))?;

        if !ExecutionRepository::try_cancel(&self.pool, execution_id).await? {
            return Err(PlatformError::InvalidStateTransition {
                from: execution.status,
                to: "cancelled".to_string(),
            });
        }

        info!(execution_id = %execution_id, "workflow execution cancel requested");
        self.reload(execution_id).await
    }

    /// Progress view of one run, including its node logs
    pub async fn status(&self, user_id: &str, execution_id: &str) -> Result<ExecutionProgress> {
        let execution = ExecutionRepository::get_for_user(&self.pool, execution_id, user_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("execution {execution_id}")))?;
        let logs = ExecutionLogRepository::list_for_execution(&self.pool, execution_id).await?;

        let progress_percent = if execution.total_nodes > 0 {
            execution.completed_nodes as f64 / execution.total_nodes as f64 * 100.0
        } else {
            0.0
        };

        Ok(ExecutionProgress {
            execution_id: execution.id.clone(),
            status: execution.status.clone(),
            progress_percent,
            total_nodes: execution.total_nodes,
            completed_nodes: execution.completed_nodes,
            failed_nodes: execution.failed_nodes,
            total_cost: execution.total_cost,
            started_at: execution.started_at.clone(),
            completed_at: execution.completed_at.clone(),
            execution_time_ms: execution.execution_time_ms(),
            logs,
        })
    }

    async fn run_nodes(
        &self,
        workflow: &Workflow,
        definition: &WorkflowDefinition,
        settings: &EngineSettings,
        execution_id: &str,
        user_id: &str,
        variables: Map<String, Value>,
    ) -> Result<RunOutcome> {
        let by_id: HashMap<&str, &WorkflowNode> = definition
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n))
            .collect();
        let mut in_degree: HashMap<&str, usize> =
            definition.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        for edge in &definition.edges {
            if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
                *degree += 1;
            }
        }

        let mut ready: VecDeque<&WorkflowNode> = definition
            .nodes
            .iter()
            .filter(|n| in_degree.get(n.id.as_str()) == Some(&0))
            .collect();

        let mut ctx = NodeContext {
            user_id: user_id.to_string(),
            workflow_id: workflow.id.clone(),
            execution_id: execution_id.to_string(),
            variables,
            node_outputs: HashMap::new(),
        };

        // Nodes that have left the queue (each has a log row by then)
        let mut visited: HashSet<&str> = HashSet::new();
        // Nodes condemned to skip before becoming ready
        let mut condemned: HashSet<String> = HashSet::new();
        let mut completed = 0usize;
        let mut failed = 0usize;
        let started = Instant::now();

        while let Some(node) = ready.pop_front() {
            // Both checks run between nodes, never mid-handler
            let status = ExecutionRepository::get_status(&self.pool, execution_id).await?;
            if status.as_deref() == Some("cancelled") {
                self.skip_remaining(execution_id, definition, &visited).await?;
                return Ok(RunOutcome::Cancelled);
            }
            let elapsed = started.elapsed().as_secs();
            if elapsed >= settings.max_execution_time_secs {
                self.skip_remaining(execution_id, definition, &visited).await?;
                return Ok(RunOutcome::TimedOut(elapsed));
            }

            visited.insert(node.id.as_str());

            if condemned.contains(node.id.as_str()) {
                let row = WorkflowExecutionLog::skipped(
                    Uuid::new_v4().to_string(),
                    execution_id.to_string(),
                    node.id.clone(),
                    node.node_type.clone(),
                );
                ExecutionLogRepository::create(&self.pool, row).await?;
                release_successors(definition, &by_id, node, &mut in_degree, &mut ready);
                continue;
            }

            let last_error = self.run_node(node, &mut ctx, settings).await?;

            match last_error {
                None => {
                    completed += 1;
                    ExecutionRepository::increment_completed(&self.pool, execution_id).await?;
                }
                Some(err) => {
                    failed += 1;
                    ExecutionRepository::increment_failed(&self.pool, execution_id).await?;

                    if settings.error_strategy != ErrorStrategy::Continue {
                        self.skip_remaining(execution_id, definition, &visited).await?;
                        return Ok(RunOutcome::Failed(err.to_string()));
                    }
                    condemn_successors(definition, &node.id, &mut condemned);
                }
            }

            release_successors(definition, &by_id, node, &mut in_degree, &mut ready);
        }

        if completed == 0 && failed > 0 {
            return Ok(RunOutcome::Failed("all nodes failed".to_string()));
        }
        Ok(RunOutcome::Completed(ctx.node_outputs))
    }

    /// Execute one node, retrying under the retry strategy.
    ///
    /// Returns the final attempt's error, `None` on success. Every attempt
    /// writes its own log row; success records the output and cost on the
    /// execution.
    async fn run_node(
        &self,
        node: &WorkflowNode,
        ctx: &mut NodeContext,
        settings: &EngineSettings,
    ) -> Result<Option<PlatformError>> {
        let handler = self.handlers.get(&node.node_type)?;
        let resolved = vars::resolve_config(&node.config, &ctx.variables, &ctx.node_outputs);
        let input_snapshot = serde_json::to_string(&resolved)?;

        let attempts = if settings.error_strategy == ErrorStrategy::Retry {
            settings.retry_attempts.max(1)
        } else {
            1
        };

        let mut last_error = None;
        for attempt in 1..=attempts {
            let log = WorkflowExecutionLog::new(
                Uuid::new_v4().to_string(),
                ctx.execution_id.clone(),
                node.id.clone(),
                node.node_type.clone(),
            )
            .with_input(input_snapshot.as_str());
            let log_id = log.id.clone();
            ExecutionLogRepository::create(&self.pool, log).await?;

            let attempt_started = Instant::now();
            match handler.execute(ctx, &resolved).await {
                Ok(output) => {
                    let duration = attempt_started.elapsed().as_millis() as i64;
                    let cost = output.get("cost").and_then(Value::as_f64).unwrap_or(0.0);
                    ExecutionLogRepository::mark_completed(
                        &self.pool,
                        &log_id,
                        &output.to_string(),
                        cost,
                        duration,
                    )
                    .await?;
                    if cost != 0.0 {
                        ExecutionRepository::add_cost(&self.pool, &ctx.execution_id, cost).await?;
                    }
                    debug!(node_id = %node.id, attempt, duration_ms = duration, "node completed");
                    ctx.node_outputs.insert(node.id.clone(), output);
                    return Ok(None);
                }
                Err(err) => {
                    let duration = attempt_started.elapsed().as_millis() as i64;
                    ExecutionLogRepository::mark_failed(
                        &self.pool,
                        &log_id,
                        &err.to_string(),
                        duration,
                    )
                    .await?;
                    warn!(node_id = %node.id, attempt, error = %err, "node attempt failed");
                    last_error = Some(err);
                    if attempt < attempts {
                        let backoff = settings.retry_delay_secs * u64::from(attempt) * 1000
                            + jitter_ms();
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Ok(last_error)
    }

    /// Log a skipped row for every node that never left the ready queue
    async fn skip_remaining(
        &self,
        execution_id: &str,
        definition: &WorkflowDefinition,
        visited: &HashSet<&str>,
    ) -> Result<()> {
        for node in &definition.nodes {
            if !visited.contains(node.id.as_str()) {
                let row = WorkflowExecutionLog::skipped(
                    Uuid::new_v4().to_string(),
                    execution_id.to_string(),
                    node.id.clone(),
                    node.node_type.clone(),
                );
                ExecutionLogRepository::create(&self.pool, row).await?;
            }
        }
        Ok(())
    }

    async fn reload(&self, execution_id: &str) -> Result<WorkflowExecution> {
        ExecutionRepository::get_by_id(&self.pool, execution_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("execution {execution_id}")))
    }
}

/// Decrement each successor's in-degree, queueing those that reach zero
fn release_successors<'a>(
    definition: &'a WorkflowDefinition,
    by_id: &HashMap<&str, &'a WorkflowNode>,
    node: &WorkflowNode,
    in_degree: &mut HashMap<&str, usize>,
    ready: &mut VecDeque<&'a WorkflowNode>,
) {
    for target in definition.successors(&node.id) {
        if let Some(degree) = in_degree.get_mut(target) {
            *degree -= 1;
            if *degree == 0 {
                if let Some(next) = by_id.get(target) {
                    ready.push_back(*next);
                }
            }
        }
    }
}

/// Mark every transitive successor of a failed node for skipping
fn condemn_successors(
    definition: &WorkflowDefinition,
    from: &str,
    condemned: &mut HashSet<String>,
) {
    let mut queue: VecDeque<&str> = definition.successors(from).into();
    while let Some(id) = queue.pop_front() {
        if condemned.insert(id.to_string()) {
            queue.extend(definition.successors(id));
        }
    }
}

fn jitter_ms() -> u64 {
    use rand::Rng;
    rand::thread_rng().gen_range(0..=250)
}
