//!
//! In-process runtime used by tests and local development.
//!
//! Execution is trivial: every transaction's output is its input. Everything around it is
//! real: the input tree and I/O tree are built and committed through the storage
//! collaborator, the results header is assembled on top of the previous block, and
//! CheckTx goes through a pluggable policy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::events::{Event, EventSubscription, StartedEvent};
use super::lifecycle::Lifecycle;
use super::Runtime;
use crate::checktx::{evaluate_batch, CheckTxPolicy, SentinelPolicy};
use crate::commitment::CommitmentBuilder;
use crate::config::HostConfig;
use crate::context::CallContext;
use crate::error::{HostError, ProtocolError};
use crate::protocol::{
    Body, CapabilityTee, CheckTxBatchRequest, CheckTxBatchResponse, ComputedBatch, Empty,
    ExecuteTxBatchRequest, ExecuteTxBatchResponse, FeatureScheduleControl, Features,
    QueryRequest, QueryResponse, RuntimeInfoResponse,
};
use crate::storage::{MemoryTreeProvider, TreeProvider, WriteLog};
use crate::transaction::{Tag, Tags, Transaction, Tree};
use crate::types::{Hash, Namespace, Root, RootKind, Version, RUNTIME_HOST_PROTOCOL};

const ATTESTATION_DOMAIN: &[u8] = b"runtime-host/mock-attestation";

/// Tags attached to every executed transaction.
pub fn default_tags() -> Tags {
    vec![Tag::new(b"txn_foo".to_vec(), b"txn_bar".to_vec())]
}

/// A runtime that executes batches in-process.
pub struct MockRuntime {
    id: Namespace,
    version: Version,
    initial_batch_size: u32,
    trees: Arc<dyn TreeProvider>,
    checktx: Arc<dyn CheckTxPolicy>,
    capability_tee: Mutex<Option<CapabilityTee>>,
    attestations: AtomicU64,
    executed: AtomicU64,
    lifecycle: Lifecycle,
}

impl MockRuntime {
    pub fn new(id: Namespace) -> Self {
        let defaults = HostConfig::default();
        MockRuntime {
            id,
            version: Version::default(),
            initial_batch_size: defaults.initial_batch_size,
            trees: Arc::new(MemoryTreeProvider::new()),
            checktx: Arc::new(SentinelPolicy::new()),
            capability_tee: Mutex::new(None),
            attestations: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            lifecycle: Lifecycle::new(defaults.event_buffer),
        }
    }

    pub fn from_config(config: &HostConfig) -> Result<Self, HostError> {
        config.validate()?;
        let mut rt = Self::new(config.namespace()?);
        rt.version = config.version()?;
        rt.initial_batch_size = config.initial_batch_size;
        rt.checktx = Arc::new(SentinelPolicy::with_max_tx_size(config.max_tx_size));
        rt.lifecycle = Lifecycle::new(config.event_buffer);
        Ok(rt)
    }

    pub fn with_tree_provider(mut self, trees: Arc<dyn TreeProvider>) -> Self {
        self.trees = trees;
        self
    }

    pub fn with_checktx_policy(mut self, policy: Arc<dyn CheckTxPolicy>) -> Self {
        self.checktx = policy;
        self
    }

    pub fn with_capability_tee(self, tee: CapabilityTee) -> Self {
        *self.tee() = Some(tee);
        self
    }

    /// Number of requests that reached execution logic.
    pub fn executed_requests(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Events dropped because a subscriber fell behind.
    pub fn dropped_events(&self) -> u64 {
        self.lifecycle.dropped_events()
    }

    fn tee(&self) -> std::sync::MutexGuard<'_, Option<CapabilityTee>> {
        self.capability_tee.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn info(&self) -> RuntimeInfoResponse {
        let schedule_control = match self.initial_batch_size {
            0 => None,
            initial_batch_size => Some(FeatureScheduleControl { initial_batch_size }),
        };
        RuntimeInfoResponse {
            protocol_version: RUNTIME_HOST_PROTOCOL,
            runtime_version: self.version,
            features: Features { schedule_control },
        }
    }

    fn execute_batch(
        &self,
        ctx: &CallContext,
        rq: ExecuteTxBatchRequest,
    ) -> Result<ExecuteTxBatchResponse, HostError> {
        let previous = &rq.block.header;
        let builder = CommitmentBuilder::on_top_of(previous)?;
        let round = builder.round();
        let tags = default_tags();

        // The tree is released on every exit path when it goes out of scope.
        let store = self.trees.open()?;
        let mut tree = Tree::new(store, Root::empty(previous.namespace, round, RootKind::Input));

        let mut tx_hashes = Vec::with_capacity(rq.inputs.len());
        for input in &rq.inputs {
            let tx = Transaction::input(input.clone());
            tree.add_transaction(ctx, &tx, &tags)?;
            tx_hashes.push(tx.hash());
        }
        let (tx_input_write_log, tx_input_root) = tree.commit(ctx)?;

        let mut tree = tree.next_scope(RootKind::Output)?;
        for input in &rq.inputs {
            tree.add_transaction(ctx, &Transaction::executed(input.clone(), input.clone()), &tags)?;
        }
        let (io_write_log, io_root) = tree.commit(ctx)?;
        tree.close();

        let header = builder
            .input_root(tx_input_root.hash)
            .io_root(io_root.hash)
            .state_root(Hash::EMPTY)
            .messages(&[])
            .in_messages(&rq.in_msgs)
            .build();

        tracing::debug!(round, txs = tx_hashes.len(), io_root = %io_root.hash, "batch executed");
        Ok(ExecuteTxBatchResponse {
            batch: ComputedBatch {
                header,
                io_write_log,
                state_write_log: WriteLog::new(),
                messages: Vec::new(),
                rak_sig: None,
            },
            tx_hashes,
            tx_input_root,
            tx_input_write_log,
        })
    }

    fn check_batch(&self, rq: CheckTxBatchRequest) -> CheckTxBatchResponse {
        CheckTxBatchResponse { results: evaluate_batch(self.checktx.as_ref(), &rq.inputs) }
    }

    fn query(&self, rq: QueryRequest) -> Result<QueryResponse, HostError> {
        let reply = format!("{} world at:{}", rq.method, rq.consensus_block.height);
        Ok(QueryResponse { data: serde_json::to_vec(&reply)? })
    }

    fn dispatch(&self, ctx: &CallContext, body: Body) -> Result<Body, HostError> {
        let response = match body {
            Body::ExecuteTxBatchRequest(rq) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                let round = rq.block.header.round.saturating_add(1);
                let response = self.execute_batch(ctx, rq).map_err(|err| {
                    tracing::warn!(round, error = %err, "batch execution aborted");
                    err
                })?;
                Body::ExecuteTxBatchResponse(response)
            }
            Body::CheckTxBatchRequest(rq) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                Body::CheckTxBatchResponse(self.check_batch(rq))
            }
            Body::QueryRequest(rq) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                Body::QueryResponse(self.query(rq)?)
            }
            Body::ConsensusSyncRequest(_) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                Body::ConsensusSyncResponse(Empty {})
            }
            other => return Err(ProtocolError::UnsupportedMethod(other.method().to_string()).into()),
        };
        Ok(response)
    }
}

impl std::fmt::Debug for MockRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRuntime")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("executed", &self.executed_requests())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    fn id(&self) -> Namespace {
        self.id
    }

    async fn get_info(&self, ctx: &CallContext) -> Result<RuntimeInfoResponse, HostError> {
        let _call = self.lifecycle.begin_call(ctx).await?;
        Ok(self.info())
    }

    fn get_active_version(&self) -> Option<Version> {
        None
    }

    fn get_capability_tee(&self) -> Option<CapabilityTee> {
        self.tee().clone()
    }

    async fn call(&self, ctx: &CallContext, body: Body) -> Result<Body, HostError> {
        let call = self.lifecycle.begin_call(ctx).await?;
        call.ctx.check()?;
        tracing::debug!(method = body.method(), "dispatching call");
        self.dispatch(&call.ctx, body)
    }

    fn update_capability_tee(&self) {
        let updated = {
            let mut tee = self.tee();
            let Some(current) = tee.as_mut() else {
                return;
            };
            let n = self.attestations.fetch_add(1, Ordering::Relaxed) + 1;
            current.attestation =
                Hash::digest_parts(ATTESTATION_DOMAIN, &[&current.rak[..], &n.to_be_bytes()[..]]).0.to_vec();
            current.clone()
        };
        tracing::debug!("capability TEE refreshed");
        self.lifecycle.publish(Event::Updated { capability_tee: Some(updated) });
    }

    fn watch_events(&self) -> (mpsc::Receiver<Event>, EventSubscription) {
        self.lifecycle.watch()
    }

    async fn start(&self) {
        let mut transition = self.lifecycle.transition(false).await;
        let event = StartedEvent { version: self.version, capability_tee: self.get_capability_tee() };
        if !transition.started(event) {
            tracing::debug!(runtime = %self.id, "start requested while running");
        }
    }

    async fn abort(&self, _ctx: &CallContext, force: bool) -> Result<(), HostError> {
        if force {
            self.lifecycle.transition(true).await.stopped();
        } else {
            self.lifecycle.interrupt().await;
        }
        Ok(())
    }

    async fn stop(&self) {
        if !self.lifecycle.transition(false).await.stopped() {
            tracing::debug!(runtime = %self.id, "stop requested while stopped");
        }
    }
}
