//! Join executor entry point.
//!
//! [`JoinExecutor::execute`] runs one invocation: `num_groups` groups of
//! `lanes_per_group` lanes walk the source window concurrently, each group
//! claiming batches from a shared cursor, and project the joined
//! combinations into the destination buffer. The control block carries
//! the window geometry in and the counters and status out.
//!
//! Every invocation starts the source cursor at the depth-0 window base,
//! so re-running with an unchanged control block and unchanged inputs
//! reproduces the same output.

use std::panic;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, info_span, warn};

use lanejoin_common::config::JoinConfig;
use lanejoin_common::error::{JoinError, JoinResult};
use lanejoin_common::memory::PseudoStackArena;

use crate::context::RunContext;
use crate::control::{JoinControlBlock, JoinStatus};
use crate::destination::DestinationBuffer;
use crate::group::GroupState;
use crate::lane::LaneWorker;
use crate::program::JoinProgram;
use crate::relation::{MultiRelationSet, SourceBatch};

/// Counters of one successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinSummary {
    /// Tuples in the destination buffer.
    pub nitems: u32,
    /// Destination data bytes in use.
    pub usage: u32,
    /// Matched results per depth (depth 0: source rows loaded).
    pub inner_nitems: Vec<u64>,
    /// Null-extended results per depth.
    pub outer_nitems: Vec<u64>,
    /// Source rows rejected by the prefilter.
    pub nitems_filtered: u64,
    /// Scheduler iterations, summed over groups.
    pub iterations: u64,
    /// Dives, summed over groups.
    pub dives: u64,
    /// Rewinds, summed over groups.
    pub rewinds: u64,
}

/// Runs multi-way joins over a relation set.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use lanejoin_common::config::JoinConfig;
/// use lanejoin_common::types::Tuple;
/// use lanejoin_exec::destination::DestinationBuffer;
/// use lanejoin_exec::executor::JoinExecutor;
/// use lanejoin_exec::program::{ColumnRef, EquiJoinProgram};
/// use lanejoin_exec::relation::{JoinType, MultiRelationSet, RowStore, SourceBatch};
///
/// let inner: RowStore = (0..4).map(|i| Tuple::ints([Some(i), Some(i * 10)])).collect();
/// let relations = Arc::new(
///     MultiRelationSet::builder()
///         .nest_loop(inner, JoinType::Inner)
///         .build()
///         .unwrap(),
/// );
/// let program = Arc::new(
///     EquiJoinProgram::new(1)
///         .join_on(1, ColumnRef::new(0, 0), 0)
///         .project(vec![ColumnRef::new(0, 0), ColumnRef::new(1, 1)]),
/// );
/// let source = SourceBatch::Row((0..6).map(|i| Tuple::ints([Some(i)])).collect());
///
/// let executor = JoinExecutor::new(JoinConfig::for_testing(), relations, program);
/// let mut control = executor.control_block(&source).unwrap();
/// let dest = DestinationBuffer::new(4096).unwrap();
///
/// let summary = executor.execute(&mut control, &source, &dest).unwrap();
/// assert_eq!(summary.nitems, 4);
/// ```
pub struct JoinExecutor {
    config: JoinConfig,
    relations: Arc<MultiRelationSet>,
    program: Arc<dyn JoinProgram>,
    device: usize,
}

impl JoinExecutor {
    /// Creates an executor running on device 0.
    #[must_use]
    pub fn new(
        config: JoinConfig,
        relations: Arc<MultiRelationSet>,
        program: Arc<dyn JoinProgram>,
    ) -> Self {
        Self {
            config,
            relations,
            program,
            device: 0,
        }
    }

    /// Selects the device whose outer-join map slot receives the matches.
    #[must_use]
    pub fn on_device(mut self, device: usize) -> Self {
        self.device = device;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    /// Returns the relation set.
    #[must_use]
    pub fn relations(&self) -> &Arc<MultiRelationSet> {
        &self.relations
    }

    /// Returns the device index.
    #[must_use]
    pub fn device(&self) -> usize {
        self.device
    }

    /// Creates a control block covering every relation whole, sized with
    /// the configured pseudo-stack capacity.
    pub fn control_block(&self, source: &SourceBatch) -> JoinResult<JoinControlBlock> {
        JoinControlBlock::new(&self.relations, source, self.config.pstack_nrooms)
    }

    /// Runs one invocation.
    ///
    /// On success the control block holds the stage counters and scores
    /// and its cumulative counters are advanced. A full destination buffer
    /// yields [`JoinError::DestinationFull`] with status
    /// [`JoinStatus::NoSpace`]; a callback fault yields
    /// [`JoinError::Evaluation`] with status [`JoinStatus::EvalError`].
    ///
    /// # Panics
    ///
    /// Panics if a lane panics, which means an internal invariant was
    /// violated.
    pub fn execute(
        &self,
        control: &mut JoinControlBlock,
        source: &SourceBatch,
        dest: &DestinationBuffer,
    ) -> JoinResult<JoinSummary> {
        let num_rels = self.relations.num_rels();
        let config = self
            .config
            .clone()
            .with_pstack_nrooms(control.pstack_nrooms);
        config.validate_for(num_rels)?;
        if config.num_devices != self.relations.num_devices() {
            return Err(JoinError::invalid_config(format!(
                "configured for {} devices but relations span {}",
                config.num_devices,
                self.relations.num_devices()
            )));
        }
        if self.device >= self.relations.num_devices() {
            return Err(JoinError::invalid_config(format!(
                "device {} out of range ({} devices)",
                self.device,
                self.relations.num_devices()
            )));
        }
        control.check_windows(&self.relations, source)?;

        let groups = config.num_groups;
        let lanes = config.lanes_per_group;
        let span = info_span!("join", device = self.device, groups, lanes);
        let _enter = span.enter();
        info!(
            num_rels,
            source_units = source.nitems(),
            window_base = control.window(0).window_base,
            window_size = control.window(0).window_size,
            "starting join run"
        );

        control.begin_stage();
        let arena = PseudoStackArena::new(groups, num_rels, config.pstack_nrooms);
        let ctx = RunContext::new(
            &self.relations,
            self.program.as_ref(),
            source,
            dest,
            &arena,
            control.windows(),
            &config,
            self.device,
        );
        let states: Vec<GroupState> = (0..groups)
            .map(|group| {
                GroupState::new(
                    group,
                    lanes,
                    num_rels,
                    config.pstack_nrooms,
                    self.relations.checksum_table().clone(),
                )
            })
            .collect();

        thread::scope(|scope| {
            let ctx = &ctx;
            let handles: Vec<_> = states
                .iter()
                .flat_map(|state| (0..lanes).map(move |lane| (state, lane)))
                .map(|(state, lane)| scope.spawn(move || LaneWorker::new(ctx, state, lane).run()))
                .collect();
            for handle in handles {
                if let Err(payload) = handle.join() {
                    panic::resume_unwind(payload);
                }
            }
        });

        let stats = &ctx.stats;
        let inner = stats.inner_nitems();
        let outer = stats.outer_nitems();
        control.src_read_pos = ctx.cursor_position();
        control.nitems_filtered = stats.filtered();
        control.result_nitems = dest.nitems();
        control.result_usage = dest.usage();
        for depth in 0..=num_rels {
            let distinct = if depth == 0 {
                inner[0]
            } else {
                ctx.distinct_matched(depth) as u64
            };
            let w = control.window_mut(depth);
            w.inner_nitems_stage = inner[depth];
            w.outer_nitems_stage = outer[depth];
            w.row_dist_score = if w.window_size == 0 {
                0.0
            } else {
                distinct as f64 / f64::from(w.window_size)
            };
        }

        if let Some(err) = states.iter().find_map(GroupState::take_fault) {
            if let JoinError::Evaluation {
                depth,
                code,
                message,
            } = &err
            {
                control.status = JoinStatus::EvalError {
                    depth: *depth,
                    code: *code,
                    message: message.clone(),
                };
            }
            warn!(error = %err, "join run failed");
            return Err(err);
        }
        if let Some((rows, bytes)) = states.iter().find_map(GroupState::rejected) {
            control.status = JoinStatus::NoSpace;
            warn!(
                rows,
                bytes,
                nitems = dest.nitems(),
                capacity = dest.length(),
                "destination buffer exhausted"
            );
            return Err(JoinError::DestinationFull {
                rows,
                bytes,
                capacity: dest.length(),
            });
        }

        control.commit_stage();
        let summary = JoinSummary {
            nitems: dest.nitems(),
            usage: dest.usage(),
            inner_nitems: inner,
            outer_nitems: outer,
            nitems_filtered: stats.filtered(),
            iterations: stats.iterations(),
            dives: stats.dives(),
            rewinds: stats.rewinds(),
        };
        debug!(
            nitems = summary.nitems,
            usage = summary.usage,
            iterations = summary.iterations,
            dives = summary.dives,
            rewinds = summary.rewinds,
            "join run complete"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for JoinExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinExecutor")
            .field("config", &self.config)
            .field("num_rels", &self.relations.num_rels())
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
