use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use crate::core::config::{RankConfig, DEFAULT_DB_NAME};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{EngineStats, StatsCounters};
use crate::core::transaction::{Transaction, TransactionRunner};
use crate::core::types::{Document, Namespace, Rank, Score};
use crate::rank::bucket::BucketAccessor;
use crate::rank::guard::{ConfigurationGuard, EngineState};
use crate::storage::DocumentStore;
use crate::topology::{derive_node, Field, Topology, TopologyNode};

/// Options of [`RankEngine::get_score_by_rank`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreByRankOptions {
    /// Return the top of a possibly under-populated bucket instead of the
    /// lowest score achieving the rank
    pub use_highest: bool,
}

impl ScoreByRankOptions {
    pub fn highest() -> Self {
        ScoreByRankOptions { use_highest: true }
    }
}

/// Leaderboard over `[min_score, max_score]` backed by counter buckets.
///
/// Every operation touches O(branch_factor x depth) counters. Mutations run
/// in a store transaction unless `skip_transaction` is set.
pub struct RankEngine<S: DocumentStore> {
    config: RankConfig,
    topology: Topology,
    guard: ConfigurationGuard,
    buckets: BucketAccessor<S>,
    runner: TransactionRunner<S>,
    stats: StatsCounters,
}

impl<S: DocumentStore> RankEngine<S> {
    pub fn new(store: Arc<S>, config: RankConfig) -> Result<Self> {
        let topology = Topology::new(&config)?;
        let namespace = Namespace::new(
            config.db_name.as_deref().unwrap_or(DEFAULT_DB_NAME),
            config.collection_name.clone(),
        );

        Ok(RankEngine {
            guard: ConfigurationGuard::new(topology),
            buckets: BucketAccessor::new(store.clone(), namespace),
            runner: TransactionRunner::new(store, config.transaction),
            stats: StatsCounters::default(),
            topology,
            config,
        })
    }

    pub fn config(&self) -> &RankConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn namespace(&self) -> &Namespace {
        self.buckets.namespace()
    }

    pub fn state(&self) -> EngineState {
        self.guard.state()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    /// Validate the configuration against the collection without doing
    /// anything else.
    pub async fn init(&self) -> Result<()> {
        self.ensure_validated().await
    }

    async fn ensure_validated(&self) -> Result<()> {
        self.guard
            .ensure_validated(self.buckets.store().as_ref(), self.buckets.namespace())
            .await
    }

    /// Run a chain mutation, in a transaction unless configured otherwise.
    async fn run_mutation<F, Fut>(&self, mut body: F) -> Result<()>
    where
        F: FnMut(Option<Arc<Transaction>>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.config.skip_transaction {
            return body(None).await;
        }

        let result = self.runner.start(|tx| body(Some(tx))).await?;
        StatsCounters::incr(&self.stats.transaction_retries, u64::from(result.retries));
        Ok(())
    }

    pub async fn add_score(&self, score: Score) -> Result<()> {
        self.guard.check_score(score)?;
        self.ensure_validated().await?;

        let chain = self.topology.chain(score);
        let (chain, buckets) = (&chain, &self.buckets);
        self.run_mutation(move |tx| async move {
            buckets.increment_chain(chain, 1, tx.as_deref()).await
        })
        .await?;

        StatsCounters::incr(&self.stats.scores_added, 1);
        self.guard.mark_active();
        debug!(namespace = %self.namespace(), score, "score added");
        Ok(())
    }

    /// Fails with `NotFound` and leaves every counter untouched when the
    /// score is not tracked.
    pub async fn remove_score(&self, score: Score) -> Result<()> {
        self.guard.check_score(score)?;
        self.ensure_validated().await?;

        let chain = self.topology.chain(score);
        let (chain, buckets) = (&chain, &self.buckets);
        let result = self
            .run_mutation(move |tx| async move {
                let tx = tx.as_deref();
                let documents = buckets.load_chain(chain, tx).await?;
                if !BucketAccessor::<S>::chain_is_populated(chain, &documents) {
                    return Err(Error::not_found(format!("No such score: {}", score)));
                }
                buckets.increment_chain(chain, -1, tx).await
            })
            .await;

        if let Err(err) = result {
            if err.kind == ErrorKind::NotFound {
                StatsCounters::incr(&self.stats.remove_misses, 1);
            }
            return Err(err);
        }

        StatsCounters::incr(&self.stats.scores_removed, 1);
        self.guard.mark_active();
        debug!(namespace = %self.namespace(), score, "score removed");
        Ok(())
    }

    /// Reads bound to `tx`, validated when it commits.
    pub fn in_transaction<'a>(&'a self, tx: &'a Transaction) -> RankView<'a, S> {
        RankView { engine: self, tx: Some(tx) }
    }

    fn view(&self) -> RankView<'_, S> {
        RankView { engine: self, tx: None }
    }

    pub async fn count(&self) -> Result<u64> {
        self.view().count().await
    }

    pub async fn count_by_score(&self, score: Score) -> Result<u64> {
        self.view().count_by_score(score).await
    }

    pub async fn get_rank_by_score(&self, score: Score) -> Result<Rank> {
        self.view().get_rank_by_score(score).await
    }

    pub async fn get_score_by_rank(&self, rank: Rank, options: ScoreByRankOptions) -> Result<Score> {
        self.view().get_score_by_rank(rank, options).await
    }
}

/// Read operations of an engine, optionally inside a transaction.
pub struct RankView<'a, S: DocumentStore> {
    engine: &'a RankEngine<S>,
    tx: Option<&'a Transaction>,
}

/// Where a descent continues if probing a child does not find a closer score
struct Resume {
    node: TopologyNode,
    doc: Document,
    next: usize,
    threshold: Score,
}

enum Step {
    Return(Score),
    Descend { node: TopologyNode, rank: i64 },
    Probe { node: TopologyNode, rank: i64, resume: Resume },
}

fn child_of(field: &Field, parent: &TopologyNode, branch_factor: u32) -> TopologyNode {
    derive_node(field.start, field.end, parent.layer + 1, branch_factor)
}

impl<'a, S: DocumentStore> RankView<'a, S> {
    /// Total tracked scores: the root bucket's sum.
    pub async fn count(&self) -> Result<u64> {
        self.engine.ensure_validated().await?;

        let root = self.engine.topology.root();
        let total = self
            .engine
            .buckets
            .load_node(&root, self.tx)
            .await?
            .map_or(0, |doc| doc.total());

        self.engine.guard.mark_active();
        Ok(total.max(0) as u64)
    }

    /// Occurrences of exactly `score`: one leaf counter.
    pub async fn count_by_score(&self, score: Score) -> Result<u64> {
        self.engine.guard.check_score(score)?;
        self.engine.ensure_validated().await?;

        let leaf = self
            .engine
            .topology
            .leaf(score)
            .ok_or_else(|| Error::new(ErrorKind::Internal, format!("No leaf covers score {}", score)))?;
        let field = &leaf.fields[0];
        let count = self
            .engine
            .buckets
            .load(&leaf.document_id, self.tx)
            .await?
            .map_or(0, |doc| doc.get(&field.name));

        self.engine.guard.mark_active();
        Ok(count.max(0) as u64)
    }

    /// Competition rank: 1 + number of tracked scores strictly above `score`.
    pub async fn get_rank_by_score(&self, score: Score) -> Result<Rank> {
        self.engine.guard.check_score(score)?;
        self.engine.ensure_validated().await?;

        let chain = self.engine.topology.rank_chain(score);
        let documents = self.engine.buckets.load_chain(&chain, self.tx).await?;
        let better = BucketAccessor::<S>::sum_chain(&chain, &documents);

        StatsCounters::incr(&self.engine.stats.rank_lookups, 1);
        self.engine.guard.mark_active();
        Ok(better.max(0) as u64 + 1)
    }

    /// Score holding `rank`: the lowest score achieving it, or with
    /// `use_highest` the highest score that would still achieve it.
    ///
    /// Ranks past the last tracked score resolve to `min_score`
    /// (`max_score`'s bucket top with `use_highest`).
    pub async fn get_score_by_rank(&self, rank: Rank, options: ScoreByRankOptions) -> Result<Score> {
        self.engine.guard.check_rank(rank)?;
        self.engine.ensure_validated().await?;

        let use_highest = options.use_highest;
        let branch_factor = self.engine.topology.branch_factor;
        let mut pending: Vec<Resume> = Vec::new();

        let mut node = self.engine.topology.root();
        let mut doc = self.engine.buckets.load_node(&node, self.tx).await?;
        let mut skip = 0;
        let mut remaining = i64::try_from(rank).unwrap_or(i64::MAX);

        let score = loop {
            match Self::scan(&node, doc.as_ref(), skip, remaining, use_highest, branch_factor) {
                Step::Descend { node: child, rank } => {
                    doc = self.engine.buckets.load_node(&child, self.tx).await?;
                    node = child;
                    skip = 0;
                    remaining = rank;
                }
                Step::Probe { node: child, rank, resume } => {
                    pending.push(resume);
                    doc = self.engine.buckets.load_node(&child, self.tx).await?;
                    node = child;
                    skip = 0;
                    remaining = rank;
                }
                Step::Return(value) => {
                    // A probe's answer only stands when it beats the top of
                    // the probed field; otherwise the parent scan resumes
                    // with a single rank left to place.
                    let mut resumed = false;
                    while let Some(resume) = pending.pop() {
                        if value < resume.threshold {
                            continue;
                        }
                        node = resume.node;
                        doc = Some(resume.doc);
                        skip = resume.next;
                        remaining = 1;
                        resumed = true;
                        break;
                    }
                    if !resumed {
                        break value;
                    }
                }
            }
        };

        StatsCounters::incr(&self.engine.stats.score_lookups, 1);
        self.engine.guard.mark_active();
        Ok(score)
    }

    /// Walk a node's fields best-first starting after `skip` of them.
    fn scan(
        node: &TopologyNode,
        doc: Option<&Document>,
        skip: usize,
        mut rank: i64,
        use_highest: bool,
        branch_factor: u32,
    ) -> Step {
        if let Some(doc) = doc {
            for (position, field) in node.fields.iter().rev().enumerate().skip(skip) {
                // Racing direct-mode removals can leave a counter below zero
                let total = doc.get(&field.name).max(0);

                if use_highest {
                    if rank == 1 && total == 0 {
                        return Step::Return(field.end);
                    }
                    if rank - total == 1 && field.has_child {
                        return Step::Probe {
                            node: child_of(field, node, branch_factor),
                            rank,
                            resume: Resume {
                                node: node.clone(),
                                doc: doc.clone(),
                                next: position + 1,
                                threshold: field.end,
                            },
                        };
                    }
                }

                if total >= rank {
                    if field.has_child {
                        return Step::Descend { node: child_of(field, node, branch_factor), rank };
                    }
                    return Step::Return(field.start);
                }

                rank -= total;
            }
        }

        Step::Return(if use_highest { node.end } else { node.start })
    }
}
