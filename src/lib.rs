pub mod core;
pub mod storage;
pub mod topology;
pub mod rank;

pub use crate::core::config::{Config, RankConfig, TransactionConfig};
pub use crate::core::database::Database;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::transaction::{IsolationLevel, Transaction, TransactionResult, TransactionRunner};
pub use crate::core::types::{Document, Namespace, Rank, Score};
pub use crate::rank::{EngineState, RankEngine, RankView, ScoreByRankOptions};
pub use crate::storage::{DocumentStore, LocalStore};
pub use crate::topology::Topology;

/*
┌──────────────────────────────────────────────────────────────────────────────┐
│                          RANKTREE STRUCT ARCHITECTURE                        │
└──────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── RANK LAYER ──────────────────────────────────┐
│                                                                              │
│  struct RankEngine<S: DocumentStore>                                         │
│  ├── config: RankConfig             // score domain, branch factor, tx opts  │
│  ├── topology: Topology             // pure bucket geometry                  │
│  ├── guard: ConfigurationGuard      // meta-record check, engine state       │
│  ├── buckets: BucketAccessor<S>     // node <-> counter document             │
│  ├── runner: TransactionRunner<S>   // optimistic retry loop                 │
│  └── stats: StatsCounters                                                    │
│                                                                              │
│  add_score / remove_score ──► chain(score) ──► upsert_increment (+1 / -1)    │
│  get_rank_by_score ─────────► rank_chain(score) ──► find_by_ids ──► sum + 1  │
│  get_score_by_rank ─────────► root ──► best-first field scan ──► child ...   │
└──────────────────────────────────────────────────────────────────────────────┘
                                      │
                                      ▼
┌─────────────────────────────── TOPOLOGY LAYER ───────────────────────────────┐
│                                                                              │
│  rank_0_1_100 { range_1_13, range_14_26, ..., range_92_100 }                 │
│       └── rank_1_92_100 { range_92_93, ..., range_100_100 }                  │
│                └── rank_2_98_99 { range_98_98, range_99_99 }                 │
└──────────────────────────────────────────────────────────────────────────────┘
                                      │
                                      ▼
┌──────────────────────────────── STORAGE LAYER ───────────────────────────────┐
│                                                                              │
│  trait DocumentStore   find_by_id, find_by_ids, upsert_increment,            │
│                        upsert_set_on_insert, commit                          │
│                                                                              │
│  struct LocalStore                                                           │
│  ├── state: RwLock<BTreeMap<Namespace, HashMap<id, StoredDocument>>>         │
│  └── journal: Option<Mutex<Journal>>                                         │
│         ├── wal: WAL                // len | bincode | crc32 frames           │
│         ├── storage: StorageLayout  // wal/, meta/checkpoint.bin             │
│         └── _lock: FileLock         // flock on .lock                        │
└──────────────────────────────────────────────────────────────────────────────┘
*/
