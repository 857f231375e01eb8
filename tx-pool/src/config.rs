use {
    log::warn,
    ranger_transaction::ValidationConfig,
    std::{path::PathBuf, time::Duration},
};

/// Default maximum number of transactions in the bridge pool.
pub const DEFAULT_GLOBAL_QUEUE: usize = 8192;
/// Lower bound for the journal rotation interval.
pub const MIN_JOURNAL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for [`crate::BridgeTxPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTxPoolConfig {
    /// Chain id of the parent chain the pooled transactions target.
    pub parent_chain_id: u64,
    /// Journal file for crash recovery; `None` disables journaling.
    pub journal: Option<PathBuf>,
    /// Time between journal rotations.
    pub journal_interval: Duration,
    /// Maximum number of pooled transactions across all senders.
    pub global_queue: usize,
}

impl Default for BridgeTxPoolConfig {
    fn default() -> Self {
        Self {
            parent_chain_id: 1,
            journal: Some(PathBuf::from("bridge_transactions.rlp")),
            journal_interval: Duration::from_secs(60 * 60),
            global_queue: DEFAULT_GLOBAL_QUEUE,
        }
    }
}

impl BridgeTxPoolConfig {
    /// Replace unusable values with defaults.
    pub fn sanitize(&self) -> Self {
        let mut conf = self.clone();
        if conf.journal_interval < MIN_JOURNAL_INTERVAL {
            warn!(
                "Sanitizing invalid bridgetxpool journal time: provided {:?}, updated {:?}",
                conf.journal_interval, MIN_JOURNAL_INTERVAL
            );
            conf.journal_interval = MIN_JOURNAL_INTERVAL;
        }
        if conf.global_queue == 0 {
            warn!(
                "Sanitizing invalid bridgetxpool global queue: provided 0, updated {DEFAULT_GLOBAL_QUEUE}"
            );
            conf.global_queue = DEFAULT_GLOBAL_QUEUE;
        }
        conf
    }
}

/// Configuration for [`crate::TxPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPoolConfig {
    pub chain_id: u64,
    pub validation: ValidationConfig,
    /// Maximum number of pooled transactions across all accounts.
    pub global_slots: usize,
    /// Maximum number of pooled transactions per account.
    pub account_slots: usize,
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            validation: ValidationConfig::default(),
            global_slots: 4096,
            account_slots: 64,
        }
    }
}

impl TxPoolConfig {
    /// Small limits and a unit price of one for tests.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            chain_id: 1,
            validation: ValidationConfig {
                unit_price: 1,
                ..ValidationConfig::default()
            },
            global_slots: 16,
            account_slots: 8,
        }
    }
}
