//! Handler configuration.

/// Tunables for the settlement handler.
///
/// The selector knobs bound the fee and the search effort of coin selection;
/// `contract_address` namespaces every cache key this handler writes.
#[derive(Clone, Debug)]
pub struct SettlementParams {
    /// Address of the hosting contract; prepended to every cache key.
    pub contract_address: Vec<u8>,

    /// Fee rate applied to the estimated virtual size, in sat/vbyte.
    pub fee_rate: u64,

    /// Change below this threshold is treated as no change at all.
    pub min_change: u64,

    /// Maximum acceptable `fee / target` ratio for a selection.
    pub max_fee_ratio: f64,

    /// A candidate selection may not sum past `overshoot * target`.
    pub overshoot: f64,

    /// Branch-and-bound node budget before falling back to sorted search.
    pub search_tries: i64,

    /// When `true` (the inherited behavior), a transaction finalizes only
    /// once every policy participant has signed, not merely the required
    /// threshold.
    pub require_full_quorum: bool,
}

impl Default for SettlementParams {
    fn default() -> Self {
        Self {
            contract_address: Vec::new(),
            fee_rate: 2,
            min_change: 2_000,
            max_fee_ratio: 0.05,
            overshoot: 1.25,
            search_tries: 1_000_000,
            require_full_quorum: true,
        }
    }
}
