//! Spend tracking: prices, ledger storage, limits and usage reporting.

pub mod ledger;
pub mod pricing;
pub mod store;
pub mod usage;

pub use ledger::{BudgetLedger, BudgetLimits, BudgetSnapshot, BudgetStatus};
pub use pricing::{ModelPrice, PriceTable};
pub use store::{
    InMemoryLedgerStore, JsonFileLedgerStore, LedgerEntry, LedgerError, LedgerKey, LedgerStore,
};
pub use usage::{MemoryUsageSink, NoopUsageSink, TracingUsageSink, UsageRecord, UsageSink};
