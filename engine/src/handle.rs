//! Shared, lock-guarded access to one fund.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::accounting::AccountingEngine;

/// Cloneable handle to a single [`AccountingEngine`].
///
/// Writers hold the lock for the whole operation, so readers only ever see
/// settled state.
#[derive(Debug, Clone)]
pub struct FundHandle {
    inner: Arc<RwLock<AccountingEngine>>,
}

impl FundHandle {
    pub fn new(engine: AccountingEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    /// Runs a query under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&AccountingEngine) -> R) -> R {
        let guard = self.inner.read();
        f(&guard)
    }

    /// Runs a mutating operation to completion under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut AccountingEngine) -> R) -> R {
        let mut guard = self.inner.write();
        f(&mut guard)
    }

    pub fn fund_id(&self) -> String {
        self.read(|e| e.fund_id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::thread;
    use vaultline_core::{Decimal, FeeRates, FundConfig};

    #[test]
    fn concurrent_writers_serialize() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let config = FundConfig::new("Shared", "USDC", FeeRates::default(), Decimal::ONE, 3_600);
        let handle = FundHandle::new(AccountingEngine::new("fund-shared", config, now).unwrap());

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let handle = handle.clone();
                thread::spawn(move || {
                    let investor = format!("investor-{i}");
                    for _ in 0..10 {
                        handle
                            .write(|e| e.submit_deposit(&investor, Decimal::from_int(5), Decimal::ZERO, now))
                            .unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let ids: Vec<u64> = handle.read(|e| {
            e.queue_entries(crate::RequestKind::Deposit)
                .iter()
                .map(|entry| entry.id)
                .collect()
        });
        assert_eq!(ids.len(), 80);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        handle.write(|e| e.process_deposit_queue(100, now)).unwrap();
        let total = handle.read(|e| e.state().total_shares);
        assert_eq!(total, Decimal::from_int(400));
        assert_eq!(handle.fund_id(), "fund-shared");
    }
}
