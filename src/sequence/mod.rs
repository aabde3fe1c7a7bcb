//! Folio allocation.
//!
//! A folio is `prefix + YYYYMM + zero-padded counter`, e.g. `F-2024080001`
//! for a tenant movement or `P-202408000001` for a personal one. Counters
//! are derived from the greatest existing folio in the same scope and month;
//! nothing is cached between calls.
//!
//! [`SequenceGenerator::next`] alone is a read-then-compute and can hand two
//! callers the same folio. [`SequenceGenerator::issue`] closes that gap: it
//! serializes allocation per scope-bucket inside this process and, for
//! writers in other processes, relies on the store's unique constraint,
//! retrying with a freshly computed folio whenever the write reports
//! [`StoreError::Conflict`].

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use ledgerbot_common::{Ledger, MovementScope, StoreError, YearMonth};
use tracing::{debug, info, warn};

use crate::errors::SequenceError;
use crate::ledger_config::FolioSection;

/// Partition within which folio counters are independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolioScope {
    pub owner: MovementScope,
    pub bucket: YearMonth,
}

impl FolioScope {
    pub fn new(owner: MovementScope, bucket: YearMonth) -> Self {
        Self { owner, bucket }
    }
}

/// Prefixes and padding for the two folio series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolioFormat {
    pub tenant_prefix: String,
    pub personal_prefix: String,
    pub tenant_width: usize,
    pub personal_width: usize,
}

impl Default for FolioFormat {
    fn default() -> Self {
        Self::from(&FolioSection::default())
    }
}

impl From<&FolioSection> for FolioFormat {
    fn from(section: &FolioSection) -> Self {
        Self {
            tenant_prefix: section.tenant_prefix.clone(),
            personal_prefix: section.personal_prefix.clone(),
            tenant_width: section.tenant_width,
            personal_width: section.personal_width,
        }
    }
}

impl FolioFormat {
    pub fn prefix(&self, scope: &FolioScope) -> String {
        let series = match scope.owner {
            MovementScope::Tenant(_) => &self.tenant_prefix,
            MovementScope::Personal(_) => &self.personal_prefix,
        };
        format!("{}{}", series, scope.bucket.compact())
    }

    fn width(&self, scope: &FolioScope) -> usize {
        match scope.owner {
            MovementScope::Tenant(_) => self.tenant_width,
            MovementScope::Personal(_) => self.personal_width,
        }
    }

    pub fn format(&self, scope: &FolioScope, counter: u64) -> String {
        format!(
            "{}{:0width$}",
            self.prefix(scope),
            counter,
            width = self.width(scope)
        )
    }

    /// Counter of `folio`: every character after the fixed prefix length.
    pub fn parse_counter(prefix: &str, folio: &str) -> Result<u64, SequenceError> {
        folio
            .strip_prefix(prefix)
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(|| SequenceError::MalformedFolio {
                folio: folio.to_string(),
            })
    }
}

pub struct SequenceGenerator {
    ledger: Arc<dyn Ledger>,
    format: FolioFormat,
    max_attempts: u32,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl SequenceGenerator {
    pub fn new(ledger: Arc<dyn Ledger>, format: FolioFormat, max_attempts: u32) -> Self {
        Self {
            ledger,
            format,
            max_attempts: max_attempts.max(1),
            locks: DashMap::new(),
        }
    }

    pub fn format(&self) -> &FolioFormat {
        &self.format
    }

    /// Compute the folio that follows the greatest one already stored.
    /// Performs no write and takes no lock.
    pub async fn next(&self, scope: &FolioScope) -> Result<String, SequenceError> {
        let prefix = self.format.prefix(scope);
        let counter = match self
            .ledger
            .find_greatest_folio(&scope.owner, &prefix)
            .await?
        {
            Some(folio) => FolioFormat::parse_counter(&prefix, &folio)?,
            None => 0,
        };
        Ok(self.format.format(scope, counter + 1))
    }

    /// Allocate a folio and hand it to `write`, retrying with a recomputed
    /// folio while `write` reports a conflict.
    pub async fn issue<T, F, Fut>(
        &self,
        scope: &FolioScope,
        mut write: F,
    ) -> Result<(String, T), SequenceError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let prefix = self.format.prefix(scope);
        let lock = self
            .locks
            .entry(format!("{}|{}", scope.owner.key(), prefix))
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        for attempt in 1..=self.max_attempts {
            let folio = self.next(scope).await?;
            debug!(folio = %folio, attempt, "Trying folio");
            match write(folio.clone()).await {
                Ok(value) => {
                    info!(folio = %folio, scope = %scope.owner.key(), "Folio allocated");
                    return Ok((folio, value));
                }
                Err(StoreError::Conflict(detail)) => {
                    warn!(folio = %folio, attempt, %detail, "Folio already taken, recomputing");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(SequenceError::Exhausted {
            prefix,
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use ledgerbot_common::{
        Category, CategoryId, Movement, MovementChange, MovementFilter, MovementId, MovementKind,
        NewMovement, TenantId, UserId,
    };
    use rust_decimal::Decimal;
    use tokio::sync::Barrier;

    use crate::store::DbHandle;

    fn t1_august() -> FolioScope {
        FolioScope::new(
            MovementScope::Tenant(TenantId::new("T1")),
            YearMonth::new(2024, 8).unwrap(),
        )
    }

    fn movement(scope: &FolioScope) -> NewMovement {
        NewMovement {
            kind: MovementKind::Expense,
            scope: scope.owner.clone(),
            amount: Decimal::new(10, 0),
            description: "Coffee".into(),
            category: None,
            photo: None,
            date: NaiveDate::from_ymd_opt(2024, 8, 10).unwrap(),
            created_by: UserId(1),
        }
    }

    #[test]
    fn test_format_pads_per_series() {
        let format = FolioFormat::default();
        let bucket = YearMonth::new(2024, 8).unwrap();
        let tenant = t1_august();
        let personal = FolioScope::new(MovementScope::Personal(UserId(5)), bucket);
        assert_eq!(format.format(&tenant, 1), "F-2024080001");
        assert_eq!(format.format(&personal, 1), "P-202408000001");
        assert_ne!(format.prefix(&tenant), format.prefix(&personal));
    }

    #[test]
    fn test_parse_counter_reads_all_trailing_digits() {
        assert_eq!(FolioFormat::parse_counter("F-202408", "F-2024080042").unwrap(), 42);
        assert_eq!(FolioFormat::parse_counter("F-202408", "F-20240812345").unwrap(), 12345);
        assert!(FolioFormat::parse_counter("F-202408", "F-202408").is_err());
        assert!(FolioFormat::parse_counter("F-202408", "F-20240800a1").is_err());
        assert!(FolioFormat::parse_counter("F-202408", "P-2024080001").is_err());
    }

    #[tokio::test]
    async fn test_first_and_second_folio_in_bucket() {
        let db = Arc::new(DbHandle::in_memory().unwrap());
        let generator = SequenceGenerator::new(db.clone(), FolioFormat::default(), 3);
        let scope = t1_august();

        let first = generator.next(&scope).await.unwrap();
        assert_eq!(first, "F-2024080001");
        db.create_movement(&movement(&scope), &first).await.unwrap();

        let second = generator.next(&scope).await.unwrap();
        assert_eq!(second, "F-2024080002");
    }

    #[tokio::test]
    async fn test_sequential_issues_are_gapless_and_increasing() {
        let db = Arc::new(DbHandle::in_memory().unwrap());
        let generator = SequenceGenerator::new(db.clone(), FolioFormat::default(), 3);
        let scope = t1_august();
        let new = movement(&scope);

        let mut folios = Vec::new();
        for _ in 0..12 {
            let (folio, _) = generator
                .issue(&scope, |folio| {
                    let db = db.clone();
                    let new = new.clone();
                    async move { db.create_movement(&new, &folio).await }
                })
                .await
                .unwrap();
            folios.push(folio);
        }
        let expected: Vec<String> = (1..=12).map(|n| format!("F-202408{:04}", n)).collect();
        assert_eq!(folios, expected);
    }

    #[tokio::test]
    async fn test_counter_restarts_in_new_month() {
        let db = Arc::new(DbHandle::in_memory().unwrap());
        let generator = SequenceGenerator::new(db.clone(), FolioFormat::default(), 3);
        let august = t1_august();
        db.create_movement(&movement(&august), "F-2024080009").await.unwrap();

        let september = FolioScope::new(august.owner.clone(), YearMonth::new(2024, 9).unwrap());
        assert_eq!(generator.next(&september).await.unwrap(), "F-2024090001");
    }

    #[tokio::test]
    async fn test_concurrent_issues_in_one_process_never_collide() {
        let db = Arc::new(DbHandle::in_memory().unwrap());
        let generator = Arc::new(SequenceGenerator::new(db.clone(), FolioFormat::default(), 1));
        let scope = t1_august();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let generator = generator.clone();
            let db = db.clone();
            let scope = scope.clone();
            handles.push(tokio::spawn(async move {
                let new = movement(&scope);
                generator
                    .issue(&scope, |folio| {
                        let db = db.clone();
                        let new = new.clone();
                        async move { db.create_movement(&new, &folio).await }
                    })
                    .await
                    .map(|(folio, _)| folio)
            }));
        }
        let mut folios = Vec::new();
        for handle in handles {
            folios.push(handle.await.unwrap().unwrap());
        }
        folios.sort();
        folios.dedup();
        assert_eq!(folios.len(), 8);
    }

    /// Ledger whose first two folio reads both observe `F-2024080005`
    /// before either caller writes, like two separate processes would.
    struct RacingLedger {
        taken: Mutex<Vec<String>>,
        reads: AtomicU32,
        barrier: Barrier,
        creates: AtomicU32,
    }

    #[async_trait]
    impl Ledger for RacingLedger {
        async fn find_greatest_folio(
            &self,
            _scope: &MovementScope,
            _prefix: &str,
        ) -> Result<Option<String>, StoreError> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst);
            let snapshot = self.taken.lock().unwrap().iter().max().cloned();
            if read < 2 {
                self.barrier.wait().await;
            }
            Ok(snapshot)
        }

        async fn create_movement(
            &self,
            movement: &NewMovement,
            folio: &str,
        ) -> Result<Movement, StoreError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let mut taken = self.taken.lock().unwrap();
            if taken.iter().any(|f| f == folio) {
                return Err(StoreError::Conflict(format!("folio {}", folio)));
            }
            taken.push(folio.to_string());
            Ok(Movement {
                id: MovementId(taken.len() as i64),
                folio: folio.to_string(),
                kind: movement.kind,
                scope: movement.scope.clone(),
                amount: movement.amount,
                description: movement.description.clone(),
                category: movement.category,
                photo: movement.photo.clone(),
                date: movement.date,
                created_by: movement.created_by,
                created_at: String::new(),
            })
        }

        async fn get_movement(&self, _id: MovementId) -> Result<Option<Movement>, StoreError> {
            Ok(None)
        }

        async fn update_movement(
            &self,
            id: MovementId,
            _change: &MovementChange,
        ) -> Result<Movement, StoreError> {
            Err(StoreError::NotFound(format!("movement {}", id.0)))
        }

        async fn list_movements(
            &self,
            _filter: &MovementFilter,
        ) -> Result<Vec<Movement>, StoreError> {
            Ok(Vec::new())
        }

        async fn list_categories(
            &self,
            _scope: &MovementScope,
        ) -> Result<Vec<Category>, StoreError> {
            Ok(Vec::new())
        }

        async fn get_category(&self, _id: CategoryId) -> Result<Option<Category>, StoreError> {
            Ok(None)
        }

        async fn create_category(
            &self,
            _scope: &MovementScope,
            name: &str,
        ) -> Result<Category, StoreError> {
            Err(StoreError::Conflict(name.to_string()))
        }

        async fn rename_category(
            &self,
            id: CategoryId,
            _name: &str,
        ) -> Result<Category, StoreError> {
            Err(StoreError::NotFound(format!("category {}", id)))
        }

        async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
            Err(StoreError::NotFound(format!("category {}", id)))
        }
    }

    #[tokio::test]
    async fn test_cross_process_race_retries_exactly_once() {
        let ledger = Arc::new(RacingLedger {
            taken: Mutex::new(vec!["F-2024080005".to_string()]),
            reads: AtomicU32::new(0),
            barrier: Barrier::new(2),
            creates: AtomicU32::new(0),
        });
        // Two generators share no lock, like two separate processes.
        let a = SequenceGenerator::new(ledger.clone(), FolioFormat::default(), 3);
        let b = SequenceGenerator::new(ledger.clone(), FolioFormat::default(), 3);
        let scope = t1_august();
        let new = movement(&scope);

        let write = |folio: String| {
            let ledger = ledger.clone();
            let new = new.clone();
            async move { ledger.create_movement(&new, &folio).await }
        };
        let (ra, rb) = tokio::join!(a.issue(&scope, write), b.issue(&scope, write));

        let mut folios = vec![ra.unwrap().0, rb.unwrap().0];
        folios.sort();
        assert_eq!(folios, vec!["F-2024080006", "F-2024080007"]);
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.creates.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let ledger = Arc::new(RacingLedger {
            taken: Mutex::new(Vec::new()),
            reads: AtomicU32::new(2),
            barrier: Barrier::new(1),
            creates: AtomicU32::new(0),
        });
        let generator = SequenceGenerator::new(ledger.clone(), FolioFormat::default(), 2);
        let result = generator
            .issue(&t1_august(), |folio| async move {
                Err::<(), _>(StoreError::Conflict(folio))
            })
            .await;
        match result {
            Err(SequenceError::Exhausted { attempts, prefix }) => {
                assert_eq!(attempts, 2);
                assert_eq!(prefix, "F-202408");
            }
            other => panic!("Expected Exhausted, got {:?}", other.map(|(f, _)| f)),
        }
    }

    #[tokio::test]
    async fn test_non_conflict_failure_is_not_retried() {
        let db = Arc::new(DbHandle::in_memory().unwrap());
        let generator = SequenceGenerator::new(db, FolioFormat::default(), 3);
        let attempts = AtomicU32::new(0);
        let result = generator
            .issue(&t1_august(), |_folio| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(StoreError::Backend(anyhow::anyhow!("disk full"))) }
            })
            .await;
        assert!(matches!(result, Err(SequenceError::Store(StoreError::Backend(_)))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
