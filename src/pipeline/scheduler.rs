//! Cadence batch driver
//!
//! Lists the tenants due for a cadence and runs one report per tenant on a
//! bounded pool of tokio tasks. Tenants share nothing, so a task that panics
//! or is cancelled only costs its own report.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

use super::orchestrator::{ReportOrchestrator, RunOutcome, RunRequest};
use crate::types::{Cadence, ReportStatus, Result};

/// Result of one cadence batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub cadence: Cadence,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<RunOutcome>,
}

impl BatchSummary {
    fn new(cadence: Cadence, total: usize) -> Self {
        Self {
            cadence,
            total,
            success: 0,
            failed: 0,
            skipped: 0,
            outcomes: Vec::with_capacity(total),
        }
    }

    fn record(&mut self, outcome: RunOutcome) {
        match outcome.status {
            ReportStatus::Success => self.success += 1,
            ReportStatus::Failed => self.failed += 1,
            ReportStatus::Skipped => self.skipped += 1,
        }
        self.outcomes.push(outcome);
    }
}

pub struct ReportScheduler {
    orchestrator: Arc<ReportOrchestrator>,
    workers: usize,
}

impl ReportScheduler {
    pub fn new(orchestrator: Arc<ReportOrchestrator>, workers: usize) -> Self {
        Self {
            orchestrator,
            workers: workers.max(1),
        }
    }

    /// Run every enabled tenant whose next report date has come
    pub async fn run_cadence(&self, cadence: Cadence) -> Result<BatchSummary> {
        let today = self.orchestrator.today();
        let due = self
            .orchestrator
            .config_store()
            .list_due(cadence, today)
            .await?;

        info!(
            cadence = %cadence,
            tenants = due.len(),
            workers = self.workers,
            "Starting report batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(due.len());
        for config in due {
            let semaphore = Arc::clone(&semaphore);
            let orchestrator = Arc::clone(&self.orchestrator);
            let tenant_id = config.tenant_id.clone();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                orchestrator
                    .run_report(RunRequest::new(config.tenant_id, cadence).ending_on(today))
                    .await
            });
            handles.push((tenant_id, handle));
        }

        let mut summary = BatchSummary::new(cadence, handles.len());
        for (tenant_id, handle) in handles {
            match handle.await {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(tenant = %tenant_id, error = %e, "Report task aborted");
                    summary.failed += 1;
                }
            }
        }

        info!(
            cadence = %cadence,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            "Report batch finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orchestrator::test_support::*;
    use crate::storage::fixtures::{self, date, memory_db};
    use crate::storage::{ConfigUpdate, HistoryStore};
    use crate::types::Transport;

    async fn enroll(orchestrator: &ReportOrchestrator, tenant_id: &str, recipient: &str) {
        orchestrator
            .config_store()
            .upsert(ConfigUpdate {
                tenant_id: tenant_id.to_string(),
                cadence: Cadence::Weekly,
                channel: Transport::Telegram,
                recipient: Some(recipient.to_string()),
                enabled: true,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_isolates_failing_tenant() {
        let db = memory_db();
        bakery(&db, "t1", "Boulangerie du Coin");
        bakery(&db, "t2", "Pâtisserie Centrale");
        fixtures::tenant(&db, "t3", "Dormant Shop");
        fixtures::order(&db, "t3", "t3-o1", None, "100", "2025-11-01 10:00:00", &[]);

        let mut reader = FaultyReader::new(Arc::clone(&db), "t2");
        reader.fail_period = true;
        let channel = MockChannel::new(Transport::Telegram);
        let orchestrator = Arc::new(orchestrator(&db, Arc::new(reader), Arc::clone(&channel)));
        enroll(&orchestrator, "t1", "111111").await;
        enroll(&orchestrator, "t2", "222222").await;
        enroll(&orchestrator, "t3", "333333").await;

        let summary = ReportScheduler::new(Arc::clone(&orchestrator), 2)
            .run_cadence(Cadence::Weekly)
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(channel.calls(), 1);

        let history = HistoryStore::new(Arc::clone(&db)).list(None, 10).await.unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_successful_tenant_is_not_due_again() {
        let db = memory_db();
        bakery(&db, "t1", "Boulangerie du Coin");
        let channel = MockChannel::new(Transport::Telegram);
        let orchestrator = Arc::new(orchestrator(
            &db,
            Arc::new(FaultyReader::new(Arc::clone(&db), "none")),
            channel,
        ));
        enroll(&orchestrator, "t1", "111111").await;
        let scheduler = ReportScheduler::new(Arc::clone(&orchestrator), 4);

        let first = scheduler.run_cadence(Cadence::Weekly).await.unwrap();
        assert_eq!(first.success, 1);

        // next_report_date moved to the following Monday
        let second = scheduler.run_cadence(Cadence::Weekly).await.unwrap();
        assert_eq!(second.total, 0);

        let config = orchestrator.config_store().get("t1").await.unwrap().unwrap();
        assert_eq!(config.next_report_date, Some(date(2026, 1, 26)));
    }

    #[tokio::test]
    async fn test_disabled_and_other_cadence_are_ignored() {
        let db = memory_db();
        bakery(&db, "t1", "Boulangerie du Coin");
        bakery(&db, "t2", "Pâtisserie Centrale");
        let channel = MockChannel::new(Transport::Telegram);
        let orchestrator = Arc::new(orchestrator(
            &db,
            Arc::new(FaultyReader::new(Arc::clone(&db), "none")),
            Arc::clone(&channel),
        ));
        enroll(&orchestrator, "t1", "111111").await;
        enroll(&orchestrator, "t2", "222222").await;
        orchestrator.config_store().set_enabled("t2", false).await.unwrap();

        let monthly = ReportScheduler::new(Arc::clone(&orchestrator), 1)
            .run_cadence(Cadence::Monthly)
            .await
            .unwrap();
        assert_eq!(monthly.total, 0);

        let weekly = ReportScheduler::new(Arc::clone(&orchestrator), 1)
            .run_cadence(Cadence::Weekly)
            .await
            .unwrap();
        assert_eq!(weekly.total, 1);
        assert_eq!(weekly.outcomes[0].tenant_id, "t1");
        assert_eq!(channel.calls(), 1);
    }
}
