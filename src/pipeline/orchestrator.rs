//! Report Orchestrator
//!
//! Runs one tenant's report end to end: request validation, the activity
//! gate, KPIs, insights, recommendation, formatting and delivery. Every
//! invocation in delivery mode ends with exactly one history record, whatever
//! happened along the way. Errors, panics and the run deadline are all caught
//! here, so a failing tenant never affects another.

use chrono::NaiveDate;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::clock::{SharedClock, clock_from_config};
use super::stage::{PipelineStage, StageTracker};
use super::timeout::{TimeoutConfig, panic_message, with_timeout};
use crate::ai::create_provider;
use crate::config::{Config, InsightsConfig};
use crate::constants::pipeline as pipeline_constants;
use crate::delivery::{
    ChannelRegistry, DeliveryConfirmation, DigestInput, MessageFormatter, validate_recipient,
};
use crate::insights::{Insight, InsightRanker, Miner, MinerFailure, PeriodData};
use crate::kpi::{KpiCalculator, KpiSnapshot, PeriodAggregate};
use crate::recommendation::{
    GenerationSettings, Recommendation, RecommendationGenerator, RecommendationRequest,
};
use crate::storage::{
    HistoryStore, MetricsReader, NewHistory, ReportConfigStore, SharedDatabase,
    SqliteMetricsReader,
};
use crate::types::{
    Cadence, PulseError, ReportPeriod, ReportStatus, Result, TenantProfile, Transport,
    ValidationError, ValidationErrorKind,
};

// =============================================================================
// Request / Outcome
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Send the digest and record history
    #[default]
    Deliver,
    /// Build the digest only; nothing is sent or recorded
    Preview,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub tenant_id: String,
    pub cadence: Cadence,
    /// Explicit `(start, end)`; overrides `end_date`
    pub period: Option<(NaiveDate, NaiveDate)>,
    /// Last day of the period, today when absent
    pub end_date: Option<NaiveDate>,
    /// Overrides the tenant's configured recipient
    pub recipient: Option<String>,
    /// Overrides the tenant's configured channel
    pub channel: Option<Transport>,
    pub mode: RunMode,
}

impl RunRequest {
    pub fn new(tenant_id: impl Into<String>, cadence: Cadence) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            cadence,
            period: None,
            end_date: None,
            recipient: None,
            channel: None,
            mode: RunMode::Deliver,
        }
    }

    pub fn ending_on(mut self, end: NaiveDate) -> Self {
        self.end_date = Some(end);
        self
    }

    pub fn for_period(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.period = Some((start, end));
        self
    }

    pub fn deliver_to(mut self, channel: Transport, recipient: impl Into<String>) -> Self {
        self.channel = Some(channel);
        self.recipient = Some(recipient.into());
        self
    }

    pub fn preview(mut self) -> Self {
        self.mode = RunMode::Preview;
        self
    }
}

/// Everything one run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub status: ReportStatus,
    pub tenant_id: String,
    pub mode: RunMode,
    pub period: ReportPeriod,
    pub kpis: Option<KpiSnapshot>,
    pub insights: Vec<Insight>,
    pub recommendation: Option<Recommendation>,
    pub formatted_message: Option<String>,
    pub delivery: Option<DeliveryConfirmation>,
    pub miner_failures: Vec<MinerFailure>,
    /// `"[stage] message"` for failed runs
    pub error: Option<String>,
    pub history_id: Option<String>,
    /// Last stage reached; `persisted` only once history is written
    pub stage: PipelineStage,
    pub duration_ms: u64,
}

// =============================================================================
// Run state
// =============================================================================

/// Validated request
#[derive(Debug, Clone)]
struct RunPlan {
    tenant_id: String,
    period: ReportPeriod,
    today: NaiveDate,
    mode: RunMode,
    channel: Option<Transport>,
    recipient: Option<String>,
    has_config: bool,
}

/// Results gathered so far; survives a failed or abandoned run
#[derive(Debug, Default)]
struct RunProgress {
    last_activity: Option<NaiveDate>,
    gate_ms: u64,
    kpis: Option<KpiSnapshot>,
    insights: Option<Vec<Insight>>,
    miner_failures: Vec<MinerFailure>,
    recommendation: Option<Recommendation>,
    formatted_message: Option<String>,
    delivery: Option<DeliveryConfirmation>,
}

struct RunState {
    tracker: StageTracker,
    progress: RunProgress,
}

enum Finish {
    Skipped,
    Completed,
}

// Never held across an await, and nothing panics while it is held.
fn lock(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct ReportOrchestrator {
    reader: Arc<dyn MetricsReader>,
    configs: ReportConfigStore,
    history: HistoryStore,
    calculator: KpiCalculator,
    ranker: InsightRanker,
    generator: RecommendationGenerator,
    formatter: MessageFormatter,
    channels: ChannelRegistry,
    clock: SharedClock,
    timeouts: TimeoutConfig,
    inactivity_threshold_days: u32,
    default_channel: Transport,
}

impl ReportOrchestrator {
    /// Orchestrator with default thresholds and the rule-based recommendation
    pub fn new(
        db: SharedDatabase,
        reader: Arc<dyn MetricsReader>,
        channels: ChannelRegistry,
        clock: SharedClock,
    ) -> Self {
        let timeouts = TimeoutConfig::default();
        Self {
            reader,
            configs: ReportConfigStore::new(Arc::clone(&db)),
            history: HistoryStore::new(db),
            calculator: KpiCalculator::default(),
            ranker: InsightRanker::new(
                Miner::standard_set(&InsightsConfig::default()),
                pipeline_constants::MAX_INSIGHTS,
                timeouts.miner,
            ),
            generator: RecommendationGenerator::offline(),
            formatter: MessageFormatter::new(),
            channels,
            clock,
            timeouts,
            inactivity_threshold_days: pipeline_constants::INACTIVITY_THRESHOLD_DAYS,
            default_channel: Transport::default(),
        }
    }

    /// Wire every component from configuration.
    ///
    /// A provider that cannot be built (missing key, unknown name) is logged
    /// and replaced by the rule-based recommendation.
    pub fn from_config(config: &Config, db: SharedDatabase) -> Result<Self> {
        let provider = if config.llm.enabled {
            match create_provider(&config.llm) {
                Ok(provider) => Some(provider),
                Err(e) => {
                    warn!(error = %e, "Recommendation provider unavailable, using rule-based recommendations");
                    None
                }
            }
        } else {
            None
        };
        let timeouts = TimeoutConfig::from_config(config);

        Ok(Self::new(
            Arc::clone(&db),
            Arc::new(SqliteMetricsReader::new(db)),
            ChannelRegistry::from_config(&config.delivery)?,
            clock_from_config(&config.clock),
        )
        .with_calculator(KpiCalculator::new(config.pipeline.top_products))
        .with_ranker(InsightRanker::new(
            Miner::standard_set(&config.insights),
            config.pipeline.max_insights,
            timeouts.miner,
        ))
        .with_generator(RecommendationGenerator::new(
            provider,
            GenerationSettings::from_config(&config.llm, timeouts.provider),
        ))
        .with_timeouts(timeouts)
        .with_inactivity_threshold(config.pipeline.inactivity_threshold_days)
        .with_default_channel(config.delivery.default_channel))
    }

    pub fn with_calculator(mut self, calculator: KpiCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_ranker(mut self, ranker: InsightRanker) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn with_generator(mut self, generator: RecommendationGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_inactivity_threshold(mut self, days: u32) -> Self {
        self.inactivity_threshold_days = days;
        self
    }

    pub fn with_default_channel(mut self, channel: Transport) -> Self {
        self.default_channel = channel;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn config_store(&self) -> &ReportConfigStore {
        &self.configs
    }

    /// Build the digest without sending it or recording history
    pub async fn preview_report(&self, request: RunRequest) -> RunOutcome {
        self.run_report(request.preview()).await
    }

    #[instrument(
        skip(self, request),
        fields(tenant = %request.tenant_id, cadence = %request.cadence, mode = ?request.mode)
    )]
    pub async fn run_report(&self, request: RunRequest) -> RunOutcome {
        let started = Instant::now();
        let today = self.clock.today();

        let plan = match self.plan(&request, today).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Report request rejected");
                let detail = format!("[{}] {}", e.kind(), e);
                let plan = Self::rejected_plan(&request, today);
                return self
                    .finish(
                        &plan,
                        RunProgress::default(),
                        ReportStatus::Failed,
                        Some(detail),
                        PipelineStage::Failed,
                        elapsed_ms(started),
                    )
                    .await;
            }
        };

        let state = Mutex::new(RunState {
            tracker: StageTracker::new(plan.tenant_id.as_str()),
            progress: RunProgress::default(),
        });

        let guarded = AssertUnwindSafe(self.execute(&plan, &state)).catch_unwind();
        let result = match tokio::time::timeout(self.timeouts.run_deadline, guarded).await {
            Ok(Ok(Ok(finish))) => Ok(finish),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(payload)) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
            Err(_) => Err(PulseError::timeout("report run", self.timeouts.run_deadline).to_string()),
        };

        let (stage, progress) = {
            let mut state = lock(&state);
            (state.tracker.current(), std::mem::take(&mut state.progress))
        };

        match result {
            Ok(Finish::Skipped) => {
                let gate_ms = progress.gate_ms;
                self.finish(&plan, progress, ReportStatus::Skipped, None, stage, gate_ms)
                    .await
            }
            Ok(Finish::Completed) => {
                let mut outcome = self
                    .finish(
                        &plan,
                        progress,
                        ReportStatus::Success,
                        None,
                        stage,
                        elapsed_ms(started),
                    )
                    .await;
                // Deliver runs count as persisted only once their history row exists
                if plan.mode == RunMode::Preview || outcome.history_id.is_some() {
                    let mut state = lock(&state);
                    state.tracker.advance(PipelineStage::Persisted);
                    outcome.stage = state.tracker.current();
                }
                outcome
            }
            Err(message) => {
                let detail = format!("[{}] {}", stage.work_label(), message);
                error!(stage = %stage, error = %message, "Report run failed");
                lock(&state).tracker.advance(PipelineStage::Failed);
                self.finish(
                    &plan,
                    progress,
                    ReportStatus::Failed,
                    Some(detail),
                    PipelineStage::Failed,
                    elapsed_ms(started),
                )
                .await
            }
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    async fn plan(&self, request: &RunRequest, today: NaiveDate) -> Result<RunPlan> {
        let tenant_id = request.tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(ValidationError::missing("tenant_id").into());
        }

        let period = match request.period {
            Some((start, end)) => ReportPeriod::explicit(request.cadence, start, end)?,
            None => ReportPeriod::for_cadence(request.cadence, request.end_date.unwrap_or(today)),
        };

        let config = with_timeout(
            self.timeouts.data,
            self.configs.get(tenant_id),
            "report configuration",
        )
        .await?;
        let channel = request
            .channel
            .or(config.as_ref().map(|c| c.channel))
            .unwrap_or(self.default_channel);
        let recipient = request.recipient.clone().or_else(|| {
            config
                .as_ref()
                .filter(|c| c.channel == channel)
                .and_then(|c| c.recipient.clone())
        });
        let recipient = recipient
            .map(|r| validate_recipient(channel, &r))
            .transpose()?;

        if request.mode == RunMode::Deliver {
            if recipient.is_none() {
                return Err(ValidationError::missing("recipient").into());
            }
            if !self.channels.is_configured(channel) {
                return Err(ValidationError::new(
                    ValidationErrorKind::Unsupported,
                    format!("channel '{}' is not configured", channel),
                )
                .with_field("channel")
                .into());
            }
        }

        Ok(RunPlan {
            tenant_id: tenant_id.to_string(),
            period,
            today,
            mode: request.mode,
            channel: Some(channel),
            recipient,
            has_config: config.is_some(),
        })
    }

    /// Best-effort plan for a request that failed validation
    fn rejected_plan(request: &RunRequest, today: NaiveDate) -> RunPlan {
        let period = match request.period {
            Some((start, end)) => ReportPeriod {
                cadence: request.cadence,
                start,
                end,
            },
            None => ReportPeriod::for_cadence(request.cadence, request.end_date.unwrap_or(today)),
        };
        RunPlan {
            tenant_id: request.tenant_id.trim().to_string(),
            period,
            today,
            mode: request.mode,
            channel: request.channel,
            recipient: request.recipient.clone(),
            has_config: false,
        }
    }

    // =========================================================================
    // Stages
    // =========================================================================

    fn is_active(&self, last_activity: Option<NaiveDate>, today: NaiveDate) -> bool {
        last_activity.is_some_and(|last| {
            (today - last).num_days() <= i64::from(self.inactivity_threshold_days)
        })
    }

    async fn execute(&self, plan: &RunPlan, state: &Mutex<RunState>) -> Result<Finish> {
        let tenant_id = plan.tenant_id.as_str();
        let today = plan.today;

        let gate_started = Instant::now();
        let last_activity = with_timeout(
            self.timeouts.data,
            self.reader.last_activity_date(tenant_id, today),
            "activity check",
        )
        .await?;
        {
            let mut state = lock(state);
            state.progress.last_activity = last_activity;
            state.progress.gate_ms = elapsed_ms(gate_started);
            state.tracker.advance(PipelineStage::ActivityChecked);
        }

        if !self.is_active(last_activity, today) {
            info!(
                tenant = %tenant_id,
                last_activity = ?last_activity,
                threshold_days = self.inactivity_threshold_days,
                "Tenant inactive, skipping report"
            );
            lock(state).tracker.advance(PipelineStage::Skipped);
            return Ok(Finish::Skipped);
        }

        lock(state).tracker.advance(PipelineStage::ComputingKpis);
        let (profile, current, kpis) = self.compute_kpis(tenant_id, &plan.period).await?;
        lock(state).progress.kpis = Some(kpis.clone());

        lock(state).tracker.advance(PipelineStage::MiningInsights);
        let data = PeriodData {
            period: plan.period,
            as_of: today,
            order_times: &current.order_times,
            source: self.reader.as_ref(),
        };
        let ranked = self.ranker.run(tenant_id, &data, &kpis).await;
        debug!(
            tenant = %tenant_id,
            insights = ranked.insights.len(),
            degraded = ranked.is_degraded(),
            "Insights ranked"
        );
        {
            let mut state = lock(state);
            state.progress.insights = Some(ranked.insights.clone());
            state.progress.miner_failures = ranked.failures.clone();
            state.tracker.advance(PipelineStage::GeneratingRecommendation);
        }

        let recommendation = self
            .generator
            .generate(&RecommendationRequest {
                tenant_name: &profile.name,
                period: &plan.period,
                currency: &profile.currency_code,
                kpis: &kpis,
                insights: &ranked.insights,
            })
            .await;
        {
            let mut state = lock(state);
            state.progress.recommendation = Some(recommendation.clone());
            state.tracker.advance(PipelineStage::Formatting);
        }

        let message = self.formatter.format(&DigestInput {
            tenant_name: &profile.name,
            currency: &profile.currency_code,
            period: &plan.period,
            kpis: &kpis,
            insights: &ranked.insights,
            recommendation: &recommendation.text,
        });
        lock(state).progress.formatted_message = Some(message.clone());

        if plan.mode == RunMode::Deliver {
            lock(state).tracker.advance(PipelineStage::Delivering);
            let transport = plan.channel.unwrap_or(self.default_channel);
            let channel = self.channels.get(transport).ok_or_else(|| {
                PulseError::validation(
                    ValidationErrorKind::Unsupported,
                    format!("channel '{}' is not configured", transport),
                )
            })?;
            let recipient = plan
                .recipient
                .as_deref()
                .ok_or_else(|| ValidationError::missing("recipient"))?;

            let confirmation = with_timeout(
                self.timeouts.delivery,
                channel.send(recipient, &message),
                "delivery",
            )
            .await?;
            lock(state).progress.delivery = Some(confirmation);
        }

        Ok(Finish::Completed)
    }

    /// Profile plus current, previous and last-year aggregates, read together
    async fn compute_kpis(
        &self,
        tenant_id: &str,
        period: &ReportPeriod,
    ) -> Result<(TenantProfile, PeriodAggregate, KpiSnapshot)> {
        let data_timeout = self.timeouts.data;
        let reader = self.reader.as_ref();
        let previous = period.previous();
        let last_year = period.last_year();

        let last_year_read = async {
            match with_timeout(
                data_timeout,
                reader.read_period(tenant_id, last_year.start, last_year.end),
                "last-year metrics",
            )
            .await
            {
                Ok(aggregate) => Ok::<_, PulseError>(Some(aggregate)),
                Err(e) => {
                    debug!(tenant = %tenant_id, error = %e, "Last-year comparison unavailable");
                    Ok(None)
                }
            }
        };

        let (profile, current, previous, last_year) = tokio::try_join!(
            with_timeout(data_timeout, reader.tenant_profile(tenant_id), "tenant profile"),
            with_timeout(
                data_timeout,
                reader.read_period(tenant_id, period.start, period.end),
                "current period metrics",
            ),
            with_timeout(
                data_timeout,
                reader.read_period(tenant_id, previous.start, previous.end),
                "previous period metrics",
            ),
            last_year_read,
        )?;

        let profile = profile.ok_or_else(|| {
            ValidationError::new(
                ValidationErrorKind::UnknownTenant,
                format!("unknown tenant '{}'", tenant_id),
            )
            .with_field("tenant_id")
        })?;

        let last_year = last_year
            .filter(|aggregate| aggregate.order_count > 0)
            .map(|aggregate| self.calculator.summarize(&aggregate));
        let kpis = self
            .calculator
            .compute(&current, &previous)
            .with_last_year(last_year);

        Ok((profile, current, kpis))
    }

    // =========================================================================
    // Terminal bookkeeping
    // =========================================================================

    async fn finish(
        &self,
        plan: &RunPlan,
        progress: RunProgress,
        status: ReportStatus,
        error: Option<String>,
        stage: PipelineStage,
        duration_ms: u64,
    ) -> RunOutcome {
        let mut history_id = None;

        if plan.mode == RunMode::Deliver {
            let record = NewHistory {
                tenant_id: plan.tenant_id.clone(),
                cadence: plan.period.cadence,
                period_start: plan.period.start,
                period_end: plan.period.end,
                kpis: progress
                    .kpis
                    .as_ref()
                    .and_then(|kpis| serde_json::to_value(kpis).ok()),
                insights: progress
                    .insights
                    .as_ref()
                    .and_then(|insights| serde_json::to_value(insights).ok()),
                recommendation: progress.recommendation.as_ref().map(|r| r.text.clone()),
                status,
                error_detail: error.clone(),
                channel: plan.channel,
                recipient: plan.recipient.clone(),
                execution_ms: duration_ms,
            };
            match self.history.append(record).await {
                Ok(id) => history_id = Some(id),
                Err(e) => {
                    error!(tenant = %plan.tenant_id, error = %e, "Failed to record report history")
                }
            }

            if status == ReportStatus::Success && plan.has_config {
                let last_activity = progress.last_activity.unwrap_or(plan.today);
                let next_report = plan.period.cadence.next_run_after(plan.today);
                if let Err(e) = self
                    .configs
                    .record_success(&plan.tenant_id, last_activity, next_report)
                    .await
                {
                    warn!(tenant = %plan.tenant_id, error = %e, "Failed to update report schedule");
                }
            }
        }

        info!(
            tenant = %plan.tenant_id,
            status = %status,
            duration_ms,
            "Report run finished"
        );

        RunOutcome {
            status,
            tenant_id: plan.tenant_id.clone(),
            mode: plan.mode,
            period: plan.period,
            kpis: progress.kpis,
            insights: progress.insights.unwrap_or_default(),
            recommendation: progress.recommendation,
            formatted_message: progress.formatted_message,
            delivery: progress.delivery,
            miner_failures: progress.miner_failures,
            error,
            history_id,
            stage,
            duration_ms,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
