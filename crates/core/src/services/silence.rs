//! Table silence service.

use chrono::{DateTime, Duration, Utc};
use mozo_common::{AppError, AppResult, IdGenerator};
use mozo_db::{
    entities::{
        dining_table,
        table_silence::{self, SilenceReason},
    },
    repositories::{DiningTableRepository, TableSilenceRepository},
};
use sea_orm::{Set, prelude::DateTimeWithTimeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use super::dispatch::DispatchService;
use super::event_publisher::SilenceEvent;
use super::profile::Staff;

/// Longest manual silence that can be requested.
pub const MAX_SILENCE_MINUTES: i64 = 120;
/// Most tables a bulk request may touch.
pub const MAX_BULK_TABLES: usize = 50;

/// Input for a manual silence.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SilenceInput {
    /// Lapse after this many minutes; open-ended when absent.
    #[validate(range(min = 1, max = 120))]
    pub duration_minutes: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// A silence to create.
#[derive(Debug, Clone)]
pub struct SilenceRequest {
    pub reason: SilenceReason,
    pub duration_minutes: Option<i64>,
    pub silenced_by: Option<String>,
    pub call_count: i32,
    pub notes: Option<String>,
}

impl SilenceRequest {
    #[must_use]
    pub fn manual(silenced_by: &str, input: SilenceInput) -> Self {
        Self {
            reason: SilenceReason::Manual,
            duration_minutes: input.duration_minutes,
            silenced_by: Some(silenced_by.to_string()),
            call_count: 0,
            notes: input.notes,
        }
    }

    /// Automatic silences always last ten minutes.
    #[must_use]
    pub const fn automatic(call_count: i32, notes: Option<String>) -> Self {
        Self {
            reason: SilenceReason::Automatic,
            duration_minutes: None,
            silenced_by: None,
            call_count,
            notes,
        }
    }
}

/// A silence as shown to staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SilenceView {
    pub id: String,
    pub table_id: String,
    pub table_number: Option<i32>,
    pub reason: SilenceReason,
    pub silenced_by: Option<String>,
    pub silenced_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// `None` for open-ended silences.
    pub remaining_seconds: Option<i64>,
    pub call_count: i32,
    pub notes: Option<String>,
}

impl SilenceView {
    #[must_use]
    pub fn new(
        silence: &table_silence::Model,
        table_number: Option<i32>,
        now: DateTimeWithTimeZone,
    ) -> Self {
        Self {
            id: silence.id.clone(),
            table_id: silence.table_id.clone(),
            table_number,
            reason: silence.reason,
            silenced_by: silence.silenced_by.clone(),
            silenced_at: silence.silenced_at.with_timezone(&Utc),
            expires_at: silence.expires_at().map(|at| at.with_timezone(&Utc)),
            remaining_seconds: silence.remaining_seconds(now),
            call_count: silence.call_count,
            notes: silence.notes.clone(),
        }
    }
}

/// Result for one table of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItemResult {
    pub table_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a bulk silence or unsilence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkSilenceReport {
    pub results: Vec<BulkItemResult>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BulkSilenceReport {
    fn record<T>(&mut self, table_id: &str, result: AppResult<T>) {
        let error = match result {
            Ok(_) => {
                self.succeeded += 1;
                None
            }
            Err(e) => {
                self.failed += 1;
                Some(e.error_code().to_string())
            }
        };
        self.results.push(BulkItemResult {
            table_id: table_id.to_string(),
            success: error.is_none(),
            error,
        });
    }
}

/// Table silence service.
#[derive(Clone)]
pub struct SilenceService {
    silences: TableSilenceRepository,
    tables: DiningTableRepository,
    dispatch: DispatchService,
    id_gen: IdGenerator,
}

impl SilenceService {
    /// Create a new silence service.
    #[must_use]
    pub const fn new(
        silences: TableSilenceRepository,
        tables: DiningTableRepository,
        dispatch: DispatchService,
    ) -> Self {
        Self {
            silences,
            tables,
            dispatch,
            id_gen: IdGenerator::new(),
        }
    }

    /// The silence currently suppressing calls for a table.
    ///
    /// An open row that has lapsed is closed on the way.
    pub async fn active_for_table(
        &self,
        table_id: &str,
    ) -> AppResult<Option<table_silence::Model>> {
        let now = Utc::now().fixed_offset();

        let Some(silence) = self.silences.find_open_for_table(table_id).await? else {
            return Ok(None);
        };

        if silence.is_active_at(now) {
            return Ok(Some(silence));
        }

        if silence.expires_at().is_some_and(|at| at <= now)
            && self.silences.close(&silence.id, None, now).await? == 1
        {
            self.dispatch
                .silence_changed(SilenceEvent::lifted(&silence))
                .await;
        }

        Ok(None)
    }

    /// Whether calls from a table are currently suppressed.
    pub async fn is_active(&self, table_id: &str) -> AppResult<bool> {
        Ok(self.active_for_table(table_id).await?.is_some())
    }

    /// Silence a table.
    ///
    /// Lapsed rows for the table are closed first. Only one open silence may
    /// exist per table; a second one is rejected with
    /// [`AppError::TableAlreadySilenced`].
    pub async fn silence(
        &self,
        table: &dining_table::Model,
        request: SilenceRequest,
    ) -> AppResult<table_silence::Model> {
        if let Some(minutes) = request.duration_minutes {
            if !(1..=MAX_SILENCE_MINUTES).contains(&minutes) {
                return Err(AppError::Validation(format!(
                    "duration_minutes must be between 1 and {MAX_SILENCE_MINUTES}"
                )));
            }
        }

        let now = Utc::now().fixed_offset();
        self.silences.close_lapsed(now, Some(&table.id)).await?;

        if self.silences.find_open_for_table(&table.id).await?.is_some() {
            return Err(AppError::TableAlreadySilenced(table.label()));
        }

        let ends_at = match request.reason {
            SilenceReason::Manual => request.duration_minutes.map(|m| now + Duration::minutes(m)),
            SilenceReason::Automatic => None,
        };

        let model = table_silence::ActiveModel {
            id: Set(self.id_gen.generate()),
            table_id: Set(table.id.clone()),
            business_id: Set(table.business_id.clone()),
            silenced_by: Set(request.silenced_by),
            reason: Set(request.reason),
            silenced_at: Set(now),
            ends_at: Set(ends_at),
            unsilenced_at: Set(None),
            unsilenced_by: Set(None),
            call_count: Set(request.call_count),
            notes: Set(request.notes),
        };

        let silence = match self.silences.create(model).await {
            Err(AppError::TableAlreadySilenced(_)) => {
                return Err(AppError::TableAlreadySilenced(table.label()));
            }
            result => result?,
        };

        tracing::info!(
            table_id = %table.id,
            reason = ?silence.reason,
            ends_at = ?silence.expires_at(),
            "Table silenced"
        );

        self.dispatch
            .silence_changed(SilenceEvent::started(&silence))
            .await;

        Ok(silence)
    }

    /// Lift the active silence of a table.
    pub async fn unsilence(
        &self,
        table: &dining_table::Model,
        unsilenced_by: Option<&str>,
    ) -> AppResult<table_silence::Model> {
        let silence = self
            .active_for_table(&table.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} is not silenced", table.label())))?;

        let now = Utc::now().fixed_offset();
        if self.silences.close(&silence.id, unsilenced_by, now).await? == 0 {
            // Lifted concurrently
            return Err(AppError::NotFound(format!(
                "{} is not silenced",
                table.label()
            )));
        }

        tracing::info!(table_id = %table.id, "Table unsilenced");

        self.dispatch
            .silence_changed(SilenceEvent::lifted(&silence))
            .await;

        let mut lifted = silence;
        lifted.unsilenced_at = Some(now);
        lifted.unsilenced_by = unsilenced_by.map(ToString::to_string);
        Ok(lifted)
    }

    /// Manually silence a table of the staff member's business.
    pub async fn silence_by_staff(
        &self,
        staff: &Staff,
        table_id: &str,
        input: SilenceInput,
    ) -> AppResult<table_silence::Model> {
        input.validate()?;
        let table = self.staff_table(staff, table_id).await?;
        self.silence(&table, SilenceRequest::manual(staff.id(), input))
            .await
    }

    /// Lift a silence on a table of the staff member's business.
    pub async fn unsilence_by_staff(
        &self,
        staff: &Staff,
        table_id: &str,
    ) -> AppResult<table_silence::Model> {
        let table = self.staff_table(staff, table_id).await?;
        self.unsilence(&table, Some(staff.id())).await
    }

    /// Silence several tables with the same settings.
    pub async fn silence_many(
        &self,
        staff: &Staff,
        table_ids: &[String],
        input: SilenceInput,
    ) -> AppResult<BulkSilenceReport> {
        validate_bulk(table_ids)?;
        input.validate()?;

        let mut report = BulkSilenceReport::default();
        for table_id in table_ids {
            let result = match self.staff_table(staff, table_id).await {
                Ok(table) => {
                    self.silence(&table, SilenceRequest::manual(staff.id(), input.clone()))
                        .await
                }
                Err(e) => Err(e),
            };
            report.record(table_id, result);
        }

        Ok(report)
    }

    /// Lift silences on several tables.
    pub async fn unsilence_many(
        &self,
        staff: &Staff,
        table_ids: &[String],
    ) -> AppResult<BulkSilenceReport> {
        validate_bulk(table_ids)?;

        let mut report = BulkSilenceReport::default();
        for table_id in table_ids {
            let result = self.unsilence_by_staff(staff, table_id).await;
            report.record(table_id, result);
        }

        Ok(report)
    }

    /// Active silences of the staff member's business.
    pub async fn list_active(&self, staff: &Staff) -> AppResult<Vec<SilenceView>> {
        staff.ensure_profile()?;
        let now = Utc::now().fixed_offset();

        let silences: Vec<_> = self
            .silences
            .find_open_for_business(staff.business_id())
            .await?
            .into_iter()
            .filter(|s| s.is_active_at(now))
            .collect();

        let table_ids: Vec<String> = silences.iter().map(|s| s.table_id.clone()).collect();
        let numbers: HashMap<String, i32> = self
            .tables
            .find_by_ids(&table_ids)
            .await?
            .into_iter()
            .map(|t| (t.id, t.number))
            .collect();

        Ok(silences
            .iter()
            .map(|s| SilenceView::new(s, numbers.get(&s.table_id).copied(), now))
            .collect())
    }

    /// Close every lapsed silence. Returns how many were closed.
    pub async fn sweep_lapsed(&self) -> AppResult<u64> {
        self.silences
            .close_lapsed(Utc::now().fixed_offset(), None)
            .await
    }

    async fn staff_table(&self, staff: &Staff, table_id: &str) -> AppResult<dining_table::Model> {
        let table = self.tables.get_by_id(table_id).await?;
        staff.ensure_business(&table.business_id)?;
        Ok(table)
    }
}

fn validate_bulk(table_ids: &[String]) -> AppResult<()> {
    if table_ids.is_empty() || table_ids.len() > MAX_BULK_TABLES {
        return Err(AppError::Validation(format!(
            "table_ids must contain between 1 and {MAX_BULK_TABLES} tables"
        )));
    }
    Ok(())
}
