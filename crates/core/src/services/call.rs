//! Waiter call service: intake and the acknowledgement state machine.

use chrono::{Duration, Utc};
use mozo_common::{AppError, AppResult, CallPolicyConfig, IdGenerator};
use mozo_db::{
    entities::{
        dining_table,
        table_silence::{self, SilenceReason},
        waiter_call::{self, CallMetadata, CallStatus, CallUrgency},
    },
    repositories::{DiningTableRepository, IpBlockRepository, WaiterCallRepository},
};
use sea_orm::{Set, prelude::DateTimeWithTimeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use super::dispatch::DispatchService;
use super::profile::Staff;
use super::silence::{SilenceRequest, SilenceService};

/// Maximum stale calls cancelled per sweep.
const STALE_SWEEP_BATCH: u64 = 100;

/// Input for placing a call from a table.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCallInput {
    #[validate(length(min = 1, max = 64))]
    pub table_id: String,
    #[validate(length(max = 500))]
    pub message: Option<String>,
    #[serde(default)]
    pub urgency: Option<CallUrgency>,
}

/// Where a call came from.
#[derive(Debug, Clone, Default)]
pub struct CallOrigin {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Result of call intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallIntake {
    Created(waiter_call::Model),
    /// The caller's address is blocked. Nothing was stored; callers should
    /// answer as if the call was received.
    Blocked,
}

/// A completed call and the automatic silence it started, if any.
#[derive(Debug, Clone)]
pub struct CallCompletion {
    pub call: waiter_call::Model,
    pub silence: Option<table_silence::Model>,
}

/// An unresolved call in a staff queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedCall {
    pub call: waiter_call::Model,
    pub table_number: Option<i32>,
    pub minutes_waiting: i64,
}

/// Waiter call service.
#[derive(Clone)]
pub struct CallService {
    calls: WaiterCallRepository,
    tables: DiningTableRepository,
    ip_blocks: IpBlockRepository,
    silences: SilenceService,
    dispatch: DispatchService,
    policy: CallPolicyConfig,
    id_gen: IdGenerator,
}

impl CallService {
    /// Create a new call service.
    #[must_use]
    pub const fn new(
        calls: WaiterCallRepository,
        tables: DiningTableRepository,
        ip_blocks: IpBlockRepository,
        silences: SilenceService,
        dispatch: DispatchService,
        policy: CallPolicyConfig,
    ) -> Self {
        Self {
            calls,
            tables,
            ip_blocks,
            silences,
            dispatch,
            policy,
            id_gen: IdGenerator::new(),
        }
    }

    /// Place a call from a table.
    pub async fn create_call(
        &self,
        input: CreateCallInput,
        origin: CallOrigin,
    ) -> AppResult<CallIntake> {
        input.validate()?;

        let table = self.tables.get_by_id(&input.table_id).await?;
        let now = Utc::now().fixed_offset();

        if let Some(ip) = origin.client_ip.as_deref() {
            if let Some(block) = self.ip_blocks.find_active(&table.business_id, ip, now).await? {
                tracing::info!(
                    table_id = %table.id,
                    block_id = %block.id,
                    "Dropped call from blocked address"
                );
                return Ok(CallIntake::Blocked);
            }
        }

        if !table.notifications_enabled {
            return Err(AppError::Validation(format!(
                "{} is not accepting calls",
                table.label()
            )));
        }

        if let Some(silence) = self.silences.active_for_table(&table.id).await? {
            return Err(AppError::TableSilenced(describe_silence(&silence, now)));
        }

        let window = self.policy.spam_window_minutes;
        let recent = self
            .calls
            .count_recent_for_table(&table.id, now - Duration::minutes(window))
            .await?;

        if recent >= self.policy.spam_threshold {
            let call_count = i32::try_from(recent + 1).unwrap_or(i32::MAX);
            let notes = format!("auto-silenced after {call_count} calls in {window} minutes");

            match self
                .silences
                .silence(&table, SilenceRequest::automatic(call_count, Some(notes)))
                .await
            {
                Ok(_) | Err(AppError::TableAlreadySilenced(_)) => {}
                Err(e) => tracing::warn!(table_id = %table.id, error = %e, "Failed to auto-silence table"),
            }

            tracing::warn!(table_id = %table.id, recent, "Table exceeded call rate");
            return Err(AppError::RateLimited);
        }

        if let Some(existing) = self.calls.find_unresolved_for_table(&table.id).await? {
            return Err(AppError::AlreadyCalled(existing.id));
        }

        let message = input
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Call from table {}", table.number));

        let metadata = CallMetadata {
            client_ip: origin.client_ip,
            user_agent: origin.user_agent,
            source: Some("qr".to_string()),
        };
        let metadata = serde_json::to_value(metadata)
            .map_err(|e| AppError::Internal(format!("Failed to encode call metadata: {e}")))?;

        let model = waiter_call::ActiveModel {
            id: Set(self.id_gen.generate()),
            table_id: Set(table.id.clone()),
            business_id: Set(table.business_id.clone()),
            waiter_id: Set(None),
            status: Set(CallStatus::Pending),
            urgency: Set(input.urgency.unwrap_or_default()),
            message: Set(message),
            metadata: Set(metadata),
            called_at: Set(now),
            acknowledged_at: Set(None),
            completed_at: Set(None),
            cancelled_at: Set(None),
        };

        let call = self.calls.create(model).await?;

        tracing::info!(call_id = %call.id, table_id = %table.id, "Call received");
        self.dispatch.call_changed(&call, &table).await;

        Ok(CallIntake::Created(call))
    }

    /// Public view of a call, for table clients that poll.
    pub async fn get(&self, call_id: &str) -> AppResult<waiter_call::Model> {
        self.calls.get_by_id(call_id).await
    }

    /// Claim a pending call. The first claim wins.
    pub async fn acknowledge(&self, staff: &Staff, call_id: &str) -> AppResult<waiter_call::Model> {
        let mut call = self.calls.get_by_id(call_id).await?;
        staff.ensure_business(&call.business_id)?;

        match call.status {
            CallStatus::Pending => {}
            CallStatus::Acknowledged => return Err(already_claimed(&call)),
            status => {
                return Err(AppError::Conflict(format!(
                    "Call is already {}",
                    status.as_str()
                )));
            }
        }

        let now = Utc::now().fixed_offset();
        if self.calls.claim(call_id, staff.id(), now).await? == 0 {
            return Err(self.explain_lost_claim(call_id).await);
        }
        mark_acknowledged(&mut call, staff.id(), now);

        tracing::info!(call_id = %call.id, waiter_id = %staff.id(), "Call acknowledged");

        let table = self.tables.get_by_id(&call.table_id).await?;
        self.dispatch.call_changed(&call, &table).await;

        Ok(call)
    }

    /// Complete a call. A pending call is claimed by the completing waiter first.
    pub async fn complete(&self, staff: &Staff, call_id: &str) -> AppResult<CallCompletion> {
        let mut call = self.calls.get_by_id(call_id).await?;
        staff.ensure_business(&call.business_id)?;

        if call.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Call is already {}",
                call.status.as_str()
            )));
        }
        if call.status == CallStatus::Acknowledged && call.waiter_id.as_deref() != Some(staff.id())
        {
            return Err(AppError::Forbidden(
                "Call was acknowledged by another waiter".to_string(),
            ));
        }

        let table = self.tables.get_by_id(&call.table_id).await?;

        if call.status == CallStatus::Pending {
            let now = Utc::now().fixed_offset();
            if self.calls.claim(call_id, staff.id(), now).await? == 0 {
                return Err(self.explain_lost_claim(call_id).await);
            }
            mark_acknowledged(&mut call, staff.id(), now);
            self.dispatch.call_changed(&call, &table).await;
        }

        let now = Utc::now().fixed_offset();
        if self.calls.complete(call_id, staff.id(), now).await? == 0 {
            // Cancelled between claim and completion
            let current = self.calls.get_by_id(call_id).await?;
            return Err(AppError::Conflict(format!(
                "Call is already {}",
                current.status.as_str()
            )));
        }
        call.status = CallStatus::Completed;
        call.completed_at = Some(now);

        tracing::info!(
            call_id = %call.id,
            waiter_id = %staff.id(),
            total_seconds = ?call.total_seconds(),
            "Call completed"
        );

        let silence = if self.policy.auto_silence_on_complete {
            match self
                .silences
                .silence(&table, SilenceRequest::automatic(0, None))
                .await
            {
                Ok(silence) => Some(silence),
                Err(AppError::TableAlreadySilenced(_)) => None,
                Err(e) => {
                    tracing::warn!(table_id = %table.id, error = %e, "Failed to auto-silence table");
                    None
                }
            }
        } else {
            None
        };

        self.dispatch.call_changed(&call, &table).await;

        Ok(CallCompletion { call, silence })
    }

    /// Cancel an unresolved call.
    ///
    /// Admins may cancel any call of their business, waiters a pending call
    /// or one they acknowledged themselves.
    pub async fn cancel(&self, staff: &Staff, call_id: &str) -> AppResult<waiter_call::Model> {
        let call = self.calls.get_by_id(call_id).await?;
        staff.ensure_business(&call.business_id)?;

        if call.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Call is already {}",
                call.status.as_str()
            )));
        }

        let allowed = staff.is_admin()
            || match call.status {
                CallStatus::Pending => staff.is_waiter(),
                CallStatus::Acknowledged => call.waiter_id.as_deref() == Some(staff.id()),
                _ => false,
            };
        if !allowed {
            return Err(AppError::Forbidden(
                "Call was acknowledged by another waiter".to_string(),
            ));
        }

        let table = self.tables.get_by_id(&call.table_id).await?;
        self.cancel_call(call, &table).await
    }

    /// Cancel the unresolved call of a table, if any. Returns how many were cancelled.
    pub async fn cancel_for_table(&self, table: &dining_table::Model) -> AppResult<u64> {
        let Some(call) = self.calls.find_unresolved_for_table(&table.id).await? else {
            return Ok(0);
        };

        match self.cancel_call(call, table).await {
            Ok(_) => Ok(1),
            Err(AppError::Conflict(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Pending and acknowledged calls of the staff member's business, oldest first.
    pub async fn pending_queue(&self, staff: &Staff) -> AppResult<Vec<QueuedCall>> {
        staff.ensure_profile()?;

        let calls = self
            .calls
            .find_unresolved_for_business(staff.business_id())
            .await?;

        let table_ids: Vec<String> = calls.iter().map(|c| c.table_id.clone()).collect();
        let numbers: HashMap<String, i32> = self
            .tables
            .find_by_ids(&table_ids)
            .await?
            .into_iter()
            .map(|t| (t.id, t.number))
            .collect();

        let now = Utc::now().fixed_offset();
        Ok(calls
            .into_iter()
            .map(|call| QueuedCall {
                table_number: numbers.get(&call.table_id).copied(),
                minutes_waiting: (now - call.called_at).num_minutes().max(0),
                call,
            })
            .collect())
    }

    /// Cancel calls left hanging: pending ones nobody picked up in time and
    /// acknowledged ones never completed.
    pub async fn cancel_stale(&self) -> AppResult<u64> {
        let now = Utc::now().fixed_offset();
        let stale = self
            .calls
            .find_stale(
                now - Duration::minutes(self.policy.stale_call_minutes),
                now - Duration::minutes(self.policy.stale_acknowledged_minutes),
                STALE_SWEEP_BATCH,
            )
            .await?;

        let mut tables: HashMap<String, dining_table::Model> = HashMap::new();
        let mut cancelled = 0;

        for call in stale {
            let now = Utc::now().fixed_offset();
            if self.calls.cancel_if_status(&call.id, call.status, now).await? == 0 {
                continue;
            }
            cancelled += 1;

            let table = match tables.get(&call.table_id) {
                Some(table) => table.clone(),
                None => {
                    let table = self.tables.get_by_id(&call.table_id).await?;
                    tables.insert(table.id.clone(), table.clone());
                    table
                }
            };

            let mut call = call;
            mark_cancelled(&mut call, now);
            tracing::info!(call_id = %call.id, table_id = %call.table_id, "Cancelled stale call");
            self.dispatch.call_changed(&call, &table).await;
        }

        Ok(cancelled)
    }

    async fn cancel_call(
        &self,
        mut call: waiter_call::Model,
        table: &dining_table::Model,
    ) -> AppResult<waiter_call::Model> {
        let now = Utc::now().fixed_offset();
        if self.calls.cancel(&call.id, now).await? == 0 {
            let current = self.calls.get_by_id(&call.id).await?;
            return Err(AppError::Conflict(format!(
                "Call is already {}",
                current.status.as_str()
            )));
        }
        mark_cancelled(&mut call, now);

        tracing::info!(call_id = %call.id, table_id = %table.id, "Call cancelled");
        self.dispatch.call_changed(&call, table).await;

        Ok(call)
    }

    /// Work out why a claim updated nothing.
    async fn explain_lost_claim(&self, call_id: &str) -> AppError {
        match self.calls.find_by_id(call_id).await {
            Ok(None) => AppError::CallNotFound(call_id.to_string()),
            Ok(Some(call)) if call.status == CallStatus::Acknowledged => already_claimed(&call),
            Ok(Some(call)) => {
                AppError::Conflict(format!("Call is already {}", call.status.as_str()))
            }
            Err(e) => e,
        }
    }
}

fn already_claimed(call: &waiter_call::Model) -> AppError {
    AppError::CallAlreadyClaimed(format!(
        "call {} was acknowledged by {}",
        call.id,
        call.waiter_id.as_deref().unwrap_or("another waiter")
    ))
}

fn mark_acknowledged(call: &mut waiter_call::Model, waiter_id: &str, at: DateTimeWithTimeZone) {
    call.status = CallStatus::Acknowledged;
    call.waiter_id = Some(waiter_id.to_string());
    call.acknowledged_at = Some(at);
}

fn mark_cancelled(call: &mut waiter_call::Model, at: DateTimeWithTimeZone) {
    call.status = CallStatus::Cancelled;
    call.cancelled_at = Some(at);
}

fn describe_silence(silence: &table_silence::Model, now: DateTimeWithTimeZone) -> String {
    let reason = match silence.reason {
        SilenceReason::Manual => "manual",
        SilenceReason::Automatic => "automatic",
    };

    match silence.remaining_seconds(now) {
        Some(seconds) => format!("{reason} silence, {seconds} seconds remaining"),
        None => format!("{reason} silence until lifted by staff"),
    }
}
