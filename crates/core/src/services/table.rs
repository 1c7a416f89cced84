//! Table service: waiter assignment and table settings.

use chrono::Utc;
use mozo_common::{AppError, AppResult};
use mozo_db::{
    entities::{dining_table, waiter_call},
    repositories::{DiningTableRepository, TableSilenceRepository, WaiterCallRepository},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::call::CallService;
use super::profile::Staff;
use super::silence::SilenceView;

/// Body of the activate and deactivate endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TableRef {
    pub table_id: String,
}

/// Body of the notifications toggle.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsInput {
    pub table_id: String,
    pub enabled: bool,
}

/// A table as shown on the staff floor plan.
#[derive(Debug, Clone, Serialize)]
pub struct TableOverview {
    #[serde(flatten)]
    pub table: dining_table::Model,
    pub silence: Option<SilenceView>,
    pub call: Option<waiter_call::Model>,
}

/// Result of releasing a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Deactivation {
    pub cancelled_calls: u64,
}

#[derive(Clone)]
pub struct TableService {
    tables: DiningTableRepository,
    silences: TableSilenceRepository,
    calls: WaiterCallRepository,
    call_service: CallService,
}

impl TableService {
    #[must_use]
    pub const fn new(
        tables: DiningTableRepository,
        silences: TableSilenceRepository,
        calls: WaiterCallRepository,
        call_service: CallService,
    ) -> Self {
        Self {
            tables,
            silences,
            calls,
            call_service,
        }
    }

    /// Every table of the staff member's business with its live state.
    pub async fn overview(&self, staff: &Staff) -> AppResult<Vec<TableOverview>> {
        staff.ensure_profile()?;
        let business_id = staff.business_id();
        let now = Utc::now().fixed_offset();

        let mut silences: HashMap<String, _> = self
            .silences
            .find_open_for_business(business_id)
            .await?
            .into_iter()
            .filter(|s| s.is_active_at(now))
            .map(|s| (s.table_id.clone(), s))
            .collect();

        let mut calls: HashMap<String, _> = self
            .calls
            .find_unresolved_for_business(business_id)
            .await?
            .into_iter()
            .map(|c| (c.table_id.clone(), c))
            .collect();

        Ok(self
            .tables
            .find_by_business(business_id)
            .await?
            .into_iter()
            .map(|table| TableOverview {
                silence: silences
                    .remove(&table.id)
                    .map(|s| SilenceView::new(&s, Some(table.number), now)),
                call: calls.remove(&table.id),
                table,
            })
            .collect())
    }

    /// Assign the calling waiter to a table.
    pub async fn activate(&self, staff: &Staff, table_id: &str) -> AppResult<dining_table::Model> {
        staff.ensure_waiter()?;
        let mut table = self.staff_table(staff, table_id).await?;

        if self.tables.assign_waiter(&table.id, staff.id()).await? == 0 {
            return Err(AppError::Conflict(format!(
                "{} is assigned to another waiter",
                table.label()
            )));
        }

        let now = Utc::now().fixed_offset();
        if table.active_waiter_id.as_deref() != Some(staff.id()) {
            table.waiter_assigned_at = Some(now);
        }
        table.active_waiter_id = Some(staff.id().to_string());
        table.updated_at = Some(now);

        tracing::info!(table_id = %table.id, waiter_id = %staff.id(), "Waiter activated table");
        Ok(table)
    }

    /// Release a table and cancel its unresolved call.
    ///
    /// Waiters may only release a table they hold; admins may release any.
    pub async fn deactivate(&self, staff: &Staff, table_id: &str) -> AppResult<Deactivation> {
        let mut table = self.staff_table(staff, table_id).await?;

        let expected = if staff.is_admin() {
            None
        } else {
            staff.ensure_waiter()?;
            if table.active_waiter_id.as_deref() != Some(staff.id()) {
                return Err(AppError::Forbidden(format!(
                    "{} is not assigned to you",
                    table.label()
                )));
            }
            Some(staff.id())
        };

        if self.tables.release_waiter(&table.id, expected).await? == 0 {
            return Err(AppError::Conflict(format!(
                "{} was released concurrently",
                table.label()
            )));
        }
        table.active_waiter_id = None;
        table.waiter_assigned_at = None;

        let cancelled_calls = self.call_service.cancel_for_table(&table).await?;

        tracing::info!(
            table_id = %table.id,
            released_by = %staff.id(),
            cancelled_calls,
            "Table deactivated"
        );
        Ok(Deactivation { cancelled_calls })
    }

    /// Allow or refuse calls from a table.
    pub async fn set_notifications(
        &self,
        staff: &Staff,
        input: NotificationsInput,
    ) -> AppResult<dining_table::Model> {
        staff.ensure_admin()?;
        let mut table = self.staff_table(staff, &input.table_id).await?;

        self.tables
            .set_notifications_enabled(&table.id, input.enabled)
            .await?;
        table.notifications_enabled = input.enabled;

        tracing::info!(table_id = %table.id, enabled = input.enabled, "Table notifications toggled");
        Ok(table)
    }

    async fn staff_table(&self, staff: &Staff, table_id: &str) -> AppResult<dining_table::Model> {
        let table = self.tables.get_by_id(table_id).await?;
        staff.ensure_business(&table.business_id)?;
        Ok(table)
    }
}
