//! IP block service.

use chrono::{Duration, Utc};
use mozo_common::{AppError, AppResult, IdGenerator};
use mozo_db::{
    entities::ip_block::{self, IpBlockReason},
    repositories::{DiningTableRepository, IpBlockRepository, WaiterCallRepository},
};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::profile::Staff;
use super::silence::{SilenceInput, SilenceRequest, SilenceService};

/// Input for blocking the address behind a call.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BlockCallerInput {
    #[validate(length(min = 1, max = 64))]
    pub call_id: String,
    #[serde(default = "default_reason")]
    pub reason: IpBlockReason,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    /// Permanent when absent.
    #[validate(range(min = 1, max = 8760))]
    pub expires_in_hours: Option<i64>,
}

const fn default_reason() -> IpBlockReason {
    IpBlockReason::Spam
}

/// A new block and whether the table was silenced with it.
#[derive(Debug, Clone, Serialize)]
pub struct BlockOutcome {
    pub block: ip_block::Model,
    pub table_silenced: bool,
}

#[derive(Clone)]
pub struct IpBlockService {
    blocks: IpBlockRepository,
    calls: WaiterCallRepository,
    tables: DiningTableRepository,
    silences: SilenceService,
    id_gen: IdGenerator,
}

impl IpBlockService {
    #[must_use]
    pub const fn new(
        blocks: IpBlockRepository,
        calls: WaiterCallRepository,
        tables: DiningTableRepository,
        silences: SilenceService,
    ) -> Self {
        Self {
            blocks,
            calls,
            tables,
            silences,
            id_gen: IdGenerator::new(),
        }
    }

    /// Block the address a call came from and silence its table.
    pub async fn block_caller(
        &self,
        staff: &Staff,
        input: BlockCallerInput,
    ) -> AppResult<BlockOutcome> {
        staff.ensure_admin()?;
        input.validate()?;

        let call = self.calls.get_by_id(&input.call_id).await?;
        staff.ensure_business(&call.business_id)?;

        let ip = call.metadata().client_ip.ok_or_else(|| {
            AppError::BadRequest("Call has no recorded client address".to_string())
        })?;

        let now = Utc::now().fixed_offset();
        if let Some(existing) = self.blocks.find_active(&call.business_id, &ip, now).await? {
            return Err(AppError::Conflict(format!(
                "Address is already blocked ({})",
                existing.id
            )));
        }

        let model = ip_block::ActiveModel {
            id: Set(self.id_gen.generate()),
            ip_address: Set(ip),
            business_id: Set(call.business_id.clone()),
            blocked_by: Set(staff.id().to_string()),
            reason: Set(input.reason),
            notes: Set(input.notes.clone()),
            source_call_id: Set(Some(call.id.clone())),
            blocked_at: Set(now),
            expires_at: Set(input.expires_in_hours.map(|h| now + Duration::hours(h))),
            unblocked_at: Set(None),
        };
        let block = self.blocks.create(model).await?;

        tracing::info!(
            block_id = %block.id,
            call_id = %call.id,
            blocked_by = %staff.id(),
            "Blocked caller address"
        );

        let table = self.tables.get_by_id(&call.table_id).await?;
        let request = SilenceRequest::manual(
            staff.id(),
            SilenceInput {
                duration_minutes: None,
                notes: Some(format!("caller blocked ({})", block.id)),
            },
        );
        let table_silenced = match self.silences.silence(&table, request).await {
            Ok(_) => true,
            Err(AppError::TableAlreadySilenced(_)) => false,
            Err(e) => {
                tracing::warn!(table_id = %table.id, error = %e, "Failed to silence blocked table");
                false
            }
        };

        Ok(BlockOutcome {
            block,
            table_silenced,
        })
    }

    /// Lift a block of the admin's business.
    pub async fn unblock(&self, staff: &Staff, block_id: &str) -> AppResult<()> {
        staff.ensure_admin()?;

        let block = self
            .blocks
            .find_by_id(block_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("IP block {block_id}")))?;
        staff.ensure_business(&block.business_id)?;

        if self.blocks.unblock(block_id, Utc::now().fixed_offset()).await? == 0 {
            return Err(AppError::NotFound(format!("IP block {block_id}")));
        }

        tracing::info!(block_id = %block_id, unblocked_by = %staff.id(), "Unblocked caller address");
        Ok(())
    }

    /// Active blocks of the admin's business.
    pub async fn list(&self, staff: &Staff) -> AppResult<Vec<ip_block::Model>> {
        staff.ensure_admin()?;
        self.blocks
            .find_active_by_business(staff.business_id(), Utc::now().fixed_offset())
            .await
    }
}
