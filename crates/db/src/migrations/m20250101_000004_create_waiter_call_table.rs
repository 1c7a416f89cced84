//! Create waiter call table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WaiterCall::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WaiterCall::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WaiterCall::TableId).string_len(32).not_null())
                    .col(ColumnDef::new(WaiterCall::BusinessId).string_len(32).not_null())
                    .col(ColumnDef::new(WaiterCall::WaiterId).string_len(32))
                    .col(
                        ColumnDef::new(WaiterCall::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(WaiterCall::Urgency)
                            .string_len(16)
                            .not_null()
                            .default("normal"),
                    )
                    .col(ColumnDef::new(WaiterCall::Message).text().not_null())
                    .col(
                        ColumnDef::new(WaiterCall::Metadata)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(WaiterCall::CalledAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(WaiterCall::AcknowledgedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(WaiterCall::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(WaiterCall::CancelledAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_waiter_call_table")
                            .from(WaiterCall::Table, WaiterCall::TableId)
                            .to(DiningTable::Table, DiningTable::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_waiter_call_waiter")
                            .from(WaiterCall::Table, WaiterCall::WaiterId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (waiter_id, status) for a waiter's queue
        manager
            .create_index(
                Index::create()
                    .name("idx_waiter_call_waiter_status")
                    .table(WaiterCall::Table)
                    .col(WaiterCall::WaiterId)
                    .col(WaiterCall::Status)
                    .to_owned(),
            )
            .await?;

        // Index: (table_id, called_at) for spam window counts
        manager
            .create_index(
                Index::create()
                    .name("idx_waiter_call_table_called_at")
                    .table(WaiterCall::Table)
                    .col(WaiterCall::TableId)
                    .col(WaiterCall::CalledAt)
                    .to_owned(),
            )
            .await?;

        // Index: (business_id, called_at) for history
        manager
            .create_index(
                Index::create()
                    .name("idx_waiter_call_business_called_at")
                    .table(WaiterCall::Table)
                    .col(WaiterCall::BusinessId)
                    .col(WaiterCall::CalledAt)
                    .to_owned(),
            )
            .await?;

        // At most one unresolved call per table
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_waiter_call_one_unresolved
                ON waiter_call (table_id)
                WHERE status IN ('pending', 'acknowledged');
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WaiterCall::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum WaiterCall {
    Table,
    Id,
    TableId,
    BusinessId,
    WaiterId,
    Status,
    Urgency,
    Message,
    Metadata,
    CalledAt,
    AcknowledgedAt,
    CompletedAt,
    CancelledAt,
}

#[derive(Iden)]
enum DiningTable {
    Table,
    Id,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
