//! Create dining table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DiningTable::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DiningTable::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DiningTable::BusinessId).string_len(32).not_null())
                    .col(ColumnDef::new(DiningTable::Number).integer().not_null())
                    .col(ColumnDef::new(DiningTable::Name).string_len(128))
                    .col(
                        ColumnDef::new(DiningTable::Code)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(DiningTable::NotificationsEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(DiningTable::ActiveWaiterId).string_len(32))
                    .col(ColumnDef::new(DiningTable::WaiterAssignedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(DiningTable::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(DiningTable::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dining_table_business")
                            .from(DiningTable::Table, DiningTable::BusinessId)
                            .to(Business::Table, Business::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dining_table_active_waiter")
                            .from(DiningTable::Table, DiningTable::ActiveWaiterId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (business_id, number)
        manager
            .create_index(
                Index::create()
                    .name("idx_dining_table_business_number")
                    .table(DiningTable::Table)
                    .col(DiningTable::BusinessId)
                    .col(DiningTable::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: active_waiter_id (for a waiter's assigned tables)
        manager
            .create_index(
                Index::create()
                    .name("idx_dining_table_active_waiter_id")
                    .table(DiningTable::Table)
                    .col(DiningTable::ActiveWaiterId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DiningTable::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DiningTable {
    Table,
    Id,
    BusinessId,
    Number,
    Name,
    Code,
    NotificationsEnabled,
    ActiveWaiterId,
    WaiterAssignedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Business {
    Table,
    Id,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
