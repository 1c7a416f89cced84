//! Create table silence table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TableSilence::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TableSilence::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TableSilence::TableId).string_len(32).not_null())
                    .col(ColumnDef::new(TableSilence::BusinessId).string_len(32).not_null())
                    .col(ColumnDef::new(TableSilence::SilencedBy).string_len(32))
                    .col(ColumnDef::new(TableSilence::Reason).string_len(16).not_null())
                    .col(
                        ColumnDef::new(TableSilence::SilencedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(TableSilence::EndsAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(TableSilence::UnsilencedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(TableSilence::UnsilencedBy).string_len(32))
                    .col(
                        ColumnDef::new(TableSilence::CallCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(TableSilence::Notes).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_table_silence_table")
                            .from(TableSilence::Table, TableSilence::TableId)
                            .to(DiningTable::Table, DiningTable::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (business_id, silenced_at) for listing
        manager
            .create_index(
                Index::create()
                    .name("idx_table_silence_business_silenced_at")
                    .table(TableSilence::Table)
                    .col(TableSilence::BusinessId)
                    .col(TableSilence::SilencedAt)
                    .to_owned(),
            )
            .await?;

        // At most one open silence per table; lapsed rows are closed by the sweep
        manager
            .get_connection()
            .execute_unprepared(
                r"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_table_silence_one_open
                ON table_silence (table_id)
                WHERE unsilenced_at IS NULL;
                ",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TableSilence::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum TableSilence {
    Table,
    Id,
    TableId,
    BusinessId,
    SilencedBy,
    Reason,
    SilencedAt,
    EndsAt,
    UnsilencedAt,
    UnsilencedBy,
    CallCount,
    Notes,
}

#[derive(Iden)]
enum DiningTable {
    Table,
    Id,
}
