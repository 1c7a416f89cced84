//! Create IP block table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IpBlock::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IpBlock::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IpBlock::IpAddress).string_len(64).not_null())
                    .col(ColumnDef::new(IpBlock::BusinessId).string_len(32).not_null())
                    .col(ColumnDef::new(IpBlock::BlockedBy).string_len(32).not_null())
                    .col(ColumnDef::new(IpBlock::Reason).string_len(16).not_null())
                    .col(ColumnDef::new(IpBlock::Notes).text())
                    .col(ColumnDef::new(IpBlock::SourceCallId).string_len(32))
                    .col(
                        ColumnDef::new(IpBlock::BlockedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(IpBlock::ExpiresAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(IpBlock::UnblockedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ip_block_business")
                            .from(IpBlock::Table, IpBlock::BusinessId)
                            .to(Business::Table, Business::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (business_id, ip_address) for the intake check
        manager
            .create_index(
                Index::create()
                    .name("idx_ip_block_business_ip")
                    .table(IpBlock::Table)
                    .col(IpBlock::BusinessId)
                    .col(IpBlock::IpAddress)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IpBlock::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum IpBlock {
    Table,
    Id,
    IpAddress,
    BusinessId,
    BlockedBy,
    Reason,
    Notes,
    SourceCallId,
    BlockedAt,
    ExpiresAt,
    UnblockedAt,
}

#[derive(Iden)]
enum Business {
    Table,
    Id,
}
