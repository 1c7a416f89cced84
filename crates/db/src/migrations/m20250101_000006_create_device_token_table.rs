//! Create device token table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeviceToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceToken::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeviceToken::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(DeviceToken::Token).text().not_null())
                    .col(ColumnDef::new(DeviceToken::Platform).string_len(16).not_null())
                    .col(ColumnDef::new(DeviceToken::DeviceName).string_len(128))
                    .col(
                        ColumnDef::new(DeviceToken::LastUsedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DeviceToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_device_token_user")
                            .from(DeviceToken::Table, DeviceToken::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (user_id, token)
        manager
            .create_index(
                Index::create()
                    .name("idx_device_token_user_token")
                    .table(DeviceToken::Table)
                    .col(DeviceToken::UserId)
                    .col(DeviceToken::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: last_used_at (for pruning)
        manager
            .create_index(
                Index::create()
                    .name("idx_device_token_last_used_at")
                    .table(DeviceToken::Table)
                    .col(DeviceToken::LastUsedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeviceToken::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DeviceToken {
    Table,
    Id,
    UserId,
    Token,
    Platform,
    DeviceName,
    LastUsedAt,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
