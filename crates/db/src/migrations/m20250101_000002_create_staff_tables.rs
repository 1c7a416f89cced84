//! Create user and staff profile tables migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(User::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(User::BusinessId).string_len(32).not_null())
                    .col(ColumnDef::new(User::Name).string_len(128).not_null())
                    .col(
                        ColumnDef::new(User::Email)
                            .string_len(256)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(User::Role).string_len(16).not_null())
                    .col(
                        ColumnDef::new(User::ApiToken)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(User::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_business")
                            .from(User::Table, User::BusinessId)
                            .to(Business::Table, Business::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (business_id, role) for waiter fan-out
        manager
            .create_index(
                Index::create()
                    .name("idx_user_business_role")
                    .table(User::Table)
                    .col(User::BusinessId)
                    .col(User::Role)
                    .to_owned(),
            )
            .await?;

        for (table, fk_name, has_active_flag) in [
            (Profile::AdminProfile, "fk_admin_profile_user", false),
            (Profile::WaiterProfile, "fk_waiter_profile_user", true),
        ] {
            let mut stmt = Table::create();
            stmt.table(table)
                .if_not_exists()
                .col(
                    ColumnDef::new(Profile::Id)
                        .string_len(32)
                        .not_null()
                        .primary_key(),
                )
                .col(
                    ColumnDef::new(Profile::UserId)
                        .string_len(32)
                        .not_null()
                        .unique_key(),
                )
                .col(ColumnDef::new(Profile::BusinessId).string_len(32).not_null())
                .col(ColumnDef::new(Profile::DisplayName).string_len(128).not_null())
                .col(ColumnDef::new(Profile::Phone).string_len(32))
                .col(
                    ColumnDef::new(Profile::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name(fk_name)
                        .from(table, Profile::UserId)
                        .to(User::Table, User::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            if has_active_flag {
                stmt.col(
                    ColumnDef::new(Profile::IsActive)
                        .boolean()
                        .not_null()
                        .default(true),
                );
            }
            manager.create_table(stmt.to_owned()).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Profile::WaiterProfile).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Profile::AdminProfile).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum User {
    Table,
    Id,
    BusinessId,
    Name,
    Email,
    Role,
    ApiToken,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
enum Profile {
    AdminProfile,
    WaiterProfile,
    Id,
    UserId,
    BusinessId,
    DisplayName,
    Phone,
    IsActive,
    CreatedAt,
}

#[derive(Iden)]
enum Business {
    Table,
    Id,
}
