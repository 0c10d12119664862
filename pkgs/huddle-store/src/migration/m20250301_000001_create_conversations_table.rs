use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
    ParticipantsJson,
    ParticipantNamesJson,
    ParticipantAvatarsJson,
    LastMessage,
    LastMessageAt,
    LastMessageSenderId,
    IsGroup,
    GroupName,
    AdminId,
    Version,
    CreatedAt,
    UpdatedAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000001_create_conversations_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Conversations::ParticipantsJson)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::ParticipantNamesJson)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::ParticipantAvatarsJson)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::LastMessage)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Conversations::LastMessageAt).big_integer())
                    .col(ColumnDef::new(Conversations::LastMessageSenderId).string())
                    .col(
                        ColumnDef::new(Conversations::IsGroup)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Conversations::GroupName).string())
                    .col(ColumnDef::new(Conversations::AdminId).string())
                    .col(
                        ColumnDef::new(Conversations::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Conversations::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Conversations::Table).to_owned())
            .await
    }
}
