use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250402_000001_create_users::User;
use super::m20250402_000004_create_trips::Trip;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create reservation status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(ReservationStatus::Enum)
                    .values([ReservationStatus::Confirmed])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Reservation::Table)
                    .if_not_exists()
                    .col(uuid(Reservation::Id).primary_key())
                    .col(uuid(Reservation::TripId).not_null())
                    .col(uuid(Reservation::StudentId).not_null())
                    .col(integer(Reservation::SeatCount).not_null())
                    .col(
                        ColumnDef::new(Reservation::Status)
                            .custom(ReservationStatus::Enum)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Reservation::ReservedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reservation_trip")
                            .from(Reservation::Table, Reservation::TripId)
                            .to(Trip::Table, Trip::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    // Reservations account for decremented trip seats, so a
                    // student row holding them must not be deleted out from
                    // under the counter.
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reservation_student")
                            .from(Reservation::Table, Reservation::StudentId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reservation::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(ReservationStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Reservation {
    Table,
    Id,
    TripId,
    StudentId,
    SeatCount,
    Status,
    ReservedAt,
}

#[derive(DeriveIden)]
pub enum ReservationStatus {
    #[sea_orm(iden = "reservation_status")]
    Enum,
    #[sea_orm(iden = "confirmed")]
    Confirmed,
}
