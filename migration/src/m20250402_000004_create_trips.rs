use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250402_000001_create_users::User;
use super::m20250402_000002_create_routes::Route;
use super::m20250402_000003_create_vehicles::Vehicle;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create trip status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(TripStatus::Enum)
                    .values([TripStatus::Scheduled])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Trip::Table)
                    .if_not_exists()
                    .col(uuid(Trip::Id).primary_key())
                    .col(uuid(Trip::RouteId).not_null())
                    .col(uuid(Trip::VehicleId).not_null())
                    .col(uuid_null(Trip::DriverId))
                    .col(date(Trip::DepartureDate).not_null())
                    .col(time(Trip::DepartureTime).not_null())
                    .col(time_null(Trip::EstimatedArrivalTime))
                    .col(
                        ColumnDef::new(Trip::Status)
                            .custom(TripStatus::Enum)
                            .not_null(),
                    )
                    .col(double(Trip::Price).not_null())
                    .col(integer(Trip::SeatsAvailable).not_null())
                    .col(
                        timestamp_with_time_zone(Trip::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_route")
                            .from(Trip::Table, Trip::RouteId)
                            .to(Route::Table, Route::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_vehicle")
                            .from(Trip::Table, Trip::VehicleId)
                            .to(Vehicle::Table, Vehicle::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_driver")
                            .from(Trip::Table, Trip::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Trip::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(TripStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Trip {
    Table,
    Id,
    RouteId,
    VehicleId,
    DriverId,
    DepartureDate,
    DepartureTime,
    EstimatedArrivalTime,
    Status,
    Price,
    SeatsAvailable,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum TripStatus {
    #[sea_orm(iden = "trip_status")]
    Enum,
    #[sea_orm(iden = "scheduled")]
    Scheduled,
}
