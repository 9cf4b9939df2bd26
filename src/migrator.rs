use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_promotion_tables::Migration),
            Box::new(m20240101_000003_create_orders_table::Migration),
            Box::new(m20240101_000004_create_carts_and_settings_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Categories::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Categories::Name).string().not_null())
                        .col(ColumnDef::new(Categories::Description).text().not_null())
                        .col(ColumnDef::new(Categories::Icon).string().null())
                        .col(ColumnDef::new(Categories::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Categories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Categories::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Subcategories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Subcategories::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Subcategories::Name).string().not_null())
                        .col(ColumnDef::new(Subcategories::Description).text().not_null())
                        .col(ColumnDef::new(Subcategories::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Subcategories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Subcategories::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CategorySubcategories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CategorySubcategories::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CategorySubcategories::CategoryId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CategorySubcategories::SubcategoryId)
                                .uuid()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_category_subcategories_pair")
                        .table(CategorySubcategories::Table)
                        .col(CategorySubcategories::CategoryId)
                        .col(CategorySubcategories::SubcategoryId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(ColumnDef::new(Products::Price).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Products::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(ColumnDef::new(Products::SubcategoryId).uuid().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariants::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariants::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductVariants::Color).string().not_null())
                        .col(ColumnDef::new(ProductVariants::ColorCode).string().not_null())
                        .col(ColumnDef::new(ProductVariants::Images).json().not_null())
                        .col(
                            ColumnDef::new(ProductVariants::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_variants_product")
                                .from(ProductVariants::Table, ProductVariants::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(VariantSizes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(VariantSizes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(VariantSizes::VariantId).uuid().not_null())
                        .col(ColumnDef::new(VariantSizes::Size).string().not_null())
                        .col(
                            ColumnDef::new(VariantSizes::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_variant_sizes_variant")
                                .from(VariantSizes::Table, VariantSizes::VariantId)
                                .to(ProductVariants::Table, ProductVariants::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_variant_sizes_variant_size")
                        .table(VariantSizes::Table)
                        .col(VariantSizes::VariantId)
                        .col(VariantSizes::Size)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(VariantSizes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CategorySubcategories::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Subcategories::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Categories {
        Table,
        Id,
        Name,
        Description,
        Icon,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Subcategories {
        Table,
        Id,
        Name,
        Description,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CategorySubcategories {
        Table,
        Id,
        CategoryId,
        SubcategoryId,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Description,
        Price,
        Status,
        CategoryId,
        SubcategoryId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductVariants {
        Table,
        Id,
        ProductId,
        Color,
        ColorCode,
        Images,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum VariantSizes {
        Table,
        Id,
        VariantId,
        Size,
        Stock,
    }
}

mod m20240101_000002_create_promotion_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_promotion_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Offers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Offers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Offers::Label).string().not_null())
                        .col(ColumnDef::new(Offers::Description).text().null())
                        .col(ColumnDef::new(Offers::Image).string().null())
                        .col(ColumnDef::new(Offers::DiscountAmount).decimal_len(16, 4).null())
                        .col(
                            ColumnDef::new(Offers::DiscountPercentage)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(Offers::ByProduct).uuid().null())
                        .col(ColumnDef::new(Offers::ByCategory).uuid().null())
                        .col(ColumnDef::new(Offers::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Offers::StartDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Offers::ExpirationDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Offers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Offers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Coupons::Label).string().not_null())
                        .col(ColumnDef::new(Coupons::Code).string_len(6).not_null())
                        .col(ColumnDef::new(Coupons::ByMinAmount).decimal_len(16, 4).null())
                        .col(ColumnDef::new(Coupons::ByProduct).uuid().null())
                        .col(ColumnDef::new(Coupons::DiscountAmount).decimal_len(16, 4).null())
                        .col(
                            ColumnDef::new(Coupons::DiscountPercentage)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(Coupons::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Coupons::StartDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::ExpirationDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_coupons_code")
                        .table(Coupons::Table)
                        .col(Coupons::Code)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CouponRedemptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CouponRedemptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CouponRedemptions::CouponId).uuid().not_null())
                        .col(ColumnDef::new(CouponRedemptions::Email).string().not_null())
                        .col(ColumnDef::new(CouponRedemptions::OrderId).uuid().null())
                        .col(
                            ColumnDef::new(CouponRedemptions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_redemptions_coupon")
                                .from(CouponRedemptions::Table, CouponRedemptions::CouponId)
                                .to(Coupons::Table, Coupons::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One usage entry per customer and coupon
            manager
                .create_index(
                    Index::create()
                        .name("idx_coupon_redemptions_coupon_email")
                        .table(CouponRedemptions::Table)
                        .col(CouponRedemptions::CouponId)
                        .col(CouponRedemptions::Email)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CouponRedemptions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Offers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Offers {
        Table,
        Id,
        Label,
        Description,
        Image,
        DiscountAmount,
        DiscountPercentage,
        ByProduct,
        ByCategory,
        Status,
        StartDate,
        ExpirationDate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
        Label,
        Code,
        ByMinAmount,
        ByProduct,
        DiscountAmount,
        DiscountPercentage,
        Status,
        StartDate,
        ExpirationDate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CouponRedemptions {
        Table,
        Id,
        CouponId,
        Email,
        OrderId,
        CreatedAt,
    }
}

mod m20240101_000003_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create orders table aligned with entities::commerce::order Model
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::Email).string().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::Items).json().not_null())
                        .col(
                            ColumnDef::new(Orders::Subtotal)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::CouponDiscount)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::Total)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::ShippingAddress).json().not_null())
                        .col(ColumnDef::new(Orders::CouponId).uuid().null())
                        .col(ColumnDef::new(Orders::CouponCode).string().null())
                        .col(ColumnDef::new(Orders::FirstPurchaseDiscount).json().null())
                        .col(ColumnDef::new(Orders::PaymentUrl).text().null())
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_email")
                        .table(Orders::Table)
                        .col(Orders::Email)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        Email,
        Status,
        Items,
        Subtotal,
        CouponDiscount,
        Total,
        ShippingAddress,
        CouponId,
        CouponCode,
        FirstPurchaseDiscount,
        PaymentUrl,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_carts_and_settings_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_carts_and_settings_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ShoppingCarts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShoppingCarts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ShoppingCarts::Email).string().not_null())
                        .col(ColumnDef::new(ShoppingCarts::Items).json().not_null())
                        .col(ColumnDef::new(ShoppingCarts::CouponCode).string().null())
                        .col(
                            ColumnDef::new(ShoppingCarts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShoppingCarts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StoreSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StoreSettings::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StoreSettings::GatewayName).string().null())
                        .col(ColumnDef::new(StoreSettings::EpaycoSettings).json().null())
                        .col(ColumnDef::new(StoreSettings::PayuSettings).json().null())
                        .col(
                            ColumnDef::new(StoreSettings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StoreSettings::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ShoppingCarts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ShoppingCarts {
        Table,
        Id,
        Email,
        Items,
        CouponCode,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StoreSettings {
        Table,
        Id,
        GatewayName,
        EpaycoSettings,
        PayuSettings,
        UpdatedAt,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(5)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
