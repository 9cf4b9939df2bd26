mod common;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Duration, Utc};
use common::{decimal, id_of, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use storefront_api::{
    entities::commerce::{coupon, offer, ActivityStatus, CouponModel},
    services::{
        catalog::{CreateProductInput, CreateVariantInput, SizeStockInput},
        categories::CreateCategoryInput,
        promotions::{
            coupons::{COUPON_CODE_EXISTS, COUPON_NOT_FOUND, COUPON_RULE_CHANGE_NOT_ALLOWED},
            discount::start_of_day,
        },
    },
};

fn window(start_in_days: i64, length_days: i64) -> (String, String) {
    let start = Utc::now() + Duration::days(start_in_days);
    (
        start.to_rfc3339(),
        (start + Duration::days(length_days)).to_rfc3339(),
    )
}

#[tokio::test]
async fn coupon_crud_over_http() {
    let app = TestApp::new().await;
    let (start, end) = window(0, 14);

    let (status, created) = app
        .admin(
            Method::POST,
            "/api/v1/coupons",
            Some(json!({
                "label": "Winter",
                "by_min_amount": "100",
                "discount_amount": "15",
                "start_date": start,
                "expiration_date": end,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let coupon = &created["data"];
    let code = coupon["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert_eq!(coupon["status"], "active");
    let id = id_of(&coupon["id"]);

    let (status, found) = app
        .admin(
            Method::GET,
            &format!("/api/v1/coupons/code/{}", code.to_lowercase()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(id_of(&found["data"]["id"]), id);

    let (status, body) = app
        .admin(
            Method::PATCH,
            &format!("/api/v1/coupons/{}", id),
            Some(json!({ "by_product": uuid::Uuid::new_v4() })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], COUPON_RULE_CHANGE_NOT_ALLOWED);

    let (status, updated) = app
        .admin(
            Method::PATCH,
            &format!("/api/v1/coupons/{}", id),
            Some(json!({ "label": "Winter sale", "discount_amount": "20" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["data"]["label"], "Winter sale");
    assert_eq!(decimal(&updated["data"]["discount_amount"]), dec!(20));

    let (status, _) = app
        .admin(Method::DELETE, &format!("/api/v1/coupons/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app
        .admin(Method::GET, &format!("/api/v1/coupons/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], COUPON_NOT_FOUND);
}

#[tokio::test]
async fn coupon_codes_follow_the_policy() {
    let app = TestApp::new().await;
    let (start, end) = window(0, 3);

    for (code, expected) in [("ab1", StatusCode::CREATED), ("LOL123", StatusCode::BAD_REQUEST), ("AB-12", StatusCode::BAD_REQUEST)] {
        let (status, body) = app
            .admin(
                Method::POST,
                "/api/v1/coupons",
                Some(json!({
                    "label": format!("Policy {}", code),
                    "code": code,
                    "by_min_amount": "10",
                    "discount_percentage": "5",
                    "start_date": start,
                    "expiration_date": end,
                })),
            )
            .await;
        assert_eq!(status, expected, "{code}: {body}");
        if status == StatusCode::CREATED {
            let stored = body["data"]["code"].as_str().unwrap();
            assert!(stored.starts_with("AB1"));
            assert_eq!(stored.len(), 6);
        }
    }
}

#[tokio::test]
async fn category_offer_discounts_its_products() {
    let app = TestApp::new().await;
    let category = app
        .state
        .services
        .categories
        .create_category(CreateCategoryInput {
            name: "Knitwear".into(),
            description: "Sweaters".into(),
            icon: None,
        })
        .await
        .unwrap();

    let catalog = app.state.services.catalog.clone();
    let product = catalog
        .create_product(CreateProductInput {
            name: "Cable Knit".into(),
            description: None,
            price: dec!(200),
            category_id: Some(category.id),
            subcategory_id: None,
        })
        .await
        .unwrap();
    let variant = catalog
        .add_variant(
            product.id,
            CreateVariantInput {
                color: "Cream".into(),
                color_code: "#FFFDD0".into(),
                images: vec![],
                sizes: vec![SizeStockInput {
                    size: "M".into(),
                    stock: 2,
                }],
            },
        )
        .await
        .unwrap();

    let (start, end) = window(0, 5);
    let (status, offer) = app
        .admin(
            Method::POST,
            "/api/v1/offers",
            Some(json!({
                "label": "Knit week",
                "discount_amount": "50",
                "by_category": category.id,
                "start_date": start,
                "expiration_date": end,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{offer}");
    assert_eq!(offer["data"]["status"], "active");

    let (status, quote) = app
        .post(
            "/api/v1/orders/quote",
            json!({
                "email": "knit@x.com",
                "items": [{
                    "product_id": product.id,
                    "variant_id": variant.id,
                    "size": "M",
                    "quantity": 1,
                }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{quote}");
    assert_eq!(decimal(&quote["data"]["items"][0]["price"]), dec!(150));
    assert_eq!(quote["data"]["items"][0]["offer_info"]["offer_id"], offer["data"]["id"]);
}

#[tokio::test]
async fn future_offers_wait_for_their_start_day() {
    let app = TestApp::new().await;
    let product = app.seed_product("Puffer Vest", dec!(100), &[("M", 1)]).await;

    let (start, end) = window(2, 5);
    let (status, offer) = app
        .admin(
            Method::POST,
            "/api/v1/offers",
            Some(json!({
                "label": "Vest preview",
                "discount_percentage": "30",
                "by_product": product.product.id,
                "start_date": start,
                "expiration_date": end,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{offer}");
    assert_eq!(offer["data"]["status"], "inactive");

    // Not due yet, so a sweep leaves it alone
    let report = app.state.services.scheduler.sweep_promotions().await.unwrap();
    assert_eq!(report.offers_activated, 0);

    let (_, offers) = app.get("/api/v1/offers?status=inactive").await;
    assert_eq!(offers["data"].as_array().unwrap().len(), 1);
    let (_, offers) = app.get("/api/v1/offers?status=active").await;
    assert!(offers["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn offer_mode_cannot_switch() {
    let app = TestApp::new().await;
    let product = app.seed_product("Rain Hat", dec!(40), &[("U", 1)]).await;
    let (start, end) = window(0, 2);
    let (_, offer) = app
        .admin(
            Method::POST,
            "/api/v1/offers",
            Some(json!({
                "label": "Hat deal",
                "discount_percentage": "10",
                "by_product": product.product.id,
                "start_date": start,
                "expiration_date": end,
            })),
        )
        .await;
    let id = id_of(&offer["data"]["id"]);

    let (status, _) = app
        .admin(
            Method::PATCH,
            &format!("/api/v1/offers/{}", id),
            Some(json!({ "discount_amount": "5" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = app
        .admin(
            Method::PATCH,
            &format!("/api/v1/offers/{}", id),
            Some(json!({ "discount_percentage": "15" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(decimal(&updated["data"]["discount_percentage"]), dec!(15));
}

async fn post_coupon(app: &TestApp, label: &str, code: &str, start_in_days: i64) -> (StatusCode, Value) {
    let (start, end) = window(start_in_days, 10);
    app.admin(
        Method::POST,
        "/api/v1/coupons",
        Some(json!({
            "label": label,
            "code": code,
            "by_min_amount": "50",
            "discount_amount": "10",
            "start_date": start,
            "expiration_date": end,
        })),
    )
    .await
}

async fn inactive_coupon_starting_today(app: &TestApp, label: &str, code: &str) -> CouponModel {
    let now = Utc::now();
    coupon::ActiveModel {
        id: Set(uuid::Uuid::new_v4()),
        label: Set(label.into()),
        code: Set(code.into()),
        by_min_amount: Set(Some(dec!(50))),
        by_product: Set(None),
        discount_amount: Set(Some(dec!(10))),
        discount_percentage: Set(None),
        status: Set(ActivityStatus::Inactive),
        start_date: Set(start_of_day(now)),
        expiration_date: Set(now + Duration::days(10)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .unwrap()
}

fn date_of(value: &Value) -> DateTime<Utc> {
    serde_json::from_value(value.clone()).unwrap()
}

#[tokio::test]
async fn upcoming_coupon_keeps_its_code_until_it_starts() {
    let app = TestApp::new().await;
    let (status, upcoming) = post_coupon(&app, "Spring preview", "NW45TR", 3).await;
    assert_eq!(status, StatusCode::CREATED, "{upcoming}");
    assert_eq!(upcoming["data"]["status"], "inactive");

    let (status, body) = post_coupon(&app, "Spring now", "NW45TR", 0).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], COUPON_CODE_EXISTS);

    let report = app.state.services.scheduler.sweep_promotions().await.unwrap();
    assert_eq!(report.coupons_activated, 0);
}

#[tokio::test]
async fn sweep_leaves_clashing_coupons_inactive() {
    let app = TestApp::new().await;
    let (status, live) = post_coupon(&app, "Autumn", "QR56ST", 0).await;
    assert_eq!(status, StatusCode::CREATED, "{live}");

    let clash = inactive_coupon_starting_today(&app, "Autumn again", "QR56ST").await;
    let clean = inactive_coupon_starting_today(&app, "Harvest", "HV78WX").await;

    let report = app.state.services.scheduler.sweep_promotions().await.unwrap();
    assert_eq!(report.coupons_activated, 1);

    let (_, body) = app
        .admin(Method::GET, &format!("/api/v1/coupons/{}", clash.id), None)
        .await;
    assert_eq!(body["data"]["status"], "inactive");
    let (_, body) = app
        .admin(Method::GET, &format!("/api/v1/coupons/{}", clean.id), None)
        .await;
    assert_eq!(body["data"]["status"], "active");

    let (_, found) = app.admin(Method::GET, "/api/v1/coupons/code/QR56ST", None).await;
    assert_eq!(found["data"]["id"], live["data"]["id"]);
}

#[tokio::test]
async fn running_offer_is_extended_in_place() {
    let app = TestApp::new().await;
    let product = app.seed_product("Fleece Hoodie", dec!(80), &[("M", 3)]).await;
    let (start, end) = window(0, 3);
    let (status, created) = app
        .admin(
            Method::POST,
            "/api/v1/offers",
            Some(json!({
                "label": "Fleece days",
                "discount_percentage": "25",
                "by_product": product.product.id,
                "start_date": start,
                "expiration_date": end,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let id = id_of(&created["data"]["id"]);

    // The offer went live two days ago
    let started = start_of_day(Utc::now() - Duration::days(2));
    let stored = app.state.services.offers.get_offer(id).await.unwrap();
    let mut backdated: offer::ActiveModel = stored.into();
    backdated.start_date = Set(started);
    backdated.update(&*app.state.db).await.unwrap();

    let new_end = Utc::now() + Duration::days(21);
    let (status, updated) = app
        .admin(
            Method::PATCH,
            &format!("/api/v1/offers/{}", id),
            Some(json!({ "expiration_date": new_end.to_rfc3339() })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["data"]["status"], "active");
    assert_eq!(date_of(&updated["data"]["start_date"]), started);
    assert!(date_of(&updated["data"]["expiration_date"]) >= new_end);

    // Moving the start into the past is still refused
    let (status, _) = app
        .admin(
            Method::PATCH,
            &format!("/api/v1/offers/{}", id),
            Some(json!({ "start_date": started.to_rfc3339() })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
