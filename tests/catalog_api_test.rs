mod common;

use axum::http::{Method, StatusCode};
use common::{id_of, TestApp};
use serde_json::json;
use storefront_api::auth::consts as perm;

#[tokio::test]
async fn product_lifecycle_over_http() {
    let app = TestApp::new().await;

    let (status, created) = app
        .admin(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Field Jacket", "description": "Waxed cotton", "price": "240" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["data"]["status"], "inactive");
    let product_id = id_of(&created["data"]["id"]);

    let (status, variant) = app
        .admin(
            Method::POST,
            &format!("/api/v1/products/{}/variants", product_id),
            Some(json!({
                "color": "Olive",
                "color_code": "#556B2F",
                "images": ["https://cdn.test/olive.jpg"],
                "sizes": [{ "size": "M", "stock": 4 }, { "size": "L", "stock": 0 }],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{variant}");
    let variant_id = id_of(&variant["data"]["id"]);

    let (status, detail) = app.get(&format!("/api/v1/products/{}", product_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["status"], "active");
    assert_eq!(detail["data"]["name"], "Field Jacket");
    assert_eq!(detail["data"]["variants"][0]["sizes"].as_array().unwrap().len(), 2);

    let (status, size) = app
        .admin(
            Method::PUT,
            &format!("/api/v1/products/variants/{}/stock", variant_id),
            Some(json!({ "size": "L", "stock": 6 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{size}");
    assert_eq!(app.stock(variant_id, "L").await, 6);

    let (status, _) = app
        .admin(
            Method::PUT,
            &format!("/api/v1/products/variants/{}/stock", variant_id),
            Some(json!({ "size": "L", "stock": -1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, listing) = app.get("/api/v1/products").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["data"]["pagination"]["total"], 1);

    let (status, _) = app
        .admin(Method::DELETE, &format!("/api/v1/products/{}", product_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = app.get("/api/v1/products").await;
    assert_eq!(listing["data"]["pagination"]["total"], 0);
}

#[tokio::test]
async fn product_names_are_unique() {
    let app = TestApp::new().await;
    let body = json!({ "name": "Alpaca Sweater", "price": "180" });

    let (status, _) = app.admin(Method::POST, "/api/v1/products", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.admin(Method::POST, "/api/v1/products", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn catalog_writes_need_a_token() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post("/api/v1/products", json!({ "name": "Anonymous", "price": "10" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Forged", "price": "10" })),
            Some("not.a.jwt"),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn permissions_are_checked_per_route_group() {
    let app = TestApp::new().await;
    let reader = app.token_with(&[perm::ORDERS_READ]);

    let (status, _) = app
        .request(Method::GET, "/api/v1/orders", None, Some(&reader))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Nope", "price": "10" })),
            Some(&reader),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::GET, "/api/v1/coupons", None, Some(&reader))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let manager = app.token_with(&[perm::PRODUCTS_MANAGE]);
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Allowed", "price": "10" })),
            Some(&manager),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn public_reads_and_checkout_need_no_token() {
    let app = TestApp::new().await;
    for uri in ["/api/v1/products", "/api/v1/categories", "/api/v1/offers", "/api/v1/status", "/api/v1/health"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}: {body}");
        assert_eq!(body["success"], true);
    }

    let (status, _) = app.get("/api/v1/orders").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn categories_and_subcategories() {
    let app = TestApp::new().await;

    let (status, category) = app
        .admin(
            Method::POST,
            "/api/v1/categories",
            Some(json!({ "name": "Outerwear", "description": "Coats and jackets" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{category}");
    let category_id = id_of(&category["data"]["id"]);

    let (status, subcategory) = app
        .admin(
            Method::POST,
            "/api/v1/subcategories",
            Some(json!({ "name": "Parkas", "description": "Insulated" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{subcategory}");
    let subcategory_id = id_of(&subcategory["data"]["id"]);

    let (status, detail) = app
        .admin(
            Method::PUT,
            &format!("/api/v1/categories/{}/subcategories/{}", category_id, subcategory_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{detail}");
    assert_eq!(detail["data"]["subcategories"][0]["name"], "Parkas");

    let (status, _) = app
        .admin(
            Method::DELETE,
            &format!("/api/v1/subcategories/{}", subcategory_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The link goes with the subcategory
    let (_, detail) = app.get(&format!("/api/v1/categories/{}", category_id)).await;
    assert!(detail["data"]["subcategories"].as_array().unwrap().is_empty());

    let (status, _) = app
        .admin(
            Method::DELETE,
            &format!("/api/v1/subcategories/{}", subcategory_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .admin(
            Method::POST,
            "/api/v1/categories",
            Some(json!({ "name": "Outerwear", "description": "Again" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn responses_carry_the_request_id() {
    let app = TestApp::new().await;
    let (status, body) = app.get(&format!("/api/v1/products/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["request_id"].as_str().is_some_and(|id| !id.is_empty()));
}
