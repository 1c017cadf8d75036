//! Order creation, mutation, cancellation and the read projections.

mod common;

use assert_matches::assert_matches;
use common::*;
use marketplace_orders::{
    errors::ServiceError,
    models::OrderStatus,
    repositories::OrderRepository,
    services::orders::{
        CreateOrderRequest, OrderDetailsFilter, SellerOrderFilter, TopSellingFilter,
        UpdateOrderRequest,
    },
};
use rstest::rstest;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};

// ==================== Creation ====================

#[tokio::test]
async fn create_order_derives_total_and_links_item() {
    let app = TestApp::new().await;

    let order = app.place_order(BUYER, MUG, 3, dec!(12.50)).await;

    assert_eq!(order.total, dec!(37.50));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.buyer_id, BUYER);
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].order_id, order.id);
    assert_eq!(order.items[0].quantity, 3);

    let stored = app.stored_order(&order.id).await.unwrap();
    assert_eq!(stored.total, dec!(37.50));
}

#[tokio::test]
async fn create_order_honours_requested_status() {
    let app = TestApp::new().await;
    let request = CreateOrderRequest {
        status: Some("processing".into()),
        ..TestApp::order_request(MUG, 1, dec!(4.25))
    };

    let order = app
        .orders()
        .create_order(&TestApp::principal(BUYER), request)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
async fn failed_item_insert_rolls_back_the_order() {
    let app = TestApp::new().await;

    let result = app
        .orders()
        .create_order(
            &TestApp::principal(BUYER),
            TestApp::order_request("SKU-UNKNOWN", 1, dec!(4.25)),
        )
        .await;

    assert_matches!(result, Err(ServiceError::DatabaseError(_)));
    let orders = marketplace_orders::models::Order::find()
        .count(app.db())
        .await
        .unwrap();
    assert_eq!(orders, 0);
}

#[tokio::test]
async fn only_buyers_and_admins_create_orders() {
    let app = TestApp::new().await;

    for user in [SELLER, SHIPPER] {
        let result = app
            .orders()
            .create_order(&TestApp::principal(user), TestApp::order_request(MUG, 1, dec!(4.25)))
            .await;
        assert_matches!(result, Err(ServiceError::Forbidden(_)));
    }

    let order = app
        .orders()
        .create_order(&TestApp::principal(ADMIN), TestApp::order_request(MUG, 1, dec!(4.25)))
        .await
        .unwrap();
    assert_eq!(order.buyer_id, ADMIN);
}

#[tokio::test]
async fn total_tracks_every_line_item() {
    let app = TestApp::new().await;
    let order = app.place_order(BUYER, MUG, 2, dec!(12.50)).await;

    app.add_item("extra-1", &order.id, LAMP, 1, dec!(25.5)).await;

    let recomputed = OrderRepository::recompute_total(app.db(), &order.id)
        .await
        .unwrap();
    let stored = app
        .orders()
        .get_order_total(&TestApp::principal(BUYER), &order.id)
        .await
        .unwrap();
    assert_eq!(recomputed, dec!(50.5));
    assert_eq!(stored, recomputed);

    let full = app
        .orders()
        .get_order(&TestApp::principal(BUYER), &order.id)
        .await
        .unwrap();
    assert_eq!(full.items.len(), 2);
}

#[tokio::test]
async fn buyer_listing_round_trips_created_order() {
    let app = TestApp::new().await;
    let created = app.place_order(BUYER, MUG, 2, dec!(4.25)).await;
    app.place_order(OTHER_BUYER, LAMP, 1, dec!(25.5)).await;

    let mine = app
        .orders()
        .list_my_orders(&TestApp::principal(BUYER))
        .await
        .unwrap();

    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, created.id);
    assert_eq!(mine[0].status, created.status);
    assert_eq!(mine[0].total, created.total);
    assert_eq!(mine[0].address, created.address);
}

// ==================== Updates ====================

#[tokio::test]
async fn owner_changes_address_while_order_is_open() {
    let app = TestApp::new().await;
    let order = app.place_order(BUYER, MUG, 1, dec!(4.25)).await;

    let updated = app
        .orders()
        .update_order(
            &TestApp::principal(BUYER),
            &order.id,
            UpdateOrderRequest {
                new_status: None,
                new_address: Some("10 Downing Street".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.address, "10 Downing Street");
    assert_eq!(updated.status, OrderStatus::Pending);
    assert_eq!(updated.total, dec!(4.25));
}

#[tokio::test]
async fn update_rejections() {
    let app = TestApp::new().await;
    let order = app.place_order(BUYER, MUG, 1, dec!(4.25)).await;
    let address = || UpdateOrderRequest {
        new_status: None,
        new_address: Some("Elsewhere 5".into()),
    };

    assert_matches!(
        app.orders()
            .update_order(&TestApp::principal(OTHER_BUYER), &order.id, address())
            .await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        app.orders()
            .update_order(&TestApp::principal(BUYER), "missing", address())
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.orders()
            .update_order(&TestApp::principal(BUYER), &order.id, UpdateOrderRequest::default())
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        app.orders()
            .update_order(
                &TestApp::principal(BUYER),
                &order.id,
                UpdateOrderRequest {
                    new_status: Some("Delivered".into()),
                    new_address: None,
                },
            )
            .await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn address_is_frozen_once_dispatched() {
    let app = TestApp::new().await;
    let order_id = app.order_in(OrderStatus::Dispatched).await;

    let result = app
        .orders()
        .update_order(
            &TestApp::principal(BUYER),
            &order_id,
            UpdateOrderRequest {
                new_status: None,
                new_address: Some("Too Late 1".into()),
            },
        )
        .await;

    assert_matches!(
        result,
        Err(ServiceError::InvalidState { actual: OrderStatus::Dispatched, .. })
    );
}

#[tokio::test]
async fn admin_update_may_set_any_status() {
    let app = TestApp::new().await;
    let order_id = app.order_in(OrderStatus::Delivered).await;

    let updated = app
        .orders()
        .update_order(
            &TestApp::principal(ADMIN),
            &order_id,
            UpdateOrderRequest {
                new_status: Some("Shipped".into()),
                new_address: Some("Returned Depot 3".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, OrderStatus::Shipped);
    assert_eq!(updated.address, "Returned Depot 3");
}

#[rstest]
#[case::dispatched("Dispatched")]
#[case::delivering("Delivering")]
#[tokio::test]
async fn update_cannot_skip_the_claim(#[case] target: &str) {
    let app = TestApp::new().await;
    let order_id = app.order_in(OrderStatus::Processing).await;

    let result = app
        .orders()
        .update_order(
            &TestApp::principal(ADMIN),
            &order_id,
            UpdateOrderRequest {
                new_status: Some(target.into()),
                new_address: None,
            },
        )
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
    assert_eq!(
        app.stored_order(&order_id).await.unwrap().status,
        OrderStatus::Processing
    );
    assert!(app.claims(&order_id).await.is_empty());

    // The order can still be claimed and driven normally.
    app.lifecycle()
        .claim_order(&TestApp::principal(SHIPPER), &order_id)
        .await
        .unwrap();
    app.lifecycle()
        .start_delivery(&TestApp::principal(SHIPPER), &order_id)
        .await
        .unwrap();
}

// ==================== Deletion ====================

#[tokio::test]
async fn deleting_open_order_removes_its_items() {
    let app = TestApp::new().await;
    let order = app.place_order(BUYER, MUG, 1, dec!(4.25)).await;
    app.add_item("extra-1", &order.id, LAMP, 2, dec!(25.5)).await;

    let deleted = app
        .orders()
        .delete_order(&TestApp::principal(BUYER), &order.id)
        .await
        .unwrap();

    assert_eq!(deleted.id, order.id);
    assert!(app.stored_order(&order.id).await.is_none());
    assert_eq!(app.item_count(&order.id).await, 0);
}

#[tokio::test]
async fn delete_checks_existence_then_owner_then_status() {
    let app = TestApp::new().await;
    let delivering = app.order_in(OrderStatus::Delivering).await;

    assert_matches!(
        app.orders()
            .delete_order(&TestApp::principal(BUYER), "missing")
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.orders()
            .delete_order(&TestApp::principal(OTHER_BUYER), &delivering)
            .await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        app.orders()
            .delete_order(&TestApp::principal(BUYER), &delivering)
            .await,
        Err(ServiceError::InvalidState { expected, actual: OrderStatus::Delivering })
            if expected == OrderStatus::CANCELLABLE.to_vec()
    );
    assert!(app.stored_order(&delivering).await.is_some());
}

#[tokio::test]
async fn admin_cancels_any_open_order_with_its_claim() {
    let app = TestApp::new().await;
    let order_id = app.order_in(OrderStatus::Dispatched).await;
    app.force_status(&order_id, OrderStatus::Processing).await;

    app.orders()
        .delete_order(&TestApp::principal(ADMIN), &order_id)
        .await
        .unwrap();

    assert!(app.stored_order(&order_id).await.is_none());
    assert!(app.claims(&order_id).await.is_empty());
}

// ==================== Reads ====================

#[tokio::test]
async fn single_order_is_hidden_from_other_buyers() {
    let app = TestApp::new().await;
    let order = app.place_order(BUYER, MUG, 1, dec!(4.25)).await;

    assert_matches!(
        app.orders()
            .get_order(&TestApp::principal(OTHER_BUYER), &order.id)
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.orders()
            .get_order_total(&TestApp::principal(OTHER_BUYER), &order.id)
            .await,
        Err(ServiceError::NotFound(_))
    );
    let seen = app
        .orders()
        .get_order(&TestApp::principal(ADMIN), &order.id)
        .await
        .unwrap();
    assert_eq!(seen.id, order.id);
}

#[tokio::test]
async fn order_details_are_scoped_by_role() {
    let app = TestApp::new().await;
    let mug = app.place_order(BUYER, MUG, 1, dec!(4.25)).await;
    let lamp = app.place_order(OTHER_BUYER, LAMP, 1, dec!(25.5)).await;
    let claimed = app.order_in(OrderStatus::Dispatched).await;

    let ids = |rows: Vec<marketplace_orders::queries::order_queries::OrderDetailsRow>| {
        let mut ids: Vec<String> = rows.into_iter().map(|r| r.id).collect();
        ids.sort();
        ids
    };
    let sorted = |mut v: Vec<String>| {
        v.sort();
        v
    };

    let buyer = app
        .orders()
        .order_details(&TestApp::principal(BUYER), OrderDetailsFilter::default())
        .await
        .unwrap();
    assert!(buyer.iter().all(|row| row.buyer_id == BUYER));
    assert_eq!(buyer[0].username, "ada");
    assert_eq!(buyer[0].full_name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(ids(buyer), sorted(vec![mug.id.clone(), claimed.clone()]));

    let seller = app
        .orders()
        .order_details(&TestApp::principal(OTHER_SELLER), OrderDetailsFilter::default())
        .await
        .unwrap();
    assert_eq!(ids(seller), vec![lamp.id.clone()]);

    let shipper = app
        .orders()
        .order_details(&TestApp::principal(SHIPPER), OrderDetailsFilter::default())
        .await
        .unwrap();
    assert_eq!(ids(shipper), vec![claimed.clone()]);

    let admin = app
        .orders()
        .order_details(&TestApp::principal(ADMIN), OrderDetailsFilter::default())
        .await
        .unwrap();
    assert_eq!(admin.len(), 3);
}

#[tokio::test]
async fn order_details_filter_by_status_and_item_count() {
    let app = TestApp::new().await;
    let single = app.place_order(BUYER, MUG, 1, dec!(4.25)).await;
    let multi = app.place_order(BUYER, MUG, 1, dec!(4.25)).await;
    app.add_item("extra-1", &multi.id, LAMP, 1, dec!(25.5)).await;
    app.force_status(&single.id, OrderStatus::Processing).await;
    let admin = TestApp::principal(ADMIN);

    let processing = app
        .orders()
        .order_details(
            &admin,
            OrderDetailsFilter {
                status: Some("Processing".into()),
                min_items: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(processing.len(), 1);
    assert_eq!(processing[0].id, single.id);

    let large = app
        .orders()
        .order_details(
            &admin,
            OrderDetailsFilter {
                status: None,
                min_items: Some(2),
            },
        )
        .await
        .unwrap();
    assert_eq!(large.len(), 1);
    assert_eq!(large[0].id, multi.id);

    // Thresholds past i64::MAX saturate instead of wrapping negative.
    let none = app
        .orders()
        .order_details(
            &admin,
            OrderDetailsFilter {
                status: None,
                min_items: Some(u64::MAX),
            },
        )
        .await
        .unwrap();
    assert!(none.is_empty());

    assert_matches!(
        app.orders()
            .order_details(
                &admin,
                OrderDetailsFilter {
                    status: Some("Lost".into()),
                    min_items: None,
                },
            )
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn top_selling_counts_delivered_orders_only() {
    let app = TestApp::new().await;
    let delivered = app.order_in(OrderStatus::Delivered).await;
    app.add_item("extra-1", &delivered, MUG, 4, dec!(12.50)).await;
    app.add_item("extra-2", &delivered, LAMP, 2, dec!(25.5)).await;
    app.place_order(BUYER, LAMP, 9, dec!(25.5)).await;
    let admin = TestApp::principal(ADMIN);

    let report = app
        .orders()
        .top_selling_products(&admin, TopSellingFilter::default())
        .await
        .unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report[0].barcode, MUG);
    assert_eq!(report[0].name, "Ceramic Mug");
    assert_eq!(report[0].total_quantity_sold, 5);
    assert_eq!(report[1].barcode, LAMP);
    assert_eq!(report[1].total_quantity_sold, 2);

    let at_least_three = app
        .orders()
        .top_selling_products(
            &admin,
            TopSellingFilter {
                min_quantity: Some(3),
                seller_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(at_least_three.len(), 1);

    let lamps = app
        .orders()
        .top_selling_products(
            &admin,
            TopSellingFilter {
                min_quantity: None,
                seller_id: Some(OTHER_SELLER.into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(lamps.len(), 1);
    assert_eq!(lamps[0].seller_id, OTHER_SELLER);
}

#[tokio::test]
async fn top_selling_is_scoped_to_the_requesting_seller() {
    let app = TestApp::new().await;
    let delivered = app.order_in(OrderStatus::Delivered).await;
    app.add_item("extra-1", &delivered, LAMP, 2, dec!(25.5)).await;

    let own = app
        .orders()
        .top_selling_products(&TestApp::principal(SELLER), TopSellingFilter::default())
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].barcode, MUG);
    assert_eq!(own[0].seller_id, SELLER);

    assert_matches!(
        app.orders()
            .top_selling_products(
                &TestApp::principal(SELLER),
                TopSellingFilter {
                    min_quantity: None,
                    seller_id: Some(OTHER_SELLER.into()),
                },
            )
            .await,
        Err(ServiceError::Forbidden(_))
    );

    for user in [BUYER, SHIPPER] {
        let report = app
            .orders()
            .top_selling_products(&TestApp::principal(user), TopSellingFilter::default())
            .await
            .unwrap();
        assert!(report.is_empty(), "{} saw {:?}", user, report);
    }
}

#[tokio::test]
async fn seller_listing_summarises_items_and_paginates() {
    let app = TestApp::new().await;
    let first = app.place_order(BUYER, MUG, 1, dec!(4.25)).await;
    app.add_item("item-extra", &first.id, LAMP, 1, dec!(25.5)).await;
    app.place_order(OTHER_BUYER, MUG, 2, dec!(4.25)).await;
    app.place_order(OTHER_BUYER, LAMP, 2, dec!(25.5)).await;
    let seller = TestApp::principal(SELLER);

    let all = app
        .orders()
        .seller_orders(&seller, SellerOrderFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let with_lamp = all.iter().find(|o| o.id == first.id).unwrap();
    assert_eq!(with_lamp.item_count, 2);
    assert_eq!(with_lamp.product_names, "Ceramic Mug (Blue), Desk Lamp (Large)");
    assert_eq!(with_lamp.buyer_name, "Ada Lovelace");

    let other = all.iter().find(|o| o.id != first.id).unwrap();
    assert_eq!(other.buyer_name, "grace");

    let searched = app
        .orders()
        .seller_orders(
            &seller,
            SellerOrderFilter {
                search: Some("Lovelace".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].id, first.id);

    let page = app
        .orders()
        .seller_orders(
            &seller,
            SellerOrderFilter {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn seller_listing_scope() {
    let app = TestApp::new().await;
    app.place_order(BUYER, LAMP, 1, dec!(25.5)).await;

    assert_matches!(
        app.orders()
            .seller_orders(
                &TestApp::principal(SELLER),
                SellerOrderFilter {
                    seller_id: Some(OTHER_SELLER.into()),
                    ..Default::default()
                },
            )
            .await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        app.orders()
            .seller_orders(&TestApp::principal(ADMIN), SellerOrderFilter::default())
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        app.orders()
            .seller_orders(&TestApp::principal(BUYER), SellerOrderFilter::default())
            .await,
        Err(ServiceError::Forbidden(_))
    );

    let for_admin = app
        .orders()
        .seller_orders(
            &TestApp::principal(ADMIN),
            SellerOrderFilter {
                seller_id: Some(OTHER_SELLER.into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(for_admin.len(), 1);
}
