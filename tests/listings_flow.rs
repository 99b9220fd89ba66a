mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{json_body, TestApp};
use listing_vault::store::ListingCatalog;
use serde_json::{json, Value};

#[tokio::test]
async fn starting_an_offer_below_the_regular_price_notifies_subscribers() -> Result<()> {
    let app = TestApp::new()?;
    let owner = app.create_user("owner").await;
    let watcher = app.create_user("watcher").await;
    let listing = app.create_listing(&owner, "Harbor loft", 100_000).await;
    let path = format!("/api/listings/{}", listing.id);

    let subscribed = app
        .post_empty(&format!("{path}/subscription"), Some(&app.token_for(&watcher)))
        .await?;
    assert_eq!(subscribed.status(), StatusCode::CREATED);

    let response = app
        .patch_json(
            &path,
            &json!({ "discount_price": 90_000, "offer": true }),
            Some(&app.token_for(&owner)),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await?;
    assert_eq!(body["events"], json!(["price_drop"]));
    assert_eq!(body["subscribers_notified"], 1);

    let notes = app.store.all_notifications().await;
    assert_eq!(notes.len(), 1);
    let note = &notes[0];
    assert_eq!(note.recipient_id, watcher.id);
    assert_eq!(note.kind, "price_drop");
    assert_eq!(note.meta["old_price"], 100_000);
    assert_eq!(note.meta["new_price"], 90_000);
    assert_eq!(app.push.events_for(watcher.id).await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unchanged_effective_price_sends_nothing() -> Result<()> {
    let app = TestApp::new()?;
    let owner = app.create_user("owner").await;
    let watcher = app.create_user("watcher").await;
    let listing = app.create_listing(&owner, "Mews house", 100_000).await;
    let path = format!("/api/listings/{}", listing.id);
    app.post_empty(&format!("{path}/subscription"), Some(&app.token_for(&watcher)))
        .await?;

    // A discount without an offer does not change what buyers pay.
    let response = app
        .patch_json(
            &path,
            &json!({ "discount_price": 80_000 }),
            Some(&app.token_for(&owner)),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.all_notifications().await.is_empty());

    let updated = app.store.find_listing(listing.id).await?.expect("listing");
    assert_eq!(updated.discount_price, Some(80_000));
    assert_eq!(updated.updated_at, app.clock_now());
    Ok(())
}

#[tokio::test]
async fn sold_status_and_price_increase_are_separate_events() -> Result<()> {
    let app = TestApp::new()?;
    let owner = app.create_user("owner").await;
    let watcher = app.create_user("watcher").await;
    let listing = app.create_listing(&owner, "Granary", 200_000).await;
    let path = format!("/api/listings/{}", listing.id);
    app.post_empty(&format!("{path}/subscription"), Some(&app.token_for(&watcher)))
        .await?;

    let response = app
        .patch_json(
            &path,
            &json!({ "regular_price": 210_000, "status": "sold" }),
            Some(&app.token_for(&owner)),
        )
        .await?;
    let body: Value = json_body(response).await?;
    assert_eq!(body["events"], json!(["price_increase", "sold"]));

    let mut kinds: Vec<String> = app
        .store
        .all_notifications()
        .await
        .into_iter()
        .map(|note| note.kind)
        .collect();
    kinds.sort();
    assert_eq!(kinds, ["price_increase", "sold"]);
    Ok(())
}

#[tokio::test]
async fn subscription_is_idempotent_and_can_be_dropped() -> Result<()> {
    let app = TestApp::new()?;
    let owner = app.create_user("owner").await;
    let watcher = app.create_user("watcher").await;
    let listing = app.create_listing(&owner, "Boathouse", 300_000).await;
    let path = format!("/api/listings/{}", listing.id);
    let token = app.token_for(&watcher);

    let first = app.post_empty(&format!("{path}/subscription"), Some(&token)).await?;
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = app.post_empty(&format!("{path}/subscription"), Some(&token)).await?;
    assert_eq!(second.status(), StatusCode::OK);

    let dropped = app.delete(&format!("{path}/subscription"), Some(&token)).await?;
    assert_eq!(dropped.status(), StatusCode::OK);
    let body: Value = json_body(dropped).await?;
    assert_eq!(body["changed"], true);

    app.patch_json(
        &path,
        &json!({ "regular_price": 250_000 }),
        Some(&app.token_for(&owner)),
    )
    .await?;
    assert!(app.store.all_notifications().await.is_empty());

    let missing = app
        .post_empty(
            &format!("/api/listings/{}/subscription", uuid::Uuid::new_v4()),
            Some(&token),
        )
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn only_owner_or_admin_can_edit() -> Result<()> {
    let app = TestApp::new()?;
    let owner = app.create_user("owner").await;
    let stranger = app.create_user("stranger").await;
    let admin = app.create_admin("mod").await;
    let listing = app.create_listing(&owner, "Chapel", 500_000).await;
    let path = format!("/api/listings/{}", listing.id);

    let forbidden = app
        .patch_json(
            &path,
            &json!({ "regular_price": 1 }),
            Some(&app.token_for(&stranger)),
        )
        .await?;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let empty = app
        .patch_json(&path, &json!({}), Some(&app.token_for(&owner)))
        .await?;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let negative = app
        .patch_json(
            &path,
            &json!({ "regular_price": -5 }),
            Some(&app.token_for(&owner)),
        )
        .await?;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    let by_admin = app
        .patch_json(
            &path,
            &json!({ "status": "pending" }),
            Some(&app.token_for(&admin)),
        )
        .await?;
    assert_eq!(by_admin.status(), StatusCode::OK);
    Ok(())
}
