mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, TimeZone, Utc};
use common::{json_body, TestApp};
use listing_vault::models::ROLE_ADMIN;
use listing_vault::realtime::RealtimeEvent;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct ReportItem {
    notification_id: uuid::Uuid,
    kind: String,
    reporter_name: Option<String>,
    category: Option<String>,
    excerpt: Option<String>,
    copies: usize,
    is_read: bool,
}

#[tokio::test]
async fn message_reports_are_capped_per_calendar_day() -> Result<()> {
    let app = TestApp::new()?;
    let buyer = app.create_user("buyer").await;
    let seller = app.create_user("seller").await;
    app.create_admin("mod").await;
    let conversation = app.create_conversation(&buyer, &seller).await;
    let message = app.create_message(&conversation, &seller, "wire me a deposit").await;
    let token = app.token_for(&buyer);
    let payload = json!({
        "conversation_id": conversation.id,
        "message_id": message.id,
        "reason": "scam",
    });

    for _ in 0..10 {
        let response = app.post_json("/api/reports/messages", &payload, Some(&token)).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        app.clock.advance(Duration::minutes(5));
    }

    let limited = app.post_json("/api/reports/messages", &payload, Some(&token)).await?;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = json_body(limited).await?;
    assert_eq!(body["code"], "rate_limited");
    assert!(body["error"].as_str().unwrap().contains("10"));
    assert_eq!(app.store.report_count().await, 10);

    // Next calendar day (UTC) starts a fresh quota.
    app.clock
        .set(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
    let fresh = app.post_json("/api/reports/messages", &payload, Some(&token)).await?;
    assert_eq!(fresh.status(), StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn chat_reports_use_a_trailing_hour() -> Result<()> {
    let app = TestApp::new()?;
    let buyer = app.create_user("buyer").await;
    let seller = app.create_user("seller").await;
    app.create_admin("mod").await;
    let conversation = app.create_conversation(&buyer, &seller).await;
    let token = app.token_for(&seller);
    let payload = json!({ "conversation_id": conversation.id, "reason": "harassment" });
    let first_report_at = app.clock_now();

    for _ in 0..5 {
        let response = app.post_json("/api/reports/chats", &payload, Some(&token)).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let limited = app.post_json("/api/reports/chats", &payload, Some(&token)).await?;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    app.clock.set(first_report_at + Duration::minutes(59));
    let still_limited = app.post_json("/api/reports/chats", &payload, Some(&token)).await?;
    assert_eq!(still_limited.status(), StatusCode::TOO_MANY_REQUESTS);

    // Reports exactly an hour old no longer count.
    app.clock.set(first_report_at + Duration::hours(1));
    let allowed = app.post_json("/api/reports/chats", &payload, Some(&token)).await?;
    assert_eq!(allowed.status(), StatusCode::CREATED);

    // The other participant has their own quota.
    let other = app
        .post_json("/api/reports/chats", &payload, Some(&app.token_for(&buyer)))
        .await?;
    assert_eq!(other.status(), StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn only_participants_can_report_and_targets_must_exist() -> Result<()> {
    let app = TestApp::new()?;
    let buyer = app.create_user("buyer").await;
    let seller = app.create_user("seller").await;
    let outsider = app.create_user("outsider").await;
    let conversation = app.create_conversation(&buyer, &seller).await;
    let message = app.create_message(&conversation, &seller, "hello").await;

    let outsider_report = app
        .post_json(
            "/api/reports/messages",
            &json!({
                "conversation_id": conversation.id,
                "message_id": message.id,
                "reason": "spam",
            }),
            Some(&app.token_for(&outsider)),
        )
        .await?;
    assert_eq!(outsider_report.status(), StatusCode::FORBIDDEN);

    let missing_message = app
        .post_json(
            "/api/reports/messages",
            &json!({
                "conversation_id": conversation.id,
                "message_id": uuid::Uuid::new_v4(),
                "reason": "spam",
            }),
            Some(&app.token_for(&buyer)),
        )
        .await?;
    assert_eq!(missing_message.status(), StatusCode::NOT_FOUND);

    let missing_conversation = app
        .post_json(
            "/api/reports/chats",
            &json!({ "conversation_id": uuid::Uuid::new_v4(), "reason": "spam" }),
            Some(&app.token_for(&buyer)),
        )
        .await?;
    assert_eq!(missing_conversation.status(), StatusCode::NOT_FOUND);

    let blank_reason = app
        .post_json(
            "/api/reports/chats",
            &json!({ "conversation_id": conversation.id, "reason": "  " }),
            Some(&app.token_for(&buyer)),
        )
        .await?;
    assert_eq!(blank_reason.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn one_report_reaches_every_admin_and_reads_as_one_item() -> Result<()> {
    let app = TestApp::new()?;
    let reporter = app.create_user("reporter").await;
    let seller = app.create_user("seller").await;
    let mut admins = Vec::new();
    for index in 0..4 {
        admins.push(app.create_admin(&format!("admin-{index}")).await);
    }
    admins.push(app.create_super_admin("root").await);
    let suspended = app.create_account("suspended", ROLE_ADMIN, true, true).await;
    let unapproved = app.create_account("unapproved", ROLE_ADMIN, false, false).await;

    let conversation = app.create_conversation(&reporter, &seller).await;
    let message = app
        .create_message(&conversation, &seller, "send the money via gift cards")
        .await;
    let response = app
        .post_json(
            "/api/reports/messages",
            &json!({
                "conversation_id": conversation.id,
                "message_id": message.id,
                "reason": "fraud",
                "details": "asked for gift cards",
            }),
            Some(&app.token_for(&reporter)),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let notes = app.store.all_notifications().await;
    assert_eq!(notes.len(), 5);
    for admin in &admins {
        let copies: Vec<_> = notes.iter().filter(|note| note.recipient_id == admin.id).collect();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].kind, "message_report");
    }
    assert!(notes
        .iter()
        .all(|note| note.recipient_id != suspended.id && note.recipient_id != unapproved.id));
    let group = notes[0].broadcast_group_id.expect("grouped broadcast");
    assert!(notes.iter().all(|note| note.broadcast_group_id == Some(group)));

    let viewer = &admins[2];
    let viewer_token = app.token_for(viewer);
    let listing = app.get("/api/admin/reports", Some(&viewer_token)).await?;
    assert_eq!(listing.status(), StatusCode::OK);
    let items: Vec<ReportItem> = json_body(listing).await?;
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.kind, "message_report");
    assert_eq!(item.copies, 5);
    assert_eq!(item.reporter_name.as_deref(), Some("reporter"));
    assert_eq!(item.category.as_deref(), Some("fraud"));
    assert!(item.excerpt.as_deref().unwrap().contains("gift cards"));
    assert!(!item.is_read);
    let own_copy = notes
        .iter()
        .find(|note| note.recipient_id == viewer.id)
        .unwrap();
    assert_eq!(item.notification_id, own_copy.id);

    let read = app
        .post_empty(
            &format!("/api/notifications/{}/read", own_copy.id),
            Some(&viewer_token),
        )
        .await?;
    assert_eq!(read.status(), StatusCode::OK);
    let outcome: Value = json_body(read).await?;
    assert_eq!(outcome["synced_copies"], 4);

    let notes = app.store.all_notifications().await;
    assert!(notes.iter().all(|note| note.is_read && note.read_at.is_some()));
    for admin in &admins {
        let events = app.push.events_for(admin.id).await;
        assert!(events
            .iter()
            .any(|event| matches!(event, RealtimeEvent::NotificationsRead { .. })));
    }
    Ok(())
}

#[tokio::test]
async fn listing_and_review_reports_have_no_quota() -> Result<()> {
    let app = TestApp::new()?;
    let owner = app.create_user("owner").await;
    let reporter = app.create_user("reporter").await;
    app.create_admin("mod").await;
    let listing = app.create_listing(&owner, "Too good to be true", 1_000).await;
    let review = app.create_review(&listing, &owner, "best place ever, buy now").await;
    let token = app.token_for(&reporter);

    for _ in 0..12 {
        let response = app
            .post_json(
                "/api/reports/listings",
                &json!({ "listing_id": listing.id, "category": "fake" }),
                Some(&token),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let review_report = app
        .post_json(
            "/api/reports/reviews",
            &json!({ "review_id": review.id, "reason": "self review" }),
            Some(&token),
        )
        .await?;
    assert_eq!(review_report.status(), StatusCode::CREATED);

    let missing = app
        .post_json(
            "/api/reports/reviews",
            &json!({ "review_id": uuid::Uuid::new_v4(), "reason": "self review" }),
            Some(&token),
        )
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.store.report_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn report_listing_filters_and_requires_privilege() -> Result<()> {
    let app = TestApp::new()?;
    let owner = app.create_user("owner").await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let admin = app.create_admin("mod").await;
    let listing = app.create_listing(&owner, "Shore cabin", 70_000).await;

    for (user, category) in [(&alice, "misleading photos"), (&bob, "wrong address")] {
        app.post_json(
            "/api/reports/listings",
            &json!({ "listing_id": listing.id, "category": category }),
            Some(&app.token_for(user)),
        )
        .await?;
        app.clock.advance(Duration::minutes(10));
    }

    let forbidden = app
        .get("/api/admin/reports", Some(&app.token_for(&alice)))
        .await?;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let token = app.token_for(&admin);
    let by_reporter: Vec<ReportItem> = json_body(
        app.get("/api/admin/reports?reporter=bob", Some(&token))
            .await?,
    )
    .await?;
    assert_eq!(by_reporter.len(), 1);
    assert_eq!(by_reporter[0].category.as_deref(), Some("wrong address"));

    let searched: Vec<ReportItem> = json_body(
        app.get("/api/admin/reports?q=photos", Some(&token)).await?,
    )
    .await?;
    assert_eq!(searched.len(), 1);

    let oldest_first: Vec<ReportItem> = json_body(
        app.get("/api/admin/reports?sort=date&order=asc", Some(&token))
            .await?,
    )
    .await?;
    assert_eq!(oldest_first[0].reporter_name.as_deref(), Some("alice"));
    Ok(())
}
