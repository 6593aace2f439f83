//! Stories, BRDs, diagrams, groups, notifications, permissions and the dashboard

mod common;

use axum::http::StatusCode;
use common::spawn_app;
use serde_json::json;

#[tokio::test]
async fn test_story_crud_and_isolation() {
    let app = spawn_app().await;
    let (owner, _) = app.register("owner@example.com").await;
    let (stranger, _) = app.register("stranger@example.com").await;

    let id = app.create_story(&owner, "Reset password").await;

    let (status, story) = app.get(&format!("/api/user-stories/{}", id), &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(story["acceptance_criteria"], "first\nsecond");
    assert_eq!(story["priority"], "High");

    let (status, _) = app
        .get(&format!("/api/user-stories/{}", id), &stranger)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, updated) = app
        .put(
            &format!("/api/user-stories/{}", id),
            &owner,
            json!({ "status": "in_progress", "tags": ["auth"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "in_progress");
    assert_eq!(updated["title"], "Reset password");
    assert_eq!(updated["tags"], json!(["auth"]));

    app.create_story(&owner, "Export invoices").await;
    let (_, listed) = app.get("/api/user-stories?search=invoice", &owner).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, listed) = app.get("/api/user-stories", &stranger).await;
    assert!(listed.as_array().unwrap().is_empty());

    let (status, _) = app
        .post("/api/user-stories", &owner, json!({ "title": "  " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .delete(&format!("/api/user-stories/{}", id), &owner)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/user-stories/{}", id), &owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_brd_versions_comments_and_export() {
    let app = spawn_app().await;
    let (owner, _) = app.register("writer@example.com").await;
    let (reviewer, _) = app.register("reviewer@example.com").await;

    let (status, brd) = app
        .post(
            "/api/brd",
            &owner,
            json!({ "title": "Checkout BRD", "content": "v1" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(brd["version"], 1);
    assert_eq!(brd["status"], "draft");
    let id = brd["id"].as_str().unwrap().to_string();

    let (status, _) = app.post("/api/brd", &owner, json!({ "content": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, updated) = app
        .put(&format!("/api/brd/{}", id), &owner, json!({ "content": "v2" }))
        .await;
    assert_eq!(updated["version"], 2);

    // Status alone does not bump the version
    let (_, updated) = app
        .put(&format!("/api/brd/{}", id), &owner, json!({ "status": "review" }))
        .await;
    assert_eq!(updated["version"], 2);
    assert_eq!(updated["status"], "review");

    let (_, versions) = app.get(&format!("/api/brd/{}/versions", id), &owner).await;
    let numbers: Vec<i64> = versions
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["version_number"].as_i64().unwrap())
        .collect();
    assert!(numbers.contains(&2));

    let (status, v2) = app
        .get(&format!("/api/brd/{}/versions/2", id), &owner)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v2["content"], "v2");

    let (_, list) = app.get("/api/brd?limit=500", &owner).await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["data"].as_array().unwrap().len(), 1);

    let (status, comment) = app
        .post(
            &format!("/api/brd/{}/comments", id),
            &reviewer,
            json!({ "content": "Needs SLAs", "sectionId": "nfr" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = comment["id"].as_i64().unwrap();

    let (_, comments) = app.get(&format!("/api/brd/{}/comments", id), &owner).await;
    assert_eq!(comments.as_array().unwrap().len(), 1);

    let (status, _) = app
        .delete(&format!("/api/brd/{}/comments/{}", id, comment_id), &owner)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .delete(&format!("/api/brd/{}/comments/{}", id, comment_id), &reviewer)
        .await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .client
        .get(app.url(&format!("/api/brd/{}/export-text", id)))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("Checkout_BRD.txt"));
    let text = response.text().await.unwrap();
    assert!(text.starts_with("Checkout BRD\n\nGenerated: "));
    assert!(text.ends_with("v2"));

    let (status, _) = app.get(&format!("/api/brd/{}", id), &reviewer).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete(&format!("/api/brd/{}", id), &owner).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/brd/{}", id), &owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_diagram_crud() {
    let app = spawn_app().await;
    let (token, _) = app.register("diagrams@example.com").await;

    let (status, diagram) = app
        .post(
            "/api/diagrams",
            &token,
            json!({ "title": "Login flow", "type": "sequence", "content": "sequenceDiagram\nA->>B: hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(diagram["diagram_type"], "sequence");
    let id = diagram["id"].as_i64().unwrap();

    app.post(
        "/api/diagrams",
        &token,
        json!({ "title": "Entities", "type": "er", "content": "erDiagram" }),
    )
    .await;

    let (_, listed) = app.get("/api/diagrams?type=er", &token).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, updated) = app
        .put(
            &format!("/api/diagrams/{}", id),
            &token,
            json!({ "title": "Login flow v2" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Login flow v2");
    assert_eq!(updated["diagram_type"], "sequence");

    let (status, _) = app.delete(&format!("/api/diagrams/{}", id), &token).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/diagrams/{}", id), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_groups_and_member_notification() {
    let app = spawn_app().await;
    let (admin, _) = app.register_as("lead@example.com", "admin").await;
    let (member, member_id) = app.register("member@example.com").await;

    let (status, _) = app
        .post("/api/groups", &member, json!({ "name": "Not allowed" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, group) = app
        .post(
            "/api/groups",
            &admin,
            json!({ "name": "Payments", "description": "Checkout squad" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_i64().unwrap();

    let (status, _) = app
        .post(
            &format!("/api/groups/{}/members", group_id),
            &admin,
            json!({ "userId": member_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, mine) = app.get("/api/groups/my-groups", &member).await;
    assert!(mine.to_string().contains("Payments"));

    let (_, notifications) = app.get("/api/notifications?unreadOnly=true", &member).await;
    let notifications = notifications.as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["type"], "GROUP_MEMBER_ADDED");
    assert_eq!(
        notifications[0]["message"],
        "You were added to group \"Payments\""
    );
    let notification_id = notifications[0]["id"].as_i64().unwrap();

    let (_, count) = app.get("/api/notifications/unread-count", &member).await;
    assert_eq!(count["count"], 1);

    app.post(
        &format!("/api/notifications/read/{}", notification_id),
        &member,
        json!({}),
    )
    .await;
    let (_, count) = app.get("/api/notifications/unread-count", &member).await;
    assert_eq!(count["count"], 0);

    let (status, _) = app
        .delete(
            &format!("/api/groups/{}/members/{}", group_id, member_id),
            &admin,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.delete(&format!("/api/groups/{}", group_id), &admin).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bulk_notifications_and_templates() {
    let app = spawn_app().await;
    let (admin, _) = app.register_as("ops@example.com", "admin").await;
    let (analyst, analyst_id) = app.register("reader@example.com").await;
    let (viewer, _) = app.register_as("viewer@example.com", "viewer").await;

    let (status, _) = app.get("/api/notifications/admin/settings", &analyst).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, targets) = app.get("/api/notifications/admin/targets", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(targets["users"].as_array().unwrap().len(), 3);
    assert_eq!(targets["roles"], json!(["admin", "analyst", "viewer"]));

    let (status, body) = app
        .post(
            "/api/notifications/admin/send-bulk",
            &admin,
            json!({ "message": "Maintenance at noon", "target_type": "role", "target_value": "viewer" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sent"], 1);

    let (_, received) = app.get("/api/notifications", &viewer).await;
    assert_eq!(received[0]["type"], "SYSTEM_ANNOUNCEMENT");
    assert_eq!(received[0]["message"], "Maintenance at noon");
    let (_, received) = app.get("/api/notifications", &analyst).await;
    assert!(received.as_array().unwrap().is_empty());

    let (status, _) = app
        .post(
            "/api/notifications/admin/send-bulk",
            &admin,
            json!({ "message": "Hi", "target_type": "planet" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Disabled types are skipped entirely
    let (status, _) = app
        .put(
            "/api/notifications/admin/settings",
            &admin,
            json!({ "type": "GROUP_MEMBER_ADDED", "is_enabled_in_app": false, "is_enabled_email": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, group) = app
        .post("/api/groups", &admin, json!({ "name": "Quiet" }))
        .await;
    app.post(
        &format!("/api/groups/{}/members", group["id"]),
        &admin,
        json!({ "userId": analyst_id }),
    )
    .await;
    let (_, count) = app.get("/api/notifications/unread-count", &analyst).await;
    assert_eq!(count["count"], 0);

    let (status, _) = app
        .put(
            "/api/notifications/admin/templates",
            &admin,
            json!([{ "type": "USER_LOGIN", "subject_template": "Hello", "message_template": "Welcome back via {{ip_address}} {{unknown}}" }]),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, login) = app.login("reader@example.com", common::PASSWORD).await;
    let token = login["token"].as_str().unwrap();
    let (_, received) = app.get("/api/notifications", token).await;
    let message = received[0]["message"].as_str().unwrap();
    assert!(message.starts_with("Welcome back via "));
    assert!(message.ends_with("{{unknown}}"));
}

#[tokio::test]
async fn test_permission_checks_and_overrides() {
    let app = spawn_app().await;
    let (admin, _) = app.register_as("perm-admin@example.com", "admin").await;
    let (viewer, _) = app.register_as("perm-viewer@example.com", "viewer").await;

    let (_, check) = app
        .get("/api/permissions/check?resource=user_stories&action=create", &viewer)
        .await;
    assert_eq!(check["hasPermission"], false);

    let (status, _) = app.get("/api/permissions/all", &viewer).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let row = json!({ "role": "viewer", "resource": "user_stories", "action": "create" });
    let (status, _) = app.post("/api/permissions", &admin, row.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.post("/api/permissions", &admin, row.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, check) = app
        .get("/api/permissions/check?resource=user_stories&action=create", &viewer)
        .await;
    assert_eq!(check["hasPermission"], true);

    // Custom rows replace the built-in actions for that resource
    let (_, mine) = app.get("/api/permissions/my-permissions", &viewer).await;
    assert_eq!(mine["permissions"]["user_stories"], json!(["create"]));

    let (status, _) = app
        .post("/api/user-stories", &viewer, json!({ "title": "Granted" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.delete_json("/api/permissions", &admin, row.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.delete_json("/api/permissions", &admin, row).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(
            "/api/permissions",
            &admin,
            json!({ "role": "guest", "resource": "brds", "action": "read" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, accessible) = app.get("/api/permissions/accessible", &viewer).await;
    let resources = accessible["resources"].as_array().unwrap();
    assert!(resources.iter().any(|r| r == "brds"));
    assert!(!resources.iter().any(|r| r == "audit_logs"));
}

#[tokio::test]
async fn test_dashboard_stats() {
    let app = spawn_app().await;
    let (token, _) = app.register("stats@example.com").await;
    app.create_story(&token, "One").await;
    app.create_story(&token, "Two").await;
    app.post("/api/brd", &token, json!({ "title": "Doc" })).await;

    let (status, stats) = app.get("/api/dashboard/stats", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["stories"], 2);
    assert_eq!(stats["brds"], 1);
    assert_eq!(stats["diagrams"], 0);
}

#[tokio::test]
async fn test_cors_preflight_for_configured_origin() {
    let app = spawn_app().await;

    let response = app
        .client
        .request(reqwest::Method::OPTIONS, app.url("/api/auth/login"))
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:3000"
    );
}
