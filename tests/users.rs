#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use foodgram::dto::NewUserPayload;
use foodgram::error::ApiError;
use foodgram::routes::users::provision_user;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{auth, json_body, recipe_body, TestDb, PIXEL};

#[actix_web::test]
async fn profiles_and_me() {
    let db = TestDb::new();
    let (anna, anna_token) = db.user("anna");
    db.user("bob");
    let app = test_app!(db.pool);

    let req = test::TestRequest::get().uri("/api/users/me").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(resp).await["detail"],
        "Authentication credentials were not provided."
    );

    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(auth(&anna_token))
        .to_request();
    let me = json_body(test::call_service(&app, req).await).await;
    assert_eq!(
        me,
        json!({
            "id": anna.id,
            "email": "anna@example.org",
            "username": "anna",
            "first_name": "Test",
            "last_name": "Cook",
            "avatar": null,
            "is_subscribed": false,
        })
    );

    let req = test::TestRequest::get().uri("/api/users").to_request();
    let page = json_body(test::call_service(&app, req).await).await;
    assert_eq!(page["count"], 2);
    assert_eq!(page["results"][0]["username"], "anna");
    assert_eq!(page["results"][1]["username"], "bob");

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}", anna.id))
        .to_request();
    assert_eq!(
        json_body(test::call_service(&app, req).await).await["email"],
        "anna@example.org"
    );

    let req = test::TestRequest::get().uri("/api/users/999").to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn subscribing_to_yourself_is_always_rejected() {
    let db = TestDb::new();
    let (anna, token) = db.user("anna");
    let app = test_app!(db.pool);

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri(&format!("/api/users/{}/subscribe", anna.id))
            .insert_header(auth(&token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await,
            json!({ "errors": "You cannot subscribe to yourself." })
        );
    }
}

#[actix_web::test]
async fn subscribe_list_and_unsubscribe() {
    let db = TestDb::new();
    let (anna, anna_token) = db.user("anna");
    let (_, bob_token) = db.user("bob");
    let app = test_app!(db.pool);

    for name in ["Soup", "Stew", "Salad"] {
        let req = test::TestRequest::post()
            .uri("/api/recipes")
            .insert_header(auth(&anna_token))
            .set_json(recipe_body(name, &[(db.ingredient("egg"), 1)]))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::CREATED
        );
    }

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/subscribe?recipes_limit=1", anna.id))
        .insert_header(auth(&bob_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let subscription = json_body(resp).await;
    assert_eq!(subscription["id"], anna.id);
    assert_eq!(subscription["is_subscribed"], true);
    assert_eq!(subscription["recipes_count"], 3);
    assert_eq!(subscription["recipes"].as_array().unwrap().len(), 1);
    assert_eq!(subscription["recipes"][0]["name"], "Salad");

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/subscribe", anna.id))
        .insert_header(auth(&bob_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp).await["errors"],
        "You are already subscribed to this author."
    );

    let req = test::TestRequest::get()
        .uri("/api/users/subscriptions")
        .insert_header(auth(&bob_token))
        .to_request();
    let page = json_body(test::call_service(&app, req).await).await;
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["username"], "anna");
    assert_eq!(page["results"][0]["recipes"].as_array().unwrap().len(), 3);

    let req = test::TestRequest::get()
        .uri("/api/users/subscriptions?recipes_limit=2")
        .insert_header(auth(&bob_token))
        .to_request();
    let page = json_body(test::call_service(&app, req).await).await;
    assert_eq!(page["results"][0]["recipes"].as_array().unwrap().len(), 2);
    assert_eq!(page["results"][0]["recipes_count"], 3);

    // the flag follows the viewer
    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}", anna.id))
        .insert_header(auth(&bob_token))
        .to_request();
    assert_eq!(
        json_body(test::call_service(&app, req).await).await["is_subscribed"],
        true
    );
    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}", anna.id))
        .to_request();
    assert_eq!(
        json_body(test::call_service(&app, req).await).await["is_subscribed"],
        false
    );

    let req = test::TestRequest::get()
        .uri("/api/recipes")
        .insert_header(auth(&bob_token))
        .to_request();
    let recipes = json_body(test::call_service(&app, req).await).await;
    assert_eq!(recipes["results"][0]["author"]["is_subscribed"], true);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/{}/subscribe", anna.id))
        .insert_header(auth(&bob_token))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/{}/subscribe", anna.id))
        .insert_header(auth(&bob_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp).await["errors"],
        "You are not subscribed to this author."
    );

    let req = test::TestRequest::post()
        .uri("/api/users/999/subscribe")
        .insert_header(auth(&bob_token))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );

    // anna never followed bob
    let req = test::TestRequest::get()
        .uri("/api/users/subscriptions")
        .insert_header(auth(&anna_token))
        .to_request();
    let page = json_body(test::call_service(&app, req).await).await;
    assert_eq!(page["count"], 0);
    assert_eq!(page["results"], json!([]));
}

#[actix_web::test]
async fn avatar_upload_and_removal() {
    let db = TestDb::new();
    let (_, token) = db.user("anna");
    let app = test_app!(db.pool);

    let req = test::TestRequest::put()
        .uri("/api/users/me/avatar")
        .insert_header(auth(&token))
        .set_json(json!({ "avatar": "" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp).await,
        json!({ "avatar": ["Image field may not be empty."] })
    );

    let req = test::TestRequest::put()
        .uri("/api/users/me/avatar")
        .insert_header(auth(&token))
        .set_json(json!({ "avatar": PIXEL }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let avatar = json_body(resp).await["avatar"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(avatar.starts_with("/media/") && avatar.ends_with(".png"));

    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(auth(&token))
        .to_request();
    assert_eq!(
        json_body(test::call_service(&app, req).await).await["avatar"],
        Value::String(avatar.clone())
    );

    let req = test::TestRequest::delete()
        .uri("/api/users/me/avatar")
        .insert_header(auth(&token))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    let req = test::TestRequest::get().uri(&avatar).to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );

    let req = test::TestRequest::delete()
        .uri("/api/users/me/avatar")
        .insert_header(auth(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["errors"], "Avatar not set.");
}

#[::core::prelude::v1::test]
fn provisioning_validates_and_rejects_duplicates() {
    let db = TestDb::new();
    let mut conn = db.pool.get().unwrap();
    let payload = NewUserPayload {
        email: "chef@example.org".into(),
        username: "chef".into(),
        first_name: "Anna".into(),
        last_name: "Cook".into(),
    };
    let user = provision_user(&mut conn, &payload).unwrap();
    assert_eq!(user.username, "chef");

    match provision_user(&mut conn, &payload) {
        Err(ApiError::Validation(errors)) => assert!(errors.contains_key("email")),
        other => panic!("expected a validation error, got {other:?}"),
    }

    let invalid = NewUserPayload {
        username: "no spaces".into(),
        email: "other@example.org".into(),
        ..payload
    };
    match provision_user(&mut conn, &invalid) {
        Err(ApiError::Validation(errors)) => assert!(errors.contains_key("username")),
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[actix_web::test]
async fn registration_endpoint_creates_profiles() {
    let db = TestDb::new();
    let app = test_app!(db.pool);
    let body = json!({
        "email": "chef@example.org",
        "username": "chef",
        "first_name": "Anna",
        "last_name": "Cook",
    });

    let req = test::TestRequest::post()
        .uri("/api/users")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = json_body(resp).await;
    assert_eq!(
        created,
        json!({
            "id": created["id"],
            "email": "chef@example.org",
            "username": "chef",
            "first_name": "Anna",
            "last_name": "Cook",
            "avatar": null,
            "is_subscribed": false,
        })
    );

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}", created["id"]))
        .to_request();
    assert_eq!(
        json_body(test::call_service(&app, req).await).await["username"],
        "chef"
    );

    let req = test::TestRequest::post()
        .uri("/api/users")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp).await,
        json!({ "email": ["A user with that email or username already exists."] })
    );

    let mut invalid = body.clone();
    invalid["email"] = json!("other@example.org");
    invalid["username"] = json!("no spaces");
    let req = test::TestRequest::post()
        .uri("/api/users")
        .set_json(&invalid)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp).await.get("username").is_some());

    let req = test::TestRequest::get().uri("/api/users").to_request();
    assert_eq!(
        json_body(test::call_service(&app, req).await).await["count"],
        1
    );
}
