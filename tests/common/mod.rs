#![allow(dead_code)] // shared by several test binaries, not all use every helper
use std::collections::HashMap;

use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::test;
use foodgram::db::{self, DbPool};
use foodgram::models::{NewIngredient, User};
use foodgram::query;
use serde_json::{json, Value};
use tempfile::TempDir;

/// 1x1 transparent PNG.
pub const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// A migrated database in a private temp directory, with a few ingredients.
pub struct TestDb {
    pub pool: DbPool,
    pub ingredients: HashMap<String, i32>,
    // dropped last, removing the database file
    _dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foodgram.sqlite3");
        let pool = db::init_pool(path.to_str().unwrap(), 4).unwrap();

        let mut conn = pool.get().unwrap();
        query::insert_ingredients(
            &mut conn,
            &[
                NewIngredient { name: "flour", measurement_unit: "g" },
                NewIngredient { name: "egg", measurement_unit: "pcs" },
                NewIngredient { name: "milk", measurement_unit: "ml" },
                NewIngredient { name: "sugar", measurement_unit: "g" },
            ],
        )
        .unwrap();
        let ingredients = query::list_ingredients(&mut conn, None)
            .unwrap()
            .into_iter()
            .map(|ingredient| (ingredient.name, ingredient.id))
            .collect();
        drop(conn);

        TestDb {
            pool,
            ingredients,
            _dir: dir,
        }
    }

    pub fn ingredient(&self, name: &str) -> i32 {
        self.ingredients[name]
    }

    /// Adds a catalog entry beyond the seeded ones and returns its id.
    pub fn add_ingredient(&self, name: &str, measurement_unit: &str) -> i32 {
        let mut conn = self.pool.get().unwrap();
        query::insert_ingredients(&mut conn, &[NewIngredient { name, measurement_unit }])
            .unwrap();
        query::list_ingredients(&mut conn, Some(name))
            .unwrap()
            .into_iter()
            .find(|row| row.name == name && row.measurement_unit == measurement_unit)
            .map(|row| row.id)
            .unwrap()
    }

    /// Creates a user together with an auth token; returns both.
    pub fn user(&self, username: &str) -> (User, String) {
        let mut conn = self.pool.get().unwrap();
        let user = query::create_user(
            &mut conn,
            &format!("{username}@example.org"),
            username,
            "Test",
            "Cook",
        )
        .unwrap();
        let token = format!("token-{username}");
        query::insert_token(&mut conn, user.id, &token).unwrap();
        (user, token)
    }
}

/// Builds the application service around a pool with default settings.
#[macro_export]
macro_rules! test_app {
    ($pool:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($pool.clone()))
                .app_data(actix_web::web::Data::new(
                    foodgram::config::Config::default(),
                ))
                .configure(foodgram::routes::configure),
        )
        .await
    };
}

pub fn auth(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Token {token}"))
}

/// Recipe body with the given `(ingredient id, amount)` pairs.
pub fn recipe_body(name: &str, ingredients: &[(i32, i32)]) -> Value {
    json!({
        "name": name,
        "text": "Mix everything and bake.",
        "image": PIXEL,
        "cooking_time": 30,
        "ingredients": ingredients
            .iter()
            .map(|(id, amount)| json!({ "id": id, "amount": amount }))
            .collect::<Vec<_>>(),
    })
}

pub async fn json_body<B: MessageBody>(resp: ServiceResponse<B>) -> Value {
    test::read_body_json(resp).await
}
