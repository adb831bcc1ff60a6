use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub mod auth;
pub mod config;
pub mod error;
pub mod ingredients;
pub mod media;
pub mod permissions;
pub mod recipes;
pub mod relations;
pub mod response;
pub mod shopping_list;
pub mod tags;
pub mod users;

use config::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub settings: Settings,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> PgPool {
        app_state.pool.clone()
    }
}

impl FromRef<AppState> for Settings {
    fn from_ref(app_state: &AppState) -> Settings {
        app_state.settings.clone()
    }
}

pub fn router(app_state: AppState) -> Router {
    let auth_router = Router::new()
        .route("/sign-in", post(auth::handler::login))
        .route("/sign-up", post(auth::handler::signup));

    let user_router = Router::new()
        .route("/", get(users::handler::list_users))
        .route("/me", get(users::handler::get_me))
        .route("/set_password", post(users::handler::set_password))
        .route("/subscriptions", get(users::handler::list_subscriptions))
        .route(
            "/:id",
            get(users::handler::get_user)
                .patch(users::handler::modify_user)
                .delete(users::handler::modify_user),
        )
        .route(
            "/:id/subscribe",
            post(users::handler::subscribe).delete(users::handler::unsubscribe),
        );

    let recipe_router = Router::new()
        .route(
            "/",
            get(recipes::handler::list_recipes).post(recipes::handler::create_recipe),
        )
        .route(
            "/download_shopping_cart",
            get(shopping_list::handler::download_shopping_cart),
        )
        .route(
            "/:id",
            get(recipes::handler::get_recipe)
                .patch(recipes::handler::update_recipe)
                .delete(recipes::handler::delete_recipe),
        )
        .route(
            "/:id/favorite",
            post(recipes::handler::add_favorite).delete(recipes::handler::remove_favorite),
        )
        .route(
            "/:id/shopping_cart",
            post(recipes::handler::add_to_shopping_cart)
                .delete(recipes::handler::remove_from_shopping_cart),
        );

    let tag_router = Router::new()
        .route("/", get(tags::handler::list_tags))
        .route("/:id", get(tags::handler::get_tag));

    let ingredient_router = Router::new()
        .route("/", get(ingredients::handler::list_ingredients))
        .route("/:id", get(ingredients::handler::get_ingredient));

    let media_dir = ServeDir::new(&app_state.settings.media_root);

    Router::new()
        .nest("/api/auth", auth_router)
        .nest("/api/users", user_router)
        .nest("/api/recipes", recipe_router)
        .nest("/api/tags", tag_router)
        .nest("/api/ingredients", ingredient_router)
        .nest_service("/media", media_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "test-secret";

    // The pool never connects; these requests are all decided before any query.
    fn app() -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/foodgram_unused")
            .unwrap();
        let settings = Settings {
            port: 0,
            addr: ([127, 0, 0, 1], 0).into(),
            database_url: String::new(),
            max_connections: 1,
            jwt_secret: SECRET.to_string(),
            media_root: std::env::temp_dir(),
        };
        router(AppState { pool, settings })
    }

    fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn relation_toggles_require_authentication() {
        let id = Uuid::new_v4();
        for (method, uri) in [
            (Method::POST, format!("/api/recipes/{id}/favorite")),
            (Method::DELETE, format!("/api/recipes/{id}/favorite")),
            (Method::POST, format!("/api/recipes/{id}/shopping_cart")),
            (Method::DELETE, format!("/api/recipes/{id}/shopping_cart")),
            (Method::POST, format!("/api/users/{id}/subscribe")),
            (Method::DELETE, format!("/api/users/{id}/subscribe")),
            (Method::GET, "/api/recipes/download_shopping_cart".to_string()),
            (Method::GET, "/api/users/subscriptions".to_string()),
            (Method::GET, "/api/users/me".to_string()),
        ] {
            let response = app().oneshot(request(method.clone(), &uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn invalid_token_is_unauthorized() {
        let uri = format!("/api/recipes/{}/favorite", Uuid::new_v4());
        let response = app()
            .oneshot(request(Method::POST, &uri, Some("not-a-jwt")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn anonymous_recipe_writes_are_unauthorized() {
        let uri = format!("/api/recipes/{}", Uuid::new_v4());
        let response = app()
            .oneshot(request(Method::DELETE, &uri, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn user_profiles_are_read_only() {
        let me = Uuid::new_v4();
        let token = auth::jwt::create_token(me, SECRET).unwrap();

        for method in [Method::PATCH, Method::DELETE] {
            let response = app()
                .oneshot(request(method, &format!("/api/users/{me}"), Some(&token)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["success"], false);
        }
    }
}
