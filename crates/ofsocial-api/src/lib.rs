//! ofsocial-api: HTTP surface of the ofsocial server.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/posts` | List posts, newest first |
//! | POST | `/api/posts` | Create a post and fan out persona comments |
//! | GET | `/api/posts/{id}/comments` | List comments of a post |
//! | POST | `/api/posts/{id}/comments` | Add a user comment |
//! | GET | `/api/search?q=` | Generate and publish AI posts for a query |
//! | GET | `/admin` | Admin page (Basic auth) |
//! | GET/POST | `/admin/personas` | List / add personas (Basic auth) |
//! | PUT/DELETE | `/admin/personas/{index}` | Update / delete a persona (Basic auth) |
//! | GET | `/` | Index page |
//! | GET | `/static/{*path}` | Static files |

pub mod admin;
pub mod assets;
pub mod handlers;
pub mod response;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, put};

use ofsocial_core::config::AdminConfig;
use ofsocial_dispatcher::Dispatcher;
use ofsocial_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub dispatcher: Arc<Dispatcher>,
    pub admin: Arc<AdminConfig>,
    pub static_dir: Arc<PathBuf>,
}

/// Build the complete router (feed API, admin, static pages).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/posts", get(handlers::list_posts).post(handlers::create_post))
        .route(
            "/posts/{id}/comments",
            get(handlers::list_comments).post(handlers::add_comment),
        )
        .route("/search", get(handlers::search));

    let admin_routes = Router::new()
        .route("/", get(admin::admin_page))
        .route("/personas", get(admin::list_personas).post(admin::add_persona))
        .route(
            "/personas/{index}",
            put(admin::update_persona).delete(admin::delete_persona),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin,
        ));

    Router::new()
        .nest("/api", api_routes)
        .nest("/admin", admin_routes)
        .route("/", get(assets::index))
        .route("/static/{*path}", get(assets::static_file))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use ofsocial_content::{ContentSanitizer, GenerationPolicy};
    use ofsocial_core::GenerationParams;
    use ofsocial_core::config::DispatcherConfig;
    use ofsocial_runtime::{ResourceManager, TextGenerator};

    struct CannedGenerator;

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(
            &mut self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> anyhow::Result<String> {
            Ok("Honestly this is the best thing I have read all week".to_string())
        }
    }

    /// API state over an in-memory store with default personas, two canned
    /// resources, and a temporary static directory.
    pub fn test_state() -> (ApiState, tempfile::TempDir) {
        let store = StateStore::open_in_memory().unwrap();
        store.seed_default_personas().unwrap();

        let generators: Vec<(String, Box<dyn TextGenerator>)> = vec![
            ("cuda:0".to_string(), Box::new(CannedGenerator)),
            ("cuda:1".to_string(), Box::new(CannedGenerator)),
        ];
        let manager = Arc::new(ResourceManager::new(generators).unwrap());
        let policy = Arc::new(GenerationPolicy::new(
            manager,
            ContentSanitizer::new().unwrap(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            policy,
            &DispatcherConfig::default(),
        ));

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>feed</h1>").unwrap();
        std::fs::write(dir.path().join("admin.html"), "<h1>admin</h1>").unwrap();

        let state = ApiState {
            store,
            dispatcher,
            admin: Arc::new(AdminConfig::default()),
            static_dir: Arc::new(dir.path().to_path_buf()),
        };
        (state, dir)
    }
}
