pub mod orders;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::ids::IdGenerator;
use crate::repositories::OrderRepository;
use crate::services::{orders::ListingLimits, OrderLifecycleService, OrderService};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub lifecycle: Arc<OrderLifecycleService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        ids: Arc<dyn IdGenerator>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        let repository = Arc::new(OrderRepository::new(db_pool.clone(), ids));
        let limits = ListingLimits {
            default_limit: config.seller_orders_default_limit,
            max_limit: config.seller_orders_max_limit,
        };

        Self {
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                repository,
                event_sender.clone(),
                limits,
            )),
            lifecycle: Arc::new(OrderLifecycleService::new(db_pool, event_sender)),
        }
    }
}
