//! Prometheus counters for the order lifecycle, exported at `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::errors::ServiceError;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref ORDERS_CREATED: IntCounter = register_counter(
        IntCounter::new("orders_created_total", "Total number of orders created")
            .expect("metric can be created")
    );
    pub static ref ORDERS_CANCELLED: IntCounter = register_counter(
        IntCounter::new(
            "orders_cancelled_total",
            "Total number of orders cancelled by deletion"
        )
        .expect("metric can be created")
    );
    pub static ref ORDER_CLAIMS: IntCounter = register_counter(
        IntCounter::new("order_claims_total", "Total number of orders claimed by shippers")
            .expect("metric can be created")
    );
    pub static ref ORDER_DELIVERIES_CONFIRMED: IntCounter = register_counter(
        IntCounter::new(
            "order_deliveries_confirmed_total",
            "Total number of confirmed deliveries"
        )
        .expect("metric can be created")
    );
    pub static ref ORDER_TRANSITION_REJECTIONS: IntCounterVec = {
        let counter = IntCounterVec::new(
            Opts::new(
                "order_transition_rejections_total",
                "Lifecycle operations rejected because the order was in the wrong status",
            ),
            &["operation"],
        )
        .expect("metric can be created");
        if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
            error!("Failed to register order_transition_rejections_total: {}", e);
        }
        counter
    };
}

fn register_counter(counter: IntCounter) -> IntCounter {
    if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
        error!("Failed to register counter: {}", e);
    }
    counter
}

/// Counts `InvalidState` rejections of a lifecycle operation.
pub fn record_rejection<T>(operation: &str, result: &Result<T, ServiceError>) {
    if let Err(ServiceError::InvalidState { .. }) = result {
        ORDER_TRANSITION_REJECTIONS
            .with_label_values(&[operation])
            .inc();
    }
}

/// Forces registration so a scrape lists every counter even before it is first incremented.
pub fn init() {
    lazy_static::initialize(&ORDERS_CREATED);
    lazy_static::initialize(&ORDERS_CANCELLED);
    lazy_static::initialize(&ORDER_CLAIMS);
    lazy_static::initialize(&ORDER_DELIVERIES_CONFIRMED);
    lazy_static::initialize(&ORDER_TRANSITION_REJECTIONS);
}

/// Renders the registry in the Prometheus text exposition format.
pub fn gather() -> Result<String, ServiceError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| ServiceError::InternalError(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ServiceError::InternalError(format!("Metrics are not UTF-8: {}", e)))
}
