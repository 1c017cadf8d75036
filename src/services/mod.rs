pub mod order_lifecycle;
pub mod orders;

pub use order_lifecycle::OrderLifecycleService;
pub use orders::OrderService;
