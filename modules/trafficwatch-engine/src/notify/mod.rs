pub mod backend;
pub mod noop;
pub mod payload;
pub mod rest_proxy;

pub use backend::EventPublisher;
pub use noop::NoopPublisher;
pub use payload::IncidentReported;
pub use rest_proxy::RestProxyPublisher;
