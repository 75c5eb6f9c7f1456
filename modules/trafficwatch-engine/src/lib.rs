pub mod clock;
pub mod ledger;
pub mod lifecycle;
pub mod notify;
pub mod spatial;

pub use ledger::{VoteLedger, VoteOutcome};
pub use lifecycle::IncidentService;
pub use notify::{EventPublisher, IncidentReported, NoopPublisher, RestProxyPublisher};
