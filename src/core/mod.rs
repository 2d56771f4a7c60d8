pub mod engine;
pub mod load_balancer;
pub mod reload;

pub use engine::{MatchEngine, MatchOutcome, RequestFacts};
pub use load_balancer::{LbState, select_target};
pub use reload::ReloadCoordinator;
