pub mod model;
pub mod resolver;
pub mod store;

pub use model::*;
pub use resolver::{EffectiveRules, PolicyResolver, SecurableChain};
pub use store::{InMemoryPolicyStore, PolicyStore, RequestContext};
