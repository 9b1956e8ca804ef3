//! Rule based routing: which connectors may carry a given message.

mod compiler;
mod predicate;
mod table;

pub use compiler::{
    CompiledPredicate, LeafMatcher, MatchContext, PredicateError, compile, compile_conditions,
};
pub use predicate::{Condition, Predicate, Subject};
pub use table::{RoutingCache, RoutingTable};
