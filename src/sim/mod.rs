/// Time-inhomogeneous Poisson arrival generator.
pub mod arrivals;
/// Pluggable dispatch policies sharing one feasibility predicate.
pub mod dispatch;
/// Vehicle, Battery, and Robot entities.
pub mod entities;
/// Event queue and fixed-kind tie-breaking.
pub mod event;
/// The event-driven kernel that owns every entity collection and drives the run.
pub mod kernel;
/// Tabular Q-learning dispatch policy.
pub mod rl;
/// Aggregate run statistics.
pub mod stats;
