//! Small value types shared by every layer of the simulation

pub mod events;
pub mod gameplay_tags;
pub mod proposed_move;
pub mod time_step;

pub use events::{MoverSimulationEvent, TeleportFailureReason};
pub use gameplay_tags::{GameplayTag, GameplayTagContainer, TagCancellationRequest};
pub use proposed_move::{clamp_to_max_size, project_onto_normal, MoveMixMode, ProposedMove};
pub use time_step::{has_started, MoverTimeStep, NOT_STARTED_MS};

/// Last path segment of a `std::any::type_name` ("a::b::Launch" -> "Launch").
pub fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("mover_core::layered_moves::LaunchMove"), "LaunchMove");
        assert_eq!(short_type_name("Plain"), "Plain");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper<b::Inner>");
    }
}
