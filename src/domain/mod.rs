//! Domain models - beacon definitions, region ids and monitoring events
//!
//! - `BeaconDefinition` - a user-registered beacon
//! - `RegionId` - correlates scanning-engine callbacks with a beacon
//! - `CanonicalEvent` / `DeliveredEvent` - events before and after deduplication
//! - `Identifier` - parsed uuid/major/minor components

pub mod identifier;
pub mod types;

pub use identifier::{Identifier, IdentifierError};
pub use types::{
    BeaconDefinition, CanonicalEvent, DeliveredEvent, EventKind, RawRegionState, RegionId,
    RegionState, Transition,
};
