/// Balance resolution data model
pub mod balance;
/// Amount conversions (subunits, JSON numbers)
pub mod conversions;

pub use balance::{
    AddressOutcome, AddressRef, Descriptor, NewAddress, ResolutionMethod, ResolutionOutcome,
    UnspentRecord, WatchedAddress,
};
