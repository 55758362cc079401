//! Controller packet formats: header discrimination, decoders and dispatch.

pub mod decoders;
pub mod discriminator;
pub mod dispatcher;
pub mod types;

pub use discriminator::PacketTag;
pub use dispatcher::{Dispatch, dispatch_next};
pub use types::{
    BrineStatus, ClockTime, CyclePosition, CycleTimes, Handshake, Meridiem, Packet,
    SettingsConfig, StatisticsTotals, StatusFlags, StatusRealtime, UsageFragment,
};
