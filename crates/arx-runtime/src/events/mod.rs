mod hub;

pub use hub::{EventHub, HubConfig, HubStats, SubscriberId, Subscription};
