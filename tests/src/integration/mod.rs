//! Cross-crate integration flows

mod notification_flows;
mod sync_flows;
