//! Cross-crate integration flows.

#[cfg(test)]
mod support;

pub mod http_flows;
pub mod push_flows;
