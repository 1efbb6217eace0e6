//! Diagnostic probes (§4.4), grouped by domain. Each probe module
//! exposes a `register(&mut ToolRegistry)` function (Design Notes §9);
//! `register_all` is the fixed, hand-written list `build_default_registry`
//! calls, which stands in for the original's whitelisted dynamic-import
//! discovery.

pub mod args;
pub mod dns;
pub mod email;
pub mod ip;
pub mod ip_tracker;
pub mod ixp;
pub mod link;
pub mod mac;
pub mod ntp;
pub mod pentest;
pub mod reputation;
pub mod web;
pub mod whois;

use crate::registry::ToolRegistry;

pub fn register_all(registry: &mut ToolRegistry) {
    link::register(registry);
    ip::register(registry);
    dns::register(registry);
    web::register(registry);
    email::register(registry);
    ntp::register(registry);
    ixp::register(registry);
    mac::register(registry);
    ip_tracker::register(registry);
    reputation::register(registry);
    whois::register(registry);
    pentest::register(registry);
}
