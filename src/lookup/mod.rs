pub mod asn;
pub mod cache;
pub mod private;
pub mod resolver;
pub mod ripe;
pub mod rules;
pub mod ws;

pub use cache::{AsnCache, run_cache_sweeper};
pub use private::{is_private, is_private_str};
pub use resolver::{AsnResolver, LookupStrategy, RemoteAnswer, RemoteLookup, Resolve, normalize_asn};

/// Sanitize a string for safe terminal display by removing control characters.
///
/// Whois and owner text comes from remote services and may carry escape
/// sequences; everything that reaches a record goes through here.
pub(crate) fn sanitize_display(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect()
}
