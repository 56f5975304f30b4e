//! Mesh-based solution transfer: the shared-domain map.

pub mod shared_domain;

pub use shared_domain::SharedDomainMap;
