//! Security surfaces: the permission model evaluated at the plugin context
//! boundary and the capability deny-list screened before instantiation.

mod permissions;
mod scan;

pub use permissions::{
    Capability, EventPermissions, FsPermissions, NetPermissions, PermissionSet,
    StatePermissions,
};
pub use scan::{DenyList, DEFAULT_DENIED};
