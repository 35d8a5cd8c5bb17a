/// Router Module Index
///
/// Routing is split by access level; each module maps to one tier and the tier's guard is
/// applied as a layer in `create_router`.

/// Routes open to everyone (anonymous reads, registration, login).
pub mod public;

/// Routes that require a valid bearer token for an active principal.
pub mod authenticated;

/// Routes restricted to the admin role.
pub mod admin;
