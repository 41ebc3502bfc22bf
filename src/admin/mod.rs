//! Administrative HTTP surface: outbound sends, flow dispatch, blocklist
//! maintenance, and read-only views over stored departments.

mod routes;

pub use routes::{AdminState, admin_routes, cors_layer};
