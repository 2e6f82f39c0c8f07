pub mod access;
pub mod required;

pub use access::ID_TOKEN_COOKIE;
pub use required::required_auth;
