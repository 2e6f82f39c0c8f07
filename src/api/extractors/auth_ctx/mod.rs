/*!
 * Authentication context extractor
 *
 * Responsibility:
 * - Hand the request's AuthContext to handlers
 * - axum-specific extraction lives in core, the types in types
 *
 * Public API:
 * - AuthContext, Authenticated
 * - AuthCtxExtractor, CurrentUser
 */

mod core;
mod types;

pub use self::core::{AuthCtxExtractor, CurrentUser};
pub use types::{AuthContext, Authenticated};
