/*
 * Responsibility
 * - Public surface of the middleware layer
 * - auth context + privilege gate, HTTP cross-cutting layers, CORS, security headers
 */
pub mod auth;
pub mod cors;
pub mod http;
pub mod security_headers;
