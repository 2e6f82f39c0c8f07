/*
 * Responsibility
 * - GET /health (liveness, no auth context required)
 */
pub async fn health() -> &'static str {
    "ok"
}
