pub mod factory;
pub mod refresh_token;
pub mod token_codec;
pub mod token_service;

pub use factory::build_token_service;
pub use refresh_token::RefreshTokenService;
pub use token_codec::{AuthClaims, TokenCodec, VerifiedToken};
pub use token_service::{ExchangeOutcome, IssuedTokens, TokenService};
